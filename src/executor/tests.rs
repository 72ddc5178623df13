//! Unit tests for plan execution.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rstest::{fixture, rstest};

use super::{CommitError, Executor, MockCommitCreator, Operation, Plan};
use crate::error::SourceError;
use crate::sourcer::Sourcer;
use crate::sourcer::mock::MockSourcerStore;
use crate::sources::ChangesetSource;
use crate::sources::mock::{
    MockArchivableChangesetSource, MockChangesetSource, MockDraftChangesetSource,
    MockForkableChangesetSource,
};
use crate::telemetry::{RecordingTelemetrySink, TelemetryEvent};
use crate::types::{
    Changeset, ChangesetMetadata, ChangesetSpec, CodeHostKind, CreateCommitFromPatchResponse,
    ExternalRepoSpec, ExternalService, ExternalState, PublicationState, Repo, SourceInfo,
};

const CHANGESET_ID: i64 = 5;

/// Store syncing every repo from one GitHub service and holding no
/// credentials, so imported changesets use the service's own source.
fn store() -> MockSourcerStore {
    let store = MockSourcerStore::new();
    store
        .list_external_services
        .set_default_return(Ok(vec![ExternalService {
            id: 1,
            kind: CodeHostKind::GitHub,
            display_name: "GitHub".to_owned(),
            url: "https://github.com/".to_owned(),
        }]));
    store
}

fn sourcer_returning(source: Arc<dyn ChangesetSource>) -> Sourcer {
    Sourcer::new(move |_| Ok(Arc::clone(&source)))
}

#[fixture]
fn repo() -> Repo {
    Repo {
        id: 1,
        name: "github.com/owner/repo".to_owned(),
        external_repo: ExternalRepoSpec {
            id: "R_1".to_owned(),
            service_type: CodeHostKind::GitHub,
            service_id: "https://github.com/".to_owned(),
        },
        sources: vec![SourceInfo {
            id: "extsvc:github:1".to_owned(),
            clone_url: "https://github.com/owner/repo".to_owned(),
        }],
        ..Repo::default()
    }
}

#[fixture]
fn spec() -> ChangesetSpec {
    ChangesetSpec {
        id: 3,
        title: "Bump dependency".to_owned(),
        body: "Automated change".to_owned(),
        base_ref: "refs/heads/main".to_owned(),
        base_rev: "d34db33f".to_owned(),
        head_ref: "refs/heads/bump".to_owned(),
        commit_message: "Bump dependency".to_owned(),
        created_at: Utc::now(),
        ..ChangesetSpec::default()
    }
}

fn changeset(state: Option<ExternalState>) -> Changeset {
    Changeset {
        id: CHANGESET_ID,
        repo_id: 1,
        external_id: "42".to_owned(),
        external_state: state,
        ..Changeset::default()
    }
}

fn commit_response(changelist_id: Option<&str>) -> CreateCommitFromPatchResponse {
    CreateCommitFromPatchResponse {
        rev: "c0ffee".to_owned(),
        changelist_id: changelist_id.map(str::to_owned),
    }
}

#[rstest]
fn execution_order_follows_reconciler_order() {
    let plan = Plan::new([
        Operation::Comment {
            body: "hello".to_owned(),
        },
        Operation::Publish,
        Operation::Sleep,
        Operation::Push,
        Operation::Detach,
        Operation::Push,
    ]);

    let order: Vec<String> = plan
        .execution_order()
        .into_iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(
        order,
        vec!["push", "detach", "publish", "sleep", "comment"]
    );
}

#[rstest]
#[case::push_sleep_sync(
    vec![Operation::Sync, Operation::Sleep, Operation::Push],
    vec!["push", "sleep", "sync"]
)]
#[case::state_changes(
    vec![
        Operation::Merge { squash: false },
        Operation::Update,
        Operation::Undraft,
        Operation::Reopen,
        Operation::Close,
        Operation::Import,
    ],
    vec!["import", "close", "reopen", "undraft", "update", "merge"]
)]
#[case::bookkeeping_first(
    vec![Operation::Sync, Operation::Reattach, Operation::Archive, Operation::Detach],
    vec!["reattach", "archive", "detach", "sync"]
)]
fn orders_operations_like_the_reconciler(
    #[case] operations: Vec<Operation>,
    #[case] expected: Vec<&str>,
) {
    let plan = Plan::new(operations);

    let order: Vec<String> = plan
        .execution_order()
        .into_iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(order, expected);
}

#[rstest]
#[tokio::test]
async fn syncs_after_the_pushed_commit(repo: Repo, spec: ChangesetSpec) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let css = Arc::new(MockChangesetSource::new());
    let load_events = Arc::clone(&events);
    css.load_changeset.set_default_hook(move |_| {
        load_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push("load");
        Ok(())
    });
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    let commit_events = Arc::clone(&events);
    commits
        .expect_create_commit_from_patch()
        .times(1)
        .returning(move |_| {
            commit_events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push("commit");
            Ok(commit_response(None))
        });
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    executor
        .execute(
            &Plan::new([Operation::Sync, Operation::Sleep, Operation::Push]),
            &repo,
            &mut changeset,
            Some(&spec),
        )
        .await
        .expect("plan should succeed");

    assert_eq!(
        *events.lock().unwrap_or_else(PoisonError::into_inner),
        vec!["commit", "load"]
    );
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdated {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn publishes_new_changeset(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor =
        Executor::new(&sourcer, &store, &commits, &telemetry).with_sync_delay(Duration::ZERO);
    let mut changeset = changeset(None);

    executor
        .execute(&Plan::new([Operation::Publish]), &repo, &mut changeset, Some(&spec))
        .await
        .expect("publish should succeed");

    assert_eq!(changeset.publication_state, PublicationState::Published);
    assert!(css.create_changeset.called_once());
    let history = css.create_changeset.history();
    let call = history.first().expect("create call");
    assert_eq!(call.args.title, "Bump dependency");
    assert_eq!(call.args.head_ref, "refs/heads/bump");
    assert_eq!(css.update_changeset.call_count(), 0);
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetPublished {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn updates_existing_outdated_changeset_on_publish(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    css.create_changeset.push_hook(|view| {
        view.changeset.metadata = Some(ChangesetMetadata {
            title: "Old title".to_owned(),
            body: view.body.clone(),
            base_ref: view.base_ref.clone(),
            head_ref: view.head_ref.clone(),
        });
        Ok(true)
    });
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);

    executor
        .execute(&Plan::new([Operation::Publish]), &repo, &mut changeset, Some(&spec))
        .await
        .expect("publish should succeed");

    assert!(css.update_changeset.called_once());
    assert_eq!(
        changeset.metadata.map(|metadata| metadata.title),
        Some("Old title".to_owned())
    );
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdated {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn push_records_changelist_id(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .times(1)
        .returning(|_| Ok(commit_response(Some("I1234"))));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    executor
        .execute(&Plan::new([Operation::Push]), &repo, &mut changeset, Some(&spec))
        .await
        .expect("push should succeed");

    assert_eq!(changeset.external_id, "I1234");
    assert!(css.gitserver_push_config.called_once());
    let history = css.build_commit_opts.history();
    let call = history.first().expect("build_commit_opts call");
    assert_eq!(call.args.0, repo);
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdated {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[case::patch_does_not_apply(
    "error: patch failed: README.md:1\nerror: patch does not apply",
    false
)]
#[case::push_rejected("! [rejected] bump -> bump (fetch first)", true)]
#[tokio::test]
async fn classifies_commit_failures(
    repo: Repo,
    spec: ChangesetSpec,
    #[case] output: &'static str,
    #[case] retryable: bool,
) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .times(1)
        .returning(move |_| {
            Err(CommitError::Git {
                repository_name: "github.com/owner/repo".to_owned(),
                internal_error: "git apply failed".to_owned(),
                command: "git apply --cached".to_owned(),
                combined_output: output.to_owned(),
            })
        });
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let error = executor
        .execute(
            &Plan::new([Operation::Push, Operation::Publish]),
            &repo,
            &mut changeset,
            Some(&spec),
        )
        .await
        .expect_err("push should fail");

    assert_eq!(error.is_retryable(), retryable, "{error}");
    assert_eq!(css.create_changeset.call_count(), 0);
    assert!(matches!(
        telemetry.take().as_slice(),
        [TelemetryEvent::ChangesetUpdateFailed { .. }]
    ));
}

#[rstest]
#[tokio::test]
async fn refuses_to_push_to_archived_repo(mut repo: Repo, spec: ChangesetSpec) {
    repo.archived = true;
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits.expect_create_commit_from_patch().never();
    css.validate_authenticator.set_default_return(Ok(()));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);

    let result = executor
        .execute(&Plan::new([Operation::Push]), &repo, &mut changeset, Some(&spec))
        .await;

    assert_eq!(result, Err(SourceError::ArchivedRepository));
}

#[rstest]
#[tokio::test]
async fn sync_marks_missing_changeset_deleted(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    css.load_changeset
        .set_default_return(Err(SourceError::not_found("changeset", "42")));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    executor
        .execute(&Plan::new([Operation::Sync]), &repo, &mut changeset, None)
        .await
        .expect("sync should succeed");

    assert!(changeset.is_deleted());
    assert!(telemetry.take().is_empty());
}

#[rstest]
#[tokio::test]
async fn sync_propagates_other_errors(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    css.load_changeset.set_default_return(Err(SourceError::Transient {
        message: "502".to_owned(),
    }));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let result = executor
        .execute(&Plan::new([Operation::Sync]), &repo, &mut changeset, None)
        .await;

    assert!(matches!(result, Err(SourceError::Transient { .. })));
    assert!(!changeset.is_deleted());
}

#[rstest]
#[case::merged(Some(ExternalState::Merged))]
#[case::closed(Some(ExternalState::Closed))]
#[case::unsynced(None)]
#[tokio::test]
async fn close_is_a_no_op_unless_open(repo: Repo, #[case] state: Option<ExternalState>) {
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = MockSourcerStore::strict();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = Changeset {
        closing: true,
        ..changeset(state)
    };

    executor
        .execute(&Plan::new([Operation::Close]), &repo, &mut changeset, None)
        .await
        .expect("close should succeed");

    assert!(!changeset.closing);
    assert!(telemetry.take().is_empty());
}

#[rstest]
#[tokio::test]
async fn closes_open_changeset(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    css.close_changeset.push_hook(|view| {
        view.changeset.external_state = Some(ExternalState::Closed);
        Ok(())
    });
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = Changeset {
        closing: true,
        ..changeset(Some(ExternalState::Draft))
    };

    executor
        .execute(&Plan::new([Operation::Close]), &repo, &mut changeset, None)
        .await
        .expect("close should succeed");

    assert_eq!(changeset.external_state, Some(ExternalState::Closed));
    assert!(!changeset.closing);
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetClosed {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn draft_publication_requires_draft_support(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);

    let result = executor
        .execute(&Plan::new([Operation::PublishDraft]), &repo, &mut changeset, Some(&spec))
        .await;

    assert_eq!(result, Err(SourceError::CannotDraft));
    assert_eq!(changeset.publication_state, PublicationState::Unpublished);
}

#[rstest]
#[tokio::test]
async fn merges_with_requested_strategy(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    executor
        .execute(
            &Plan::new([Operation::Merge { squash: true }]),
            &repo,
            &mut changeset,
            None,
        )
        .await
        .expect("merge should succeed");

    let history = css.merge_changeset.history();
    assert_eq!(history.first().map(|call| call.args.1), Some(true));
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetMerged {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn comment_failures_do_not_fail_the_plan(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    css.create_comment.set_default_return(Err(SourceError::Transient {
        message: "timeout".to_owned(),
    }));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let plan = Plan::new([Operation::Comment {
        body: "Merged by batch change".to_owned(),
    }]);
    executor
        .execute(&plan, &repo, &mut changeset, None)
        .await
        .expect("comment failures are logged only");

    assert!(css.create_comment.called_once());
}

#[rstest]
#[tokio::test]
async fn update_requires_a_spec(repo: Repo) {
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = MockSourcerStore::strict();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let result = executor
        .execute(&Plan::new([Operation::Update]), &repo, &mut changeset, None)
        .await;

    assert!(matches!(result, Err(SourceError::Configuration { .. })));
}

#[rstest]
#[tokio::test]
async fn resolves_source_and_fork_once(repo: Repo, #[from(spec)] base: ChangesetSpec) {
    let css = Arc::new(MockForkableChangesetSource::new());
    let fork = Repo {
        id: 2,
        name: "github.com/fake-user/repo".to_owned(),
        ..repo.clone()
    };
    css.get_fork.set_default_return(Ok(fork.clone()));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .times(1)
        .returning(|_| Ok(commit_response(None)));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);
    let spec = ChangesetSpec {
        fork_namespace: Some("<user>".to_owned()),
        ..base
    };

    executor
        .execute(
            &Plan::new([Operation::Push, Operation::Publish]),
            &repo,
            &mut changeset,
            Some(&spec),
        )
        .await
        .expect("plan should succeed");

    assert!(css.get_fork.called_once());
    assert!(store.list_external_services.called_once());
    let pushes = css.source.gitserver_push_config.history();
    assert_eq!(pushes.first().map(|call| call.args.clone()), Some(fork.clone()));
    let creates = css.source.create_changeset.history();
    let created = creates.first().expect("create call");
    assert_eq!(created.args.remote_repo, fork);
    assert_eq!(created.args.target_repo, repo);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn sleep_waits_for_sync_delay(repo: Repo) {
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = MockSourcerStore::strict();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry)
        .with_sync_delay(Duration::from_secs(3));
    let mut changeset = changeset(None);
    let started = tokio::time::Instant::now();

    executor
        .execute(&Plan::new([Operation::Sleep]), &repo, &mut changeset, None)
        .await
        .expect("sleep should succeed");

    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[rstest]
#[tokio::test]
async fn import_loads_and_marks_published(repo: Repo) {
    let css = Arc::new(MockChangesetSource::new());
    css.load_changeset.push_hook(|view| {
        view.changeset.external_state = Some(ExternalState::Open);
        Ok(())
    });
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);

    executor
        .execute(&Plan::new([Operation::Import]), &repo, &mut changeset, None)
        .await
        .expect("import should succeed");

    assert_eq!(changeset.publication_state, PublicationState::Published);
    assert_eq!(changeset.external_state, Some(ExternalState::Open));
    assert!(telemetry.take().is_empty());
}

#[rstest]
#[tokio::test]
async fn undrafts_through_draft_capability(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockDraftChangesetSource::new());
    css.undraft_changeset.push_hook(|view| {
        view.changeset.external_state = Some(ExternalState::Open);
        Ok(())
    });
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Draft));

    executor
        .execute(&Plan::new([Operation::Undraft]), &repo, &mut changeset, Some(&spec))
        .await
        .expect("undraft should succeed");

    assert_eq!(changeset.external_state, Some(ExternalState::Open));
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdated {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[tokio::test]
async fn reopen_failure_is_reported(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    css.reopen_changeset.set_default_return(Err(SourceError::Unmergeable {
        message: "merged changesets cannot be reopened".to_owned(),
    }));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Closed));

    let result = executor
        .execute(
            &Plan::new([Operation::Reopen, Operation::Comment {
                body: "reopened".to_owned(),
            }]),
            &repo,
            &mut changeset,
            Some(&spec),
        )
        .await;

    assert!(matches!(result, Err(SourceError::Unmergeable { .. })));
    assert_eq!(css.create_comment.call_count(), 0);
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdateFailed {
            changeset_id: CHANGESET_ID,
            message: "changeset cannot be merged: merged changesets cannot be reopened"
                .to_owned(),
        }]
    );
}

#[rstest]
#[tokio::test]
async fn detach_clears_ownership(repo: Repo) {
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = MockSourcerStore::strict();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = Changeset {
        owned_by_batch_change_id: 12,
        ..changeset(Some(ExternalState::Open))
    };

    executor
        .execute(&Plan::new([Operation::Detach]), &repo, &mut changeset, None)
        .await
        .expect("detach should succeed");

    assert!(changeset.is_imported());
    assert!(changeset.is_detached());
}

fn git_failure(output: &str) -> CommitError {
    CommitError::Git {
        repository_name: "github.com/owner/repo".to_owned(),
        internal_error: "git push failed".to_owned(),
        command: "git push".to_owned(),
        combined_output: output.to_owned(),
    }
}

#[rstest]
#[tokio::test]
async fn archived_push_marks_changeset_read_only(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockArchivableChangesetSource::new());
    css.is_archived_push_error.set_default_return(true);
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .times(1)
        .returning(|_| Err(git_failure("This repository was archived so it is read-only.")));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let result = executor
        .execute(
            &Plan::new([Operation::Push, Operation::Publish]),
            &repo,
            &mut changeset,
            Some(&spec),
        )
        .await;

    assert_eq!(result, Err(SourceError::ArchivedRepository));
    assert_eq!(changeset.external_state, Some(ExternalState::ReadOnly));
    let outputs = css.is_archived_push_error.history();
    assert_eq!(
        outputs.first().map(|call| call.args.as_str()),
        Some("This repository was archived so it is read-only.")
    );
    let archived = store.mark_repo_archived.history();
    let marked = archived.first().expect("repo marked archived");
    assert!(marked.args.archived);
    assert_eq!(marked.args.name, repo.name);
    assert_eq!(css.source.create_changeset.call_count(), 0);
}

#[rstest]
#[tokio::test]
async fn archived_push_keeps_state_when_store_fails(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockArchivableChangesetSource::new());
    css.is_archived_push_error.set_default_return(true);
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    store.mark_repo_archived.set_default_return(Err(SourceError::Store {
        message: "database is locked".to_owned(),
    }));
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .returning(|_| Err(git_failure("archived")));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Draft));

    let result = executor
        .execute(&Plan::new([Operation::Push]), &repo, &mut changeset, Some(&spec))
        .await;

    assert!(matches!(result, Err(SourceError::Store { .. })));
    assert_eq!(changeset.external_state, Some(ExternalState::Draft));
}

#[rstest]
#[tokio::test]
async fn unrecognised_push_failure_is_a_commit_error(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockArchivableChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .returning(|_| Err(git_failure("archived")));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    let result = executor
        .execute(&Plan::new([Operation::Push]), &repo, &mut changeset, Some(&spec))
        .await;

    assert!(matches!(result, Err(SourceError::CommitFailed { .. })));
    assert_eq!(changeset.external_state, Some(ExternalState::Open));
    assert!(css.is_archived_push_error.called_once());
    assert_eq!(store.mark_repo_archived.call_count(), 0);
}

#[rstest]
#[tokio::test]
async fn archived_update_marks_changeset_read_only(repo: Repo, spec: ChangesetSpec) {
    let css = Arc::new(MockChangesetSource::new());
    css.update_changeset
        .set_default_return(Err(SourceError::ArchivedRepository));
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(Some(ExternalState::Open));

    executor
        .execute(&Plan::new([Operation::Update]), &repo, &mut changeset, Some(&spec))
        .await
        .expect("archived repositories are recorded, not failed");

    assert_eq!(changeset.external_state, Some(ExternalState::ReadOnly));
    assert!(store.mark_repo_archived.called_once());
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::ChangesetUpdated {
            changeset_id: CHANGESET_ID
        }]
    );
}

#[rstest]
#[case::other_changeset(99, true)]
#[case::same_changeset(CHANGESET_ID, false)]
#[tokio::test]
async fn refuses_to_push_a_branch_owned_by_another_changeset(
    repo: Repo,
    spec: ChangesetSpec,
    #[case] existing_id: i64,
    #[case] refused: bool,
) {
    let css = Arc::new(MockChangesetSource::new());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = store();
    store
        .get_changeset_by_branch
        .set_default_return(Ok(Some(Changeset {
            id: existing_id,
            ..Changeset::default()
        })));
    let mut commits = MockCommitCreator::new();
    commits
        .expect_create_commit_from_patch()
        .times(usize::from(!refused))
        .returning(|_| Ok(commit_response(None)));
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = changeset(None);

    let result = executor
        .execute(&Plan::new([Operation::Push]), &repo, &mut changeset, Some(&spec))
        .await;

    assert_eq!(result.is_err(), refused);
    if refused {
        assert_eq!(result, Err(SourceError::PublishSameBranch));
        assert!(!SourceError::PublishSameBranch.is_retryable());
    }
    let lookups = store.get_changeset_by_branch.history();
    assert_eq!(
        lookups.first().map(|call| call.args.1.as_str()),
        Some("refs/heads/bump")
    );
}

#[rstest]
#[tokio::test]
async fn archive_and_reattach_update_bookkeeping(repo: Repo) {
    let css = Arc::new(MockChangesetSource::strict());
    let sourcer = sourcer_returning(Arc::clone(&css) as Arc<dyn ChangesetSource>);
    let store = MockSourcerStore::strict();
    let commits = MockCommitCreator::new();
    let telemetry = RecordingTelemetrySink::default();
    let executor = Executor::new(&sourcer, &store, &commits, &telemetry);
    let mut changeset = Changeset {
        archive: true,
        detached_at: Some(Utc::now()),
        ..changeset(Some(ExternalState::Open))
    };

    executor
        .execute(
            &Plan::new([Operation::Archive, Operation::Reattach]),
            &repo,
            &mut changeset,
            None,
        )
        .await
        .expect("bookkeeping should succeed");

    assert!(changeset.archived);
    assert!(!changeset.archive);
    assert!(!changeset.is_detached());
    assert!(telemetry.take().is_empty());
}
