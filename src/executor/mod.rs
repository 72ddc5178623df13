//! Applies a reconciler plan to one changeset.
//!
//! The executor authenticates a source for the changeset through the
//! [`Sourcer`], resolves the repository the branch is pushed to, and runs
//! each planned operation in execution order. It stops at the first failing
//! operation. Every outcome worth reporting is recorded on the
//! [`TelemetrySink`].

mod commit;
mod plan;

pub use commit::{CommitCreator, CommitError};
#[cfg(test)]
pub use commit::MockCommitCreator;
pub use plan::{Operation, Plan};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::SourceError;
use crate::sourcer::{Sourcer, SourcerStore};
use crate::sources::{ChangesetSource, get_remote_repo};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{
    Changeset, ChangesetSpec, ExternalState, PublicationState, Repo, SourceChangeset,
};

const DEFAULT_SYNC_DELAY: Duration = Duration::from_secs(3);

/// Runs reconciler plans against code hosts.
pub struct Executor<'a> {
    sourcer: &'a Sourcer,
    store: &'a dyn SourcerStore,
    commits: &'a dyn CommitCreator,
    telemetry: &'a dyn TelemetrySink,
    sync_delay: Duration,
}

impl<'a> Executor<'a> {
    /// Creates an executor waiting three seconds on [`Operation::Sleep`].
    #[must_use]
    pub fn new(
        sourcer: &'a Sourcer,
        store: &'a dyn SourcerStore,
        commits: &'a dyn CommitCreator,
        telemetry: &'a dyn TelemetrySink,
    ) -> Self {
        Self {
            sourcer,
            store,
            commits,
            telemetry,
            sync_delay: DEFAULT_SYNC_DELAY,
        }
    }

    /// Sets how long [`Operation::Sleep`] waits; zero skips the wait.
    #[must_use]
    pub const fn with_sync_delay(mut self, sync_delay: Duration) -> Self {
        self.sync_delay = sync_delay;
        self
    }

    /// Applies `plan` to `changeset`, which targets `target_repo`.
    ///
    /// `changeset` is updated in place with whatever the code host reported,
    /// including when an operation fails part way through.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing operation. Operations that push,
    /// publish, update, undraft, or reopen fail with
    /// [`SourceError::Configuration`] when `spec` is `None`.
    pub async fn execute(
        &self,
        plan: &Plan,
        target_repo: &Repo,
        changeset: &mut Changeset,
        spec: Option<&ChangesetSpec>,
    ) -> Result<(), SourceError> {
        if plan.is_empty() {
            return Ok(());
        }

        // A push with no publish or update is the only trace of the new
        // commit, so it reports the update itself.
        let push_reports_update = plan.contains(|operation| matches!(operation, Operation::Push))
            && !plan.contains(|operation| {
                matches!(operation, Operation::Publish | Operation::Update)
            });

        let changeset_id = changeset.id;
        let mut run = Run {
            executor: self,
            target_repo,
            changeset,
            spec,
            source: None,
            remote: None,
        };

        for operation in plan.execution_order() {
            tracing::debug!("executing {operation} for changeset {changeset_id}");
            match run.apply(operation, push_reports_update).await {
                Ok(Some(event)) => self.telemetry.record(event),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!("{operation} failed for changeset {changeset_id}: {error}");
                    self.telemetry.record(TelemetryEvent::ChangesetUpdateFailed {
                        changeset_id,
                        message: error.to_string(),
                    });
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

/// State of one plan execution. The source and remote repository are
/// resolved on first use and reused, errors included.
struct Run<'r, 'a> {
    executor: &'r Executor<'a>,
    target_repo: &'r Repo,
    changeset: &'r mut Changeset,
    spec: Option<&'r ChangesetSpec>,
    source: Option<Result<Arc<dyn ChangesetSource>, SourceError>>,
    remote: Option<Result<Repo, SourceError>>,
}

impl<'r> Run<'r, '_> {
    async fn apply(
        &mut self,
        operation: &Operation,
        push_reports_update: bool,
    ) -> Result<Option<TelemetryEvent>, SourceError> {
        let changeset_id = self.changeset.id;
        match operation {
            Operation::Sync => {
                self.sync().await?;
                Ok(None)
            }
            Operation::Import => {
                self.load().await?;
                self.changeset.publication_state = PublicationState::Published;
                Ok(None)
            }
            Operation::Push => {
                self.push().await?;
                Ok(push_reports_update
                    .then_some(TelemetryEvent::ChangesetUpdated { changeset_id }))
            }
            Operation::Publish => self.publish(false).await.map(Some),
            Operation::PublishDraft => self.publish(true).await.map(Some),
            Operation::Update => {
                self.update().await?;
                Ok(Some(TelemetryEvent::ChangesetUpdated { changeset_id }))
            }
            Operation::Undraft => {
                self.undraft().await?;
                Ok(Some(TelemetryEvent::ChangesetUpdated { changeset_id }))
            }
            Operation::Reopen => {
                self.reopen().await?;
                Ok(Some(TelemetryEvent::ChangesetUpdated { changeset_id }))
            }
            Operation::Close => self.close().await,
            Operation::Merge { squash } => {
                self.merge(*squash).await?;
                Ok(Some(TelemetryEvent::ChangesetMerged { changeset_id }))
            }
            Operation::Comment { body } => {
                self.comment(body).await;
                Ok(None)
            }
            Operation::Sleep => {
                self.sleep().await;
                Ok(None)
            }
            Operation::Detach => {
                self.changeset.owned_by_batch_change_id = 0;
                self.changeset.detached_at = Some(Utc::now());
                Ok(None)
            }
            Operation::Archive => {
                if self.changeset.archive {
                    self.changeset.archived = true;
                    self.changeset.archive = false;
                }
                Ok(None)
            }
            Operation::Reattach => {
                self.changeset.detached_at = None;
                Ok(None)
            }
        }
    }

    async fn source(&mut self) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        if let Some(cached) = &self.source {
            return cached.clone();
        }
        let resolved = self
            .executor
            .sourcer
            .for_changeset(self.executor.store, self.changeset, self.target_repo)
            .await;
        self.source = Some(resolved.clone());
        resolved
    }

    async fn remote_repo(&mut self) -> Result<Repo, SourceError> {
        if let Some(cached) = &self.remote {
            return cached.clone();
        }
        let resolved = match self.source().await {
            Ok(source) => {
                get_remote_repo(source.as_ref(), self.target_repo, self.changeset, self.spec).await
            }
            Err(error) => Err(error),
        };
        self.remote = Some(resolved.clone());
        resolved
    }

    fn require_spec(&self, operation: &str) -> Result<&'r ChangesetSpec, SourceError> {
        self.spec.ok_or_else(|| SourceError::Configuration {
            message: format!("{operation} requires a changeset spec"),
        })
    }

    /// Builds the source view of the changeset, with the desired fields from
    /// the spec when there is one.
    async fn source_changeset(
        &mut self,
    ) -> Result<(Arc<dyn ChangesetSource>, SourceChangeset), SourceError> {
        let source = self.source().await?;
        let remote_repo = self.remote_repo().await?;
        let changeset = self.changeset.clone();
        let target_repo = self.target_repo.clone();

        let view = match self.spec {
            Some(spec) => SourceChangeset::from_spec(
                spec,
                spec.body.clone(),
                remote_repo,
                target_repo,
                changeset,
            ),
            None => SourceChangeset {
                remote_repo,
                target_repo,
                changeset,
                ..SourceChangeset::default()
            },
        };
        Ok((source, view))
    }

    async fn load(&mut self) -> Result<(), SourceError> {
        let (source, mut view) = self.source_changeset().await?;
        let result = source.load_changeset(&mut view).await;
        *self.changeset = view.changeset;
        result
    }

    async fn sync(&mut self) -> Result<(), SourceError> {
        match self.load().await {
            Err(error) if error.is_not_found() => {
                tracing::debug!(
                    "changeset {} is gone from the code host, marking it deleted",
                    self.changeset.id
                );
                if !self.changeset.is_deleted() {
                    self.changeset.set_deleted();
                }
                Ok(())
            }
            other => other,
        }
    }

    async fn push(&mut self) -> Result<(), SourceError> {
        let spec = self.require_spec("push")?;
        let same_branch = self
            .executor
            .store
            .get_changeset_by_branch(self.target_repo, &spec.head_ref)
            .await?;
        if same_branch.is_some_and(|other| other.id != self.changeset.id) {
            return Err(SourceError::PublishSameBranch);
        }

        let source = self.source().await?;
        let remote_repo = self.remote_repo().await?;

        if remote_repo.archived {
            return Err(SourceError::ArchivedRepository);
        }

        let push = source.gitserver_push_config(&remote_repo)?;
        let request = source.build_commit_opts(self.target_repo, self.changeset, spec, &push);
        let response = match self.executor.commits.create_commit_from_patch(request).await {
            Ok(response) => response,
            Err(error) => {
                if !is_archived_push(source.as_ref(), &error) {
                    return Err(commit::map_commit_error(error));
                }
                self.handle_archived_repo(remote_repo).await?;
                return Err(SourceError::ArchivedRepository);
            }
        };

        if let Some(changelist_id) = response.changelist_id.filter(|id| !id.is_empty()) {
            self.changeset.external_id = changelist_id;
        }
        tracing::debug!(
            "pushed {} to {} at {}",
            spec.head_ref,
            remote_repo.name,
            response.rev
        );
        Ok(())
    }

    /// Records that `remote_repo` turned out to be archived. The changeset
    /// becomes read-only once the store has the repository marked archived.
    async fn handle_archived_repo(&mut self, mut remote_repo: Repo) -> Result<(), SourceError> {
        tracing::warn!(
            "{} is archived, marking changeset {} read-only",
            remote_repo.name,
            self.changeset.id
        );
        remote_repo.archived = true;
        self.remote = Some(Ok(remote_repo.clone()));
        self.executor.store.mark_repo_archived(&remote_repo).await?;
        self.changeset.external_state = Some(ExternalState::ReadOnly);
        Ok(())
    }

    async fn publish(&mut self, as_draft: bool) -> Result<TelemetryEvent, SourceError> {
        self.require_spec("publish")?;
        let (source, mut view) = self.source_changeset().await?;

        let created = if as_draft {
            match source.as_draft() {
                Some(draft) => draft.create_draft_changeset(&mut view).await,
                None => Err(SourceError::CannotDraft),
            }
        } else {
            source.create_changeset(&mut view).await
        };
        let exists = match created {
            Ok(exists) => exists,
            Err(error) => {
                *self.changeset = view.changeset;
                return Err(error);
            }
        };

        let outdated = exists && view.is_outdated();
        if outdated {
            let updated = source.update_changeset(&mut view).await;
            *self.changeset = view.changeset;
            updated?;
        } else {
            *self.changeset = view.changeset;
        }

        self.changeset.publication_state = PublicationState::Published;
        let changeset_id = self.changeset.id;
        Ok(if outdated {
            TelemetryEvent::ChangesetUpdated { changeset_id }
        } else {
            TelemetryEvent::ChangesetPublished { changeset_id }
        })
    }

    async fn update(&mut self) -> Result<(), SourceError> {
        self.require_spec("update")?;
        let (source, mut view) = self.source_changeset().await?;
        let result = source.update_changeset(&mut view).await;
        *self.changeset = view.changeset;
        match result {
            Err(SourceError::ArchivedRepository) => {
                let remote_repo = self.remote_repo().await?;
                self.handle_archived_repo(remote_repo).await
            }
            other => other,
        }
    }

    async fn reopen(&mut self) -> Result<(), SourceError> {
        self.require_spec("reopen")?;
        let (source, mut view) = self.source_changeset().await?;
        let result = source.reopen_changeset(&mut view).await;
        *self.changeset = view.changeset;
        result
    }

    async fn undraft(&mut self) -> Result<(), SourceError> {
        self.require_spec("undraft")?;
        let (source, mut view) = self.source_changeset().await?;
        let result = match source.as_draft() {
            Some(draft) => draft.undraft_changeset(&mut view).await,
            None => Err(SourceError::CannotDraft),
        };
        *self.changeset = view.changeset;
        result
    }

    async fn close(&mut self) -> Result<Option<TelemetryEvent>, SourceError> {
        self.changeset.closing = false;
        if !self.changeset.is_closeable() {
            return Ok(None);
        }

        let (source, mut view) = self.source_changeset().await?;
        let result = source.close_changeset(&mut view).await;
        *self.changeset = view.changeset;
        result?;
        Ok(Some(TelemetryEvent::ChangesetClosed {
            changeset_id: self.changeset.id,
        }))
    }

    async fn merge(&mut self, squash: bool) -> Result<(), SourceError> {
        let (source, mut view) = self.source_changeset().await?;
        let result = source.merge_changeset(&mut view, squash).await;
        *self.changeset = view.changeset;
        result
    }

    async fn comment(&mut self, body: &str) {
        let posted = match self.source_changeset().await {
            Ok((source, view)) => source.create_comment(&view, body).await,
            Err(error) => Err(error),
        };
        if let Err(error) = posted {
            tracing::warn!(
                "commenting on changeset {} failed: {error}",
                self.changeset.id
            );
        }
    }

    async fn sleep(&self) {
        if !self.executor.sync_delay.is_zero() {
            tokio::time::sleep(self.executor.sync_delay).await;
        }
    }
}

/// Whether the source recognises a failed push as refused by an archived
/// repository.
fn is_archived_push(source: &dyn ChangesetSource, error: &CommitError) -> bool {
    match (source.as_archivable(), error) {
        (Some(archivable), CommitError::Git { combined_output, .. }) => {
            archivable.is_archived_push_error(combined_output)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests;
