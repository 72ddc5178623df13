//! In-memory code host implementing every changeset source capability.
//!
//! Clones made through [`ChangesetSource::with_authenticator`] share the same
//! remote state, so a test can create a changeset with one credential and
//! observe it with another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    ArchivableChangesetSource, ChangesetSource, DraftChangesetSource, ForkableChangesetSource,
    gitserver_push_config,
};
use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::types::{
    ChangesetMetadata, CodeHostKind, ExternalRepoSpec, ExternalState, PushConfig, Repo,
    SourceChangeset, SourceInfo,
};

/// Namespace forks are created in when no namespace is requested.
pub const DEFAULT_FAKE_USER: &str = "fake-user";

const FIRST_FORK_REPO_ID: i32 = 10_000;

/// Push output fragments the fake treats as an archived repository refusal.
const ARCHIVED_PUSH_MARKERS: [&str; 2] = ["archived", "read-only"];

#[derive(Debug, Clone)]
struct RemoteChangeset {
    target_repo: String,
    remote_repo: String,
    state: ExternalState,
    metadata: ChangesetMetadata,
    mergeable: bool,
    comments: Vec<String>,
}

#[derive(Debug, Default)]
struct HostState {
    changesets: BTreeMap<u64, RemoteChangeset>,
    /// Keyed by target repository, namespace, and fork name.
    forks: BTreeMap<(String, String, String), Repo>,
    next_number: u64,
    next_fork_id: i32,
}

impl HostState {
    fn find_by_branch(&self, changeset: &SourceChangeset) -> Option<u64> {
        self.changesets
            .iter()
            .find(|(_, remote)| {
                remote.target_repo == changeset.target_repo.name
                    && remote.remote_repo == changeset.remote_repo.name
                    && remote.metadata.head_ref == changeset.head_ref
                    && remote.state != ExternalState::Deleted
            })
            .map(|(number, _)| *number)
    }
}

/// A fake code host keeping pull requests and forks in memory.
#[derive(Debug, Clone)]
pub struct FakeChangesetSource {
    kind: CodeHostKind,
    authenticator: Option<Authenticator>,
    user: String,
    state: Arc<Mutex<HostState>>,
}

impl FakeChangesetSource {
    /// Creates an empty code host of the given kind.
    #[must_use]
    pub fn new(kind: CodeHostKind) -> Self {
        Self {
            kind,
            authenticator: None,
            user: DEFAULT_FAKE_USER.to_owned(),
            state: Arc::new(Mutex::new(HostState {
                next_number: 1,
                next_fork_id: FIRST_FORK_REPO_ID,
                ..HostState::default()
            })),
        }
    }

    /// Sets the namespace of the authenticated user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Credential this instance authenticates with.
    #[must_use]
    pub const fn current_authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    /// Code host kind this fake emulates.
    #[must_use]
    pub const fn kind(&self) -> CodeHostKind {
        self.kind
    }

    /// Number of changesets on the host, including closed and merged ones.
    #[must_use]
    pub fn changeset_count(&self) -> usize {
        self.lock()
            .changesets
            .values()
            .filter(|remote| remote.state != ExternalState::Deleted)
            .count()
    }

    /// Remote state of the changeset with the given external id.
    #[must_use]
    pub fn remote_state(&self, external_id: &str) -> Option<ExternalState> {
        let number = parse_number(external_id)?;
        self.lock().changesets.get(&number).map(|remote| remote.state)
    }

    /// Comments posted on the changeset with the given external id.
    #[must_use]
    pub fn comments(&self, external_id: &str) -> Vec<String> {
        parse_number(external_id)
            .and_then(|number| {
                self.lock()
                    .changesets
                    .get(&number)
                    .map(|remote| remote.comments.clone())
            })
            .unwrap_or_default()
    }

    /// Deletes a changeset as if someone removed it on the code host.
    pub fn delete_remote(&self, external_id: &str) {
        self.modify(external_id, |remote| remote.state = ExternalState::Deleted);
    }

    /// Makes merging the changeset fail as if it had conflicts.
    pub fn block_merge(&self, external_id: &str) {
        self.modify(external_id, |remote| remote.mergeable = false);
    }

    fn modify(&self, external_id: &str, change: impl FnOnce(&mut RemoteChangeset)) {
        let Some(number) = parse_number(external_id) else {
            return;
        };
        if let Some(remote) = self.lock().changesets.get_mut(&number) {
            change(remote);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(
        &self,
        changeset: &mut SourceChangeset,
        state: ExternalState,
    ) -> Result<bool, SourceError> {
        self.ensure_authenticated()?;
        let mut host = self.lock();

        if let Some(number) = host.find_by_branch(changeset) {
            tracing::debug!(
                "changeset for {} already exists as #{number}",
                changeset.head_ref
            );
            let remote = host.changesets.get(&number).cloned();
            drop(host);
            if let Some(remote) = remote {
                apply_remote(changeset, number, &remote);
            }
            return Ok(true);
        }

        let number = host.next_number;
        host.next_number += 1;
        let remote = RemoteChangeset {
            target_repo: changeset.target_repo.name.clone(),
            remote_repo: changeset.remote_repo.name.clone(),
            state,
            metadata: ChangesetMetadata {
                title: changeset.title.clone(),
                body: changeset.body.clone(),
                base_ref: changeset.base_ref.clone(),
                head_ref: changeset.head_ref.clone(),
            },
            mergeable: true,
            comments: Vec::new(),
        };
        host.changesets.insert(number, remote.clone());
        drop(host);

        apply_remote(changeset, number, &remote);
        tracing::debug!("created changeset #{number} on {}", changeset.target_repo.name);
        Ok(false)
    }

    /// Applies `change` to the remote changeset and loads the result.
    fn transition(
        &self,
        changeset: &mut SourceChangeset,
        change: impl FnOnce(&mut RemoteChangeset) -> Result<(), SourceError>,
    ) -> Result<(), SourceError> {
        self.ensure_authenticated()?;
        let external_id = changeset.changeset.external_id.clone();
        let number = parse_number(&external_id)
            .ok_or_else(|| SourceError::not_found("changeset", external_id.clone()))?;

        let mut host = self.lock();
        let remote = host
            .changesets
            .get_mut(&number)
            .filter(|remote| remote.state != ExternalState::Deleted)
            .ok_or_else(|| SourceError::not_found("changeset", external_id))?;
        change(remote)?;
        let snapshot = remote.clone();
        drop(host);

        apply_remote(changeset, number, &snapshot);
        Ok(())
    }

    fn ensure_authenticated(&self) -> Result<(), SourceError> {
        match &self.authenticator {
            Some(authenticator) if accepts(self.kind, authenticator) => Ok(()),
            Some(authenticator) => Err(SourceError::UnsupportedAuthenticator {
                host: self.kind.service_type().to_owned(),
                authenticator: authenticator.kind().to_owned(),
            }),
            None => Err(SourceError::AuthInvalid {
                message: "no credential configured".to_owned(),
            }),
        }
    }
}

/// Whether the code host accepts the credential for API calls.
const fn accepts(kind: CodeHostKind, authenticator: &Authenticator) -> bool {
    match authenticator {
        Authenticator::OAuthBearerToken { .. } | Authenticator::OAuthBearerTokenWithSsh { .. } => {
            !matches!(kind, CodeHostKind::Gerrit)
        }
        Authenticator::BasicAuth { .. } | Authenticator::BasicAuthWithSsh { .. } => !matches!(
            kind,
            CodeHostKind::GitHub | CodeHostKind::GitLab
        ),
        Authenticator::OAuthClient { .. } => matches!(kind, CodeHostKind::BitbucketCloud),
    }
}

fn has_empty_secret(authenticator: &Authenticator) -> bool {
    match authenticator {
        Authenticator::OAuthBearerToken { token }
        | Authenticator::OAuthBearerTokenWithSsh { token, .. } => token.is_empty(),
        Authenticator::BasicAuth { password, .. }
        | Authenticator::BasicAuthWithSsh { password, .. } => password.is_empty(),
        Authenticator::OAuthClient { client_secret, .. } => client_secret.is_empty(),
    }
}

fn parse_number(external_id: &str) -> Option<u64> {
    external_id.parse().ok()
}

fn apply_remote(changeset: &mut SourceChangeset, number: u64, remote: &RemoteChangeset) {
    let record = &mut changeset.changeset;
    record.external_id = number.to_string();
    if remote.remote_repo != remote.target_repo {
        if let Some((namespace, name)) = split_owner(&remote.remote_repo) {
            record.external_fork_namespace = namespace.to_owned();
            record.external_fork_name = name.to_owned();
        }
    }
    record.sync(remote.state, remote.metadata.clone());
}

/// Splits `host/namespace/name` into namespace and name.
fn split_owner(repo_name: &str) -> Option<(&str, &str)> {
    let (rest, name) = repo_name.rsplit_once('/')?;
    let (_, namespace) = rest.rsplit_once('/')?;
    Some((namespace, name))
}

#[async_trait]
impl ChangesetSource for FakeChangesetSource {
    async fn create_changeset(&self, changeset: &mut SourceChangeset) -> Result<bool, SourceError> {
        self.open(changeset, ExternalState::Open)
    }

    async fn close_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError> {
        self.transition(changeset, |remote| {
            remote.state = ExternalState::Closed;
            Ok(())
        })
    }

    async fn reopen_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError> {
        self.transition(changeset, |remote| match remote.state {
            ExternalState::Closed => {
                remote.state = ExternalState::Open;
                Ok(())
            }
            ExternalState::Open | ExternalState::Draft => Ok(()),
            ExternalState::Merged | ExternalState::ReadOnly => Err(SourceError::CannotReopen {
                state: format!("{:?}", remote.state),
            }),
            ExternalState::Deleted => Err(SourceError::not_found("changeset", "deleted")),
        })
    }

    async fn update_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError> {
        let title = changeset.title.clone();
        let body = changeset.body.clone();
        let base_ref = changeset.base_ref.clone();
        self.transition(changeset, |remote| {
            remote.metadata.title = title;
            remote.metadata.body = body;
            remote.metadata.base_ref = base_ref;
            Ok(())
        })
    }

    async fn merge_changeset(
        &self,
        changeset: &mut SourceChangeset,
        squash: bool,
    ) -> Result<(), SourceError> {
        self.transition(changeset, |remote| {
            if !remote.mergeable {
                return Err(SourceError::Unmergeable {
                    message: "merge conflict".to_owned(),
                });
            }
            tracing::debug!("merging {} (squash: {squash})", remote.metadata.head_ref);
            remote.state = ExternalState::Merged;
            Ok(())
        })
    }

    async fn load_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError> {
        self.transition(changeset, |_| Ok(()))
    }

    async fn create_comment(
        &self,
        changeset: &SourceChangeset,
        body: &str,
    ) -> Result<(), SourceError> {
        let mut scratch = changeset.clone();
        self.transition(&mut scratch, |remote| {
            remote.comments.push(body.to_owned());
            Ok(())
        })
    }

    fn gitserver_push_config(&self, repo: &Repo) -> Result<PushConfig, SourceError> {
        gitserver_push_config(repo, self.authenticator.as_ref())
    }

    async fn validate_authenticator(&self) -> Result<(), SourceError> {
        self.ensure_authenticated()?;
        match &self.authenticator {
            Some(authenticator) if has_empty_secret(authenticator) => {
                Err(SourceError::AuthInvalid {
                    message: "empty secret".to_owned(),
                })
            }
            _ => Ok(()),
        }
    }

    fn with_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        if !accepts(self.kind, &authenticator) {
            return Err(SourceError::UnsupportedAuthenticator {
                host: self.kind.service_type().to_owned(),
                authenticator: authenticator.kind().to_owned(),
            });
        }
        Ok(Arc::new(Self {
            authenticator: Some(authenticator),
            ..self.clone()
        }))
    }

    fn as_forkable(&self) -> Option<&dyn ForkableChangesetSource> {
        if self.kind.supports_forking() {
            Some(self)
        } else {
            None
        }
    }

    fn as_draft(&self) -> Option<&dyn DraftChangesetSource> {
        if self.kind.supports_draft() {
            Some(self)
        } else {
            None
        }
    }

    fn as_archivable(&self) -> Option<&dyn ArchivableChangesetSource> {
        match self.kind {
            CodeHostKind::GitHub | CodeHostKind::GitLab | CodeHostKind::BitbucketCloud => {
                Some(self)
            }
            CodeHostKind::BitbucketServer | CodeHostKind::AzureDevOps | CodeHostKind::Gerrit => {
                None
            }
        }
    }
}

impl ArchivableChangesetSource for FakeChangesetSource {
    fn is_archived_push_error(&self, combined_output: &str) -> bool {
        let output = combined_output.to_lowercase();
        ARCHIVED_PUSH_MARKERS
            .iter()
            .any(|marker| output.contains(marker))
    }
}

#[async_trait]
impl ForkableChangesetSource for FakeChangesetSource {
    async fn get_fork(
        &self,
        target: &Repo,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Repo, SourceError> {
        self.ensure_authenticated()?;
        let (host_name, target_name) = target
            .name
            .split_once('/')
            .and_then(|(host_name, rest)| {
                rest.rsplit_once('/')
                    .map(|(_, repo_name)| (host_name, repo_name))
            })
            .ok_or_else(|| SourceError::not_found("repository", target.name.clone()))?;

        let namespace = namespace.unwrap_or(self.user.as_str()).to_owned();
        let fork_name = name.unwrap_or(target_name).to_owned();

        let mut host = self.lock();
        let key = (target.name.clone(), namespace.clone(), fork_name.clone());
        if let Some(existing) = host.forks.get(&key) {
            return Ok(existing.clone());
        }

        let id = host.next_fork_id;
        host.next_fork_id += 1;
        let full_name = format!("{host_name}/{namespace}/{fork_name}");
        let fork = Repo {
            id,
            name: full_name.clone(),
            uri: full_name.clone(),
            private: target.private,
            archived: false,
            external_repo: ExternalRepoSpec {
                id: format!("fork-{id}"),
                ..target.external_repo.clone()
            },
            sources: target
                .sources
                .iter()
                .map(|source| SourceInfo {
                    id: source.id.clone(),
                    clone_url: format!("https://{full_name}.git"),
                })
                .collect(),
        };
        host.forks.insert(key, fork.clone());
        tracing::debug!("forked {} into {full_name}", target.name);
        Ok(fork)
    }
}

#[async_trait]
impl DraftChangesetSource for FakeChangesetSource {
    async fn create_draft_changeset(
        &self,
        changeset: &mut SourceChangeset,
    ) -> Result<bool, SourceError> {
        self.open(changeset, ExternalState::Draft)
    }

    async fn undraft_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError> {
        self.transition(changeset, |remote| {
            if remote.state == ExternalState::Draft {
                remote.state = ExternalState::Open;
            }
            Ok(())
        })
    }
}
