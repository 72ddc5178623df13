//! The capability interface every code host adapter implements.
//!
//! A [`ChangesetSource`] adapts one code host's API to the changeset
//! lifecycle: create, update, close, reopen, merge, and load. Hosts that can
//! publish from forks also implement [`ForkableChangesetSource`]; hosts with a
//! draft state implement [`DraftChangesetSource`]. Callers discover the
//! optional capabilities through [`ChangesetSource::as_forkable`],
//! [`ChangesetSource::as_draft`] and [`ChangesetSource::as_archivable`].
//!
//! The helpers in this module are shared by every adapter: deriving the git
//! push configuration from a credential, building commit requests, and
//! resolving the repository a changeset is pushed to.

mod commit_opts;
mod push_config;
mod remote;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use commit_opts::build_commit_opts_common;
pub use push_config::{clone_url, gitserver_push_config};
pub use remote::get_remote_repo;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::types::{
    Changeset, ChangesetSpec, CreateCommitFromPatchRequest, PushConfig, Repo, SourceChangeset,
};

/// Adapter between the changeset lifecycle and one code host's API.
///
/// Implementations must be safe to share across tasks: the reconciler loads
/// many changesets in parallel. Mutating operations on one changeset are
/// serialized by the caller.
#[async_trait]
pub trait ChangesetSource: Send + Sync {
    /// Builds the commit-from-patch request for a changeset. Performs no I/O.
    fn build_commit_opts(
        &self,
        repo: &Repo,
        _changeset: &Changeset,
        spec: &ChangesetSpec,
        push: &PushConfig,
    ) -> CreateCommitFromPatchRequest {
        build_commit_opts_common(repo, spec, push)
    }

    /// Creates the changeset on the code host.
    ///
    /// Returns `true` when a changeset for the head branch already existed;
    /// its current state is loaded into `changeset` instead of failing.
    async fn create_changeset(&self, changeset: &mut SourceChangeset) -> Result<bool, SourceError>;

    /// Closes the changeset on the code host and records the new remote state.
    async fn close_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError>;

    /// Reopens a closed changeset. Some hosts forbid this.
    async fn reopen_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError>;

    /// Pushes the desired title, body, and base branch to the code host.
    async fn update_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError>;

    /// Merges the changeset, squashing when `squash` is set.
    ///
    /// [`SourceError::Unmergeable`] is terminal; do not retry without a change.
    async fn merge_changeset(
        &self,
        changeset: &mut SourceChangeset,
        squash: bool,
    ) -> Result<(), SourceError>;

    /// Refreshes the changeset from the code host.
    ///
    /// Fails with [`SourceError::NotFound`] when the remote object is gone.
    async fn load_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError>;

    /// Posts a comment on the changeset. Failures are usually not fatal.
    async fn create_comment(
        &self,
        changeset: &SourceChangeset,
        body: &str,
    ) -> Result<(), SourceError>;

    /// Derives how git should push to `repo` with the current credential.
    fn gitserver_push_config(&self, repo: &Repo) -> Result<PushConfig, SourceError>;

    /// Checks that the current credential is accepted by the code host.
    async fn validate_authenticator(&self) -> Result<(), SourceError>;

    /// Returns a new source using `authenticator`; `self` is left unchanged.
    fn with_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError>;

    /// Fork support, when the code host has it.
    fn as_forkable(&self) -> Option<&dyn ForkableChangesetSource> {
        None
    }

    /// Draft support, when the code host has it.
    fn as_draft(&self) -> Option<&dyn DraftChangesetSource> {
        None
    }

    /// Recognition of pushes rejected by archived repositories, when the
    /// code host reports them distinctly.
    fn as_archivable(&self) -> Option<&dyn ArchivableChangesetSource> {
        None
    }
}

/// A changeset source that can publish changesets from forks.
#[async_trait]
pub trait ForkableChangesetSource: ChangesetSource {
    /// Returns the fork of `target` in `namespace` named `name`, creating it if needed.
    ///
    /// `None` for either argument means the code host's default: the
    /// authenticated user's namespace and the target repository's name.
    async fn get_fork(
        &self,
        target: &Repo,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Repo, SourceError>;
}

/// A changeset source that can open changesets as drafts.
#[async_trait]
pub trait DraftChangesetSource: ChangesetSource {
    /// Creates the changeset as a draft. Same return contract as
    /// [`ChangesetSource::create_changeset`].
    async fn create_draft_changeset(
        &self,
        changeset: &mut SourceChangeset,
    ) -> Result<bool, SourceError>;

    /// Marks a draft changeset as ready for review.
    async fn undraft_changeset(&self, changeset: &mut SourceChangeset) -> Result<(), SourceError>;
}

/// A changeset source that can tell a push was refused because the
/// repository is archived.
pub trait ArchivableChangesetSource: ChangesetSource {
    /// Whether the combined git output of a failed push says the repository
    /// is archived.
    fn is_archived_push_error(&self, combined_output: &str) -> bool;
}
