//! Error types exposed by changeset sources and the code that drives them.

use thiserror::Error;

/// Errors surfaced by changeset sources, the sourcer, and the executor.
///
/// Only [`SourceError::Transient`], [`SourceError::CommitFailed`] and
/// [`SourceError::Store`] are worth retrying. Every other variant needs a
/// human (or a different spec) before the operation can succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The remote changeset or repository no longer exists.
    #[error("{kind} not found on code host: {message}")]
    NotFound {
        /// What went missing, e.g. `changeset` or `fork`.
        kind: String,
        /// Detail from the code host.
        message: String,
    },

    /// The code host refused to merge (conflicts, failing checks).
    #[error("changeset cannot be merged: {message}")]
    Unmergeable {
        /// Reason reported by the code host.
        message: String,
    },

    /// The credential was rejected by the code host.
    #[error("code host rejected the credential: {message}")]
    AuthInvalid {
        /// Detail from the code host.
        message: String,
    },

    /// Networking or server-side failure that may succeed on retry.
    #[error("transient code host error: {message}")]
    Transient {
        /// Transport or 5xx detail.
        message: String,
    },

    /// The authenticator cannot be used by git to push commits.
    #[error("cannot use credentials of type {credentials_type:?} to push commits")]
    NoPushCredentials {
        /// Authenticator variant name, empty when no authenticator was set.
        credentials_type: String,
    },

    /// The repository requires pushing over SSH but the credential has no key pair.
    #[error("the credential doesn't support SSH pushes, but the repo requires pushing over SSH")]
    NoSshCredential,

    /// The authenticator kind cannot be used against this code host.
    #[error("{host} does not support {authenticator} credentials")]
    UnsupportedAuthenticator {
        /// Code host service type.
        host: String,
        /// Authenticator variant name.
        authenticator: String,
    },

    /// No usable credential exists for the repository.
    #[error("no valid credential for repository {repo:?}")]
    MissingCredentials {
        /// Repository name.
        repo: String,
    },

    /// The repository has no clone URL to push to.
    #[error("no clone URL found for repository {repo:?}")]
    MissingCloneUrl {
        /// Repository name.
        repo: String,
    },

    /// A clone URL could not be parsed.
    #[error("invalid clone URL: {0}")]
    InvalidUrl(String),

    /// The changeset spec asks for a fork but the source cannot fork.
    #[error("changeset source cannot fork repositories")]
    CannotFork,

    /// A draft was requested but the source cannot create drafts.
    #[error("changeset source cannot create draft changesets")]
    CannotDraft,

    /// Looking up or creating the fork failed.
    #[error("getting fork: {message}")]
    Fork {
        /// Underlying error text.
        message: String,
    },

    /// The remote repository is archived and refuses pushes.
    #[error("cannot push to an archived repository")]
    ArchivedRepository,

    /// Another changeset is already published from the same branch.
    #[error("cannot create changeset on the same branch in multiple batch changes")]
    PublishSameBranch,

    /// The code host refuses to reopen a changeset in its current state.
    #[error("changeset in state {state} cannot be reopened")]
    CannotReopen {
        /// Remote state of the changeset.
        state: String,
    },

    /// The patch in the changeset spec no longer applies to the base revision.
    #[error("creating commit from patch for repository {repo:?}: patch does not apply")]
    PatchDoesNotApply {
        /// Repository name.
        repo: String,
    },

    /// Creating or pushing the commit failed.
    #[error("creating commit from patch for repository {repo:?}: {message}")]
    CommitFailed {
        /// Repository name.
        repo: String,
        /// Combined output or internal error.
        message: String,
    },

    /// No external service syncs the repository.
    #[error("no external service found for repository {repo:?}")]
    NoExternalService {
        /// Repository name.
        repo: String,
    },

    /// The credential or batch change store failed.
    #[error("store error: {message}")]
    Store {
        /// Store failure detail.
        message: String,
    },

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },
}

impl SourceError {
    /// Creates a [`SourceError::NotFound`] for the given kind of object.
    #[must_use]
    pub fn not_found(kind: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_owned(),
            message: message.into(),
        }
    }

    /// Returns true when retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::CommitFailed { .. } | Self::Store { .. }
        )
    }

    /// Returns true when the remote object has disappeared.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
