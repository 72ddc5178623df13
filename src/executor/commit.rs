//! Creating commits from patches through an external commit service.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SourceError;
use crate::types::{CreateCommitFromPatchRequest, CreateCommitFromPatchResponse};

/// Output marker git prints when the diff no longer applies to the base.
const PATCH_DOES_NOT_APPLY: &str = "patch does not apply";

/// Failure reported by a [`CommitCreator`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    /// A git command failed while applying the patch or pushing.
    #[error("{internal_error}")]
    Git {
        /// Repository the commit was created in.
        repository_name: String,
        /// Short description of the failure.
        internal_error: String,
        /// Command that failed.
        command: String,
        /// Combined stdout and stderr of the command.
        combined_output: String,
    },

    /// The commit service could not be reached.
    #[error("commit service unavailable: {message}")]
    Unavailable {
        /// Transport detail.
        message: String,
    },
}

/// Service applying patches and pushing the resulting commits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommitCreator: Send + Sync {
    /// Applies the request's patch on its base commit and pushes the result.
    async fn create_commit_from_patch(
        &self,
        request: CreateCommitFromPatchRequest,
    ) -> Result<CreateCommitFromPatchResponse, CommitError>;
}

/// Maps a commit failure onto the source error taxonomy.
///
/// A patch that does not apply is terminal: retrying the same diff against
/// the same base cannot succeed.
pub(crate) fn map_commit_error(error: CommitError) -> SourceError {
    match error {
        CommitError::Git {
            repository_name,
            combined_output,
            ..
        } if combined_output.contains(PATCH_DOES_NOT_APPLY) => SourceError::PatchDoesNotApply {
            repo: repository_name,
        },
        CommitError::Git {
            repository_name,
            internal_error,
            command,
            combined_output,
        } => SourceError::CommitFailed {
            repo: repository_name,
            message: format!(
                "{internal_error}\n```\n$ {command}\n{}\n```",
                combined_output.trim()
            ),
        },
        CommitError::Unavailable { message } => SourceError::Transient { message },
    }
}
