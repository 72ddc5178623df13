//! Data model shared by changeset sources and their callers.
//!
//! Repositories are read-only from a source's point of view. Changesets are
//! owned by the caller and lent to sources, which refresh their synced state
//! from the code host.

mod changeset;
mod commit;

pub use changeset::{
    BatchChange, Changeset, ChangesetMetadata, ChangesetSpec, ExternalState, PublicationState,
    SourceChangeset, USER_FORK_NAMESPACE,
};
pub use commit::{
    CreateCommitFromPatchRequest, CreateCommitFromPatchResponse, PatchCommitInfo, PushConfig,
};

use std::fmt;
use std::str::FromStr;

use crate::error::SourceError;

/// Code hosts a changeset source can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeHostKind {
    /// GitHub.com or GitHub Enterprise.
    #[default]
    GitHub,
    /// GitLab.com or self-managed GitLab.
    GitLab,
    /// Bitbucket Server / Data Center.
    BitbucketServer,
    /// Bitbucket Cloud.
    BitbucketCloud,
    /// Azure DevOps Services.
    AzureDevOps,
    /// Gerrit.
    Gerrit,
}

impl CodeHostKind {
    /// Service type string used in external repo specs.
    #[must_use]
    pub const fn service_type(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::BitbucketServer => "bitbucketServer",
            Self::BitbucketCloud => "bitbucketCloud",
            Self::AzureDevOps => "azuredevops",
            Self::Gerrit => "gerrit",
        }
    }

    /// Whether changesets on this host can be published from a fork.
    #[must_use]
    pub const fn supports_forking(self) -> bool {
        !matches!(self, Self::Gerrit)
    }

    /// Whether this host has a draft state for changesets.
    #[must_use]
    pub const fn supports_draft(self) -> bool {
        matches!(
            self,
            Self::GitHub | Self::GitLab | Self::AzureDevOps | Self::Gerrit
        )
    }
}

impl fmt::Display for CodeHostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_type())
    }
}

impl FromStr for CodeHostKind {
    type Err = SourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "bitbucketserver" => Ok(Self::BitbucketServer),
            "bitbucketcloud" => Ok(Self::BitbucketCloud),
            "azuredevops" => Ok(Self::AzureDevOps),
            "gerrit" => Ok(Self::Gerrit),
            other => Err(SourceError::Configuration {
                message: format!("unknown code host kind: {other}"),
            }),
        }
    }
}

/// Identifies a repository on its code host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalRepoSpec {
    /// Code host's identifier for the repository.
    pub id: String,
    /// Kind of code host.
    pub service_type: CodeHostKind,
    /// Base URL of the code host, e.g. `https://github.com/`.
    pub service_id: String,
}

/// A clone URL contributed by one external service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceInfo {
    /// External service URN.
    pub id: String,
    /// URL git can clone from, HTTPS or SSH.
    pub clone_url: String,
}

/// A repository on a code host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Repo {
    /// Local repository id.
    pub id: i32,
    /// Full repository name, e.g. `github.com/owner/repo`.
    pub name: String,
    /// Repository URI without scheme.
    pub uri: String,
    /// Whether the repository is private.
    pub private: bool,
    /// Whether the code host reports the repository as archived.
    pub archived: bool,
    /// Code host coordinates.
    pub external_repo: ExternalRepoSpec,
    /// Clone URLs, one per external service syncing the repository.
    pub sources: Vec<SourceInfo>,
}

impl Repo {
    /// Ids of the external services that sync this repository.
    #[must_use]
    pub fn external_service_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.id.as_str()).collect()
    }
}

/// An external service connection that repositories are synced from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalService {
    /// Local id; newer services have larger ids.
    pub id: i64,
    /// Code host kind.
    pub kind: CodeHostKind,
    /// Name shown to users.
    pub display_name: String,
    /// Base URL of the code host.
    pub url: String,
}

impl ExternalService {
    /// URN used as the key in [`Repo::sources`].
    #[must_use]
    pub fn urn(&self) -> String {
        format!("extsvc:{}:{}", self.kind.service_type(), self.id)
    }
}

#[cfg(test)]
mod tests;
