//! Changesets, their specs, and the view of a changeset handed to sources.

use chrono::{DateTime, Utc};

use super::Repo;

/// Fork namespace placeholder meaning "the authenticated user's namespace".
pub const USER_FORK_NAMESPACE: &str = "<user>";

/// State of the changeset as reported by the code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalState {
    /// Opened as a draft.
    Draft,
    /// Open for review.
    Open,
    /// Closed without merging.
    Closed,
    /// Merged.
    Merged,
    /// Deleted on the code host.
    Deleted,
    /// The repository was archived, so the changeset can no longer change.
    ReadOnly,
}

/// Whether the changeset exists on the code host yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicationState {
    /// Only exists locally.
    #[default]
    Unpublished,
    /// Created on the code host.
    Published,
}

/// Fields the code host last reported for a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangesetMetadata {
    /// Remote title.
    pub title: String,
    /// Remote description.
    pub body: String,
    /// Branch the changeset merges into.
    pub base_ref: String,
    /// Branch holding the changes.
    pub head_ref: String,
}

/// A pull, merge, or change request tracked across its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Changeset {
    /// Local id.
    pub id: i64,
    /// Repository the changeset targets.
    pub repo_id: i32,
    /// Owning batch change, `0` for imported changesets.
    pub owned_by_batch_change_id: i64,
    /// Spec the changeset was last applied from.
    pub current_spec_id: i64,
    /// Code host identifier, e.g. the pull request number.
    pub external_id: String,
    /// Head branch on the code host.
    pub external_branch: String,
    /// Namespace of the fork the changeset was published from.
    pub external_fork_namespace: String,
    /// Name of the fork the changeset was published from.
    pub external_fork_name: String,
    /// State reported by the code host, if synced.
    pub external_state: Option<ExternalState>,
    /// Whether the changeset was created on the code host.
    pub publication_state: PublicationState,
    /// Last synced remote fields.
    pub metadata: Option<ChangesetMetadata>,
    /// When the remote state was last loaded.
    pub synced_at: Option<DateTime<Utc>>,
    /// Whether the changeset is queued to be closed.
    pub closing: bool,
    /// Whether the changeset is queued to be archived in its batch change.
    pub archive: bool,
    /// Whether the changeset is archived in its batch change.
    pub archived: bool,
    /// When the changeset was detached from its last batch change.
    pub detached_at: Option<DateTime<Utc>>,
}

impl Changeset {
    /// Imported changesets are not owned by any batch change.
    #[must_use]
    pub const fn is_imported(&self) -> bool {
        self.owned_by_batch_change_id == 0
    }

    /// Whether the changeset was created on the code host.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self.publication_state, PublicationState::Published)
    }

    /// Whether the code host reported the changeset as deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self.external_state, Some(ExternalState::Deleted))
    }

    /// Whether the changeset no longer belongs to any batch change.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached_at.is_some()
    }

    /// Marks the changeset as deleted on the code host.
    pub const fn set_deleted(&mut self) {
        self.external_state = Some(ExternalState::Deleted);
    }

    /// Whether the changeset can be closed on the code host.
    #[must_use]
    pub const fn is_closeable(&self) -> bool {
        matches!(
            self.external_state,
            Some(ExternalState::Open | ExternalState::Draft)
        )
    }

    /// Records the remote state reported by a code host.
    pub fn sync(&mut self, state: ExternalState, metadata: ChangesetMetadata) {
        self.external_state = Some(state);
        self.external_branch.clone_from(&metadata.head_ref);
        self.metadata = Some(metadata);
        self.synced_at = Some(Utc::now());
    }
}

/// Desired state of a changeset, produced from a batch spec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangesetSpec {
    /// Local id.
    pub id: i64,
    /// Changeset title.
    pub title: String,
    /// Changeset description.
    pub body: String,
    /// Branch to merge into.
    pub base_ref: String,
    /// Commit the diff applies to.
    pub base_rev: String,
    /// Branch to push the commit to.
    pub head_ref: String,
    /// Unified diff to commit.
    pub diff: Vec<u8>,
    /// Commit message.
    pub commit_message: String,
    /// Commit author name.
    pub commit_author_name: String,
    /// Commit author email.
    pub commit_author_email: String,
    /// Namespace to fork into, [`USER_FORK_NAMESPACE`] for the user's own.
    pub fork_namespace: Option<String>,
    /// When the spec was created; used as the commit date.
    pub created_at: DateTime<Utc>,
}

impl ChangesetSpec {
    /// Whether the changeset should be pushed to a fork.
    #[must_use]
    pub const fn is_fork(&self) -> bool {
        self.fork_namespace.is_some()
    }

    /// Namespace to pass when forking; `None` means the user's namespace.
    #[must_use]
    pub fn fork_target_namespace(&self) -> Option<&str> {
        self.fork_namespace
            .as_deref()
            .filter(|namespace| *namespace != USER_FORK_NAMESPACE)
    }
}

/// Batch change owning changesets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchChange {
    /// Local id.
    pub id: i64,
    /// Batch change name.
    pub name: String,
    /// User who last applied the batch spec.
    pub last_applier_id: i32,
}

/// A changeset together with what a source needs to act on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceChangeset {
    /// Desired title.
    pub title: String,
    /// Desired description.
    pub body: String,
    /// Desired base branch.
    pub base_ref: String,
    /// Head branch.
    pub head_ref: String,
    /// Repository the head branch lives in (the fork, when forking).
    pub remote_repo: Repo,
    /// Repository the changeset is opened against.
    pub target_repo: Repo,
    /// The changeset record the source refreshes.
    pub changeset: Changeset,
}

impl SourceChangeset {
    /// Builds the source view of a changeset with the desired fields from a spec.
    #[must_use]
    pub fn from_spec(
        spec: &ChangesetSpec,
        body: String,
        remote_repo: Repo,
        target_repo: Repo,
        changeset: Changeset,
    ) -> Self {
        Self {
            title: spec.title.clone(),
            body,
            base_ref: spec.base_ref.clone(),
            head_ref: spec.head_ref.clone(),
            remote_repo,
            target_repo,
            changeset,
        }
    }

    /// Whether the remote title, body, or base branch differs from the desired ones.
    #[must_use]
    pub fn is_outdated(&self) -> bool {
        self.changeset.metadata.as_ref().is_none_or(|remote| {
            remote.title != self.title
                || remote.body != self.body
                || remote.base_ref != self.base_ref
        })
    }
}
