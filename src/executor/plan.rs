//! Reconciler operations and the order they run in.

use std::fmt;

/// One step the reconciler wants applied to a changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Refresh the changeset from the code host.
    Sync,
    /// Load an existing changeset and mark it published.
    Import,
    /// Commit the spec's diff and push it to the remote repository.
    Push,
    /// Open the changeset on the code host.
    Publish,
    /// Open the changeset as a draft.
    PublishDraft,
    /// Push the desired title, body, and base branch.
    Update,
    /// Mark a draft as ready for review.
    Undraft,
    /// Reopen a closed changeset.
    Reopen,
    /// Close the changeset.
    Close,
    /// Merge the changeset.
    Merge {
        /// Squash the commits into one.
        squash: bool,
    },
    /// Post a comment on the changeset.
    Comment {
        /// Comment text.
        body: String,
    },
    /// Wait between pushing a commit and syncing, so the code host has
    /// noticed the new head.
    Sleep,
    /// Release the changeset from its batch change.
    Detach,
    /// Archive the changeset in its batch change.
    Archive,
    /// Attach a detached changeset to a batch change again.
    Reattach,
}

impl Operation {
    /// Position of the operation in a plan's execution order.
    const fn rank(&self) -> u8 {
        match self {
            Self::Push | Self::Detach | Self::Archive | Self::Reattach => 0,
            Self::Import | Self::Publish | Self::PublishDraft | Self::Close => 1,
            Self::Reopen => 2,
            Self::Undraft => 3,
            Self::Update => 4,
            Self::Sleep => 5,
            Self::Sync => 6,
            Self::Merge { .. } => 7,
            Self::Comment { .. } => 8,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::Import => "import",
            Self::Push => "push",
            Self::Publish => "publish",
            Self::PublishDraft => "publish-draft",
            Self::Update => "update",
            Self::Undraft => "undraft",
            Self::Reopen => "reopen",
            Self::Close => "close",
            Self::Merge { .. } => "merge",
            Self::Comment { .. } => "comment",
            Self::Sleep => "sleep",
            Self::Detach => "detach",
            Self::Archive => "archive",
            Self::Reattach => "reattach",
        };
        f.write_str(name)
    }
}

/// The set of operations to apply to one changeset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    /// Builds a plan, dropping duplicate operations.
    #[must_use]
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        let mut plan = Self::default();
        for operation in operations {
            plan.add(operation);
        }
        plan
    }

    /// Adds an operation unless the plan already has it.
    pub fn add(&mut self, operation: Operation) {
        if !self.operations.contains(&operation) {
            self.operations.push(operation);
        }
    }

    /// Whether the plan has nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether any operation satisfies `predicate`.
    #[must_use]
    pub fn contains(&self, predicate: impl Fn(&Operation) -> bool) -> bool {
        self.operations.iter().any(predicate)
    }

    /// Operations in the order they must run.
    ///
    /// Pushing and batch change bookkeeping come first, then the changes to
    /// the remote changeset. Sleep and sync run after those so the sync sees
    /// the pushed commit. Merges and comments run last. Operations of equal
    /// rank keep the order they were added in.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&Operation> {
        let mut ordered: Vec<&Operation> = self.operations.iter().collect();
        ordered.sort_by_key(|operation| operation.rank());
        ordered
    }
}
