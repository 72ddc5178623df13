use super::ChangesetSource;
use crate::error::SourceError;
use crate::types::{Changeset, ChangesetSpec, Repo};

/// Resolves the repository the changeset's branch is pushed to.
///
/// This is `target` unless the changeset was published from a fork or its
/// spec asks for one. A changeset that already lives on a fork keeps using
/// that fork even if the spec would now fork somewhere else.
///
/// # Errors
///
/// Returns [`SourceError::CannotFork`] when a fork is needed but the source
/// cannot fork, and [`SourceError::Fork`] when the source fails to look up or
/// create the fork.
pub async fn get_remote_repo(
    source: &dyn ChangesetSource,
    target: &Repo,
    changeset: &Changeset,
    spec: Option<&ChangesetSpec>,
) -> Result<Repo, SourceError> {
    let has_recorded_fork = !changeset.external_fork_namespace.is_empty();
    let spec_wants_fork = spec.is_some_and(ChangesetSpec::is_fork);
    if !has_recorded_fork && !spec_wants_fork {
        return Ok(target.clone());
    }

    let forkable = source.as_forkable().ok_or(SourceError::CannotFork)?;

    let fork = if has_recorded_fork {
        let name = Some(changeset.external_fork_name.as_str()).filter(|name| !name.is_empty());
        forkable
            .get_fork(target, Some(&changeset.external_fork_namespace), name)
            .await
    } else {
        let namespace = spec.and_then(ChangesetSpec::fork_target_namespace);
        forkable.get_fork(target, namespace, None).await
    };

    fork.map_err(|error| {
        tracing::warn!("getting fork of {} failed: {error}", target.name);
        SourceError::Fork {
            message: error.to_string(),
        }
    })
}
