use crate::types::{
    ChangesetSpec, CreateCommitFromPatchRequest, PatchCommitInfo, PushConfig, Repo,
};

/// Builds the commit-from-patch request most code hosts use.
///
/// The patch is applied to the spec's base revision, committed with the
/// spec's message and author at the spec's creation time, and pushed to the
/// head ref. Hosts that push to a different ref override
/// [`ChangesetSource::build_commit_opts`](super::ChangesetSource::build_commit_opts)
/// and adjust the result.
#[must_use]
pub fn build_commit_opts_common(
    repo: &Repo,
    spec: &ChangesetSpec,
    push: &PushConfig,
) -> CreateCommitFromPatchRequest {
    CreateCommitFromPatchRequest {
        repo: repo.name.clone(),
        base_commit: spec.base_rev.clone(),
        patch: spec.diff.clone(),
        target_ref: spec.head_ref.clone(),
        unique_ref: false,
        commit_info: PatchCommitInfo {
            messages: vec![spec.commit_message.clone()],
            author_name: spec.commit_author_name.clone(),
            author_email: spec.commit_author_email.clone(),
            date: spec.created_at,
        },
        push: Some(push.clone()),
        push_ref: None,
        git_apply_args: Vec::new(),
    }
}
