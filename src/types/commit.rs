//! Commit-from-patch requests handed to the commit creation service.

use chrono::{DateTime, Utc};

/// How git should push to the remote.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct PushConfig {
    /// Remote URL, with credentials embedded for HTTPS remotes.
    pub remote_url: String,
    /// SSH private key for SSH remotes.
    pub private_key: String,
    /// Passphrase for the SSH private key.
    pub passphrase: String,
}

impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("remote_url", &redact_userinfo(&self.remote_url))
            .field("private_key", &redacted(&self.private_key))
            .field("passphrase", &redacted(&self.passphrase))
            .finish()
    }
}

const fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

fn redact_userinfo(remote_url: &str) -> String {
    match url::Url::parse(remote_url) {
        Ok(mut parsed) if !parsed.username().is_empty() => {
            let _user = parsed.set_username("redacted");
            let _password = parsed.set_password(None);
            parsed.to_string()
        }
        _ => remote_url.to_owned(),
    }
}

/// Commit metadata for a commit created from a patch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchCommitInfo {
    /// Commit message paragraphs.
    pub messages: Vec<String>,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Author and committer date.
    pub date: DateTime<Utc>,
}

/// Request to apply a patch on top of a base commit and push the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateCommitFromPatchRequest {
    /// Repository name.
    pub repo: String,
    /// Commit the patch applies to.
    pub base_commit: String,
    /// Unified diff.
    pub patch: Vec<u8>,
    /// Ref to update with the new commit.
    pub target_ref: String,
    /// Whether to suffix the target ref to make it unique.
    pub unique_ref: bool,
    /// Commit metadata.
    pub commit_info: PatchCommitInfo,
    /// Push configuration; `None` keeps the commit local.
    pub push: Option<PushConfig>,
    /// Ref to push to when it differs from the target ref.
    pub push_ref: Option<String>,
    /// Extra arguments for `git apply`.
    pub git_apply_args: Vec<String>,
}

/// Result of creating a commit from a patch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateCommitFromPatchResponse {
    /// Revision of the created commit.
    pub rev: String,
    /// Changelist id for hosts that assign one on push.
    pub changelist_id: Option<String>,
}
