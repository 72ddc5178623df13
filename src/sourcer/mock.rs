//! Programmable [`SourcerStore`] test double.

use async_trait::async_trait;

use super::SourcerStore;
use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::stub::Stub;
use crate::types::{BatchChange, Changeset, ExternalService, Repo};

/// Result type of the credential lookups.
pub type CredentialResult = Result<Option<Authenticator>, SourceError>;

/// Test double for [`SourcerStore`], one [`Stub`] per method.
pub struct MockSourcerStore {
    /// Stub for [`SourcerStore::get_batch_change`].
    pub get_batch_change: Stub<i64, Result<BatchChange, SourceError>>,
    /// Stub for [`SourcerStore::get_user_credential`].
    pub get_user_credential: Stub<(i32, Repo), CredentialResult>,
    /// Stub for [`SourcerStore::get_site_credential`].
    pub get_site_credential: Stub<Repo, CredentialResult>,
    /// Stub for [`SourcerStore::list_external_services`].
    pub list_external_services: Stub<Repo, Result<Vec<ExternalService>, SourceError>>,
    /// Stub for [`SourcerStore::get_changeset_by_branch`].
    pub get_changeset_by_branch: Stub<(Repo, String), Result<Option<Changeset>, SourceError>>,
    /// Stub for [`SourcerStore::mark_repo_archived`].
    pub mark_repo_archived: Stub<Repo, Result<(), SourceError>>,
}

impl MockSourcerStore {
    /// Creates a store that finds nothing unless configured otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            get_batch_change: Stub::lenient("SourcerStore::get_batch_change", |_| {
                Ok(BatchChange::default())
            }),
            get_user_credential: Stub::lenient("SourcerStore::get_user_credential", |_| Ok(None)),
            get_site_credential: Stub::lenient("SourcerStore::get_site_credential", |_| Ok(None)),
            list_external_services: Stub::lenient("SourcerStore::list_external_services", |_| {
                Ok(Vec::new())
            }),
            get_changeset_by_branch: Stub::lenient(
                "SourcerStore::get_changeset_by_branch",
                |_| Ok(None),
            ),
            mark_repo_archived: Stub::lenient("SourcerStore::mark_repo_archived", |_| Ok(())),
        }
    }

    /// Creates a store that panics on any call no hook handles.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            get_batch_change: Stub::strict("SourcerStore::get_batch_change"),
            get_user_credential: Stub::strict("SourcerStore::get_user_credential"),
            get_site_credential: Stub::strict("SourcerStore::get_site_credential"),
            list_external_services: Stub::strict("SourcerStore::list_external_services"),
            get_changeset_by_branch: Stub::strict("SourcerStore::get_changeset_by_branch"),
            mark_repo_archived: Stub::strict("SourcerStore::mark_repo_archived"),
        }
    }
}

impl Default for MockSourcerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourcerStore for MockSourcerStore {
    async fn get_batch_change(&self, mut id: i64) -> Result<BatchChange, SourceError> {
        self.get_batch_change.call(&mut id)
    }

    async fn get_user_credential(&self, user_id: i32, repo: &Repo) -> CredentialResult {
        self.get_user_credential.call(&mut (user_id, repo.clone()))
    }

    async fn get_site_credential(&self, repo: &Repo) -> CredentialResult {
        self.get_site_credential.call(&mut repo.clone())
    }

    async fn list_external_services(
        &self,
        repo: &Repo,
    ) -> Result<Vec<ExternalService>, SourceError> {
        self.list_external_services.call(&mut repo.clone())
    }

    async fn get_changeset_by_branch(
        &self,
        repo: &Repo,
        head_ref: &str,
    ) -> Result<Option<Changeset>, SourceError> {
        self.get_changeset_by_branch
            .call(&mut (repo.clone(), head_ref.to_owned()))
    }

    async fn mark_repo_archived(&self, repo: &Repo) -> Result<(), SourceError> {
        self.mark_repo_archived.call(&mut repo.clone())
    }
}
