//! Picks and authenticates the changeset source for a repository.
//!
//! The [`Sourcer`] builds a source for the newest external service syncing a
//! repository, then decides which credential it acts with:
//!
//! - Changesets created by a batch change use the credential of the user who
//!   last applied the batch change, falling back to the site credential.
//! - Imported changesets use the site credential. Without one, the external
//!   service's own credential is used after it has been validated, unless
//!   that fallback is disabled.

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::sources::ChangesetSource;
use crate::types::{BatchChange, Changeset, ExternalService, Repo};

/// Storage the sourcer reads batch changes and credentials from, and the
/// executor consults before pushing.
///
/// Credentials are scoped to the repository's code host, identified by
/// [`Repo::external_repo`]. Lookups return `Ok(None)` when nothing matches.
#[async_trait]
pub trait SourcerStore: Send + Sync {
    /// Loads the batch change with the given id.
    async fn get_batch_change(&self, id: i64) -> Result<BatchChange, SourceError>;

    /// Loads the credential `user_id` stored for the repository's code host.
    async fn get_user_credential(
        &self,
        user_id: i32,
        repo: &Repo,
    ) -> Result<Option<Authenticator>, SourceError>;

    /// Loads the site-wide credential for the repository's code host.
    async fn get_site_credential(&self, repo: &Repo) -> Result<Option<Authenticator>, SourceError>;

    /// Lists the external services syncing the repository.
    async fn list_external_services(
        &self,
        repo: &Repo,
    ) -> Result<Vec<ExternalService>, SourceError>;

    /// Finds the changeset published from `head_ref` in the repository, on
    /// the repository's code host.
    async fn get_changeset_by_branch(
        &self,
        repo: &Repo,
        head_ref: &str,
    ) -> Result<Option<Changeset>, SourceError>;

    /// Records that the repository was archived on its code host.
    async fn mark_repo_archived(&self, repo: &Repo) -> Result<(), SourceError>;
}

/// Builds an unauthenticated-by-user source for an external service.
///
/// The returned source acts with the external service's own credential.
pub type SourceFactory =
    Arc<dyn Fn(&ExternalService) -> Result<Arc<dyn ChangesetSource>, SourceError> + Send + Sync>;

/// Creates changeset sources with the right credential for each changeset.
#[derive(Clone)]
pub struct Sourcer {
    factory: SourceFactory,
    external_service_fallback: bool,
}

impl fmt::Debug for Sourcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sourcer")
            .field("external_service_fallback", &self.external_service_fallback)
            .finish_non_exhaustive()
    }
}

impl Sourcer {
    /// Creates a sourcer building sources with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&ExternalService) -> Result<Arc<dyn ChangesetSource>, SourceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Arc::new(factory),
            external_service_fallback: true,
        }
    }

    /// Enables or disables the external service credential fallback for
    /// imported changesets.
    #[must_use]
    pub const fn with_external_service_fallback(mut self, enabled: bool) -> Self {
        self.external_service_fallback = enabled;
        self
    }

    /// Builds a source for `service`, switching to `authenticator` when given.
    ///
    /// # Errors
    ///
    /// Propagates factory errors and [`SourceError::UnsupportedAuthenticator`].
    pub fn for_external_service(
        &self,
        service: &ExternalService,
        authenticator: Option<Authenticator>,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        let source = (self.factory)(service)?;
        match authenticator {
            Some(credential) => source.with_authenticator(credential),
            None => Ok(source),
        }
    }

    /// Builds a source for the newest external service syncing `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoExternalService`] when no service syncs the
    /// repository, and propagates store and factory errors.
    pub async fn for_repo(
        &self,
        store: &dyn SourcerStore,
        repo: &Repo,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        let services = store.list_external_services(repo).await?;
        let newest = services
            .iter()
            .max_by_key(|service| service.id)
            .ok_or_else(|| SourceError::NoExternalService {
                repo: repo.name.clone(),
            })?;
        tracing::debug!(
            "using external service {} for {}",
            newest.urn(),
            repo.name
        );
        self.for_external_service(newest, None)
    }

    /// Builds a source for `repo` authenticated for acting on `changeset`.
    ///
    /// # Errors
    ///
    /// - [`SourceError::MissingCredentials`] when no credential applies.
    /// - Whatever `validate_authenticator` returns when an imported changeset
    ///   falls back to the external service's credential.
    /// - Store, factory, and authenticator errors.
    pub async fn for_changeset(
        &self,
        store: &dyn SourcerStore,
        changeset: &Changeset,
        repo: &Repo,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        let source = self.for_repo(store, repo).await?;

        if changeset.is_imported() {
            return self.authenticate_imported(store, source, repo).await;
        }

        let batch_change = store
            .get_batch_change(changeset.owned_by_batch_change_id)
            .await?;
        if let Some(credential) = store
            .get_user_credential(batch_change.last_applier_id, repo)
            .await?
        {
            tracing::debug!(
                "using credential of user {} for changeset {}",
                batch_change.last_applier_id,
                changeset.id
            );
            return source.with_authenticator(credential);
        }

        match store.get_site_credential(repo).await? {
            Some(credential) => {
                tracing::debug!("using site credential for changeset {}", changeset.id);
                source.with_authenticator(credential)
            }
            None => Err(SourceError::MissingCredentials {
                repo: repo.name.clone(),
            }),
        }
    }

    async fn authenticate_imported(
        &self,
        store: &dyn SourcerStore,
        source: Arc<dyn ChangesetSource>,
        repo: &Repo,
    ) -> Result<Arc<dyn ChangesetSource>, SourceError> {
        if let Some(credential) = store.get_site_credential(repo).await? {
            return source.with_authenticator(credential);
        }

        if !self.external_service_fallback {
            return Err(SourceError::MissingCredentials {
                repo: repo.name.clone(),
            });
        }

        tracing::warn!(
            "no site credential for {}, falling back to the external service credential",
            repo.name
        );
        source.validate_authenticator().await?;
        Ok(source)
    }
}
