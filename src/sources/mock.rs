//! Programmable test doubles for the changeset source traits.
//!
//! Every trait method is backed by a public [`Stub`] field of the same name.
//! Lenient mocks (`new`) answer unconfigured calls with zero values: `Ok(())`,
//! `Ok(false)`, default records, and a fresh lenient mock from
//! `with_authenticator`. Strict mocks (`strict`) panic instead, which catches
//! calls a test did not expect.
//!
//! ```
//! use changeset_sources::sources::mock::MockChangesetSource;
//! use changeset_sources::SourceError;
//!
//! let source = MockChangesetSource::strict();
//! source.merge_changeset.push_return(Err(SourceError::Unmergeable {
//!     message: "merge conflict".to_owned(),
//! }));
//! assert_eq!(source.merge_changeset.pending_hooks(), 1);
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ArchivableChangesetSource, ChangesetSource, DraftChangesetSource, ForkableChangesetSource,
};
use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::stub::Stub;
use crate::types::{
    Changeset, ChangesetSpec, CreateCommitFromPatchRequest, PushConfig, Repo, SourceChangeset,
};

/// Arguments recorded by [`MockChangesetSource::build_commit_opts`].
pub type BuildCommitOptsArgs = (Repo, Changeset, ChangesetSpec, PushConfig);

/// Result type of a stubbed changeset operation.
pub type OperationResult = Result<(), SourceError>;

/// Result type of [`ChangesetSource::with_authenticator`].
pub type WithAuthenticatorResult = Result<Arc<dyn ChangesetSource>, SourceError>;

/// Test double for [`ChangesetSource`].
pub struct MockChangesetSource {
    /// Stub for [`ChangesetSource::build_commit_opts`].
    pub build_commit_opts: Stub<BuildCommitOptsArgs, CreateCommitFromPatchRequest>,
    /// Stub for [`ChangesetSource::create_changeset`].
    pub create_changeset: Stub<SourceChangeset, Result<bool, SourceError>>,
    /// Stub for [`ChangesetSource::close_changeset`].
    pub close_changeset: Stub<SourceChangeset, OperationResult>,
    /// Stub for [`ChangesetSource::reopen_changeset`].
    pub reopen_changeset: Stub<SourceChangeset, OperationResult>,
    /// Stub for [`ChangesetSource::update_changeset`].
    pub update_changeset: Stub<SourceChangeset, OperationResult>,
    /// Stub for [`ChangesetSource::merge_changeset`].
    pub merge_changeset: Stub<(SourceChangeset, bool), OperationResult>,
    /// Stub for [`ChangesetSource::load_changeset`].
    pub load_changeset: Stub<SourceChangeset, OperationResult>,
    /// Stub for [`ChangesetSource::create_comment`].
    pub create_comment: Stub<(SourceChangeset, String), OperationResult>,
    /// Stub for [`ChangesetSource::gitserver_push_config`].
    pub gitserver_push_config: Stub<Repo, Result<PushConfig, SourceError>>,
    /// Stub for [`ChangesetSource::validate_authenticator`].
    pub validate_authenticator: Stub<(), OperationResult>,
    /// Stub for [`ChangesetSource::with_authenticator`].
    pub with_authenticator: Stub<Authenticator, WithAuthenticatorResult>,
}

impl MockChangesetSource {
    /// Creates a mock whose unconfigured methods return zero values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            build_commit_opts: Stub::lenient("ChangesetSource::build_commit_opts", |_| {
                CreateCommitFromPatchRequest::default()
            }),
            create_changeset: Stub::lenient("ChangesetSource::create_changeset", |_| Ok(false)),
            close_changeset: Stub::lenient("ChangesetSource::close_changeset", |_| Ok(())),
            reopen_changeset: Stub::lenient("ChangesetSource::reopen_changeset", |_| Ok(())),
            update_changeset: Stub::lenient("ChangesetSource::update_changeset", |_| Ok(())),
            merge_changeset: Stub::lenient("ChangesetSource::merge_changeset", |_| Ok(())),
            load_changeset: Stub::lenient("ChangesetSource::load_changeset", |_| Ok(())),
            create_comment: Stub::lenient("ChangesetSource::create_comment", |_| Ok(())),
            gitserver_push_config: Stub::lenient("ChangesetSource::gitserver_push_config", |_| {
                Ok(PushConfig::default())
            }),
            validate_authenticator: Stub::lenient("ChangesetSource::validate_authenticator", |_| {
                Ok(())
            }),
            with_authenticator: Stub::lenient("ChangesetSource::with_authenticator", |_| {
                Ok(Arc::new(Self::new()) as Arc<dyn ChangesetSource>)
            }),
        }
    }

    /// Creates a mock that panics on any call no hook handles.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            build_commit_opts: Stub::strict("ChangesetSource::build_commit_opts"),
            create_changeset: Stub::strict("ChangesetSource::create_changeset"),
            close_changeset: Stub::strict("ChangesetSource::close_changeset"),
            reopen_changeset: Stub::strict("ChangesetSource::reopen_changeset"),
            update_changeset: Stub::strict("ChangesetSource::update_changeset"),
            merge_changeset: Stub::strict("ChangesetSource::merge_changeset"),
            load_changeset: Stub::strict("ChangesetSource::load_changeset"),
            create_comment: Stub::strict("ChangesetSource::create_comment"),
            gitserver_push_config: Stub::strict("ChangesetSource::gitserver_push_config"),
            validate_authenticator: Stub::strict("ChangesetSource::validate_authenticator"),
            with_authenticator: Stub::strict("ChangesetSource::with_authenticator"),
        }
    }
}

impl Default for MockChangesetSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangesetSource for MockChangesetSource {
    fn build_commit_opts(
        &self,
        repo: &Repo,
        changeset: &Changeset,
        spec: &ChangesetSpec,
        push: &PushConfig,
    ) -> CreateCommitFromPatchRequest {
        self.build_commit_opts.call(&mut (
            repo.clone(),
            changeset.clone(),
            spec.clone(),
            push.clone(),
        ))
    }

    async fn create_changeset(&self, changeset: &mut SourceChangeset) -> Result<bool, SourceError> {
        self.create_changeset.call(changeset)
    }

    async fn close_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
        self.close_changeset.call(changeset)
    }

    async fn reopen_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
        self.reopen_changeset.call(changeset)
    }

    async fn update_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
        self.update_changeset.call(changeset)
    }

    async fn merge_changeset(
        &self,
        changeset: &mut SourceChangeset,
        squash: bool,
    ) -> OperationResult {
        let mut args = (changeset.clone(), squash);
        let result = self.merge_changeset.call(&mut args);
        *changeset = args.0;
        result
    }

    async fn load_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
        self.load_changeset.call(changeset)
    }

    async fn create_comment(&self, changeset: &SourceChangeset, body: &str) -> OperationResult {
        self.create_comment
            .call(&mut (changeset.clone(), body.to_owned()))
    }

    fn gitserver_push_config(&self, repo: &Repo) -> Result<PushConfig, SourceError> {
        self.gitserver_push_config.call(&mut repo.clone())
    }

    async fn validate_authenticator(&self) -> OperationResult {
        self.validate_authenticator.call(&mut ())
    }

    fn with_authenticator(&self, authenticator: Authenticator) -> WithAuthenticatorResult {
        let mut args = authenticator;
        self.with_authenticator.call(&mut args)
    }
}

/// Arguments recorded by [`MockForkableChangesetSource::get_fork`]:
/// target repository, namespace, and fork name.
pub type GetForkArgs = (Repo, Option<String>, Option<String>);

/// Forwards every [`ChangesetSource`] method to the wrapped `source` mock and
/// advertises one optional capability.
macro_rules! delegate_changeset_source {
    ($mock:ty, $capability:ident, $capability_trait:ident) => {
        #[async_trait]
        impl ChangesetSource for $mock {
            fn build_commit_opts(
                &self,
                repo: &Repo,
                changeset: &Changeset,
                spec: &ChangesetSpec,
                push: &PushConfig,
            ) -> CreateCommitFromPatchRequest {
                self.source.build_commit_opts(repo, changeset, spec, push)
            }

            async fn create_changeset(
                &self,
                changeset: &mut SourceChangeset,
            ) -> Result<bool, SourceError> {
                self.source.create_changeset(changeset).await
            }

            async fn close_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
                self.source.close_changeset(changeset).await
            }

            async fn reopen_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
                self.source.reopen_changeset(changeset).await
            }

            async fn update_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
                self.source.update_changeset(changeset).await
            }

            async fn merge_changeset(
                &self,
                changeset: &mut SourceChangeset,
                squash: bool,
            ) -> OperationResult {
                self.source.merge_changeset(changeset, squash).await
            }

            async fn load_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
                self.source.load_changeset(changeset).await
            }

            async fn create_comment(
                &self,
                changeset: &SourceChangeset,
                body: &str,
            ) -> OperationResult {
                self.source.create_comment(changeset, body).await
            }

            fn gitserver_push_config(&self, repo: &Repo) -> Result<PushConfig, SourceError> {
                self.source.gitserver_push_config(repo)
            }

            async fn validate_authenticator(&self) -> OperationResult {
                self.source.validate_authenticator().await
            }

            fn with_authenticator(&self, authenticator: Authenticator) -> WithAuthenticatorResult {
                self.source.with_authenticator(authenticator)
            }

            fn $capability(&self) -> Option<&dyn $capability_trait> {
                Some(self)
            }
        }
    };
}

/// Test double for [`ForkableChangesetSource`].
pub struct MockForkableChangesetSource {
    /// Stubs for the base [`ChangesetSource`] methods.
    pub source: MockChangesetSource,
    /// Stub for [`ForkableChangesetSource::get_fork`].
    pub get_fork: Stub<GetForkArgs, Result<Repo, SourceError>>,
}

impl MockForkableChangesetSource {
    /// Creates a mock whose unconfigured methods return zero values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: MockChangesetSource::new(),
            get_fork: Stub::lenient("ForkableChangesetSource::get_fork", |_| {
                Ok(Repo::default())
            }),
        }
    }

    /// Creates a mock that panics on any call no hook handles.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            source: MockChangesetSource::strict(),
            get_fork: Stub::strict("ForkableChangesetSource::get_fork"),
        }
    }
}

impl Default for MockForkableChangesetSource {
    fn default() -> Self {
        Self::new()
    }
}

delegate_changeset_source!(MockForkableChangesetSource, as_forkable, ForkableChangesetSource);

#[async_trait]
impl ForkableChangesetSource for MockForkableChangesetSource {
    async fn get_fork(
        &self,
        target: &Repo,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Repo, SourceError> {
        self.get_fork.call(&mut (
            target.clone(),
            namespace.map(str::to_owned),
            name.map(str::to_owned),
        ))
    }
}

/// Test double for [`DraftChangesetSource`].
pub struct MockDraftChangesetSource {
    /// Stubs for the base [`ChangesetSource`] methods.
    pub source: MockChangesetSource,
    /// Stub for [`DraftChangesetSource::create_draft_changeset`].
    pub create_draft_changeset: Stub<SourceChangeset, Result<bool, SourceError>>,
    /// Stub for [`DraftChangesetSource::undraft_changeset`].
    pub undraft_changeset: Stub<SourceChangeset, OperationResult>,
}

impl MockDraftChangesetSource {
    /// Creates a mock whose unconfigured methods return zero values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: MockChangesetSource::new(),
            create_draft_changeset: Stub::lenient(
                "DraftChangesetSource::create_draft_changeset",
                |_| Ok(false),
            ),
            undraft_changeset: Stub::lenient("DraftChangesetSource::undraft_changeset", |_| {
                Ok(())
            }),
        }
    }

    /// Creates a mock that panics on any call no hook handles.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            source: MockChangesetSource::strict(),
            create_draft_changeset: Stub::strict("DraftChangesetSource::create_draft_changeset"),
            undraft_changeset: Stub::strict("DraftChangesetSource::undraft_changeset"),
        }
    }
}

impl Default for MockDraftChangesetSource {
    fn default() -> Self {
        Self::new()
    }
}

delegate_changeset_source!(MockDraftChangesetSource, as_draft, DraftChangesetSource);

#[async_trait]
impl DraftChangesetSource for MockDraftChangesetSource {
    async fn create_draft_changeset(
        &self,
        changeset: &mut SourceChangeset,
    ) -> Result<bool, SourceError> {
        self.create_draft_changeset.call(changeset)
    }

    async fn undraft_changeset(&self, changeset: &mut SourceChangeset) -> OperationResult {
        self.undraft_changeset.call(changeset)
    }
}

/// Test double for [`ArchivableChangesetSource`].
pub struct MockArchivableChangesetSource {
    /// Stubs for the base [`ChangesetSource`] methods.
    pub source: MockChangesetSource,
    /// Stub for [`ArchivableChangesetSource::is_archived_push_error`],
    /// recording the combined output it was asked about.
    pub is_archived_push_error: Stub<String, bool>,
}

impl MockArchivableChangesetSource {
    /// Creates a mock whose unconfigured methods return zero values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: MockChangesetSource::new(),
            is_archived_push_error: Stub::lenient(
                "ArchivableChangesetSource::is_archived_push_error",
                |_| false,
            ),
        }
    }

    /// Creates a mock that panics on any call no hook handles.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            source: MockChangesetSource::strict(),
            is_archived_push_error: Stub::strict(
                "ArchivableChangesetSource::is_archived_push_error",
            ),
        }
    }
}

impl Default for MockArchivableChangesetSource {
    fn default() -> Self {
        Self::new()
    }
}

delegate_changeset_source!(
    MockArchivableChangesetSource,
    as_archivable,
    ArchivableChangesetSource
);

impl ArchivableChangesetSource for MockArchivableChangesetSource {
    fn is_archived_push_error(&self, combined_output: &str) -> bool {
        self.is_archived_push_error
            .call(&mut combined_output.to_owned())
    }
}
