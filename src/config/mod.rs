//! Configuration loaded from CLI, environment, and files.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in defaults
//! 2. **Configuration file** – `.changeset-sources.toml` in the current
//!    directory, home directory, or XDG config directory
//! 3. **Environment variables** – `CHANGESET_SOURCES_CLONE_URL`,
//!    `CHANGESET_SOURCES_TOKEN`, and so on
//! 4. **Command-line arguments** – `--clone-url`/`-u`, `--token`/`-t`, ...
//!
//! # Configuration File
//!
//! ```toml
//! clone_url = "https://github.com/owner/repo"
//! code_host = "github"
//! token = "ghp_example"
//! sync_delay_seconds = 3
//! ```

use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{Authenticator, SshKeyPair};
use crate::error::SourceError;
use crate::executor::{CommitCreator, Executor};
use crate::sourcer::{Sourcer, SourcerStore};
use crate::sources::ChangesetSource;
use crate::telemetry::TelemetrySink;
use crate::types::{CodeHostKind, ExternalRepoSpec, ExternalService, Repo, SourceInfo};

const DEFAULT_SYNC_DELAY_SECONDS: u64 = 3;

/// Changeset source configuration supporting CLI, environment, and file sources.
///
/// # Example
///
/// ```no_run
/// use changeset_sources::SourcesConfig;
/// use ortho_config::OrthoConfig;
///
/// let config = SourcesConfig::load().expect("failed to load configuration");
/// let authenticator = config.authenticator().expect("credential required");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "CHANGESET_SOURCES",
    discovery(
        dotfile_name = ".changeset-sources.toml",
        config_file_name = "changeset-sources.toml",
        app_name = "changeset-sources"
    )
)]
pub struct SourcesConfig {
    /// Clone URL of the repository to push to, HTTPS or SSH.
    ///
    /// Can be provided via:
    /// - CLI: `--clone-url <URL>` or `-u <URL>`
    /// - Environment: `CHANGESET_SOURCES_CLONE_URL`
    /// - Config file: `clone_url = "..."`
    #[ortho_config(cli_short = 'u')]
    pub clone_url: Option<String>,

    /// Code host kind, e.g. `github`, `gitlab`, `bitbucketServer`.
    ///
    /// Defaults to GitHub when unset.
    #[ortho_config(cli_short = 'k')]
    pub code_host: Option<String>,

    /// OAuth or personal access token.
    ///
    /// Can be provided via:
    /// - CLI: `--token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `CHANGESET_SOURCES_TOKEN`
    /// - Config file: `token = "..."`
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// Username for basic auth credentials.
    #[ortho_config()]
    pub username: Option<String>,

    /// Password or app password for basic auth credentials.
    #[ortho_config()]
    pub password: Option<String>,

    /// PEM encoded private key used for SSH remotes.
    #[ortho_config()]
    pub ssh_private_key: Option<String>,

    /// OpenSSH public key matching `ssh_private_key`.
    #[ortho_config()]
    pub ssh_public_key: Option<String>,

    /// Passphrase for `ssh_private_key`.
    #[ortho_config()]
    pub ssh_passphrase: Option<String>,

    /// Seconds a sleep operation waits between pushing a commit and syncing
    /// the changeset.
    ///
    /// Code hosts index a freshly pushed branch asynchronously. Defaults to 3.
    #[ortho_config()]
    pub sync_delay_seconds: u64,

    /// Disables authenticating imported changesets with the external
    /// service's own credential when no site credential exists.
    ///
    /// Note: booleans are not read from the environment by `ortho_config`.
    #[ortho_config()]
    pub no_external_service_fallback: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            clone_url: None,
            code_host: None,
            token: None,
            username: None,
            password: None,
            ssh_private_key: None,
            ssh_public_key: None,
            ssh_passphrase: None,
            sync_delay_seconds: DEFAULT_SYNC_DELAY_SECONDS,
            no_external_service_fallback: false,
        }
    }
}

impl SourcesConfig {
    /// Returns the clone URL or an error if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] when no clone URL is configured.
    pub fn require_clone_url(&self) -> Result<&str, SourceError> {
        self.clone_url
            .as_deref()
            .ok_or_else(|| SourceError::Configuration {
                message: "clone URL is required (use --clone-url or -u)".to_owned(),
            })
    }

    /// Parses the configured code host kind, defaulting to GitHub.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] for an unknown kind.
    pub fn code_host_kind(&self) -> Result<CodeHostKind, SourceError> {
        self.code_host
            .as_deref()
            .map_or(Ok(CodeHostKind::default()), str::parse)
    }

    /// Builds the credential from the configured secrets.
    ///
    /// A token takes precedence over a username and password. An SSH private
    /// key, when configured, is attached to either.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] when neither a token nor a
    /// username and password are configured.
    pub fn authenticator(&self) -> Result<Authenticator, SourceError> {
        let credential = match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) => Authenticator::bearer(token.as_str()),
            (None, Some(username), Some(password)) => {
                Authenticator::basic(username.as_str(), password.as_str())
            }
            _ => {
                return Err(SourceError::Configuration {
                    message: "credential is required (use --token or --username and --password)"
                        .to_owned(),
                });
            }
        };

        Ok(match &self.ssh_private_key {
            Some(private_key) => credential.with_ssh(SshKeyPair {
                private_key: private_key.clone(),
                public_key: self.ssh_public_key.clone().unwrap_or_default(),
                passphrase: self.ssh_passphrase.clone().unwrap_or_default(),
            }),
            None => credential,
        })
    }

    /// Delay between pushing a branch and publishing the changeset.
    #[must_use]
    pub const fn sync_delay(&self) -> Duration {
        Duration::from_secs(self.sync_delay_seconds)
    }

    /// Builds a sourcer creating sources with `factory`.
    ///
    /// Imported changesets fall back to the external service's credential
    /// unless `no_external_service_fallback` is set.
    #[must_use]
    pub fn sourcer<F>(&self, factory: F) -> Sourcer
    where
        F: Fn(&ExternalService) -> Result<Arc<dyn ChangesetSource>, SourceError>
            + Send
            + Sync
            + 'static,
    {
        Sourcer::new(factory).with_external_service_fallback(!self.no_external_service_fallback)
    }

    /// Builds an executor whose sleep operations wait [`Self::sync_delay`].
    #[must_use]
    pub fn executor<'a>(
        &self,
        sourcer: &'a Sourcer,
        store: &'a dyn SourcerStore,
        commits: &'a dyn CommitCreator,
        telemetry: &'a dyn TelemetrySink,
    ) -> Executor<'a> {
        Executor::new(sourcer, store, commits, telemetry).with_sync_delay(self.sync_delay())
    }

    /// Describes the configured clone URL as a repository.
    ///
    /// The repository name is `host/path` without a trailing `.git`, for both
    /// HTTPS and scp-like SSH URLs.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] when the clone URL or code host
    /// is missing or invalid, and [`SourceError::InvalidUrl`] when the URL
    /// cannot be parsed.
    pub fn target_repo(&self) -> Result<Repo, SourceError> {
        let clone_url = self.require_clone_url()?;
        let kind = self.code_host_kind()?;
        let (host, path) = split_clone_url(clone_url)?;
        let name = format!("{host}/{path}");

        Ok(Repo {
            id: 1,
            name: name.clone(),
            uri: name,
            external_repo: ExternalRepoSpec {
                id: path,
                service_type: kind,
                service_id: format!("https://{host}/"),
            },
            sources: vec![SourceInfo {
                id: format!("extsvc:{}:1", kind.service_type()),
                clone_url: clone_url.to_owned(),
            }],
            ..Repo::default()
        })
    }
}

fn split_clone_url(clone_url: &str) -> Result<(String, String), SourceError> {
    let (host, path) = if clone_url.contains("://") {
        let parsed =
            Url::parse(clone_url).map_err(|error| SourceError::InvalidUrl(error.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SourceError::InvalidUrl("clone URL has no host".to_owned()))?
            .to_owned();
        (host, parsed.path().to_owned())
    } else {
        let (user_host, path) = clone_url
            .split_once(':')
            .ok_or_else(|| SourceError::InvalidUrl("clone URL has no path".to_owned()))?;
        let host = user_host
            .rsplit_once('@')
            .map_or(user_host, |(_, host)| host);
        (host.to_owned(), path.to_owned())
    };

    let without_slashes = path.trim_matches('/');
    let repo_path = without_slashes
        .strip_suffix(".git")
        .unwrap_or(without_slashes);
    Ok((host, repo_path.to_owned()))
}
