//! Derives git push configuration from a repository and a credential.

use url::Url;

use crate::auth::Authenticator;
use crate::error::SourceError;
use crate::types::{CodeHostKind, PushConfig, Repo};

/// Whether the clone URL is pushed to over SSH.
///
/// Covers `ssh://` URLs and the scp-like `user@host:path` form, which has no
/// scheme separator.
fn is_ssh_url(clone_url: &str) -> bool {
    if clone_url.starts_with("ssh://") {
        return true;
    }
    !clone_url.contains("://") && clone_url.contains(':')
}

/// Returns the clone URL to push to, preferring HTTPS over SSH.
///
/// Sources keep their relative order, so the first HTTPS URL wins and the
/// first SSH URL is only used when no HTTPS URL exists.
///
/// # Errors
///
/// Returns [`SourceError::MissingCloneUrl`] when the repository has no sources.
pub fn clone_url(repo: &Repo) -> Result<&str, SourceError> {
    repo.sources
        .iter()
        .find(|source| !is_ssh_url(&source.clone_url))
        .or_else(|| repo.sources.first())
        .map(|source| source.clone_url.as_str())
        .ok_or_else(|| SourceError::MissingCloneUrl {
            repo: repo.name.clone(),
        })
}

/// Derives how git should push to `repo` using `authenticator`.
///
/// SSH remotes are used as-is with the credential's key pair. HTTPS remotes
/// get the credential embedded in the URL in the form the code host expects:
/// GitHub takes the token as the username, GitLab takes `git:<token>`, and the
/// Bitbucket, Azure DevOps and Gerrit hosts take `username:password`.
///
/// # Errors
///
/// - [`SourceError::NoSshCredential`] when the remote is SSH and the
///   credential has no key pair.
/// - [`SourceError::NoPushCredentials`] when there is no credential or it can
///   never be used to push.
/// - [`SourceError::UnsupportedAuthenticator`] when the code host expects a
///   different kind of credential.
/// - [`SourceError::MissingCloneUrl`] or [`SourceError::InvalidUrl`] when the
///   repository has no usable clone URL.
pub fn gitserver_push_config(
    repo: &Repo,
    authenticator: Option<&Authenticator>,
) -> Result<PushConfig, SourceError> {
    let remote = clone_url(repo)?;

    if is_ssh_url(remote) {
        let ssh = authenticator
            .and_then(Authenticator::ssh_key_pair)
            .ok_or(SourceError::NoSshCredential)?;
        tracing::debug!("pushing to {} over SSH", repo.name);
        return Ok(PushConfig {
            remote_url: remote.to_owned(),
            private_key: ssh.private_key.clone(),
            passphrase: ssh.passphrase.clone(),
        });
    }

    let Some(credential) = authenticator else {
        return Err(SourceError::NoPushCredentials {
            credentials_type: String::new(),
        });
    };

    let mut remote_url =
        Url::parse(remote).map_err(|error| SourceError::InvalidUrl(error.to_string()))?;
    let host = repo.external_repo.service_type;

    match credential {
        Authenticator::OAuthBearerToken { token }
        | Authenticator::OAuthBearerTokenWithSsh { token, .. } => {
            set_token_auth(&mut remote_url, host, token, credential)?;
        }
        Authenticator::BasicAuth { username, password }
        | Authenticator::BasicAuthWithSsh {
            username, password, ..
        } => {
            set_basic_auth(&mut remote_url, host, username, password, credential)?;
        }
        Authenticator::OAuthClient { .. } => {
            return Err(SourceError::NoPushCredentials {
                credentials_type: credential.kind().to_owned(),
            });
        }
    }

    tracing::debug!("pushing to {} over HTTPS as {}", repo.name, credential.kind());
    Ok(PushConfig {
        remote_url: remote_url.to_string(),
        ..PushConfig::default()
    })
}

fn set_token_auth(
    remote_url: &mut Url,
    host: CodeHostKind,
    token: &str,
    credential: &Authenticator,
) -> Result<(), SourceError> {
    match host {
        CodeHostKind::GitHub => set_userinfo(remote_url, token, None),
        CodeHostKind::GitLab => set_userinfo(remote_url, "git", Some(token)),
        CodeHostKind::BitbucketServer
        | CodeHostKind::BitbucketCloud
        | CodeHostKind::AzureDevOps
        | CodeHostKind::Gerrit => Err(unsupported(host, credential)),
    }
}

fn set_basic_auth(
    remote_url: &mut Url,
    host: CodeHostKind,
    username: &str,
    password: &str,
    credential: &Authenticator,
) -> Result<(), SourceError> {
    match host {
        CodeHostKind::GitHub | CodeHostKind::GitLab => Err(unsupported(host, credential)),
        CodeHostKind::BitbucketServer
        | CodeHostKind::BitbucketCloud
        | CodeHostKind::AzureDevOps
        | CodeHostKind::Gerrit => set_userinfo(remote_url, username, Some(password)),
    }
}

fn set_userinfo(
    remote_url: &mut Url,
    username: &str,
    password: Option<&str>,
) -> Result<(), SourceError> {
    remote_url
        .set_username(username)
        .and_then(|()| remote_url.set_password(password))
        .map_err(|()| SourceError::InvalidUrl("clone URL cannot carry credentials".to_owned()))
}

fn unsupported(host: CodeHostKind, credential: &Authenticator) -> SourceError {
    SourceError::UnsupportedAuthenticator {
        host: host.service_type().to_owned(),
        authenticator: credential.kind().to_owned(),
    }
}
