//! Credentials a changeset source can authenticate with.

use std::fmt;

/// SSH key pair attached to a credential for SSH pushes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SshKeyPair {
    /// PEM encoded private key.
    pub private_key: String,
    /// OpenSSH public key.
    pub public_key: String,
    /// Passphrase protecting the private key.
    pub passphrase: String,
}

impl fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Credential used to talk to a code host and to push commits to it.
#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// OAuth or personal access token sent as a bearer token.
    OAuthBearerToken {
        /// Token value.
        token: String,
    },
    /// Bearer token plus an SSH key pair for SSH remotes.
    OAuthBearerTokenWithSsh {
        /// Token value.
        token: String,
        /// Key pair for SSH pushes.
        ssh: SshKeyPair,
    },
    /// Username and password (or app password).
    BasicAuth {
        /// Username.
        username: String,
        /// Password or app password.
        password: String,
    },
    /// Basic auth plus an SSH key pair for SSH remotes.
    BasicAuthWithSsh {
        /// Username.
        username: String,
        /// Password or app password.
        password: String,
        /// Key pair for SSH pushes.
        ssh: SshKeyPair,
    },
    /// OAuth client credentials; usable for API calls but never for git pushes.
    OAuthClient {
        /// Client id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
}

impl Authenticator {
    /// Bearer token credential.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::OAuthBearerToken {
            token: token.into(),
        }
    }

    /// Basic auth credential.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Name of the credential variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OAuthBearerToken { .. } => "OAuthBearerToken",
            Self::OAuthBearerTokenWithSsh { .. } => "OAuthBearerTokenWithSSH",
            Self::BasicAuth { .. } => "BasicAuth",
            Self::BasicAuthWithSsh { .. } => "BasicAuthWithSSH",
            Self::OAuthClient { .. } => "OAuthClient",
        }
    }

    /// SSH key pair for variants that carry one.
    #[must_use]
    pub const fn ssh_key_pair(&self) -> Option<&SshKeyPair> {
        match self {
            Self::OAuthBearerTokenWithSsh { ssh, .. } | Self::BasicAuthWithSsh { ssh, .. } => {
                Some(ssh)
            }
            Self::OAuthBearerToken { .. } | Self::BasicAuth { .. } | Self::OAuthClient { .. } => {
                None
            }
        }
    }

    /// Returns a copy of this credential with the given SSH key pair attached.
    ///
    /// `OAuthClient` credentials cannot push and are returned unchanged.
    #[must_use]
    pub fn with_ssh(self, ssh: SshKeyPair) -> Self {
        match self {
            Self::OAuthBearerToken { token } | Self::OAuthBearerTokenWithSsh { token, .. } => {
                Self::OAuthBearerTokenWithSsh { token, ssh }
            }
            Self::BasicAuth { username, password }
            | Self::BasicAuthWithSsh {
                username, password, ..
            } => Self::BasicAuthWithSsh {
                username,
                password,
                ssh,
            },
            client @ Self::OAuthClient { .. } => client,
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BasicAuth { username, .. } | Self::BasicAuthWithSsh { username, .. } => f
                .debug_struct(self.kind())
                .field("username", username)
                .finish_non_exhaustive(),
            Self::OAuthClient { client_id, .. } => f
                .debug_struct(self.kind())
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::OAuthBearerToken { .. } | Self::OAuthBearerTokenWithSsh { .. } => {
                f.debug_struct(self.kind()).finish_non_exhaustive()
            }
        }
    }
}
