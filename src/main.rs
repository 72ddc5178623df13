//! Prints the git push configuration for a repository and credential.
//!
//! Useful for checking which remote and key a changeset push would use
//! before running a batch change against a code host.

use std::io::{self, Write};
use std::process::ExitCode;

use changeset_sources::sources::gitserver_push_config;
use changeset_sources::{SourceError, SourcesConfig};
use ortho_config::OrthoConfig;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SourceError> {
    let config = load_config()?;

    let repo = config.target_repo()?;
    let authenticator = config.authenticator()?;
    let push = gitserver_push_config(&repo, Some(&authenticator))?;

    let message = format!(
        "Repository: {}\nCode host: {}\nPush config: {push:?}\nSync delay: {}s",
        repo.name,
        repo.external_repo.service_type,
        config.sync_delay_seconds
    );
    writeln!(io::stdout().lock(), "{message}").map_err(|error| SourceError::Io {
        message: error.to_string(),
    })
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`SourceError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<SourcesConfig, SourceError> {
    SourcesConfig::load().map_err(|error| SourceError::Configuration {
        message: error.to_string(),
    })
}
