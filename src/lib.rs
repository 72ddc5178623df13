//! Changeset sources: the code host side of batch changes.
//!
//! A changeset is a pull request (or merge request, or Gerrit change) that a
//! batch change owns or has imported. This crate defines the
//! [`ChangesetSource`] capability interface code host adapters implement, the
//! [`Sourcer`] that picks an adapter and credential for a changeset, and the
//! [`Executor`] that applies a reconciler [`Plan`] through them.
//!
//! Enable the `test-support` feature for the recording mocks in
//! [`sources::mock`] and the in-memory code host in [`sources::fake`].

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod sourcer;
pub mod sources;
pub mod stub;
pub mod telemetry;
pub mod types;

pub use auth::{Authenticator, SshKeyPair};
pub use config::SourcesConfig;
pub use error::SourceError;
pub use executor::{CommitCreator, CommitError, Executor, Operation, Plan};
pub use sourcer::{Sourcer, SourcerStore};
pub use sources::{
    ArchivableChangesetSource, ChangesetSource, DraftChangesetSource, ForkableChangesetSource,
};
pub use telemetry::{NoopTelemetrySink, StderrJsonlTelemetrySink, TelemetryEvent, TelemetrySink};
