//! Remote sessions: the transport boundary the executor drives.
//!
//! The executor only needs three remote operations once a session is open:
//! list a glob pattern, fetch a path into the working directory, and run a
//! command. [`SessionProvider`] opens sessions and classifies connection
//! failures so the executor can decide what to retry. The production
//! implementation shells out to the system `ssh` and `scp` clients.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use thiserror::Error;

use crate::resource::HostResource;

mod runner;
mod ssh;

pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerFuture};
pub use ssh::{SshSession, SshSessionProvider, SshTooling, expand_tilde};

/// Future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Opens sessions against resources.
pub trait SessionProvider: Send + Sync {
    /// Session type produced by this provider.
    type Session: Session;

    /// Opens a session to `resource`.
    ///
    /// Connection failures and timeouts are reported as transient errors
    /// (see [`SessionError::is_transient`]) so callers may retry them.
    fn connect<'a>(&'a self, resource: &'a HostResource) -> SessionFuture<'a, Self::Session>;
}

/// An open session to a single resource.
pub trait Session: Send + Sync {
    /// Expands `pattern` on the remote side. A pattern matching nothing
    /// yields an empty list rather than an error.
    fn list<'a>(&'a self, pattern: &'a str) -> SessionFuture<'a, Vec<String>>;

    /// Transfers `remote_path` to `local_path`, whose parent directory must
    /// already exist. `compress` enables compression in transit.
    fn fetch<'a>(
        &'a self,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        compress: bool,
    ) -> SessionFuture<'a, ()>;

    /// Runs `command` through the remote shell and captures its output.
    fn run<'a>(&'a self, command: &'a str) -> SessionFuture<'a, CommandOutput>;
}

/// Errors raised by the remote transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when the remote host cannot be reached or refuses the session.
    #[error("failed to connect to {host}: {message}")]
    Connect {
        /// Host that could not be reached.
        host: String,
        /// Transport diagnostic.
        message: String,
    },
    /// Raised when an operation outlives its timeout.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Operation or program that timed out.
        operation: String,
        /// Timeout that elapsed, in seconds.
        seconds: u64,
    },
    /// Raised when a local command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a glob pattern cannot be expanded remotely.
    #[error("failed to list {pattern}: {message}")]
    Listing {
        /// Pattern being expanded.
        pattern: String,
        /// Remote diagnostic.
        message: String,
    },
    /// Raised when a remote path cannot be transferred.
    #[error("failed to copy {path}: {message}")]
    Transfer {
        /// Remote path being transferred.
        path: String,
        /// Transport diagnostic.
        message: String,
    },
}

impl SessionError {
    /// Whether the failure may succeed on a later attempt.
    ///
    /// Connection failures and timeouts are transient; everything else (a
    /// missing remote path, permission denied, a missing binary) is
    /// permanent and must not be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests;
