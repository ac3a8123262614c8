//! Fan-out execution of one action across many resources.
//!
//! [`FanOutExecutor::execute`] runs an [`Action`] once per resource and
//! returns exactly one [`ActionOutcome`] per resource in input order. A
//! resource's failure, whether during connection, listing, transfer, or
//! command execution, is recorded in its own outcome and never stops the
//! others. Under [`ConcurrencyPolicy::Bounded`] workers run as Tokio tasks
//! and results are written into pre-sized slots by index, so completion
//! order never leaks into the output.

use std::num::NonZeroUsize;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::outcome::ActionOutcome;
use crate::resource::HostResource;
use crate::session::{SessionError, SessionProvider};

mod capture;
mod copy;
mod retry;

pub use capture::{capture_file_name, render_command};
pub use retry::RetryPolicy;

/// How resources are scheduled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConcurrencyPolicy {
    /// One resource at a time, in input order.
    #[default]
    Sequential,
    /// At most this many resources in flight at once.
    Bounded(NonZeroUsize),
}

impl ConcurrencyPolicy {
    /// Maps a worker count to a policy; `0` and `1` mean sequential.
    #[must_use]
    pub fn from_limit(limit: usize) -> Self {
        NonZeroUsize::new(limit)
            .filter(|workers| workers.get() > 1)
            .map_or(Self::Sequential, Self::Bounded)
    }
}

/// Parameters of a copy action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyParams {
    /// Remote path, possibly holding glob metacharacters.
    pub path: String,
    /// Whether to compress in transit.
    pub compress: bool,
}

/// Parameters of a remote command action.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandParams {
    /// Shell command run on the resource.
    pub command: String,
    /// Variables exported before the command, in order.
    pub env: Vec<(String, String)>,
}

/// Work performed against every resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Retrieve remote files into the working directory.
    CopyFrom(CopyParams),
    /// Run a command and store its stdout in the working directory.
    Capture(CommandParams),
    /// Run a command and report its trimmed stdout.
    Run(CommandParams),
}

impl Action {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CopyFrom(_) => "copy_from",
            Self::Capture(_) => "capture",
            Self::Run(_) => "run",
        }
    }
}

/// Errors that end one resource's processing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Raised when a transient failure outlived the retry budget.
    #[error("gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last transient failure.
        source: SessionError,
    },
    /// Raised for permanent session failures.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Raised when the local working directory cannot be prepared.
    #[error("failed to write {path}: {message}")]
    LocalIo {
        /// Local path involved.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a remote command exits non-zero.
    #[error("command {command:?} exited with status {status}: {stderr}")]
    CommandFailed {
        /// Command as written in the script.
        command: String,
        /// Exit status text.
        status: String,
        /// Trimmed stderr.
        stderr: String,
    },
}

/// Runs actions across resources through a [`SessionProvider`].
#[derive(Debug)]
pub struct FanOutExecutor<P> {
    provider: Arc<P>,
    policy: ConcurrencyPolicy,
    retry: RetryPolicy,
}

impl<P> Clone for FanOutExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            policy: self.policy,
            retry: self.retry,
        }
    }
}

impl<P> FanOutExecutor<P>
where
    P: SessionProvider + 'static,
    P::Session: 'static,
{
    /// Creates an executor using the default retry backoff.
    #[must_use]
    pub fn new(provider: P, policy: ConcurrencyPolicy) -> Self {
        Self {
            provider: Arc::new(provider),
            policy,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry backoff.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Scheduling policy in effect.
    #[must_use]
    pub const fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Session provider used to reach resources.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Executes `action` against every resource.
    ///
    /// The returned outcomes match `resources` one-to-one and in order.
    pub async fn execute(
        &self,
        action: &Action,
        resources: &[HostResource],
        workdir: &Utf8Path,
    ) -> Vec<ActionOutcome> {
        info!(
            action = action.name(),
            resources = resources.len(),
            policy = ?self.policy,
            "executing action"
        );
        match self.policy {
            ConcurrencyPolicy::Sequential => {
                let mut outcomes = Vec::with_capacity(resources.len());
                for resource in resources {
                    outcomes.push(
                        process_resource(
                            self.provider.as_ref(),
                            &self.retry,
                            action,
                            resource,
                            workdir,
                        )
                        .await,
                    );
                }
                outcomes
            }
            ConcurrencyPolicy::Bounded(limit) => {
                self.execute_bounded(limit, action, resources, workdir)
                    .await
            }
        }
    }

    async fn execute_bounded(
        &self,
        limit: NonZeroUsize,
        action: &Action,
        resources: &[HostResource],
        workdir: &Utf8Path,
    ) -> Vec<ActionOutcome> {
        let semaphore = Arc::new(Semaphore::new(limit.get()));
        let mut tasks = JoinSet::new();
        for (index, resource) in resources.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.provider);
            let permits = Arc::clone(&semaphore);
            let task_action = action.clone();
            let task_workdir = workdir.to_owned();
            let retry = self.retry;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = process_resource(
                    provider.as_ref(),
                    &retry,
                    &task_action,
                    &resource,
                    &task_workdir,
                )
                .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<ActionOutcome>> = vec![None; resources.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(err) => warn!(error = %err, "fan-out worker did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(resources)
            .map(|(slot, resource)| {
                slot.unwrap_or_else(|| {
                    ActionOutcome::failure(resource.id(), &"worker task aborted")
                })
            })
            .collect()
    }
}

async fn process_resource<P: SessionProvider>(
    provider: &P,
    retry: &RetryPolicy,
    action: &Action,
    resource: &HostResource,
    workdir: &Utf8Path,
) -> ActionOutcome {
    let id = resource.id();
    debug!(resource = id, action = action.name(), "processing resource");
    match run_action(provider, retry, action, resource, workdir).await {
        Ok(result) => {
            info!(resource = id, result = %result, "resource succeeded");
            ActionOutcome::success(id, result)
        }
        Err(err) => {
            warn!(resource = id, error = %err, "resource failed");
            ActionOutcome::failure(id, &err)
        }
    }
}

async fn run_action<P: SessionProvider>(
    provider: &P,
    retry: &RetryPolicy,
    action: &Action,
    resource: &HostResource,
    workdir: &Utf8Path,
) -> Result<String, ExecutionError> {
    let ssh = resource.ssh();
    let label = format!("connect to {}", resource.id());
    let session = retry::with_retry(retry, ssh.max_retries, resource.id(), || {
        retry::bounded(ssh.timeout, &label, provider.connect(resource))
    })
    .await?;

    match action {
        Action::CopyFrom(params) => {
            copy::copy_from(&session, resource, params, workdir, retry).await
        }
        Action::Capture(params) => capture::capture(&session, resource, params, workdir).await,
        Action::Run(params) => capture::run(&session, resource, params).await,
    }
}
