//! Executes Dockerfile-like scripts.
//!
//! [`ScriptRunner::execute`] plans the whole script before touching any
//! remote host: preambles are applied to a copy of the [`Defaults`] in
//! source order, the `FROM` hosts are resolved when the first action is
//! reached, and that moment freezes the defaults. A preamble that would
//! change defaults after an action, or an action with no `FROM` before it,
//! fails the run before anything executes. Planned actions then run in
//! source order through the [`FanOutExecutor`].

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::defaults::{Defaults, DefaultsError};
use crate::executor::{Action, CommandParams, CopyParams, FanOutExecutor};
use crate::outcome::{ActionResult, ResultShape};
use crate::resource::{HostListProvider, HostResource, Provider, ResourceError};
use crate::script::{Instruction, Payload, Script};
use crate::session::SessionProvider;

/// Errors that stop a script before any action runs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunError {
    /// Raised when an action appears before any `FROM`.
    #[error("line {line}: {keyword} needs a FROM instruction before it")]
    MissingHosts {
        /// Line of the action.
        line: usize,
        /// Keyword of the action.
        keyword: &'static str,
    },
    /// Raised when the `FROM` hosts cannot be resolved.
    #[error("line {line}: {source}")]
    Resource {
        /// Line of the first action, where hosts are resolved.
        line: usize,
        /// Resolution failure.
        source: ResourceError,
    },
    /// Raised when a preamble changes defaults after the first action.
    #[error("line {line}: {keyword}: {source}")]
    Defaults {
        /// Line of the preamble.
        line: usize,
        /// Keyword of the preamble.
        keyword: &'static str,
        /// Rejected update.
        source: DefaultsError,
    },
}

/// Result of one action instruction, emitted as one JSON line by the CLI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ScriptActionResult {
    /// Line of the instruction.
    pub line: usize,
    /// Instruction keyword.
    pub keyword: &'static str,
    /// Path or command the action worked on.
    pub target: String,
    /// Per-resource outcomes in `FROM` order.
    pub result: ActionResult,
}

#[derive(Clone, Debug)]
struct PlannedAction {
    line: usize,
    keyword: &'static str,
    target: String,
    action: Action,
}

/// Plans and runs Dockerfile-like scripts.
#[derive(Debug)]
pub struct ScriptRunner<P> {
    defaults: Defaults,
    executor: FanOutExecutor<P>,
}

impl<P> ScriptRunner<P>
where
    P: SessionProvider + 'static,
    P::Session: 'static,
{
    /// Creates a runner seeded with `defaults`, usually from configuration.
    #[must_use]
    pub const fn new(defaults: Defaults, executor: FanOutExecutor<P>) -> Self {
        Self { defaults, executor }
    }

    /// Plans `script` and runs every action in source order.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when planning fails; nothing has executed in
    /// that case. Per-resource failures are reported in the results.
    pub async fn execute(&self, script: &Script) -> Result<Vec<ScriptActionResult>, RunError> {
        let (defaults, plan) = self.plan(script)?;
        let resources = defaults.resources().unwrap_or_default();
        let mut results = Vec::with_capacity(plan.len());
        for step in plan {
            info!(line = step.line, keyword = step.keyword, target = %step.target, "running action");
            let outcomes = self
                .executor
                .execute(&step.action, resources, defaults.workdir())
                .await;
            results.push(ScriptActionResult {
                line: step.line,
                keyword: step.keyword,
                target: step.target,
                result: ActionResult::aggregate(outcomes, ResultShape::List),
            });
        }
        Ok(results)
    }

    fn plan(&self, script: &Script) -> Result<(Defaults, Vec<PlannedAction>), RunError> {
        let mut planner = Planner {
            defaults: self.defaults.clone(),
            hosts: None,
            env: Vec::new(),
            plan: Vec::new(),
        };
        for instruction in script.instructions() {
            planner.apply(instruction)?;
        }
        Ok((planner.defaults, planner.plan))
    }
}

struct Planner {
    defaults: Defaults,
    hosts: Option<Vec<String>>,
    env: Vec<(String, String)>,
    plan: Vec<PlannedAction>,
}

impl Planner {
    fn apply(&mut self, instruction: &Instruction) -> Result<(), RunError> {
        let line = instruction.line();
        let keyword = instruction.keyword().as_str();
        let frozen = |source: DefaultsError| RunError::Defaults {
            line,
            keyword,
            source,
        };

        match instruction.payload() {
            Payload::From(from) => {
                if self.defaults.is_frozen() {
                    return Err(frozen(DefaultsError::Frozen { setting: "hosts" }));
                }
                self.hosts = Some(from.hosts().to_vec());
            }
            Payload::AuthConfig(auth) => {
                let mut ssh = self.defaults.ssh().clone();
                if let Some(username) = auth.username() {
                    username.clone_into(&mut ssh.username);
                }
                if let Some(key) = auth.private_key() {
                    ssh.private_key_path = Some(key.to_owned());
                }
                self.defaults.set_ssh(ssh).map_err(frozen)?;
            }
            Payload::Workdir(workdir) => {
                self.defaults.set_workdir(workdir.path()).map_err(frozen)?;
            }
            Payload::Env(env) => self.env.extend(env.pairs()),
            Payload::Copy(copy) => {
                self.resolve_hosts(line, keyword)?;
                for path in copy.paths() {
                    self.push(line, keyword, path, Action::CopyFrom(CopyParams {
                        path: path.clone(),
                        compress: false,
                    }));
                }
            }
            Payload::Capture(command) => {
                self.resolve_hosts(line, keyword)?;
                let params = self.command_params(command.command());
                self.push(line, keyword, command.command(), Action::Capture(params));
            }
            Payload::Run(command) => {
                self.resolve_hosts(line, keyword)?;
                let params = self.command_params(command.command());
                self.push(line, keyword, command.command(), Action::Run(params));
            }
        }
        Ok(())
    }

    /// Resolves `FROM` hosts once, at the first action, and freezes the
    /// defaults.
    fn resolve_hosts(&mut self, line: usize, keyword: &'static str) -> Result<(), RunError> {
        if self.defaults.is_frozen() {
            return Ok(());
        }
        let hosts = self
            .hosts
            .clone()
            .ok_or(RunError::MissingHosts { line, keyword })?;
        let resources: Vec<HostResource> =
            HostListProvider::new(hosts, self.defaults.ssh().clone())
                .resolve()
                .map_err(|source| RunError::Resource { line, source })?;
        self.defaults
            .set_resources(resources)
            .map_err(|source| RunError::Defaults {
                line,
                keyword,
                source,
            })?;
        self.defaults.freeze();
        Ok(())
    }

    fn command_params(&self, command: &str) -> CommandParams {
        CommandParams {
            command: command.to_owned(),
            env: self.env.clone(),
        }
    }

    fn push(&mut self, line: usize, keyword: &'static str, target: &str, action: Action) {
        self.plan.push(PlannedAction {
            line,
            keyword,
            target: target.to_owned(),
            action,
        });
    }
}
