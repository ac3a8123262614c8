//! Core library for the crashd diagnostics collector.
//!
//! Scripts name a set of remote hosts and the artifacts to gather from
//! them. The crate parses those scripts, resolves hosts into resources,
//! fans each action out over SSH sessions (one resource failing never
//! stops the others) and reports per-resource outcomes in resource order.
//!
//! Two surfaces drive the same engine: the Dockerfile-like script format
//! handled by [`ScriptRunner`], and the builtin calls of an embedded
//! scripting language adapted by [`ScriptContext`].

pub mod bridge;
pub mod config;
pub mod defaults;
pub mod executor;
pub mod outcome;
pub mod paths;
pub mod resource;
pub mod run;
pub mod script;
pub mod session;
pub mod test_support;

pub use bridge::{Arguments, BridgeError, ScriptContext, Value};
pub use config::{ConfigError, CrashdConfig};
pub use defaults::{DEFAULT_WORKDIR, Defaults, DefaultsError};
pub use executor::{
    Action, CommandParams, ConcurrencyPolicy, CopyParams, ExecutionError, FanOutExecutor,
    RetryPolicy,
};
pub use outcome::{ActionOutcome, ActionResult, ResultShape};
pub use resource::{HostListProvider, HostResource, Provider, ResourceError, SshConfig};
pub use run::{RunError, ScriptActionResult, ScriptRunner};
pub use script::{Instruction, Keyword, Payload, Script, ScriptError};
pub use session::{
    CommandOutput, CommandRunner, ProcessCommandRunner, Session, SessionError, SessionProvider,
    SshSession, SshSessionProvider, SshTooling,
};
