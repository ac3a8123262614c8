//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::resource::HostResource;
use crate::session::{
    CommandOutput, CommandRunner, RunnerFuture, Session, SessionError, SessionFuture,
    SessionProvider,
};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, SessionError>>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Timeout the caller applied.
    pub limit: Duration,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which is the remote command for `ssh`
    /// and the local destination for `scp`.
    #[must_use]
    pub fn last_arg(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push_result(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }

    /// Pushes a runner-level error such as a timeout.
    pub fn push_error(&self, error: SessionError) {
        self.push_result(Err(error));
    }

    fn push_result(&self, result: Result<CommandOutput, SessionError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        limit: Duration,
    ) -> RunnerFuture<'a> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
                limit,
            });
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(SessionError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
            });
        Box::pin(async move { response })
    }
}

#[derive(Clone, Debug, Default)]
struct FakeHost {
    files: BTreeMap<String, String>,
    unreachable: bool,
    transient_failures: u32,
    fetch_timeouts: u32,
    delay: Option<Duration>,
    commands: BTreeMap<String, CommandOutput>,
}

#[derive(Debug, Default)]
struct FakeState {
    hosts: BTreeMap<String, FakeHost>,
    connect_attempts: BTreeMap<String, u32>,
    fetches: Vec<FetchRecord>,
    commands_run: Vec<(String, String)>,
}

/// One transfer observed by [`FakeSessionProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchRecord {
    /// Resource identifier the transfer ran against.
    pub resource: String,
    /// Remote path requested.
    pub remote_path: String,
    /// Whether compression was requested.
    pub compress: bool,
}

/// In-memory session provider with per-host remote file trees.
///
/// Hosts are keyed by resource identifier. Hosts that were never configured
/// accept connections and hold no files.
#[derive(Clone, Debug, Default)]
pub struct FakeSessionProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSessionProvider {
    /// Creates a provider with no configured hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_host(self, resource: &str, update: impl FnOnce(&mut FakeHost)) -> Self {
        {
            let mut state = self.lock();
            update(state.hosts.entry(resource.to_owned()).or_default());
        }
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a remote file holding `contents` to `resource`.
    #[must_use]
    pub fn with_file(self, resource: &str, path: &str, contents: &str) -> Self {
        self.with_host(resource, |host| {
            host.files.insert(path.to_owned(), contents.to_owned());
        })
    }

    /// Makes every connection attempt to `resource` fail.
    #[must_use]
    pub fn with_unreachable(self, resource: &str) -> Self {
        self.with_host(resource, |host| host.unreachable = true)
    }

    /// Makes the first `failures` connection attempts to `resource` time out.
    #[must_use]
    pub fn with_transient_failures(self, resource: &str, failures: u32) -> Self {
        self.with_host(resource, |host| host.transient_failures = failures)
    }

    /// Makes the first `timeouts` transfers from `resource` time out.
    #[must_use]
    pub fn with_fetch_timeouts(self, resource: &str, timeouts: u32) -> Self {
        self.with_host(resource, |host| host.fetch_timeouts = timeouts)
    }

    /// Delays every connection attempt to `resource`.
    #[must_use]
    pub fn with_delay(self, resource: &str, delay: Duration) -> Self {
        self.with_host(resource, |host| host.delay = Some(delay))
    }

    /// Scripts the output `resource` returns for `command`.
    #[must_use]
    pub fn with_command(self, resource: &str, command: &str, output: CommandOutput) -> Self {
        self.with_host(resource, |host| {
            host.commands.insert(command.to_owned(), output);
        })
    }

    /// Number of connection attempts made against `resource`.
    #[must_use]
    pub fn connect_attempts(&self, resource: &str) -> u32 {
        self.lock()
            .connect_attempts
            .get(resource)
            .copied()
            .unwrap_or_default()
    }

    /// Transfers recorded so far, in call order.
    #[must_use]
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.lock().fetches.clone()
    }

    /// Remote commands executed so far as `(resource, command)` pairs.
    #[must_use]
    pub fn commands_run(&self) -> Vec<(String, String)> {
        self.lock().commands_run.clone()
    }
}

impl SessionProvider for FakeSessionProvider {
    type Session = FakeSession;

    fn connect<'a>(&'a self, resource: &'a HostResource) -> SessionFuture<'a, Self::Session> {
        Box::pin(async move {
            let id = resource.id().to_owned();
            let delay = self
                .lock()
                .hosts
                .get(&id)
                .and_then(|host| host.delay);
            if let Some(duration) = delay {
                tokio::time::sleep(duration).await;
            }

            let mut state = self.lock();
            *state.connect_attempts.entry(id.clone()).or_default() += 1;
            let host = state.hosts.entry(id.clone()).or_default();
            if host.unreachable {
                return Err(SessionError::Connect {
                    host: id,
                    message: String::from("connection refused"),
                });
            }
            if host.transient_failures > 0 {
                host.transient_failures -= 1;
                return Err(SessionError::Timeout {
                    operation: format!("connect to {id}"),
                    seconds: resource.ssh().timeout.as_secs(),
                });
            }
            drop(state);
            Ok(FakeSession {
                resource: id,
                state: Arc::clone(&self.state),
            })
        })
    }
}

/// Session handed out by [`FakeSessionProvider`].
#[derive(Clone, Debug)]
pub struct FakeSession {
    resource: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn files(&self) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hosts
            .get(&self.resource)
            .map(|host| host.files.clone())
            .unwrap_or_default()
    }
}

impl Session for FakeSession {
    fn list<'a>(&'a self, pattern: &'a str) -> SessionFuture<'a, Vec<String>> {
        let matches = self
            .files()
            .into_keys()
            .filter(|path| wildcard_match(pattern, path))
            .collect();
        Box::pin(async move { Ok(matches) })
    }

    fn fetch<'a>(
        &'a self,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        compress: bool,
    ) -> SessionFuture<'a, ()> {
        let timed_out = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.fetches.push(FetchRecord {
                resource: self.resource.clone(),
                remote_path: remote_path.to_owned(),
                compress,
            });
            state
                .hosts
                .get_mut(&self.resource)
                .filter(|host| host.fetch_timeouts > 0)
                .map(|host| host.fetch_timeouts -= 1)
                .is_some()
        };
        let result = if timed_out {
            Err(SessionError::Timeout {
                operation: format!("copy {remote_path} from {}", self.resource),
                seconds: 1,
            })
        } else {
            write_remote_tree(&self.files(), remote_path, local_path)
        };
        Box::pin(async move { result })
    }

    fn run<'a>(&'a self, command: &'a str) -> SessionFuture<'a, CommandOutput> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .commands_run
            .push((self.resource.clone(), command.to_owned()));
        let output = state
            .hosts
            .get(&self.resource)
            .and_then(|host| {
                host.commands
                    .iter()
                    .find(|(known, _)| command.ends_with(known.as_str()))
                    .map(|(_, output)| output.clone())
            })
            .unwrap_or_else(|| CommandOutput {
                code: Some(127),
                stdout: String::new(),
                stderr: format!("sh: {command}: not found"),
            });
        drop(state);
        Box::pin(async move { Ok(output) })
    }
}

fn write_remote_tree(
    files: &BTreeMap<String, String>,
    remote_path: &str,
    local_path: &Utf8Path,
) -> Result<(), SessionError> {
    let transfer_error = |message: String| SessionError::Transfer {
        path: remote_path.to_owned(),
        message,
    };

    if let Some(contents) = files.get(remote_path) {
        let parent = local_path
            .parent()
            .ok_or_else(|| transfer_error(String::from("destination has no parent")))?;
        let name = local_path
            .file_name()
            .ok_or_else(|| transfer_error(String::from("destination has no file name")))?;
        return Dir::open_ambient_dir(parent, ambient_authority())
            .and_then(|dir| dir.write(name, contents))
            .map_err(|err| transfer_error(err.to_string()));
    }

    let prefix = format!("{}/", remote_path.trim_end_matches('/'));
    let nested = files
        .iter()
        .filter_map(|(path, contents)| path.strip_prefix(&prefix).map(|rest| (rest, contents)))
        .collect::<Vec<_>>();
    if nested.is_empty() {
        return Err(transfer_error(String::from("No such file or directory")));
    }

    Dir::create_ambient_dir_all(local_path, ambient_authority())
        .and_then(|()| Dir::open_ambient_dir(local_path, ambient_authority()))
        .and_then(|dir| {
            for (relative, contents) in nested {
                if let Some(parent) = Utf8Path::new(relative).parent()
                    && !parent.as_str().is_empty()
                {
                    dir.create_dir_all(parent)?;
                }
                dir.write(relative, contents)?;
            }
            Ok(())
        })
        .map_err(|err| transfer_error(err.to_string()))
}

/// Matches `path` against a shell-style pattern where `*` and `?` never
/// cross a `/`.
#[must_use]
pub fn wildcard_match(pattern: &str, path: &str) -> bool {
    let pattern_chars = pattern.chars().collect::<Vec<_>>();
    let path_chars = path.chars().collect::<Vec<_>>();
    match_from(&pattern_chars, &path_chars)
}

fn match_from(pattern: &[char], path: &[char]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some(('*', rest)) => {
            if match_from(rest, path) {
                return true;
            }
            match path.split_first() {
                Some((head, tail)) if *head != '/' => match_from(pattern, tail),
                _ => false,
            }
        }
        Some(('?', rest)) => match path.split_first() {
            Some((head, tail)) if *head != '/' => match_from(rest, tail),
            _ => false,
        },
        Some((expected, rest)) => match path.split_first() {
            Some((head, tail)) if head == expected => match_from(rest, tail),
            _ => false,
        },
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
