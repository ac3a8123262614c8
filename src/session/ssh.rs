//! Session provider backed by the system `ssh` and `scp` clients.

use std::borrow::Cow;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use shell_escape::unix::escape;

use super::{
    CommandOutput, CommandRunner, ProcessCommandRunner, Session, SessionError, SessionFuture,
    SessionProvider,
};
use crate::paths::quote_glob;
use crate::resource::HostResource;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Client binaries and host key handling shared by every session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshTooling {
    /// SSH client binary.
    pub ssh_bin: String,
    /// SCP client binary.
    pub scp_bin: String,
    /// Whether to pass `BatchMode=yes`.
    pub batch_mode: bool,
    /// Whether to keep strict host key checking enabled.
    pub strict_host_key_checking: bool,
    /// Known hosts file passed as `UserKnownHostsFile`; blank to omit.
    pub known_hosts_file: String,
    /// Whether to pass `-O` so `scp` uses the legacy SCP protocol.
    ///
    /// By default `scp` transfers over SFTP, which takes the remote path
    /// verbatim. The legacy protocol hands the path to the remote shell, so
    /// it is quoted first.
    pub legacy_scp_protocol: bool,
}

impl Default for SshTooling {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            legacy_scp_protocol: false,
        }
    }
}

/// Opens [`SshSession`]s by probing the remote host with `ssh ... true`.
#[derive(Clone, Debug)]
pub struct SshSessionProvider<R: CommandRunner> {
    tooling: Arc<SshTooling>,
    runner: R,
}

impl SshSessionProvider<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner(tooling: SshTooling) -> Self {
        Self::new(tooling, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshSessionProvider<R> {
    /// Creates a provider that executes client binaries through `runner`.
    #[must_use]
    pub fn new(tooling: SshTooling, runner: R) -> Self {
        Self {
            tooling: Arc::new(tooling),
            runner,
        }
    }

    /// Returns the configured client tooling.
    #[must_use]
    pub fn tooling(&self) -> &SshTooling {
        &self.tooling
    }
}

impl<R: CommandRunner + Clone> SessionProvider for SshSessionProvider<R> {
    type Session = SshSession<R>;

    fn connect<'a>(&'a self, resource: &'a HostResource) -> SessionFuture<'a, Self::Session> {
        Box::pin(async move {
            let session = SshSession {
                tooling: Arc::clone(&self.tooling),
                runner: self.runner.clone(),
                target: Target::from_resource(resource),
            };
            let probe = session.ssh("true").await?;
            if probe.is_success() {
                return Ok(session);
            }
            Err(SessionError::Connect {
                host: resource.id().to_owned(),
                message: failure_message(&probe),
            })
        })
    }
}

#[derive(Clone, Debug)]
struct Target {
    user: String,
    host: String,
    port: u16,
    identity_file: Option<String>,
    timeout: Duration,
}

impl Target {
    fn from_resource(resource: &HostResource) -> Self {
        let ssh = resource.ssh();
        Self {
            user: ssh.username.clone(),
            host: resource.host().to_owned(),
            port: ssh.port,
            identity_file: ssh.private_key_path.clone(),
            timeout: ssh.timeout,
        }
    }

    fn login(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn remote_spec(&self, path: &str) -> String {
        if self.host.contains(':') {
            format!("{}@[{}]:{path}", self.user, self.host)
        } else {
            format!("{}:{path}", self.login())
        }
    }
}

/// An authenticated session to one host, driven through the client binaries.
#[derive(Clone, Debug)]
pub struct SshSession<R: CommandRunner> {
    tooling: Arc<SshTooling>,
    runner: R,
    target: Target,
}

impl<R: CommandRunner> SshSession<R> {
    async fn ssh(&self, remote_command: &str) -> Result<CommandOutput, SessionError> {
        let mut args = self.common_options("-p");
        args.push(OsString::from(self.target.login()));
        args.push(OsString::from(remote_command));
        self.runner
            .run(&self.tooling.ssh_bin, &args, self.target.timeout)
            .await
    }

    fn scp_args(&self, remote_path: &str, local_path: &Utf8Path, compress: bool) -> Vec<OsString> {
        let mut args = self.common_options("-P");
        if self.tooling.legacy_scp_protocol {
            args.push(OsString::from("-O"));
        }
        if compress {
            args.push(OsString::from("-C"));
        }
        args.push(OsString::from("-r"));
        let source = if self.tooling.legacy_scp_protocol {
            Cow::Owned(shell_quote_path(remote_path))
        } else {
            Cow::Borrowed(remote_path)
        };
        args.push(OsString::from(self.target.remote_spec(&source)));
        args.push(OsString::from(local_path.as_str()));
        args
    }

    fn common_options(&self, port_flag: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(port_flag),
            OsString::from(self.target.port.to_string()),
        ];

        if let Some(ref identity_file) = self.target.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.tooling.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.tooling.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.tooling.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.tooling.known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.target.timeout.as_secs().max(1)
        )));
        args
    }
}

impl<R: CommandRunner> Session for SshSession<R> {
    fn list<'a>(&'a self, pattern: &'a str) -> SessionFuture<'a, Vec<String>> {
        Box::pin(async move {
            let output = self.ssh(&listing_command(pattern)).await?;
            if output.code == Some(SSH_CLIENT_FAILURE) {
                return Err(SessionError::Connect {
                    host: self.target.host.clone(),
                    message: failure_message(&output),
                });
            }
            if !output.is_success() {
                return Err(SessionError::Listing {
                    pattern: pattern.to_owned(),
                    message: failure_message(&output),
                });
            }
            Ok(output
                .stdout
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect())
        })
    }

    fn fetch<'a>(
        &'a self,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        compress: bool,
    ) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let args = self.scp_args(remote_path, local_path, compress);
            let output = self
                .runner
                .run(&self.tooling.scp_bin, &args, self.target.timeout)
                .await?;
            if output.is_success() {
                return Ok(());
            }
            Err(SessionError::Transfer {
                path: remote_path.to_owned(),
                message: failure_message(&output),
            })
        })
    }

    fn run<'a>(&'a self, command: &'a str) -> SessionFuture<'a, CommandOutput> {
        Box::pin(async move {
            let output = self.ssh(command).await?;
            if output.code == Some(SSH_CLIENT_FAILURE) {
                return Err(SessionError::Connect {
                    host: self.target.host.clone(),
                    message: failure_message(&output),
                });
            }
            Ok(output)
        })
    }
}

/// Quotes `path` for the remote shell, leaving a leading `~/` expandable.
fn shell_quote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) if !rest.is_empty() => format!("~/{}", escape(rest.into())),
        _ => escape(path.into()).into_owned(),
    }
}

/// Shell snippet that prints every existing match of `pattern`, one per
/// line, and succeeds when nothing matches.
pub(crate) fn listing_command(pattern: &str) -> String {
    let quoted = if crate::paths::has_glob_meta(pattern) {
        quote_glob(pattern)
    } else {
        escape(pattern.into()).into_owned()
    };
    format!("for f in {quoted}; do [ -e \"$f\" ] && printf '%s\\n' \"$f\"; done; true")
}

/// Expands a leading `~` or `~/` to the value of `HOME`.
///
/// Paths are returned unchanged when `HOME` is unset or the path names
/// another user's home (`~ops/...`).
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    let Some(home) = std::env::var_os("HOME") else {
        return path.to_owned();
    };
    let home_text = home.to_string_lossy();
    match path.strip_prefix('~') {
        Some("") => home_text.into_owned(),
        Some(rest) if rest.starts_with('/') => format!("{home_text}{rest}"),
        _ => path.to_owned(),
    }
}

fn failure_message(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit status {}", output.status_text())
    } else {
        format!("exit status {}: {stderr}", output.status_text())
    }
}
