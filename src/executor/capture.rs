//! Remote command execution: captured to a file or returned inline.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;
use tracing::info;

use super::copy::create_dir_all;
use super::retry::bounded;
use super::{CommandParams, ExecutionError};
use crate::paths::{resource_dir, sanitize};
use crate::resource::HostResource;
use crate::session::{CommandOutput, Session};

const MAX_FILE_STEM: usize = 64;

/// Runs the command and writes its stdout to
/// `<workdir>/<sanitized-id>/<sanitized-command>.txt`.
pub(super) async fn capture<S: Session>(
    session: &S,
    resource: &HostResource,
    params: &CommandParams,
    workdir: &Utf8Path,
) -> Result<String, ExecutionError> {
    let output = run_checked(session, resource, params).await?;

    let dir = resource_dir(workdir, resource.id());
    create_dir_all(&dir)?;
    let name = capture_file_name(&params.command);
    let local_io = |err: std::io::Error| ExecutionError::LocalIo {
        path: dir.join(&name),
        message: err.to_string(),
    };
    Dir::open_ambient_dir(&dir, ambient_authority())
        .and_then(|handle| handle.write(&name, output.stdout.as_bytes()))
        .map_err(local_io)?;

    let path = dir.join(&name);
    info!(resource = resource.id(), command = %params.command, path = %path, "captured");
    Ok(path.into_string())
}

/// Runs the command and returns its trimmed stdout.
pub(super) async fn run<S: Session>(
    session: &S,
    resource: &HostResource,
    params: &CommandParams,
) -> Result<String, ExecutionError> {
    let output = run_checked(session, resource, params).await?;
    info!(resource = resource.id(), command = %params.command, "ran");
    Ok(output.stdout.trim().to_owned())
}

async fn run_checked<S: Session>(
    session: &S,
    resource: &HostResource,
    params: &CommandParams,
) -> Result<CommandOutput, ExecutionError> {
    let rendered = render_command(params);
    let label = format!("{} on {}", params.command, resource.id());
    let output = bounded(resource.ssh().timeout, &label, session.run(&rendered)).await?;
    if output.is_success() {
        return Ok(output);
    }
    Err(ExecutionError::CommandFailed {
        command: params.command.clone(),
        status: output.status_text(),
        stderr: output.stderr.trim().to_owned(),
    })
}

/// Prefixes the command with `export` statements for every env pair.
#[must_use]
pub fn render_command(params: &CommandParams) -> String {
    let mut rendered = String::new();
    for (name, value) in &params.env {
        rendered.push_str("export ");
        rendered.push_str(name);
        rendered.push('=');
        rendered.push_str(escape(value.as_str().into()).as_ref());
        rendered.push_str("; ");
    }
    rendered.push_str(&params.command);
    rendered
}

/// File name that receives a captured command's output.
#[must_use]
pub fn capture_file_name(command: &str) -> Utf8PathBuf {
    let stem = sanitize(command)
        .chars()
        .take(MAX_FILE_STEM)
        .collect::<String>();
    Utf8PathBuf::from(format!("{stem}.txt"))
}
