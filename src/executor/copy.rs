//! Remote-to-local file retrieval for one resource.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::{debug, info};

use super::retry::{RetryPolicy, bounded, with_retry};
use super::{CopyParams, ExecutionError};
use crate::paths::{common_parent, destination_path, glob_base, has_glob_meta};
use crate::resource::HostResource;
use crate::session::Session;

/// Copies every path matched by `params.path` from `session` into the
/// resource's directory under `workdir`.
///
/// Returns the local destination for a literal path, or the deepest local
/// directory holding every match for a glob. A glob matching nothing is not
/// an error and reports the local directory of the pattern's literal prefix.
pub(super) async fn copy_from<S: Session>(
    session: &S,
    resource: &HostResource,
    params: &CopyParams,
    workdir: &Utf8Path,
    retry: &RetryPolicy,
) -> Result<String, ExecutionError> {
    let id = resource.id();
    let ssh = resource.ssh();
    let is_glob = has_glob_meta(&params.path);

    let remote_paths = if is_glob {
        let label = format!("list {} on {id}", params.path);
        bounded(ssh.timeout, &label, session.list(&params.path)).await?
    } else {
        vec![params.path.clone()]
    };
    debug!(
        resource = id,
        pattern = %params.path,
        matches = remote_paths.len(),
        "resolved remote paths"
    );

    let locals = remote_paths
        .iter()
        .map(|remote| destination_path(workdir, id, remote))
        .collect::<Vec<_>>();
    let representative = if is_glob {
        let base = common_parent(&locals).unwrap_or_else(|| {
            destination_path(workdir, id, glob_base(&params.path).as_str())
        });
        create_dir_all(&base)?;
        base
    } else {
        destination_path(workdir, id, &params.path)
    };

    for (remote, local) in remote_paths.iter().zip(&locals) {
        if let Some(parent) = local.parent() {
            create_dir_all(parent)?;
        }
        let label = format!("copy {remote} from {id}");
        with_retry(retry, ssh.max_retries, id, || {
            bounded(
                ssh.timeout,
                &label,
                session.fetch(remote, local, params.compress),
            )
        })
        .await?;
        info!(resource = id, remote = %remote, local = %local, compress = params.compress, "copied");
    }

    Ok(representative.into_string())
}

pub(super) fn create_dir_all(path: &Utf8Path) -> Result<(), ExecutionError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|err| {
        ExecutionError::LocalIo {
            path: Utf8PathBuf::from(path),
            message: err.to_string(),
        }
    })
}
