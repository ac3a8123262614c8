//! Artifact path layout and remote glob helpers.
//!
//! Collected artifacts land under
//! `<workdir>/<sanitized-resource-id>/<relative-remote-path>`, so results
//! from different resources never collide even when their remote layouts are
//! identical.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

const GLOB_META: [char; 3] = ['*', '?', '['];

/// Replaces filesystem-unsafe characters in `identifier` with `_`.
///
/// ASCII alphanumerics, `-`, `_`, and `.` are kept; identifiers made only of
/// dots (or empty ones) become underscores so they can never address a
/// parent directory.
#[must_use]
pub fn sanitize(identifier: &str) -> String {
    let mut token = identifier
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    if token.chars().all(|ch| ch == '.') {
        token = "_".repeat(token.len().max(1));
    }
    token
}

/// Directory that receives every artifact collected from `resource_id`.
#[must_use]
pub fn resource_dir(workdir: &Utf8Path, resource_id: &str) -> Utf8PathBuf {
    workdir.join(sanitize(resource_id))
}

/// Local destination for `remote_path` collected from `resource_id`.
#[must_use]
pub fn destination_path(workdir: &Utf8Path, resource_id: &str, remote_path: &str) -> Utf8PathBuf {
    resource_dir(workdir, resource_id).join(relative_remote_path(remote_path))
}

/// Reduces a remote path to the relative portion kept under a resource
/// directory: roots, `.`, `..`, and a leading `~` are dropped.
#[must_use]
pub fn relative_remote_path(remote_path: &str) -> Utf8PathBuf {
    Utf8Path::new(remote_path)
        .components()
        .enumerate()
        .filter_map(|(index, component)| match component {
            Utf8Component::Normal(name) if !(index == 0 && name == "~") => Some(name),
            _ => None,
        })
        .collect()
}

/// Whether `path` contains glob metacharacters.
#[must_use]
pub fn has_glob_meta(path: &str) -> bool {
    path.contains(GLOB_META)
}

/// Literal directory prefix of a glob pattern: every component before the
/// first one holding a metacharacter.
#[must_use]
pub fn glob_base(pattern: &str) -> Utf8PathBuf {
    Utf8Path::new(pattern)
        .components()
        .take_while(|component| !has_glob_meta(component.as_str()))
        .collect()
}

/// Deepest directory holding every path in `paths`, or `None` when `paths`
/// is empty.
#[must_use]
pub fn common_parent(paths: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
    let mut parents = paths.iter().filter_map(|path| path.parent());
    let first = parents.next()?;
    let depth = parents.fold(first.components().count(), |depth, parent| {
        first
            .components()
            .zip(parent.components())
            .take(depth)
            .take_while(|(left, right)| left == right)
            .count()
    });
    Some(first.components().take(depth).collect())
}

/// Escapes `pattern` for a POSIX shell while leaving glob metacharacters
/// active, so the remote shell expands the pattern but nothing else.
pub(crate) fn quote_glob(pattern: &str) -> String {
    let mut quoted = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if ch.is_ascii_alphanumeric() || "*?[]!^-_./,:@%+=~".contains(ch) {
            quoted.push(ch);
        } else {
            quoted.push('\\');
            quoted.push(ch);
        }
    }
    quoted
}
