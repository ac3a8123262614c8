//! Script-scoped defaults: working directory, SSH parameters, and the
//! default resource set.
//!
//! Defaults are created once per script run and may only be changed before
//! the first action executes. After [`Defaults::freeze`] every setter fails
//! with [`DefaultsError::Frozen`].

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::resource::{HostResource, SshConfig};

/// Default root under which collected artifacts are written.
pub const DEFAULT_WORKDIR: &str = "/tmp/crashd";

/// Errors raised when updating [`Defaults`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DefaultsError {
    /// Raised when a setting changes after the first action ran.
    #[error("cannot change default {setting} after the first action has run")]
    Frozen {
        /// Setting that was being changed.
        setting: &'static str,
    },
    /// Raised when the working directory is blank.
    #[error("working directory must not be empty")]
    EmptyWorkdir,
}

/// Process-scoped configuration read by providers and the executor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Defaults {
    workdir: Utf8PathBuf,
    ssh: SshConfig,
    resources: Option<Vec<HostResource>>,
    frozen: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self::new(Utf8PathBuf::from(DEFAULT_WORKDIR), SshConfig::default())
    }
}

impl Defaults {
    /// Creates unfrozen defaults with no default resources.
    #[must_use]
    pub const fn new(workdir: Utf8PathBuf, ssh: SshConfig) -> Self {
        Self {
            workdir,
            ssh,
            resources: None,
            frozen: false,
        }
    }

    /// Root of the per-resource artifact directories.
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }

    /// SSH parameters inherited by providers that are not given their own.
    #[must_use]
    pub const fn ssh(&self) -> &SshConfig {
        &self.ssh
    }

    /// Resource set used by actions that name none.
    #[must_use]
    pub fn resources(&self) -> Option<&[HostResource]> {
        self.resources.as_deref()
    }

    /// Whether an action has already run.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Replaces the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`DefaultsError::Frozen`] after [`Self::freeze`], or
    /// [`DefaultsError::EmptyWorkdir`] for a blank path.
    pub fn set_workdir(&mut self, workdir: impl Into<Utf8PathBuf>) -> Result<(), DefaultsError> {
        self.ensure_unfrozen("workdir")?;
        let path = workdir.into();
        if path.as_str().trim().is_empty() {
            return Err(DefaultsError::EmptyWorkdir);
        }
        self.workdir = path;
        Ok(())
    }

    /// Replaces the SSH parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DefaultsError::Frozen`] after [`Self::freeze`].
    pub fn set_ssh(&mut self, ssh: SshConfig) -> Result<(), DefaultsError> {
        self.ensure_unfrozen("ssh_config")?;
        self.ssh = ssh;
        Ok(())
    }

    /// Replaces the default resource set.
    ///
    /// # Errors
    ///
    /// Returns [`DefaultsError::Frozen`] after [`Self::freeze`].
    pub fn set_resources(&mut self, resources: Vec<HostResource>) -> Result<(), DefaultsError> {
        self.ensure_unfrozen("resources")?;
        self.resources = Some(resources);
        Ok(())
    }

    /// Marks the start of action execution; later updates are rejected.
    pub const fn freeze(&mut self) {
        self.frozen = true;
    }

    const fn ensure_unfrozen(&self, setting: &'static str) -> Result<(), DefaultsError> {
        if self.frozen {
            Err(DefaultsError::Frozen { setting })
        } else {
            Ok(())
        }
    }
}
