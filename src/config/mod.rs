//! Configuration loading via `ortho-config`.
//!
//! [`CrashdConfig`] merges built-in defaults, `crashd.toml` discovered on
//! disk (or named by `CRASHD_CONFIG_PATH`), and `CRASHD_*` environment
//! variables. It seeds the script [`Defaults`], the SSH client tooling, and
//! the fan-out concurrency policy.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::defaults::{DEFAULT_WORKDIR, Defaults};
use crate::executor::ConcurrencyPolicy;
use crate::resource::{DEFAULT_PRIVATE_KEY, SshConfig};
use crate::session::SshTooling;

/// Settings layered from defaults, configuration files, and environment.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CRASHD",
    discovery(
        app_name = "crashd",
        env_var = "CRASHD_CONFIG_PATH",
        config_file_name = "crashd.toml",
        dotfile_name = ".crashd.toml",
        project_file_name = "crashd.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing SSH toggles that are naturally booleans"
)]
pub struct CrashdConfig {
    /// Root directory receiving collected artifacts.
    #[ortho_config(default = DEFAULT_WORKDIR.to_owned())]
    pub workdir: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as unless a script overrides it.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Port used for addresses without an explicit `:port`.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports `~/` expansion and
    /// falls back to `~/.ssh/id_rsa` when unset.
    pub ssh_identity_file: Option<String>,
    /// Total connection attempts per resource.
    #[ortho_config(default = 5)]
    pub max_retries: u32,
    /// Timeout for each connection attempt and transfer, in seconds.
    #[ortho_config(default = 30)]
    pub timeout_secs: u64,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Whether `scp` uses the legacy SCP protocol instead of SFTP.
    #[ortho_config(default = false)]
    pub scp_legacy_protocol: bool,
    /// Resources processed at once; `1` runs them sequentially.
    #[ortho_config(default = 1)]
    pub concurrency: usize,
}

impl Default for CrashdConfig {
    fn default() -> Self {
        Self {
            workdir: DEFAULT_WORKDIR.to_owned(),
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ssh_user: String::from("root"),
            ssh_port: 22,
            ssh_identity_file: None,
            max_retries: 5,
            timeout_secs: 30,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            scp_legacy_protocol: false,
            concurrency: 1,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or out of range.
    #[error(
        "invalid {field}: {reason}; set CRASHD_{env_suffix} or add {field} to crashd.toml",
        env_suffix = field.to_uppercase()
    )]
    InvalidField {
        /// Configuration key that failed validation.
        field: &'static str,
        /// What is wrong with the value.
        reason: &'static str,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl CrashdConfig {
    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("crashd")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures required values are present and numeric limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_value(&self.workdir, "workdir")?;
        require_value(&self.ssh_bin, "ssh_bin")?;
        require_value(&self.scp_bin, "scp_bin")?;
        require_value(&self.ssh_user, "ssh_user")?;
        if let Some(identity) = self.ssh_identity_file.as_deref() {
            require_value(identity, "ssh_identity_file")?;
        }
        require_positive(u64::from(self.ssh_port), "ssh_port")?;
        require_positive(u64::from(self.max_retries), "max_retries")?;
        require_positive(self.timeout_secs, "timeout_secs")?;
        Ok(())
    }

    /// Connection parameters inherited by every resource.
    #[must_use]
    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            username: self.ssh_user.clone(),
            port: self.ssh_port,
            private_key_path: Some(
                self.ssh_identity_file
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PRIVATE_KEY.to_owned()),
            ),
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Initial script defaults.
    #[must_use]
    pub fn defaults(&self) -> Defaults {
        Defaults::new(Utf8PathBuf::from(&self.workdir), self.ssh_config())
    }

    /// Client binaries and host key options.
    #[must_use]
    pub fn tooling(&self) -> SshTooling {
        SshTooling {
            ssh_bin: self.ssh_bin.clone(),
            scp_bin: self.scp_bin.clone(),
            batch_mode: self.ssh_batch_mode,
            strict_host_key_checking: self.ssh_strict_host_key_checking,
            known_hosts_file: self.ssh_known_hosts_file.clone(),
            legacy_scp_protocol: self.scp_legacy_protocol,
        }
    }

    /// Fan-out scheduling policy.
    #[must_use]
    pub fn concurrency_policy(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::from_limit(self.concurrency)
    }
}

fn require_value(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "value must not be empty",
        });
    }
    Ok(())
}

const fn require_positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidField {
            field,
            reason: "value must be greater than zero",
        });
    }
    Ok(())
}
