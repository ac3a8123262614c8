//! Remote host resources and the providers that resolve them.
//!
//! A [`HostResource`] describes one place an action can run: an address, the
//! SSH credentials used to reach it, and connection limits. Providers turn
//! declarative configuration into an ordered list of resources without doing
//! any network I/O.

use std::time::Duration;

use thiserror::Error;

mod provider;

pub use provider::{HostListProvider, Provider};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default number of connection attempts per resource.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default private key used when none is configured.
pub const DEFAULT_PRIVATE_KEY: &str = "~/.ssh/id_rsa";

/// SSH connection parameters shared by a set of resources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshConfig {
    /// Remote user to connect as.
    pub username: String,
    /// TCP port used when an address does not carry its own.
    pub port: u16,
    /// Private key used for authentication. Supports `~/` expansion.
    pub private_key_path: Option<String>,
    /// Total connection attempts before a resource is reported unreachable.
    pub max_retries: u32,
    /// Timeout applied to each connection attempt and each transfer.
    pub timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: String::from("root"),
            port: DEFAULT_SSH_PORT,
            private_key_path: Some(String::from(DEFAULT_PRIVATE_KEY)),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One addressable remote target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostResource {
    id: String,
    host: String,
    ssh: SshConfig,
}

impl HostResource {
    /// Stable display identifier, exactly as the address was declared.
    ///
    /// Outcomes are correlated with resources through this value and the
    /// per-resource artifact directory is derived from it.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host name or IP address without any port suffix.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Effective connection parameters, including any per-address port.
    #[must_use]
    pub const fn ssh(&self) -> &SshConfig {
        &self.ssh
    }
}

/// Errors raised while resolving resources.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResourceError {
    /// Raised when an address cannot be interpreted as `host[:port]`.
    #[error("malformed host address {address:?}: {reason}")]
    MalformedAddress {
        /// Address as declared.
        address: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Raised when required authentication material is absent.
    #[error("missing ssh {field}: set it with ssh_config(), AUTHCONFIG, or crashd.toml")]
    MissingAuth {
        /// Name of the missing field.
        field: String,
    },
    /// Raised when two addresses would share an artifact directory.
    #[error("host {address:?} is listed more than once")]
    DuplicateHost {
        /// Repeated address.
        address: String,
    },
    /// Raised when a provider is asked to resolve an empty host list.
    #[error("host list provider requires at least one host")]
    NoHosts,
}

/// Splits `address` into a host and an optional port.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port`, and bare IPv6 literals.
///
/// # Errors
///
/// Returns [`ResourceError::MalformedAddress`] for empty addresses, embedded
/// users or paths, whitespace, or unparsable ports.
pub fn parse_address(address: &str) -> Result<(String, Option<u16>), ResourceError> {
    let malformed = |reason: &str| ResourceError::MalformedAddress {
        address: address.to_owned(),
        reason: reason.to_owned(),
    };

    if address.trim().is_empty() {
        return Err(malformed("address is empty"));
    }
    if let Some(bad) = address
        .chars()
        .find(|ch| ch.is_whitespace() || ch.is_control() || matches!(ch, '@' | '/' | '\\'))
    {
        return Err(malformed(&format!("unexpected character {bad:?}")));
    }

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (inner, tail) = rest
            .split_once(']')
            .ok_or_else(|| malformed("unterminated '[' in IPv6 address"))?;
        match tail {
            "" => (inner, None),
            _ => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| malformed("expected ':' after ']'"))?;
                (inner, Some(port))
            }
        }
    } else if address.matches(':').count() == 1 {
        address
            .split_once(':')
            .map_or((address, None), |(name, port_text)| (name, Some(port_text)))
    } else {
        (address, None)
    };

    if host.is_empty() {
        return Err(malformed("host is empty"));
    }
    let parsed_port = port
        .map(|value| {
            value
                .parse::<u16>()
                .ok()
                .filter(|number| *number != 0)
                .ok_or_else(|| malformed(&format!("invalid port {value:?}")))
        })
        .transpose()?;
    Ok((host.to_owned(), parsed_port))
}
