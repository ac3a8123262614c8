//! Providers that materialise [`HostResource`] descriptors.

use std::collections::BTreeSet;

use super::{HostResource, ResourceError, SshConfig, parse_address};
use crate::paths::sanitize;

/// Yields an ordered list of resources from declarative configuration.
///
/// Resolution is a pure function of the provider's configuration: it never
/// touches the network and either resolves every resource or fails.
pub trait Provider {
    /// Resolves the configured resources in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when any descriptor is malformed or required
    /// authentication material is missing.
    fn resolve(&self) -> Result<Vec<HostResource>, ResourceError>;
}

/// Resolves an explicit list of addresses sharing one [`SshConfig`].
///
/// Addresses may carry a `:port` suffix that overrides the shared port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostListProvider {
    hosts: Vec<String>,
    ssh: SshConfig,
}

impl HostListProvider {
    /// Creates a provider for `hosts` using the shared `ssh` defaults.
    #[must_use]
    pub fn new<I, S>(hosts: I, ssh: SshConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ssh,
        }
    }

    /// Declared addresses.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Shared connection defaults.
    #[must_use]
    pub const fn ssh(&self) -> &SshConfig {
        &self.ssh
    }

    fn validate_auth(&self) -> Result<(), ResourceError> {
        if self.ssh.username.trim().is_empty() {
            return Err(ResourceError::MissingAuth {
                field: String::from("username"),
            });
        }
        match self.ssh.private_key_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Ok(()),
            _ => Err(ResourceError::MissingAuth {
                field: String::from("private_key_path"),
            }),
        }
    }
}

impl Provider for HostListProvider {
    fn resolve(&self) -> Result<Vec<HostResource>, ResourceError> {
        if self.hosts.is_empty() {
            return Err(ResourceError::NoHosts);
        }
        self.validate_auth()?;

        let mut seen = BTreeSet::new();
        let mut resources = Vec::with_capacity(self.hosts.len());
        for address in &self.hosts {
            let (host, port) = parse_address(address)?;
            if !seen.insert(sanitize(address)) {
                return Err(ResourceError::DuplicateHost {
                    address: address.clone(),
                });
            }
            let mut ssh = self.ssh.clone();
            if let Some(override_port) = port {
                ssh.port = override_port;
            }
            resources.push(HostResource {
                id: address.clone(),
                host,
                ssh,
            });
        }
        Ok(resources)
    }
}
