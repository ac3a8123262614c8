//! Adapter between the embedded scripting surface and the core.
//!
//! The scripting evaluator calls builtins by name with dynamically typed
//! [`Value`] arguments. [`ScriptContext::call`] binds those arguments to
//! named parameters, converts them into typed configuration, and only then
//! touches providers, [`Defaults`], or the executor.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::defaults::{Defaults, DefaultsError};
use crate::executor::{Action, CopyParams, FanOutExecutor};
use crate::outcome::{ActionResult, ResultShape};
use crate::resource::{HostListProvider, HostResource, Provider, ResourceError, SshConfig};
use crate::session::SessionProvider;

mod value;

pub use value::{Arguments, Value};

/// Path copied by `copy_from` when none is given.
pub const DEFAULT_COPY_PATH: &str = "*";

/// Errors raised while adapting a builtin call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BridgeError {
    /// Raised for a builtin name the bridge does not provide.
    #[error("unknown builtin {name:?}")]
    UnknownBuiltin {
        /// Name that was called.
        name: String,
    },
    /// Raised when a required parameter is absent.
    #[error("{builtin}: missing required argument {name}")]
    MissingArgument {
        /// Builtin being called.
        builtin: &'static str,
        /// Parameter name.
        name: &'static str,
    },
    /// Raised when an argument has the wrong type or value.
    #[error("{builtin}: argument {name} must be {expected}, got {found}")]
    InvalidArgument {
        /// Builtin being called.
        builtin: &'static str,
        /// Parameter name.
        name: &'static str,
        /// Accepted shape.
        expected: &'static str,
        /// What was passed.
        found: String,
    },
    /// Raised for arguments the builtin does not accept.
    #[error("{builtin}: unexpected argument {name}")]
    UnexpectedArgument {
        /// Builtin being called.
        builtin: &'static str,
        /// Offending keyword, or the position of an extra positional value.
        name: String,
    },
    /// Raised when an action has no resources and no defaults to fall back on.
    #[error("{builtin}: no resources given and no default resources set")]
    NoResources {
        /// Builtin being called.
        builtin: &'static str,
    },
    /// Raised when a provider cannot resolve its resources.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// Raised when defaults change after the first action.
    #[error(transparent)]
    Defaults(#[from] DefaultsError),
}

/// Script-scoped state shared by every builtin call.
#[derive(Debug)]
pub struct ScriptContext<P> {
    defaults: Defaults,
    executor: FanOutExecutor<P>,
}

impl<P> ScriptContext<P>
where
    P: SessionProvider + 'static,
    P::Session: 'static,
{
    /// Creates a context from initial defaults and an executor.
    #[must_use]
    pub const fn new(defaults: Defaults, executor: FanOutExecutor<P>) -> Self {
        Self { defaults, executor }
    }

    /// Current defaults.
    #[must_use]
    pub const fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Invokes builtin `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] when the name is unknown, an argument cannot
    /// be converted, resources fail to resolve, or defaults are frozen.
    pub async fn call(&mut self, name: &str, args: Arguments) -> Result<Value, BridgeError> {
        debug!(builtin = name, "calling builtin");
        match name {
            "ssh_config" => self.ssh_config(args),
            "host_list_provider" => self.host_list_provider(args),
            "resources" => resources(args),
            "set_defaults" => self.set_defaults(args).map(|()| Value::None),
            "copy_from" => self.copy_from(args).await,
            _ => Err(BridgeError::UnknownBuiltin {
                name: name.to_owned(),
            }),
        }
    }

    /// `ssh_config(username, port, private_key_path, max_retries)`.
    ///
    /// Omitted parameters inherit the current default SSH configuration.
    fn ssh_config(&self, args: Arguments) -> Result<Value, BridgeError> {
        let mut reader = ArgReader::bind(
            "ssh_config",
            &["username", "port", "private_key_path", "max_retries"],
            args,
        )?;
        let base = self.defaults.ssh();
        let config = SshConfig {
            username: reader.string("username")?.unwrap_or_else(|| base.username.clone()),
            port: reader
                .int_in::<u16>("port", "a port between 1 and 65535")?
                .unwrap_or(base.port),
            private_key_path: reader
                .string("private_key_path")?
                .or_else(|| base.private_key_path.clone()),
            max_retries: reader
                .int_in::<u32>("max_retries", "a positive integer")?
                .unwrap_or(base.max_retries),
            timeout: base.timeout,
        };
        Ok(Value::SshConfig(config))
    }

    /// `host_list_provider(hosts, ssh_config)`.
    fn host_list_provider(&self, args: Arguments) -> Result<Value, BridgeError> {
        let mut reader = ArgReader::bind("host_list_provider", &["hosts", "ssh_config"], args)?;
        let value = reader.take("hosts").ok_or_else(|| reader.missing("hosts"))?;
        let hosts = match value.as_list() {
            Some(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| reader.invalid("hosts", "a list of strings", item))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => value
                .as_str()
                .map(|host| vec![host.to_owned()])
                .ok_or_else(|| reader.invalid("hosts", "a list of strings", &value))?,
        };
        let ssh = match reader.take("ssh_config") {
            Some(Value::SshConfig(config)) => config,
            Some(other) => return Err(reader.invalid("ssh_config", "an ssh_config", &other)),
            None => self.defaults.ssh().clone(),
        };
        Ok(Value::Provider(HostListProvider::new(hosts, ssh)))
    }

    /// `set_defaults(...)`: accepts an `ssh_config`, a resource list, or a
    /// working directory string, positionally or by name.
    fn set_defaults(&mut self, args: Arguments) -> Result<(), BridgeError> {
        const BUILTIN: &str = "set_defaults";
        let mut updates = args
            .positional
            .into_iter()
            .map(|value| (None, value))
            .collect::<Vec<_>>();
        for (name, value) in args.named {
            match name.as_str() {
                "ssh_config" | "resources" | "workdir" => updates.push((Some(name), value)),
                _ => {
                    return Err(BridgeError::UnexpectedArgument {
                        builtin: BUILTIN,
                        name,
                    });
                }
            }
        }

        for (name, value) in updates {
            match (name.as_deref(), value) {
                (None | Some("ssh_config"), Value::SshConfig(config)) => {
                    self.defaults.set_ssh(config)?;
                }
                (None | Some("workdir"), Value::Str(path)) => self.defaults.set_workdir(path)?,
                (None | Some("resources"), candidate) => {
                    let list = resource_list(candidate).map_err(|found| {
                        BridgeError::InvalidArgument {
                            builtin: BUILTIN,
                            name: "resources",
                            expected: "an ssh_config, a resource list, or a workdir string",
                            found,
                        }
                    })?;
                    self.defaults.set_resources(list)?;
                }
                (Some(_), other) => {
                    return Err(BridgeError::InvalidArgument {
                        builtin: BUILTIN,
                        name: "value",
                        expected: "an ssh_config, a resource list, or a workdir string",
                        found: other.type_name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// `copy_from(path, resources, compress)`.
    ///
    /// Returns one struct for a single resource and a list otherwise. The
    /// first call freezes the defaults.
    async fn copy_from(&mut self, args: Arguments) -> Result<Value, BridgeError> {
        const BUILTIN: &str = "copy_from";
        let mut reader = ArgReader::bind(BUILTIN, &["path", "resources", "compress"], args)?;
        let path = reader
            .string("path")?
            .unwrap_or_else(|| DEFAULT_COPY_PATH.to_owned());
        let compress = reader.bool("compress")?.unwrap_or(false);
        let targets = match reader.take("resources") {
            Some(value) => resource_list(value).map_err(|found| BridgeError::InvalidArgument {
                builtin: BUILTIN,
                name: "resources",
                expected: "a resource list",
                found,
            })?,
            None => self
                .defaults
                .resources()
                .map(<[HostResource]>::to_vec)
                .ok_or(BridgeError::NoResources { builtin: BUILTIN })?,
        };
        if path.trim().is_empty() {
            return Err(reader.invalid("path", "a non-empty path", &Value::Str(path)));
        }

        self.defaults.freeze();
        let action = Action::CopyFrom(CopyParams { path, compress });
        let outcomes = self
            .executor
            .execute(&action, &targets, self.defaults.workdir())
            .await;
        Ok(ActionResult::aggregate(outcomes, ResultShape::Singular).into())
    }
}

/// `resources(provider)`.
fn resources(args: Arguments) -> Result<Value, BridgeError> {
    let mut reader = ArgReader::bind("resources", &["provider"], args)?;
    match reader.take("provider") {
        Some(Value::Provider(provider)) => Ok(provider
            .resolve()?
            .into_iter()
            .map(Value::Resource)
            .collect::<Vec<_>>()
            .into()),
        Some(other) => Err(reader.invalid("provider", "a host_list_provider", &other)),
        None => Err(reader.missing("provider")),
    }
}

/// Unpacks a single resource or a list of resources. The error carries a
/// description of what was found instead.
fn resource_list(value: Value) -> Result<Vec<HostResource>, String> {
    match value {
        Value::Resource(resource) => Ok(vec![resource]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Resource(resource) => Ok(resource),
                other => Err(format!("list containing {}", other.type_name())),
            })
            .collect(),
        other => Err(other.type_name().to_owned()),
    }
}

/// Arguments bound to a builtin's parameter names.
struct ArgReader {
    builtin: &'static str,
    values: BTreeMap<&'static str, Value>,
}

impl ArgReader {
    fn bind(
        builtin: &'static str,
        params: &[&'static str],
        args: Arguments,
    ) -> Result<Self, BridgeError> {
        if args.positional.len() > params.len() {
            return Err(BridgeError::UnexpectedArgument {
                builtin,
                name: format!("at position {}", params.len() + 1),
            });
        }
        let mut values = params
            .iter()
            .copied()
            .zip(args.positional)
            .collect::<BTreeMap<_, _>>();
        for (name, value) in args.named {
            let Some(param) = params.iter().copied().find(|param| *param == name) else {
                return Err(BridgeError::UnexpectedArgument { builtin, name });
            };
            if values.insert(param, value).is_some() {
                return Err(BridgeError::UnexpectedArgument {
                    builtin,
                    name: format!("{name} (given twice)"),
                });
            }
        }
        Ok(Self { builtin, values })
    }

    /// Removes `name`, treating an explicit `None` as absent.
    fn take(&mut self, name: &'static str) -> Option<Value> {
        self.values
            .remove(name)
            .filter(|value| !matches!(value, Value::None))
    }

    fn string(&mut self, name: &'static str) -> Result<Option<String>, BridgeError> {
        match self.take(name) {
            None => Ok(None),
            Some(Value::Str(text)) => Ok(Some(text)),
            Some(other) => Err(self.invalid(name, "a string", &other)),
        }
    }

    fn bool(&mut self, name: &'static str) -> Result<Option<bool>, BridgeError> {
        match self.take(name) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(flag)),
            Some(other) => Err(self.invalid(name, "a bool", &other)),
        }
    }

    /// Reads a positive integer that fits `T`.
    fn int_in<T: TryFrom<i64>>(
        &mut self,
        name: &'static str,
        expected: &'static str,
    ) -> Result<Option<T>, BridgeError> {
        let Some(value) = self.take(name) else {
            return Ok(None);
        };
        let parsed = match &value {
            Value::Int(number) => Some(*number),
            Value::Str(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .filter(|number| *number > 0)
            .and_then(|number| T::try_from(number).ok())
            .map(Some)
            .ok_or_else(|| self.invalid(name, expected, &value))
    }

    const fn missing(&self, name: &'static str) -> BridgeError {
        BridgeError::MissingArgument {
            builtin: self.builtin,
            name,
        }
    }

    fn invalid(&self, name: &'static str, expected: &'static str, found: &Value) -> BridgeError {
        let description = match found {
            Value::Int(number) => number.to_string(),
            Value::Str(text) => format!("{text:?}"),
            other => other.type_name().to_owned(),
        };
        BridgeError::InvalidArgument {
            builtin: self.builtin,
            name,
            expected,
            found: description,
        }
    }
}

#[cfg(test)]
mod tests;
