//! Dynamically typed values exchanged with the embedded scripting surface.

use std::collections::BTreeMap;

use crate::outcome::{ActionOutcome, ActionResult};
use crate::resource::{HostListProvider, HostResource, SshConfig};

/// A value as seen by the scripting surface.
///
/// The core never consumes these directly; builtins convert them into typed
/// parameters first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Value {
    /// Absent value.
    #[default]
    None,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Result of `ssh_config(...)`.
    SshConfig(SshConfig),
    /// Result of `host_list_provider(...)`.
    Provider(HostListProvider),
    /// One element of `resources(...)`.
    Resource(HostResource),
    /// Record with named fields, such as an action outcome.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Field `name` of a struct value.
    #[cfg(test)]
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Borrowed string contents.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// List elements.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the value's type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::SshConfig(_) => "ssh_config",
            Self::Provider(_) => "host_list_provider",
            Self::Resource(_) => "resource",
            Self::Struct(_) => "struct",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<ActionOutcome> for Value {
    fn from(outcome: ActionOutcome) -> Self {
        Self::Struct(BTreeMap::from([
            (String::from("resource"), Self::Str(outcome.resource)),
            (String::from("err"), Self::Str(outcome.err)),
            (String::from("result"), Self::Str(outcome.result)),
        ]))
    }
}

impl From<ActionResult> for Value {
    fn from(result: ActionResult) -> Self {
        match result {
            ActionResult::Single(outcome) => outcome.into(),
            ActionResult::List(outcomes) => outcomes.into(),
        }
    }
}

/// Positional and named arguments of one builtin call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Arguments {
    /// Positional arguments in call order.
    pub positional: Vec<Value>,
    /// Keyword arguments.
    pub named: Vec<(String, Value)>,
}

impl Arguments {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named.push((name.to_owned(), value.into()));
        self
    }
}
