//! Preamble instructions: configuration that later actions consume.

use super::error::ScriptError;
use super::instruction::{Keyword, split_args};
use crate::resource::parse_address;

/// `FROM host [host ...]`: the hosts every later action runs against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FromInstruction {
    hosts: Vec<String>,
}

impl FromInstruction {
    pub(super) fn parse(remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let hosts = split_args(remainder);
        if hosts.is_empty() {
            return Err(missing(Keyword::From, line, "host"));
        }
        for host in &hosts {
            parse_address(host).map_err(|err| ScriptError::InvalidArgument {
                keyword: Keyword::From.as_str(),
                line,
                token: host.clone(),
                reason: err.to_string(),
            })?;
        }
        Ok(Self { hosts })
    }

    /// Host addresses in source order.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

/// `AUTHCONFIG username:<user> private-key:<path>`: SSH credentials.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthConfigInstruction {
    username: Option<String>,
    private_key: Option<String>,
}

impl AuthConfigInstruction {
    pub(super) fn parse(remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let tokens = split_args(remainder);
        if tokens.is_empty() {
            return Err(missing(Keyword::AuthConfig, line, "username or private-key"));
        }

        let mut auth = Self::default();
        for token in tokens {
            let invalid = |reason: &str| ScriptError::InvalidArgument {
                keyword: Keyword::AuthConfig.as_str(),
                line,
                token: token.clone(),
                reason: reason.to_owned(),
            };
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| invalid("expected key:value"))?;
            if value.is_empty() {
                return Err(invalid("value must not be empty"));
            }
            match key {
                "username" => auth.username = Some(value.to_owned()),
                "private-key" => auth.private_key = Some(value.to_owned()),
                _ => return Err(invalid("expected username or private-key")),
            }
        }
        Ok(auth)
    }

    /// Remote user, when declared.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Private key path, when declared.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }
}

/// `WORKDIR path`: local directory receiving collected artifacts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkdirInstruction {
    path: String,
}

impl WorkdirInstruction {
    pub(super) fn parse(remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let mut tokens = split_args(remainder);
        if tokens.len() > 1 {
            return Err(ScriptError::TooManyArguments {
                keyword: Keyword::Workdir.as_str(),
                line,
                expected: 1,
                found: tokens.len(),
            });
        }
        let path = tokens
            .pop()
            .ok_or_else(|| missing(Keyword::Workdir, line, "path"))?;
        Ok(Self { path })
    }

    /// Directory path as written.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// `ENV KEY=VALUE [KEY=VALUE ...]`: variables exported to remote commands.
///
/// The entries are kept as raw `KEY=VALUE` tokens; consumers decide how to
/// apply them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvInstruction {
    envs: Vec<String>,
}

impl EnvInstruction {
    pub(super) fn parse(remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let envs = split_args(remainder);
        if envs.is_empty() {
            return Err(missing(Keyword::Env, line, "env"));
        }
        for token in &envs {
            validate_pair(token).map_err(|reason| ScriptError::InvalidArgument {
                keyword: Keyword::Env.as_str(),
                line,
                token: token.clone(),
                reason,
            })?;
        }
        Ok(Self { envs })
    }

    /// `KEY=VALUE` entries in source order.
    #[must_use]
    pub fn envs(&self) -> &[String] {
        &self.envs
    }

    /// Entries split into `(name, value)` with backslash escapes resolved.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.envs
            .iter()
            .filter_map(|token| token.split_once('='))
            .map(|(name, value)| (name.to_owned(), unescape(value)))
            .collect()
    }
}

fn unescape(value: &str) -> String {
    let mut resolved = String::with_capacity(value.len());
    let mut escaped = false;
    for ch in value.chars() {
        if ch == '\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        resolved.push(ch);
    }
    resolved
}

fn validate_pair(token: &str) -> Result<(), String> {
    let Some((name, value)) = token.split_once('=') else {
        return Err(String::from("expected NAME=VALUE"));
    };
    if !is_identifier(name) {
        return Err(format!("{name:?} is not a valid variable name"));
    }

    let mut escaped = false;
    for ch in value.chars() {
        if ch.is_control() {
            return Err(String::from("control characters are not allowed"));
        }
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '|' => return Err(String::from("unescaped '|' in value")),
            _ => {}
        }
    }
    if escaped {
        return Err(String::from("value ends with a dangling escape"));
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

const fn missing(keyword: Keyword, line: usize, what: &'static str) -> ScriptError {
    ScriptError::MissingArgument {
        keyword: keyword.as_str(),
        line,
        what,
    }
}
