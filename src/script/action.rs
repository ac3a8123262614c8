//! Action instructions: work executed against every resolved host.

use super::error::ScriptError;
use super::instruction::{Keyword, split_args};

/// `COPY path [path ...]`: remote files (glob patterns allowed) to collect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyInstruction {
    paths: Vec<String>,
}

impl CopyInstruction {
    pub(super) fn parse(remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let paths = split_args(remainder);
        if paths.is_empty() {
            return Err(ScriptError::MissingArgument {
                keyword: Keyword::Copy.as_str(),
                line,
                what: "path",
            });
        }
        Ok(Self { paths })
    }

    /// Remote paths in source order.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// `CAPTURE cmd` / `RUN cmd`: a shell command run on every host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInstruction {
    command: String,
}

impl CommandInstruction {
    pub(super) fn parse(keyword: Keyword, remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let command = remainder.trim();
        if command.is_empty() {
            return Err(ScriptError::MissingArgument {
                keyword: keyword.as_str(),
                line,
                what: "command",
            });
        }
        if let Some(bad) = command.chars().find(|ch| ch.is_control()) {
            return Err(ScriptError::InvalidArgument {
                keyword: keyword.as_str(),
                line,
                token: command.to_owned(),
                reason: format!("control character {bad:?} is not allowed"),
            });
        }
        Ok(Self {
            command: command.to_owned(),
        })
    }

    /// Command text exactly as written after the keyword.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}
