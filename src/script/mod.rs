//! Dockerfile-like diagnostics scripts.
//!
//! A script is a line-oriented list of instructions such as
//!
//! ```text
//! FROM 10.0.0.5 10.0.0.6:2222
//! AUTHCONFIG username:ops private-key:~/.ssh/id_ed25519
//! ENV LC_ALL=C
//! COPY /var/log/kube-*.log
//! CAPTURE journalctl -u kubelet
//! ```
//!
//! Keywords are case-insensitive, blank lines and `#` comments are skipped,
//! and a trailing backslash continues an instruction on the next line.
//! Parsing is fail-fast: the first malformed instruction aborts the parse and
//! no partial [`Script`] is returned.

use std::collections::BTreeMap;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

mod action;
mod error;
mod instruction;
mod preamble;

pub use action::{CommandInstruction, CopyInstruction};
pub use error::ScriptError;
pub use instruction::{Instruction, InstructionClass, Keyword, Payload};
pub use preamble::{AuthConfigInstruction, EnvInstruction, FromInstruction, WorkdirInstruction};

/// Ordered instructions plus a per-keyword index preserving source order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Script {
    instructions: Vec<Instruction>,
    by_keyword: BTreeMap<Keyword, Vec<Instruction>>,
}

impl Script {
    /// Parses script text.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] encountered; nothing after the
    /// failing instruction is examined.
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut script = Self::default();
        for (line, text) in logical_lines(source)? {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (keyword, remainder) = trimmed
                .split_once(char::is_whitespace)
                .unwrap_or((trimmed, ""));
            script.push(Instruction::parse(keyword, remainder, line)?);
        }
        Ok(script)
    }

    /// Reads and parses the script stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Read`] when the file cannot be read, otherwise
    /// any error from [`Script::parse`].
    pub fn parse_file(path: &Utf8Path) -> Result<Self, ScriptError> {
        let read_error = |message: String| ScriptError::Read {
            path: path.to_path_buf(),
            message,
        };
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| read_error(String::from("path has no file name")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| read_error(err.to_string()))?;
        let source = dir
            .read_to_string(file_name)
            .map_err(|err| read_error(err.to_string()))?;
        Self::parse(&source)
    }

    /// Every instruction in source order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instructions introduced by `keyword`, in source order. Repeated
    /// keywords are kept as distinct entries.
    #[must_use]
    pub fn preambles(&self, keyword: Keyword) -> &[Instruction] {
        self.by_keyword.get(&keyword).map_or(&[], Vec::as_slice)
    }

    /// Action instructions in source order.
    pub fn actions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|instruction| instruction.class() == InstructionClass::Action)
    }

    /// Typed `ENV` payloads in source order.
    pub fn envs(&self) -> impl Iterator<Item = &EnvInstruction> {
        self.preambles(Keyword::Env)
            .iter()
            .filter_map(Instruction::as_env)
    }

    /// Number of parsed instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the script holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn push(&mut self, instruction: Instruction) {
        self.by_keyword
            .entry(instruction.keyword())
            .or_default()
            .push(instruction.clone());
        self.instructions.push(instruction);
    }
}

/// Joins backslash-continued physical lines, tagging each logical line with
/// the 1-based number of its first physical line.
fn logical_lines(source: &str) -> Result<Vec<(usize, String)>, ScriptError> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, physical) in source.lines().enumerate() {
        let number = index + 1;
        let (start, mut text) = pending.take().unwrap_or_else(|| (number, String::new()));
        let trimmed = physical.trim_end();
        if ends_with_continuation(trimmed) {
            text.push_str(trimmed.strip_suffix('\\').unwrap_or(trimmed));
            text.push(' ');
            pending = Some((start, text));
        } else {
            text.push_str(trimmed);
            lines.push((start, text));
        }
    }

    if let Some((start, _)) = pending {
        return Err(ScriptError::UnterminatedContinuation { line: start });
    }
    Ok(lines)
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|ch| *ch == '\\').count();
    trailing & 1 == 1
}
