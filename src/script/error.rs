//! Syntax errors raised while parsing diagnostics scripts.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced while turning script text into a [`super::Script`].
///
/// Every variant that originates from a line carries the 1-based line number
/// so users can jump straight to the offending instruction.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptError {
    /// Raised when a line starts with a word that is not a known instruction.
    #[error("line {line}: unknown instruction {keyword:?}")]
    UnknownKeyword {
        /// Word found in keyword position.
        keyword: String,
        /// Line on which the word appeared.
        line: usize,
    },
    /// Raised when an instruction is missing a required argument.
    #[error("line {line}: {keyword}: missing {what}")]
    MissingArgument {
        /// Instruction keyword.
        keyword: &'static str,
        /// Line of the instruction.
        line: usize,
        /// Description of the missing argument (for example `env`).
        what: &'static str,
    },
    /// Raised when an argument token fails the instruction's grammar.
    #[error("line {line}: {keyword}: invalid argument {token:?}: {reason}")]
    InvalidArgument {
        /// Instruction keyword.
        keyword: &'static str,
        /// Line of the instruction.
        line: usize,
        /// Offending token exactly as written.
        token: String,
        /// Why the token was rejected.
        reason: String,
    },
    /// Raised when an instruction receives more arguments than it accepts.
    #[error("line {line}: {keyword}: expected {expected} argument(s), found {found}")]
    TooManyArguments {
        /// Instruction keyword.
        keyword: &'static str,
        /// Line of the instruction.
        line: usize,
        /// Number of arguments the instruction accepts.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },
    /// Raised when the script ends inside a line continuation.
    #[error("line {line}: unterminated line continuation")]
    UnterminatedContinuation {
        /// Line on which the continued instruction started.
        line: usize,
    },
    /// Raised when a script file cannot be read.
    #[error("failed to read script {path}: {message}")]
    Read {
        /// Script path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}
