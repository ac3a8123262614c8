//! Instruction keywords, payloads, and the keyword registry.
//!
//! Each keyword maps to a single registration that records whether the
//! instruction is a preamble or an action and which payload parser owns its
//! argument grammar. Lookup is case-insensitive.

use std::fmt;

use super::action::{CommandInstruction, CopyInstruction};
use super::error::ScriptError;
use super::preamble::{AuthConfigInstruction, EnvInstruction, FromInstruction, WorkdirInstruction};

/// Closed set of instruction keywords understood by the parser.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Keyword {
    /// Declares the hosts actions run against.
    From,
    /// Declares SSH credentials shared by every host.
    AuthConfig,
    /// Declares the local directory receiving artifacts.
    Workdir,
    /// Declares environment variables exported to remote commands.
    Env,
    /// Copies remote files into the working directory.
    Copy,
    /// Runs a remote command and stores its output as an artifact.
    Capture,
    /// Runs a remote command and reports its output inline.
    Run,
}

impl Keyword {
    /// Canonical upper-case spelling used in scripts and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::AuthConfig => "AUTHCONFIG",
            Self::Workdir => "WORKDIR",
            Self::Env => "ENV",
            Self::Copy => "COPY",
            Self::Capture => "CAPTURE",
            Self::Run => "RUN",
        }
    }

    /// Whether the keyword configures later actions or performs work.
    #[must_use]
    pub const fn class(self) -> InstructionClass {
        match self {
            Self::From | Self::AuthConfig | Self::Workdir | Self::Env => {
                InstructionClass::Preamble
            }
            Self::Copy | Self::Capture | Self::Run => InstructionClass::Action,
        }
    }

    /// Resolves `word` against the registry, ignoring ASCII case.
    #[must_use]
    pub fn lookup(word: &str) -> Option<Self> {
        registration(word).map(|entry| entry.keyword)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification assigned to every instruction at parse time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstructionClass {
    /// Configuration that may repeat and accumulates state.
    Preamble,
    /// Work executed against resources that yields a result.
    Action,
}

/// Typed, keyword-specific payload of a parsed instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    /// Payload of `FROM`.
    From(FromInstruction),
    /// Payload of `AUTHCONFIG`.
    AuthConfig(AuthConfigInstruction),
    /// Payload of `WORKDIR`.
    Workdir(WorkdirInstruction),
    /// Payload of `ENV`.
    Env(EnvInstruction),
    /// Payload of `COPY`.
    Copy(CopyInstruction),
    /// Payload of `CAPTURE`.
    Capture(CommandInstruction),
    /// Payload of `RUN`.
    Run(CommandInstruction),
}

/// One parsed script statement. Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    keyword: Keyword,
    args: Vec<String>,
    payload: Payload,
    line: usize,
}

impl Instruction {
    /// Keyword that introduced the instruction.
    #[must_use]
    pub const fn keyword(&self) -> Keyword {
        self.keyword
    }

    /// Raw whitespace-separated argument tokens.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Typed payload produced by the keyword's parser.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// 1-based source line on which the instruction starts.
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Preamble or action classification.
    #[must_use]
    pub const fn class(&self) -> InstructionClass {
        self.keyword.class()
    }

    /// Returns the `ENV` payload when this is an `ENV` instruction.
    #[must_use]
    pub const fn as_env(&self) -> Option<&EnvInstruction> {
        match &self.payload {
            Payload::Env(env) => Some(env),
            _ => None,
        }
    }

    /// Parses a single logical line that has already been split into
    /// `keyword` and `remainder`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::UnknownKeyword`] when `keyword` is not
    /// registered, or the keyword parser's error when the remainder fails
    /// its grammar.
    pub fn parse(keyword: &str, remainder: &str, line: usize) -> Result<Self, ScriptError> {
        let entry = registration(keyword).ok_or_else(|| ScriptError::UnknownKeyword {
            keyword: keyword.to_owned(),
            line,
        })?;
        let payload = (entry.parse)(remainder, line)?;
        Ok(Self {
            keyword: entry.keyword,
            args: split_args(remainder),
            payload,
            line,
        })
    }
}

type PayloadParser = fn(&str, usize) -> Result<Payload, ScriptError>;

struct Registration {
    keyword: Keyword,
    parse: PayloadParser,
}

static REGISTRY: [Registration; 7] = [
    Registration {
        keyword: Keyword::From,
        parse: |rest, line| FromInstruction::parse(rest, line).map(Payload::From),
    },
    Registration {
        keyword: Keyword::AuthConfig,
        parse: |rest, line| AuthConfigInstruction::parse(rest, line).map(Payload::AuthConfig),
    },
    Registration {
        keyword: Keyword::Workdir,
        parse: |rest, line| WorkdirInstruction::parse(rest, line).map(Payload::Workdir),
    },
    Registration {
        keyword: Keyword::Env,
        parse: |rest, line| EnvInstruction::parse(rest, line).map(Payload::Env),
    },
    Registration {
        keyword: Keyword::Copy,
        parse: |rest, line| CopyInstruction::parse(rest, line).map(Payload::Copy),
    },
    Registration {
        keyword: Keyword::Capture,
        parse: |rest, line| {
            CommandInstruction::parse(Keyword::Capture, rest, line).map(Payload::Capture)
        },
    },
    Registration {
        keyword: Keyword::Run,
        parse: |rest, line| CommandInstruction::parse(Keyword::Run, rest, line).map(Payload::Run),
    },
];

fn registration(word: &str) -> Option<&'static Registration> {
    REGISTRY
        .iter()
        .find(|entry| entry.keyword.as_str().eq_ignore_ascii_case(word))
}

/// Splits `text` on unescaped whitespace. Backslash escapes are kept in the
/// resulting tokens so consumers see the argument exactly as written.
pub(crate) fn split_args(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            current.push(ch);
            escaped = true;
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
