use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Pipeline stage an [`Error`] originated from.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Lex,
    Parse,
    Semantic,
    Codegen,
    Driver,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Phase::Lex => write!(f, "lex"),
            Phase::Parse => write!(f, "parse"),
            Phase::Semantic => write!(f, "semantic"),
            Phase::Codegen => write!(f, "codegen"),
            Phase::Driver => write!(f, "driver"),
        }
    }
}

/// Everything that can go wrong while translating a Snowball source.
///
/// The first error aborts translation; there is no recovery. Lines and
/// columns are 1-based.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error at line {line} col {column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("escape error at line {line} col {column}: {message}")]
    Escape {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("parse error at line {line} col {column}: expected {expected}, got {got}")]
    Parse {
        line: usize,
        column: usize,
        expected: String,
        got: String,
    },
    #[error("name error at line {line} col {column}: {message}")]
    Name {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("mode error at line {line} col {column}: {message}")]
    Mode {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("codegen error: {message}")]
    Codegen { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn phase(&self) -> Phase {
        match self {
            Error::Lex { .. } | Error::Escape { .. } => Phase::Lex,
            Error::Parse { .. } => Phase::Parse,
            Error::Name { .. } | Error::Mode { .. } => Phase::Semantic,
            Error::Codegen { .. } => Phase::Codegen,
            Error::Io(_) => Phase::Driver,
        }
    }

    /// Source position of the error, when it has one.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Error::Lex { line, column, .. }
            | Error::Escape { line, column, .. }
            | Error::Parse { line, column, .. }
            | Error::Name { line, column, .. }
            | Error::Mode { line, column, .. } => Some((*line, *column)),
            Error::Codegen { .. } | Error::Io(_) => None,
        }
    }

    pub fn lex(line: usize, column: usize, message: impl Into<String>) -> Self {
        Error::Lex {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn escape(line: usize, column: usize, message: impl Into<String>) -> Self {
        Error::Escape {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn parse(
        line: usize,
        column: usize,
        expected: impl Into<String>,
        got: impl Display,
    ) -> Self {
        Error::Parse {
            line,
            column,
            expected: expected.into(),
            got: got.to_string(),
        }
    }

    pub fn name(line: usize, column: usize, message: impl Into<String>) -> Self {
        Error::Name {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn mode(line: usize, column: usize, message: impl Into<String>) -> Self {
        Error::Mode {
            line,
            column,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
