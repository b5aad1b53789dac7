//! Error types for rule compilation.
//!
//! Matching never fails with an error: a rule that does not apply simply
//! reports no match.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("in config line `{line}`: {reason}")]
    Semantic { line: String, reason: SemanticError },
}

impl Error {
    pub(crate) fn semantic(line: &str, reason: SemanticError) -> Self {
        Error::Semantic {
            line: line.trim_end().to_string(),
            reason,
        }
    }

    /// The config line the error refers to.
    pub fn line(&self) -> &str {
        match self {
            Error::Syntax(err) => &err.line,
            Error::Semantic { line, .. } => line,
        }
    }
}

/// Malformed config line, with the byte offset where parsing stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: String,
    pub offset: usize,
    pub reason: &'static str,
}

impl SyntaxError {
    /// Marker line: the text before the offset blanked out (tabs kept so the
    /// caret stays aligned), followed by `^^^`.
    pub fn caret(&self) -> String {
        let end = self.offset.min(self.line.len());
        let head = self.line.get(..end).unwrap_or(&self.line);
        let mut mark: String = head
            .chars()
            .map(|c| if c.is_whitespace() { c } else { ' ' })
            .collect();
        mark.push_str("^^^");
        mark
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.line)?;
        write!(f, "{} syntax error: {}", self.caret(), self.reason)
    }
}

/// Well-formed line with an invalid meaning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("OSC type '{0}' not supported")]
    UnknownOscType(char),

    #[error("could not get variable in OSC path `{0}`, use '{{i}}'")]
    PathPlaceholder(String),

    #[error("midi command `{0}` unknown")]
    UnknownCommand(String),

    #[error("incorrect number of args in midi command `{command}`: expected {expected}, found {found}")]
    ArgCount {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("midi argument {0} is empty")]
    BlankArgument(usize),

    #[error("special `{keyword}` variable used in wrong position (argument {position})")]
    KeywordPosition {
        keyword: &'static str,
        position: usize,
    },

    #[error("scaling of special `{0}` variable not supported")]
    ScaledKeyword(&'static str),

    #[error("`{0}` is not a valid variable name")]
    InvalidVariable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
