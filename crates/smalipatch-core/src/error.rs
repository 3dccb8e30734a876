//! Error types shared by the parser, the applier and the generator.
//!
//! [`ParseError`] is fatal for a whole document. [`ApplyError`] describes why a
//! single directive could not be applied; the run policy decides whether the
//! rest of the document continues.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based line number in the patch document.
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unknown directive keyword `{0}`")]
    UnknownKeyword(String),

    #[error("`{keyword}` requires {what}")]
    MissingArgument {
        keyword: &'static str,
        what: &'static str,
    },

    #[error("`{keyword}` is missing its {what}")]
    MissingBlock {
        keyword: &'static str,
        what: &'static str,
    },

    #[error("`{keyword}` block not terminated: {reason}")]
    Unterminated {
        keyword: &'static str,
        reason: &'static str,
    },

    #[error("`{0}` must appear inside a FILE block")]
    DirectiveOutsideFile(&'static str),

    #[error("CREDIT lines must precede all edit blocks")]
    CreditAfterEdits,

    #[error("path `{path}` already targeted by the block at line {first_line}")]
    DuplicatePath { path: String, first_line: usize },

    #[error("path `{0}` must be relative to the work root")]
    InvalidPath(String),

    #[error("context line must start with two spaces, `- ` or `+ `: `{0}`")]
    MalformedContextLine(String),

    #[error("FIND_REPLACE expects two quoted strings with a non-empty search: {0}")]
    MalformedFindReplace(String),

    #[error("END without an open block")]
    UnexpectedEnd,
}

/// Why a directive could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("method not found: {signature}")]
    MethodNotFound { signature: String },

    #[error("method already exists: {signature}")]
    MethodAlreadyExists { signature: String },

    #[error("field not found: {name}")]
    FieldNotFound { name: String },

    #[error("field already exists: {name}")]
    FieldAlreadyExists { name: String },

    #[error(
        "context not found in {signature}: context line {context_line} `{expected}` did not match at line {line}"
    )]
    ContextNotFound {
        signature: String,
        /// 1-based index into the PATCH context lines.
        context_line: usize,
        expected: String,
        /// 1-based file line where the closest attempt stopped matching.
        line: usize,
    },

    #[error("file already exists: {}", path.display())]
    FileAlreadyExists { path: PathBuf },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("`{needle}` matched {count} times, expected exactly one")]
    AmbiguousMatch { needle: String, count: usize },

    #[error("`{needle}` not found")]
    NotFound { needle: String },

    #[error("already applied: {signature} is unchanged by this directive")]
    AlreadyApplied { signature: String },

    #[error("malformed class structure at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("{keyword} cannot be applied to {scope}")]
    Misplaced {
        keyword: &'static str,
        scope: &'static str,
    },

    #[error("I/O error on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl ApplyError {
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        ApplyError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("no match")]
    NotFound,

    #[error("{0} matches")]
    Ambiguous(usize),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl LocateError {
    pub(crate) fn into_apply(self, needle: &str, missing: impl FnOnce() -> ApplyError) -> ApplyError {
        match self {
            LocateError::NotFound => missing(),
            LocateError::Ambiguous(count) => ApplyError::AmbiguousMatch {
                needle: needle.to_string(),
                count,
            },
            LocateError::Malformed { line, reason } => ApplyError::Malformed { line, reason },
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot list work tree: {0}")]
    Listing(#[source] std::io::Error),

    #[error("{} is not a well-formed class: {source}", path.display())]
    Structure {
        path: PathBuf,
        #[source]
        source: LocateError,
    },
}
