//! Error and diagnostic types for YAML CST parsing.

use thiserror::Error;

/// Result type for YAML CST parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse context carrying filename for error reporting.
#[derive(Clone, Debug, Default)]
pub struct ParseContext {
    pub filename: Option<String>,
}

impl ParseContext {
    /// Create a new parse context.
    pub fn new(filename: Option<&str>) -> Self {
        Self {
            filename: filename.map(String::from),
        }
    }

    /// Format a location suffix for error messages.
    pub fn loc_suffix(&self, line: usize, col: usize) -> String {
        match &self.filename {
            Some(name) => format!(" at {}:{} of <{}>", line + 1, col + 1, name),
            None => format!(" at {}:{}", line + 1, col + 1),
        }
    }
}

/// What went wrong in a fatal parse error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("a line break is expected")]
    LineBreakExpected,

    #[error("directives are not supported")]
    DirectiveNotSupported,

    #[error("end of the stream or a document separator is expected")]
    DocumentSeparatorExpected,

    #[error("bad explicit indentation width of a block scalar; it cannot be less than one")]
    ZeroIndentation,

    #[error("repeat of an indentation width identifier")]
    RepeatedIndentation,

    #[error("unexpected end of the stream within a single quoted scalar")]
    UnterminatedSingleQuoted,

    #[error("unexpected end of the stream within a double quoted scalar")]
    UnterminatedDoubleQuoted,

    #[error("unexpected end of the document within a single quoted scalar")]
    DocumentEndInSingleQuoted,

    #[error("unexpected end of the document within a double quoted scalar")]
    DocumentEndInDoubleQuoted,

    #[error("unexpected end of the stream within a verbatim tag")]
    UnterminatedVerbatimTag,

    #[error("named tag handle cannot contain such characters")]
    InvalidTagHandle,

    #[error("tag suffix cannot contain exclamation marks")]
    ExclamationInTagSuffix,

    #[error("missed comma between flow collection entries")]
    MissedComma,

    #[error("unexpected end of the stream within a flow collection")]
    UnterminatedFlowCollection,

    #[error("incomplete explicit mapping pair; a key node is missed")]
    MissingExplicitKey,

    #[error("can not read an implicit mapping pair; a colon is missed")]
    MissingColon,

    /// Position lookups refuse documents whose whitespace contained tabs.
    #[error("positions are unreliable in a document containing tab characters")]
    TabsInDocument,
}

/// Error type for YAML CST parsing.
///
/// `offset` is a byte offset into the normalized input; `line` and `column`
/// are zero-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}{suffix}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    suffix: String,
}

impl ParseError {
    /// Create an error with location information.
    pub fn new(kind: ErrorKind, ctx: &ParseContext, offset: usize, line: usize, col: usize) -> Self {
        Self {
            kind,
            offset,
            line,
            column: col,
            suffix: ctx.loc_suffix(line, col),
        }
    }
}

/// A text insertion that may repair the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    pub offset: usize,
    pub text: String,
}

impl Fix {
    /// Splice the insertion into `input`.
    pub fn apply(&self, input: &str) -> String {
        let mut patched = String::with_capacity(input.len() + self.text.len());
        patched.push_str(&input[..self.offset]);
        patched.push_str(&self.text);
        patched.push_str(&input[self.offset..]);
        patched
    }
}

/// Failure inside the grammar.
///
/// Only the outermost entry point looks at `Recoverable`; everything below it
/// just propagates with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    Fatal(ParseError),
    Recoverable { error: ParseError, fix: Fix },
}

impl Failure {
    /// The error to report when the failure is not (or cannot be) repaired.
    pub(crate) fn into_error(self) -> ParseError {
        match self {
            Failure::Fatal(error) => error,
            Failure::Recoverable { error, .. } => error,
        }
    }
}

impl From<ParseError> for Failure {
    fn from(error: ParseError) -> Self {
        Failure::Fatal(error)
    }
}

/// Authoring mistakes that are tolerated and recorded instead of failing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Warning {
    #[error("tab character used as whitespace")]
    TabCharacter,

    #[error("bad indentation of a sequence entry")]
    BadSequenceIndentation,

    #[error("bad indentation of a mapping entry")]
    BadMappingIndentation,

    #[error("a whitespace character is expected after the key-value separator within a block mapping")]
    WhitespaceAfterColon,

    #[error("a multi-line key may not be an implicit key")]
    MultiLineImplicitKey,
}

/// A warning together with the byte offset it was raised at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    pub warning: Warning,
    pub offset: usize,
}
