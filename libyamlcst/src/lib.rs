//! Concrete syntax tree parser for YAML.
//!
//! Unlike a loader, this parser does not build values. It keeps every node,
//! comment and tag together with its byte range, so editors and linters can
//! map a cursor back to the syntax under it.
//!
//! # Parsing Pipeline
//!
//! 1. **Scanner**: Normalizes line endings, strips a BOM and (in legacy mode)
//!    expands tabs.
//!
//! 2. **Grammar**: A recursive descent over the normalized bytes, driven by
//!    indentation and block/flow context, builds one tree per document.
//!
//! 3. **Recovery**: A missing colon after an implicit key is repaired by
//!    inserting one and parsing again. Multi-line implicit keys are repaired
//!    in place.
//!
//! The resulting [`Parsed`] stream can be queried by position with
//! [`Parsed::find_node_at_position`], and scalar nodes decoded with
//! [`decode_scalar`].

mod chars;
mod decode;
mod document;
mod error;
mod node;
mod parser;
mod position;
mod scanner;

use log::debug;

pub use decode::decode_scalar;
pub use document::{Document, Parsed};
pub use error::{Diagnostic, ErrorKind, ParseContext, ParseError, Result, Warning};
pub use node::{
    BlockHeader, BlockScalar, BlockStyle, Chomping, Node, NodeKind, Pair, Parent, ParentKind,
    Scalar, ScalarStyle, Slot,
};
pub use position::{find_node_at_position, FoundNode, NodeMatch};
pub use scanner::{line_lengths, normalize};

use error::Failure;
use parser::GrammarResult;

/// Tab width used by [`parse_legacy`].
pub const LEGACY_TAB_WIDTH: usize = 2;

/// Parser configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Named in error messages.
    pub filename: Option<String>,
    /// Expand tabs to this many spaces before parsing.
    pub tab_width: Option<usize>,
    /// Retry once with a repaired input after a recoverable error.
    pub recover: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            filename: None,
            tab_width: None,
            recover: true,
        }
    }
}

impl ParseOptions {
    /// Options of the legacy entry point, which expands tabs.
    pub fn legacy(tab_width: usize) -> Self {
        Self {
            tab_width: Some(tab_width),
            ..Self::default()
        }
    }
}

/// Parse a YAML stream.
///
/// # Example
///
/// ```
/// use libyamlcst::parse;
///
/// let parsed = parse("a: 1\n").unwrap();
/// let root = parsed.documents[0].root().unwrap();
/// assert_eq!(root.kind_name(), "MAPPING");
/// ```
pub fn parse(text: &str) -> Result<Parsed> {
    parse_with_options(text, &ParseOptions::default())
}

/// Parse a YAML stream with a filename for error messages.
pub fn parse_with_filename(text: &str, filename: Option<&str>) -> Result<Parsed> {
    let options = ParseOptions {
        filename: filename.map(String::from),
        ..ParseOptions::default()
    };
    parse_with_options(text, &options)
}

/// Parse a YAML stream after expanding tabs to [`LEGACY_TAB_WIDTH`] spaces.
pub fn parse_legacy(text: &str) -> Result<Parsed> {
    parse_with_options(text, &ParseOptions::legacy(LEGACY_TAB_WIDTH))
}

/// Parse a YAML stream with explicit options.
///
/// When recovery is enabled and the grammar reports a repairable error, the
/// suggested insertion is applied and the text parsed once more. If that
/// second attempt fails too, the original error is returned.
pub fn parse_with_options(text: &str, options: &ParseOptions) -> Result<Parsed> {
    let ctx = ParseContext::new(options.filename.as_deref());
    let input = scanner::normalize(text, options.tab_width);

    match parse_normalized(&input, &ctx) {
        Ok(parsed) => Ok(parsed),
        Err(Failure::Recoverable { error, fix }) if options.recover => {
            debug!("{}; retrying with {:?} inserted at {}", error, fix.text, fix.offset);
            let patched = fix.apply(&input);
            parse_normalized(&patched, &ctx).map_err(|retry| {
                debug!("retry failed: {}", retry.into_error());
                error
            })
        }
        Err(failure) => Err(failure.into_error()),
    }
}

fn parse_normalized(input: &str, ctx: &ParseContext) -> GrammarResult<Parsed> {
    let mut state = parser::State::new(input, ctx);
    let documents = document::read_stream(&mut state)?;
    Ok(Parsed {
        documents,
        line_lengths: scanner::line_lengths(input),
        input: input.to_string(),
        ctx: ctx.clone(),
    })
}
