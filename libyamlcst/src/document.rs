//! Document driver.
//!
//! A stream holds zero or more documents separated by `---` (start) and
//! `...` (end) markers. Each document gets one root node composed at block
//! scope, plus whatever comments, stray tags and diagnostics were collected
//! while reading it.

use std::mem;

use log::debug;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Diagnostic, ErrorKind, ParseContext, Warning};
use crate::node::{Node, NodeKind};
use crate::parser::{Context, GrammarResult, State};

/// One YAML document of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Document {
    pub start: usize,
    pub end: usize,
    /// `DOC_START`, the root node and `DOC_END` in source order. Any of them
    /// may be missing.
    pub nodes: Vec<Node>,
    pub comments: Vec<Node>,
    /// Tags not claimed by any pair or item.
    pub tags: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    /// The content node, if the document has one.
    pub fn root(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| !matches!(n.kind, NodeKind::DocStart | NodeKind::DocEnd))
    }

    /// Returns `true` if a tab was used as whitespace in this document.
    pub fn has_tab_diagnostic(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.warning == Warning::TabCharacter)
    }
}

/// Result of parsing a stream.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Parsed {
    pub documents: Vec<Document>,
    /// Byte length of every line of `input`.
    pub line_lengths: Vec<usize>,
    /// The normalized text all offsets refer to.
    pub input: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) ctx: ParseContext,
}

/// Read every document of the stream.
pub(crate) fn read_stream(state: &mut State) -> GrammarResult<Vec<Document>> {
    let mut documents = Vec::new();
    let mut start = 0;
    state.scan_indent();

    while state.position < state.text_len() {
        let document = read_document(state, start)?;
        debug!(
            "document {} spans {}..{} with {} diagnostics",
            documents.len(),
            document.start,
            document.end,
            document.diagnostics.len()
        );
        start = document.end;
        documents.push(document);
    }
    Ok(documents)
}

fn read_document(state: &mut State, start: usize) -> GrammarResult<Document> {
    state.skip_separation_space(true);

    if state.ch() == b'%' && state.position == state.line_start {
        return Err(state.fatal(ErrorKind::DirectiveNotSupported));
    }

    if state.position == state.line_start && state.ch() == b'-' && state.at_document_separator() {
        let marker = state.position;
        state.position += 3;
        state.nodes.push(Node::new(NodeKind::DocStart, marker, marker + 3));
        state.skip_separation_space(true);
    }

    if let Some(root) = state.compose_node(state.line_indent - 1, Context::BlockOut, false, true)? {
        state.nodes.push(root);
    }
    state.skip_separation_space(true);

    if state.position == state.line_start && state.at_document_separator() {
        if state.ch() == b'.' {
            let marker = state.position;
            state.position += 3;
            state.nodes.push(Node::new(NodeKind::DocEnd, marker, marker + 3));
            state.skip_separation_space(true);
        }
    } else if state.position < state.text_len() {
        return Err(state.fatal(ErrorKind::DocumentSeparatorExpected));
    }

    Ok(Document {
        start,
        end: state.position,
        nodes: mem::take(&mut state.nodes),
        comments: mem::take(&mut state.comments),
        tags: mem::take(&mut state.tags),
        diagnostics: mem::take(&mut state.diagnostics),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documents(text: &str) -> Vec<Document> {
        let ctx = ParseContext::new(None);
        let text = crate::scanner::normalize(text, None);
        let mut state = State::new(&text, &ctx);
        read_stream(&mut state).unwrap()
    }

    fn error(text: &str) -> ErrorKind {
        let ctx = ParseContext::new(None);
        let text = crate::scanner::normalize(text, None);
        let mut state = State::new(&text, &ctx);
        read_stream(&mut state).unwrap_err().into_error().kind
    }

    fn kinds(document: &Document) -> Vec<&'static str> {
        document.nodes.iter().map(Node::kind_name).collect()
    }

    #[test]
    fn test_empty_stream() {
        assert!(documents("").is_empty());
        let blank = documents("\n# only a comment\n");
        assert_eq!(blank.len(), 1);
        assert!(blank[0].root().is_none());
        assert_eq!(blank[0].comments.len(), 1);
    }

    #[test]
    fn test_single_document() {
        let docs = documents("a: 1\n");
        assert_eq!(docs.len(), 1);
        assert_eq!(kinds(&docs[0]), ["MAPPING"]);
        assert_eq!((docs[0].start, docs[0].end), (0, 5));
        assert_eq!(docs[0].root().unwrap().kind_name(), "MAPPING");
    }

    #[test]
    fn test_document_markers() {
        let docs = documents("--- a\n...\n--- b\n");
        assert_eq!(docs.len(), 2);
        assert_eq!(kinds(&docs[0]), ["DOC_START", "SCALAR", "DOC_END"]);
        assert_eq!(kinds(&docs[1]), ["DOC_START", "SCALAR"]);
        assert_eq!(docs[0].end, docs[1].start);
        assert_eq!(docs[1].end, 16);
    }

    #[test]
    fn test_start_marker_ends_previous_document() {
        let docs = documents("a: 1\n---\nb: 2\n");
        assert_eq!(docs.len(), 2);
        assert_eq!(kinds(&docs[0]), ["MAPPING"]);
        assert_eq!(kinds(&docs[1]), ["DOC_START", "MAPPING"]);
    }

    #[test]
    fn test_empty_documents() {
        let docs = documents("---\n---\n");
        assert_eq!(docs.len(), 2);
        assert!(docs[0].root().is_none());
    }

    #[test]
    fn test_comments_belong_to_their_document() {
        let docs = documents("# one\na: 1\n---\n# two\n");
        assert_eq!(docs[0].comments.len(), 1);
        assert_eq!(docs[1].comments.len(), 1);
        assert_eq!(docs[1].comments[0].kind, NodeKind::Comment("# two".to_string()));
    }

    #[test]
    fn test_directive_is_fatal() {
        assert_eq!(error("%YAML 1.2\n---\na\n"), ErrorKind::DirectiveNotSupported);
    }

    #[test]
    fn test_trailing_content_is_fatal() {
        assert_eq!(error("'a' b\n"), ErrorKind::DocumentSeparatorExpected);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_document() {
        let docs = documents("a: 1\n");
        let json = serde_json::to_value(&docs[0]).unwrap();
        assert_eq!(json["start"], 0);
        let pair = &json["nodes"][0]["kind"]["Mapping"][0];
        assert_eq!(pair["kind"]["Pair"]["key"]["kind"]["Scalar"]["raw"], "a");
        assert_eq!(pair["parent"]["slot"], "Item");
    }

    #[test]
    fn test_tab_diagnostic() {
        let docs = documents("a:\t1\n");
        assert!(docs[0].has_tab_diagnostic());
        assert!(!documents("a: 1\n")[0].has_tab_diagnostic());
    }
}
