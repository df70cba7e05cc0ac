//! Recursive descent grammar.
//!
//! A single [`State`] owns the normalized input and the cursor. Every reader
//! is a method taking `&mut self`: it inspects the byte under the cursor,
//! returns `Ok(None)` when its construct does not start there, and otherwise
//! consumes the construct and returns exactly one node.
//!
//! Readers never look past the `\0` sentinel appended to the input, so
//! lookahead needs no bounds checks.

use std::cmp::Ordering;
use std::mem;

use log::warn;

use crate::chars::{decimal_value, is_eol, is_flow_indicator, is_white_space, is_ws_or_eol};
use crate::error::{Diagnostic, ErrorKind, Failure, Fix, ParseContext, ParseError, Warning};
use crate::node::{
    BlockHeader, BlockScalar, BlockStyle, Chomping, Node, NodeKind, Pair, ParentKind, Scalar,
    ScalarStyle, Slot,
};

/// Result type used inside the grammar.
pub(crate) type GrammarResult<T> = std::result::Result<T, Failure>;

/// Grammatical context of the node being composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
    BlockOut,
    BlockIn,
    FlowOut,
    FlowIn,
}

/// Cursor and pending output of one parse.
pub(crate) struct State<'a> {
    ctx: &'a ParseContext,
    input: Vec<u8>,
    pub(crate) position: usize,
    pub(crate) line: usize,
    pub(crate) line_start: usize,
    /// Leading spaces of the current line; signed so that a parent
    /// indentation of -1 compares naturally.
    pub(crate) line_indent: isize,
    pub(crate) tags: Vec<Node>,
    pub(crate) comments: Vec<Node>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) nodes: Vec<Node>,
}

impl<'a> State<'a> {
    pub(crate) fn new(text: &str, ctx: &'a ParseContext) -> Self {
        let mut input = Vec::with_capacity(text.len() + 1);
        input.extend_from_slice(text.as_bytes());
        input.push(0);
        Self {
            ctx,
            input,
            position: 0,
            line: 0,
            line_start: 0,
            line_indent: 0,
            tags: Vec::new(),
            comments: Vec::new(),
            diagnostics: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Length of the text, excluding the sentinel.
    pub(crate) fn text_len(&self) -> usize {
        self.input.len() - 1
    }

    /// Byte at `i`, or 0 past the end.
    fn at(&self, i: usize) -> u8 {
        self.input.get(i).copied().unwrap_or(0)
    }

    /// Byte under the cursor.
    pub(crate) fn ch(&self) -> u8 {
        self.at(self.position)
    }

    fn peek(&self, n: usize) -> u8 {
        self.at(self.position + n)
    }

    /// Step over the current byte and return the next one.
    fn advance(&mut self) -> u8 {
        self.position += 1;
        self.ch()
    }

    fn slice(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.input[start..end]).into_owned()
    }

    /// Error located at `offset`, which must lie on the current line.
    fn error_at(&self, kind: ErrorKind, offset: usize) -> ParseError {
        ParseError::new(
            kind,
            self.ctx,
            offset,
            self.line,
            offset.saturating_sub(self.line_start),
        )
    }

    pub(crate) fn fatal(&self, kind: ErrorKind) -> Failure {
        Failure::Fatal(self.error_at(kind, self.position))
    }

    fn warn(&mut self, warning: Warning, offset: usize) {
        let diagnostic = Diagnostic { warning, offset };
        if !self.diagnostics.contains(&diagnostic) {
            warn!("{} at line {} (offset {})", warning, self.line + 1, offset);
            self.diagnostics.push(diagnostic);
        }
    }

    fn add_comment(&mut self, start: usize) {
        let raw = self.slice(start, self.position);
        self.comments
            .push(Node::new(NodeKind::Comment(raw), start, self.position));
    }

    // ============================================================================
    // Cursor Primitives
    // ============================================================================

    /// Consume a line break known to be under the cursor.
    fn break_line(&mut self) {
        if self.ch() == b'\r' {
            self.position += 1;
        }
        if self.ch() == b'\n' {
            self.position += 1;
        }
        self.line += 1;
        self.line_start = self.position;
    }

    /// Consume `\n`, `\r\n` or `\r`.
    pub(crate) fn read_line_break(&mut self) -> GrammarResult<()> {
        if !is_eol(self.ch()) {
            return Err(self.fatal(ErrorKind::LineBreakExpected));
        }
        self.break_line();
        Ok(())
    }

    /// Count the leading spaces of the line the cursor starts.
    pub(crate) fn scan_indent(&mut self) {
        self.line_indent = 0;
        while self.ch() == b' ' {
            self.line_indent += 1;
            self.position += 1;
        }
    }

    /// Skip whitespace, comments and line breaks.
    ///
    /// Returns the number of line breaks crossed.
    pub(crate) fn skip_separation_space(&mut self, allow_comments: bool) -> usize {
        let mut line_breaks = 0;
        let mut ch = self.ch();

        while ch != 0 {
            while is_white_space(ch) {
                if ch == b'\t' {
                    self.warn(Warning::TabCharacter, self.position);
                }
                ch = self.advance();
            }

            if allow_comments && ch == b'#' {
                let start = self.position;
                while !is_eol(ch) && ch != 0 {
                    ch = self.advance();
                }
                self.add_comment(start);
            }

            if !is_eol(ch) {
                break;
            }
            self.break_line();
            line_breaks += 1;
            self.scan_indent();
            ch = self.ch();
        }
        line_breaks
    }

    /// `---` or `...` followed by whitespace or the end of input.
    pub(crate) fn at_document_separator(&self) -> bool {
        let ch = self.ch();
        (ch == b'-' || ch == b'.')
            && self.peek(1) == ch
            && self.peek(2) == ch
            && (self.peek(3) == 0 || is_ws_or_eol(self.peek(3)))
    }

    fn at_line_start_separator(&self) -> bool {
        self.position == self.line_start && self.at_document_separator()
    }

    // ============================================================================
    // Node Properties
    // ============================================================================

    /// Read one tag property into the pending tag buffer.
    fn read_tag_property(&mut self) -> GrammarResult<bool> {
        if self.ch() != b'!' {
            return Ok(false);
        }
        let start = self.position;
        let mut ch = self.advance();

        if ch == b'<' {
            // Verbatim: !<tag:yaml.org,2002:str>
            while ch != 0 && ch != b'>' {
                ch = self.advance();
            }
            if ch == 0 {
                return Err(self.fatal(ErrorKind::UnterminatedVerbatimTag));
            }
            self.position += 1;
        } else {
            let mut is_named = false;
            if ch == b'!' {
                is_named = true;
                ch = self.advance();
            }
            while ch != 0 && !is_ws_or_eol(ch) && !is_flow_indicator(ch) {
                if ch == b'!' {
                    if is_named {
                        return Err(self.fatal(ErrorKind::ExclamationInTagSuffix));
                    }
                    if !is_tag_handle(&self.input[start..=self.position]) {
                        return Err(self.fatal(ErrorKind::InvalidTagHandle));
                    }
                    is_named = true;
                }
                ch = self.advance();
            }
        }

        let raw = self.slice(start, self.position);
        self.tags
            .push(Node::new(NodeKind::Tag(raw), start, self.position));
        Ok(true)
    }

    fn take_tags(&mut self, parent: ParentKind) -> Vec<Node> {
        attach_tags(mem::take(&mut self.tags), parent)
    }

    // ============================================================================
    // Scalars
    // ============================================================================

    /// Literal (`|`) or folded (`>`) block scalar.
    fn read_block_scalar(&mut self, node_indent: isize) -> GrammarResult<Option<Node>> {
        let style = match self.ch() {
            b'|' => BlockStyle::Literal,
            b'>' => BlockStyle::Folded,
            _ => return Ok(None),
        };
        let start = self.position;
        let mut chomping = Chomping::Clip;
        let mut explicit_indent = None;
        let mut text_indent = node_indent;
        let mut detected_indent = false;

        let mut ch = self.advance();
        loop {
            if ch == b'+' {
                chomping = Chomping::Keep;
            } else if ch == b'-' {
                chomping = Chomping::Strip;
            } else if let Some(digit) = decimal_value(ch) {
                if digit == 0 {
                    return Err(self.fatal(ErrorKind::ZeroIndentation));
                }
                if detected_indent {
                    return Err(self.fatal(ErrorKind::RepeatedIndentation));
                }
                text_indent = node_indent + digit as isize - 1;
                explicit_indent = Some(digit);
                detected_indent = true;
            } else {
                break;
            }
            ch = self.advance();
        }

        let header = BlockHeader {
            style,
            chomping,
            explicit_indent,
        };
        let indicator = Node::new(NodeKind::BlockIndicator(header), start, self.position);

        if is_white_space(ch) {
            while is_white_space(ch) {
                ch = self.advance();
            }
            if ch == b'#' {
                let comment_start = self.position;
                while !is_eol(ch) && ch != 0 {
                    ch = self.advance();
                }
                self.add_comment(comment_start);
            }
        }

        let mut body_start = None;
        let end = loop {
            if ch == 0 {
                break self.position;
            }
            self.read_line_break()?;
            let line_start = self.position;
            body_start.get_or_insert(line_start);

            self.line_indent = 0;
            ch = self.ch();
            while (!detected_indent || self.line_indent < text_indent) && ch == b' ' {
                self.line_indent += 1;
                ch = self.advance();
            }

            if is_eol(ch) {
                continue;
            }
            if !detected_indent && self.line_indent > text_indent {
                text_indent = self.line_indent;
            }
            if self.line_indent < text_indent {
                break line_start;
            }

            detected_indent = true;
            while !is_eol(ch) && ch != 0 {
                ch = self.advance();
            }
        };

        let body_start = body_start.unwrap_or(end);
        let body = Node::new(
            NodeKind::Scalar(Scalar {
                raw: self.slice(body_start, end),
                style: ScalarStyle::BlockBody {
                    indent: text_indent.max(0) as usize,
                },
            }),
            body_start,
            end,
        );
        let block = BlockScalar {
            indicator: Box::new(indicator.attach(ParentKind::Block, Slot::Indicator)),
            body: Box::new(body.attach(ParentKind::Block, Slot::Body)),
        };
        Ok(Some(Node::new(NodeKind::Block(block), start, end)))
    }

    fn read_single_quoted_scalar(&mut self) -> GrammarResult<Option<Node>> {
        if self.ch() != b'\'' {
            return Ok(None);
        }
        let start = self.position;
        self.position += 1;

        loop {
            let ch = self.ch();
            if ch == 0 {
                return Err(self.fatal(ErrorKind::UnterminatedSingleQuoted));
            } else if ch == b'\'' {
                self.position += 1;
                if self.ch() == b'\'' {
                    self.position += 1;
                } else {
                    return Ok(Some(self.quoted(start, ScalarStyle::SingleQuoted)));
                }
            } else if is_eol(ch) {
                self.skip_separation_space(false);
            } else if self.at_line_start_separator() {
                return Err(self.fatal(ErrorKind::DocumentEndInSingleQuoted));
            } else {
                self.position += 1;
            }
        }
    }

    fn read_double_quoted_scalar(&mut self) -> GrammarResult<Option<Node>> {
        if self.ch() != b'"' {
            return Ok(None);
        }
        let start = self.position;
        self.position += 1;

        loop {
            let ch = self.ch();
            if ch == 0 {
                return Err(self.fatal(ErrorKind::UnterminatedDoubleQuoted));
            } else if ch == b'"' {
                self.position += 1;
                return Ok(Some(self.quoted(start, ScalarStyle::DoubleQuoted)));
            } else if ch == b'\\' {
                let escaped = self.advance();
                if is_eol(escaped) {
                    self.skip_separation_space(false);
                } else if escaped != 0 {
                    self.position += 1;
                }
            } else if is_eol(ch) {
                self.skip_separation_space(false);
            } else if self.at_line_start_separator() {
                return Err(self.fatal(ErrorKind::DocumentEndInDoubleQuoted));
            } else {
                self.position += 1;
            }
        }
    }

    fn quoted(&self, start: usize, style: ScalarStyle) -> Node {
        let raw = self.slice(start, self.position);
        Node::new(NodeKind::Scalar(Scalar { raw, style }), start, self.position)
    }

    /// Unquoted scalar, possibly folded over several lines.
    ///
    /// Continuation lines must be indented at least `node_indent`. The node
    /// always ends at the last non-blank byte; when the scalar stops at an
    /// under-indented line the cursor rewinds there too.
    fn read_plain_scalar(
        &mut self,
        node_indent: isize,
        within_flow: bool,
    ) -> GrammarResult<Option<Node>> {
        let mut ch = self.ch();
        if ch == 0
            || is_ws_or_eol(ch)
            || is_flow_indicator(ch)
            || matches!(
                ch,
                b'#' | b'&' | b'*' | b'!' | b'|' | b'>' | b'\'' | b'"' | b'%' | b'@' | b'`'
            )
        {
            return Ok(None);
        }
        if ch == b'?' || ch == b'-' {
            let following = self.peek(1);
            if is_ws_or_eol(following) || (within_flow && is_flow_indicator(following)) {
                return Ok(None);
            }
        }

        let start = self.position;
        let indent = start - self.line_start;
        let mut capture_end = start;

        while ch != 0 {
            if ch == b':' {
                let following = self.peek(1);
                if following == 0
                    || is_ws_or_eol(following)
                    || (within_flow && is_flow_indicator(following))
                {
                    break;
                }
            } else if ch == b'#' {
                if is_ws_or_eol(self.at(self.position - 1)) {
                    break;
                }
            } else if self.at_line_start_separator() || (within_flow && is_flow_indicator(ch)) {
                break;
            } else if is_eol(ch) {
                let saved = (self.line, self.line_start, self.line_indent);
                self.skip_separation_space(false);
                ch = self.ch();
                if ch != 0 && self.line_indent >= node_indent {
                    continue;
                }
                self.position = capture_end;
                (self.line, self.line_start, self.line_indent) = saved;
                break;
            }

            if !is_white_space(ch) {
                capture_end = self.position + 1;
            }
            ch = self.advance();
        }

        if capture_end == start {
            return Ok(None);
        }
        let raw = self.slice(start, capture_end);
        Ok(Some(Node::new(
            NodeKind::Scalar(Scalar {
                raw,
                style: ScalarStyle::Plain { indent },
            }),
            start,
            capture_end,
        )))
    }

    // ============================================================================
    // Collections
    // ============================================================================

    fn read_block_sequence(&mut self, node_indent: isize) -> GrammarResult<Option<Node>> {
        let start = self.position;
        let mut items = Vec::new();
        let mut end = start;
        let mut detected = false;
        let mut ch = self.ch();

        while ch == b'-' && is_ws_or_eol(self.peek(1)) {
            detected = true;
            self.position += 1;
            end = end.max(self.position);

            if self.skip_separation_space(true) > 0 && self.line_indent <= node_indent {
                // A null entry.
                if self.line_indent < node_indent {
                    break;
                }
                ch = self.ch();
                continue;
            }

            let line = self.line;
            if let Some(item) = self.compose_node(node_indent, Context::BlockIn, false, true)? {
                let mut item = item.attach(ParentKind::Sequence, Slot::Item);
                item.tags = self.take_tags(ParentKind::Sequence);
                end = end.max(item.end);
                items.push(item);
            }

            self.skip_separation_space(true);
            ch = self.ch();

            if (self.line == line || self.line_indent > node_indent) && ch != 0 {
                self.warn(Warning::BadSequenceIndentation, self.position);
            } else if self.line_indent < node_indent {
                break;
            }
        }

        if !detected {
            return Ok(None);
        }
        Ok(Some(Node::new(NodeKind::Sequence(items), start, end)))
    }

    /// `[...]` or `{...}`.
    fn read_flow_collection(&mut self, node_indent: isize) -> GrammarResult<Option<Node>> {
        let start = self.position;
        let (terminator, is_mapping) = match self.ch() {
            b'[' => (b']', false),
            b'{' => (b'}', true),
            _ => return Ok(None),
        };
        self.position += 1;

        let mut entries = Vec::new();
        let mut read_next = true;

        loop {
            self.skip_separation_space(true);
            let ch = self.ch();

            if ch == 0 {
                return Err(self.fatal(ErrorKind::UnterminatedFlowCollection));
            }
            if ch == terminator {
                self.position += 1;
                let kind = if is_mapping {
                    NodeKind::Mapping(entries)
                } else {
                    NodeKind::Sequence(entries)
                };
                return Ok(Some(Node::new(kind, start, self.position)));
            }
            if !read_next {
                return Err(self.fatal(ErrorKind::MissedComma));
            }

            let entry_start = self.position;
            let explicit = ch == b'?' && is_ws_or_eol(self.peek(1));
            let hint = if explicit {
                self.position += 1;
                self.skip_separation_space(true);
                (entry_start, entry_start + 1)
            } else {
                (entry_start, entry_start)
            };

            let line = self.line;
            let key = self.compose_node(node_indent, Context::FlowIn, false, true)?;
            self.skip_separation_space(true);

            let mut colon = None;
            let mut value = None;
            if (explicit || self.line == line) && self.ch() == b':' {
                self.position += 1;
                colon = Some(Node::new(NodeKind::Colon, self.position - 1, self.position));
                self.skip_separation_space(true);
                value = self.compose_node(node_indent, Context::FlowIn, false, true)?;
            }
            let is_pair = explicit || colon.is_some();

            if is_mapping {
                if key.is_some() || colon.is_some() || !self.tags.is_empty() {
                    let tags = mem::take(&mut self.tags);
                    entries.push(self.pair_node(hint, key, colon, value, tags));
                }
            } else if is_pair {
                let tags = mem::take(&mut self.tags);
                let pair = self.pair_node(hint, key, colon, value, tags);
                let (pair_start, pair_end) = (pair.start, pair.end);
                entries.push(
                    Node::new(NodeKind::Mapping(vec![pair]), pair_start, pair_end)
                        .attach(ParentKind::Sequence, Slot::Item),
                );
            } else if let Some(key) = key {
                let mut item = key.attach(ParentKind::Sequence, Slot::Item);
                item.tags = self.take_tags(ParentKind::Sequence);
                entries.push(item);
            }

            self.skip_separation_space(true);
            if self.ch() == b',' {
                read_next = true;
                self.position += 1;
            } else {
                read_next = false;
            }
        }
    }

    /// Build a `Pair` node attached to a mapping.
    ///
    /// `hint` is the span of the entry's marker (or its first byte), so an
    /// entry with no parts still gets a range.
    fn pair_node(
        &self,
        hint: (usize, usize),
        key: Option<Node>,
        colon: Option<Node>,
        value: Option<Node>,
        tags: Vec<Node>,
    ) -> Node {
        let pair = Pair {
            key: key.map(|n| Box::new(n.attach(ParentKind::Pair, Slot::Key))),
            colon: colon.map(|n| Box::new(n.attach(ParentKind::Pair, Slot::Colon))),
            value: value.map(|n| Box::new(n.attach(ParentKind::Pair, Slot::Value))),
        };
        let tags = attach_tags(tags, ParentKind::Pair);
        let start = pair
            .first_start()
            .into_iter()
            .chain(tags.iter().map(|t| t.start))
            .fold(hint.0, usize::min);
        let end = pair
            .last_end()
            .into_iter()
            .chain(tags.iter().map(|t| t.end))
            .fold(hint.1, usize::max);
        let mut node = Node::new(NodeKind::Pair(pair), start, end);
        node.tags = tags;
        node.attach(ParentKind::Mapping, Slot::Item)
    }

    /// Block mapping with explicit (`?`/`:`) and implicit entries.
    ///
    /// When the first implicit key turns out not to be followed by a colon,
    /// the composed node is returned as is: the input was not a mapping.
    fn read_block_mapping(
        &mut self,
        node_indent: isize,
        flow_indent: isize,
    ) -> GrammarResult<Option<Node>> {
        let start = self.position;
        let mut pairs: Vec<Node> = Vec::new();
        let mut key: Option<Node> = None;
        let mut colon: Option<Node> = None;
        let mut hint = (start, start);
        let mut at_explicit_key = false;
        let mut allow_compact = false;
        let mut detected = false;
        let mut ch = self.ch();

        while ch != 0 {
            let following = self.peek(1);
            let line = self.line;
            let line_start = self.line_start;
            let entry_start = self.position;
            let pending_tags = self.tags.len();
            let mut recovered = false;

            if (ch == b'?' || ch == b':') && is_ws_or_eol(following) {
                if ch == b'?' {
                    if at_explicit_key {
                        let tags = mem::take(&mut self.tags);
                        pairs.push(self.pair_node(hint, key.take(), colon.take(), None, tags));
                    }
                    detected = true;
                    at_explicit_key = true;
                    allow_compact = true;
                    hint = (entry_start, entry_start + 1);
                } else if at_explicit_key {
                    at_explicit_key = false;
                    allow_compact = true;
                    colon = Some(Node::new(NodeKind::Colon, entry_start, entry_start + 1));
                } else {
                    return Err(self.fatal(ErrorKind::MissingExplicitKey));
                }
                self.position += 1;
            } else if let Some(node) =
                self.compose_node(flow_indent, Context::FlowOut, false, true)?
            {
                while is_white_space(self.ch()) {
                    if self.ch() == b'\t' {
                        self.warn(Warning::TabCharacter, self.position);
                    }
                    self.position += 1;
                }

                if self.line == line {
                    if self.ch() != b':' {
                        if !detected {
                            return Ok(Some(node));
                        }
                        let offset = node.end;
                        return Err(Failure::Recoverable {
                            error: self.error_at(ErrorKind::MissingColon, offset),
                            fix: Fix {
                                offset,
                                text: ":".to_string(),
                            },
                        });
                    }

                    self.position += 1;
                    let colon_node = Node::new(NodeKind::Colon, self.position - 1, self.position);
                    if !is_ws_or_eol(self.ch()) && self.ch() != 0 {
                        self.warn(Warning::WhitespaceAfterColon, self.position);
                    }
                    if at_explicit_key {
                        let tags: Vec<Node> = self.tags.drain(..pending_tags).collect();
                        pairs.push(self.pair_node(hint, key.take(), colon.take(), None, tags));
                    }
                    detected = true;
                    at_explicit_key = false;
                    allow_compact = false;
                    hint = (entry_start, entry_start);
                    key = Some(node);
                    colon = Some(colon_node);
                } else if detected || self.ch() == b':' {
                    if at_explicit_key {
                        let tags: Vec<Node> = self.tags.drain(..pending_tags).collect();
                        pairs.push(self.pair_node(hint, key.take(), colon.take(), None, tags));
                        at_explicit_key = false;
                    }
                    pairs.push(self.recover_implicit_key(line, line_start, entry_start));
                    detected = true;
                    recovered = true;
                } else {
                    return Ok(Some(node));
                }
            } else {
                break;
            }

            if !recovered && (self.line == line || self.line_indent > node_indent) {
                let mut value = None;
                if let Some(node) =
                    self.compose_node(node_indent, Context::BlockOut, true, allow_compact)?
                {
                    if at_explicit_key {
                        key = Some(node);
                    } else {
                        value = Some(node);
                    }
                }
                if !at_explicit_key {
                    let tags = mem::take(&mut self.tags);
                    pairs.push(self.pair_node(hint, key.take(), colon.take(), value, tags));
                }
                self.skip_separation_space(true);
            }

            ch = self.ch();
            if self.line_indent > node_indent && ch != 0 {
                self.warn(Warning::BadMappingIndentation, self.position);
            } else if self.line_indent < node_indent {
                break;
            }
        }

        // An explicit key with nothing after it.
        if at_explicit_key {
            let tags = mem::take(&mut self.tags);
            pairs.push(self.pair_node(hint, key.take(), colon.take(), None, tags));
        }

        if !detected {
            return Ok(None);
        }
        let start = pairs.iter().map(|p| p.start).fold(start, usize::min);
        let end = pairs.iter().map(|p| p.end).max().unwrap_or(start);
        Ok(Some(Node::new(NodeKind::Mapping(pairs), start, end)))
    }

    /// Rebuild a pair from the first line of a multi-line implicit key.
    ///
    /// The line is split on its last colon; without one the whole line is a
    /// key with no value. Scanning resumes at the following line.
    fn recover_implicit_key(&mut self, line: usize, line_start: usize, entry_start: usize) -> Node {
        let mut line_end = entry_start;
        while !is_eol(self.at(line_end)) && self.at(line_end) != 0 {
            line_end += 1;
        }
        let colon_at = (entry_start..line_end).rev().find(|&i| self.input[i] == b':');

        let key = self.trimmed_plain(entry_start, colon_at.unwrap_or(line_end), line_start);
        let colon = colon_at.map(|c| Node::new(NodeKind::Colon, c, c + 1));
        let value = colon_at.and_then(|c| self.trimmed_plain(c + 1, line_end, line_start));

        self.tags.clear();
        self.comments.retain(|c| c.end <= line_end);
        self.diagnostics.retain(|d| d.offset < line_end);
        self.warn(Warning::MultiLineImplicitKey, entry_start);

        self.line = line;
        self.line_start = line_start;
        self.position = line_end;
        self.skip_separation_space(true);

        self.pair_node((entry_start, entry_start), key, colon, value, Vec::new())
    }

    /// Plain scalar over `from..to` with surrounding blanks removed.
    fn trimmed_plain(&self, from: usize, to: usize, line_start: usize) -> Option<Node> {
        let mut start = from;
        let mut end = to;
        while start < end && is_white_space(self.input[start]) {
            start += 1;
        }
        while end > start && is_white_space(self.input[end - 1]) {
            end -= 1;
        }
        (start < end).then(|| {
            Node::new(
                NodeKind::Scalar(Scalar {
                    raw: self.slice(start, end),
                    style: ScalarStyle::Plain {
                        indent: start - line_start,
                    },
                }),
                start,
                end,
            )
        })
    }

    // ============================================================================
    // Composer
    // ============================================================================

    /// Compose one node in `context`, indented relative to `parent_indent`.
    ///
    /// With `allow_seek` leading separation space is skipped first. Block
    /// collections are only tried at the start of a line, or on the same line
    /// when `allow_compact` is set.
    pub(crate) fn compose_node(
        &mut self,
        parent_indent: isize,
        context: Context,
        allow_seek: bool,
        allow_compact: bool,
    ) -> GrammarResult<Option<Node>> {
        let allow_block_styles = matches!(context, Context::BlockOut | Context::BlockIn);
        let mut allow_block_collections = allow_block_styles;
        let mut indent_status = Ordering::Greater;
        let mut at_new_line = false;
        let outer_tags = mem::take(&mut self.tags);

        if allow_seek && self.skip_separation_space(true) > 0 {
            at_new_line = true;
            indent_status = self.line_indent.cmp(&parent_indent);
        }

        if indent_status == Ordering::Greater {
            while self.read_tag_property()? {
                if self.skip_separation_space(true) > 0 {
                    at_new_line = true;
                    allow_block_collections = allow_block_styles;
                    indent_status = self.line_indent.cmp(&parent_indent);
                } else {
                    allow_block_collections = false;
                }
            }
        }

        if allow_block_collections {
            allow_block_collections = at_new_line || allow_compact;
        }

        // Tags read here belong to the node this call returns. Hide them from
        // the collection readers so nested items and pairs cannot claim them.
        let own_tags = mem::take(&mut self.tags);
        let node = self.compose_content(
            parent_indent,
            context,
            indent_status,
            allow_block_collections,
        );
        let stray = mem::replace(&mut self.tags, outer_tags);
        self.tags.extend(own_tags);
        self.tags.extend(stray);
        node
    }

    fn compose_content(
        &mut self,
        parent_indent: isize,
        context: Context,
        indent_status: Ordering,
        allow_block_collections: bool,
    ) -> GrammarResult<Option<Node>> {
        let allow_block_styles = matches!(context, Context::BlockOut | Context::BlockIn);

        if indent_status != Ordering::Greater && context != Context::BlockOut {
            return Ok(None);
        }

        let flow_indent = match context {
            Context::FlowIn | Context::FlowOut => parent_indent,
            Context::BlockIn | Context::BlockOut => parent_indent + 1,
        };
        let block_indent = (self.position - self.line_start) as isize;

        match indent_status {
            Ordering::Greater => {
                if allow_block_collections {
                    if let Some(node) = self.read_block_sequence(block_indent)? {
                        return Ok(Some(node));
                    }
                    if let Some(node) = self.read_block_mapping(block_indent, flow_indent)? {
                        return Ok(Some(node));
                    }
                }
                if let Some(node) = self.read_flow_collection(flow_indent)? {
                    return Ok(Some(node));
                }
                if allow_block_styles {
                    if let Some(node) = self.read_block_scalar(flow_indent)? {
                        return Ok(Some(node));
                    }
                }
                if let Some(node) = self.read_single_quoted_scalar()? {
                    return Ok(Some(node));
                }
                if let Some(node) = self.read_double_quoted_scalar()? {
                    return Ok(Some(node));
                }
                self.read_plain_scalar(flow_indent, context == Context::FlowIn)
            }
            // Block sequences may sit at their parent's indentation.
            Ordering::Equal if allow_block_collections => self.read_block_sequence(block_indent),
            _ => Ok(None),
        }
    }
}

/// `!`, `!!`, or `!name!` where name is letters and dashes.
fn is_tag_handle(handle: &[u8]) -> bool {
    match handle {
        b"!" | b"!!" => true,
        [b'!', name @ .., b'!'] => {
            !name.is_empty() && name.iter().all(|c| c.is_ascii_alphabetic() || *c == b'-')
        }
        _ => false,
    }
}

fn attach_tags(tags: Vec<Node>, parent: ParentKind) -> Vec<Node> {
    tags.into_iter()
        .map(|t| t.attach(parent, Slot::Tag))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_scalar;

    fn state<'a>(text: &str, ctx: &'a ParseContext) -> State<'a> {
        let text = crate::scanner::normalize(text, None);
        let mut state = State::new(&text, ctx);
        state.scan_indent();
        state
    }

    fn compose(text: &str) -> Node {
        let ctx = ParseContext::new(None);
        let mut st = state(text, &ctx);
        st.compose_node(-1, Context::BlockOut, false, true)
            .unwrap()
            .unwrap()
    }

    fn compose_err(text: &str) -> Failure {
        let ctx = ParseContext::new(None);
        let mut st = state(text, &ctx);
        st.compose_node(-1, Context::BlockOut, false, true)
            .unwrap_err()
    }

    fn text(node: &Node) -> String {
        decode_scalar(node).unwrap()
    }

    fn pair_parts(pair: &Node) -> (String, Option<String>) {
        let p = pair.as_pair().unwrap();
        (
            text(p.key.as_ref().unwrap()),
            p.value.as_ref().map(|v| text(v)),
        )
    }

    #[test]
    fn test_skip_separation_space_counts_breaks() {
        let ctx = ParseContext::new(None);
        let mut st = State::new("  # note\n\n   x\n", &ctx);
        assert_eq!(st.skip_separation_space(true), 2);
        assert_eq!(st.line, 2);
        assert_eq!(st.line_indent, 3);
        assert_eq!(st.ch(), b'x');
        assert_eq!(st.comments.len(), 1);
        assert_eq!(st.comments[0].start, 2);
        assert_eq!(st.comments[0].end, 8);
    }

    #[test]
    fn test_tab_is_a_diagnostic() {
        let ctx = ParseContext::new(None);
        let mut st = State::new("\tx\n", &ctx);
        st.skip_separation_space(true);
        assert_eq!(st.diagnostics.len(), 1);
        assert_eq!(st.diagnostics[0].warning, Warning::TabCharacter);
    }

    #[test]
    fn test_read_line_break_requires_break() {
        let ctx = ParseContext::new(None);
        let mut st = State::new("x\n", &ctx);
        let err = st.read_line_break().unwrap_err().into_error();
        assert_eq!(err.kind, ErrorKind::LineBreakExpected);
    }

    #[test]
    fn test_plain_scalar_stops_before_comment() {
        let node = compose("hello world # note");
        assert_eq!(node.as_scalar().unwrap().raw, "hello world");
        assert_eq!((node.start, node.end), (0, 11));
    }

    #[test]
    fn test_plain_scalar_folds_lines() {
        let node = compose("a\n  b\n");
        assert_eq!(node.as_scalar().unwrap().raw, "a\n  b");
        assert_eq!(text(&node), "a b");
    }

    #[test]
    fn test_plain_scalar_indent_is_start_column() {
        let root = compose("key:   value\n");
        let pair = &root.as_mapping().unwrap()[0];
        let value = pair.as_pair().unwrap().value.as_ref().unwrap();
        assert_eq!(
            value.as_scalar().unwrap().style,
            ScalarStyle::Plain { indent: 7 }
        );
    }

    #[test]
    fn test_single_quoted_escape() {
        let node = compose("'it''s'");
        assert_eq!(node.as_scalar().unwrap().style, ScalarStyle::SingleQuoted);
        assert_eq!((node.start, node.end), (0, 7));
        assert_eq!(text(&node), "it's");
    }

    #[test]
    fn test_unterminated_quotes_are_fatal() {
        let err = compose_err("'abc").into_error();
        assert_eq!(err.kind, ErrorKind::UnterminatedSingleQuoted);
        let err = compose_err("\"abc").into_error();
        assert_eq!(err.kind, ErrorKind::UnterminatedDoubleQuoted);
    }

    #[test]
    fn test_document_marker_inside_quotes() {
        let err = compose_err("\"abc\n---\n\"").into_error();
        assert_eq!(err.kind, ErrorKind::DocumentEndInDoubleQuoted);
        let err = compose_err("'abc\n...\n'").into_error();
        assert_eq!(err.kind, ErrorKind::DocumentEndInSingleQuoted);
    }

    #[test]
    fn test_block_scalar_header() {
        let node = compose("|-2\n   a\n");
        let block = node.as_block().unwrap();
        match block.indicator.kind {
            NodeKind::BlockIndicator(header) => {
                assert_eq!(header.style, BlockStyle::Literal);
                assert_eq!(header.chomping, Chomping::Strip);
                assert_eq!(header.explicit_indent, Some(2));
            }
            _ => panic!("expected a block indicator"),
        }
        assert_eq!((block.indicator.start, block.indicator.end), (0, 3));
    }

    #[test]
    fn test_block_scalar_bad_headers() {
        assert_eq!(
            compose_err("|0\n a\n").into_error().kind,
            ErrorKind::ZeroIndentation
        );
        assert_eq!(
            compose_err("|12\n a\n").into_error().kind,
            ErrorKind::RepeatedIndentation
        );
        assert_eq!(
            compose_err("|x\n a\n").into_error().kind,
            ErrorKind::LineBreakExpected
        );
    }

    #[test]
    fn test_block_scalar_stops_at_dedent() {
        let root = compose("a: |\n  one\n\n  two\nb: 1\n");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 2);
        let block = pairs[0].as_pair().unwrap().value.as_ref().unwrap();
        assert_eq!(block.kind_name(), "BLOCK");
        // The body ends at the start of the `b: 1` line.
        assert_eq!(block.end, 18);
        assert_eq!(
            block.as_block().unwrap().body.as_scalar().unwrap().style,
            ScalarStyle::BlockBody { indent: 2 }
        );
        assert_eq!(text(block), "one\n\ntwo\n");
    }

    #[test]
    fn test_block_sequence() {
        let root = compose("- a\n- b\n-\n- c\n");
        let items = root.as_sequence().unwrap();
        let values: Vec<_> = items.iter().map(text).collect();
        assert_eq!(values, ["a", "b", "c"]);
        assert!(items.iter().all(Node::is_item));
    }

    #[test]
    fn test_nested_sequences() {
        let root = compose("- - a\n  - b\n- c\n");
        let items = root.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_sequence().unwrap().len(), 2);
        assert_eq!(text(&items[1]), "c");
    }

    #[test]
    fn test_sequence_item_tags() {
        let root = compose("- !foo a\n- !!str b\n");
        let items = root.as_sequence().unwrap();
        assert_eq!(items[0].tags.len(), 1);
        assert_eq!(items[0].tags[0].kind, NodeKind::Tag("!foo".to_string()));
        assert_eq!(items[1].tags[0].kind, NodeKind::Tag("!!str".to_string()));
    }

    #[test]
    fn test_collection_tags_stay_with_the_collection() {
        let root = compose("x: !!seq [a, b]\n");
        let pair = &root.as_mapping().unwrap()[0];
        assert_eq!(pair.tags.len(), 1);
        assert_eq!((pair.tags[0].start, pair.tags[0].end), (3, 8));
        let seq = pair.as_pair().unwrap().value.as_ref().unwrap();
        assert!(seq.as_sequence().unwrap().iter().all(|i| i.tags.is_empty()));

        let root = compose("m: !!map {k: v}\n");
        let pair = &root.as_mapping().unwrap()[0];
        assert_eq!(pair.tags[0].kind, NodeKind::Tag("!!map".to_string()));
        let inner = pair.as_pair().unwrap().value.as_ref().unwrap();
        assert!(inner.as_mapping().unwrap()[0].tags.is_empty());
    }

    #[test]
    fn test_tagged_nested_sequence_item() {
        let root = compose("- !!seq\n  - a\n  - b\n");
        let items = root.as_sequence().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tags[0].kind, NodeKind::Tag("!!seq".to_string()));
        let inner = items[0].as_sequence().unwrap();
        assert!(inner.iter().all(|i| i.tags.is_empty()));
        for node in root.descendants() {
            for child in node.children() {
                assert!(node.start <= child.start && child.end <= node.end);
            }
        }
    }

    #[test]
    fn test_tab_before_colon_is_a_diagnostic() {
        let ctx = ParseContext::new(None);
        let mut st = state("'a'\t: 1\n", &ctx);
        let root = st
            .compose_node(-1, Context::BlockOut, false, true)
            .unwrap()
            .unwrap();
        assert_eq!(root.kind_name(), "MAPPING");
        assert_eq!(st.diagnostics[0].warning, Warning::TabCharacter);
        assert_eq!(st.diagnostics[0].offset, 3);
    }

    #[test]
    fn test_tag_handles() {
        let root = compose("- !e! a\n- !<tag:x> b\n");
        let items = root.as_sequence().unwrap();
        assert_eq!(items[0].tags[0].kind, NodeKind::Tag("!e!".to_string()));
        assert_eq!(items[1].tags[0].kind, NodeKind::Tag("!<tag:x>".to_string()));
        assert_eq!(
            compose_err("!a.b!c x").into_error().kind,
            ErrorKind::InvalidTagHandle
        );
        assert_eq!(
            compose_err("!a!b!c x").into_error().kind,
            ErrorKind::ExclamationInTagSuffix
        );
        assert_eq!(
            compose_err("!<abc").into_error().kind,
            ErrorKind::UnterminatedVerbatimTag
        );
    }

    #[test]
    fn test_block_mapping_order_and_roles() {
        let root = compose("c: 3\na: 1\nb: 2\n");
        let pairs = root.as_mapping().unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| pair_parts(p).0).collect();
        assert_eq!(keys, ["c", "a", "b"]);
        let first = pairs[0].as_pair().unwrap();
        assert!(first.key.as_ref().unwrap().is_key());
        assert!(first.value.as_ref().unwrap().is_value());
        assert_eq!(first.colon.as_ref().unwrap().start, 1);
    }

    #[test]
    fn test_block_mapping_missing_value() {
        let root = compose("a:\nb: 2\n");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pair_parts(&pairs[0]), ("a".to_string(), None));
        assert_eq!(pair_parts(&pairs[1]), ("b".to_string(), Some("2".to_string())));
    }

    #[test]
    fn test_nested_block_mapping() {
        let root = compose("outer:\n  inner: 1\n  other: 2\nlast: 3\n");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 2);
        let inner = pairs[0].as_pair().unwrap().value.as_ref().unwrap();
        assert_eq!(inner.as_mapping().unwrap().len(), 2);
        assert_eq!(pair_parts(&pairs[1]).0, "last");
    }

    #[test]
    fn test_explicit_keys() {
        let root = compose("? a\n: 1\n? b\n");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pair_parts(&pairs[0]), ("a".to_string(), Some("1".to_string())));
        let last = pairs[1].as_pair().unwrap();
        assert!(last.colon.is_none());
        assert_eq!(pairs[1].start, 8);
    }

    #[test]
    fn test_value_without_explicit_key_is_fatal() {
        assert_eq!(
            compose_err(": a\n").into_error().kind,
            ErrorKind::MissingExplicitKey
        );
    }

    #[test]
    fn test_not_a_mapping_returns_key() {
        let node = compose("\"just a string\"\n");
        assert_eq!(node.kind_name(), "SCALAR");
        assert_eq!(node.as_scalar().unwrap().style, ScalarStyle::DoubleQuoted);
    }

    #[test]
    fn test_missing_colon_is_recoverable() {
        match compose_err("a: 1\nkey value\n") {
            Failure::Recoverable { error, fix } => {
                assert_eq!(error.kind, ErrorKind::MissingColon);
                assert_eq!(fix.offset, 14);
                assert_eq!(fix.text, ":");
            }
            Failure::Fatal(e) => panic!("expected a recoverable failure, got {e}"),
        }
    }

    #[test]
    fn test_multi_line_key_is_recovered_locally() {
        let ctx = ParseContext::new(None);
        let mut st = state("a: 1\nkey value\nb: 2\n", &ctx);
        let root = st
            .compose_node(-1, Context::BlockOut, false, true)
            .unwrap()
            .unwrap();
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pair_parts(&pairs[1]), ("key value".to_string(), None));
        assert_eq!(pair_parts(&pairs[2]), ("b".to_string(), Some("2".to_string())));
        assert!(st
            .diagnostics
            .iter()
            .any(|d| d.warning == Warning::MultiLineImplicitKey));
    }

    #[test]
    fn test_recovery_splits_on_last_colon() {
        let root = compose("x: 1\n\"a\nb\": c\nd: 2\n");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 4);
        let recovered = pairs[1].as_pair().unwrap();
        assert_eq!(recovered.key.as_ref().unwrap().as_scalar().unwrap().raw, "\"a");
        assert!(recovered.colon.is_none());
        let resumed = pairs[2].as_pair().unwrap();
        assert_eq!(resumed.key.as_ref().unwrap().as_scalar().unwrap().raw, "b\"");
        assert_eq!(pair_parts(&pairs[3]).0, "d");
    }

    #[test]
    fn test_whitespace_after_colon_warning() {
        let ctx = ParseContext::new(None);
        let mut st = state("\"a\":b\n", &ctx);
        let root = st
            .compose_node(-1, Context::BlockOut, false, true)
            .unwrap()
            .unwrap();
        assert_eq!(root.kind_name(), "MAPPING");
        assert_eq!(st.diagnostics[0].warning, Warning::WhitespaceAfterColon);
    }

    #[test]
    fn test_flow_sequence_with_pair_entry() {
        let root = compose("[a, b: 1, 'c']");
        let items = root.as_sequence().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(text(&items[0]), "a");
        assert_eq!(items[1].kind_name(), "MAPPING");
        let pairs = items[1].as_mapping().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pair_parts(&pairs[0]), ("b".to_string(), Some("1".to_string())));
        assert_eq!(text(&items[2]), "c");
        assert_eq!((root.start, root.end), (0, 14));
    }

    #[test]
    fn test_flow_mapping() {
        let root = compose("{a: 1, b, \"c\":2}");
        let pairs = root.as_mapping().unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pair_parts(&pairs[0]), ("a".to_string(), Some("1".to_string())));
        assert_eq!(pair_parts(&pairs[1]), ("b".to_string(), None));
        assert_eq!(pair_parts(&pairs[2]), ("c".to_string(), Some("2".to_string())));
    }

    #[test]
    fn test_flow_collection_errors() {
        assert_eq!(
            compose_err("[[a] b]\n").into_error().kind,
            ErrorKind::MissedComma
        );
        assert_eq!(
            compose_err("[\"a\" \"b\"]").into_error().kind,
            ErrorKind::MissedComma
        );
        assert_eq!(
            compose_err("[a, b").into_error().kind,
            ErrorKind::UnterminatedFlowCollection
        );
    }

    #[test]
    fn test_is_tag_handle() {
        assert!(is_tag_handle(b"!"));
        assert!(is_tag_handle(b"!!"));
        assert!(is_tag_handle(b"!my-tags!"));
        assert!(!is_tag_handle(b"!my_tags!"));
        assert!(!is_tag_handle(b"!x"));
    }
}
