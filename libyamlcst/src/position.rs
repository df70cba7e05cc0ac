//! Position index.
//!
//! Converts between byte offsets and zero-based `(line, column)` pairs and
//! finds the innermost node under a cursor. Columns count bytes.

use crate::document::{Document, Parsed};
use crate::error::{ErrorKind, ParseError, Result};
use crate::node::Node;

/// A node found under a cursor, borrowed from a [`Parsed`] stream.
#[derive(Debug, Clone, Copy)]
pub struct NodeMatch<'a> {
    pub document: &'a Document,
    pub node: &'a Node,
}

/// Owned counterpart of [`NodeMatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundNode {
    pub document: Document,
    pub node: Node,
}

impl Parsed {
    /// Byte offset of a `(line, column)` pair.
    ///
    /// Returns `None` past the last line or past the end of the line.
    pub fn offset_at(&self, line: usize, column: usize) -> Option<usize> {
        let length = *self.line_lengths.get(line)?;
        if column > length {
            return None;
        }
        let preceding: usize = self.line_lengths[..line].iter().sum();
        Some(preceding + column + line)
    }

    /// Byte offset of a `(line, column)` pair whose column counts UTF-16
    /// code units, as most editors report it.
    ///
    /// Returns `None` past the end of the line or inside a surrogate pair.
    pub fn offset_at_utf16(&self, line: usize, column: usize) -> Option<usize> {
        let line_start = self.offset_at(line, 0)?;
        let text = &self.input[line_start..line_start + self.line_lengths[line]];
        let mut units = 0;
        for (byte, ch) in text.char_indices() {
            match units.cmp(&column) {
                std::cmp::Ordering::Equal => return Some(line_start + byte),
                std::cmp::Ordering::Greater => return None,
                std::cmp::Ordering::Less => units += ch.len_utf16(),
            }
        }
        (units == column).then_some(line_start + text.len())
    }

    /// `(line, column)` of a byte offset.
    pub fn position_at(&self, offset: usize) -> Option<(usize, usize)> {
        let mut line_start = 0;
        for (line, length) in self.line_lengths.iter().enumerate() {
            if offset <= line_start + length {
                return Some((line, offset - line_start));
            }
            line_start += length + 1;
        }
        None
    }

    /// The document whose range contains `offset`.
    ///
    /// The end of the input belongs to the last document.
    pub fn document_at(&self, offset: usize) -> Option<&Document> {
        self.documents
            .iter()
            .find(|d| d.start <= offset && offset < d.end)
            .or_else(|| self.documents.last().filter(|d| d.end == offset))
    }

    /// Innermost node under the cursor at `(line, column)`.
    ///
    /// `column` is a byte column; convert editor columns with
    /// [`Parsed::offset_at_utf16`] and [`Parsed::position_at`] first.
    ///
    /// Fails when the document was written with tabs as whitespace, since
    /// its columns cannot be trusted.
    pub fn find_node_at_position(&self, line: usize, column: usize) -> Result<Option<NodeMatch<'_>>> {
        let Some(offset) = self.offset_at(line, column) else {
            return Ok(None);
        };
        let Some(document) = self.document_at(offset) else {
            return Ok(None);
        };
        if document.has_tab_diagnostic() {
            return Err(ParseError::new(
                ErrorKind::TabsInDocument,
                &self.ctx,
                offset,
                line,
                column,
            ));
        }
        Ok(document
            .node_at(offset)
            .map(|node| NodeMatch { document, node }))
    }
}

impl Document {
    /// Innermost node touching `offset`.
    ///
    /// Comments win over structure. Otherwise the search descends through
    /// children, taking the first one in source order at each level, so a
    /// cursor between two tokens binds to the left one.
    pub fn node_at(&self, offset: usize) -> Option<&Node> {
        if let Some(comment) = self.comments.iter().find(|c| c.touches(offset)) {
            return Some(comment);
        }

        let mut top: Vec<&Node> = self.nodes.iter().chain(&self.tags).collect();
        top.sort_by_key(|n| (n.start, n.end));
        let mut node = top.into_iter().find(|n| n.touches(offset))?;

        while let Some(child) = node.children().into_iter().find(|c| c.touches(offset)) {
            node = child;
        }
        Some(node)
    }
}

/// Parse `text` and find the innermost node at `(line, column)`.
///
/// `column` counts bytes of the line.
/// Line and column refer to the normalized text, which only differs from
/// `text` for `\r\n` line endings and a leading BOM.
pub fn find_node_at_position(text: &str, line: usize, column: usize) -> Result<Option<FoundNode>> {
    let parsed = crate::parse(text)?;
    let found = parsed.find_node_at_position(line, column)?;
    Ok(found.map(|m| FoundNode {
        document: m.document.clone(),
        node: m.node.clone(),
    }))
}
