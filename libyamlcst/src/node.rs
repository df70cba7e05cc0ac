//! Concrete syntax tree nodes.

#[cfg(feature = "serde")]
use serde::Serialize;

/// A node of the concrete syntax tree.
///
/// `start..end` is a half-open byte range into the normalized input.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Node {
    pub kind: NodeKind,
    pub start: usize,
    pub end: usize,
    /// Where this node was attached, `None` for document-level nodes.
    pub parent: Option<Parent>,
    /// Tag properties attached to this node by its parent.
    pub tags: Vec<Node>,
}

/// The closed set of node kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum NodeKind {
    /// Plain, quoted, or block-body scalar text.
    Scalar(Scalar),
    /// A literal (`|`) or folded (`>`) block scalar.
    Block(BlockScalar),
    /// Sequence items in source order.
    Sequence(Vec<Node>),
    /// `Pair` nodes in source order.
    Mapping(Vec<Node>),
    Pair(Pair),
    /// Raw tag text, including the leading `!`.
    Tag(String),
    Colon,
    BlockIndicator(BlockHeader),
    DocStart,
    DocEnd,
    /// Raw comment text, including the leading `#`.
    Comment(String),
}

/// Scalar text exactly as written.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Scalar {
    pub raw: String,
    pub style: ScalarStyle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ScalarStyle {
    /// Unquoted; `indent` is the column the scalar starts at.
    Plain { indent: usize },
    SingleQuoted,
    DoubleQuoted,
    /// Body of a block scalar; `indent` is the detected indentation width.
    BlockBody { indent: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BlockScalar {
    pub indicator: Box<Node>,
    pub body: Box<Node>,
}

/// Parsed `|`/`>` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BlockHeader {
    pub style: BlockStyle,
    pub chomping: Chomping,
    pub explicit_indent: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum BlockStyle {
    Literal,
    Folded,
}

/// Trailing line break handling of a block scalar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Chomping {
    /// Keep a single trailing line break.
    #[default]
    Clip,
    /// `-`: drop all trailing line breaks.
    Strip,
    /// `+`: keep all trailing line breaks.
    Keep,
}

/// A mapping entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Pair {
    pub key: Option<Box<Node>>,
    pub colon: Option<Box<Node>>,
    pub value: Option<Box<Node>>,
}

/// Non-owning description of where a node sits in its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Parent {
    pub kind: ParentKind,
    pub slot: Slot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ParentKind {
    Sequence,
    Mapping,
    Pair,
    Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Slot {
    Item,
    Key,
    Colon,
    Value,
    Tag,
    Indicator,
    Body,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            start,
            end,
            parent: None,
            tags: Vec::new(),
        }
    }

    /// Attach this node to a parent slot, consuming it.
    pub(crate) fn attach(mut self, kind: ParentKind, slot: Slot) -> Self {
        self.parent = Some(Parent { kind, slot });
        self
    }

    /// Upper-case kind name, e.g. `"MAPPING"`.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Scalar(_) => "SCALAR",
            NodeKind::Block(_) => "BLOCK",
            NodeKind::Sequence(_) => "SEQ",
            NodeKind::Mapping(_) => "MAPPING",
            NodeKind::Pair(_) => "PAIR",
            NodeKind::Tag(_) => "TAG",
            NodeKind::Colon => "COLON",
            NodeKind::BlockIndicator(_) => "BLOCK_INDICATOR",
            NodeKind::DocStart => "DOC_START",
            NodeKind::DocEnd => "DOC_END",
            NodeKind::Comment(_) => "COMMENT",
        }
    }

    /// Returns `true` if the byte offset lies inside or on the edges of this node.
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Returns `true` if this node is the key of a mapping entry.
    pub fn is_key(&self) -> bool {
        matches!(self.parent, Some(Parent { slot: Slot::Key, .. }))
    }

    /// Returns `true` if this node is the value of a mapping entry.
    pub fn is_value(&self) -> bool {
        matches!(self.parent, Some(Parent { slot: Slot::Value, .. }))
    }

    /// Returns `true` if this node is a sequence item.
    pub fn is_item(&self) -> bool {
        matches!(self.parent, Some(Parent { slot: Slot::Item, .. }))
    }

    /// Returns the scalar if this is a `Scalar`.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the block scalar if this is a `Block`.
    pub fn as_block(&self) -> Option<&BlockScalar> {
        match &self.kind {
            NodeKind::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the items if this is a `Sequence`.
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the pair nodes if this is a `Mapping`.
    pub fn as_mapping(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Mapping(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Returns the pair if this is a `Pair`.
    pub fn as_pair(&self) -> Option<&Pair> {
        match &self.kind {
            NodeKind::Pair(p) => Some(p),
            _ => None,
        }
    }

    /// Structural children in source order.
    ///
    /// Sequence items are listed together with the tags attached to them,
    /// since an item's tags precede the item itself. Pairs expose their own
    /// tags, key, colon and value; blocks expose their indicator and body.
    pub fn children(&self) -> Vec<&Node> {
        let mut children: Vec<&Node> = Vec::new();
        match &self.kind {
            NodeKind::Sequence(items) => {
                for item in items {
                    children.extend(&item.tags);
                    children.push(item);
                }
            }
            NodeKind::Mapping(pairs) => children.extend(pairs),
            NodeKind::Pair(pair) => {
                children.extend(&self.tags);
                children.extend(
                    [&pair.key, &pair.colon, &pair.value]
                        .into_iter()
                        .flatten()
                        .map(|n| n.as_ref()),
                );
            }
            NodeKind::Block(block) => {
                children.push(&block.indicator);
                children.push(&block.body);
            }
            NodeKind::Scalar(_)
            | NodeKind::Tag(_)
            | NodeKind::Colon
            | NodeKind::BlockIndicator(_)
            | NodeKind::DocStart
            | NodeKind::DocEnd
            | NodeKind::Comment(_) => {}
        }
        children.sort_by_key(|n| (n.start, n.end));
        children
    }

    /// This node and all of its descendants, breadth first.
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.children());
            i += 1;
        }
        out
    }
}

impl Pair {
    /// Start of the first present part.
    pub(crate) fn first_start(&self) -> Option<usize> {
        [&self.key, &self.colon, &self.value]
            .into_iter()
            .flatten()
            .map(|n| n.start)
            .min()
    }

    /// End of the last present part.
    pub(crate) fn last_end(&self) -> Option<usize> {
        [&self.key, &self.colon, &self.value]
            .into_iter()
            .flatten()
            .map(|n| n.end)
            .max()
    }
}
