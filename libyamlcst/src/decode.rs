//! Scalar content decoding.
//!
//! The tree keeps scalars exactly as written. This module turns a scalar or
//! block node into the string it denotes: quotes and escapes are resolved,
//! line breaks are folded and block indentation and chomping are applied.

use std::iter::Peekable;
use std::str::Chars;

use crate::chars::hex_value;
use crate::node::{BlockHeader, BlockStyle, Chomping, Node, NodeKind, ScalarStyle};

/// Decoded content of a `SCALAR` or `BLOCK` node.
///
/// Returns `None` for any other kind of node.
pub fn decode_scalar(node: &Node) -> Option<String> {
    match &node.kind {
        NodeKind::Scalar(scalar) => Some(match scalar.style {
            ScalarStyle::Plain { .. } => fold_flow(&scalar.raw, Quoting::Plain),
            ScalarStyle::SingleQuoted => fold_flow(unquote(&scalar.raw, '\''), Quoting::Single),
            ScalarStyle::DoubleQuoted => fold_flow(unquote(&scalar.raw, '"'), Quoting::Double),
            ScalarStyle::BlockBody { indent } => {
                decode_block(&scalar.raw, indent, BlockStyle::Literal, Chomping::Clip)
            }
        }),
        NodeKind::Block(block) => {
            let header = match block.indicator.kind {
                NodeKind::BlockIndicator(header) => header,
                _ => BlockHeader {
                    style: BlockStyle::Literal,
                    chomping: Chomping::Clip,
                    explicit_indent: None,
                },
            };
            let scalar = block.body.as_scalar()?;
            let indent = match scalar.style {
                ScalarStyle::BlockBody { indent } => indent,
                _ => 0,
            };
            Some(decode_block(&scalar.raw, indent, header.style, header.chomping))
        }
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Plain,
    Single,
    Double,
}

fn unquote(raw: &str, quote: char) -> &str {
    raw.strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(raw)
}

/// Resolve escapes and fold line breaks of a flow scalar.
///
/// A single line break becomes a space and `n` consecutive breaks become
/// `n - 1` newlines. Blanks around a break are dropped unless they came from
/// an escape.
fn fold_flow(content: &str, quoting: Quoting) -> String {
    let mut out = String::with_capacity(content.len());
    // Length of `out` that trimming must not cut into.
    let mut protected = 0;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                while out.len() > protected && out.ends_with(|c: char| c == ' ' || c == '\t') {
                    out.pop();
                }
                let mut breaks = 0;
                loop {
                    while matches!(chars.peek(), Some(' ' | '\t')) {
                        chars.next();
                    }
                    if chars.peek() != Some(&'\n') {
                        break;
                    }
                    chars.next();
                    breaks += 1;
                }
                if breaks == 0 {
                    out.push(' ');
                } else {
                    out.extend(std::iter::repeat('\n').take(breaks));
                }
                protected = out.len();
            }
            '\'' if quoting == Quoting::Single && chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            '\\' if quoting == Quoting::Double => {
                match chars.next() {
                    Some('\n') => {
                        while matches!(chars.peek(), Some(' ' | '\t')) {
                            chars.next();
                        }
                    }
                    Some(escaped) => out.push(unescape(escaped, &mut chars)),
                    None => out.push('\\'),
                }
                protected = out.len();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Character denoted by `\` followed by `c`.
fn unescape(c: char, rest: &mut Peekable<Chars>) -> char {
    match c {
        '0' => '\0',
        'a' => '\x07',
        'b' => '\x08',
        't' | '\t' => '\t',
        'n' => '\n',
        'v' => '\x0B',
        'f' => '\x0C',
        'r' => '\r',
        'e' => '\x1B',
        ' ' => ' ',
        '"' => '"',
        '/' => '/',
        '\\' => '\\',
        'N' => '\u{85}',
        '_' => '\u{A0}',
        'L' => '\u{2028}',
        'P' => '\u{2029}',
        'x' => hex_escape(rest, 2),
        'u' => hex_escape(rest, 4),
        'U' => hex_escape(rest, 8),
        _ => char::REPLACEMENT_CHARACTER,
    }
}

/// `\x`, `\u` or `\U` with `digits` hex digits. Digits are only consumed
/// while they are valid.
fn hex_escape(rest: &mut Peekable<Chars>, digits: usize) -> char {
    let mut code: u32 = 0;
    for _ in 0..digits {
        let digit = rest
            .peek()
            .and_then(|&c| u8::try_from(c).ok())
            .and_then(hex_value);
        match digit {
            Some(d) => code = code * 16 + u32::from(d),
            None => return char::REPLACEMENT_CHARACTER,
        }
        rest.next();
    }
    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Decode a block scalar body indented by `indent` spaces.
fn decode_block(raw: &str, indent: usize, style: BlockStyle, chomping: Chomping) -> String {
    let mut lines: Vec<&str> = raw
        .split('\n')
        .map(|line| {
            let spaces = line.bytes().take(indent).take_while(|&b| b == b' ').count();
            &line[spaces..]
        })
        .collect();
    if raw.ends_with('\n') || raw.is_empty() {
        lines.pop();
    }

    let content_len = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |i| i + 1);
    let trailing = lines.len() - content_len;
    let content = &lines[..content_len];

    let mut out = match style {
        BlockStyle::Literal => content.join("\n"),
        BlockStyle::Folded => fold_block(content),
    };

    if content.is_empty() {
        return match chomping {
            Chomping::Keep => "\n".repeat(trailing),
            Chomping::Clip | Chomping::Strip => String::new(),
        };
    }
    match chomping {
        Chomping::Strip => {}
        Chomping::Clip => out.push('\n'),
        Chomping::Keep => out.push_str(&"\n".repeat(trailing + 1)),
    }
    out
}

/// Folded style: lines are joined with spaces, except around blank lines and
/// more-indented lines, whose breaks are kept.
fn fold_block(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut blanks = 0;
    let mut first = true;
    let mut previous_more_indented = false;

    for line in lines {
        if line.is_empty() {
            blanks += 1;
            continue;
        }
        let more_indented = line.starts_with(|c: char| c == ' ' || c == '\t');
        if first {
            out.push_str(&"\n".repeat(blanks));
            first = false;
        } else if more_indented || previous_more_indented {
            out.push_str(&"\n".repeat(blanks + 1));
        } else if blanks == 0 {
            out.push(' ');
        } else {
            out.push_str(&"\n".repeat(blanks));
        }
        out.push_str(line);
        previous_more_indented = more_indented;
        blanks = 0;
    }
    out
}
