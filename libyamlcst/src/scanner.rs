//! Input normalization.
//!
//! Before the grammar runs, the source text is normalized:
//! - tabs are expanded to spaces (legacy mode only)
//! - `\r\n` and lone `\r` become `\n`
//! - a trailing `\n` is appended when missing
//! - a leading BOM is removed
//!
//! All node offsets refer to the normalized text.

/// Normalize source text for parsing.
///
/// `tab_width` enables the legacy behavior of expanding every tab to that
/// many spaces. Without it tabs are kept and reported as diagnostics.
pub fn normalize(source: &str, tab_width: Option<usize>) -> String {
    let expanded;
    let source = match tab_width {
        Some(width) if source.contains('\t') => {
            expanded = source.replace('\t', &" ".repeat(width));
            expanded.as_str()
        }
        _ => source,
    };

    let mut text = normalize_line_endings(source);
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    if let Some(stripped) = text.strip_prefix('\u{FEFF}') {
        text = stripped.to_string();
    }
    text
}

/// Replace `\r\n` and lone `\r` with `\n`.
fn normalize_line_endings(source: &str) -> String {
    if !source.contains('\r') {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// Byte length of every line, excluding the line feed.
///
/// A text ending in `\n` has a final empty line, so a cursor placed after the
/// last line break still maps to a line.
pub fn line_lengths(text: &str) -> Vec<usize> {
    text.split('\n').map(str::len).collect()
}
