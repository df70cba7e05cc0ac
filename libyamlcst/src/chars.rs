//! Character classes used by the grammar.
//!
//! All predicates take a single byte. Multi-byte UTF-8 sequences never match
//! any class, so they always behave as ordinary content.

/// Line feed or carriage return.
pub fn is_eol(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

/// Space or tab.
pub fn is_white_space(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// Space, tab, line feed or carriage return.
pub fn is_ws_or_eol(c: u8) -> bool {
    is_white_space(c) || is_eol(c)
}

/// One of `,[]{}`.
pub fn is_flow_indicator(c: u8) -> bool {
    matches!(c, b',' | b'[' | b']' | b'{' | b'}')
}

/// Value of a decimal digit, if `c` is one.
pub fn decimal_value(c: u8) -> Option<u8> {
    c.is_ascii_digit().then(|| c - b'0')
}

/// Value of a hex digit (either case), if `c` is one.
pub fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_classes() {
        assert!(is_white_space(b' '));
        assert!(is_white_space(b'\t'));
        assert!(!is_white_space(b'\n'));
        assert!(is_ws_or_eol(b'\r'));
        assert!(!is_ws_or_eol(0));
    }

    #[test]
    fn test_flow_indicator() {
        for c in b",[]{}" {
            assert!(is_flow_indicator(*c));
        }
        assert!(!is_flow_indicator(b':'));
    }

    #[test]
    fn test_digit_values() {
        assert_eq!(decimal_value(b'7'), Some(7));
        assert_eq!(decimal_value(b'a'), None);
        assert_eq!(hex_value(b'F'), Some(15));
        assert_eq!(hex_value(b'g'), None);
    }
}
