use unicode_truncate::UnicodeTruncateStr;

/// Upper bound, in characters, of every short printable representation.
pub const MAX_PRINTABLE: usize = 65;

/// Replaces control characters with `.`, so the text is safe to put on one log line.
pub fn filter_non_printable(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '.' } else { c })
        .collect()
}

/// Cuts `text` down to at most `max_width` columns, never splitting a character.
pub fn truncate(text: &str, max_width: usize) -> String {
    text.unicode_truncate(max_width).0.to_owned()
}

#[cfg(test)]
mod tests {
    use super::{filter_non_printable, truncate};

    #[test]
    fn test_filter_non_printable() {
        assert_eq!(filter_non_printable("a\r\nb\u{7f}c"), "a..b.c");
        assert_eq!(filter_non_printable("héllo"), "héllo");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 10), "ab");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
