//! Character-counted string helpers.
//!
//! Lengths here are Unicode scalar values, not bytes, so limits line up with
//! what a user sees and never split a codepoint.

/// Byte offset of the `n`th char, or `s.len()` if there are fewer.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// The first `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    &s[..char_offset(s, max)]
}

/// The last `max` characters of `s`.
pub fn tail_chars(s: &str, max: usize) -> &str {
    let total = s.chars().count();
    if total <= max {
        s
    } else {
        &s[char_offset(s, total - max)..]
    }
}

/// Display preview: at most `max` characters, marked when cut.
pub fn preview(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{head}... (truncated)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let s = "\u{4e16}\u{754c}\u{4eba}";
        assert_eq!(truncate_chars(s, 2), "\u{4e16}\u{754c}");
        let emoji = "\u{1F600}\u{1F601}";
        assert_eq!(truncate_chars(emoji, 1), "\u{1F600}");
    }

    #[test]
    fn tail_takes_trailing_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("caf\u{00e9}", 2), "f\u{00e9}");
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("short", 500), "short");
        let long = "x".repeat(600);
        let p = preview(&long, 500);
        assert!(p.ends_with("... (truncated)"));
        assert_eq!(p.len(), 500 + "... (truncated)".len());
    }
}
