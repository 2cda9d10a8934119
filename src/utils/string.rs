//! UTF-8 safe string helpers.
//!
//! Output caps and audit truncation count Unicode scalar values, never bytes,
//! so multibyte text (CJK, emoji) cannot cause a slicing panic.

/// Return the first `n` characters of `s` (no ellipsis).
pub fn truncate_chars(s: &str, n: usize) -> String {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Return `s` capped at `n` characters with a trailing `...` when cut.
pub fn preview(s: &str, n: usize) -> String {
    match s.char_indices().nth(n) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
