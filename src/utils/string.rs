//! UTF-8 safe string previews.
//!
//! Tool results can be large (a full `ls -R`, a compiler log). The console only
//! gets a preview; the conversation keeps the whole text. These helpers cut by
//! `char`, never by byte index, so multibyte output cannot cause a panic.

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return `s` cut to `n` characters, followed by a marker saying how many
/// characters were left out. Short input comes back unchanged.
pub fn preview(s: &str, n: usize) -> String {
    let total = s.chars().count();
    if total <= n {
        return s.to_string();
    }
    format!("{}... ({} more chars)", prefix_chars(s, n), total - n)
}
