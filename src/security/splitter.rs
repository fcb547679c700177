//! Statement splitting and leading-verb matching.

use super::keywords::is_word_char;

/// Split normalized text into its top-level candidate statements.
///
/// Splits on every `;`, including one inside a string literal. Empty
/// segments (from `;;` or a trailing terminator) are dropped.
pub fn split_statements(normalized: &str) -> Vec<&str> {
    normalized
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Return the first allowed leading form the statement starts with.
///
/// Forms are uppercase and may span several words (`SET STATISTICS IO`).
/// The statement must be normalized so words are separated by single spaces.
/// A form matches only when the statement does not continue it with a word
/// character, so `SELECTED` does not start with `SELECT`.
pub fn leading_verb<'a>(statement: &str, allowed: &'a [String]) -> Option<&'a str> {
    let upper = statement.to_uppercase();
    allowed
        .iter()
        .map(String::as_str)
        .find(|form| starts_with_word(&upper, form))
}

fn starts_with_word(upper: &str, form: &str) -> bool {
    match upper.strip_prefix(form) {
        Some(rest) => !rest.chars().next().is_some_and(is_word_char),
        None => false,
    }
}
