//! Comment and whitespace normalization.
//!
//! Stripping is purely textual: comment markers inside string literals are
//! treated as comments too, so a literal containing `--` or `/*` is altered.

use once_cell::sync::Lazy;
use regex::Regex;

/// Line comments and block comments, whichever opens first.
///
/// An unterminated block comment runs to the end of the text.
static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"--[^\n]*|/\*(?s:.*?)(?:\*/|\z)")
        .unwrap_or_else(|e| panic!("Internal error: invalid comment pattern: {}", e))
});

/// Runs of spaces, tabs, carriage returns, and newlines.
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t\r\n]+")
        .unwrap_or_else(|e| panic!("Internal error: invalid whitespace pattern: {}", e))
});

/// Remove comments from a query.
///
/// Each comment is replaced by a single space so tokens on either side are
/// never glued together (`DROP/**/TABLE` becomes `DROP TABLE`).
pub fn strip_comments(query: &str) -> String {
    COMMENT_REGEX.replace_all(query, " ").into_owned()
}

/// Byte offsets just past the end of each comment in the text.
pub(crate) fn comment_ends(query: &str) -> impl Iterator<Item = usize> + '_ {
    COMMENT_REGEX.find_iter(query).map(|m| m.end())
}

/// Normalize a query: strip comments, collapse whitespace, trim.
///
/// The result is idempotent under a second normalization.
pub fn normalize(query: &str) -> String {
    let stripped = strip_comments(query);
    WHITESPACE_REGEX
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}
