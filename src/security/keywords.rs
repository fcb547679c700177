//! Boundary-aware keyword scanning.
//!
//! A keyword matches only as a standalone token: the characters on either
//! side must not be letters, digits, or underscores. `DELETED_FLAG` does not
//! contain `DELETE`, while `DROP;TABLE` does contain `DROP`.
//!
//! An occurrence can be exempted by its neighbouring tokens, so schema
//! definitions may spell `ON DELETE CASCADE` or `AFTER INSERT, UPDATE` while
//! a bare `DELETE FROM users` is still denied.

use serde::{Deserialize, Serialize};

/// Whether a character can continue an identifier.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A token context in which denied keywords are tolerated.
///
/// An occurrence of one of `keywords` is exempt when the token directly
/// before it is one of `preceded_by`, or a comma after another exempt
/// keyword of the same list (`AFTER INSERT, UPDATE`). When `followed_by` is
/// non-empty, the next token must also be one of those. Tokens are words or
/// single punctuation characters, compared uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordExemption {
    /// Keywords this exemption covers
    pub keywords: Vec<String>,
    /// Tokens one of which must precede the keyword
    pub preceded_by: Vec<String>,
    /// Tokens one of which must follow the keyword; empty accepts any
    #[serde(default)]
    pub followed_by: Vec<String>,
}

impl KeywordExemption {
    /// Build an exemption from word lists.
    pub fn new(keywords: &[&str], preceded_by: &[&str], followed_by: &[&str]) -> Self {
        let upper = |list: &[&str]| list.iter().map(|s| s.trim().to_uppercase()).collect();
        Self {
            keywords: upper(keywords),
            preceded_by: upper(preceded_by),
            followed_by: upper(followed_by),
        }
    }

    fn normalized(&self) -> Self {
        let upper = |list: &[String]| list.iter().map(|s| s.trim().to_uppercase()).collect();
        Self {
            keywords: upper(&self.keywords),
            preceded_by: upper(&self.preceded_by),
            followed_by: upper(&self.followed_by),
        }
    }

    /// Whether the occurrence of `keyword` at byte offset `pos` is exempt.
    fn allows(&self, upper: &str, pos: usize, keyword: &str) -> bool {
        if !self.keywords.iter().any(|k| k == keyword) {
            return false;
        }

        if !self.followed_by.is_empty() {
            match next_token(upper, pos + keyword.len()) {
                Some(token) if self.followed_by.iter().any(|f| f == token) => {}
                _ => return false,
            }
        }

        let mut cursor = pos;
        loop {
            let Some((start, token)) = previous_token(upper, cursor) else {
                return false;
            };
            if self.preceded_by.iter().any(|p| p == token) {
                return true;
            }
            if token != "," {
                return false;
            }
            match previous_token(upper, start) {
                Some((prev_start, word)) if self.keywords.iter().any(|k| k == word) => {
                    cursor = prev_start;
                }
                _ => return false,
            }
        }
    }
}

/// The token ending at or before byte offset `end`, with its start offset.
fn previous_token(text: &str, end: usize) -> Option<(usize, &str)> {
    let head = text[..end].trim_end();
    let last = head.chars().next_back()?;
    if !is_word_char(last) {
        let start = head.len() - last.len_utf8();
        return Some((start, &head[start..]));
    }
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    Some((start, &head[start..]))
}

/// The token starting at or after byte offset `start`.
fn next_token(text: &str, start: usize) -> Option<&str> {
    let tail = text[start..].trim_start();
    let first = tail.chars().next()?;
    if !is_word_char(first) {
        return Some(&tail[..first.len_utf8()]);
    }
    let end = tail
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    Some(&tail[..end])
}

/// Keyword scanner over a fixed denylist.
#[derive(Debug, Clone, Default)]
pub struct KeywordScanner {
    keywords: Vec<String>,
    exemptions: Vec<KeywordExemption>,
}

impl KeywordScanner {
    /// Create a scanner. Keywords are uppercased; duplicates are dropped.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_uppercase();
            if !kw.is_empty() && !list.contains(&kw) {
                list.push(kw);
            }
        }
        Self {
            keywords: list,
            exemptions: Vec::new(),
        }
    }

    /// Tolerate keywords in the given token contexts.
    pub fn with_exemptions(mut self, exemptions: &[KeywordExemption]) -> Self {
        self.exemptions = exemptions.iter().map(KeywordExemption::normalized).collect();
        self
    }

    /// The keywords this scanner looks for.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Find the denylisted keyword that occurs earliest in the text.
    ///
    /// `upper` must already be uppercased. Exempt occurrences are skipped.
    pub fn scan(&self, upper: &str) -> Option<&str> {
        self.keywords
            .iter()
            .filter_map(|kw| {
                token_positions(upper, kw)
                    .find(|&pos| !self.exemptions.iter().any(|e| e.allows(upper, pos, kw)))
                    .map(|pos| (pos, kw.as_str()))
            })
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, kw)| kw)
    }
}

/// Byte offsets of every standalone occurrence of `keyword` in `text`.
fn token_positions<'a>(text: &'a str, keyword: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(keyword).map(|(pos, _)| pos).filter(move |&pos| {
        let before = text[..pos].chars().next_back();
        let after = text[pos + keyword.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// Byte offset of the first standalone occurrence of `keyword` in `text`.
pub fn find_token(text: &str, keyword: &str) -> Option<usize> {
    token_positions(text, keyword).next()
}

/// Whether `keyword` occurs as a standalone token in `text`.
pub fn contains_token(text: &str, keyword: &str) -> bool {
    find_token(text, keyword).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition_scanner() -> KeywordScanner {
        KeywordScanner::new(["INSERT", "UPDATE", "DELETE"]).with_exemptions(&[
            KeywordExemption::new(&["DELETE", "UPDATE"], &["ON"], &["CASCADE", "NO", "SET"]),
            KeywordExemption::new(
                &["INSERT", "UPDATE", "DELETE"],
                &["FOR", "AFTER", "OF"],
                &[",", "AS", "NOT", "WITH"],
            ),
        ])
    }

    #[test]
    fn test_identifier_substrings_do_not_match() {
        let s = KeywordScanner::new(["DELETE", "DROP"]);
        assert_eq!(s.scan("SELECT DELETED_FLAG FROM DROPS"), None);
        assert_eq!(s.scan("SELECT MY_DELETE FROM T"), None);
        assert_eq!(s.scan("SELECT DELETE2 FROM T"), None);
    }

    #[test]
    fn test_punctuation_is_a_boundary() {
        let s = KeywordScanner::new(["DROP"]);
        assert_eq!(s.scan("SELECT 1;DROP;TABLE"), Some("DROP"));
        assert_eq!(s.scan("(DROP)"), Some("DROP"));
        assert_eq!(s.scan("DROP"), Some("DROP"));
    }

    #[test]
    fn test_earliest_keyword_wins() {
        let s = KeywordScanner::new(["DELETE", "DROP"]);
        assert_eq!(s.scan("SELECT 1; DROP TABLE T; DELETE FROM U"), Some("DROP"));
    }

    #[test]
    fn test_later_standalone_occurrence_found() {
        let s = KeywordScanner::new(["EXEC"]);
        assert_eq!(s.scan("SELECT EXECUTOR, 1 EXEC"), Some("EXEC"));
    }

    #[test]
    fn test_keywords_normalized() {
        let s = KeywordScanner::new(["drop", " DROP ", "exec"]);
        assert_eq!(s.keywords(), &["DROP".to_string(), "EXEC".to_string()]);
    }

    #[test]
    fn test_find_token_non_ascii_neighbours() {
        assert_eq!(find_token("ÉDROP", "DROP"), None);
        assert_eq!(find_token("É DROP", "DROP"), Some(3));
    }

    #[test]
    fn test_referential_actions_exempt() {
        let s = definition_scanner();
        assert_eq!(
            s.scan("CREATE TABLE O (U INT REFERENCES U(ID) ON DELETE CASCADE ON UPDATE NO ACTION)"),
            None
        );
        assert_eq!(s.scan("ALTER TABLE T ADD FOREIGN KEY (A) REFERENCES B(A) ON DELETE SET NULL"), None);
    }

    #[test]
    fn test_trigger_events_exempt() {
        let s = definition_scanner();
        assert_eq!(s.scan("CREATE TRIGGER TR ON T AFTER INSERT, UPDATE, DELETE AS SELECT 1"), None);
        assert_eq!(s.scan("CREATE TRIGGER TR ON T INSTEAD OF DELETE AS SELECT 1"), None);
        assert_eq!(s.scan("CREATE TRIGGER TR ON T FOR INSERT NOT FOR REPLICATION AS SELECT 1"), None);
    }

    #[test]
    fn test_unguarded_dml_in_definition_denied() {
        let s = definition_scanner();
        assert_eq!(s.scan("ALTER TABLE T ADD C INT DELETE FROM USERS"), Some("DELETE"));
        assert_eq!(s.scan("CREATE TABLE T (ID INT) UPDATE USERS SET IS_ADMIN = 1"), Some("UPDATE"));
        assert_eq!(s.scan("CREATE INDEX IX ON T(ID) INSERT INTO ADMINS VALUES (1)"), Some("INSERT"));
        assert_eq!(s.scan("ALTER TABLE T ADD C INT, DELETE FROM USERS"), Some("DELETE"));
        assert_eq!(s.scan("CREATE TRIGGER TR ON T AFTER DELETE AS DELETE FROM USERS"), Some("DELETE"));
        assert_eq!(s.scan("CREATE TRIGGER TR ON T AFTER INSERT, DELETE FROM USERS"), Some("DELETE"));
        assert_eq!(s.scan("CREATE TABLE T (ID INT) ON DELETE FROM USERS"), Some("DELETE"));
    }

    #[test]
    fn test_neighbour_tokens() {
        assert_eq!(previous_token("ON  DELETE", 4), Some((0, "ON")));
        assert_eq!(previous_token("A, DELETE", 3), Some((1, ",")));
        assert_eq!(previous_token("DELETE", 0), None);
        assert_eq!(next_token("DELETE CASCADE", 6), Some("CASCADE"));
        assert_eq!(next_token("INSERT, UPDATE", 6), Some(","));
        assert_eq!(next_token("INSERT", 6), None);
    }
}
