//! # Search-box query syntax
//!
//! `codesearch-syntax` turns the raw text a user types into a code-search
//! box into a structured [`Query`] the search backend can execute. The
//! language mixes free-text regular expressions with `name:` filter
//! operators (`file:`, `repo:`, `tags:`, their negated `-` forms, plus
//! `case:`, `lit:` and `max_matches:`), and supports backslash escapes and
//! parenthesized grouping so operator-like or space-like characters can
//! appear literally inside a search term.
//!
//! Parsing is a single deterministic left-to-right pass with no
//! backtracking: a scanner accumulates text into per-operator buckets, and
//! an assembler resolves the buckets into the final record or a
//! [`ParseError`].
//!
//! ## Example
//! ```
//! use codesearch_syntax::parse_query;
//!
//! let query = parse_query("repo:linux file:\\.c$ EXPORT_SYMBOL").unwrap();
//! assert_eq!(query.repo, "linux");
//! assert_eq!(query.file, "\\.c$");
//! assert_eq!(query.line, "EXPORT_SYMBOL");
//! assert!(!query.fold_case);
//! ```

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Operator names the scanner recognizes. Anything else followed by `:`
/// stays literal text.
static KNOWN_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "file",
        "-file",
        "path",
        "-path",
        "repo",
        "-repo",
        "tags",
        "-tags",
        "case",
        "lit",
        "max_matches",
    ])
});

/// Parses a search-box query string into a [`Query`].
///
/// The scanner itself is total: every string scans to completion, including
/// unbalanced parentheses and trailing escapes. Only the semantic assembly
/// afterwards can fail, and only with one of the [`ParseError`] variants.
///
/// ```
/// use codesearch_syntax::parse_query;
///
/// let query = parse_query("(foo bar) baz").unwrap();
/// assert_eq!(query.line, "(foo bar) baz");
/// ```
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    trace!(query = input, "parsing search query");
    let buckets = scan(input.trim());
    assemble(&buckets)
}

/// The structured result of parsing one search-box query.
///
/// Plain data with no behavior: the record is handed to the search executor
/// (or serialized toward one) as-is. Pattern fields hold raw regular
/// expression text; an empty string means the filter is unset.
///
/// ```
/// use codesearch_syntax::parse_query;
///
/// // A lone file filter means "find files", not "find content".
/// let query = parse_query("file:foo.go").unwrap();
/// assert_eq!(query.line, "foo.go");
/// assert!(query.file.is_empty());
/// assert!(query.filename_only);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The content pattern to search for (or, with [`Self::filename_only`],
    /// the filename pattern).
    pub line: String,
    /// Restrict matches to paths matching this pattern.
    pub file: String,
    /// Restrict matches to repositories matching this pattern.
    pub repo: String,
    /// Restrict matches to repositories carrying matching tags.
    pub tags: String,
    /// Exclude paths matching this pattern.
    pub not_file: String,
    /// Exclude repositories matching this pattern.
    pub not_repo: String,
    /// Exclude repositories carrying matching tags.
    pub not_tags: String,
    /// Match case-insensitively.
    pub fold_case: bool,
    /// `line` names files rather than content; `file` is empty when set.
    pub filename_only: bool,
    /// Cap on returned matches; 0 means unlimited.
    pub max_matches: i32,
}

/// A query that scanned fine but asks for contradictory or malformed
/// things. The `Display` text is the message shown to the user.
///
/// ```
/// use codesearch_syntax::parse_query;
///
/// let err = parse_query("file:a.go path:b.go").unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "Cannot provide both file: and path:, because they are synonyms",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Both members of a synonym pair were given.
    #[error("Cannot provide both {first}: and {second}:, because they are synonyms")]
    SynonymConflict {
        first: &'static str,
        second: &'static str,
    },
    /// More than one of bare text, `case:` and `lit:` was given.
    #[error("You cannot provide multiple of case:, lit:, and a bare regex")]
    ConflictingLineSpecifiers,
    /// `max_matches:` was given a non-empty, non-integer value.
    #[error("Value given to max_matches: must be a valid integer")]
    InvalidMaxMatches,
}

/// The next structurally significant piece of the remaining input.
///
/// Offsets are byte positions into the remaining slice; all delimiters are
/// ASCII, so byte-wise scanning never lands inside a multi-byte character.
enum Piece {
    /// `name:` anchored at offset 0; the payload is the name's byte length.
    Tag(usize),
    /// A bare space at the given offset.
    Space(usize),
    /// `\` plus one code point at the given offset; the second payload is
    /// the total byte length of both.
    Escape(usize, usize),
    /// An opening parenthesis at the given offset.
    Group(usize),
}

/// Accumulation state for the scan: one text bucket per operator name, with
/// the empty name holding bare text, plus the name of the bucket currently
/// receiving text.
///
/// Appending goes through the map entry even when the text is empty, so a
/// key stays present once its operator has appeared. The assembler depends
/// on that: `case:` with no value still forces exact-case matching.
#[derive(Default)]
struct Buckets {
    ops: HashMap<String, String>,
    active: String,
}

impl Buckets {
    fn append(&mut self, text: &str) {
        self.ops
            .entry(self.active.clone())
            .or_default()
            .push_str(text);
    }

    fn switch_to(&mut self, name: &str) {
        self.active = name.to_string();
    }

    /// A space ends the active operator; at the bare level it is ordinary
    /// text, which is how multi-word regexes survive.
    fn leave_context(&mut self) {
        if self.active.is_empty() {
            self.append(" ");
        } else {
            self.active.clear();
        }
    }

    fn in_bare_text(&self) -> bool {
        self.active.is_empty()
    }

    fn get(&self, key: &str) -> &str {
        self.ops.get(key).map(String::as_str).unwrap_or("")
    }

    fn contains(&self, key: &str) -> bool {
        self.ops.contains_key(key)
    }
}

/// Single pass over the input, filling the operator buckets.
fn scan(input: &str) -> Buckets {
    let mut buckets = Buckets::default();
    let mut rest = input;
    loop {
        let Some(piece) = next_piece(rest) else {
            // Nothing structural left; the remainder is literal.
            buckets.append(rest);
            break;
        };
        match piece {
            Piece::Tag(name_len) => {
                let name = &rest[..name_len];
                if buckets.in_bare_text() && KNOWN_TAGS.contains(name) {
                    trace!(operator = name, "entering operator context");
                    buckets.switch_to(name);
                } else {
                    // Either an operator is already collecting text or the
                    // name is unrecognized; the whole token is literal.
                    buckets.append(&rest[..name_len + 1]);
                }
                rest = &rest[name_len + 1..];
            }
            Piece::Space(at) => {
                buckets.append(&rest[..at]);
                buckets.leave_context();
                rest = &rest[at + 1..];
            }
            Piece::Escape(at, len) => {
                // Both characters verbatim; never interpreted structurally.
                buckets.append(&rest[..at + len]);
                rest = &rest[at + len..];
            }
            Piece::Group(at) => {
                buckets.append(&rest[..at]);
                let inner = read_group(&rest[at + 1..]);
                buckets.append(&rest[at..at + 1 + inner]);
                rest = &rest[at + 1 + inner..];
            }
        }
    }
    buckets
}

/// Finds the next [`Piece`]: a tag token anchored at the current position,
/// or the earliest of `(`, an escape, or a space. `None` means the rest of
/// the input is plain text.
fn next_piece(rest: &str) -> Option<Piece> {
    if let Some(name_len) = tag_name_len(rest) {
        return Some(Piece::Tag(name_len));
    }
    for (at, byte) in rest.bytes().enumerate() {
        match byte {
            b' ' => return Some(Piece::Space(at)),
            b'(' => return Some(Piece::Group(at)),
            b'\\' => {
                if let Some(escaped) = rest[at + 1..].chars().next() {
                    return Some(Piece::Escape(at, 1 + escaped.len_utf8()));
                }
                // A trailing lone backslash escapes nothing and falls
                // through as plain text.
            }
            _ => {}
        }
    }
    None
}

/// Byte length of the identifier in a leading `name:` token, or `None` if
/// the remaining input does not start with one. Identifiers are one or more
/// ASCII letters, digits, hyphens or underscores.
fn tag_name_len(rest: &str) -> Option<usize> {
    let name_len = rest
        .bytes()
        .take_while(|&b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        .count();
    (name_len > 0 && rest.as_bytes().get(name_len) == Some(&b':')).then_some(name_len)
}

/// Consumes a parenthesized span, starting just after the opening `(`, and
/// returns how many bytes it ran. Nesting depth starts at 1; a backslash
/// shields exactly the next code point from being counted as `(` or `)`.
/// Running out of input before the group closes is fine; the scan just ends
/// there.
fn read_group(rest: &str) -> usize {
    let mut depth = 1usize;
    let mut escaped = false;
    let mut end = 0;
    for (at, ch) in rest.char_indices() {
        end = at + ch.len_utf8();
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    end
}

/// Resolves the finished buckets into a [`Query`], applying each semantic
/// rule in turn and stopping at the first violation.
fn assemble(ops: &Buckets) -> Result<Query, ParseError> {
    let mut query = Query {
        file: resolve_synonyms(ops, "file", "path")?,
        not_file: resolve_synonyms(ops, "-file", "-path")?,
        repo: ops.get("repo").to_string(),
        tags: ops.get("tags").to_string(),
        not_repo: ops.get("-repo").to_string(),
        not_tags: ops.get("-tags").to_string(),
        ..Query::default()
    };

    // Bare text, `case:` and `lit:` all claim the line pattern; at most one
    // may survive. `lit:` text is escaped so every metacharacter matches
    // itself.
    let mut specifiers = Vec::new();
    for key in ["", "case", "lit"] {
        let text = ops.get(key).trim();
        let text = if key == "lit" {
            regex::escape(text)
        } else {
            text.to_string()
        };
        if !text.is_empty() {
            specifiers.push(text);
        }
    }
    if specifiers.len() > 1 {
        return Err(ParseError::ConflictingLineSpecifiers);
    }
    if let Some(line) = specifiers.into_iter().next() {
        query.line = line;
    }

    // A path filter with no content pattern means the user wants to find
    // files, not lines.
    if query.line.is_empty() && !query.file.is_empty() {
        trace!("no content pattern; matching file names instead");
        query.line = std::mem::take(&mut query.file);
        query.filename_only = true;
    }

    // `case:` and `lit:` force exact case even when their text ended up
    // empty; otherwise a pattern without ASCII uppercase folds case.
    query.fold_case = if ops.contains("case") || ops.contains("lit") {
        false
    } else {
        !query.line.bytes().any(|b| b.is_ascii_uppercase())
    };

    // An explicitly empty `max_matches:` deliberately behaves like an
    // absent one (unlimited) rather than erroring.
    let cap = ops.get("max_matches");
    if !cap.is_empty() {
        query.max_matches = cap.parse().map_err(|_| ParseError::InvalidMaxMatches)?;
    }

    Ok(query)
}

/// Reads the value of a synonym pair from the buckets. Both being non-empty
/// is a user error, never a silent precedence pick.
fn resolve_synonyms(
    ops: &Buckets,
    first: &'static str,
    second: &'static str,
) -> Result<String, ParseError> {
    let a = ops.get(first);
    let b = ops.get(second);
    if !a.is_empty() && !b.is_empty() {
        return Err(ParseError::SynonymConflict { first, second });
    }
    Ok(if a.is_empty() { b } else { a }.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_need_an_identifier_and_a_colon() {
        assert_eq!(tag_name_len("file:x"), Some(4));
        assert_eq!(tag_name_len("-file:x"), Some(5));
        assert_eq!(tag_name_len("max_matches:5"), Some(11));
        assert_eq!(tag_name_len(":x"), None);
        assert_eq!(tag_name_len("file x"), None);
        assert_eq!(tag_name_len("fi le:x"), None);
        assert_eq!(tag_name_len(""), None);
    }

    #[test]
    fn tags_are_only_recognized_at_the_front() {
        // `next_piece` anchors the tag check at offset 0; `name:` text that
        // appears later is reached only after something structural.
        assert!(matches!(next_piece("repo:x"), Some(Piece::Tag(4))));
        assert!(matches!(next_piece("x repo:y"), Some(Piece::Space(1))));
        // Unknown names are still tag candidates here; the scanner decides
        // whether they mean anything.
        assert!(matches!(next_piece("xrepo:y"), Some(Piece::Tag(5))));
        assert!(matches!(next_piece("abc"), None));
    }

    #[test]
    fn earliest_structural_byte_wins() {
        assert!(matches!(next_piece("ab cd(e"), Some(Piece::Space(2))));
        assert!(matches!(next_piece("ab(cd e"), Some(Piece::Group(2))));
        assert!(matches!(next_piece(r"a\(b c"), Some(Piece::Escape(1, 2))));
    }

    #[test]
    fn escapes_span_one_code_point() {
        assert!(matches!(next_piece("a\\éb"), Some(Piece::Escape(1, 3))));
        // A trailing backslash escapes nothing.
        assert!(matches!(next_piece("ab\\"), None));
    }

    #[test]
    fn group_reader_consumes_through_the_matching_paren() {
        assert_eq!(read_group("a(b)c) tail"), 6);
        assert_eq!(read_group(")x"), 1);
    }

    #[test]
    fn group_reader_tolerates_unbalanced_input() {
        assert_eq!(read_group("ab"), 2);
        assert_eq!(read_group(""), 0);
        assert_eq!(read_group("(("), 2);
    }

    #[test]
    fn escaped_parens_do_not_change_group_depth() {
        assert_eq!(read_group(r"a\)b)"), 5);
        assert_eq!(read_group(r"a\(b)"), 5);
    }

    #[test]
    fn switching_context_records_the_key_even_without_text() {
        let buckets = scan("case:");
        assert!(buckets.contains("case"));
        assert_eq!(buckets.get("case"), "");

        let buckets = scan("lit: foo");
        assert!(buckets.contains("lit"));
        assert_eq!(buckets.get("lit"), "");
        assert_eq!(buckets.get(""), "foo");
    }

    #[test]
    fn repeated_operator_text_concatenates() {
        let buckets = scan("file:a file:b");
        assert_eq!(buckets.get("file"), "ab");
    }

    #[test]
    fn query_serializes_to_snake_case_json() {
        let query = parse_query("file:foo.go").unwrap();
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["line"], "foo.go");
        assert_eq!(json["filename_only"], true);
        assert_eq!(json["fold_case"], true);
        assert_eq!(json["max_matches"], 0);
    }
}
