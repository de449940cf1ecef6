#![allow(dead_code)]
//! Shared helpers for `codesearch-syntax` integration tests.

use codesearch_syntax::{parse_query, ParseError, Query};

pub fn parse_ok(input: &str) -> Query {
    parse_query(input).unwrap_or_else(|err| panic!("query {input:?} failed to parse: {err}"))
}

pub fn parse_err(input: &str) -> ParseError {
    match parse_query(input) {
        Err(err) => err,
        Ok(query) => panic!("query {input:?} unexpectedly parsed: {query:?}"),
    }
}

/// Expected value for a query that resolves to a plain case-folded content
/// pattern and nothing else.
pub fn folded_line(line: &str) -> Query {
    Query {
        line: line.to_string(),
        fold_case: true,
        ..Query::default()
    }
}
