//! Filter syntax shared by the interactive filter and headless mode.
//!
//! Text is split into space-separated terms; a `/regex/` keeps its spaces.
//! Every include term must match, and no `!` term may.
//!
//! - `term` is a case-insensitive substring of subject or payload.
//! - `/regex/` is a case-insensitive regular expression.
//! - a plain term containing `*` or `>` that is a valid subject pattern is
//!   matched against the subject.
//! - a leading `!` excludes instead of includes.
//! - a type token is `PUB`, `REQ` or `RES`.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::message::MessageKind;
use crate::subject::SubjectPattern;

use super::state::{FilterState, HideConfig, TextFilter, TextPredicate};

/// Compiled regex size limit, bounding memory for hostile input.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Parses filter text into include and exclude terms.
///
/// Terms are split on whitespace, except inside `/.../`. A bare `!` is
/// ignored. Text without any term yields `None`.
pub(crate) fn parse_text(text: &str) -> Result<Option<TextFilter>, ValidationError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for term in split_terms(text) {
        match term.strip_prefix('!') {
            Some("") => {}
            Some(body) => exclude.push(parse_term(body)?),
            None => include.push(parse_term(term)?),
        }
    }

    if include.is_empty() && exclude.is_empty() {
        return Ok(None);
    }
    Ok(Some(TextFilter {
        raw: text.trim().to_string(),
        include,
        exclude,
    }))
}

/// Splits on whitespace outside `/.../` regex delimiters.
fn split_terms(text: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut start = None;
    let mut in_regex = false;

    for (i, c) in text.char_indices() {
        if c == '/' {
            in_regex = !in_regex;
        } else if c.is_whitespace() && !in_regex {
            if let Some(s) = start.take() {
                terms.push(&text[s..i]);
            }
            continue;
        }
        start.get_or_insert(i);
    }
    if let Some(s) = start {
        terms.push(&text[s..]);
    }
    terms
}

fn parse_term(term: &str) -> Result<TextPredicate, ValidationError> {
    if let Some(expr) = regex_body(term) {
        let re = RegexBuilder::new(expr)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| ValidationError::InvalidRegex {
                pattern: expr.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(TextPredicate::Regex(re));
    }
    if term.contains(['*', '>']) {
        if let Ok(p) = SubjectPattern::parse(term) {
            if p.is_wildcard() {
                return Ok(TextPredicate::Subject(p));
            }
        }
    }
    Ok(TextPredicate::Plain(term.to_lowercase()))
}

fn regex_body(term: &str) -> Option<&str> {
    if term.len() > 2 && term.starts_with('/') && term.ends_with('/') {
        Some(&term[1..term.len() - 1])
    } else {
        None
    }
}

/// Parses an optional type token; empty means no constraint.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownMessageKind`] for anything but
/// `PUB`/`REQ`/`RES` (case-insensitive).
pub fn parse_kind(token: &str) -> Result<Option<MessageKind>, ValidationError> {
    if token.trim().is_empty() {
        return Ok(None);
    }
    token.parse().map(Some)
}

/// Textual filter specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Text term, `/regex/`, optionally prefixed with `!`.
    pub text: Option<String>,
    /// `PUB`, `REQ` or `RES`.
    pub kind: Option<String>,
    /// Subject pattern with `*`/`>` wildcards.
    pub subject: Option<String>,
}

impl FilterSpec {
    /// Validates the specification into a filter state.
    ///
    /// # Errors
    ///
    /// Returns the first validation error among the three fields.
    pub fn build(&self, hide: HideConfig) -> Result<FilterState, ValidationError> {
        let mut state = FilterState::new().with_hide(hide);
        if let Some(text) = &self.text {
            state = state.with_text(text)?;
        }
        if let Some(kind) = &self.kind {
            state = state.with_kind(parse_kind(kind)?);
        }
        if let Some(subject) = &self.subject {
            state = state.with_subject_pattern(subject)?;
        }
        Ok(state)
    }
}
