//! Subject wildcard matching.
//!
//! Subjects are dot-delimited token sequences. Patterns may contain two
//! wildcard tokens:
//!
//! - `*` matches exactly one token, whatever its content.
//! - `>` matches one or more trailing tokens and must be the last token.
//!
//! `>` never matches zero tokens: `a.>` matches `a.b` and `a.b.c` but not `a`.
//! The empty subject is a single empty token, so it is matched by `""`, `*`
//! and `>`.
//!
//! # Examples
//!
//! ```
//! use nnav::subject::{matches, overlaps};
//!
//! assert!(matches("orders.*.eu", "orders.created.eu"));
//! assert!(matches("orders.>", "orders.created.eu"));
//! assert!(!matches("orders.>", "orders"));
//! assert!(overlaps("orders.*", "*.created"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PatternError;

/// Token delimiter.
pub const DELIMITER: char = '.';
/// Single-token wildcard.
pub const SINGLE_WILDCARD: &str = "*";
/// Trailing multi-token wildcard.
pub const FULL_WILDCARD: &str = ">";

/// Returns true if `subject` is matched by `pattern`.
///
/// Total and pure: malformed input simply fails to match.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    if pattern == subject {
        return true;
    }

    let mut subject_tokens = subject.split(DELIMITER);
    let mut pattern_tokens = pattern.split(DELIMITER).peekable();

    while let Some(p) = pattern_tokens.next() {
        if p == FULL_WILDCARD && pattern_tokens.peek().is_none() {
            // At least one subject token must remain.
            return subject_tokens.next().is_some();
        }

        let Some(s) = subject_tokens.next() else {
            return false;
        };

        if p != SINGLE_WILDCARD && p != s {
            return false;
        }
    }

    subject_tokens.next().is_none()
}

/// Returns true if some subject could be matched by both patterns.
///
/// Used to decide whether a reply address can plausibly answer a
/// subscription.
#[must_use]
pub fn overlaps(a: &str, b: &str) -> bool {
    let a_tokens: Vec<&str> = a.split(DELIMITER).collect();
    let b_tokens: Vec<&str> = b.split(DELIMITER).collect();

    let mut i = 0;
    loop {
        match (a_tokens.get(i), b_tokens.get(i)) {
            (None, None) => return true,
            (Some(&x), Some(&y)) => {
                let x_full = x == FULL_WILDCARD && i + 1 == a_tokens.len();
                let y_full = y == FULL_WILDCARD && i + 1 == b_tokens.len();
                if x_full || y_full {
                    return true;
                }
                if x != SINGLE_WILDCARD && y != SINGLE_WILDCARD && x != y {
                    return false;
                }
            }
            _ => return false,
        }
        i += 1;
    }
}

/// A validated subject pattern.
///
/// Rejects syntax that [`matches`] would silently treat as literal text:
/// `>` anywhere but the end, tokens such as `a*` and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectPattern {
    raw: String,
    wildcard: bool,
}

impl SubjectPattern {
    /// Parses and validates a pattern.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] describing the first syntax problem found.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PatternError::Whitespace {
                pattern: raw.to_string(),
            });
        }

        let tokens: Vec<&str> = raw.split(DELIMITER).collect();
        let last = tokens.len() - 1;
        let mut wildcard = false;

        for (idx, token) in tokens.iter().enumerate() {
            if *token == FULL_WILDCARD {
                if idx != last {
                    return Err(PatternError::MisplacedFullWildcard {
                        pattern: raw.to_string(),
                    });
                }
                wildcard = true;
            } else if *token == SINGLE_WILDCARD {
                wildcard = true;
            } else if token.contains(['*', '>']) {
                return Err(PatternError::MixedWildcardToken {
                    pattern: raw.to_string(),
                    token: (*token).to_string(),
                });
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            wildcard,
        })
    }

    /// Pattern matching exactly one literal subject.
    ///
    /// # Errors
    ///
    /// Fails if the subject itself contains wildcard syntax or whitespace.
    pub fn exact(subject: &str) -> Result<Self, PatternError> {
        let pattern = Self::parse(subject)?;
        if pattern.wildcard {
            return Err(PatternError::MixedWildcardToken {
                pattern: subject.to_string(),
                token: subject.to_string(),
            });
        }
        Ok(pattern)
    }

    /// Pattern `<prefix>.>` matching everything strictly below `prefix`.
    ///
    /// # Errors
    ///
    /// Fails if `prefix` is not a valid literal subject.
    pub fn below(prefix: &str) -> Result<Self, PatternError> {
        Self::exact(prefix)?;
        Self::parse(&format!("{prefix}{DELIMITER}{FULL_WILDCARD}"))
    }

    /// Returns true if `subject` is matched by this pattern.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        if self.wildcard {
            matches(&self.raw, subject)
        } else {
            self.raw == subject
        }
    }

    /// Returns true if some subject could be matched by both patterns.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        overlaps(&self.raw, &other.raw)
    }

    /// Whether the pattern contains `*` or `>`.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for SubjectPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SubjectPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SubjectPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
