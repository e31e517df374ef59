//! Filter state and predicate evaluation.

use std::borrow::Cow;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PatternError, ValidationError};
use crate::message::{ClassifiedMessage, MessageKind};
use crate::subject::{SubjectPattern, DELIMITER};
use crate::tree::SubjectNode;

use super::parse::parse_text;

/// How a text term is matched.
#[derive(Debug, Clone)]
pub enum TextPredicate {
    /// Case-insensitive substring of subject or payload. Stored lowercased.
    Plain(String),
    /// Case-insensitive regex searched in subject or payload.
    Regex(Regex),
    /// A plain term with wildcard tokens, matched against the subject.
    Subject(SubjectPattern),
}

impl TextPredicate {
    /// Evaluates the predicate against a message.
    #[must_use]
    pub fn matches(&self, msg: &ClassifiedMessage) -> bool {
        match self {
            Self::Plain(needle) => {
                msg.subject.to_lowercase().contains(needle.as_str())
                    || msg.payload_text().to_lowercase().contains(needle.as_str())
            }
            Self::Regex(re) => re.is_match(&msg.subject) || re.is_match(&msg.payload_text()),
            Self::Subject(pattern) => pattern.matches(&msg.subject),
        }
    }
}

/// Parsed text filter: space-separated terms, each `term`, `/regex/` or a
/// `!`-prefixed exclusion. Every include term must match and no exclude
/// term may.
#[derive(Debug, Clone)]
pub struct TextFilter {
    /// The text as entered, trimmed.
    pub raw: String,
    /// Terms that must all match.
    pub include: Vec<TextPredicate>,
    /// Terms none of which may match.
    pub exclude: Vec<TextPredicate>,
}

impl TextFilter {
    /// Evaluates the terms against a message.
    #[must_use]
    pub fn matches(&self, msg: &ClassifiedMessage) -> bool {
        self.include.iter().all(|p| p.matches(msg)) && !self.exclude.iter().any(|p| p.matches(msg))
    }
}

/// Internal subjects hidden from filtered views.
///
/// Hidden messages are still stored and correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HideConfig {
    /// Hide `_INBOX.` subjects.
    pub inbox: bool,
    /// Hide `$JS.` subjects.
    pub jetstream: bool,
    /// Hide messages whose reply address starts with `$JS.ACK.`.
    pub jetstream_ack: bool,
}

impl HideConfig {
    /// Whether the message is hidden by these rules.
    #[must_use]
    pub fn hides(&self, msg: &ClassifiedMessage) -> bool {
        (self.inbox && msg.subject.starts_with("_INBOX."))
            || (self.jetstream && msg.subject.starts_with("$JS."))
            || (self.jetstream_ack
                && msg
                    .reply_to
                    .as_deref()
                    .is_some_and(|r| r.starts_with("$JS.ACK.")))
    }
}

/// A subtree selected in the tree browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSelection {
    /// Full subject path of the selected node.
    pub path: String,
    /// Pattern the selection filters by.
    pub pattern: SubjectPattern,
}

impl TreeSelection {
    /// Selection for a node of the subject tree.
    ///
    /// # Errors
    ///
    /// Fails for the root node, or a path with wildcard syntax.
    pub fn from_node(node: &SubjectNode) -> Result<Self, PatternError> {
        Ok(Self {
            path: node.path.clone(),
            pattern: node.selection_pattern()?,
        })
    }
}

/// Subject-pattern test. A correlated response is also admitted through
/// the subject of the request it answers, so `svc.>` keeps the replies
/// to `svc.*` requests in view.
fn admits(pattern: &SubjectPattern, msg: &ClassifiedMessage) -> bool {
    pattern.matches(&msg.subject)
        || (msg.kind == MessageKind::Response
            && msg
                .correlation
                .as_ref()
                .is_some_and(|c| !c.request_subject.is_empty() && pattern.matches(&c.request_subject)))
}

/// The active view.
///
/// All active constraints are ANDed. Exclusion applies to text terms only,
/// never to the type or subject constraints.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    pub text: Option<TextFilter>,
    pub kind: Option<MessageKind>,
    pub subject: Option<SubjectPattern>,
    pub tree: Option<TreeSelection>,
    pub hide: HideConfig,
}

impl FilterState {
    /// Empty state; matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the text filter from filter syntax (see [`TextFilter`]).
    /// Text without any term clears text filtering.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRegex`] for an uncompilable regex.
    pub fn with_text(mut self, text: &str) -> Result<Self, ValidationError> {
        self.text = parse_text(text)?;
        Ok(self)
    }

    /// Sets or clears the type constraint.
    #[must_use]
    pub const fn with_kind(mut self, kind: Option<MessageKind>) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the subject pattern; an empty string clears it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPattern`] for bad pattern syntax.
    pub fn with_subject_pattern(mut self, pattern: &str) -> Result<Self, ValidationError> {
        let pattern = pattern.trim();
        self.subject = if pattern.is_empty() {
            None
        } else {
            Some(SubjectPattern::parse(pattern)?)
        };
        Ok(self)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_tree(mut self, selection: Option<TreeSelection>) -> Self {
        self.tree = selection;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn with_hide(mut self, hide: HideConfig) -> Self {
        self.hide = hide;
        self
    }

    /// Whether any constraint is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.text.is_some()
            || self.kind.is_some()
            || self.subject.is_some()
            || self.tree.is_some()
            || self.hide != HideConfig::default()
    }

    /// Evaluates all active constraints against a message.
    #[must_use]
    pub fn matches(&self, msg: &ClassifiedMessage) -> bool {
        if self.hide.hides(msg) {
            return false;
        }
        if self.kind.is_some_and(|k| k != msg.kind) {
            return false;
        }
        if self.subject.as_ref().is_some_and(|p| !admits(p, msg)) {
            return false;
        }
        if self.tree.as_ref().is_some_and(|t| !t.pattern.matches(&msg.subject)) {
            return false;
        }
        self.text.as_ref().map_or(true, |text| text.matches(msg))
    }

    /// Subject as displayed under the active tree selection.
    ///
    /// Subjects below the selected path lose the prefix (`...<rest>`).
    #[must_use]
    pub fn display_subject<'a>(&self, subject: &'a str) -> Cow<'a, str> {
        let Some(tree) = &self.tree else {
            return Cow::Borrowed(subject);
        };

        if let Some(rest) = subject
            .strip_prefix(tree.path.as_str())
            .and_then(|r| r.strip_prefix(DELIMITER))
        {
            return Cow::Owned(format!("...{rest}"));
        }
        if subject == tree.path {
            if let Some((_, last)) = subject.rsplit_once(DELIMITER) {
                return Cow::Owned(format!("...{last}"));
            }
        }
        Cow::Borrowed(subject)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::message::{Direction, MessageId, MessageSource, ReceivedAt};
    use crate::tree::SubjectTree;

    fn msg(subject: &str, payload: &str, kind: MessageKind) -> ClassifiedMessage {
        ClassifiedMessage {
            id: MessageId::new(0),
            subject: subject.to_string(),
            payload: payload.as_bytes().to_vec(),
            headers: BTreeMap::new(),
            reply_to: None,
            received_at: ReceivedAt::wall(Utc::now()),
            direction: Direction::Inbound,
            source: MessageSource::Live,
            kind,
            correlation: None,
        }
    }

    #[test]
    fn empty_state_matches_everything() {
        let state = FilterState::new();
        assert!(!state.is_active());
        assert!(state.matches(&msg("a", "", MessageKind::Publish)));
    }

    #[test]
    fn plain_text_is_case_insensitive() {
        let state = FilterState::new().with_text("ERROR").unwrap();
        assert!(state.matches(&msg("svc.log", "{\"level\":\"error\"}", MessageKind::Publish)));
        assert!(state.matches(&msg("Error.events", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("svc.log", "ok", MessageKind::Publish)));
    }

    #[test]
    fn regex_text_searches_subject_and_payload() {
        let state = FilterState::new().with_text("/ad+/").unwrap();
        assert!(state.matches(&msg("svc.add", "", MessageKind::Request)));
        assert!(state.matches(&msg("x", "ADD", MessageKind::Request)));
        assert!(!state.matches(&msg("svc.sub", "", MessageKind::Request)));
    }

    #[test]
    fn exclude_inverts_text() {
        let state = FilterState::new().with_text("!heartbeat").unwrap();
        assert_eq!(state.text.as_ref().unwrap().exclude.len(), 1);
        assert!(!state.matches(&msg("svc.heartbeat", "", MessageKind::Publish)));
        assert!(state.matches(&msg("svc.add", "", MessageKind::Publish)));
    }

    #[test]
    fn include_and_exclude_terms_combine() {
        let state = FilterState::new().with_text("svc !heartbeat").unwrap();
        assert!(state.matches(&msg("svc.add", "", MessageKind::Request)));
        assert!(!state.matches(&msg("svc.heartbeat", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("orders.created", "", MessageKind::Publish)));
    }

    #[test]
    fn all_include_terms_must_match() {
        let state = FilterState::new().with_text("svc error").unwrap();
        assert!(state.matches(&msg("svc.log", "disk error", MessageKind::Publish)));
        assert!(!state.matches(&msg("svc.log", "ok", MessageKind::Publish)));
        assert!(!state.matches(&msg("db.log", "error", MessageKind::Publish)));
    }

    #[test]
    fn regex_term_keeps_its_spaces() {
        let state = FilterState::new().with_text("/a b/ !/x y/").unwrap();
        assert!(state.matches(&msg("svc", "A B", MessageKind::Publish)));
        assert!(!state.matches(&msg("svc", "a b x y", MessageKind::Publish)));
        assert!(!state.matches(&msg("svc", "ab", MessageKind::Publish)));
    }

    #[test]
    fn exclude_does_not_invert_type() {
        let state = FilterState::new()
            .with_text("!add")
            .unwrap()
            .with_kind(Some(MessageKind::Request));
        assert!(!state.matches(&msg("svc.log", "", MessageKind::Publish)));
        assert!(state.matches(&msg("svc.sub", "", MessageKind::Request)));
    }

    #[test]
    fn wildcard_term_matches_subject() {
        let state = FilterState::new().with_text("orders.*").unwrap();
        assert!(state.matches(&msg("orders.created", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("x", "orders.created", MessageKind::Publish)));
    }

    #[test]
    fn subject_pattern_and_type_are_anded() {
        let state = FilterState::new()
            .with_subject_pattern("svc.>")
            .unwrap()
            .with_kind(Some(MessageKind::Request));
        assert!(state.matches(&msg("svc.add", "", MessageKind::Request)));
        assert!(!state.matches(&msg("svc.add", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("other.add", "", MessageKind::Request)));
    }

    #[test]
    fn correlated_response_follows_request_subject() {
        let state = FilterState::new().with_subject_pattern("svc.>").unwrap();
        let mut res = msg("_INBOX.1", "", MessageKind::Response);
        assert!(!state.matches(&res));
        res.correlation = Some(crate::message::Correlation {
            correlation_id: uuid::Uuid::nil(),
            latency: std::time::Duration::from_millis(1),
            matched_ref: Some(MessageId::new(0)),
            request_subject: "svc.add".to_string(),
        });
        assert!(state.matches(&res));

        let tree = SubjectTree::from_subjects(["svc.add"]);
        let node = tree.root().find("svc").unwrap();
        let by_tree = FilterState::new().with_tree(Some(TreeSelection::from_node(node).unwrap()));
        assert!(!by_tree.matches(&res));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(
            FilterState::new().with_subject_pattern("a.>.b"),
            Err(ValidationError::InvalidPattern(_))
        ));
        assert!(FilterState::new().with_subject_pattern("  ").unwrap().subject.is_none());
    }

    #[test]
    fn hide_rules() {
        let state = FilterState::new().with_hide(HideConfig {
            inbox: true,
            jetstream: true,
            jetstream_ack: true,
        });
        assert!(!state.matches(&msg("_INBOX.abc", "", MessageKind::Response)));
        assert!(!state.matches(&msg("$JS.API.INFO", "", MessageKind::Publish)));
        let mut acked = msg("orders", "", MessageKind::Request);
        acked.reply_to = Some("$JS.ACK.orders.1".to_string());
        assert!(!state.matches(&acked));
        assert!(state.matches(&msg("orders", "", MessageKind::Publish)));
    }

    #[test]
    fn tree_selection_filters_and_shortens_display() {
        let tree = SubjectTree::from_subjects(["orders.created.eu", "orders.deleted"]);
        let node = tree.root().find("orders").unwrap();
        let state = FilterState::new().with_tree(Some(TreeSelection::from_node(node).unwrap()));

        assert!(state.matches(&msg("orders.created.eu", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("orders", "", MessageKind::Publish)));
        assert!(!state.matches(&msg("svc.add", "", MessageKind::Publish)));

        assert_eq!(state.display_subject("orders.created.eu"), "...created.eu");
        assert_eq!(state.display_subject("svc.add"), "svc.add");
    }

    #[test]
    fn display_subject_for_selected_leaf() {
        let tree = SubjectTree::from_subjects(["orders.created"]);
        let node = tree.root().find("orders.created").unwrap();
        let state = FilterState::new().with_tree(Some(TreeSelection::from_node(node).unwrap()));
        assert_eq!(state.display_subject("orders.created"), "...created");
    }
}
