//! Compound message filtering.
//!
//! A [`FilterState`] is an immutable value; [`MessageFilter`] holds the
//! current one behind a lock and swaps it whole, so an evaluation always sees
//! either the old or the new state. Evaluation works on a snapshot of the
//! log and preserves arrival order.

/// Filter syntax parsing.
pub mod parse;
/// Filter state and predicates.
pub mod state;

use std::borrow::Borrow;
use std::sync::{Arc, PoisonError, RwLock};

pub use parse::{parse_kind, FilterSpec};
pub use state::{FilterState, HideConfig, TextFilter, TextPredicate, TreeSelection};

use crate::error::ValidationError;
use crate::message::{ClassifiedMessage, MessageKind};

/// Indices (into `messages`) of the messages matching `state`, in order.
#[must_use]
pub fn filter_indices<M: Borrow<ClassifiedMessage>>(messages: &[M], state: &FilterState) -> Vec<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| state.matches(Borrow::<ClassifiedMessage>::borrow(*m)))
        .map(|(i, _)| i)
        .collect()
}

/// The matching messages themselves, in order.
#[must_use]
pub fn filter_messages<'a, M: Borrow<ClassifiedMessage>>(
    messages: &'a [M],
    state: &FilterState,
) -> Vec<&'a M> {
    messages
        .iter()
        .filter(|m| state.matches(Borrow::<ClassifiedMessage>::borrow(*m)))
        .collect()
}

/// Holder for the currently active filter state.
#[derive(Debug, Default)]
pub struct MessageFilter {
    state: RwLock<Arc<FilterState>>,
}

impl MessageFilter {
    /// Filter starting from `state`.
    #[must_use]
    pub fn new(state: FilterState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// The active state. Cheap; later updates do not affect the returned value.
    #[must_use]
    pub fn current(&self) -> Arc<FilterState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the whole state.
    pub fn replace(&self, state: FilterState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }

    /// Derives a new state from the current one.
    ///
    /// On error the previous state stays in effect.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn update<F>(&self, f: F) -> Result<(), ValidationError>
    where
        F: FnOnce(FilterState) -> Result<FilterState, ValidationError>,
    {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(FilterState::clone(&guard))?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Sets the text filter: space-separated `term`, `/regex/` and `!term`.
    ///
    /// # Errors
    ///
    /// Invalid regex; the previous state stays in effect.
    pub fn set_text(&self, term: &str) -> Result<(), ValidationError> {
        self.update(|s| s.with_text(term))
    }

    /// Sets or clears the type constraint.
    pub fn set_kind(&self, kind: Option<MessageKind>) {
        // Infallible closure.
        let _ = self.update(|s| Ok(s.with_kind(kind)));
    }

    /// Sets or clears the subject pattern.
    ///
    /// # Errors
    ///
    /// Invalid pattern syntax; the previous state stays in effect.
    pub fn set_subject_pattern(&self, pattern: &str) -> Result<(), ValidationError> {
        self.update(|s| s.with_subject_pattern(pattern))
    }

    /// Sets or clears the tree-browser selection.
    pub fn set_tree(&self, selection: Option<TreeSelection>) {
        let _ = self.update(|s| Ok(s.with_tree(selection)));
    }

    /// Clears every constraint except the hide rules.
    pub fn clear(&self) {
        let _ = self.update(|s| Ok(FilterState::new().with_hide(s.hide)));
    }

    /// Evaluates the active state over `messages`.
    #[must_use]
    pub fn evaluate<M: Borrow<ClassifiedMessage>>(&self, messages: &[M]) -> Vec<usize> {
        filter_indices(messages, &self.current())
    }
}
