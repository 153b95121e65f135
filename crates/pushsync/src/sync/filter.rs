//! Label-based message filtering

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{ChangeKind, ResolvedMessage};

/// What a caller wants out of one push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageQuery {
    /// A message must carry at least one of these
    pub with_labels: BTreeSet<String>,
    /// A message carrying any of these is dropped
    pub without_labels: BTreeSet<String>,
    /// History entry kinds to keep
    pub history_kinds: Vec<ChangeKind>,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            with_labels: BTreeSet::from(["INBOX".to_string()]),
            without_labels: BTreeSet::new(),
            history_kinds: vec![ChangeKind::MessageAdded],
        }
    }
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.without_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn history_kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.history_kinds = kinds.into_iter().collect();
        self
    }

    /// Validated label predicate for this query
    pub fn label_filter(&self) -> Result<LabelFilter, ConfigError> {
        LabelFilter::new(self.with_labels.clone(), self.without_labels.clone())
    }
}

/// Inclusion and exclusion label predicate
#[derive(Debug, Clone)]
pub struct LabelFilter {
    with: BTreeSet<String>,
    without: BTreeSet<String>,
}

impl LabelFilter {
    /// Build a filter; a label in both sets is a configuration error
    pub fn new(with: BTreeSet<String>, without: BTreeSet<String>) -> Result<Self, ConfigError> {
        let overlap: Vec<String> = with.intersection(&without).cloned().collect();
        if !overlap.is_empty() {
            return Err(ConfigError::OverlappingLabels(overlap));
        }
        Ok(Self { with, without })
    }

    /// Whether `message` passes
    ///
    /// Exclusion wins over inclusion, and a message without labels never
    /// passes.
    pub fn matches(&self, message: &ResolvedMessage) -> bool {
        if message.label_ids.is_empty() {
            return false;
        }
        if message.label_ids.iter().any(|l| self.without.contains(l)) {
            return false;
        }
        message.label_ids.iter().any(|l| self.with.contains(l))
    }
}

/// One-shot form of [`LabelFilter::matches`]
pub fn matches(
    message: &ResolvedMessage,
    with: &BTreeSet<String>,
    without: &BTreeSet<String>,
) -> Result<bool, ConfigError> {
    Ok(LabelFilter::new(with.clone(), without.clone())?.matches(message))
}
