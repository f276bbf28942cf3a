use std::collections::HashSet;

use crate::models::ExtractionMethod;

/// A script URL waiting to be fetched, with the rule that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTarget {
    pub url: String,
    pub method: ExtractionMethod,
}

/// Deduplicating, capped list of script URLs in discovery order.
pub struct TargetManager {
    targets: Vec<ScriptTarget>,
    seen: HashSet<String>,
    limit: usize,
}

impl TargetManager {
    /// Creates an empty manager accepting at most `limit` distinct URLs.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            targets: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    /// Queues `url` unless it was seen before or the cap is reached.
    /// Returns whether it was accepted.
    pub fn add_target(&mut self, url: String, method: ExtractionMethod) -> bool {
        if self.is_full() || self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.targets.push(ScriptTarget { url, method });
        true
    }

    /// Whether any accepted URL ends with `suffix`.
    pub fn any_ends_with(&self, suffix: &str) -> bool {
        self.seen.iter().any(|u| u.ends_with(suffix))
    }

    pub fn is_full(&self) -> bool {
        self.seen.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn into_targets(self) -> Vec<ScriptTarget> {
        self.targets
    }
}
