//! Text-mining strategies shared by the extractors.
//!
//! Each [`Matcher`] is an independent rule that returns the set of strings it
//! recognises in a text. Extractors run a list of matchers and union their
//! output, so rules can be added or tested in isolation.

use std::collections::BTreeSet;

use regex::Regex;

pub trait Matcher: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn find(&self, text: &str) -> BTreeSet<String>;
}

/// Collects one capture group of a regular expression.
pub struct RegexMatcher {
    name: &'static str,
    regex: Regex,
    group: usize,
}

impl RegexMatcher {
    pub fn new(name: &'static str, pattern: &str, group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            group,
        })
    }
}

impl Matcher for RegexMatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn find(&self, text: &str) -> BTreeSet<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|cap| cap.get(self.group))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Runs every matcher over `text` and unions the results.
pub fn find_all(matchers: &[Box<dyn Matcher>], text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for matcher in matchers {
        let hits = matcher.find(text);
        if !hits.is_empty() {
            log::trace!("matcher '{}' found {} candidate(s)", matcher.name(), hits.len());
        }
        found.extend(hits);
    }
    found
}

/// Compiles a static rule table. Patterns are constants, so a failure here
/// is a programming error surfaced at construction time.
pub fn compile(rules: &[(&'static str, &str, usize)]) -> Result<Vec<Box<dyn Matcher>>, regex::Error> {
    rules
        .iter()
        .map(|(name, pattern, group)| {
            RegexMatcher::new(name, pattern, *group).map(|m| Box::new(m) as Box<dyn Matcher>)
        })
        .collect()
}
