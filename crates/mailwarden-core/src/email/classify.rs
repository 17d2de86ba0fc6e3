//! Keyword-based priority classification.

use serde::{Deserialize, Serialize};

use super::model::Priority;

/// Keyword sets driving priority classification.
///
/// Tiers are checked high first, then medium, then low; the first tier with
/// a matching keyword wins, and no match at all yields [`Priority::Low`].
/// Matching is a case-insensitive substring scan over subject and body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityKeywords {
    /// Keywords forcing high priority.
    #[serde(default)]
    pub high: Vec<String>,
    /// Keywords forcing medium priority.
    #[serde(default)]
    pub medium: Vec<String>,
    /// Keywords explicitly marking low priority.
    #[serde(default)]
    pub low: Vec<String>,
}

impl PriorityKeywords {
    /// Classify a message by its subject and body.
    #[must_use]
    pub fn classify(&self, subject: &str, body: &str) -> Priority {
        let haystack = format!("{} {}", subject.to_lowercase(), body.to_lowercase());

        let matches = |keywords: &[String]| {
            keywords
                .iter()
                .any(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
        };

        if matches(&self.high) {
            Priority::High
        } else if matches(&self.medium) {
            Priority::Medium
        } else {
            // Low keywords and the no-match default land on the same tier;
            // the scan is kept so tier ordering stays explicit.
            Priority::Low
        }
    }
}
