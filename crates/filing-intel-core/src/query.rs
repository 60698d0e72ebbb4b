//! Keyword routing of analysis queries to extractors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Metric,
    Risk,
    Summary,
}

/// Terms that route a query to the metric extractor.
pub const METRIC_TERMS: &[&str] = &[
    "revenue",
    "income",
    "profit",
    "eps",
    "earnings",
    "margin",
    "ratio",
    "debt",
    "equity",
    "cash",
    "assets",
    "liabilities",
    "expenses",
    "dividend",
];

/// Classify by case-insensitive keyword. Metric terms are checked first,
/// then `risk`, then `summary`/`summarize`; anything else is a summary.
pub fn classify_query(query: &str) -> QueryKind {
    let q = query.to_lowercase();
    if METRIC_TERMS.iter().any(|t| contains_term(&q, t)) {
        QueryKind::Metric
    } else if q.contains("risk") {
        QueryKind::Risk
    } else {
        QueryKind::Summary
    }
}

fn contains_term(haystack: &str, term: &str) -> bool {
    // Short terms must match whole words so "eps" does not fire on "steps".
    if term.len() <= 3 {
        haystack
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == term)
    } else {
        haystack.contains(term)
    }
}
