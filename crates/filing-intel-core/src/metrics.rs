//! Accuracy and summary-quality metrics over gold/prediction pairs.
//!
//! Values are `serde_json::Value` so corrections loaded from the monitoring
//! log (strings, numbers, booleans, nulls) can be compared as they are.
//! No function here can fail: degenerate input yields zeros.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecall {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Set when the inputs had different lengths and were truncated.
    #[serde(default)]
    pub length_mismatch: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RougeScores {
    #[serde(rename = "rouge-1")]
    pub rouge_1: f64,
    #[serde(rename = "rouge-2")]
    pub rouge_2: f64,
    #[serde(rename = "rouge-l")]
    pub rouge_l: f64,
}

/// Everything an evaluation run reports, plus free-form named scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub accuracy: AccuracyMetrics,
    #[serde(flatten)]
    pub rouge: RougeScores,
    pub scalars: BTreeMap<String, f64>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// `Some(true/false)` for booleans and the integers 0 and 1.
fn as_binary(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn truncate_pair<'a>(gold: &'a [Value], predictions: &'a [Value]) -> (&'a [Value], &'a [Value], bool) {
    let n = gold.len().min(predictions.len());
    let mismatch = gold.len() != predictions.len();
    if mismatch {
        warn!(
            gold = gold.len(),
            predictions = predictions.len(),
            "length mismatch between gold and predictions; truncating"
        );
    }
    (&gold[..n], &predictions[..n], mismatch)
}

/// Precision, recall and F1.
///
/// When every value is boolean (or 0/1) the standard binary formulas with
/// `true` as the positive class apply. Otherwise a true positive is an
/// exact match on a non-null gold value; precision divides by non-null
/// predictions and recall by non-null gold values.
pub fn calculate_precision_recall(gold: &[Value], predictions: &[Value]) -> PrecisionRecall {
    if gold.is_empty() || predictions.is_empty() {
        return PrecisionRecall::default();
    }
    let (gold, predictions, _) = truncate_pair(gold, predictions);
    precision_recall_aligned(gold, predictions)
}

fn precision_recall_aligned(gold: &[Value], predictions: &[Value]) -> PrecisionRecall {
    let binary: Option<Vec<(bool, bool)>> = gold
        .iter()
        .zip(predictions)
        .map(|(g, p)| Some((as_binary(g)?, as_binary(p)?)))
        .collect();

    let (precision, recall) = match binary {
        Some(pairs) => {
            let tp = pairs.iter().filter(|(g, p)| *g && *p).count();
            let fp = pairs.iter().filter(|(g, p)| !*g && *p).count();
            let fn_ = pairs.iter().filter(|(g, p)| *g && !*p).count();
            (ratio(tp, tp + fp), ratio(tp, tp + fn_))
        }
        None => {
            let tp = gold
                .iter()
                .zip(predictions)
                .filter(|(g, p)| !g.is_null() && g == p)
                .count();
            let predicted = predictions.iter().filter(|p| !p.is_null()).count();
            let expected = gold.iter().filter(|g| !g.is_null()).count();
            (ratio(tp, predicted), ratio(tp, expected))
        }
    };

    PrecisionRecall {
        precision,
        recall,
        f1: f1(precision, recall),
    }
}

/// Exact-match accuracy over the truncated pairs plus precision/recall/F1.
pub fn calculate_accuracy_metrics(gold: &[Value], predictions: &[Value]) -> AccuracyMetrics {
    if gold.is_empty() || predictions.is_empty() {
        return AccuracyMetrics::default();
    }
    let (gold, predictions, length_mismatch) = truncate_pair(gold, predictions);
    let correct = gold.iter().zip(predictions).filter(|(g, p)| g == p).count();
    let pr = precision_recall_aligned(gold, predictions);
    AccuracyMetrics {
        accuracy: ratio(correct, gold.len()),
        precision: pr.precision,
        recall: pr.recall,
        f1: pr.f1,
        length_mismatch,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn rouge_n(reference: &[String], generated: &[String], n: usize) -> f64 {
    let ref_counts = ngram_counts(reference, n);
    let gen_counts = ngram_counts(generated, n);
    let overlap: usize = gen_counts
        .iter()
        .map(|(gram, c)| (*c).min(ref_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    let precision = ratio(overlap, gen_counts.values().sum());
    let recall = ratio(overlap, ref_counts.values().sum());
    f1(precision, recall)
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn rouge_l(reference: &[String], generated: &[String]) -> f64 {
    let lcs = lcs_len(reference, generated);
    f1(ratio(lcs, generated.len()), ratio(lcs, reference.len()))
}

/// Average ROUGE-1, ROUGE-2 and ROUGE-L F1 scores.
///
/// Blank strings are dropped from each side before pairing, and the two
/// lists are truncated to the shorter length.
pub fn calculate_rouge_score(references: &[String], generated: &[String]) -> RougeScores {
    let refs: Vec<&String> = references.iter().filter(|r| !r.trim().is_empty()).collect();
    let gens: Vec<&String> = generated.iter().filter(|g| !g.trim().is_empty()).collect();
    let n = refs.len().min(gens.len());
    if n == 0 {
        return RougeScores::default();
    }

    let mut total = RougeScores::default();
    for (r, g) in refs.iter().zip(&gens).take(n) {
        let (r, g) = (tokens(r), tokens(g));
        total.rouge_1 += rouge_n(&r, &g, 1);
        total.rouge_2 += rouge_n(&r, &g, 2);
        total.rouge_l += rouge_l(&r, &g);
    }
    let n = n as f64;
    RougeScores {
        rouge_1: total.rouge_1 / n,
        rouge_2: total.rouge_2 / n,
        rouge_l: total.rouge_l / n,
    }
}
