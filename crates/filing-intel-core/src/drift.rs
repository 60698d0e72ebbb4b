//! Distribution drift detection with the two-sample Kolmogorov–Smirnov test.
//!
//! Each named feature of the current window is compared against the same
//! feature in the baseline. Non-numeric and NaN values are dropped; a
//! feature needs at least [`MIN_SAMPLES`] valid values on both sides or it
//! is skipped. Drift is flagged when the p-value is below
//! [`DRIFT_P_THRESHOLD`].
//!
//! The two-sided p-value is exact (lattice-path counting) when
//! `n * m <= EXACT_LIMIT` and uses the asymptotic Kolmogorov distribution
//! otherwise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const DRIFT_P_THRESHOLD: f64 = 0.05;
pub const MIN_SAMPLES: usize = 2;
const EXACT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub statistic: f64,
    pub p_value: f64,
    pub drift_detected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// True iff any feature drifted.
    pub drift_detected: bool,
    pub features: BTreeMap<String, FeatureDrift>,
    /// Features present in the current window but not tested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Named samples per feature.
pub type Distribution = BTreeMap<String, Vec<Value>>;

/// Numbers and numeric strings; NaN and infinities are dropped.
pub fn numeric_values(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|x| x.is_finite())
        .collect()
}

pub fn detect_drift(current: &Distribution, baseline: &Distribution) -> DriftReport {
    let mut report = DriftReport::default();
    if current.is_empty() || baseline.is_empty() {
        warn!("empty distribution provided to drift check");
        report.error = Some("empty distribution provided".to_string());
        return report;
    }

    for (feature, values) in current {
        let Some(base_values) = baseline.get(feature) else {
            warn!(feature = %feature, "feature missing from baseline; skipping");
            report.skipped.push(feature.clone());
            continue;
        };
        let cur = numeric_values(values);
        let base = numeric_values(base_values);
        if cur.len() < MIN_SAMPLES || base.len() < MIN_SAMPLES {
            warn!(
                feature = %feature,
                current = cur.len(),
                baseline = base.len(),
                "not enough numeric samples; skipping"
            );
            report.skipped.push(feature.clone());
            continue;
        }

        let (statistic, p_value) = ks_2samp(&cur, &base);
        let drift_detected = p_value < DRIFT_P_THRESHOLD;
        report.drift_detected |= drift_detected;
        report.features.insert(
            feature.clone(),
            FeatureDrift {
                statistic,
                p_value,
                drift_detected,
            },
        );
    }
    report
}

/// Two-sample KS statistic and two-sided p-value.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> (f64, f64) {
    let d = ks_statistic(a, b);
    let (n, m) = (a.len(), b.len());
    let p = if n * m <= EXACT_LIMIT {
        exact_p_value(d, n, m)
    } else {
        asymptotic_p_value(d, n, m)
    };
    (d, p.clamp(0.0, 1.0))
}

/// `sup |F_a(x) - F_b(x)|` over the pooled sample.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n, m) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }
    d
}

/// `P(D >= d)` under H0 by counting monotone lattice paths from `(0, 0)`
/// to `(n, m)` that stay strictly inside the band `|i/n - j/m| < d`.
fn exact_p_value(d: f64, n: usize, m: usize) -> f64 {
    if d <= 0.0 {
        return 1.0;
    }
    let bound = d * (n * m) as f64 - 1e-7;
    let outside = |i: usize, j: usize| ((i * m) as f64 - (j * n) as f64).abs() >= bound;

    let mut row = vec![0.0f64; m + 1];
    row[0] = 1.0;
    for j in 1..=m {
        row[j] = if outside(0, j) { 0.0 } else { row[j - 1] };
    }
    for i in 1..=n {
        row[0] = if outside(i, 0) { 0.0 } else { row[0] };
        for j in 1..=m {
            row[j] = if outside(i, j) {
                0.0
            } else {
                row[j] + row[j - 1]
            };
        }
    }
    let inside = row[m];
    let total = binomial(n + m, n);
    1.0 - inside / total
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Kolmogorov distribution tail `Q(λ)` with the Stephens small-sample
/// correction on `λ`.
fn asymptotic_p_value(d: f64, n: usize, m: usize) -> f64 {
    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    kolmogorov_q(lambda)
}

fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev_term: f64 = 0.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = fac * (a2 * k * k).exp();
        sum += term;
        if term.abs() <= 0.001 * prev_term || term.abs() <= 1e-8 * sum {
            return sum;
        }
        fac = -fac;
        prev_term = term.abs();
    }
    1.0
}
