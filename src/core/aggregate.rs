//! Weighted-statistics primitives shared by every aggregation in the
//! pipeline. All functions are pure and operate on person- or
//! household-aligned slices; baseline and reformed arrays must share length
//! and ordering.

/// Denominator floor used when a percentage change is taken against a
/// non-positive baseline. One currency unit, so pathological near-zero
/// households produce a large but finite change instead of a division by
/// zero or a sign flip.
pub const BASELINE_FLOOR: f64 = 1.0;

pub fn weighted_sum(values: &[f64], weights: &[f64]) -> f64 {
    assert_eq!(values.len(), weights.len());
    values.iter().zip(weights).map(|(v, w)| v * w).sum()
}

/// Total weight of the persons selected by `mask`.
pub fn weighted_count(weights: &[f64], mask: &[bool]) -> f64 {
    assert_eq!(weights.len(), mask.len());
    weights
        .iter()
        .zip(mask)
        .filter(|&(_, &m)| m)
        .map(|(w, _)| w)
        .sum()
}

/// Weighted mean over the masked subset. `None` when the subset carries no
/// weight: a zero-weight group means no data, not a zero value.
pub fn weighted_mean(values: &[f64], weights: &[f64], mask: &[bool]) -> Option<f64> {
    assert_eq!(values.len(), weights.len());
    assert_eq!(values.len(), mask.len());
    let mut num = 0.0;
    let mut denom = 0.0;
    for i in 0..values.len() {
        if mask[i] {
            num += values[i] * weights[i];
            denom += weights[i];
        }
    }
    if denom > 0.0 { Some(num / denom) } else { None }
}

/// Weighted mean of `values` restricted to each group in `groups`.
/// Groups with zero total weight are omitted, never emitted as zero rows.
pub fn grouped_mean(
    values: &[f64],
    weights: &[f64],
    group_key: &[f64],
    groups: impl IntoIterator<Item = u32>,
) -> Vec<(u32, f64)> {
    assert_eq!(values.len(), group_key.len());
    let mut out = Vec::new();
    for group in groups {
        let mask: Vec<bool> = group_key.iter().map(|&k| k == f64::from(group)).collect();
        if let Some(mean) = weighted_mean(values, weights, &mask) {
            out.push((group, mean));
        }
    }
    out
}

/// Percentage change with the baseline clamped to [`BASELINE_FLOOR`].
pub fn pct_change(baseline: f64, reformed: f64) -> f64 {
    100.0 * (reformed - baseline) / baseline.max(BASELINE_FLOOR)
}

/// Population shares classified by a materiality threshold on percentage
/// change, so floating-point noise is never reported as a real change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedShares {
    pub pct_losers: f64,
    pub pct_winners: f64,
    pub pct_no_change: f64,
}

/// Partition the masked population into losers (`pct < -threshold`),
/// winners (`pct > threshold`) and unchanged. `counts` scales each unit to
/// people (e.g. household size); shares are percentages of the masked
/// population and sum to 100 up to floating rounding. `None` when the
/// masked population is empty.
pub fn threshold_classify(
    pct_changes: &[f64],
    weights: &[f64],
    counts: &[f64],
    mask: &[bool],
    threshold: f64,
) -> Option<ClassifiedShares> {
    assert_eq!(pct_changes.len(), weights.len());
    assert_eq!(pct_changes.len(), counts.len());
    assert_eq!(pct_changes.len(), mask.len());

    let mut total = 0.0;
    let mut losers = 0.0;
    let mut winners = 0.0;
    for i in 0..pct_changes.len() {
        if !mask[i] {
            continue;
        }
        let people = counts[i] * weights[i];
        total += people;
        if pct_changes[i] < -threshold {
            losers += people;
        } else if pct_changes[i] > threshold {
            winners += people;
        }
    }
    if total <= 0.0 {
        return None;
    }
    let no_change = total - losers - winners;
    Some(ClassifiedShares {
        pct_losers: 100.0 * losers / total,
        pct_winners: 100.0 * winners / total,
        pct_no_change: 100.0 * no_change / total,
    })
}
