use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::core::aggregate::{
    ClassifiedShares, grouped_mean, pct_change, threshold_classify, weighted_mean,
};
use crate::error::ModelError;

/// Materiality threshold, in percentage points, below which a household's
/// income change is treated as unchanged.
pub const CHANGE_THRESHOLD_PCT: f64 = 0.01;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecileImpact {
    pub decile: u32,
    pub avg_baseline: f64,
    pub avg_reformed: f64,
}

impl DecileImpact {
    pub fn avg_change(&self) -> f64 {
        self.avg_reformed - self.avg_baseline
    }

    pub fn pct_change(&self) -> f64 {
        pct_change(self.avg_baseline, self.avg_reformed)
    }
}

/// One row per income decile with non-zero population weight: mean
/// baseline and reformed household net income. Empty deciles are omitted.
pub fn decile_impacts(
    baseline_income: &[f64],
    reformed_income: &[f64],
    decile_key: &[f64],
    weights: &[f64],
) -> Vec<DecileImpact> {
    let baseline_means = grouped_mean(baseline_income, weights, decile_key, 1..=10);
    let reformed_means = grouped_mean(reformed_income, weights, decile_key, 1..=10);
    baseline_means
        .into_iter()
        .zip(reformed_means)
        .map(|((decile, avg_baseline), (_, avg_reformed))| DecileImpact {
            decile,
            avg_baseline,
            avg_reformed,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnersLosersRow {
    pub decile: u32,
    pub pct_losers: f64,
    pub pct_winners: f64,
    pub pct_no_change: f64,
}

/// Classify household populations per decile into losers, winners and
/// unchanged, scaled to people via household size. Deciles with no
/// population are omitted.
pub fn winners_losers(
    baseline_income: &[f64],
    reformed_income: &[f64],
    decile_key: &[f64],
    weights: &[f64],
    count_people: &[f64],
    threshold: f64,
) -> Vec<WinnersLosersRow> {
    let pct_changes: Vec<f64> = baseline_income
        .iter()
        .zip(reformed_income)
        .map(|(&b, &r)| pct_change(b, r))
        .collect();

    (1..=10)
        .filter_map(|decile| {
            let mask: Vec<bool> = decile_key.iter().map(|&k| k == f64::from(decile)).collect();
            threshold_classify(&pct_changes, weights, count_people, &mask, threshold).map(
                |ClassifiedShares {
                     pct_losers,
                     pct_winners,
                     pct_no_change,
                 }| WinnersLosersRow {
                    decile,
                    pct_losers,
                    pct_winners,
                    pct_no_change,
                },
            )
        })
        .collect()
}

/// Geographic unit metadata plus its household weight matrix
/// (units × households), keyed by the year the weights were calibrated
/// for.
#[derive(Debug, Clone)]
pub struct GeoData {
    pub units: Vec<GeoUnit>,
    pub weights: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoUnit {
    pub code: String,
    pub name: String,
}

impl GeoData {
    /// Load unit weights (JSON, year-keyed matrices) and unit metadata
    /// (CSV with `code` and `name` columns). A missing or inconsistent
    /// file is a [`ModelError::MissingInputData`]; callers skip the
    /// geographic table rather than failing the run.
    pub fn load(
        weights_path: &Path,
        metadata_path: &Path,
        weights_year: u32,
    ) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(weights_path).map_err(|e| {
            ModelError::MissingInputData(format!(
                "geographic weights {}: {e}",
                weights_path.display()
            ))
        })?;
        let by_year: HashMap<String, Vec<Vec<f64>>> =
            serde_json::from_str(&raw).map_err(|e| ModelError::Parse {
                path: weights_path.display().to_string(),
                message: e.to_string(),
            })?;
        let weights = by_year.get(&weights_year.to_string()).cloned().ok_or_else(|| {
            ModelError::MissingInputData(format!(
                "no geographic weights for year {weights_year} in {}",
                weights_path.display()
            ))
        })?;

        let units = load_geo_units(metadata_path)?;
        if units.len() != weights.len() {
            return Err(ModelError::MissingInputData(format!(
                "{} metadata rows but {} weight vectors",
                units.len(),
                weights.len()
            )));
        }
        Ok(Self { units, weights })
    }
}

fn load_geo_units(path: &Path) -> Result<Vec<GeoUnit>, ModelError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ModelError::MissingInputData(format!("unit metadata {}: {e}", path.display()))
    })?;
    let mut lines = raw.lines();
    let header = lines.next().ok_or_else(|| ModelError::Parse {
        path: path.display().to_string(),
        message: "empty metadata file".to_string(),
    })?;
    let columns = parse_csv_line(header);
    let code_idx = columns.iter().position(|c| c == "code");
    let name_idx = columns.iter().position(|c| c == "name");
    let (code_idx, name_idx) = match (code_idx, name_idx) {
        (Some(c), Some(n)) => (c, n),
        _ => {
            return Err(ModelError::Parse {
                path: path.display().to_string(),
                message: "metadata header needs 'code' and 'name' columns".to_string(),
            });
        }
    };

    let mut units = Vec::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let cells = parse_csv_line(line);
        if cells.len() <= code_idx.max(name_idx) {
            return Err(ModelError::Parse {
                path: path.display().to_string(),
                message: format!("short metadata row: {line}"),
            });
        }
        units.push(GeoUnit {
            code: cells[code_idx].clone(),
            name: cells[name_idx].clone(),
        });
    }
    Ok(units)
}

/// Minimal CSV field splitting with double-quote handling; unit names can
/// contain commas.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoImpact {
    pub code: String,
    pub name: String,
    pub avg_change: f64,
}

/// Mean household income change per geographic unit, each unit weighted
/// by its own weight vector and divided by its own weighted population
/// count. Units carrying no weight are skipped.
pub fn geo_impacts(
    baseline_income: &[f64],
    reformed_income: &[f64],
    geo: &GeoData,
) -> Vec<GeoImpact> {
    let change: Vec<f64> = baseline_income
        .iter()
        .zip(reformed_income)
        .map(|(&b, &r)| r - b)
        .collect();
    let all = vec![true; change.len()];

    geo.units
        .iter()
        .zip(&geo.weights)
        .filter_map(|(unit, unit_weights)| {
            if unit_weights.len() != change.len() {
                warn!(
                    unit = %unit.code,
                    expected = change.len(),
                    actual = unit_weights.len(),
                    "weight vector length mismatch; unit skipped"
                );
                return None;
            }
            match weighted_mean(&change, unit_weights, &all) {
                Some(avg_change) => Some(GeoImpact {
                    code: unit.code.clone(),
                    name: unit.name.clone(),
                    avg_change,
                }),
                None => {
                    warn!(unit = %unit.code, "zero-weight geographic unit skipped");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn decile_rows_skip_empty_deciles() {
        let baseline = [10_000.0, 20_000.0, 30_000.0];
        let reformed = [10_000.0, 19_000.0, 30_000.0];
        let decile = [1.0, 2.0, 2.0];
        let weights = [1.0, 1.0, 1.0];
        let rows = decile_impacts(&baseline, &reformed, &decile, &weights);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].decile, 1);
        assert_approx(rows[0].avg_change(), 0.0);
        assert_eq!(rows[1].decile, 2);
        assert_approx(rows[1].avg_baseline, 25_000.0);
        assert_approx(rows[1].avg_reformed, 24_500.0);
        assert_approx(rows[1].pct_change(), 100.0 * -500.0 / 25_000.0);
    }

    #[test]
    fn winners_losers_scales_to_people_and_sums_to_hundred() {
        let baseline = [10_000.0, 10_000.0, 10_000.0];
        let reformed = [9_000.0, 11_000.0, 10_000.0];
        let decile = [1.0, 1.0, 1.0];
        let weights = [1.0, 1.0, 2.0];
        let people = [2.0, 1.0, 1.0];
        let rows = winners_losers(
            &baseline,
            &reformed,
            &decile,
            &weights,
            &people,
            CHANGE_THRESHOLD_PCT,
        );
        assert_eq!(rows.len(), 1);
        let row = rows[0];
        // 5 people: 2 lose, 1 wins, 2 unchanged.
        assert_approx(row.pct_losers, 40.0);
        assert_approx(row.pct_winners, 20.0);
        assert_approx(row.pct_no_change, 40.0);
        assert_approx(row.pct_losers + row.pct_winners + row.pct_no_change, 100.0);
    }

    #[test]
    fn geo_impacts_use_per_unit_weights_and_skip_empty_units() {
        let baseline = [100.0, 200.0];
        let reformed = [90.0, 230.0];
        let geo = GeoData {
            units: vec![
                GeoUnit {
                    code: "U1".to_string(),
                    name: "Unit One".to_string(),
                },
                GeoUnit {
                    code: "U2".to_string(),
                    name: "Unit Two".to_string(),
                },
            ],
            weights: vec![vec![1.0, 3.0], vec![0.0, 0.0]],
        };
        let impacts = geo_impacts(&baseline, &reformed, &geo);
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].code, "U1");
        // (-10 * 1 + 30 * 3) / 4
        assert_approx(impacts[0].avg_change, 20.0);
    }

    #[test]
    fn csv_line_parsing_handles_quoted_commas() {
        assert_eq!(
            parse_csv_line("E14001096,\"Birmingham, Ladywood\""),
            vec!["E14001096", "Birmingham, Ladywood"]
        );
        assert_eq!(parse_csv_line("a,\"b\"\"c\",d"), vec!["a", "b\"c", "d"]);
    }

    #[test]
    fn geo_load_reports_missing_files_as_missing_input() {
        let err = GeoData::load(
            Path::new("/nonexistent/weights.json"),
            Path::new("/nonexistent/units.csv"),
            2025,
        )
        .expect_err("missing file");
        assert!(matches!(err, ModelError::MissingInputData(_)));
    }
}
