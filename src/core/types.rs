use serde::{Deserialize, Serialize};

/// Parameters for one cap-reform variant. Immutable for the duration of a
/// scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyParameters {
    /// Monetary ceiling above which sacrificed pay loses its
    /// tax-advantaged status.
    pub cap: f64,
    /// Employer social-insurance rate applied to newly taxable pay.
    pub employer_ni_rate: f64,
    /// Fraction of the employer's increased cost recovered through an
    /// across-the-board wage adjustment, in [0, 1].
    pub pass_through_rate: f64,
    /// When true, the excess is channelled into an ordinary employee
    /// pension contribution instead of cash pay.
    pub redirect_to_pension: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub parameters: PolicyParameters,
}

/// Outcome of one scenario run. Created once, never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    pub parameters: PolicyParameters,
    pub revenue_delta_bn: f64,
}

/// Fixed run-level configuration shared by every scenario.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub cap: f64,
    pub year: u32,
    pub employer_ni_rate: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cap: 2_000.0,
            year: 2029,
            employer_ni_rate: 0.15,
        }
    }
}

/// Published reference figures the model output is compared against.
///
/// The defaults are the shipped set; an alternative revision can be loaded
/// from JSON without code change, so these are plain data rather than
/// module-level constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReferenceFigures {
    pub ss_tax_base_bn: f64,
    pub ss_ee_nics_rate: f64,
    pub ss_er_nics_rate: f64,
    pub ss_static_bn: f64,
    pub bonus_tax_base_bn: f64,
    pub bonus_ee_nics_rate: f64,
    pub bonus_er_nics_rate: f64,
    pub bonus_static_bn: f64,
    pub revenue_static_bn: f64,
    pub revenue_headline_bn: f64,
    pub behav_employers_switching_bn: f64,
    pub behav_ras_timing_bn: f64,
    pub behav_pass_through_bn: f64,
    pub behav_other_bn: f64,
    pub wages_bn: f64,
    pub employment_m: f64,
    pub total_ss_users: f64,
    pub protected_below_cap: f64,
    pub affected_above_cap: f64,
    pub employee_ni_basic: f64,
    pub employee_ni_higher: f64,
    pub basic_rate_limit: f64,
}

impl Default for ReferenceFigures {
    fn default() -> Self {
        Self {
            ss_tax_base_bn: 14.3,
            ss_ee_nics_rate: 0.027,
            ss_er_nics_rate: 0.15,
            ss_static_bn: 2.5,
            bonus_tax_base_bn: 13.8,
            bonus_ee_nics_rate: 0.02,
            bonus_er_nics_rate: 0.15,
            bonus_static_bn: 2.3,
            revenue_static_bn: 4.9,
            revenue_headline_bn: 4.7,
            behav_employers_switching_bn: 0.5,
            behav_ras_timing_bn: -1.6,
            behav_pass_through_bn: 0.7,
            behav_other_bn: 0.5,
            wages_bn: 1_410.0,
            employment_m: 35.2,
            total_ss_users: 7_700_000.0,
            protected_below_cap: 4_300_000.0,
            affected_above_cap: 3_300_000.0,
            employee_ni_basic: 0.08,
            employee_ni_higher: 0.02,
            basic_rate_limit: 50_270.0,
        }
    }
}

impl ReferenceFigures {
    /// Average excess per affected worker implied by the reference tax base.
    pub fn avg_excess(&self) -> f64 {
        self.ss_tax_base_bn * 1e9 / self.affected_above_cap
    }
}

/// One named-metric comparison row: model value against reference value
/// with their ratio. Every comparison table shares this shape.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub metric: String,
    pub model: f64,
    pub reference: f64,
    pub unit: Option<&'static str>,
    pub decimals: usize,
}

impl ComparisonRow {
    pub fn new(metric: &str, model: f64, reference: f64, decimals: usize) -> Self {
        Self {
            metric: metric.to_string(),
            model,
            reference,
            unit: None,
            decimals,
        }
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn ratio(&self) -> Option<f64> {
        if self.reference == 0.0 {
            None
        } else {
            Some(self.model / self.reference)
        }
    }

    /// Render to CSV cells: metric, model, reference, [unit,] ratio.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![
            self.metric.clone(),
            format!("{:.*}", self.decimals, self.model),
            format!("{:.*}", self.decimals, self.reference),
        ];
        if let Some(unit) = self.unit {
            cells.push(unit.to_string());
        }
        cells.push(self.ratio().map(|r| format!("{r:.3}")).unwrap_or_default());
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_row_includes_unit_column_when_present() {
        let row = ComparisonRow::new("Total wages", 1_395.0, 1_410.0, 0).with_unit("£bn");
        assert_eq!(
            row.cells(),
            vec!["Total wages", "1395", "1410", "£bn", "0.989"]
        );
    }

    #[test]
    fn comparison_row_leaves_ratio_blank_for_zero_reference() {
        let row = ComparisonRow::new("Income tax", 0.35, 0.0, 2);
        assert_eq!(row.cells(), vec!["Income tax", "0.35", "0.00", ""]);
    }

    #[test]
    fn reference_defaults_imply_avg_excess() {
        let figures = ReferenceFigures::default();
        let expected = 14.3e9 / 3_300_000.0;
        assert!((figures.avg_excess() - expected).abs() < 1e-6);
    }
}
