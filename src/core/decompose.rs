use tracing::error;

use crate::core::aggregate::weighted_sum;
use crate::core::engine::{Microsimulation, Variable};
use crate::error::ModelError;

/// Relative tolerance for the decomposition identity check.
pub const IDENTITY_REL_TOLERANCE: f64 = 1e-6;

/// A total revenue change broken into named tax-instrument components,
/// all in £bn.
#[derive(Debug, Clone, Copy)]
pub struct RevenueDecomposition {
    pub income_tax_bn: f64,
    pub employee_nics_bn: f64,
    pub employer_nics_bn: f64,
    /// Annual-allowance charge delta, the statutory pension tax-charge
    /// pathway inside the income-tax change.
    pub aa_charge_bn: f64,
    pub pension_relief_bn: f64,
}

impl RevenueDecomposition {
    pub fn nics_subtotal_bn(&self) -> f64 {
        self.employee_nics_bn + self.employer_nics_bn
    }

    pub fn total_bn(&self) -> f64 {
        self.income_tax_bn + self.nics_subtotal_bn()
    }

    /// Revenue in the income-tax change not explained by the
    /// annual-allowance charge pathway.
    pub fn incomplete_relief_offset_bn(&self) -> f64 {
        self.income_tax_bn - self.aa_charge_bn
    }

    /// The decomposed components must sum to the independently computed
    /// scenario total. A breach indicates a transform or aggregation bug
    /// and is surfaced loudly, never swallowed.
    pub fn verify_identity(&self, independent_total_bn: f64) -> Result<(), ModelError> {
        let components_bn = self.total_bn();
        let tolerance = IDENTITY_REL_TOLERANCE * independent_total_bn.abs().max(1.0);
        if (components_bn - independent_total_bn).abs() > tolerance {
            error!(
                components_bn,
                independent_total_bn, "decomposition identity violated"
            );
            return Err(ModelError::IdentityViolation {
                components_bn,
                total_bn: independent_total_bn,
            });
        }
        Ok(())
    }
}

/// Weighted-sum delta of one variable between two engine states, in £bn.
/// Each state is aggregated with its own weight vector.
pub fn weighted_delta_bn(
    baseline: &dyn Microsimulation,
    reformed: &dyn Microsimulation,
    variable: Variable,
    period: u32,
) -> Result<f64, ModelError> {
    let baseline_values = baseline.calculate(variable, period)?;
    let baseline_weights = baseline.calculate(Variable::PersonWeight, period)?;
    let reformed_values = reformed.calculate(variable, period)?;
    let reformed_weights = reformed.calculate(Variable::PersonWeight, period)?;
    let delta = weighted_sum(&reformed_values, &reformed_weights)
        - weighted_sum(&baseline_values, &baseline_weights);
    Ok(delta / 1e9)
}

/// Break the revenue change between baseline and one reformed state into
/// per-instrument weighted deltas.
pub fn decompose(
    baseline: &dyn Microsimulation,
    reformed: &dyn Microsimulation,
    period: u32,
) -> Result<RevenueDecomposition, ModelError> {
    Ok(RevenueDecomposition {
        income_tax_bn: weighted_delta_bn(baseline, reformed, Variable::IncomeTax, period)?,
        employee_nics_bn: weighted_delta_bn(
            baseline,
            reformed,
            Variable::NationalInsurance,
            period,
        )?,
        employer_nics_bn: weighted_delta_bn(baseline, reformed, Variable::NiEmployer, period)?,
        aa_charge_bn: weighted_delta_bn(
            baseline,
            reformed,
            Variable::PensionContributionsTax,
            period,
        )?,
        pension_relief_bn: weighted_delta_bn(
            baseline,
            reformed,
            Variable::PensionContributionsRelief,
            period,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenario::{ScenarioRunner, aggregate_balance, scenario_presets};
    use crate::core::types::RunConfig;
    use crate::data::PopulationData;

    #[test]
    fn components_sum_to_the_independent_total_for_every_preset() {
        let population = PopulationData::synthetic(1_500, 23);
        let config = RunConfig::default();
        let runner = ScenarioRunner::new(&population, config).expect("baseline");

        for spec in scenario_presets(&config) {
            let reformed = runner.reformed_model(spec.parameters).expect("reformed");
            let decomposition =
                decompose(runner.baseline(), &reformed, config.year).expect("decompose");
            let independent_total_bn = (aggregate_balance(&reformed, config.year).unwrap()
                - runner.baseline_balance())
                / 1e9;
            decomposition
                .verify_identity(independent_total_bn)
                .unwrap_or_else(|e| panic!("{}: {e}", spec.name));
        }
    }

    #[test]
    fn identity_violation_is_reported() {
        let decomposition = RevenueDecomposition {
            income_tax_bn: 1.0,
            employee_nics_bn: 0.5,
            employer_nics_bn: 0.5,
            aa_charge_bn: 0.0,
            pension_relief_bn: 0.0,
        };
        let err = decomposition.verify_identity(3.0).expect_err("must breach");
        assert!(matches!(err, ModelError::IdentityViolation { .. }));
        decomposition.verify_identity(2.0).expect("exact sum passes");
    }

    #[test]
    fn no_reform_decomposes_to_zero() {
        let population = PopulationData::synthetic(300, 9);
        let config = RunConfig {
            cap: 1e12,
            ..RunConfig::default()
        };
        let runner = ScenarioRunner::new(&population, config).expect("baseline");
        let spec = &scenario_presets(&config)[0];
        let reformed = runner.reformed_model(spec.parameters).expect("reformed");
        let decomposition =
            decompose(runner.baseline(), &reformed, config.year).expect("decompose");
        assert!(decomposition.total_bn().abs() < 1e-12);
        assert!(decomposition.aa_charge_bn.abs() < 1e-12);
    }

    #[test]
    fn offset_is_income_tax_minus_charge_pathway() {
        let decomposition = RevenueDecomposition {
            income_tax_bn: 0.8,
            employee_nics_bn: 0.3,
            employer_nics_bn: 2.0,
            aa_charge_bn: 0.25,
            pension_relief_bn: -1.0,
        };
        assert!((decomposition.incomplete_relief_offset_bn() - 0.55).abs() < 1e-12);
        assert!((decomposition.nics_subtotal_bn() - 2.3).abs() < 1e-12);
    }
}
