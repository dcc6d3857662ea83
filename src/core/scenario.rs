use tracing::info;

use crate::core::aggregate::weighted_sum;
use crate::core::engine::{Microsimulation, TaxModel, TaxPolicy, Variable, apply_reform};
use crate::core::types::{PolicyParameters, RunConfig, ScenarioResult, ScenarioSpec};
use crate::data::PopulationData;
use crate::error::ModelError;

/// The named policy-parameter presets: employer cost response (absorb or
/// spread through wages) crossed with the employee response (maintain
/// pension saving or take cash), plus the blended 76% pass-through case.
pub fn scenario_presets(config: &RunConfig) -> Vec<ScenarioSpec> {
    let preset = |name: &str, pass_through_rate: f64, redirect_to_pension: bool| ScenarioSpec {
        name: name.to_string(),
        parameters: PolicyParameters {
            cap: config.cap,
            employer_ni_rate: config.employer_ni_rate,
            pass_through_rate,
            redirect_to_pension,
        },
    };
    vec![
        preset("Absorb cost + Maintain pension", 0.0, true),
        preset("Spread cost + Maintain pension", 1.0, true),
        preset("Absorb cost + Take cash", 0.0, false),
        preset("Spread cost + Take cash", 1.0, false),
        preset("Blended 76% pass-through + Maintain pension", 0.76, true),
    ]
}

/// Weighted aggregate government balance for one engine state.
pub fn aggregate_balance(sim: &dyn Microsimulation, period: u32) -> Result<f64, ModelError> {
    let balance = sim.calculate(Variable::GovBalance, period)?;
    let weights = sim.calculate(Variable::PersonWeight, period)?;
    Ok(weighted_sum(&balance, &weights))
}

/// Apply one scenario's transform to an already-built engine and compute
/// its revenue delta against the baseline balance. Any engine failure is
/// returned with the scenario name attached; the caller must not continue
/// with partial scenario output.
pub fn run_scenario_on(
    sim: &mut dyn Microsimulation,
    spec: &ScenarioSpec,
    period: u32,
    baseline_balance: f64,
) -> Result<ScenarioResult, ModelError> {
    let run = |sim: &mut dyn Microsimulation| -> Result<f64, ModelError> {
        apply_reform(sim, &spec.parameters.into(), period)?;
        aggregate_balance(sim, period)
    };
    let reformed_balance = run(sim).map_err(|e| e.in_scenario(&spec.name))?;
    Ok(ScenarioResult {
        name: spec.name.clone(),
        parameters: spec.parameters,
        revenue_delta_bn: (reformed_balance - baseline_balance) / 1e9,
    })
}

/// Runs the configured scenario set against a shared immutable baseline.
/// Each scenario gets a fresh engine, so runs are independent.
pub struct ScenarioRunner<'a> {
    population: &'a PopulationData,
    config: RunConfig,
    baseline: TaxModel,
    baseline_balance: f64,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(population: &'a PopulationData, config: RunConfig) -> Result<Self, ModelError> {
        let baseline = TaxModel::new(population, config.year, TaxPolicy::default());
        let baseline_balance = aggregate_balance(&baseline, config.year)?;
        info!(
            persons = population.person_count(),
            households = population.household_count(),
            baseline_balance_bn = format_args!("{:.2}", baseline_balance / 1e9),
            "baseline ready"
        );
        Ok(Self {
            population,
            config,
            baseline,
            baseline_balance,
        })
    }

    pub fn baseline(&self) -> &TaxModel {
        &self.baseline
    }

    pub fn baseline_balance(&self) -> f64 {
        self.baseline_balance
    }

    /// Build a fresh engine under one reform variant, ready for
    /// downstream aggregation.
    pub fn reformed_model(&self, parameters: PolicyParameters) -> Result<TaxModel, ModelError> {
        let mut sim = TaxModel::new(self.population, self.config.year, TaxPolicy::default());
        apply_reform(&mut sim, &parameters.into(), self.config.year)?;
        Ok(sim)
    }

    pub fn run(&self, spec: &ScenarioSpec) -> Result<ScenarioResult, ModelError> {
        let mut sim = TaxModel::new(self.population, self.config.year, TaxPolicy::default());
        let result = run_scenario_on(&mut sim, spec, self.config.year, self.baseline_balance)?;
        info!(
            scenario = %result.name,
            revenue_bn = format_args!("{:.2}", result.revenue_delta_bn),
            "scenario complete"
        );
        Ok(result)
    }

    pub fn run_all(&self, specs: &[ScenarioSpec]) -> Result<Vec<ScenarioResult>, ModelError> {
        specs.iter().map(|spec| self.run(spec)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSim;

    impl Microsimulation for FailingSim {
        fn calculate(&self, _variable: Variable, _period: u32) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::Simulation("engine exploded".to_string()))
        }

        fn set_input(
            &mut self,
            _variable: Variable,
            _period: u32,
            _values: Vec<f64>,
        ) -> Result<(), ModelError> {
            Err(ModelError::Simulation("engine exploded".to_string()))
        }
    }

    fn config() -> RunConfig {
        RunConfig::default()
    }

    #[test]
    fn presets_cover_the_five_variants() {
        let presets = scenario_presets(&config());
        assert_eq!(presets.len(), 5);
        assert_eq!(presets[0].name, "Absorb cost + Maintain pension");
        assert_eq!(presets[0].parameters.pass_through_rate, 0.0);
        assert!(presets[0].parameters.redirect_to_pension);
        assert_eq!(presets[3].parameters.pass_through_rate, 1.0);
        assert!(!presets[3].parameters.redirect_to_pension);
        assert_eq!(presets[4].parameters.pass_through_rate, 0.76);
        for preset in &presets {
            assert_eq!(preset.parameters.cap, 2_000.0);
            assert_eq!(preset.parameters.employer_ni_rate, 0.15);
        }
    }

    #[test]
    fn failures_carry_the_scenario_name() {
        let spec = &scenario_presets(&config())[0];
        let mut sim = FailingSim;
        let err = run_scenario_on(&mut sim, spec, 2029, 0.0).expect_err("must fail");
        match err {
            ModelError::Scenario { name, .. } => {
                assert_eq!(name, "Absorb cost + Maintain pension");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn capped_population_raises_revenue() {
        let population = PopulationData::synthetic(1_000, 11);
        let runner = ScenarioRunner::new(&population, config()).expect("baseline");
        let results = runner
            .run_all(&scenario_presets(&config()))
            .expect("all scenarios");
        assert_eq!(results.len(), 5);
        // Taking cash with no pass-through moves the excess straight into
        // taxable pay, so revenue cannot fall.
        let take_cash = results
            .iter()
            .find(|r| r.name == "Absorb cost + Take cash")
            .expect("present");
        assert!(take_cash.revenue_delta_bn >= 0.0);
    }

    #[test]
    fn cap_above_all_sacrifice_is_revenue_neutral() {
        let population = PopulationData::synthetic(500, 3);
        let mut cfg = config();
        cfg.cap = 1e9;
        let runner = ScenarioRunner::new(&population, cfg).expect("baseline");
        for result in runner
            .run_all(&scenario_presets(&cfg))
            .expect("all scenarios")
        {
            assert!(
                result.revenue_delta_bn.abs() < 1e-9,
                "{} moved revenue by {}bn with everyone below the cap",
                result.name,
                result.revenue_delta_bn
            );
        }
    }

    #[test]
    fn scenarios_share_an_untouched_baseline() {
        let population = PopulationData::synthetic(400, 5);
        let runner = ScenarioRunner::new(&population, config()).expect("baseline");
        let before = runner
            .baseline()
            .calculate(Variable::EmploymentIncome, 2029)
            .expect("baseline incomes");
        let _ = runner.run_all(&scenario_presets(&config())).expect("runs");
        let after = runner
            .baseline()
            .calculate(Variable::EmploymentIncome, 2029)
            .expect("baseline incomes");
        assert_eq!(before, after);
    }
}
