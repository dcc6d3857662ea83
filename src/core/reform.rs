use super::types::PolicyParameters;

/// Arrays produced by applying the cap reform. Same length and person
/// ordering as the inputs.
#[derive(Debug, Clone)]
pub struct ReformedArrays {
    pub employment_income: Vec<f64>,
    pub employee_pension_contributions: Vec<f64>,
    pub salary_sacrifice: Vec<f64>,
}

/// The cap reform: sacrifice above `cap` loses its tax-advantaged status
/// and becomes ordinary taxable pay.
#[derive(Debug, Clone, Copy)]
pub struct CapReform {
    pub cap: f64,
    pub employer_ni_rate: f64,
    pub pass_through_rate: f64,
    pub redirect_to_pension: bool,
}

impl From<PolicyParameters> for CapReform {
    fn from(params: PolicyParameters) -> Self {
        Self {
            cap: params.cap,
            employer_ni_rate: params.employer_ni_rate,
            pass_through_rate: params.pass_through_rate,
            redirect_to_pension: params.redirect_to_pension,
        }
    }
}

impl CapReform {
    /// Per-person sacrifice above the cap.
    pub fn excess(&self, salary_sacrifice: &[f64]) -> Vec<f64> {
        salary_sacrifice
            .iter()
            .map(|&ss| (ss - self.cap).max(0.0))
            .collect()
    }

    /// Apply the reform to a population. Pure: inputs are never mutated.
    ///
    /// The excess becomes cash pay (or, with redirection, an ordinary
    /// employee pension contribution alongside cash pay for tax purposes),
    /// and the remaining sacrifice is truncated at the cap. When the
    /// employer passes part of its increased social-insurance cost back to
    /// wages, the recovery is applied as a single population-wide haircut
    /// rate on employment income, not as person-level incidence. This is a
    /// deliberate simplification inherited from the published methodology.
    pub fn apply(
        &self,
        salary_sacrifice: &[f64],
        employment_income: &[f64],
        employee_pension_contributions: &[f64],
    ) -> ReformedArrays {
        assert_eq!(salary_sacrifice.len(), employment_income.len());
        assert_eq!(salary_sacrifice.len(), employee_pension_contributions.len());

        let excess = self.excess(salary_sacrifice);

        let total_income: f64 = employment_income.iter().sum();
        let haircut_rate = if self.pass_through_rate > 0.0 && total_income > 0.0 {
            let total_ni_increase: f64 = excess.iter().map(|e| e * self.employer_ni_rate).sum();
            total_ni_increase * self.pass_through_rate / total_income
        } else {
            0.0
        };

        let new_employment_income: Vec<f64> = employment_income
            .iter()
            .zip(&excess)
            .map(|(&income, &e)| income * (1.0 - haircut_rate) + e)
            .collect();

        let new_pension_contributions: Vec<f64> = if self.redirect_to_pension {
            employee_pension_contributions
                .iter()
                .zip(&excess)
                .map(|(&pens, &e)| pens + e)
                .collect()
        } else {
            employee_pension_contributions.to_vec()
        };

        let new_salary_sacrifice: Vec<f64> = salary_sacrifice
            .iter()
            .map(|&ss| ss.min(self.cap))
            .collect();

        ReformedArrays {
            employment_income: new_employment_income,
            employee_pension_contributions: new_pension_contributions,
            salary_sacrifice: new_salary_sacrifice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn reform(pass_through_rate: f64, redirect_to_pension: bool) -> CapReform {
        CapReform {
            cap: 2_000.0,
            employer_ni_rate: 0.15,
            pass_through_rate,
            redirect_to_pension,
        }
    }

    #[test]
    fn absorbed_cost_turns_excess_into_cash_pay() {
        let out = reform(0.0, true).apply(&[5_000.0], &[30_000.0], &[1_000.0]);
        assert_approx(out.employment_income[0], 33_000.0);
        assert_approx(out.salary_sacrifice[0], 2_000.0);
        assert_approx(out.employee_pension_contributions[0], 4_000.0);
    }

    #[test]
    fn full_pass_through_applies_population_wide_haircut() {
        // haircut = 3000 * 0.15 * 1.0 / 30000 = 0.015
        let out = reform(1.0, true).apply(&[5_000.0], &[30_000.0], &[0.0]);
        assert_approx(out.employment_income[0], 30_000.0 * 0.985 + 3_000.0);
    }

    #[test]
    fn take_cash_leaves_pension_contributions_unchanged() {
        let out = reform(0.0, false).apply(&[5_000.0], &[30_000.0], &[1_500.0]);
        assert_approx(out.employee_pension_contributions[0], 1_500.0);
    }

    #[test]
    fn below_cap_population_is_untouched() {
        let ss = [500.0, 1_999.99, 0.0];
        let emp = [20_000.0, 45_000.0, 0.0];
        let pens = [300.0, 0.0, 0.0];
        let out = reform(1.0, true).apply(&ss, &emp, &pens);
        for i in 0..ss.len() {
            assert_approx(out.salary_sacrifice[i], ss[i]);
            assert_approx(out.employment_income[i], emp[i]);
            assert_approx(out.employee_pension_contributions[i], pens[i]);
        }
    }

    #[test]
    fn zero_income_population_skips_pass_through() {
        let out = reform(1.0, false).apply(&[3_000.0], &[0.0], &[0.0]);
        assert_approx(out.employment_income[0], 1_000.0);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let ss = vec![4_000.0, 100.0];
        let emp = vec![50_000.0, 10_000.0];
        let pens = vec![0.0, 0.0];
        let _ = reform(0.76, true).apply(&ss, &emp, &pens);
        assert_eq!(ss, vec![4_000.0, 100.0]);
        assert_eq!(emp, vec![50_000.0, 10_000.0]);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn sacrifice_never_exceeds_cap(
            ss in proptest::collection::vec(0.0f64..50_000.0, 1..40),
            pass_through in 0.0f64..=1.0,
            redirect in proptest::bool::ANY,
        ) {
            let emp: Vec<f64> = ss.iter().map(|v| v + 10_000.0).collect();
            let pens = vec![0.0; ss.len()];
            let r = reform(pass_through, redirect);
            let out = r.apply(&ss, &emp, &pens);
            for (i, &new_ss) in out.salary_sacrifice.iter().enumerate() {
                prop_assert!(new_ss <= r.cap + 1e-9);
                prop_assert!((new_ss - ss[i].min(r.cap)).abs() <= 1e-9);
            }
        }

        #[test]
        fn zero_pass_through_adds_exactly_the_excess(
            ss in proptest::collection::vec(0.0f64..50_000.0, 1..40),
        ) {
            let emp: Vec<f64> = ss.iter().map(|v| v * 3.0 + 1_000.0).collect();
            let pens = vec![0.0; ss.len()];
            let r = reform(0.0, false);
            let out = r.apply(&ss, &emp, &pens);
            let excess = r.excess(&ss);
            for i in 0..ss.len() {
                prop_assert!((out.employment_income[i] - (emp[i] + excess[i])).abs() <= 1e-9);
            }
        }
    }
}
