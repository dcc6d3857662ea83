use crate::core::reform::CapReform;
use crate::data::PopulationData;
use crate::error::ModelError;

/// Variables the simulation engine can calculate. Person-level variables
/// return one value per person, household-level variables one value per
/// household, both in a fixed ordinal order shared by baseline and
/// reformed states.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Variable {
    SalarySacrifice,
    EmploymentIncome,
    EmployeePensionContributions,
    AdjustedNetIncome,
    IncomeTax,
    NationalInsurance,
    NiEmployer,
    PensionContributionsTax,
    PensionContributionsRelief,
    PersonWeight,
    /// Per-person government receipts (income tax + both NICs). The
    /// weighted sum over the population is the aggregate balance a
    /// scenario's revenue delta is taken from.
    GovBalance,
    HouseholdNetIncome,
    HouseholdIncomeDecile,
    HouseholdWeight,
    HouseholdCountPeople,
}

impl Variable {
    pub fn name(self) -> &'static str {
        match self {
            Variable::SalarySacrifice => "salary_sacrifice",
            Variable::EmploymentIncome => "employment_income",
            Variable::EmployeePensionContributions => "employee_pension_contributions",
            Variable::AdjustedNetIncome => "adjusted_net_income",
            Variable::IncomeTax => "income_tax",
            Variable::NationalInsurance => "national_insurance",
            Variable::NiEmployer => "ni_employer",
            Variable::PensionContributionsTax => "pension_contributions_tax",
            Variable::PensionContributionsRelief => "pension_contributions_relief",
            Variable::PersonWeight => "person_weight",
            Variable::GovBalance => "gov_balance",
            Variable::HouseholdNetIncome => "household_net_income",
            Variable::HouseholdIncomeDecile => "household_income_decile",
            Variable::HouseholdWeight => "household_weight",
            Variable::HouseholdCountPeople => "household_count_people",
        }
    }
}

/// Seam to the external microsimulation engine. The reform logic never
/// touches an engine directly; it reads inputs, transforms them as plain
/// arrays, and writes them back through this trait before recomputation.
pub trait Microsimulation {
    fn calculate(&self, variable: Variable, period: u32) -> Result<Vec<f64>, ModelError>;

    fn set_input(
        &mut self,
        variable: Variable,
        period: u32,
        values: Vec<f64>,
    ) -> Result<(), ModelError>;
}

/// Read the reform's input triple, run the pure transform, write the
/// mutated triple back. Derived variables recompute on the next
/// `calculate`.
pub fn apply_reform(
    sim: &mut dyn Microsimulation,
    reform: &CapReform,
    period: u32,
) -> Result<(), ModelError> {
    let ss = sim.calculate(Variable::SalarySacrifice, period)?;
    let employment_income = sim.calculate(Variable::EmploymentIncome, period)?;
    let pension_contributions = sim.calculate(Variable::EmployeePensionContributions, period)?;

    let reformed = reform.apply(&ss, &employment_income, &pension_contributions);

    sim.set_input(Variable::EmploymentIncome, period, reformed.employment_income)?;
    sim.set_input(
        Variable::EmployeePensionContributions,
        period,
        reformed.employee_pension_contributions,
    )?;
    sim.set_input(Variable::SalarySacrifice, period, reformed.salary_sacrifice)?;
    Ok(())
}

/// Tax-system parameters for the target year.
#[derive(Debug, Clone, Copy)]
pub struct TaxPolicy {
    pub personal_allowance: f64,
    pub basic_rate_limit: f64,
    pub higher_rate_limit: f64,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
    pub allowance_taper_start: f64,
    pub allowance_taper_end: f64,
    pub ni_primary_threshold: f64,
    pub ni_upper_limit: f64,
    pub ni_basic_rate: f64,
    pub ni_higher_rate: f64,
    pub ni_secondary_threshold: f64,
    pub ni_employer_rate: f64,
    pub annual_allowance: f64,
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            personal_allowance: 12_570.0,
            basic_rate_limit: 50_270.0,
            higher_rate_limit: 125_140.0,
            basic_rate: 0.20,
            higher_rate: 0.40,
            additional_rate: 0.45,
            allowance_taper_start: 100_000.0,
            allowance_taper_end: 125_140.0,
            ni_primary_threshold: 12_570.0,
            ni_upper_limit: 50_270.0,
            ni_basic_rate: 0.08,
            ni_higher_rate: 0.02,
            ni_secondary_threshold: 5_000.0,
            ni_employer_rate: 0.15,
            annual_allowance: 60_000.0,
        }
    }
}

/// Deterministic, simplified tax engine behind the [`Microsimulation`]
/// seam. It models the pieces of the system the cap reform moves money
/// through: banded income tax with the tapered personal allowance,
/// employee and employer NICs, pension relief, and the annual-allowance
/// charge. A production microsimulation can replace it without touching
/// the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct TaxModel {
    year: u32,
    policy: TaxPolicy,
    salary_sacrifice: Vec<f64>,
    employment_income: Vec<f64>,
    employee_pension_contributions: Vec<f64>,
    person_weight: Vec<f64>,
    household_index: Vec<usize>,
    household_weight: Vec<f64>,
    household_count_people: Vec<f64>,
}

impl TaxModel {
    pub fn new(population: &PopulationData, year: u32, policy: TaxPolicy) -> Self {
        Self {
            year,
            policy,
            salary_sacrifice: population.persons.salary_sacrifice.clone(),
            employment_income: population.persons.employment_income.clone(),
            employee_pension_contributions: population
                .persons
                .employee_pension_contributions
                .clone(),
            person_weight: population.persons.weight.clone(),
            household_index: population.persons.household_index.clone(),
            household_weight: population.households.weight.clone(),
            household_count_people: population.households.count_people.clone(),
        }
    }

    pub fn person_count(&self) -> usize {
        self.employment_income.len()
    }

    pub fn household_count(&self) -> usize {
        self.household_weight.len()
    }

    /// Banded income tax with the 50% personal-allowance taper between
    /// the taper start and end.
    fn banded_income_tax(&self, gross_income: f64) -> f64 {
        let p = &self.policy;
        let gross = gross_income.max(0.0);

        let mut allowance = p.personal_allowance.max(0.0);
        if gross > p.allowance_taper_start {
            let reduction = (gross - p.allowance_taper_start) / 2.0;
            allowance = (allowance - reduction).max(0.0);
        }
        if gross >= p.allowance_taper_end {
            allowance = 0.0;
        }

        let taxable_income = (gross - allowance).max(0.0);

        let basic_band_width = (p.basic_rate_limit - allowance).max(0.0);
        let higher_band_width = (p.higher_rate_limit - p.basic_rate_limit).max(0.0);

        let basic_taxable = taxable_income.min(basic_band_width);
        let higher_taxable = (taxable_income - basic_taxable)
            .min(higher_band_width)
            .max(0.0);
        let additional_taxable = (taxable_income - basic_taxable - higher_taxable).max(0.0);

        basic_taxable * p.basic_rate
            + higher_taxable * p.higher_rate
            + additional_taxable * p.additional_rate
    }

    fn employee_ni(&self, employment_income: f64) -> f64 {
        let p = &self.policy;
        let income = employment_income.max(0.0);
        let basic = (income.min(p.ni_upper_limit) - p.ni_primary_threshold).max(0.0);
        let upper = (income - p.ni_upper_limit).max(0.0);
        basic * p.ni_basic_rate + upper * p.ni_higher_rate
    }

    fn employer_ni(&self, employment_income: f64) -> f64 {
        let income = employment_income.max(0.0);
        (income - self.policy.ni_secondary_threshold).max(0.0) * self.policy.ni_employer_rate
    }

    fn adjusted_net_income(&self, i: usize) -> f64 {
        (self.employment_income[i] - self.employee_pension_contributions[i]).max(0.0)
    }

    /// Annual-allowance charge: contributions above the allowance are
    /// taxed at the person's marginal band rates by stacking the excess on
    /// top of adjusted income.
    fn aa_charge(&self, i: usize) -> f64 {
        let total_contributions =
            self.salary_sacrifice[i] + self.employee_pension_contributions[i];
        let aa_excess = (total_contributions - self.policy.annual_allowance).max(0.0);
        if aa_excess <= 0.0 {
            return 0.0;
        }
        let adjusted = self.adjusted_net_income(i);
        self.banded_income_tax(adjusted + aa_excess) - self.banded_income_tax(adjusted)
    }

    fn income_tax(&self, i: usize) -> f64 {
        self.banded_income_tax(self.adjusted_net_income(i)) + self.aa_charge(i)
    }

    /// Income tax avoided through pension saving: tax on the person's pay
    /// had nothing been sacrificed or contributed, minus tax actually due
    /// on adjusted income.
    fn pension_relief(&self, i: usize) -> f64 {
        let unrelieved = self.employment_income[i] + self.salary_sacrifice[i];
        (self.banded_income_tax(unrelieved) - self.banded_income_tax(self.adjusted_net_income(i)))
            .max(0.0)
    }

    fn person_array(&self, f: impl Fn(usize) -> f64) -> Vec<f64> {
        (0..self.person_count()).map(f).collect()
    }

    /// Sum a person-level array into household totals.
    fn household_sum(&self, person_values: &[f64]) -> Vec<f64> {
        let mut totals = vec![0.0; self.household_count()];
        for (i, &value) in person_values.iter().enumerate() {
            totals[self.household_index[i]] += value;
        }
        totals
    }

    fn household_net_income(&self) -> Vec<f64> {
        let person_net = self.person_array(|i| {
            self.employment_income[i] - self.income_tax(i) - self.employee_ni(self.employment_income[i])
        });
        self.household_sum(&person_net)
    }

    /// Weighted decile assignment (1..=10) by household net income:
    /// households are ranked by income and binned into ten equal-weight
    /// groups.
    fn household_income_decile(&self) -> Vec<f64> {
        let income = self.household_net_income();
        let n = income.len();
        let total: f64 = self.household_weight.iter().sum();
        let mut decile = vec![0.0; n];
        if total <= 0.0 {
            return decile;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| income[a].total_cmp(&income[b]));

        let mut cumulative = 0.0;
        for &idx in &order {
            cumulative += self.household_weight[idx];
            decile[idx] = (cumulative / total * 10.0).ceil().clamp(1.0, 10.0);
        }
        decile
    }

    fn check_period(&self, period: u32) -> Result<(), ModelError> {
        if period == self.year {
            Ok(())
        } else {
            Err(ModelError::UnknownPeriod {
                requested: period,
                configured: self.year,
            })
        }
    }
}

impl Microsimulation for TaxModel {
    fn calculate(&self, variable: Variable, period: u32) -> Result<Vec<f64>, ModelError> {
        self.check_period(period)?;
        let values = match variable {
            Variable::SalarySacrifice => self.salary_sacrifice.clone(),
            Variable::EmploymentIncome => self.employment_income.clone(),
            Variable::EmployeePensionContributions => {
                self.employee_pension_contributions.clone()
            }
            Variable::AdjustedNetIncome => self.person_array(|i| self.adjusted_net_income(i)),
            Variable::IncomeTax => self.person_array(|i| self.income_tax(i)),
            Variable::NationalInsurance => {
                self.person_array(|i| self.employee_ni(self.employment_income[i]))
            }
            Variable::NiEmployer => {
                self.person_array(|i| self.employer_ni(self.employment_income[i]))
            }
            Variable::PensionContributionsTax => self.person_array(|i| self.aa_charge(i)),
            Variable::PensionContributionsRelief => self.person_array(|i| self.pension_relief(i)),
            Variable::PersonWeight => self.person_weight.clone(),
            Variable::GovBalance => self.person_array(|i| {
                self.income_tax(i)
                    + self.employee_ni(self.employment_income[i])
                    + self.employer_ni(self.employment_income[i])
            }),
            Variable::HouseholdNetIncome => self.household_net_income(),
            Variable::HouseholdIncomeDecile => self.household_income_decile(),
            Variable::HouseholdWeight => self.household_weight.clone(),
            Variable::HouseholdCountPeople => self.household_count_people.clone(),
        };
        Ok(values)
    }

    fn set_input(
        &mut self,
        variable: Variable,
        period: u32,
        values: Vec<f64>,
    ) -> Result<(), ModelError> {
        self.check_period(period)?;
        if values.len() != self.person_count() {
            return Err(ModelError::LengthMismatch {
                variable: variable.name().to_string(),
                expected: self.person_count(),
                actual: values.len(),
            });
        }
        let slot = match variable {
            Variable::SalarySacrifice => &mut self.salary_sacrifice,
            Variable::EmploymentIncome => &mut self.employment_income,
            Variable::EmployeePensionContributions => &mut self.employee_pension_contributions,
            _ => {
                return Err(ModelError::NotAnInput {
                    variable: variable.name().to_string(),
                });
            }
        };
        *slot = values;
        Ok(())
    }
}
