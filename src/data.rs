//! Population inputs: loading survey-style microdata from JSON and
//! generating a seeded synthetic population for demos and tests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Per-person columns, indexed by a shared person ordinal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persons {
    pub employment_income: Vec<f64>,
    pub salary_sacrifice: Vec<f64>,
    pub employee_pension_contributions: Vec<f64>,
    /// Survey representativeness weight, one per person, non-negative.
    pub weight: Vec<f64>,
    /// Index into the household columns.
    pub household_index: Vec<usize>,
}

/// Per-household columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Households {
    pub weight: Vec<f64>,
    pub count_people: Vec<f64>,
}

/// The immutable baseline microdata every scenario starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationData {
    pub persons: Persons,
    pub households: Households,
}

impl PopulationData {
    pub fn person_count(&self) -> usize {
        self.persons.employment_income.len()
    }

    pub fn household_count(&self) -> usize {
        self.households.weight.len()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ModelError::MissingInputData(format!("population file {}: {e}", path.display()))
        })?;
        let population: PopulationData =
            serde_json::from_str(&raw).map_err(|e| ModelError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        population.validate()?;
        Ok(population)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.person_count();
        for (name, len) in [
            ("salary_sacrifice", self.persons.salary_sacrifice.len()),
            (
                "employee_pension_contributions",
                self.persons.employee_pension_contributions.len(),
            ),
            ("person_weight", self.persons.weight.len()),
            ("household_index", self.persons.household_index.len()),
        ] {
            if len != n {
                return Err(ModelError::LengthMismatch {
                    variable: name.to_string(),
                    expected: n,
                    actual: len,
                });
            }
        }
        if self.households.count_people.len() != self.household_count() {
            return Err(ModelError::LengthMismatch {
                variable: "household_count_people".to_string(),
                expected: self.household_count(),
                actual: self.households.count_people.len(),
            });
        }
        if let Some(&bad) = self
            .persons
            .household_index
            .iter()
            .find(|&&h| h >= self.household_count())
        {
            return Err(ModelError::Simulation(format!(
                "household index {bad} out of range for {} households",
                self.household_count()
            )));
        }
        if self.persons.weight.iter().any(|&w| w < 0.0)
            || self.households.weight.iter().any(|&w| w < 0.0)
        {
            return Err(ModelError::Simulation(
                "survey weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Seeded synthetic population: log-normal-ish earnings, a salary
    /// sacrifice arrangement for roughly a quarter of workers, households
    /// of one or two adults. Deterministic for a given seed.
    pub fn synthetic(person_count: usize, seed: u64) -> Self {
        let mut rng = Rng::new(splitmix64(seed));

        let mut persons = Persons {
            employment_income: Vec::with_capacity(person_count),
            salary_sacrifice: Vec::with_capacity(person_count),
            employee_pension_contributions: Vec::with_capacity(person_count),
            weight: Vec::with_capacity(person_count),
            household_index: Vec::with_capacity(person_count),
        };
        let mut households = Households {
            weight: Vec::new(),
            count_people: Vec::new(),
        };

        let mut i = 0;
        while i < person_count {
            let household = households.weight.len();
            let household_weight = 20.0 + rng.next_f64() * 20.0;
            let members = if rng.next_f64() < 0.55 && i + 1 < person_count {
                2
            } else {
                1
            };
            // Some households also carry non-working dependants.
            let dependants = if rng.next_f64() < 0.4 { 1.0 } else { 0.0 };
            households.weight.push(household_weight);
            households.count_people.push(members as f64 + dependants);

            for _ in 0..members {
                let income = if rng.next_f64() < 0.12 {
                    0.0
                } else {
                    (28_000.0 * (0.55 * rng.standard_normal()).exp()).min(400_000.0)
                };
                let sacrifices = income > 15_000.0 && rng.next_f64() < 0.25;
                let salary_sacrifice = if sacrifices {
                    (income * (0.03 + 0.07 * rng.next_f64())).min(30_000.0)
                } else {
                    0.0
                };
                let pension = if income > 10_000.0 && rng.next_f64() < 0.5 {
                    income * 0.04
                } else {
                    0.0
                };
                persons.employment_income.push(income);
                persons.salary_sacrifice.push(salary_sacrifice);
                persons.employee_pension_contributions.push(pension);
                persons.weight.push(household_weight);
                persons.household_index.push(household);
                i += 1;
            }
        }

        let population = PopulationData {
            persons,
            households,
        };
        debug_assert!(population.validate().is_ok());
        population
    }
}

#[cfg(test)]
impl PopulationData {
    pub fn single_person_for_tests(
        employment_income: f64,
        salary_sacrifice: f64,
        employee_pension_contributions: f64,
    ) -> Self {
        PopulationData {
            persons: Persons {
                employment_income: vec![employment_income],
                salary_sacrifice: vec![salary_sacrifice],
                employee_pension_contributions: vec![employee_pension_contributions],
                weight: vec![1.0],
                household_index: vec![0],
            },
            households: Households {
                weight: vec![1.0],
                count_people: vec![1.0],
            },
        }
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0xA5A5_A5A5_A5A5_A5A5 } else { seed };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}
