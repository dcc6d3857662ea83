//! Pipeline orchestration: run the baseline and scenario set, then derive
//! every output table from the paired person arrays.

use std::path::Path;

use tracing::{info, warn};

use crate::core::aggregate::{weighted_count, weighted_mean, weighted_sum};
use crate::core::decompose::decompose;
use crate::core::distribution::{
    CHANGE_THRESHOLD_PCT, GeoData, decile_impacts, geo_impacts, winners_losers,
};
use crate::core::engine::{Microsimulation, Variable};
use crate::core::scenario::{ScenarioRunner, scenario_presets};
use crate::core::types::{ComparisonRow, ReferenceFigures, RunConfig, ScenarioResult};
use crate::data::PopulationData;
use crate::error::ModelError;
use crate::output::Table;

fn fmt(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

fn comparison_table(name: &str, rows: &[ComparisonRow]) -> Table {
    let with_unit = rows.iter().any(|r| r.unit.is_some());
    let headers: &[&str] = if with_unit {
        &["metric", "model", "reference", "unit", "ratio"]
    } else {
        &["metric", "model", "reference", "ratio"]
    };
    Table::new(name, headers, rows.iter().map(ComparisonRow::cells).collect())
}

/// Load geographic inputs, degrading to `None` with a warning when they
/// are absent or malformed so the rest of the report still runs.
pub fn load_geo_or_skip(
    weights_path: &Path,
    metadata_path: &Path,
    weights_year: u32,
) -> Option<GeoData> {
    match GeoData::load(weights_path, metadata_path, weights_year) {
        Ok(geo) => Some(geo),
        Err(e) => {
            warn!("constituency table skipped: {e}");
            None
        }
    }
}

/// Run the full pipeline and produce every output table.
pub fn build_report(
    population: &PopulationData,
    config: RunConfig,
    reference: &ReferenceFigures,
    geo: Option<&GeoData>,
) -> Result<Vec<Table>, ModelError> {
    let runner = ScenarioRunner::new(population, config)?;
    let baseline = runner.baseline();
    let year = config.year;

    // Baseline person arrays every comparison table draws from.
    let ss = baseline.calculate(Variable::SalarySacrifice, year)?;
    let employment_income = baseline.calculate(Variable::EmploymentIncome, year)?;
    let weights = baseline.calculate(Variable::PersonWeight, year)?;
    let adjusted_income = baseline.calculate(Variable::AdjustedNetIncome, year)?;

    let has_ss: Vec<bool> = ss.iter().map(|&s| s > 0.0).collect();
    let above_cap: Vec<bool> = ss.iter().map(|&s| s > config.cap).collect();
    let has_employment: Vec<bool> = employment_income.iter().map(|&e| e > 0.0).collect();
    let excess: Vec<f64> = ss.iter().map(|&s| (s - config.cap).max(0.0)).collect();

    let total_ss_users = weighted_count(&weights, &has_ss);
    let workers_above_cap = weighted_count(&weights, &above_cap);
    let workers_below_cap = total_ss_users - workers_above_cap;
    let total_workers = weighted_count(&weights, &has_employment);
    let total_wages = weighted_sum(&employment_income, &weights);
    let total_excess = weighted_sum(&excess, &weights);
    let avg_excess = weighted_mean(&excess, &weights, &above_cap);

    let mut tables = Vec::new();

    // Tax base.
    let mechanical_er_bn = total_excess * reference.ss_er_nics_rate / 1e9;
    let mechanical_ee_bn = total_excess * reference.ss_ee_nics_rate / 1e9;
    let mut tax_base_rows = vec![
        ComparisonRow::new(
            "SS tax base above cap",
            total_excess / 1e9,
            reference.ss_tax_base_bn,
            2,
        )
        .with_unit("£bn"),
        ComparisonRow::new(
            "Workers above cap",
            workers_above_cap,
            reference.affected_above_cap,
            0,
        )
        .with_unit("count"),
    ];
    if let Some(avg_excess) = avg_excess {
        tax_base_rows.push(
            ComparisonRow::new("Avg excess per worker", avg_excess, reference.avg_excess(), 0)
                .with_unit("£"),
        );
    } else {
        warn!("no workers above the cap; average-excess row omitted");
    }
    tax_base_rows.extend([
        ComparisonRow::new(
            "Mechanical ER NICs",
            mechanical_er_bn,
            reference.ss_tax_base_bn * reference.ss_er_nics_rate,
            2,
        )
        .with_unit("£bn"),
        ComparisonRow::new(
            "Mechanical EE NICs",
            mechanical_ee_bn,
            reference.ss_tax_base_bn * reference.ss_ee_nics_rate,
            2,
        )
        .with_unit("£bn"),
        ComparisonRow::new(
            "Mechanical total NICs",
            mechanical_er_bn + mechanical_ee_bn,
            reference.ss_static_bn,
            2,
        )
        .with_unit("£bn"),
    ]);
    tables.push(comparison_table("tax_base", &tax_base_rows));

    // Population counts.
    tables.push(comparison_table(
        "population",
        &[
            ComparisonRow::new("Total SS contributors", total_ss_users, reference.total_ss_users, 0),
            ComparisonRow::new(
                "Workers above cap",
                workers_above_cap,
                reference.affected_above_cap,
                0,
            ),
            ComparisonRow::new(
                "Workers below cap",
                workers_below_cap,
                reference.protected_below_cap,
                0,
            ),
            ComparisonRow::new("Total employed", total_workers, reference.employment_m * 1e6, 0),
        ],
    ));

    // Wages and employment.
    tables.push(comparison_table(
        "wages_employment",
        &[
            ComparisonRow::new(
                "Total wages and salaries",
                total_wages / 1e9,
                reference.wages_bn,
                0,
            )
            .with_unit("£bn"),
            ComparisonRow::new("Employment", total_workers / 1e6, reference.employment_m, 1)
                .with_unit("millions"),
        ],
    ));

    // Employee NICs rates among affected workers.
    if let Some(table) = nics_rates_table(
        &adjusted_income,
        &weights,
        &above_cap,
        reference,
    ) {
        tables.push(table);
    }

    // Scenario revenue deltas.
    let presets = scenario_presets(&config);
    let results = runner.run_all(&presets)?;
    tables.push(scenarios_table(&results));

    // Decomposition uses the absorb-cost, maintain-pension variant.
    let central = &results[0];
    let reformed = runner.reformed_model(central.parameters)?;
    let decomposition = decompose(baseline, &reformed, year)?;
    decomposition.verify_identity(central.revenue_delta_bn)?;

    tables.push(Table::new(
        "revenue_decomposition",
        &["component", "model_change_bn", "reference_bn"],
        vec![
            vec!["Income tax".to_string(), fmt(decomposition.income_tax_bn, 2), "0.00".to_string()],
            vec![
                "Employee NICs".to_string(),
                fmt(decomposition.employee_nics_bn, 2),
                fmt(reference.ss_tax_base_bn * reference.ss_ee_nics_rate, 2),
            ],
            vec![
                "Employer NICs".to_string(),
                fmt(decomposition.employer_nics_bn, 2),
                fmt(reference.ss_tax_base_bn * reference.ss_er_nics_rate, 2),
            ],
            vec![
                "NICs subtotal".to_string(),
                fmt(decomposition.nics_subtotal_bn(), 2),
                fmt(reference.ss_static_bn, 2),
            ],
            vec![
                "Total".to_string(),
                fmt(central.revenue_delta_bn, 2),
                fmt(reference.ss_static_bn, 2),
            ],
        ],
    ));

    // Income-tax leakage.
    tables.push(Table::new(
        "it_leakage",
        &["component", "change_bn"],
        vec![
            vec!["AA tax charge increase".to_string(), fmt(decomposition.aa_charge_bn, 2)],
            vec![
                "Incomplete relief offset".to_string(),
                fmt(decomposition.incomplete_relief_offset_bn(), 2),
            ],
            vec!["Total IT change".to_string(), fmt(decomposition.income_tax_bn, 2)],
            vec![
                "Pension relief change".to_string(),
                fmt(decomposition.pension_relief_bn, 2),
            ],
            vec!["Employment income change".to_string(), fmt(total_excess / 1e9, 2)],
            vec![
                "Relief shortfall".to_string(),
                fmt(total_excess / 1e9 - decomposition.pension_relief_bn, 2),
            ],
        ],
    ));

    // Behavioural adjustments are reference input, not modeled; the table
    // records which channels the static model covers.
    tables.push(behavioural_table(reference));

    // Distributional impact by household income decile.
    let baseline_hh_income = baseline.calculate(Variable::HouseholdNetIncome, year)?;
    let reformed_hh_income = reformed.calculate(Variable::HouseholdNetIncome, year)?;
    let hh_decile = baseline.calculate(Variable::HouseholdIncomeDecile, year)?;
    let hh_weight = baseline.calculate(Variable::HouseholdWeight, year)?;
    let hh_count_people = baseline.calculate(Variable::HouseholdCountPeople, year)?;

    tables.push(Table::new(
        "distributional",
        &["decile", "avg_baseline", "avg_reformed", "avg_change", "pct_change"],
        decile_impacts(&baseline_hh_income, &reformed_hh_income, &hh_decile, &hh_weight)
            .iter()
            .map(|row| {
                vec![
                    row.decile.to_string(),
                    fmt(row.avg_baseline, 0),
                    fmt(row.avg_reformed, 0),
                    fmt(row.avg_change(), 0),
                    fmt(row.pct_change(), 2),
                ]
            })
            .collect(),
    ));

    tables.push(Table::new(
        "winners_losers",
        &["decile", "pct_losers", "pct_winners", "pct_no_change"],
        winners_losers(
            &baseline_hh_income,
            &reformed_hh_income,
            &hh_decile,
            &hh_weight,
            &hh_count_people,
            CHANGE_THRESHOLD_PCT,
        )
        .iter()
        .map(|row| {
            vec![
                row.decile.to_string(),
                fmt(row.pct_losers, 1),
                fmt(row.pct_winners, 1),
                fmt(row.pct_no_change, 1),
            ]
        })
        .collect(),
    ));

    // Constituency impacts, when geographic inputs are available.
    if let Some(geo) = geo {
        let year_label = format!("{}-{:02}", year, (year + 1) % 100);
        tables.push(Table::new(
            "constituency",
            &["year", "constituency_code", "constituency_name", "avg_change"],
            geo_impacts(&baseline_hh_income, &reformed_hh_income, geo)
                .iter()
                .map(|impact| {
                    vec![
                        year_label.clone(),
                        impact.code.clone(),
                        impact.name.clone(),
                        fmt(impact.avg_change, 2),
                    ]
                })
                .collect(),
        ));
    }

    info!(tables = tables.len(), "report complete");
    Ok(tables)
}

fn nics_rates_table(
    adjusted_income: &[f64],
    weights: &[f64],
    above_cap: &[bool],
    reference: &ReferenceFigures,
) -> Option<Table> {
    let affected = weighted_count(weights, above_cap);
    if affected <= 0.0 {
        warn!("no workers above the cap; nics_rates table skipped");
        return None;
    }
    let limit = reference.basic_rate_limit;
    let basic_mask: Vec<bool> = adjusted_income
        .iter()
        .zip(above_cap)
        .map(|(&inc, &above)| above && inc <= limit)
        .collect();
    let higher_mask: Vec<bool> = adjusted_income
        .iter()
        .zip(above_cap)
        .map(|(&inc, &above)| above && inc > limit)
        .collect();
    let pct_basic = weighted_count(weights, &basic_mask) / affected;
    let pct_higher = weighted_count(weights, &higher_mask) / affected;
    let implied_average =
        pct_basic * reference.employee_ni_basic + pct_higher * reference.employee_ni_higher;

    Some(Table::new(
        "nics_rates",
        &["band", "pct_workers", "nics_rate"],
        vec![
            vec![
                format!("Basic rate ({:.0}% NICs; <=£{:.0})", reference.employee_ni_basic * 100.0, limit),
                fmt(pct_basic, 3),
                fmt(reference.employee_ni_basic, 2),
            ],
            vec![
                format!("Higher rate ({:.0}% NICs; >£{:.0})", reference.employee_ni_higher * 100.0, limit),
                fmt(pct_higher, 3),
                fmt(reference.employee_ni_higher, 2),
            ],
            vec!["Model implied average".to_string(), String::new(), fmt(implied_average, 3)],
            vec!["Reference average".to_string(), String::new(), fmt(reference.ss_ee_nics_rate, 3)],
        ],
    ))
}

fn scenarios_table(results: &[ScenarioResult]) -> Table {
    Table::new(
        "scenarios",
        &["name", "pass_through_pct", "redirect_to_pension", "revenue_bn"],
        results
            .iter()
            .map(|r| {
                vec![
                    r.name.clone(),
                    format!("{:.0}", r.parameters.pass_through_rate * 100.0),
                    r.parameters.redirect_to_pension.to_string(),
                    fmt(r.revenue_delta_bn, 2),
                ]
            })
            .collect(),
    )
}

fn behavioural_table(reference: &ReferenceFigures) -> Table {
    let signed = |v: f64| format!("{v:+.1}");
    Table::new(
        "behavioural",
        &["component", "reference_bn", "modelled"],
        vec![
            vec![
                "Static yield (SS + bonus)".to_string(),
                fmt(-reference.revenue_static_bn, 1),
                "Partial".to_string(),
            ],
            vec!["SS only".to_string(), fmt(-reference.ss_static_bn, 1), "Yes".to_string()],
            vec![
                "Bonus only".to_string(),
                fmt(-reference.bonus_static_bn, 1),
                "No".to_string(),
            ],
            vec![
                "Employers switching to ordinary contribs".to_string(),
                signed(reference.behav_employers_switching_bn),
                "No".to_string(),
            ],
            vec![
                "Employees switching to RAS schemes".to_string(),
                signed(reference.behav_ras_timing_bn),
                "No".to_string(),
            ],
            vec![
                "Pass-through to lower wages/profits".to_string(),
                signed(reference.behav_pass_through_bn),
                "Yes".to_string(),
            ],
            vec![
                "Other (DC reduction; forestalling)".to_string(),
                signed(reference.behav_other_bn),
                "No".to_string(),
            ],
            vec![
                "Post-behavioural (headline)".to_string(),
                fmt(-reference.revenue_headline_bn, 1),
                String::new(),
            ],
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distribution::GeoUnit;

    fn build(population_seed: u64, geo: Option<&GeoData>) -> Vec<Table> {
        let population = PopulationData::synthetic(1_200, population_seed);
        build_report(
            &population,
            RunConfig::default(),
            &ReferenceFigures::default(),
            geo,
        )
        .expect("report builds")
    }

    fn table<'a>(tables: &'a [Table], name: &str) -> &'a Table {
        tables
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("missing table {name}"))
    }

    #[test]
    fn emits_the_full_table_set_without_geo() {
        let tables = build(17, None);
        for name in [
            "tax_base",
            "population",
            "wages_employment",
            "nics_rates",
            "scenarios",
            "revenue_decomposition",
            "it_leakage",
            "behavioural",
            "distributional",
            "winners_losers",
        ] {
            let _ = table(&tables, name);
        }
        assert!(!tables.iter().any(|t| t.name == "constituency"));
    }

    #[test]
    fn headers_are_the_wire_contract() {
        let tables = build(17, None);
        assert_eq!(
            table(&tables, "tax_base").headers,
            vec!["metric", "model", "reference", "unit", "ratio"]
        );
        assert_eq!(
            table(&tables, "population").headers,
            vec!["metric", "model", "reference", "ratio"]
        );
        assert_eq!(
            table(&tables, "scenarios").headers,
            vec!["name", "pass_through_pct", "redirect_to_pension", "revenue_bn"]
        );
        assert_eq!(
            table(&tables, "distributional").headers,
            vec!["decile", "avg_baseline", "avg_reformed", "avg_change", "pct_change"]
        );
        assert_eq!(
            table(&tables, "winners_losers").headers,
            vec!["decile", "pct_losers", "pct_winners", "pct_no_change"]
        );
    }

    #[test]
    fn scenarios_table_has_five_rows_with_preset_parameters() {
        let tables = build(29, None);
        let scenarios = table(&tables, "scenarios");
        assert_eq!(scenarios.rows.len(), 5);
        assert_eq!(scenarios.rows[0][1], "0");
        assert_eq!(scenarios.rows[1][1], "100");
        assert_eq!(scenarios.rows[4][1], "76");
        assert_eq!(scenarios.rows[0][2], "true");
        assert_eq!(scenarios.rows[2][2], "false");
    }

    #[test]
    fn constituency_table_appears_with_geo_inputs() {
        let population = PopulationData::synthetic(600, 31);
        let households = population.household_count();
        let geo = GeoData {
            units: vec![
                GeoUnit {
                    code: "E1".to_string(),
                    name: "First".to_string(),
                },
                GeoUnit {
                    code: "E2".to_string(),
                    name: "Second".to_string(),
                },
            ],
            weights: vec![vec![1.0; households], vec![2.0; households]],
        };
        let tables = build_report(
            &population,
            RunConfig::default(),
            &ReferenceFigures::default(),
            Some(&geo),
        )
        .expect("report builds");
        let constituency = table(&tables, "constituency");
        assert_eq!(
            constituency.headers,
            vec!["year", "constituency_code", "constituency_name", "avg_change"]
        );
        assert_eq!(constituency.rows.len(), 2);
        assert_eq!(constituency.rows[0][0], "2029-30");
        assert_eq!(constituency.rows[0][1], "E1");
    }

    #[test]
    fn winners_losers_rows_sum_to_one_hundred() {
        let tables = build(41, None);
        for row in &table(&tables, "winners_losers").rows {
            let total: f64 = row[1..].iter().map(|c| c.parse::<f64>().unwrap()).sum();
            assert!((total - 100.0).abs() < 0.3, "row sums to {total}");
        }
    }

    #[test]
    fn load_geo_or_skip_returns_none_for_missing_files() {
        assert!(
            load_geo_or_skip(
                Path::new("/nope/weights.json"),
                Path::new("/nope/units.csv"),
                2025,
            )
            .is_none()
        );
    }
}
