pub mod aggregate;
pub mod decompose;
pub mod distribution;
pub mod engine;
pub mod reform;
pub mod report;
pub mod scenario;
pub mod types;

pub use engine::{Microsimulation, TaxModel, TaxPolicy, Variable, apply_reform};
pub use reform::{CapReform, ReformedArrays};
pub use report::{build_report, load_geo_or_skip};
pub use scenario::{ScenarioRunner, scenario_presets};
pub use types::{
    PolicyParameters, ReferenceFigures, RunConfig, ScenarioResult, ScenarioSpec,
};
