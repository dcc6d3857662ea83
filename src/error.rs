//! Error types for the salary-sacrifice cap model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// The simulation engine failed while running a named scenario.
    /// Partial scenario output silently degrades report integrity, so this
    /// always aborts the run.
    #[error("scenario '{name}' failed: {source}")]
    Scenario {
        name: String,
        #[source]
        source: Box<ModelError>,
    },

    #[error("simulation error: {0}")]
    Simulation(String),

    #[error("unknown period {requested}, engine is configured for {configured}")]
    UnknownPeriod { requested: u32, configured: u32 },

    #[error("{variable} is not a settable input variable")]
    NotAnInput { variable: String },

    #[error("length mismatch for {variable}: expected {expected}, got {actual}")]
    LengthMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// Geographic weights or unit metadata are absent. Callers skip the
    /// affected table rather than failing the whole run.
    #[error("missing input data: {0}")]
    MissingInputData(String),

    /// Decomposed revenue components do not reconcile with the
    /// independently computed scenario total.
    #[error(
        "decomposition identity violated: components sum to {components_bn:.6}bn, \
         independent total is {total_bn:.6}bn"
    )]
    IdentityViolation { components_bn: f64, total_bn: f64 },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Attach a scenario name to an error bubbling out of an engine run.
    pub fn in_scenario(self, name: &str) -> Self {
        ModelError::Scenario {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}
