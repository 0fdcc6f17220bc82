//! Error types for the ECL engine
//!
//! Configuration and validation problems are fatal and surface here.
//! Data-quality gaps (unmapped segments, missing curve values, absent driver
//! columns) are not errors: they flow through as NaN / null values.

use thiserror::Error;

/// Result alias used throughout the library
pub type EclResult<T> = Result<T, EclError>;

/// Reason a scenario weight set was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("missing weight for scenario(s): {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("weight supplied for unknown scenario(s): {}", .0.join(", "))]
    Extra(Vec<String>),

    #[error("negative weight {weight} for scenario {scenario}")]
    Negative { scenario: String, weight: f64 },

    #[error("weights sum to {sum}, expected 1.0")]
    BadSum { sum: f64 },
}

/// The main error type for ECL runs
#[derive(Error, Debug)]
pub enum EclError {
    /// No calculator is configured for this operation key
    #[error("Unsupported operation: {operation_type} / {operation_status}")]
    UnsupportedOperation {
        operation_type: String,
        operation_status: String,
    },

    /// A required template sheet was not delivered
    #[error("Missing required sheet: {sheet}")]
    MissingSheet { sheet: String },

    /// A table lacks mandatory columns
    #[error("Missing required column(s) in {table}: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// The time-step ladder sheet is unusable
    #[error("Invalid step ladder: {reason}")]
    InvalidStepLadder { reason: String },

    /// Nothing to compute
    #[error("Portfolio is empty")]
    EmptyPortfolio,

    /// A column was set with the wrong number of rows
    #[error("Column {column} has {actual} rows, table has {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Scenario weighting rejected before any computation
    #[error("Invalid scenario weights: {0}")]
    InvalidWeights(#[from] WeightError),

    /// A scenario was requested that the run did not compute
    #[error("Unknown scenario: {scenario}")]
    UnknownScenario { scenario: String },

    /// Engine configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EclError {
    pub fn missing_columns(table: impl Into<String>, columns: Vec<String>) -> Self {
        EclError::MissingColumns {
            table: table.into(),
            columns,
        }
    }
}
