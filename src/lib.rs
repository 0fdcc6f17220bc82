//! IFRS9 ECL - Expected credit loss engine for credit portfolios
//!
//! This library provides:
//! - Spreadsheet-encoded segmentation rules evaluated over a portfolio table
//! - Residual maturity and time-step grids
//! - PD/LGD/CCF term-structure lookup per scenario, with extension and flat-rate fill
//! - EAD amortization profiles and discount factors
//! - Per-scenario 1-year / lifetime ECL and probability-weighted ECL

pub mod amortization;
pub mod config;
pub mod discount;
pub mod ecl;
pub mod engine;
pub mod error;
pub mod rules;
pub mod scenario;
pub mod table;
pub mod terms;
pub mod time_steps;

// Re-export commonly used types
pub use config::{EngineConfig, OperationConfig, OperationStatus, OperationType, TypeModel};
pub use ecl::{EclAggregator, EclTotals, ScenarioEcl};
pub use engine::{CheckReport, EclEngine, EclRun, RunSummary};
pub use error::{EclError, EclResult, WeightError};
pub use scenario::{calcul_ecl_multi, ScenarioWeights};
pub use table::{load_table, write_table, StepMatrix, Table, Template, Value};
