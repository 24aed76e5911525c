//! Countdown Core - shared foundation for the Countdown CI engine
//!
//! This crate provides the error taxonomy, configuration loading and the
//! small value types (units, run verdicts) shared by the task engine, the
//! report writers and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, CountdownError, ExecutionError, RegressionError, ReportError, Result};
pub use types::{RunResult, RunStatus, Unit};
