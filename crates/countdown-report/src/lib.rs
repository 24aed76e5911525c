//! Countdown Report - xUnit and Cobertura reporting
//!
//! This crate turns raw tool output into a report model, writes that model
//! as xUnit XML, and merges per-unit coverage profiles into a single
//! Cobertura report.

pub mod coverage;
pub mod gotest;
pub mod junit;
pub mod model;

pub use coverage::{write_cobertura, CoverageProfile};
pub use gotest::{parse_output, ParseError, MAX_LINE_LEN};
pub use junit::{report_path, to_xml, write_report};
pub use model::{Failure, TestCase, TestSuite};
