//! Countdown Tasks - parallel build/test orchestration
//!
//! This crate drives an external build/test tool over many units in
//! parallel: it filters candidate tests through exclusion rules, runs one
//! subprocess per unit with a hard timeout, classifies each outcome, and
//! aggregates everything into xUnit and Cobertura reports. The regression
//! workflow reruns the test pipeline against binaries mixed from two
//! provenances.

pub mod aggregator;
pub mod classifier;
pub mod enumerate;
pub mod exclusion;
pub mod executor;
pub mod pipeline;
pub mod regression;
pub mod reporter;
pub mod scheduler;
pub mod task;

pub use aggregator::{AggregateResult, Aggregator};
pub use classifier::{classify, FailureKind, ProcessResult};
pub use enumerate::{FuncMatcher, GoList, TestFuncScanner, TestNameSource, UnitSource};
pub use exclusion::{ExclusionRule, ExclusionRules, Filtered, Platform};
pub use executor::{run_process, Executor, Invocation, UnitExecutor};
pub use pipeline::{BuildOptions, CoverageOptions, Pipeline, TestKind, TestOptions};
pub use regression::{
    assemble_binaries, BinaryBuilder, BinarySet, CommandSnapshotSource, InstallBuilder,
    RegressionDirection, RegressionEnv, RegressionOptions, RegressionWorkflow, SnapshotSource,
};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{Dispatch, WorkerPool};
pub use task::{CoverageArtifact, ExecutionOutcome, OutcomeStatus, Task};
