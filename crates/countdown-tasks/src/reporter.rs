//! Run progress reporting

use std::sync::Arc;
use std::time::Duration;

use countdown_core::Unit;

use crate::task::OutcomeStatus;

/// Events emitted while a run progresses
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Work is about to be handed to the worker pool
    DispatchStarted {
        units: usize,
        workers: usize,
    },
    /// A worker delays its first pull
    WorkerStaggered {
        worker: usize,
        delay: Duration,
    },
    /// A unit invocation is starting
    Started {
        unit: Unit,
        command: String,
    },
    /// A unit produced its classified outcome
    Finished {
        unit: Unit,
        status: OutcomeStatus,
        duration: Duration,
    },
    /// A unit did not run because every candidate test was excluded
    Excluded {
        unit: Unit,
        names: Vec<String>,
    },
    /// All outcomes were collected
    AllCompleted {
        total: usize,
        passed: usize,
        failed: usize,
        excluded: usize,
        duration: Duration,
    },
}

/// Trait for reporting run progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::DispatchStarted { units, workers } => {
                tracing::info!(units, workers, "dispatching units");
            }
            TaskEvent::WorkerStaggered { worker, delay } => {
                tracing::debug!(worker, delay_ms = delay.as_millis() as u64, "staggering worker start");
            }
            TaskEvent::Started { unit, command } => {
                tracing::debug!(unit = %unit, command = %command, "starting unit");
            }
            TaskEvent::Finished {
                unit,
                status,
                duration,
            } => {
                if status.is_failure() {
                    tracing::warn!("{} {} after {:.1}s", unit, status, duration.as_secs_f64());
                } else {
                    tracing::info!("{} {} in {:.1}s", unit, status, duration.as_secs_f64());
                }
            }
            TaskEvent::Excluded { unit, names } => {
                tracing::info!(unit = %unit, excluded = ?names, "unit excluded");
            }
            TaskEvent::AllCompleted {
                total,
                passed,
                failed,
                excluded,
                duration,
            } => {
                tracing::info!(
                    "All units complete: {}/{} passed, {} failed, {} excluded ({:.1}s)",
                    passed,
                    total,
                    failed,
                    excluded,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    /// Register a reporter the caller keeps a handle to
    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }
}

impl TaskReporter for TaskReporterRegistry {
    /// Broadcast an event to all registered reporters
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let unit = Unit::new("v.io/x/lib/set");

        reporter.report(&TaskEvent::Started {
            unit: unit.clone(),
            command: "go test v.io/x/lib/set".to_string(),
        });
        reporter.report(&TaskEvent::Finished {
            unit,
            status: OutcomeStatus::Passed,
            duration: Duration::from_secs(5),
        });

        assert_eq!(reporter.events().len(), 2);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&TaskEvent::DispatchStarted {
            units: 3,
            workers: 2,
        });
        reporter.report(&TaskEvent::Finished {
            unit: Unit::new("pkg"),
            status: OutcomeStatus::TimedOut,
            duration: Duration::from_secs(1),
        });
    }

    #[test]
    fn test_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        registry.register_shared(collecting.clone());

        registry.report(&TaskEvent::Excluded {
            unit: Unit::new("pkg"),
            names: vec!["TestA".to_string()],
        });

        assert_eq!(collecting.events().len(), 1);
    }

    #[test]
    fn test_register() {
        let mut registry = TaskReporterRegistry::empty();
        assert!(registry.all().is_empty());

        registry.register(TracingReporter);
        registry.register(CollectingReporter::default());
        assert_eq!(registry.all().len(), 2);
    }
}
