//! Worker pool: fan tasks out to a fixed set of workers, fan outcomes back in

use std::sync::Arc;
use std::time::{Duration, Instant};

use countdown_core::{ExecutionError, Result};
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::executor::Executor;
use crate::reporter::{TaskEvent, TaskReporter, TracingReporter};
use crate::task::{ExecutionOutcome, OutcomeStatus, Task};

/// Default upper bound of the per-worker startup delay
pub const DEFAULT_STAGGER: Duration = Duration::from_secs(30);

/// Sizing of the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    /// Number of workers, at least 1
    pub workers: usize,
    /// Upper bound of the random delay each worker waits before its first pull
    pub stagger: Duration,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            stagger: DEFAULT_STAGGER,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl WorkerPool {
    /// `None` picks the available parallelism
    pub fn new(workers: Option<usize>) -> Self {
        Self {
            workers: workers.unwrap_or_else(num_cpus).max(1),
            ..Self::default()
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Random startup delay for one worker; zero for a single worker
    fn stagger_delay(&self) -> Duration {
        if self.workers <= 1 || self.stagger.is_zero() {
            return Duration::ZERO;
        }
        let bound = self.stagger.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}

/// Runs tasks on a [`WorkerPool`] and collects exactly one outcome per unit
pub struct Dispatch {
    pool: WorkerPool,
    reporter: Arc<dyn TaskReporter>,
}

impl Dispatch {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run `tasks` and return their outcomes together with `synthetic` ones.
    ///
    /// Outcomes arrive in completion order. An executor error aborts the run
    /// once every worker has drained the queue.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        synthetic: Vec<ExecutionOutcome>,
        executor: Arc<dyn Executor>,
    ) -> Result<Vec<ExecutionOutcome>> {
        let start = Instant::now();
        let expected = tasks.len() + synthetic.len();
        let workers = self.pool.workers.max(1);

        self.reporter.report(&TaskEvent::DispatchStarted {
            units: expected,
            workers,
        });

        let (task_tx, task_rx) = mpsc::channel::<Task>(tasks.len().max(1));
        for task in tasks {
            task_tx
                .try_send(task)
                .map_err(|e| ExecutionError::Worker(format!("failed to queue task: {}", e)))?;
        }
        drop(task_tx);
        let queue = Arc::new(Mutex::new(task_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<Result<ExecutionOutcome>>(expected.max(1));
        for outcome in synthetic {
            self.reporter.report(&TaskEvent::Excluded {
                unit: outcome.unit.clone(),
                names: outcome.excluded_names.clone(),
            });
            result_tx
                .try_send(Ok(outcome))
                .map_err(|e| ExecutionError::Worker(format!("failed to queue result: {}", e)))?;
        }

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let delay = self.pool.stagger_delay();
            let queue = queue.clone();
            let results = result_tx.clone();
            let executor = executor.clone();
            let reporter = self.reporter.clone();

            handles.push(tokio::spawn(async move {
                if !delay.is_zero() {
                    reporter.report(&TaskEvent::WorkerStaggered { worker, delay });
                    tokio::time::sleep(delay).await;
                }
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(task) = next else { break };
                    let outcome = executor.execute(task).await;
                    if results.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!(worker, "worker finished");
            }));
        }
        drop(result_tx);

        let mut outcomes = Vec::with_capacity(expected);
        let mut first_error = None;
        let mut received = 0;
        while received < expected {
            match result_rx.recv().await {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => break,
            }
            received += 1;
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| ExecutionError::Worker(e.to_string()))?;
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if outcomes.len() != expected {
            return Err(ExecutionError::ResultsMissing {
                expected,
                received: outcomes.len(),
            }
            .into());
        }

        let excluded = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Excluded)
            .count();
        let failed = outcomes.iter().filter(|o| o.status.is_failure()).count();
        self.reporter.report(&TaskEvent::AllCompleted {
            total: expected,
            passed: expected - failed - excluded,
            failed,
            excluded,
            duration: start.elapsed(),
        });
        info!(units = expected, elapsed_ms = start.elapsed().as_millis() as u64, "dispatch complete");

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use async_trait::async_trait;
    use countdown_core::{CountdownError, Unit};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Passes every unit except those named `fail*`, tracking concurrency
    #[derive(Default)]
    struct FakeExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, task: Task) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let status = if task.unit().as_str().starts_with("fail") {
                OutcomeStatus::TestFailed
            } else {
                OutcomeStatus::Passed
            };
            Ok(ExecutionOutcome {
                unit: task.unit().clone(),
                status,
                output: String::new(),
                duration: Duration::from_millis(20),
                coverage: None,
                excluded_names: task.excluded_names().to_vec(),
            })
        }
    }

    struct ErrorExecutor;

    #[async_trait]
    impl Executor for ErrorExecutor {
        async fn execute(&self, task: Task) -> Result<ExecutionOutcome> {
            if task.unit().as_str() == "broken" {
                return Err(ExecutionError::Enumeration("boom".to_string()).into());
            }
            Ok(ExecutionOutcome::excluded(task.unit().clone(), Vec::new()))
        }
    }

    struct PanicExecutor;

    #[async_trait]
    impl Executor for PanicExecutor {
        async fn execute(&self, _task: Task) -> Result<ExecutionOutcome> {
            panic!("worker exploded");
        }
    }

    fn tasks(names: &[&str]) -> Vec<Task> {
        names.iter().map(|n| Task::new(Unit::new(*n))).collect()
    }

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(Some(workers)).with_stagger(Duration::ZERO)
    }

    #[test]
    fn test_pool_defaults() {
        let pool = WorkerPool::default();
        assert!(pool.workers > 0);
        assert_eq!(pool.stagger, DEFAULT_STAGGER);
        assert_eq!(WorkerPool::new(Some(0)).workers, 1);
    }

    #[test]
    fn test_single_worker_never_staggers() {
        let pool = WorkerPool::new(Some(1));
        assert_eq!(pool.stagger_delay(), Duration::ZERO);
    }

    #[test]
    fn test_stagger_is_bounded() {
        let pool = WorkerPool::new(Some(4)).with_stagger(Duration::from_millis(50));
        for _ in 0..100 {
            assert!(pool.stagger_delay() < Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_every_unit_yields_one_outcome() {
        let executor = Arc::new(FakeExecutor::default());
        let dispatch = Dispatch::new(pool(3));
        let synthetic = vec![ExecutionOutcome::excluded(
            Unit::new("excluded"),
            vec!["TestA".to_string()],
        )];

        let outcomes = dispatch
            .run(tasks(&["a", "b", "fail-c", "d", "e"]), synthetic, executor.clone())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 6);
        let units: HashSet<_> = outcomes.iter().map(|o| o.unit.as_str().to_string()).collect();
        assert_eq!(units.len(), 6);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 5);
        assert!(executor.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_single_worker_runs_sequentially() {
        let executor = Arc::new(FakeExecutor::default());
        let dispatch = Dispatch::new(pool(1));
        dispatch
            .run(tasks(&["a", "b", "c"]), Vec::new(), executor.clone())
            .await
            .unwrap();
        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let dispatch = Dispatch::new(pool(2));
        let outcomes = dispatch
            .run(Vec::new(), Vec::new(), Arc::new(FakeExecutor::default()))
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stagger_delays_first_pull_only() {
        let executor = Arc::new(FakeExecutor::default());
        let dispatch = Dispatch::new(
            WorkerPool::new(Some(2)).with_stagger(Duration::from_secs(30)),
        );
        let outcomes = dispatch
            .run(tasks(&["a", "b", "c", "d"]), Vec::new(), executor)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_executor_error_aborts_run() {
        let dispatch = Dispatch::new(pool(2));
        let err = dispatch
            .run(tasks(&["a", "broken", "c"]), Vec::new(), Arc::new(ErrorExecutor))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_worker_panic_is_an_error() {
        let dispatch = Dispatch::new(pool(1));
        let err = dispatch
            .run(tasks(&["a"]), Vec::new(), Arc::new(PanicExecutor))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CountdownError::Execution(ExecutionError::Worker(_))
        ));
    }

    #[tokio::test]
    async fn test_events_reported() {
        let reporter = Arc::new(CollectingReporter::default());
        let dispatch = Dispatch::new(pool(2)).with_reporter(reporter.clone());
        let synthetic = vec![ExecutionOutcome::excluded(Unit::new("x"), Vec::new())];
        dispatch
            .run(tasks(&["a", "fail-b"]), synthetic, Arc::new(FakeExecutor::default()))
            .await
            .unwrap();

        let events = reporter.events();
        assert!(matches!(events.first(), Some(TaskEvent::DispatchStarted { units: 3, workers: 2 })));
        assert!(events.iter().any(|e| matches!(e, TaskEvent::Excluded { .. })));
        assert!(matches!(
            events.last(),
            Some(TaskEvent::AllCompleted {
                total: 3,
                passed: 1,
                failed: 1,
                excluded: 1,
                ..
            })
        ));
    }
}
