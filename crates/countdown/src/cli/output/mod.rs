//! Output formatting utilities

use std::collections::BTreeMap;
use std::sync::Mutex;

use console::{style, Style};
use countdown_core::{RunResult, RunStatus, Unit};
use countdown_tasks::{TaskEvent, TaskReporter};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{Cli, OutputFormat};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Shows a progress bar over the units of a run and echoes failures
pub struct ConsoleReporter {
    verbose: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(bar) = bar.as_ref() {
                f(bar);
            }
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::DispatchStarted { units, workers } => {
                let bar = ProgressBar::new(*units as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                bar.set_message(format!("{} workers", workers));
                if let Ok(mut slot) = self.bar.lock() {
                    *slot = Some(bar);
                }
            }
            TaskEvent::WorkerStaggered { worker, delay } => {
                if self.verbose {
                    self.with_bar(|bar| {
                        bar.println(format!("  worker {} starts in {:.1}s", worker, delay.as_secs_f64()))
                    });
                }
            }
            TaskEvent::Started { unit, .. } => {
                self.with_bar(|bar| bar.set_message(unit.to_string()));
            }
            TaskEvent::Finished {
                unit,
                status,
                duration,
            } => self.with_bar(|bar| {
                bar.inc(1);
                if status.is_failure() {
                    bar.println(format!(
                        "{} {} {}",
                        style("✗").red().bold(),
                        unit,
                        style(status).red()
                    ));
                } else if self.verbose {
                    bar.println(format!(
                        "{} {} ({:.1}s)",
                        style("✓").green(),
                        unit,
                        duration.as_secs_f64()
                    ));
                }
            }),
            TaskEvent::Excluded { unit, .. } => self.with_bar(|bar| {
                bar.inc(1);
                if self.verbose {
                    bar.println(format!("{} {} excluded", style("○").yellow(), unit));
                }
            }),
            TaskEvent::AllCompleted { .. } => {
                if let Ok(mut slot) = self.bar.lock() {
                    if let Some(bar) = slot.take() {
                        bar.finish_and_clear();
                    }
                }
            }
        }
    }
}

fn print_by_unit(title: &str, tests: &BTreeMap<Unit, Vec<String>>) {
    if tests.is_empty() {
        return;
    }
    println!();
    println!("{}", header(title));
    for (unit, names) in tests {
        println!("{}", key_value(unit.as_str(), &names.join(", ")));
    }
}

/// Print the verdict of run `name` with its exclusion and skip bookkeeping
pub fn print_run_result(cli: &Cli, name: &str, result: &RunResult) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        let json = serde_json::json!({
            "name": name,
            "status": result.status,
            "excluded_tests": result.excluded_tests,
            "skipped_tests": result.skipped_tests,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    print_by_unit("Excluded tests", &result.excluded_tests);
    print_by_unit("Skipped tests", &result.skipped_tests);
    println!();
    match result.status {
        RunStatus::Passed => success(&format!("{} passed", name)),
        RunStatus::Failed => error(&format!("{} failed", name)),
        RunStatus::Skipped => warning(&format!("{} skipped", name)),
    }
    Ok(())
}
