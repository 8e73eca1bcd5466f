//! Run orchestration: iterations x targets over one script.
//!
//! [`Runner::run`] drives a [`Processor`] synchronously; [`Runner::spawn`]
//! does the same on a dedicated worker thread and streams [`RunProgress`]
//! events back over a channel.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::command::{Outcome, Script};
use crate::coords::WindowBox;
use crate::processor::Processor;
use crate::retry::StopFlag;
use crate::state::TestResult;

/// What to run: how many passes, over which windows
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Passes over the script, at least one
    pub iterations: u32,
    /// Window titles to run each pass against; empty keeps the current target
    pub targets: Vec<String>,
    /// Window box used when no live target window is found
    pub fallback: Option<WindowBox>,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            iterations: 1,
            targets: Vec::new(),
            fallback: None,
        }
    }
}

impl RunPlan {
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn target(mut self, title: impl Into<String>) -> Self {
        self.targets.push(title.into());
        self
    }

    pub fn fallback(mut self, window: WindowBox) -> Self {
        self.fallback = Some(window);
        self
    }
}

/// Progress notifications from a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunProgress {
    PassStarted {
        iteration: u32,
        target: Option<String>,
    },
    CommandStarted {
        iteration: u32,
        line: usize,
        text: String,
    },
    CommandFinished {
        iteration: u32,
        line: usize,
        outcome: Outcome,
    },
    Finished {
        interrupted: bool,
    },
}

/// Tally of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub iterations_completed: u32,
    pub commands_run: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub interrupted: bool,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub results: Vec<TestResult>,
    pub session_dir: PathBuf,
    pub started_at: DateTime<Local>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(processor: &Processor) -> Self {
        Self {
            iterations_completed: 0,
            commands_run: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            timed_out: 0,
            interrupted: false,
            tests_passed: 0,
            tests_failed: 0,
            results: Vec::new(),
            session_dir: processor.session().dir.clone(),
            started_at: Local::now(),
            elapsed_ms: 0,
        }
    }

    fn count(&mut self, outcome: &Outcome) {
        self.commands_run += 1;
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::TimedOut { .. } => self.timed_out += 1,
            Outcome::Interrupted => self.interrupted = true,
        }
    }

    /// True when nothing failed, timed out or was interrupted and every test passed
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.failed == 0 && self.timed_out == 0 && self.tests_failed == 0
    }
}

/// Drives a processor over a script
pub struct Runner;

impl Runner {
    /// Run `plan` to completion (or until stopped) on the calling thread
    pub fn run<F>(processor: &mut Processor, script: &Script, plan: &RunPlan, mut on_progress: F) -> RunReport
    where
        F: FnMut(RunProgress),
    {
        let started = Instant::now();
        let mut report = RunReport::new(processor);
        let stop = processor.stop_flag();

        if let Some(source) = &script.source {
            processor.state_mut().window.source_file = Some(source.clone());
        }

        let targets: Vec<Option<&str>> = if plan.targets.is_empty() {
            vec![None]
        } else {
            plan.targets.iter().map(|t| Some(t.as_str())).collect()
        };

        'passes: for iteration in 1..=plan.iterations.max(1) {
            for target in &targets {
                if stop.is_set() {
                    report.interrupted = true;
                    break 'passes;
                }

                let _span = info_span!("pass", iteration, target = target.unwrap_or("-")).entered();
                processor.set_iteration(iteration);
                if let Some(title) = target {
                    processor.select_target(*title);
                }
                info!(commands = script.len(), "pass started");
                on_progress(RunProgress::PassStarted {
                    iteration,
                    target: target.map(str::to_string),
                });

                for line in &script.lines {
                    on_progress(RunProgress::CommandStarted {
                        iteration,
                        line: line.number,
                        text: line.text.clone(),
                    });
                    let outcome = processor.process(&line.text, plan.fallback);
                    report.count(&outcome);
                    let interrupted = outcome.is_interrupted();
                    on_progress(RunProgress::CommandFinished {
                        iteration,
                        line: line.number,
                        outcome,
                    });
                    if interrupted {
                        warn!(line = line.number, "run interrupted");
                        report.interrupted = true;
                        break 'passes;
                    }
                }
            }
            report.iterations_completed = iteration;
        }

        processor.shutdown();

        let state = processor.state();
        report.results = state.test_results.clone();
        report.tests_passed = state.passed();
        report.tests_failed = state.failed();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            iterations = report.iterations_completed,
            commands = report.commands_run,
            passed = report.tests_passed,
            failed = report.tests_failed,
            interrupted = report.interrupted,
            elapsed_ms = report.elapsed_ms,
            "run finished"
        );
        on_progress(RunProgress::Finished {
            interrupted: report.interrupted,
        });
        report
    }

    /// Run on a dedicated worker thread
    pub fn spawn(mut processor: Processor, script: Script, plan: RunPlan) -> RunHandle {
        let stop = processor.stop_flag();
        let (tx, progress) = mpsc::channel();
        let handle = thread::spawn(move || {
            let report = Runner::run(&mut processor, &script, &plan, |event| {
                // A dropped receiver only means nobody is watching
                let _ = tx.send(event);
            });
            (processor, report)
        });
        RunHandle {
            stop,
            progress,
            handle,
        }
    }
}

/// A run executing on a worker thread
pub struct RunHandle {
    stop: StopFlag,
    pub progress: Receiver<RunProgress>,
    handle: JoinHandle<(Processor, RunReport)>,
}

impl RunHandle {
    /// Ask the run to stop; in-flight commands release held input and return
    pub fn stop(&self) {
        self.stop.set();
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take back the processor
    pub fn join(self) -> thread::Result<(Processor, RunReport)> {
        self.handle.join()
    }
}
