//! Runs every (island, scenario) pair of a batch, sequentially or on a worker pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use derive_more::Display;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::results::{AveragedResults, GlobalResultSet, ResultAggregator};
use crate::basic::island::Island;
use crate::basic::network::NetworkModel;
use crate::basic::pf::{PowerFlowOptions, ScenarioSolver, SolveResult};
use crate::error::ConfigError;
use crate::timeseries::{Scenario, ScenarioSource};

/// How often the collecting thread polls for cancellation while no result arrives.
const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Fixed-size worker pool; `threads = 0` uses one worker per CPU.
    Parallel {
        #[serde(default)]
        threads: usize,
    },
}

/// Terminal state of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RunStatus {
    #[display("completed")]
    Completed,
    /// Stopped by the caller; unprocessed slots keep their defaults.
    #[display("canceled")]
    Canceled,
    #[display("failed: {_0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub results: GlobalResultSet,
    pub status: RunStatus,
}

/// Message from a worker: scenario row, island index, and the result unless
/// the solve panicked.
type Completion = (usize, usize, Option<SolveResult>);

/// Pairs islands with scenarios and feeds a [`ResultAggregator`].
///
/// Islands, solver and options are shared read-only with the workers; only
/// the calling thread writes results.
pub struct ExecutionOrchestrator {
    n_bus: usize,
    n_branch: usize,
    islands: Vec<Arc<Island>>,
    solver: Arc<dyn ScenarioSolver>,
    options: Arc<PowerFlowOptions>,
}

impl ExecutionOrchestrator {
    pub fn new(
        network: &NetworkModel,
        islands: Vec<Island>,
        solver: Arc<dyn ScenarioSolver>,
        options: PowerFlowOptions,
    ) -> Self {
        Self {
            n_bus: network.n_bus(),
            n_branch: network.n_branch(),
            islands: islands.into_iter().map(Arc::new).collect(),
            solver,
            options: Arc::new(options),
        }
    }

    pub fn islands(&self) -> &[Arc<Island>] {
        &self.islands
    }

    pub fn options(&self) -> &PowerFlowOptions {
        &self.options
    }

    /// Checks everything that can fail before the first scenario runs.
    pub fn validate(&self, source: &mut dyn ScenarioSource) -> Result<(), ConfigError> {
        if self.islands.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }
        for island in &self.islands {
            self.solver.check_island(island, &self.options)?;
        }
        source.reset();
        if let Some(first) = source.next() {
            if first.n_bus() != self.n_bus {
                return Err(ConfigError::DimensionMismatch {
                    expected: self.n_bus,
                    actual: first.n_bus(),
                });
            }
        }
        source.reset();
        Ok(())
    }

    /// Solves every scenario of `source` on every island.
    ///
    /// `on_progress` receives the completed fraction after each solve;
    /// `on_cancel` is polled between solves and, once true, ends the run with
    /// [`RunStatus::Canceled`]. Only configuration problems found before the
    /// loop are returned as errors.
    pub fn run(
        &self,
        source: &mut dyn ScenarioSource,
        mode: ExecutionMode,
        on_progress: &mut dyn FnMut(f64),
        on_cancel: &dyn Fn() -> bool,
    ) -> Result<BatchOutcome, ConfigError> {
        self.validate(source)?;
        let n = source.len();
        info!(
            islands = self.islands.len(),
            scenarios = n,
            ?mode,
            solver = %self.options.solver,
            "batch started"
        );
        let mut agg = ResultAggregator::new(n, self.n_bus, self.n_branch, self.islands.len());
        let canceled = match mode {
            ExecutionMode::Sequential => self.run_sequential(source, &mut agg, on_progress, on_cancel),
            ExecutionMode::Parallel { threads } => {
                self.run_parallel(source, threads, &mut agg, on_progress, on_cancel)?
            }
        };
        let results = agg.compile();
        let status = if canceled {
            RunStatus::Canceled
        } else {
            RunStatus::Completed
        };
        let summary = results.summary();
        info!(
            %status,
            converged = summary.converged,
            not_converged = summary.not_converged,
            singular = summary.singular,
            worker_failed = summary.worker_failed,
            "batch finished"
        );
        Ok(BatchOutcome { results, status })
    }

    /// Like [`run`](Self::run), but folds configuration errors into
    /// [`RunStatus::Failed`] with an empty result set.
    pub fn run_status(
        &self,
        source: &mut dyn ScenarioSource,
        mode: ExecutionMode,
        on_progress: &mut dyn FnMut(f64),
        on_cancel: &dyn Fn() -> bool,
    ) -> BatchOutcome {
        match self.run(source, mode, on_progress, on_cancel) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "batch aborted before the first scenario");
                BatchOutcome {
                    results: GlobalResultSet::new(0, self.n_bus, self.n_branch, self.islands.len()),
                    status: RunStatus::Failed(err.to_string()),
                }
            }
        }
    }

    /// Mean operating point of a sampling batch.
    pub fn average(&self, results: &GlobalResultSet) -> AveragedResults {
        results.average_branch_results(&self.islands, &self.options)
    }

    fn run_sequential(
        &self,
        source: &mut dyn ScenarioSource,
        agg: &mut ResultAggregator,
        on_progress: &mut dyn FnMut(f64),
        on_cancel: &dyn Fn() -> bool,
    ) -> bool {
        let total = (self.islands.len() * source.len()).max(1) as f64;
        let mut done = 0usize;
        for island in &self.islands {
            source.reset();
            while let Some(scenario) = source.next() {
                let t = scenario.index;
                match solve_guarded(self.solver.as_ref(), island, &scenario, &self.options) {
                    Some(res) => agg.apply(t, island, &res),
                    None => {
                        warn!(island = island.index, scenario = t, "solver panicked");
                        agg.apply_failure(t, island.index);
                    }
                }
                done += 1;
                on_progress(done as f64 / total);
                if on_cancel() {
                    info!(island = island.index, scenario = t, done, "batch canceled");
                    return true;
                }
            }
        }
        false
    }

    fn run_parallel(
        &self,
        source: &mut dyn ScenarioSource,
        threads: usize,
        agg: &mut ResultAggregator,
        on_progress: &mut dyn FnMut(f64),
        on_cancel: &dyn Fn() -> bool,
    ) -> Result<bool, ConfigError> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gridbatch-worker-{i}"))
            .panic_handler(|_| warn!("worker thread panicked outside a scenario solve"))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("building worker pool: {e}")))?;
        debug!(threads, "worker pool ready");

        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<Completion>();
        let mut submitted = 0usize;
        for island in &self.islands {
            source.reset();
            while let Some(scenario) = source.next() {
                let tx = tx.clone();
                let island = Arc::clone(island);
                let solver = Arc::clone(&self.solver);
                let options = Arc::clone(&self.options);
                let cancel = Arc::clone(&cancel);
                pool.spawn(move || {
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    let res = solve_guarded(solver.as_ref(), &island, &scenario, &options);
                    // receiver gone means the run was canceled
                    let _ = tx.send((scenario.index, island.index, res));
                });
                submitted += 1;
            }
        }
        drop(tx);

        let total = submitted.max(1) as f64;
        let mut received = 0usize;
        while received < submitted {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok((t, i, Some(res))) => {
                    agg.apply(t, &self.islands[i], &res);
                    received += 1;
                    on_progress(received as f64 / total);
                }
                Ok((t, i, None)) => {
                    warn!(island = i, scenario = t, "solver panicked");
                    agg.apply_failure(t, i);
                    received += 1;
                    on_progress(received as f64 / total);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if on_cancel() {
                cancel.store(true, Ordering::Relaxed);
                info!(received, submitted, "batch canceled, dropping queued work");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Solves one pair from a flat start, turning a panic into `None`.
fn solve_guarded(
    solver: &dyn ScenarioSolver,
    island: &Island,
    scenario: &Scenario,
    options: &PowerFlowOptions,
) -> Option<SolveResult> {
    catch_unwind(AssertUnwindSafe(|| {
        let local = island.localize(scenario);
        let v_init = island.initial_voltage(&local);
        solver.solve(island, &local, &v_init, options)
    }))
    .ok()
}
