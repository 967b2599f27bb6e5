//! Global result tensors and their assembly from per-island solves.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::basic::island::Island;
use crate::basic::pf::{PowerFlowOptions, SolveResult, SolveStatus};
use crate::basic::system::flows::branch_flows;

/// What happened to one (scenario, island) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IslandOutcome {
    /// Never processed (canceled run, or still in flight).
    #[default]
    Pending,
    Solved { status: SolveStatus, iterations: usize },
    /// The worker panicked; the slot keeps its defaults.
    WorkerFailed,
}

/// Results of a whole batch, indexed by `(scenario, global bus)` and
/// `(scenario, global branch)`.
///
/// Entries that no solve wrote stay at zero. `converged[t]` is true only when
/// every island of scenario `t` converged.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalResultSet {
    pub voltage: DMatrix<Complex64>,
    pub s_bus: DMatrix<Complex64>,
    pub s_branch: DMatrix<Complex64>,
    pub losses: DMatrix<Complex64>,
    pub loading_percent: DMatrix<f64>,
    pub overloads: DMatrix<f64>,
    pub converged: Vec<bool>,
    /// `scenarios × islands`.
    pub outcomes: DMatrix<IslandOutcome>,
}

impl GlobalResultSet {
    pub fn new(n_scenarios: usize, n_bus: usize, n_branch: usize, n_islands: usize) -> Self {
        Self {
            voltage: DMatrix::zeros(n_scenarios, n_bus),
            s_bus: DMatrix::zeros(n_scenarios, n_bus),
            s_branch: DMatrix::zeros(n_scenarios, n_branch),
            losses: DMatrix::zeros(n_scenarios, n_branch),
            loading_percent: DMatrix::zeros(n_scenarios, n_branch),
            overloads: DMatrix::zeros(n_scenarios, n_branch),
            converged: vec![false; n_scenarios],
            outcomes: DMatrix::from_element(n_scenarios, n_islands, IslandOutcome::Pending),
        }
    }

    pub fn n_scenarios(&self) -> usize {
        self.voltage.nrows()
    }

    pub fn n_bus(&self) -> usize {
        self.voltage.ncols()
    }

    pub fn n_branch(&self) -> usize {
        self.s_branch.ncols()
    }

    /// Counts outcomes over all (scenario, island) pairs.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            scenarios: self.n_scenarios(),
            islands: self.outcomes.ncols(),
            ..Default::default()
        };
        for outcome in self.outcomes.iter() {
            match outcome {
                IslandOutcome::Pending => summary.pending += 1,
                IslandOutcome::WorkerFailed => summary.worker_failed += 1,
                IslandOutcome::Solved { status, .. } => match status {
                    SolveStatus::Converged => summary.converged += 1,
                    SolveStatus::NotConverged => summary.not_converged += 1,
                    SolveStatus::SingularSystem => summary.singular += 1,
                },
            }
        }
        summary
    }

    /// Mean operating point over the scenario axis, per island.
    ///
    /// Voltages and injections are averaged over the scenarios in which the
    /// island converged, not over every row: canceled, failed and diverged
    /// rows would otherwise drag the mean towards zero or garbage. With every
    /// scenario converged this is the plain mean over all points. Branch
    /// quantities are then derived once from the averaged voltage.
    pub fn average_branch_results<I: AsRef<Island>>(
        &self,
        islands: &[I],
        options: &PowerFlowOptions,
    ) -> AveragedResults {
        let mut avg = AveragedResults::zeros(self.n_bus(), self.n_branch());
        let model = options.flow_model();
        for island in islands {
            let island: &Island = island.as_ref();
            let rows: Vec<usize> = (0..self.n_scenarios())
                .filter(|&t| {
                    matches!(
                        self.outcomes[(t, island.index)],
                        IslandOutcome::Solved {
                            status: SolveStatus::Converged,
                            ..
                        }
                    )
                })
                .collect();
            if rows.is_empty() {
                continue;
            }
            let count = rows.len() as f64;
            let mean = |m: &DMatrix<Complex64>, col: usize| rows.iter().map(|&t| m[(t, col)]).sum::<Complex64>() / count;

            let v_local = DVector::from_fn(island.n_bus(), |k, _| mean(&self.voltage, island.bus_idx[k]));
            for (k, &bus) in island.bus_idx.iter().enumerate() {
                avg.voltage[bus] = v_local[k];
                avg.s_bus[bus] = mean(&self.s_bus, bus);
            }
            let flows = branch_flows(&island.branches, &v_local, model);
            for (k, &br) in island.branch_idx.iter().enumerate() {
                avg.s_branch[br] = flows.s_from[k];
                avg.losses[br] = flows.losses[k];
                avg.loading_percent[br] = flows.loading[k] * 100.0;
                avg.overloads[br] = flows.overloads[k];
            }
        }
        avg
    }
}

/// A single representative operating point over the global numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedResults {
    pub voltage: DVector<Complex64>,
    pub s_bus: DVector<Complex64>,
    pub s_branch: DVector<Complex64>,
    pub losses: DVector<Complex64>,
    pub loading_percent: DVector<f64>,
    pub overloads: DVector<f64>,
}

impl AveragedResults {
    fn zeros(n_bus: usize, n_branch: usize) -> Self {
        Self {
            voltage: DVector::zeros(n_bus),
            s_bus: DVector::zeros(n_bus),
            s_branch: DVector::zeros(n_branch),
            losses: DVector::zeros(n_branch),
            loading_percent: DVector::zeros(n_branch),
            overloads: DVector::zeros(n_branch),
        }
    }
}

/// Outcome counts over (scenario, island) pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scenarios: usize,
    pub islands: usize,
    pub converged: usize,
    pub not_converged: usize,
    pub singular: usize,
    pub worker_failed: usize,
    pub pending: usize,
}

/// Single write point for per-island results.
///
/// Writes are keyed by scenario row and the island's index maps, so results
/// may be applied in any order with the same final content.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    results: GlobalResultSet,
}

impl ResultAggregator {
    pub fn new(n_scenarios: usize, n_bus: usize, n_branch: usize, n_islands: usize) -> Self {
        Self {
            results: GlobalResultSet::new(n_scenarios, n_bus, n_branch, n_islands),
        }
    }

    /// Scatters one island's solution into row `t`.
    pub fn apply(&mut self, t: usize, island: &Island, res: &SolveResult) {
        let out = &mut self.results;
        for (k, &bus) in island.bus_idx.iter().enumerate() {
            out.voltage[(t, bus)] = res.voltage[k];
            out.s_bus[(t, bus)] = res.s_bus[k];
        }
        for (k, &br) in island.branch_idx.iter().enumerate() {
            out.s_branch[(t, br)] = res.s_branch[k];
            out.losses[(t, br)] = res.losses[k];
            out.loading_percent[(t, br)] = res.loading[k] * 100.0;
            out.overloads[(t, br)] = res.overloads[k];
        }
        out.outcomes[(t, island.index)] = IslandOutcome::Solved {
            status: res.status,
            iterations: res.iterations,
        };
    }

    /// Marks a (scenario, island) pair whose worker died.
    pub fn apply_failure(&mut self, t: usize, island: usize) {
        self.results.outcomes[(t, island)] = IslandOutcome::WorkerFailed;
    }

    /// Derives the per-scenario convergence flags and hands out the result set.
    pub fn compile(mut self) -> GlobalResultSet {
        let out = &mut self.results;
        for (t, flag) in out.converged.iter_mut().enumerate() {
            *flag = out.outcomes.row(t).iter().all(|o| {
                matches!(
                    o,
                    IslandOutcome::Solved {
                        status: SolveStatus::Converged,
                        ..
                    }
                )
            });
        }
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::island::IslandPartitioner;
    use crate::basic::network::{Branch, Bus, NetworkModel};
    use crate::basic::pf::{PowerFlowSolver, ScenarioSolver};
    use crate::timeseries::Scenario;

    fn network() -> NetworkModel {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("s1", 1.0));
        net.add_bus(Bus::fixed("l1", Complex64::new(-0.1, 0.0)));
        net.add_bus(Bus::slack("s2", 1.0));
        net.add_bus(Bus::fixed("l2", Complex64::new(-0.2, 0.0)));
        net.add_branch(Branch::from_impedance("b", 2, 3, 0.05, 0.0).with_rating(0.1));
        net.add_branch(Branch::from_impedance("a", 0, 1, 0.05, 0.0).with_rating(0.5));
        net
    }

    fn solve_all(net: &NetworkModel, islands: &[Island], scenarios: &[Scenario]) -> ResultAggregator {
        let options = PowerFlowOptions::default();
        let mut agg = ResultAggregator::new(scenarios.len(), net.n_bus(), net.n_branch(), islands.len());
        for island in islands {
            for s in scenarios {
                let local = island.localize(s);
                let v0 = island.initial_voltage(&local);
                let res = PowerFlowSolver.solve(island, &local, &v0, &options);
                agg.apply(s.index, island, &res);
            }
        }
        agg
    }

    #[test]
    fn island_results_land_on_global_indices() {
        let net = network();
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let results = solve_all(&net, &islands, &[Scenario::base(&net)]).compile();
        assert_eq!(results.converged, vec![true]);
        // branch 0 belongs to the second island and carries about 0.2
        assert!((results.s_branch[(0, 0)].re - 0.2).abs() < 0.01);
        assert!(results.loading_percent[(0, 0)] > 100.0);
        assert!(results.overloads[(0, 0)] > 0.0);
        assert!((results.s_branch[(0, 1)].re - 0.1).abs() < 0.01);
        assert_eq!(results.summary().converged, 2);
    }

    #[test]
    fn failed_or_missing_islands_clear_convergence() {
        let net = network();
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let mut agg = ResultAggregator::new(2, net.n_bus(), net.n_branch(), islands.len());
        let s = Scenario::base(&net);
        let local = islands[0].localize(&s);
        let v0 = islands[0].initial_voltage(&local);
        let res = PowerFlowSolver.solve(&islands[0], &local, &v0, &PowerFlowOptions::default());
        agg.apply(0, &islands[0], &res);
        agg.apply_failure(0, 1);
        let results = agg.compile();
        assert_eq!(results.converged, vec![false, false]);
        let summary = results.summary();
        assert_eq!(summary.worker_failed, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(results.voltage[(1, 0)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn averaging_skips_rows_where_the_island_did_not_converge() {
        let net = network();
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let base = Scenario::base(&net);
        let mut agg = ResultAggregator::new(2, net.n_bus(), net.n_branch(), islands.len());
        for island in &islands {
            let local = island.localize(&base);
            let v0 = island.initial_voltage(&local);
            let res = PowerFlowSolver.solve(island, &local, &v0, &PowerFlowOptions::default());
            agg.apply(0, island, &res);
        }
        // row 1: one island failed, the other never ran
        agg.apply_failure(1, islands[0].index);
        let results = agg.compile();
        let avg = results.average_branch_results(&islands, &PowerFlowOptions::default());
        for bus in 0..net.n_bus() {
            assert_eq!(avg.voltage[bus], results.voltage[(0, bus)]);
            assert_eq!(avg.s_bus[bus], results.s_bus[(0, bus)]);
        }
    }

    #[test]
    fn averaging_recomputes_flows_from_mean_voltage() {
        let net = network();
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let mut light = Scenario::base(&net);
        light.index = 0;
        light.s_bus[1] = Complex64::new(-0.05, 0.0);
        let mut heavy = Scenario::base(&net);
        heavy.index = 1;
        heavy.s_bus[1] = Complex64::new(-0.15, 0.0);
        let results = solve_all(&net, &islands, &[light, heavy]).compile();
        let avg = results.average_branch_results(&islands, &PowerFlowOptions::default());

        let v_mean = (results.voltage[(0, 1)] + results.voltage[(1, 1)]) / 2.0;
        assert!((avg.voltage[1] - v_mean).norm() < 1e-12);
        let expected = 20.0 * (1.0 - v_mean.re);
        assert!((avg.s_branch[1].re - expected).abs() < 1e-9);
        // flows of the mean state differ from the mean of the flows
        let mean_loss = (results.losses[(0, 1)].re + results.losses[(1, 1)].re) / 2.0;
        assert!(avg.losses[1].re < mean_loss);
    }
}
