//! Connectivity analysis: splits a network into independently solvable islands.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::debug;

use super::network::{BusKind, NetworkModel};
use super::system::admittance::{LocalBranch, create_y_bus};
use crate::error::ConfigError;
use crate::timeseries::Scenario;

/// Disjoint-set forest over dense bus indices.
#[derive(Debug, Clone)]
pub(crate) struct NodeMerge {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl NodeMerge {
    /// Every node starts as its own root with rank 0.
    pub fn new(nodes: usize) -> Self {
        Self {
            parent: (0..nodes).collect(),
            rank: vec![0; nodes],
        }
    }

    /// Finds the root of `node`, compressing the path on the way back.
    pub fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Merges the sets of two nodes by rank.
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Local bus indices grouped by kind; each list is sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusSets {
    pub slack: Vec<usize>,
    pub fixed: Vec<usize>,
    pub droop: Vec<usize>,
    /// `fixed ∪ droop`, the unknowns of the reduced system.
    pub non_slack: Vec<usize>,
}

impl BusSets {
    fn from_kinds(kinds: &[BusKind]) -> Self {
        let mut sets = BusSets::default();
        for (i, kind) in kinds.iter().enumerate() {
            match kind {
                BusKind::Slack { .. } => sets.slack.push(i),
                BusKind::Fixed => {
                    sets.fixed.push(i);
                    sets.non_slack.push(i);
                }
                BusKind::Droop(_) => {
                    sets.droop.push(i);
                    sets.non_slack.push(i);
                }
            }
        }
        sets
    }
}

/// A maximal connected sub-network with its own dense numbering.
///
/// Built once per batch; `y_bus` depends on topology only, so it is shared
/// by every scenario solved on the island.
#[derive(Debug, Clone)]
pub struct Island {
    /// Position in the partition, ordered by lowest global bus index.
    pub index: usize,
    /// Local bus index → global bus index.
    pub bus_idx: Vec<usize>,
    /// Local branch index → global branch index.
    pub branch_idx: Vec<usize>,
    pub kinds: Vec<BusKind>,
    pub branches: Vec<LocalBranch>,
    pub y_bus: CscMatrix<Complex64>,
    pub sets: BusSets,
}

/// Scenario data gathered into an island's local numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandScenario {
    /// Scenario index within the batch.
    pub index: usize,
    pub s_bus: DVector<Complex64>,
    pub v_set: DVector<f64>,
    pub droop_gain: DVector<f64>,
}

impl Island {
    pub fn n_bus(&self) -> usize {
        self.bus_idx.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branch_idx.len()
    }

    /// Gathers the island's entries of a global scenario.
    pub fn localize(&self, scenario: &Scenario) -> IslandScenario {
        let n = self.n_bus();
        IslandScenario {
            index: scenario.index,
            s_bus: DVector::from_fn(n, |i, _| scenario.s_bus[self.bus_idx[i]]),
            v_set: DVector::from_fn(n, |i, _| scenario.v_set[self.bus_idx[i]]),
            droop_gain: DVector::from_fn(n, |i, _| scenario.droop_gain[self.bus_idx[i]]),
        }
    }

    /// Flat start: slack buses at their set-point phasor, droop buses at their
    /// voltage set-point, everything else at 1.0 p.u.
    pub fn initial_voltage(&self, scenario: &IslandScenario) -> DVector<Complex64> {
        DVector::from_fn(self.n_bus(), |i, _| match self.kinds[i] {
            BusKind::Slack { va, .. } => Complex64::from_polar(scenario.v_set[i], va),
            BusKind::Droop(_) => Complex64::new(scenario.v_set[i], 0.0),
            BusKind::Fixed => Complex64::new(1.0, 0.0),
        })
    }
}

impl AsRef<Island> for Island {
    fn as_ref(&self) -> &Island {
        self
    }
}

/// Splits a [`NetworkModel`] into islands over its energized branches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IslandPartitioner {
    /// Drop islands made of a single bus.
    pub ignore_single_node_islands: bool,
}

impl IslandPartitioner {
    pub fn new(ignore_single_node_islands: bool) -> Self {
        Self {
            ignore_single_node_islands,
        }
    }

    /// Runs union-find over energized branches and builds one [`Island`] per
    /// connected component of in-service buses.
    ///
    /// A branch belongs to the island of its from-bus; branches that are out
    /// of service, or touch an out-of-service bus, belong to no island.
    pub fn partition(&self, network: &NetworkModel) -> Result<Vec<Island>, ConfigError> {
        network.validate()?;
        let n_bus = network.n_bus();
        let mut uf = NodeMerge::new(n_bus);
        for br in network.branches.iter().filter(|b| network.is_energized(b)) {
            uf.union(br.from, br.to);
        }

        // root -> ordered member list; roots are visited by lowest member index
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of_root = vec![usize::MAX; n_bus];
        for bus in (0..n_bus).filter(|&b| network.buses[b].in_service) {
            let root = uf.find(bus);
            if group_of_root[root] == usize::MAX {
                group_of_root[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[group_of_root[root]].push(bus);
        }
        if self.ignore_single_node_islands {
            groups.retain(|g| g.len() > 1);
        }
        if groups.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }

        let mut local_of = vec![usize::MAX; n_bus];
        let mut island_of = vec![usize::MAX; n_bus];
        for (island, members) in groups.iter().enumerate() {
            for (local, &bus) in members.iter().enumerate() {
                local_of[bus] = local;
                island_of[bus] = island;
            }
        }

        let mut branch_groups: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];
        for (idx, br) in network.branches.iter().enumerate() {
            if network.is_energized(br) && island_of[br.from] != usize::MAX {
                branch_groups[island_of[br.from]].push(idx);
            }
        }

        let islands = groups
            .into_iter()
            .zip(branch_groups)
            .enumerate()
            .map(|(index, (bus_idx, branch_idx))| {
                let branches: Vec<LocalBranch> = branch_idx
                    .iter()
                    .map(|&k| {
                        let br = &network.branches[k];
                        LocalBranch {
                            from: local_of[br.from],
                            to: local_of[br.to],
                            y_series: br.y_series,
                            y_shunt: br.y_shunt,
                            rating: br.rating,
                        }
                    })
                    .collect();
                let kinds: Vec<BusKind> = bus_idx.iter().map(|&b| network.buses[b].kind).collect();
                let shunts: Vec<Complex64> =
                    bus_idx.iter().map(|&b| network.buses[b].y_shunt).collect();
                let y_bus = create_y_bus(bus_idx.len(), &branches, &shunts);
                let sets = BusSets::from_kinds(&kinds);
                debug!(
                    island = index,
                    buses = bus_idx.len(),
                    branches = branch_idx.len(),
                    slack = sets.slack.len(),
                    droop = sets.droop.len(),
                    "island built"
                );
                Island {
                    index,
                    bus_idx,
                    branch_idx,
                    kinds,
                    branches,
                    y_bus,
                    sets,
                }
            })
            .collect();
        Ok(islands)
    }
}
