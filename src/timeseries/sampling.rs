//! Monte Carlo and Latin Hypercube sampling of bus injections.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::replay::TimeSeriesProfile;
use super::{Scenario, ScenarioSource};
use crate::basic::island::Island;
use crate::basic::network::NetworkModel;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMethod {
    /// Independent uniform draws.
    MonteCarlo,
    /// One draw per equal-probability stratum and dimension.
    #[default]
    LatinHypercube,
}

/// Uniform injection distribution `mean · (1 ± spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjectionDistribution {
    pub mean: Complex64,
    /// Relative half-width of the range.
    pub spread: f64,
}

impl InjectionDistribution {
    pub fn new(mean: Complex64, spread: f64) -> Self {
        Self { mean, spread }
    }

    /// Maps a unit sample `u ∈ [0, 1)` onto the distribution.
    #[inline]
    pub fn sample(&self, u: f64) -> Complex64 {
        self.mean * (1.0 + self.spread * (2.0 * u - 1.0))
    }

    /// Base-case injections with a common relative spread.
    pub fn from_network(network: &NetworkModel, spread: f64) -> Vec<Self> {
        network.buses.iter().map(|b| Self::new(b.s_inj, spread)).collect()
    }

    /// Estimates each bus's distribution from a recorded profile: mean
    /// injection and relative half-range of the injection magnitude.
    pub fn from_profile(profile: &TimeSeriesProfile) -> Vec<Self> {
        let steps = profile.steps().max(1) as f64;
        (0..profile.n_bus())
            .map(|b| {
                let series = (0..profile.steps()).map(|t| Complex64::new(profile.p[(t, b)], profile.q[(t, b)]));
                let mean = series.clone().sum::<Complex64>() / steps;
                let (lo, hi) = series.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                    (lo.min(s.norm()), hi.max(s.norm()))
                });
                let spread = if mean.norm() > f64::EPSILON && hi >= lo {
                    0.5 * (hi - lo) / mean.norm()
                } else {
                    0.0
                };
                Self::new(mean, spread)
            })
            .collect()
    }
}

/// `points × dims` Latin Hypercube design on the unit cube.
///
/// Each column holds exactly one value in every stratum `[k/N, (k+1)/N)`;
/// the stratum order is an independent random permutation per column.
pub fn latin_hypercube<R: Rng + ?Sized>(points: usize, dims: usize, rng: &mut R) -> DMatrix<f64> {
    let mut design = DMatrix::zeros(points, dims);
    let n = points as f64;
    let mut perm: Vec<usize> = (0..points).collect();
    for d in 0..dims {
        perm.shuffle(rng);
        for (k, &stratum) in perm.iter().enumerate() {
            design[(k, d)] = (stratum as f64 + rng.gen_range(0.0..1.0)) / n;
        }
    }
    design
}

/// `points × dims` independent uniform draws on the unit cube.
pub fn monte_carlo<R: Rng + ?Sized>(points: usize, dims: usize, rng: &mut R) -> DMatrix<f64> {
    DMatrix::from_fn(points, dims, |_, _| rng.gen_range(0.0..1.0))
}

/// Sampled scenarios over all islands of a network.
///
/// Each island draws its own unit design from a generator seeded with
/// `seed + island.index`, over its non-slack buses only. Slack buses and
/// buses outside every island keep their mean injection. The designs are
/// drawn once; scenarios are assembled on demand.
#[derive(Debug, Clone)]
pub struct SampledSource {
    template: Scenario,
    distributions: Vec<InjectionDistribution>,
    /// Global indices of the sampled buses, per island.
    sampled_buses: Vec<Vec<usize>>,
    designs: Vec<DMatrix<f64>>,
    points: usize,
    cursor: usize,
}

impl SampledSource {
    pub fn new<I: AsRef<Island>>(
        network: &NetworkModel,
        islands: &[I],
        distributions: Vec<InjectionDistribution>,
        points: usize,
        method: SamplingMethod,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if distributions.len() != network.n_bus() {
            return Err(ConfigError::DimensionMismatch {
                expected: network.n_bus(),
                actual: distributions.len(),
            });
        }
        let means = DVector::from_iterator(distributions.len(), distributions.iter().map(|d| d.mean));
        let template = Scenario::with_injections(network, 0, None, means);

        let islands: Vec<&Island> = islands.iter().map(|i| i.as_ref()).collect();
        let sampled_buses: Vec<Vec<usize>> = islands
            .iter()
            .map(|island| island.sets.non_slack.iter().map(|&k| island.bus_idx[k]).collect())
            .collect();
        let designs = islands
            .iter()
            .zip(&sampled_buses)
            .map(|(island, buses)| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(island.index as u64));
                match method {
                    SamplingMethod::MonteCarlo => monte_carlo(points, buses.len(), &mut rng),
                    SamplingMethod::LatinHypercube => latin_hypercube(points, buses.len(), &mut rng),
                }
            })
            .collect();
        debug!(points, islands = islands.len(), ?method, seed, "sampling designs drawn");

        Ok(Self {
            template,
            distributions,
            sampled_buses,
            designs,
            points,
            cursor: 0,
        })
    }

    /// Unit design of island `island`, `points × sampled buses`.
    pub fn design(&self, island: usize) -> &DMatrix<f64> {
        &self.designs[island]
    }
}

impl ScenarioSource for SampledSource {
    fn len(&self) -> usize {
        self.points
    }

    fn next(&mut self) -> Option<Scenario> {
        if self.cursor >= self.points {
            return None;
        }
        let t = self.cursor;
        self.cursor += 1;
        let mut scenario = self.template.clone();
        scenario.index = t;
        for (buses, design) in self.sampled_buses.iter().zip(&self.designs) {
            for (d, &bus) in buses.iter().enumerate() {
                scenario.s_bus[bus] = self.distributions[bus].sample(design[(t, d)]);
            }
        }
        Some(scenario)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::island::IslandPartitioner;
    use crate::basic::network::{Branch, Bus};

    #[test]
    fn latin_hypercube_hits_every_stratum_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 50;
        let design = latin_hypercube(n, 4, &mut rng);
        for d in 0..4 {
            let mut strata: Vec<usize> = design.column(d).iter().map(|u| (u * n as f64) as usize).collect();
            strata.sort();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn monte_carlo_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let design = monte_carlo(200, 3, &mut rng);
        assert!(design.iter().all(|u| (0.0..1.0).contains(u)));
    }

    #[test]
    fn distribution_maps_unit_interval_to_range() {
        let dist = InjectionDistribution::new(Complex64::new(-0.2, -0.1), 0.5);
        assert_eq!(dist.sample(0.5), Complex64::new(-0.2, -0.1));
        assert!((dist.sample(0.0) - Complex64::new(-0.1, -0.05)).norm() < 1e-12);
    }

    #[test]
    fn profile_estimate_uses_mean_and_half_range() {
        let profile = TimeSeriesProfile::new(
            vec![0.0, 1.0],
            DMatrix::from_row_slice(2, 1, &[-0.1, -0.3]),
            DMatrix::zeros(2, 1),
        )
        .unwrap();
        let dist = InjectionDistribution::from_profile(&profile);
        assert_eq!(dist[0].mean, Complex64::new(-0.2, 0.0));
        assert!((dist[0].spread - 0.5).abs() < 1e-12);
    }

    fn two_island_network() -> (NetworkModel, Vec<Island>) {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("s1", 1.0));
        net.add_bus(Bus::fixed("l1", Complex64::new(-0.1, 0.0)));
        net.add_bus(Bus::slack("s2", 1.0));
        net.add_bus(Bus::fixed("l2", Complex64::new(-0.2, 0.0)));
        net.add_branch(Branch::from_impedance("a", 0, 1, 0.05, 0.0));
        net.add_branch(Branch::from_impedance("b", 2, 3, 0.05, 0.0));
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        (net, islands)
    }

    #[test]
    fn sampled_source_is_restartable_and_leaves_slack_alone() {
        let (net, islands) = two_island_network();
        let dists = InjectionDistribution::from_network(&net, 0.2);
        let mut source = SampledSource::new(&net, &islands, dists, 10, SamplingMethod::LatinHypercube, 42).unwrap();
        let first: Vec<Scenario> = std::iter::from_fn(|| source.next()).collect();
        assert_eq!(first.len(), 10);
        source.reset();
        let second: Vec<Scenario> = std::iter::from_fn(|| source.next()).collect();
        assert_eq!(first, second);
        for s in &first {
            assert_eq!(s.s_bus[0], Complex64::new(0.0, 0.0));
            assert!(s.s_bus[1].re <= -0.08 && s.s_bus[1].re >= -0.12);
            assert!(s.s_bus[3].re <= -0.16 && s.s_bus[3].re >= -0.24);
        }
        assert_eq!(source.design(0).shape(), (10, 1));
    }

    #[test]
    fn islands_draw_independent_designs() {
        let (net, islands) = two_island_network();
        let dists = InjectionDistribution::from_network(&net, 0.2);
        let source = SampledSource::new(&net, &islands, dists, 8, SamplingMethod::MonteCarlo, 3).unwrap();
        assert_ne!(source.design(0), source.design(1));
    }
}
