//! Recorded time series and their replay.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::debug;

use super::{Scenario, ScenarioSource};
use crate::basic::network::NetworkModel;
use crate::error::ConfigError;

/// Per-bus active/reactive injection profiles, one row per time step.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesProfile {
    pub time: Vec<f64>,
    /// `steps × n_bus` active injections (p.u.).
    pub p: DMatrix<f64>,
    /// `steps × n_bus` reactive injections (p.u.).
    pub q: DMatrix<f64>,
}

enum Column {
    P(usize),
    Q(usize),
}

impl TimeSeriesProfile {
    pub fn new(time: Vec<f64>, p: DMatrix<f64>, q: DMatrix<f64>) -> Result<Self, ConfigError> {
        if p.shape() != q.shape() || p.nrows() != time.len() {
            return Err(ConfigError::Profile(format!(
                "{} time stamps, P is {:?}, Q is {:?}",
                time.len(),
                p.shape(),
                q.shape()
            )));
        }
        Ok(Self { time, p, q })
    }

    pub fn steps(&self) -> usize {
        self.time.len()
    }

    pub fn n_bus(&self) -> usize {
        self.p.ncols()
    }

    /// Injections of step `t`.
    pub fn s_bus(&self, t: usize) -> DVector<Complex64> {
        DVector::from_fn(self.n_bus(), |b, _| Complex64::new(self.p[(t, b)], self.q[(t, b)]))
    }

    /// Reads a profile with header `time,<bus>_p,<bus>_q,...`.
    ///
    /// Columns may appear in any order; buses without a column get zero
    /// injection.
    pub fn from_csv_reader<R: Read>(reader: R, n_bus: usize) -> Result<Self, ConfigError> {
        let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.get(0) != Some("time") {
            return Err(ConfigError::Profile("first column must be 'time'".into()));
        }
        let columns = headers
            .iter()
            .skip(1)
            .map(|h| parse_column(h, n_bus))
            .collect::<Result<Vec<_>, _>>()?;

        let mut time = Vec::new();
        let mut p_rows = Vec::new();
        let mut q_rows = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let mut values = record.iter().map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|e| ConfigError::Profile(format!("row {row}: '{field}': {e}")))
            });
            let Some(t) = values.next() else {
                continue;
            };
            time.push(t?);
            let mut p = vec![0.0; n_bus];
            let mut q = vec![0.0; n_bus];
            for (col, value) in columns.iter().zip(values) {
                match col {
                    Column::P(b) => p[*b] = value?,
                    Column::Q(b) => q[*b] = value?,
                }
            }
            p_rows.extend(p);
            q_rows.extend(q);
        }
        let steps = time.len();
        debug!(steps, n_bus, "profile loaded");
        Self::new(
            time,
            DMatrix::from_row_slice(steps, n_bus, &p_rows),
            DMatrix::from_row_slice(steps, n_bus, &q_rows),
        )
    }

    pub fn from_csv_path(path: impl AsRef<Path>, n_bus: usize) -> Result<Self, ConfigError> {
        Self::from_csv_reader(File::open(path)?, n_bus)
    }
}

fn parse_column(header: &str, n_bus: usize) -> Result<Column, ConfigError> {
    let (bus, kind) = header
        .rsplit_once('_')
        .ok_or_else(|| ConfigError::Profile(format!("column '{header}' is not '<bus>_p' or '<bus>_q'")))?;
    let bus: usize = bus
        .parse()
        .map_err(|_| ConfigError::Profile(format!("column '{header}': bad bus index")))?;
    if bus >= n_bus {
        return Err(ConfigError::BusOutOfRange { bus, n_bus });
    }
    match kind {
        "p" => Ok(Column::P(bus)),
        "q" => Ok(Column::Q(bus)),
        _ => Err(ConfigError::Profile(format!("column '{header}': expected _p or _q"))),
    }
}

/// Replays a fixed list of scenarios in order, optionally restricted to a
/// `[start, end)` window. Scenario indices are relative to the window.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    scenarios: Vec<Scenario>,
    start: usize,
    end: usize,
    cursor: usize,
}

impl ReplaySource {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        let end = scenarios.len();
        Self {
            scenarios,
            start: 0,
            end,
            cursor: 0,
        }
    }

    /// One scenario per profile step, with the network's droop set-points.
    pub fn from_profile(network: &NetworkModel, profile: &TimeSeriesProfile) -> Result<Self, ConfigError> {
        if profile.n_bus() != network.n_bus() {
            return Err(ConfigError::DimensionMismatch {
                expected: network.n_bus(),
                actual: profile.n_bus(),
            });
        }
        let scenarios = (0..profile.steps())
            .map(|t| Scenario::with_injections(network, t, Some(profile.time[t]), profile.s_bus(t)))
            .collect();
        Ok(Self::new(scenarios))
    }

    /// Restricts the replay to steps `start..end` of the full list.
    pub fn with_window(mut self, start: usize, end: usize) -> Result<Self, ConfigError> {
        if start > end || end > self.scenarios.len() {
            return Err(ConfigError::Invalid(format!(
                "replay window {start}..{end} outside 0..{}",
                self.scenarios.len()
            )));
        }
        self.start = start;
        self.end = end;
        self.cursor = start;
        Ok(self)
    }
}

impl ScenarioSource for ReplaySource {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn next(&mut self) -> Option<Scenario> {
        if self.cursor >= self.end {
            return None;
        }
        let mut scenario = self.scenarios[self.cursor].clone();
        scenario.index = self.cursor - self.start;
        self.cursor += 1;
        Some(scenario)
    }

    fn reset(&mut self) {
        self.cursor = self.start;
    }
}
