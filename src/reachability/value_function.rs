//! Value-function snapshots and their on-disk cache.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::core::{GymError, Result};
use crate::reachability::dynamics::Dynamics;
use crate::reachability::grid::Grid;
use crate::reachability::solver::{Accuracy, Solver};

/// Mean snapshot difference above which the solve is reported as unconverged.
pub const CONVERGENCE_EPSILON: f64 = 1e-3;

/// Time axis and accuracy of a reachability solve.
///
/// Times run backward from `time_min` to `-time_max` in `time_resolution`
/// evenly spaced snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    pub time_min: f64,
    pub time_max: f64,
    pub time_resolution: usize,
    pub accuracy: Accuracy,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self { time_min: 0.0, time_max: 10.0, time_resolution: 101, accuracy: Accuracy::VeryHigh }
    }
}

impl SolveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_resolution < 2 {
            return Err(GymError::Config(format!("time_resolution must be >= 2, got {}", self.time_resolution)));
        }
        if !(self.time_min.is_finite() && self.time_max.is_finite()) || -self.time_max >= self.time_min {
            return Err(GymError::Config(format!(
                "solve horizon must run backward: time_min {} to -time_max {}",
                self.time_min, -self.time_max
            )));
        }
        Ok(())
    }

    /// `linspace(time_min, -time_max, time_resolution)`.
    pub fn times(&self) -> Vec<f64> {
        let n = self.time_resolution;
        let end = -self.time_max;
        let step = (end - self.time_min) / (n - 1) as f64;
        (0..n).map(|i| if i == n - 1 { end } else { self.time_min + i as f64 * step }).collect()
    }
}

/// Whether an existing cache file may be reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Load the file when present, otherwise solve and write it.
    #[default]
    Reuse,
    /// Always solve and overwrite the file.
    Recompute,
}

/// Outcome of the convergence check on the last two snapshots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Convergence {
    Converged { diff: f64 },
    /// Includes a non-finite difference.
    NotConverged { diff: f64 },
    /// Fewer than two snapshots.
    Unmeasurable,
}

impl Convergence {
    pub fn from_diff(diff: Option<f64>) -> Self {
        match diff {
            None => Convergence::Unmeasurable,
            Some(diff) if diff.abs() <= CONVERGENCE_EPSILON => Convergence::Converged { diff },
            Some(diff) => Convergence::NotConverged { diff },
        }
    }

    pub fn is_converged(self) -> bool { matches!(self, Convergence::Converged { .. }) }
}

/// On-disk layout: a header, then one flat array of shape `(time_resolution, *lattice)`.
#[derive(Serialize, Deserialize)]
struct CacheHeader {
    shape: Vec<usize>,
    times: Vec<f64>,
}

/// Upper bound on the encoded header.
const HEADER_LIMIT: u64 = 1 << 20;

fn cache_codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

/// Read-only sequence of value-function snapshots over a backward time axis.
///
/// The last snapshot is the converged safety value function used at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueFunctionStore {
    times: Vec<f64>,
    snapshots: Vec<ArrayD<f64>>,
}

impl ValueFunctionStore {
    /// Solve the reachability problem for `dynamics` on `grid`.
    pub fn build(dynamics: &dyn Dynamics, grid: &Grid, solver: &dyn Solver, config: &SolveConfig) -> Result<Self> {
        config.validate()?;
        let times = config.times();
        let initial = grid.map_nodes(|s| dynamics.boundary_fn(s));
        tracing::info!(
            nodes = grid.len(),
            snapshots = times.len(),
            horizon = config.time_max,
            accuracy = ?config.accuracy,
            "solving reachability value function"
        );
        let snapshots = solver.solve(dynamics, grid, &initial.view(), &times, config.accuracy)?;
        let store = Self::from_snapshots(grid, times, snapshots)?;
        store.report_convergence();
        Ok(store)
    }

    /// Wrap snapshots produced elsewhere, checking count, shape and finiteness.
    pub fn from_snapshots(grid: &Grid, times: Vec<f64>, snapshots: Vec<ArrayD<f64>>) -> Result<Self> {
        if snapshots.is_empty() || snapshots.len() != times.len() {
            return Err(GymError::Config(format!(
                "expected one snapshot per time ({}), got {}",
                times.len(),
                snapshots.len()
            )));
        }
        for (i, s) in snapshots.iter().enumerate() {
            grid.check_shape(s.shape())?;
            if let Some(bad) = s.iter().find(|v| !v.is_finite()) {
                return Err(GymError::Config(format!("snapshot {i} holds a non-finite value ({bad})")));
            }
        }
        Ok(Self { times, snapshots })
    }

    pub fn times(&self) -> &[f64] { &self.times }
    pub fn snapshots(&self) -> &[ArrayD<f64>] { &self.snapshots }
    pub fn len(&self) -> usize { self.snapshots.len() }
    pub fn is_empty(&self) -> bool { self.snapshots.is_empty() }

    /// Lattice shape of each snapshot.
    pub fn lattice_shape(&self) -> &[usize] { self.snapshots[0].shape() }

    /// The converged value function at the most negative time.
    pub fn terminal_value(&self) -> ArrayViewD<'_, f64> {
        self.snapshots[self.snapshots.len() - 1].view()
    }

    /// Mean of `V[n-2] - V[n-1]` over the lattice, `None` with a single snapshot.
    /// Near zero once the backward reachable tube has stopped growing.
    pub fn convergence_diff(&self) -> Option<f64> {
        let n = self.snapshots.len();
        if n < 2 {
            return None;
        }
        (&self.snapshots[n - 2] - &self.snapshots[n - 1]).mean()
    }

    /// Log the convergence diagnostic and return it; never fails.
    pub fn report_convergence(&self) -> Convergence {
        let verdict = Convergence::from_diff(self.convergence_diff());
        match verdict {
            Convergence::NotConverged { diff } => {
                tracing::warn!(diff, epsilon = CONVERGENCE_EPSILON, "value function has not converged");
            }
            Convergence::Converged { diff } => tracing::info!(diff, "final value function difference"),
            Convergence::Unmeasurable => tracing::info!("single snapshot, convergence not measurable"),
        }
        verdict
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut shape = vec![self.snapshots.len()];
        shape.extend_from_slice(self.lattice_shape());
        let header = CacheHeader { shape, times: self.times.clone() };
        let values: Vec<f64> = self.snapshots.iter().flat_map(|s| s.iter().copied()).collect();
        let mut writer = BufWriter::new(File::create(path)?);
        cache_codec().serialize_into(&mut writer, &header)?;
        cache_codec().serialize_into(&mut writer, &values)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "saved value function cache");
        Ok(())
    }

    /// Restore a cache, failing unless it matches `grid` and `time_resolution`.
    ///
    /// The header is checked before the values are read, and reads are bounded
    /// by the size the expected lattice implies.
    pub fn load<P: AsRef<Path>>(path: P, grid: &Grid, time_resolution: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let header: CacheHeader = cache_codec().with_limit(HEADER_LIMIT).deserialize_from(&mut reader)?;

        let mut expected = vec![time_resolution];
        expected.extend_from_slice(grid.shape());
        if header.shape != expected {
            return Err(GymError::ShapeMismatch { expected, found: header.shape });
        }
        if header.times.len() != time_resolution {
            return Err(GymError::ShapeMismatch { expected: vec![time_resolution], found: vec![header.times.len()] });
        }
        let per_snapshot = grid.len();
        let count = per_snapshot * time_resolution;
        let limit = 8 * (count as u64 + 1);
        let values: Vec<f64> = cache_codec().with_limit(limit).deserialize_from(&mut reader)?;
        if values.len() != count {
            return Err(GymError::ShapeMismatch { expected: vec![count], found: vec![values.len()] });
        }
        let snapshots = values
            .chunks(per_snapshot)
            .map(|chunk| {
                ArrayD::from_shape_vec(IxDyn(grid.shape()), chunk.to_vec()).map_err(|_| GymError::ShapeMismatch {
                    expected: grid.shape().to_vec(),
                    found: vec![chunk.len()],
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(path = %path.display(), "loaded value function cache");
        Self::from_snapshots(grid, header.times, snapshots)
    }

    /// Load `path` when allowed and present, otherwise build and write it.
    pub fn load_or_build<P: AsRef<Path>>(
        path: P,
        policy: CachePolicy,
        dynamics: &dyn Dynamics,
        grid: &Grid,
        solver: &dyn Solver,
        config: &SolveConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if policy == CachePolicy::Reuse && path.exists() {
            let store = Self::load(path, grid, config.time_resolution)?;
            store.report_convergence();
            return Ok(store);
        }
        tracing::info!(path = %path.display(), ?policy, "value function cache miss");
        let store = Self::build(dynamics, grid, solver, config)?;
        store.save(path)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::grid::Dimension;

    fn grid() -> Grid {
        Grid::new(vec![Dimension::new(-1.0, 1.0, 4), Dimension::periodic(0.0, 1.0, 3)]).unwrap()
    }

    fn constant(g: &Grid, v: f64) -> ArrayD<f64> { ArrayD::from_elem(IxDyn(g.shape()), v) }

    #[test]
    fn times_run_backward_to_the_horizon() {
        let c = SolveConfig { time_min: 0.0, time_max: 10.0, time_resolution: 101, accuracy: Accuracy::Low };
        let t = c.times();
        assert_eq!(t.len(), 101);
        assert_eq!(t[0], 0.0);
        assert_eq!(t[100], -10.0);
        assert!((t[1] + 0.1).abs() < 1e-12);
        assert!(SolveConfig { time_resolution: 1, ..c.clone() }.validate().is_err());
        assert!(SolveConfig { time_max: -1.0, ..c }.validate().is_err());
    }

    #[test]
    fn terminal_value_and_convergence() {
        let g = grid();
        let store = ValueFunctionStore::from_snapshots(
            &g,
            vec![0.0, -1.0, -2.0],
            vec![constant(&g, 3.0), constant(&g, 1.0), constant(&g, 0.75)],
        )
        .unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.terminal_value().iter().all(|v| *v == 0.75));
        assert!((store.convergence_diff().unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn convergence_verdict_flags_large_and_non_finite_differences() {
        assert!(Convergence::from_diff(Some(5e-4)).is_converged());
        assert_eq!(Convergence::from_diff(Some(0.25)), Convergence::NotConverged { diff: 0.25 });
        assert!(matches!(Convergence::from_diff(Some(f64::NAN)), Convergence::NotConverged { .. }));
        assert!(matches!(Convergence::from_diff(Some(f64::NEG_INFINITY)), Convergence::NotConverged { .. }));
        assert_eq!(Convergence::from_diff(None), Convergence::Unmeasurable);

        let g = grid();
        let slow = ValueFunctionStore::from_snapshots(&g, vec![0.0, -1.0], vec![constant(&g, 1.0), constant(&g, 0.5)])
            .unwrap();
        assert_eq!(slow.report_convergence(), Convergence::NotConverged { diff: 0.5 });
        let single = ValueFunctionStore::from_snapshots(&g, vec![0.0], vec![constant(&g, 1.0)]).unwrap();
        assert_eq!(single.report_convergence(), Convergence::Unmeasurable);
    }

    #[test]
    fn non_finite_snapshots_are_rejected() {
        let g = grid();
        let mut poisoned = constant(&g, -1.0);
        poisoned[IxDyn(&[2, 1])] = f64::NAN;
        assert!(matches!(
            ValueFunctionStore::from_snapshots(&g, vec![0.0, -1.0], vec![constant(&g, 1.0), poisoned]),
            Err(GymError::Config(_))
        ));
        let overflowed = constant(&g, f64::NEG_INFINITY);
        assert!(ValueFunctionStore::from_snapshots(&g, vec![0.0], vec![overflowed]).is_err());
    }

    #[test]
    fn save_then_load_restores_the_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vf.bin");
        let g = grid();
        let store = ValueFunctionStore::from_snapshots(&g, vec![0.0, -1.0], vec![constant(&g, 2.0), constant(&g, -0.5)])
            .unwrap();
        store.save(&path).unwrap();
        assert_eq!(ValueFunctionStore::load(&path, &g, 2).unwrap(), store);
        assert!(matches!(ValueFunctionStore::load(&path, &g, 3), Err(GymError::ShapeMismatch { .. })));
    }

    #[test]
    fn oversized_value_block_is_rejected_before_allocating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.bin");
        let g = grid();
        let header = CacheHeader { shape: vec![2, 4, 3], times: vec![0.0, -1.0] };
        let mut bytes = cache_codec().serialize(&header).unwrap();
        // length prefix claiming far more values than the lattice holds
        bytes.extend_from_slice(&(1u64 << 60).to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(ValueFunctionStore::load(&path, &g, 2), Err(GymError::Cache(_))));
    }

    #[test]
    fn truncated_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.bin");
        let g = grid();
        let store = ValueFunctionStore::from_snapshots(&g, vec![0.0, -1.0], vec![constant(&g, 2.0), constant(&g, -0.5)])
            .unwrap();
        store.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 12]).unwrap();
        assert!(ValueFunctionStore::load(&path, &g, 2).is_err());
    }

    #[test]
    fn from_snapshots_rejects_inconsistent_input() {
        let g = grid();
        let wrong = ArrayD::from_elem(IxDyn(&[4, 4]), 0.0);
        assert!(matches!(
            ValueFunctionStore::from_snapshots(&g, vec![0.0], vec![wrong]),
            Err(GymError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ValueFunctionStore::from_snapshots(&g, vec![0.0, -1.0], vec![constant(&g, 1.0)]),
            Err(GymError::Config(_))
        ));
    }
}
