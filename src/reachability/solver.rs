//! Hamilton-Jacobi PDE solver producing value-function snapshots.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::core::{GymError, Result};
use crate::reachability::dynamics::Dynamics;
use crate::reachability::grid::Grid;

/// Numerical accuracy profile.
///
/// | profile   | spatial derivative | time integrator | CFL  |
/// |-----------|--------------------|-----------------|------|
/// | low       | first-order upwind | forward Euler   | 0.75 |
/// | medium    | ENO2               | TVD-RK2         | 0.75 |
/// | high      | ENO2               | TVD-RK3         | 0.75 |
/// | very_high | ENO2               | TVD-RK3         | 0.5  |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Low,
    Medium,
    High,
    #[default]
    VeryHigh,
}

impl Accuracy {
    fn second_order_space(self) -> bool { !matches!(self, Accuracy::Low) }

    fn cfl(self) -> f64 {
        match self {
            Accuracy::VeryHigh => 0.5,
            _ => 0.75,
        }
    }
}

/// External PDE solver contract.
///
/// Returns one snapshot per entry of `times`, the first equal to
/// `initial_values`, each shaped like `grid`.
pub trait Solver {
    fn solve(
        &self,
        dynamics: &dyn Dynamics,
        grid: &Grid,
        initial_values: &ArrayViewD<'_, f64>,
        times: &[f64],
        accuracy: Accuracy,
    ) -> Result<Vec<ArrayD<f64>>>;
}

/// Lax-Friedrichs scheme for the backward reachable tube.
///
/// Integrates `dV/dτ = min(0, H(x, ∇V))` in backward time `τ = -t`, so values
/// never increase: once a state cannot avoid the unsafe set it stays that way.
/// Dissipation is global per axis. Non-periodic boundaries extrapolate the
/// edge slope away from zero, so ghost values keep the sign of the edge.
#[derive(Clone, Debug, Default)]
pub struct LaxFriedrichsSolver {
    /// Log progress at `info` level instead of `debug`.
    pub progress: bool,
}

impl LaxFriedrichsSolver {
    pub fn new() -> Self { Self::default() }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

struct Scheme<'a> {
    dynamics: &'a dyn Dynamics,
    grid: &'a Grid,
    second_order: bool,
    /// Node coordinates, `ndim` per node.
    states: Vec<f64>,
    /// Dissipation coefficient per axis, the grid-wide maximum of `partial_max`.
    alpha: Vec<f64>,
}

impl<'a> Scheme<'a> {
    fn new(dynamics: &'a dyn Dynamics, grid: &'a Grid, accuracy: Accuracy) -> Self {
        let nd = grid.ndim();
        let n = grid.len();
        let mut states = vec![0.0; n * nd];
        let mut alpha = vec![0.0f64; nd];
        let mut local = vec![0.0; nd];
        for flat in 0..n {
            let s = &mut states[flat * nd..(flat + 1) * nd];
            grid.point(flat, s);
            dynamics.partial_max(s, &mut local);
            for (a, l) in alpha.iter_mut().zip(&local) {
                *a = a.max(l.abs());
            }
        }
        Self { dynamics, grid, second_order: accuracy.second_order_space(), states, alpha }
    }

    /// Largest stable step for the given CFL number.
    fn max_step(&self, cfl: f64) -> f64 {
        let rate: f64 = self.alpha.iter().enumerate().map(|(d, a)| a / self.grid.spacing(d)).sum();
        if rate > 0.0 { cfl / rate } else { f64::INFINITY }
    }

    /// Value at `offset` nodes from `flat` along `dim`.
    #[inline]
    fn neighbor(&self, v: &[f64], flat: usize, dim: usize, offset: isize) -> f64 {
        let n = self.grid.shape()[dim] as isize;
        let stride = self.grid.stride(dim);
        let i = self.grid.axis_index(flat, dim);
        let base = flat - i * stride;
        let j = i as isize + offset;
        if self.grid.is_periodic(dim) {
            v[base + j.rem_euclid(n) as usize * stride]
        } else if j < 0 {
            let edge = v[base];
            let inner = v[base + stride];
            ghost(edge, inner, -j)
        } else if j >= n {
            let edge = v[base + (n as usize - 1) * stride];
            let inner = v[base + (n as usize - 2) * stride];
            ghost(edge, inner, j - (n - 1))
        } else {
            v[base + j as usize * stride]
        }
    }

    /// Left and right one-sided derivatives along `dim`.
    fn derivatives(&self, v: &[f64], flat: usize, dim: usize) -> (f64, f64) {
        let dx = self.grid.spacing(dim);
        let v0 = v[flat];
        let vm1 = self.neighbor(v, flat, dim, -1);
        let vp1 = self.neighbor(v, flat, dim, 1);
        let left = (v0 - vm1) / dx;
        let right = (vp1 - v0) / dx;
        if !self.second_order {
            return (left, right);
        }
        let vm2 = self.neighbor(v, flat, dim, -2);
        let vp2 = self.neighbor(v, flat, dim, 2);
        let dx2 = dx * dx;
        let c_m = (v0 - 2.0 * vm1 + vm2) / dx2;
        let c_0 = (vp1 - 2.0 * v0 + vm1) / dx2;
        let c_p = (vp2 - 2.0 * vp1 + v0) / dx2;
        let select = |a: f64, b: f64| if a.abs() <= b.abs() { a } else { b };
        (left + 0.5 * dx * select(c_m, c_0), right - 0.5 * dx * select(c_0, c_p))
    }

    /// `dV/dτ` at every node.
    fn rate(&self, v: &[f64], out: &mut [f64]) {
        let nd = self.grid.ndim();
        let mut costate = vec![0.0; nd];
        let mut spread = vec![0.0; nd];
        for (flat, o) in out.iter_mut().enumerate() {
            for d in 0..nd {
                let (left, right) = self.derivatives(v, flat, d);
                costate[d] = 0.5 * (left + right);
                spread[d] = 0.5 * (right - left);
            }
            let state = &self.states[flat * nd..(flat + 1) * nd];
            let dissipation: f64 = self.alpha.iter().zip(&spread).map(|(a, s)| a * s).sum();
            // backward time flips the sign of the viscosity term
            let h = self.dynamics.hamiltonian(state, &costate) + dissipation;
            *o = h.min(0.0);
        }
    }
}

/// Ghost value `distance` nodes past `edge`, continuing the edge slope away from zero.
#[inline]
fn ghost(edge: f64, inner: f64, distance: isize) -> f64 {
    let sign = if edge < 0.0 { -1.0 } else { 1.0 };
    edge + sign * (edge - inner).abs() * distance as f64
}

fn axpy(out: &mut [f64], x: &[f64], a: f64, y: &[f64]) {
    for ((o, xi), yi) in out.iter_mut().zip(x).zip(y) {
        *o = xi + a * yi;
    }
}

impl LaxFriedrichsSolver {
    fn advance(&self, scheme: &Scheme<'_>, accuracy: Accuracy, v: &mut [f64], dt: f64, k: &mut [f64], stage: &mut [f64]) {
        match accuracy {
            Accuracy::Low => {
                scheme.rate(v, k);
                for (vi, ki) in v.iter_mut().zip(k.iter()) {
                    *vi += dt * ki;
                }
            }
            Accuracy::Medium => {
                scheme.rate(v, k);
                axpy(stage, v, dt, k);
                scheme.rate(stage, k);
                for ((vi, si), ki) in v.iter_mut().zip(stage.iter()).zip(k.iter()) {
                    *vi = 0.5 * *vi + 0.5 * (si + dt * ki);
                }
            }
            Accuracy::High | Accuracy::VeryHigh => {
                scheme.rate(v, k);
                axpy(stage, v, dt, k);
                scheme.rate(stage, k);
                for ((si, vi), ki) in stage.iter_mut().zip(v.iter()).zip(k.iter()) {
                    *si = 0.75 * vi + 0.25 * (*si + dt * ki);
                }
                scheme.rate(stage, k);
                for ((vi, si), ki) in v.iter_mut().zip(stage.iter()).zip(k.iter()) {
                    *vi = *vi / 3.0 + 2.0 / 3.0 * (si + dt * ki);
                }
            }
        }
    }
}

impl Solver for LaxFriedrichsSolver {
    fn solve(
        &self,
        dynamics: &dyn Dynamics,
        grid: &Grid,
        initial_values: &ArrayViewD<'_, f64>,
        times: &[f64],
        accuracy: Accuracy,
    ) -> Result<Vec<ArrayD<f64>>> {
        grid.check_shape(initial_values.shape())?;
        if dynamics.state_dim() != grid.ndim() {
            return Err(GymError::Config(format!(
                "dynamics state dimension {} does not match {}-d grid",
                dynamics.state_dim(),
                grid.ndim()
            )));
        }
        if times.is_empty() {
            return Err(GymError::Config("solve needs at least one time".into()));
        }
        let increasing = times.windows(2).all(|w| w[1] > w[0]);
        let decreasing = times.windows(2).all(|w| w[1] < w[0]);
        if !(increasing || decreasing) {
            return Err(GymError::Config("solve times must be strictly monotonic".into()));
        }

        let scheme = Scheme::new(dynamics, grid, accuracy);
        let max_dt = scheme.max_step(accuracy.cfl());
        let shape = grid.shape().to_vec();
        let mut v: Vec<f64> = initial_values.iter().copied().collect();
        let mut k = vec![0.0; v.len()];
        let mut stage = vec![0.0; v.len()];

        let to_array = |data: Vec<f64>| {
            let found = vec![data.len()];
            ArrayD::from_shape_vec(IxDyn(&shape), data)
                .map_err(|_| GymError::ShapeMismatch { expected: shape.clone(), found })
        };

        let mut snapshots = Vec::with_capacity(times.len());
        snapshots.push(to_array(v.clone())?);
        let intervals = times.len() - 1;
        let mut last_decile = 0;
        for (step, w) in times.windows(2).enumerate() {
            let span = (w[1] - w[0]).abs();
            let substeps = if max_dt.is_finite() { (span / max_dt).ceil().max(1.0) as usize } else { 1 };
            let dt = span / substeps as f64;
            for _ in 0..substeps {
                self.advance(&scheme, accuracy, &mut v, dt, &mut k, &mut stage);
            }
            snapshots.push(to_array(v.clone())?);

            let decile = (step + 1) * 10 / intervals;
            if decile > last_decile {
                last_decile = decile;
                if self.progress {
                    tracing::info!(time = w[1], percent = decile * 10, substeps, "reachability solve progress");
                } else {
                    tracing::debug!(time = w[1], percent = decile * 10, substeps, "reachability solve progress");
                }
            }
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::grid::Dimension;

    /// Uncontrolled 1-d drift toward -x; the avoid set is `x <= 0`.
    struct Drift {
        speed: f64,
    }

    impl Dynamics for Drift {
        fn state_dim(&self) -> usize { 1 }
        fn boundary_fn(&self, s: &[f64]) -> f64 { s[0] }
        fn hamiltonian(&self, _s: &[f64], p: &[f64]) -> f64 { -self.speed * p[0] }
        fn partial_max(&self, _s: &[f64], out: &mut [f64]) { out[0] = self.speed; }
    }

    fn line() -> Grid { Grid::new(vec![Dimension::new(-2.0, 2.0, 81)]).unwrap() }

    #[test]
    fn first_snapshot_is_the_initial_values() {
        let g = line();
        let dynamics = Drift { speed: 1.0 };
        let init = g.map_nodes(|s| dynamics.boundary_fn(s));
        let times = [0.0, -0.25, -0.5];
        let out = LaxFriedrichsSolver::new().solve(&dynamics, &g, &init.view(), &times, Accuracy::Low).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], init);
    }

    #[test]
    fn reachable_tube_grows_against_the_drift() {
        // The boundary x = 0 moves to x = speed * horizon when drifting left.
        let g = line();
        let dynamics = Drift { speed: 1.0 };
        let init = g.map_nodes(|s| dynamics.boundary_fn(s));
        let times = [0.0, -0.5, -1.0];
        for accuracy in [Accuracy::Low, Accuracy::Medium, Accuracy::VeryHigh] {
            let out = LaxFriedrichsSolver::new().solve(&dynamics, &g, &init.view(), &times, accuracy).unwrap();
            let last = out.last().unwrap();
            let at = |x: f64| g.interpolate(&last.view(), &[x]);
            assert!(at(1.5) > 0.0, "{accuracy:?}");
            assert!(at(0.5) < 0.0, "{accuracy:?}");
            assert!((at(0.0) + 1.0).abs() < 0.1, "{accuracy:?}: {}", at(0.0));
        }
    }

    #[test]
    fn values_never_increase() {
        let g = line();
        let dynamics = Drift { speed: 0.7 };
        let init = g.map_nodes(|s| (s[0] * 3.0).sin());
        let times: Vec<f64> = (0..6).map(|i| -0.1 * i as f64).collect();
        let out = LaxFriedrichsSolver::new().solve(&dynamics, &g, &init.view(), &times, Accuracy::High).unwrap();
        for w in out.windows(2) {
            assert!(w[1].iter().zip(w[0].iter()).all(|(b, a)| *b <= *a + 1e-12));
        }
    }

    #[test]
    fn kinked_values_stay_bounded_and_upwind() {
        // V(x, τ) = min over t in [0, τ] of V0(x - speed * t) for V0 = 1 - |x|.
        let g = line();
        let dynamics = Drift { speed: 1.0 };
        let init = g.map_nodes(|s| 1.0 - s[0].abs());
        let times: Vec<f64> = (0..5).map(|i| -0.25 * i as f64).collect();
        let exact = |x: f64| 1.0 - (x - 1.0).abs().max(x.abs());
        let out = LaxFriedrichsSolver::new().solve(&dynamics, &g, &init.view(), &times, Accuracy::VeryHigh).unwrap();
        let last = out.last().unwrap();
        assert!(last.iter().all(|v| v.is_finite() && (-2.5..=1.0).contains(v)));
        for x in [-1.0, -0.5, 1.5] {
            let got = g.interpolate(&last.view(), &[x]);
            assert!((got - exact(x)).abs() < 0.05, "x = {x}: {got} vs {}", exact(x));
        }
    }

    #[test]
    fn ghost_cells_extend_away_from_zero() {
        assert_eq!(ghost(-1.0, -0.5, 1), -1.5);
        assert_eq!(ghost(-1.0, -1.5, 2), -2.0);
        assert_eq!(ghost(2.0, 1.0, 1), 3.0);
        assert_eq!(ghost(2.0, 3.0, 1), 3.0);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let g = line();
        let dynamics = Drift { speed: 1.0 };
        let wrong = ArrayD::<f64>::zeros(IxDyn(&[80]));
        let err = LaxFriedrichsSolver::new().solve(&dynamics, &g, &wrong.view(), &[0.0, -1.0], Accuracy::Low);
        assert!(matches!(err, Err(GymError::ShapeMismatch { .. })));
        let init = g.map_nodes(|s| s[0]);
        let err = LaxFriedrichsSolver::new().solve(&dynamics, &g, &init.view(), &[0.0, -1.0, -0.5], Accuracy::Low);
        assert!(matches!(err, Err(GymError::Config(_))));
    }
}
