//! Cart-pole dynamics as seen by the reachability solver.

use serde::{Deserialize, Serialize};

use crate::safety::UnsafeRegion;
use crate::state::{STATE_DIM, State};

/// Physical parameters shared by the simulator and the reachability model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicsParams {
    /// Gravitational acceleration magnitude.
    pub gravity: f64,
    /// Largest force magnitude the actuator can apply.
    pub max_control: f64,
    /// Half the pole length.
    pub pole_length: f64,
    pub cart_mass: f64,
    pub pole_mass: f64,
}

impl Default for DynamicsParams {
    fn default() -> Self {
        Self { gravity: 9.8, max_control: 10.0, pole_length: 0.5, cart_mass: 1.0, pole_mass: 0.1 }
    }
}

impl DynamicsParams {
    /// Cart and pole accelerations `(x_acc, theta_acc)` under `force`.
    /// Same equations as the classic Gymnasium cart-pole.
    pub fn accelerations(&self, theta: f64, theta_dot: f64, force: f64) -> (f64, f64) {
        let total_mass = self.cart_mass + self.pole_mass;
        let polemass_length = self.pole_mass * self.pole_length;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let temp = (force + polemass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (self.gravity * sin_theta - cos_theta * temp)
            / (self.pole_length * (4.0 / 3.0 - self.pole_mass * cos_theta * cos_theta / total_mass));
        let x_acc = temp - polemass_length * theta_acc * cos_theta / total_mass;
        (x_acc, theta_acc)
    }
}

/// Per-dimension bound on the additive disturbance `|d_i| <= bound_i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceBounds {
    pub x: f64,
    pub theta: f64,
    pub x_dot: f64,
    pub theta_dot: f64,
}

impl Default for DisturbanceBounds {
    fn default() -> Self { Self { x: 0.0, theta: 0.0, x_dot: 0.02, theta_dot: 0.02 } }
}

impl DisturbanceBounds {
    pub fn to_array(&self) -> [f64; STATE_DIM] { [self.x, self.theta, self.x_dot, self.theta_dot] }
}

/// A differential game the solver can integrate.
///
/// The controller maximizes and the disturbance minimizes `p · f(x, u, d)`;
/// the solver only needs the resulting optimal Hamiltonian and a bound on its
/// sensitivity to each costate component.
pub trait Dynamics {
    fn state_dim(&self) -> usize;

    /// Signed distance to the avoid set, positive where safe.
    fn boundary_fn(&self, state: &[f64]) -> f64;

    /// `max_u min_d p · f(x, u, d)`.
    fn hamiltonian(&self, state: &[f64], costate: &[f64]) -> f64;

    /// Upper bounds on `|dH/dp_i|` at `state`, written to `out`.
    fn partial_max(&self, state: &[f64], out: &mut [f64]);
}

/// Control-affine cart-pole with bounded force and additive disturbance.
///
/// `f(x, u, d) = f0(x) + g(x) u + d` with `|u| <= max_control`.
#[derive(Clone, Debug, PartialEq)]
pub struct CartPoleDynamics {
    pub params: DynamicsParams,
    pub disturbance: DisturbanceBounds,
    pub region: UnsafeRegion,
}

impl CartPoleDynamics {
    pub fn new(params: DynamicsParams, disturbance: DisturbanceBounds, region: UnsafeRegion) -> Self {
        Self { params, disturbance, region }
    }

    /// Drift `f0(x)` and unit-force control gain `g(x)`.
    pub fn drift_and_gain(&self, s: &[f64]) -> ([f64; STATE_DIM], [f64; STATE_DIM]) {
        let (x_dot, theta, theta_dot) = (s[2], s[1], s[3]);
        let (xa0, ta0) = self.params.accelerations(theta, theta_dot, 0.0);
        let (xa1, ta1) = self.params.accelerations(theta, theta_dot, 1.0);
        ([x_dot, theta_dot, xa0, ta0], [0.0, 0.0, xa1 - xa0, ta1 - ta0])
    }
}

impl Dynamics for CartPoleDynamics {
    fn state_dim(&self) -> usize { STATE_DIM }

    fn boundary_fn(&self, state: &[f64]) -> f64 {
        self.region.margin(&State::new(state[0], state[1], state[2], state[3]))
    }

    fn hamiltonian(&self, state: &[f64], costate: &[f64]) -> f64 {
        let (f0, g) = self.drift_and_gain(state);
        let dist = self.disturbance.to_array();
        let mut drift = 0.0;
        let mut gain = 0.0;
        let mut disturbance = 0.0;
        for i in 0..STATE_DIM {
            drift += costate[i] * f0[i];
            gain += costate[i] * g[i];
            disturbance += dist[i] * costate[i].abs();
        }
        drift + self.params.max_control * gain.abs() - disturbance
    }

    fn partial_max(&self, state: &[f64], out: &mut [f64]) {
        let (f0, g) = self.drift_and_gain(state);
        let dist = self.disturbance.to_array();
        for i in 0..STATE_DIM {
            out[i] = f0[i].abs() + self.params.max_control * g[i].abs() + dist[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dyn_default() -> CartPoleDynamics {
        CartPoleDynamics::new(DynamicsParams::default(), DisturbanceBounds::default(), UnsafeRegion::default())
    }

    #[test]
    fn upright_rest_is_an_equilibrium() {
        let d = dyn_default();
        let (f0, g) = d.drift_and_gain(&[0.0, 0.0, 0.0, 0.0]);
        assert!(f0.iter().all(|v| v.abs() < 1e-12));
        // pushing right accelerates the cart right and tips the pole left
        assert!(g[2] > 0.0);
        assert!(g[3] < 0.0);
    }

    #[test]
    fn control_is_affine() {
        let p = DynamicsParams::default();
        let (a0, b0) = p.accelerations(0.4, -1.2, 0.0);
        let (a1, b1) = p.accelerations(0.4, -1.2, 1.0);
        let (a3, b3) = p.accelerations(0.4, -1.2, 3.0);
        assert!((a3 - (a0 + 3.0 * (a1 - a0))).abs() < 1e-12);
        assert!((b3 - (b0 + 3.0 * (b1 - b0))).abs() < 1e-12);
    }

    #[test]
    fn hamiltonian_picks_best_control_and_worst_disturbance() {
        let d = dyn_default();
        let s = [0.1, 0.2, 0.3, -0.4];
        let p: [f64; 4] = [0.5, -1.0, 2.0, 0.25];
        let (f0, g) = d.drift_and_gain(&s);
        let dist = d.disturbance.to_array();
        let mut best = f64::NEG_INFINITY;
        for u in [-d.params.max_control, d.params.max_control] {
            let mut v = 0.0;
            for i in 0..STATE_DIM {
                let di = -dist[i] * p[i].signum();
                v += p[i] * (f0[i] + g[i] * u + di);
            }
            best = best.max(v);
        }
        assert!((d.hamiltonian(&s, &p) - best).abs() < 1e-12);

        let mut alpha = [0.0; STATE_DIM];
        d.partial_max(&s, &mut alpha);
        assert!(alpha.iter().all(|a| *a >= 0.0));
    }

    #[test]
    fn boundary_fn_matches_region_margin() {
        let d = dyn_default();
        assert!(d.boundary_fn(&[0.0, 0.0, 0.0, 0.0]) > 0.0);
        assert!(d.boundary_fn(&[0.0, std::f64::consts::PI, 0.0, 0.0]) < 0.0);
        assert!(d.boundary_fn(&[1.6, 0.0, 0.0, 0.0]) < 0.0);
    }
}
