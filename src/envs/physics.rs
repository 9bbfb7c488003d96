use crate::reachability::DynamicsParams;
use crate::state::State;

/// Physics collaborator driven by [`SafeCartPoleEnv`](super::SafeCartPoleEnv).
pub trait CartPolePhysics {
    fn state(&self) -> State;
    fn set_state(&mut self, state: State);

    /// Advance one control step with a normalized action in `[-1, 1]`.
    fn step(&mut self, action: f64);

    /// Last normalized action applied.
    fn control(&self) -> f64;

    fn time_limit_reached(&self) -> bool;

    /// Per-episode bookkeeping after the initial state has been written.
    fn initialize_episode(&mut self);

    /// `[x, cos theta, sin theta]`.
    fn bounded_position(&self) -> [f64; 3] {
        let s = self.state();
        [s.x, s.theta.cos(), s.theta.sin()]
    }

    /// `[x_dot, theta_dot]`.
    fn velocity(&self) -> [f64; 2] {
        let s = self.state();
        [s.x_dot, s.theta_dot]
    }

    fn cart_position(&self) -> f64 { self.state().x }
    fn pole_angle_cosine(&self) -> f64 { self.state().theta.cos() }
    fn angular_vel(&self) -> f64 { self.state().theta_dot }
}

/// Explicit-Euler cart-pole with a continuous force actuator.
///
/// Force is `clamp(action, -1, 1) * max_control`; theta is measured from upright.
#[derive(Clone, Debug)]
pub struct EulerCartPole {
    params: DynamicsParams,
    tau: f64,
    max_steps: u32,
    steps: u32,
    control: f64,
    state: State,
}

impl EulerCartPole {
    pub fn new(params: DynamicsParams, tau: f64, max_steps: u32) -> Self {
        Self { params, tau, max_steps, steps: 0, control: 0.0, state: State::hanging() }
    }
}

impl Default for EulerCartPole {
    fn default() -> Self { Self::new(DynamicsParams::default(), 0.01, 1000) }
}

impl CartPolePhysics for EulerCartPole {
    fn state(&self) -> State { self.state }
    fn set_state(&mut self, state: State) { self.state = state; }

    fn step(&mut self, action: f64) {
        self.control = action.clamp(-1.0, 1.0);
        let force = self.control * self.params.max_control;
        let State { x, theta, x_dot, theta_dot } = self.state;
        let (x_acc, theta_acc) = self.params.accelerations(theta, theta_dot, force);

        let tau = self.tau;
        self.state = State::new(x + tau * x_dot, theta + tau * theta_dot, x_dot + tau * x_acc, theta_dot + tau * theta_acc);
        self.steps += 1;
    }

    fn control(&self) -> f64 { self.control }

    fn time_limit_reached(&self) -> bool { self.steps >= self.max_steps }

    fn initialize_episode(&mut self) {
        self.steps = 0;
        self.control = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upright_equilibrium_is_stationary() {
        let mut p = EulerCartPole::default();
        p.set_state(State::upright());
        for _ in 0..10 {
            p.step(0.0);
        }
        assert_eq!(p.state(), State::upright());
        assert_eq!(p.bounded_position(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn force_is_clamped_and_pushes_the_cart() {
        let mut a = EulerCartPole::default();
        let mut b = EulerCartPole::default();
        a.set_state(State::upright());
        b.set_state(State::upright());
        a.step(1.0);
        b.step(5.0);
        assert_eq!(b.control(), 1.0);
        assert_eq!(a.state(), b.state());
        // first Euler step only moves velocities
        a.step(1.0);
        assert!(a.state().x > 0.0 && a.state().x_dot > 0.0);
        assert!(a.state().theta_dot < 0.0);
    }

    #[test]
    fn time_limit_counts_steps_from_episode_start() {
        let mut p = EulerCartPole::new(DynamicsParams::default(), 0.01, 3);
        p.initialize_episode();
        for _ in 0..2 {
            p.step(0.0);
            assert!(!p.time_limit_reached());
        }
        p.step(0.0);
        assert!(p.time_limit_reached());
        p.initialize_episode();
        assert!(!p.time_limit_reached());
        assert_eq!(p.control(), 0.0);
    }

    #[test]
    fn theta_stays_wrapped() {
        let mut p = EulerCartPole::default();
        p.set_state(State::new(0.0, std::f64::consts::PI - 1e-4, 0.0, 5.0));
        p.step(0.0);
        assert!(p.state().theta < 0.0 && p.state().theta > -std::f64::consts::PI);
    }
}
