//! Cart-pole state vector.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of state dimensions `(x, theta, x_dot, theta_dot)`.
pub const STATE_DIM: usize = 4;

/// Cart position, pole angle, cart velocity and pole angular velocity.
///
/// `theta` is measured from upright and always lies in (-π, π]; every
/// constructor wraps it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub x: f64,
    pub theta: f64,
    pub x_dot: f64,
    pub theta_dot: f64,
}

impl State {
    pub fn new(x: f64, theta: f64, x_dot: f64, theta_dot: f64) -> Self {
        Self { x, theta: wrap_angle(theta), x_dot, theta_dot }
    }

    /// Cart centered and pole hanging straight down, at rest.
    pub fn hanging() -> Self { Self::new(0.0, PI, 0.0, 0.0) }

    /// Cart centered and pole upright, at rest.
    pub fn upright() -> Self { Self::new(0.0, 0.0, 0.0, 0.0) }

    pub fn from_array(a: [f64; STATE_DIM]) -> Self { Self::new(a[0], a[1], a[2], a[3]) }

    /// Components in grid order `[x, theta, x_dot, theta_dot]`.
    pub fn to_array(&self) -> [f64; STATE_DIM] { [self.x, self.theta, self.x_dot, self.theta_dot] }
}

/// Wrap an angle into (-π, π].
#[inline]
pub fn wrap_angle(theta: f64) -> f64 {
    let w = (theta + PI).rem_euclid(2.0 * PI) - PI;
    if w <= -PI { w + 2.0 * PI } else { w }
}

/// Signed shortest angular difference `a - b`, in (-π, π].
#[inline]
pub fn angle_diff(a: f64, b: f64) -> f64 { wrap_angle(a - b) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angle_range() {
        assert_eq!(wrap_angle(PI), PI);
        assert_eq!(wrap_angle(-PI), PI);
        assert!((wrap_angle(3.0 * PI).abs() - PI).abs() < 1e-12);
        assert!((wrap_angle(2.0 * PI + 0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_angle(-0.1) + 0.1).abs() < 1e-15);
        for k in -20..20 {
            let w = wrap_angle(k as f64 * 0.77);
            assert!(w > -PI && w <= PI);
        }
    }

    #[test]
    fn constructors_wrap_theta() {
        let s = State::new(0.0, PI + 0.02, 0.0, 0.0);
        assert!((s.theta - (-PI + 0.02)).abs() < 1e-12);
        assert_eq!(State::hanging().to_array(), [0.0, PI, 0.0, 0.0]);
        assert_eq!(State::from_array([1.0, -PI, 2.0, 3.0]).theta, PI);
    }

    #[test]
    fn angle_diff_is_shortest() {
        assert!((angle_diff(PI - 0.1, -PI + 0.1) + 0.2).abs() < 1e-12);
        assert!((angle_diff(0.3, 0.1) - 0.2).abs() < 1e-12);
    }
}
