//! Axis-aligned unsafe region over the cart-pole state.

use serde::{Deserialize, Serialize};

use crate::core::{GymError, Result};
use crate::state::{State, angle_diff, wrap_angle};

/// The set of states the system must avoid.
///
/// A state is unsafe when the cart leaves `[x_min, x_max]`, when either
/// velocity reaches `velocity_max`, or when the angle condition fires. With
/// `theta_in_range == true` the unsafe angles are `[theta_min, theta_max]`;
/// with `false` every angle outside that band is unsafe. Equal `theta_min`
/// and `theta_max` disable the angle condition. Bounds are inclusive-unsafe.
///
/// `velocity_max` bounds both `x_dot` (m/s) and `theta_dot` (rad/s). The two
/// quantities are physically distinct, so a bound tuned for one may be
/// meaningless for the other; pick it with both in mind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsafeRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub velocity_max: f64,
    pub theta_min: f64,
    pub theta_max: f64,
    pub theta_in_range: bool,
}

impl Default for UnsafeRegion {
    fn default() -> Self {
        use std::f64::consts::FRAC_PI_8;
        Self {
            x_min: -1.5,
            x_max: 1.5,
            velocity_max: 100.0,
            theta_min: -FRAC_PI_8,
            theta_max: FRAC_PI_8,
            theta_in_range: false,
        }
    }
}

impl UnsafeRegion {
    pub fn new(
        x_min: f64,
        x_max: f64,
        velocity_max: f64,
        theta_min: f64,
        theta_max: f64,
        theta_in_range: bool,
    ) -> Result<Self> {
        let region = Self { x_min, x_max, velocity_max, theta_min, theta_max, theta_in_range };
        region.validate()?;
        Ok(region)
    }

    /// Reject regions whose bounds are inverted or not finite.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.x_min, self.x_max, self.velocity_max, self.theta_min, self.theta_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(GymError::Config(format!("unsafe region bounds must be finite: {self:?}")));
        }
        if self.x_min > self.x_max {
            return Err(GymError::Config(format!("unsafe x_min {} > x_max {}", self.x_min, self.x_max)));
        }
        if self.velocity_max < 0.0 {
            return Err(GymError::Config(format!("unsafe velocity_max {} < 0", self.velocity_max)));
        }
        if self.theta_min > self.theta_max {
            return Err(GymError::Config(format!(
                "unsafe theta_min {} > theta_max {}",
                self.theta_min, self.theta_max
            )));
        }
        Ok(())
    }

    /// Whether the angle condition takes part in classification.
    pub fn angle_check_enabled(&self) -> bool { self.theta_min != self.theta_max }

    /// Analytic membership test. O(1), no interpolation.
    ///
    /// A state with any non-finite component is unsafe.
    pub fn is_unsafe(&self, state: &State) -> bool {
        if !state.to_array().iter().all(|v| v.is_finite()) {
            return true;
        }
        let theta = wrap_angle(state.theta);
        let position = state.x <= self.x_min || state.x >= self.x_max;
        let velocity = state.x_dot.abs() >= self.velocity_max || state.theta_dot.abs() >= self.velocity_max;
        position || velocity || self.angle_unsafe(theta)
    }

    fn angle_unsafe(&self, theta: f64) -> bool {
        if !self.angle_check_enabled() {
            return false;
        }
        if self.theta_in_range {
            self.theta_min <= theta && theta <= self.theta_max
        } else {
            !(self.theta_min < theta && theta < self.theta_max)
        }
    }

    /// Signed distance-like margin: positive outside the region, negative inside.
    ///
    /// Each constraint contributes its own margin and the smallest one wins.
    /// This is the boundary function that seeds the reachability solve.
    pub fn margin(&self, state: &State) -> f64 {
        let theta = wrap_angle(state.theta);
        let mut m = (state.x - self.x_min)
            .min(self.x_max - state.x)
            .min(self.velocity_max - state.x_dot.abs())
            .min(self.velocity_max - state.theta_dot.abs());
        if self.angle_check_enabled() {
            let band = self.band_margin(theta);
            m = m.min(if self.theta_in_range { -band } else { band });
        }
        m
    }

    /// Signed angular distance to the edge of `[theta_min, theta_max]`,
    /// positive inside the band and negative outside, measured around the circle.
    fn band_margin(&self, theta: f64) -> f64 {
        if self.theta_min <= theta && theta <= self.theta_max {
            (theta - self.theta_min).min(self.theta_max - theta)
        } else {
            -angle_diff(theta, self.theta_min).abs().min(angle_diff(theta, self.theta_max).abs())
        }
    }
}
