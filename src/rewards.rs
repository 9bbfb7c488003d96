//! Smooth tolerance shaping and the cart-pole reward variants.

use serde::{Deserialize, Serialize};

/// Value at margin used when none is given.
pub const DEFAULT_VALUE_AT_MARGIN: f64 = 0.1;

/// Shape of the decay outside the tolerance bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sigmoid {
    Gaussian,
    Quadratic,
    Linear,
}

impl Sigmoid {
    /// Maps a normalized distance `x >= 0` to [0, 1], equal to `value_at_1` at `x = 1`.
    fn eval(self, x: f64, value_at_1: f64) -> f64 {
        match self {
            Sigmoid::Gaussian => {
                let scale = (-2.0 * value_at_1.ln()).sqrt();
                (-0.5 * (x * scale).powi(2)).exp()
            }
            Sigmoid::Quadratic => {
                let scaled = x * (1.0 - value_at_1).sqrt();
                if scaled.abs() < 1.0 { 1.0 - scaled * scaled } else { 0.0 }
            }
            Sigmoid::Linear => {
                let scaled = x * (1.0 - value_at_1);
                if scaled.abs() < 1.0 { 1.0 - scaled } else { 0.0 }
            }
        }
    }
}

/// 1 inside `[lower, upper]`, decaying with distance outside.
///
/// With a zero margin the result is an in-bounds indicator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerance {
    lower: f64,
    upper: f64,
    margin: f64,
    sigmoid: Sigmoid,
    value_at_margin: f64,
}

impl Tolerance {
    pub fn new(lower: f64, upper: f64) -> Self {
        assert!(lower <= upper, "tolerance lower bound {lower} > upper bound {upper}");
        Self { lower, upper, margin: 0.0, sigmoid: Sigmoid::Gaussian, value_at_margin: DEFAULT_VALUE_AT_MARGIN }
    }

    /// Tolerance around a single target value.
    pub fn at(target: f64) -> Self { Self::new(target, target) }

    pub fn margin(mut self, margin: f64) -> Self {
        assert!(margin >= 0.0, "tolerance margin must be non-negative, got {margin}");
        self.margin = margin;
        self
    }

    pub fn sigmoid(mut self, sigmoid: Sigmoid) -> Self {
        self.sigmoid = sigmoid;
        self
    }

    /// Gaussian decay needs a value strictly inside (0, 1); the others accept [0, 1).
    pub fn value_at_margin(mut self, value: f64) -> Self {
        assert!((0.0..1.0).contains(&value), "value_at_margin must lie in [0, 1), got {value}");
        self.value_at_margin = value;
        self
    }

    pub fn eval(&self, x: f64) -> f64 {
        let in_bounds = self.lower <= x && x <= self.upper;
        if in_bounds {
            return 1.0;
        }
        if self.margin == 0.0 {
            return 0.0;
        }
        let distance = if x < self.lower { self.lower - x } else { x - self.upper };
        self.sigmoid.eval(distance / self.margin, self.value_at_margin)
    }
}

/// Reward variant of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Product of smooth upright, centered, small-control and small-velocity terms.
    #[default]
    Dense,
    /// Product of in-bounds indicators for the cart position and pole angle.
    Sparse,
}

const CART_RANGE: (f64, f64) = (-0.25, 0.25);
const ANGLE_COSINE_RANGE: (f64, f64) = (0.995, 1.0);

/// Physical quantities the reward is computed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardInputs {
    pub cart_position: f64,
    pub pole_angle_cosine: f64,
    pub control: f64,
    pub angular_velocity: f64,
}

impl RewardKind {
    pub fn reward(self, inputs: &RewardInputs) -> f64 {
        match self {
            RewardKind::Dense => dense_reward(inputs),
            RewardKind::Sparse => sparse_reward(inputs),
        }
    }
}

pub fn dense_reward(r: &RewardInputs) -> f64 {
    let upright = (r.pole_angle_cosine + 1.0) / 2.0;
    let centered = (1.0 + Tolerance::at(0.0).margin(2.0).eval(r.cart_position)) / 2.0;
    let small_control = Tolerance::at(0.0)
        .margin(1.0)
        .value_at_margin(0.0)
        .sigmoid(Sigmoid::Quadratic)
        .eval(r.control);
    let small_control = (4.0 + small_control) / 5.0;
    let small_velocity = (1.0 + Tolerance::at(0.0).margin(5.0).eval(r.angular_velocity)) / 2.0;
    upright * small_control * small_velocity * centered
}

pub fn sparse_reward(r: &RewardInputs) -> f64 {
    let cart_in_bounds = Tolerance::new(CART_RANGE.0, CART_RANGE.1).eval(r.cart_position);
    let angle_in_bounds = Tolerance::new(ANGLE_COSINE_RANGE.0, ANGLE_COSINE_RANGE.1).eval(r.pole_angle_cosine);
    cart_in_bounds * angle_in_bounds
}
