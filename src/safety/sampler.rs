//! Rejection sampling of certified-safe initial states.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::safety::oracle::SafetyOracle;
use crate::spaces::{BoxSpace, Space};
use crate::state::State;

/// Default number of candidates drawn before falling back.
pub const DEFAULT_RETRY_BUDGET: usize = 1000;

const POSITION_STD: f64 = 0.01;
const VELOCITY_STD: f64 = 0.01;
const BALANCE_X: f64 = 0.1;
const BALANCE_THETA: f64 = 0.034;

#[inline]
fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    std_dev * z
}

/// Where episodes start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Cart near the center, pole near hanging straight down.
    SwingUp,
    /// Cart in a small band around the center, pole near upright.
    #[default]
    Balance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub mode: InitMode,
    pub retry_budget: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self { Self { mode: InitMode::default(), retry_budget: DEFAULT_RETRY_BUDGET } }
}

/// Result of one sampling run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleOutcome {
    /// A candidate passed certification after `attempts` draws.
    Certified { state: State, value: f64, attempts: usize },
    /// The budget ran out; `state` is the deterministic fallback.
    Fallback { state: State, value: f64, attempts: usize },
}

impl SampleOutcome {
    pub fn state(&self) -> State {
        match self {
            SampleOutcome::Certified { state, .. } | SampleOutcome::Fallback { state, .. } => *state,
        }
    }

    /// Certified value of the returned state.
    pub fn value(&self) -> f64 {
        match self {
            SampleOutcome::Certified { value, .. } | SampleOutcome::Fallback { value, .. } => *value,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            SampleOutcome::Certified { attempts, .. } | SampleOutcome::Fallback { attempts, .. } => *attempts,
        }
    }

    pub fn is_fallback(&self) -> bool { matches!(self, SampleOutcome::Fallback { .. }) }
}

/// Draws initial states and keeps the first one the oracle certifies.
#[derive(Clone, Debug)]
pub struct InitialStateSampler {
    mode: InitMode,
    retry_budget: usize,
    balance_band: BoxSpace<f64, 2>,
}

impl InitialStateSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            mode: config.mode,
            retry_budget: config.retry_budget,
            balance_band: BoxSpace::new([-BALANCE_X, -BALANCE_THETA], [BALANCE_X, BALANCE_THETA]),
        }
    }

    pub fn mode(&self) -> InitMode { self.mode }
    pub fn retry_budget(&self) -> usize { self.retry_budget }

    /// The state returned when no candidate is certified, whatever the mode.
    pub fn fallback_state() -> State { State::hanging() }

    /// Draw one uncertified candidate from the mode's proposal distribution.
    pub fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> State {
        let (x, theta) = match self.mode {
            InitMode::SwingUp => (gaussian(rng, POSITION_STD), PI + gaussian(rng, POSITION_STD)),
            InitMode::Balance => {
                let [x, theta] = self.balance_band.sample(rng);
                (x, theta)
            }
        };
        let x_dot = gaussian(rng, VELOCITY_STD);
        let theta_dot = gaussian(rng, VELOCITY_STD);
        State::new(x, theta, x_dot, theta_dot)
    }

    /// Propose candidates until one has a non-negative certified value.
    ///
    /// At most `retry_budget` candidates are evaluated. On exhaustion the
    /// fallback state is returned and a warning is logged; the fallback is the
    /// only way an uncertified state leaves this function.
    pub fn sample<R: Rng + ?Sized>(&self, oracle: &SafetyOracle, rng: &mut R) -> SampleOutcome {
        for attempt in 1..=self.retry_budget {
            let state = self.propose(rng);
            let value = oracle.certified_value(&state);
            if value >= 0.0 {
                return SampleOutcome::Certified { state, value, attempts: attempt };
            }
        }

        let state = Self::fallback_state();
        let value = oracle.certified_value(&state);
        tracing::warn!(
            mode = ?self.mode,
            attempts = self.retry_budget,
            ?state,
            value,
            "no certified initial state within retry budget, using fallback"
        );
        SampleOutcome::Fallback { state, value, attempts: self.retry_budget }
    }
}
