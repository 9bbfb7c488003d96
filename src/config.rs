//! Task configuration, loadable from JSON.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{GymError, Result};
use crate::reachability::{CachePolicy, CartPoleDynamics, DisturbanceBounds, DynamicsParams, Grid, SolveConfig};
use crate::rewards::RewardKind;
use crate::safety::{SamplerConfig, UnsafeRegion};
use crate::state::STATE_DIM;

/// Lattice the value function is solved on, axes ordered `(x, theta, x_dot, theta_dot)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub x_range: [f64; 2],
    pub theta_range: [f64; 2],
    pub x_dot_range: [f64; 2],
    pub theta_dot_range: [f64; 2],
    pub resolution: [usize; STATE_DIM],
    pub periodic_dims: Vec<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            x_range: [-1.9, 1.9],
            theta_range: [-PI, PI],
            x_dot_range: [-10.0, 10.0],
            theta_dot_range: [-10.0, 10.0],
            resolution: [51; STATE_DIM],
            periodic_dims: vec![1],
        }
    }
}

impl GridConfig {
    pub fn build(&self) -> Result<Grid> {
        let lo = [self.x_range[0], self.theta_range[0], self.x_dot_range[0], self.theta_dot_range[0]];
        let hi = [self.x_range[1], self.theta_range[1], self.x_dot_range[1], self.theta_dot_range[1]];
        Grid::from_lattice(&lo, &hi, &self.resolution, &self.periodic_dims)
    }
}

/// Episode timing and reward variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub reward: RewardKind,
    /// Seconds per environment step.
    pub control_timestep: f64,
    /// Episode length in seconds.
    pub time_limit: f64,
}

impl Default for TaskConfig {
    fn default() -> Self { Self { reward: RewardKind::Dense, control_timestep: 0.01, time_limit: 10.0 } }
}

impl TaskConfig {
    /// Whole steps per episode, at least one.
    pub fn max_steps(&self) -> u32 { ((self.time_limit / self.control_timestep).round() as u32).max(1) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where solved value functions are kept. `None` disables caching.
    pub directory: Option<PathBuf>,
    pub force_recompute: bool,
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        if self.force_recompute { CachePolicy::Recompute } else { CachePolicy::Reuse }
    }
}

/// Everything needed to build a [`SafeCartPoleEnv`](crate::envs::SafeCartPoleEnv).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeCartPoleConfig {
    pub dynamics: DynamicsParams,
    pub unsafe_region: UnsafeRegion,
    pub disturbance: DisturbanceBounds,
    pub grid: GridConfig,
    pub solve: SolveConfig,
    pub sampler: SamplerConfig,
    pub task: TaskConfig,
    pub cache: CacheConfig,
}

/// Hex digits of the cache key used in file names.
const CACHE_KEY_PREFIX: usize = 16;

/// Reachability inputs that determine the solved value function.
#[derive(Serialize)]
struct CacheKeyInputs<'a> {
    dynamics: &'a DynamicsParams,
    unsafe_region: &'a UnsafeRegion,
    disturbance: &'a DisturbanceBounds,
    grid: &'a GridConfig,
    solve: &'a SolveConfig,
}

impl SafeCartPoleConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> { Ok(serde_json::to_string_pretty(self)?) }

    pub fn validate(&self) -> Result<()> {
        let d = &self.dynamics;
        let physical = [d.gravity, d.max_control, d.pole_length, d.cart_mass, d.pole_mass];
        if physical.iter().any(|v| !v.is_finite()) || d.pole_length <= 0.0 || d.cart_mass <= 0.0 || d.pole_mass < 0.0 {
            return Err(GymError::Config(format!("invalid dynamics parameters: {d:?}")));
        }
        if d.max_control < 0.0 {
            return Err(GymError::Config(format!("max_control must be non-negative, got {}", d.max_control)));
        }
        if self.disturbance.to_array().iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(GymError::Config(format!("disturbance bounds must be finite and >= 0: {:?}", self.disturbance)));
        }
        self.unsafe_region.validate()?;
        self.grid.build()?;
        self.solve.validate()?;
        let t = &self.task;
        if !(t.control_timestep > 0.0 && t.time_limit > 0.0) {
            return Err(GymError::Config(format!(
                "control_timestep and time_limit must be positive, got {} / {}",
                t.control_timestep, t.time_limit
            )));
        }
        let v = self.unsafe_region.velocity_max;
        if v <= self.grid.x_dot_range[1].max(self.grid.theta_dot_range[1]) {
            tracing::debug!(
                velocity_max = v,
                "velocity_max bounds both x_dot and theta_dot and lies inside the velocity grid"
            );
        }
        Ok(())
    }

    pub fn build_grid(&self) -> Result<Grid> { self.grid.build() }

    pub fn dynamics(&self) -> CartPoleDynamics {
        CartPoleDynamics::new(self.dynamics.clone(), self.disturbance.clone(), self.unsafe_region.clone())
    }

    /// Hex SHA-256 of everything the value function depends on.
    ///
    /// Sampler, task and cache settings are excluded; they never change the solve.
    pub fn cache_key(&self) -> Result<String> {
        let inputs = CacheKeyInputs {
            dynamics: &self.dynamics,
            unsafe_region: &self.unsafe_region,
            disturbance: &self.disturbance,
            grid: &self.grid,
            solve: &self.solve,
        };
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&inputs)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Cache file for this configuration, when a cache directory is set.
    pub fn cache_path(&self) -> Result<Option<PathBuf>> {
        match &self.cache.directory {
            Some(dir) => {
                let key = self.cache_key()?;
                Ok(Some(dir.join(format!("safe_cartpole_{}.bin", &key[..CACHE_KEY_PREFIX]))))
            }
            None => Ok(None),
        }
    }
}
