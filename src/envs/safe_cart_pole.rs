use crate::config::SafeCartPoleConfig;
use crate::core::{Env, GymError, Info, Result, Step};
use crate::envs::physics::{CartPolePhysics, EulerCartPole};
use crate::reachability::{Solver, ValueFunctionStore};
use crate::rewards::{RewardInputs, RewardKind};
use crate::safety::{InitMode, InitialStateSampler, SafetyOracle, SampleOutcome, SamplerConfig};
use crate::spaces::BoxSpace;
use crate::utils::rng::{RngStream, rng_from_seed};

/// RGBA used for the cart and pole while the state is safe.
pub const SAFE_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
/// RGBA used for the cart and pole while the state is unsafe.
pub const UNSAFE_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

const DEFAULT_SEED: u64 = 1_234_567;

/// Where an episode stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodePhase {
    /// Constructed, never reset.
    Uninitialized,
    Running,
    /// The time limit was reached; `reset` starts a new episode.
    Terminated,
}

/// Cart and pole colors reflecting the last safety classification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafetyIndicator {
    pub cart: [f32; 4],
    pub pole: [f32; 4],
}

impl SafetyIndicator {
    pub fn for_state(is_unsafe: bool) -> Self {
        let c = if is_unsafe { UNSAFE_COLOR } else { SAFE_COLOR };
        Self { cart: c, pole: c }
    }
}

impl Default for SafetyIndicator {
    fn default() -> Self { Self::for_state(false) }
}

/// Observation: `position = [x, cos theta, sin theta]`, `velocity = [x_dot, theta_dot]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafeCartPoleObs {
    pub position: [f64; 3],
    pub velocity: [f64; 2],
}

/// Cart-pole episodes that always start from a certified-safe state.
///
/// Reset draws the initial state through the [`InitialStateSampler`]; every
/// step is classified with the analytic unsafe region and the result is
/// reported in the `unsafe` info key and the [`SafetyIndicator`]. Safety never
/// alters the dynamics or ends an episode; only the time limit does, reported
/// as truncation.
pub struct SafeCartPoleEnv<P: CartPolePhysics = EulerCartPole> {
    physics: P,
    oracle: SafetyOracle,
    sampler: InitialStateSampler,
    reward: RewardKind,
    action_space: BoxSpace<f64, 1>,
    rng: RngStream,
    phase: EpisodePhase,
    indicator: SafetyIndicator,
    last_unsafe: bool,
    fallback_count: usize,
}

impl<P: CartPolePhysics> SafeCartPoleEnv<P> {
    pub fn new(physics: P, oracle: SafetyOracle, sampler: &SamplerConfig, reward: RewardKind, seed: u64) -> Self {
        Self {
            physics,
            oracle,
            sampler: InitialStateSampler::new(sampler),
            reward,
            action_space: BoxSpace::new([-1.0], [1.0]),
            rng: rng_from_seed(seed),
            phase: EpisodePhase::Uninitialized,
            indicator: SafetyIndicator::default(),
            last_unsafe: false,
            fallback_count: 0,
        }
    }

    pub fn physics(&self) -> &P { &self.physics }
    pub fn oracle(&self) -> &SafetyOracle { &self.oracle }
    pub fn sampler(&self) -> &InitialStateSampler { &self.sampler }
    pub fn reward_kind(&self) -> RewardKind { self.reward }
    pub fn action_space(&self) -> &BoxSpace<f64, 1> { &self.action_space }
    pub fn phase(&self) -> EpisodePhase { self.phase }
    pub fn indicator(&self) -> SafetyIndicator { self.indicator }

    /// Analytic classification of the current state, as of the last reset or step.
    pub fn is_unsafe(&self) -> bool { self.last_unsafe }

    /// Number of resets that ended on the fallback state.
    pub fn fallback_count(&self) -> usize { self.fallback_count }

    fn observe(&mut self) -> SafeCartPoleObs {
        self.last_unsafe = self.oracle.is_unsafe_fast(&self.physics.state());
        self.indicator = SafetyIndicator::for_state(self.last_unsafe);
        SafeCartPoleObs { position: self.physics.bounded_position(), velocity: self.physics.velocity() }
    }

    fn reward_inputs(&self) -> RewardInputs {
        RewardInputs {
            cart_position: self.physics.cart_position(),
            pole_angle_cosine: self.physics.pole_angle_cosine(),
            control: self.physics.control(),
            angular_velocity: self.physics.angular_vel(),
        }
    }
}

impl SafeCartPoleEnv<EulerCartPole> {
    /// Build the whole task, solving the value function or reusing its cache.
    pub fn from_config(config: &SafeCartPoleConfig, solver: &dyn Solver, seed: u64) -> Result<Self> {
        config.validate()?;
        let grid = config.build_grid()?;
        let dynamics = config.dynamics();
        let store = match config.cache_path()? {
            Some(path) => ValueFunctionStore::load_or_build(
                path,
                config.cache.policy(),
                &dynamics,
                &grid,
                solver,
                &config.solve,
            )?,
            None => ValueFunctionStore::build(&dynamics, &grid, solver, &config.solve)?,
        };
        let oracle = SafetyOracle::new(grid, store, config.unsafe_region.clone())?;
        let physics = EulerCartPole::new(config.dynamics.clone(), config.task.control_timestep, config.task.max_steps());
        Ok(Self::new(physics, oracle, &config.sampler, config.task.reward, seed))
    }

    fn task(config: &SafeCartPoleConfig, mode: InitMode, reward: RewardKind, solver: &dyn Solver) -> Result<Self> {
        let mut config = config.clone();
        config.sampler.mode = mode;
        config.task.reward = reward;
        Self::from_config(&config, solver, DEFAULT_SEED)
    }

    /// Start near upright, dense reward.
    pub fn balance(config: &SafeCartPoleConfig, solver: &dyn Solver) -> Result<Self> {
        Self::task(config, InitMode::Balance, RewardKind::Dense, solver)
    }

    pub fn balance_sparse(config: &SafeCartPoleConfig, solver: &dyn Solver) -> Result<Self> {
        Self::task(config, InitMode::Balance, RewardKind::Sparse, solver)
    }

    /// Start hanging down, dense reward.
    pub fn swingup(config: &SafeCartPoleConfig, solver: &dyn Solver) -> Result<Self> {
        Self::task(config, InitMode::SwingUp, RewardKind::Dense, solver)
    }

    pub fn swingup_sparse(config: &SafeCartPoleConfig, solver: &dyn Solver) -> Result<Self> {
        Self::task(config, InitMode::SwingUp, RewardKind::Sparse, solver)
    }
}

impl<P: CartPolePhysics> Env for SafeCartPoleEnv<P> {
    type Obs = SafeCartPoleObs;
    type Act = [f64; 1];

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        if let Some(s) = seed { self.rng = rng_from_seed(s); }

        let outcome = self.sampler.sample(&self.oracle, &mut self.rng);
        self.physics.set_state(outcome.state());
        self.physics.initialize_episode();
        if let SampleOutcome::Fallback { .. } = outcome {
            self.fallback_count += 1;
        }
        self.phase = EpisodePhase::Running;

        let obs = self.observe();
        tracing::debug!(
            state = ?outcome.state(),
            value = outcome.value(),
            attempts = outcome.attempts(),
            fallback = outcome.is_fallback(),
            "episode reset"
        );

        let mut info = Info::new();
        info.insert("init_value", outcome.value());
        info.insert("init_attempts", outcome.attempts());
        info.insert("init_fallback", outcome.is_fallback());
        info.insert("unsafe", self.last_unsafe);
        (obs, info)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        match self.phase {
            EpisodePhase::Running => {}
            EpisodePhase::Uninitialized => return Err(GymError::NotReady("call reset before step".into())),
            EpisodePhase::Terminated => return Err(GymError::NotReady("episode has ended, call reset".into())),
        }
        let [a] = action;
        if !a.is_finite() {
            return Err(GymError::InvalidAction(format!("action must be finite, got {a}")));
        }

        self.physics.step(a);
        let obs = self.observe();
        let reward = self.reward.reward(&self.reward_inputs());

        let truncated = self.physics.time_limit_reached();
        if truncated {
            self.phase = EpisodePhase::Terminated;
            tracing::debug!("time limit reached, episode terminated");
        }

        let mut info = Info::new();
        info.insert("unsafe", self.last_unsafe);
        Ok(Step::new(obs, reward, false, truncated, info))
    }
}
