//! Roll out safety-certified cart-pole episodes.
//!
//! Usage:
//!   safe_cartpole --resolution 21 --episodes 10 --task swing-up
//!   safe_cartpole --config task.json --cache-dir ./cache -v

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use safe_gymnasium::utils::SeedSequence;
use safe_gymnasium::wrappers::RecordSafetyStatistics;
use safe_gymnasium::{
    Env, InitMode, LaxFriedrichsSolver, Result, RewardKind, SafeCartPoleConfig, SafeCartPoleEnv, Space,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Task {
    Balance,
    BalanceSparse,
    SwingUp,
    SwingUpSparse,
}

impl Task {
    fn apply(self, config: &mut SafeCartPoleConfig) {
        let (mode, reward) = match self {
            Task::Balance => (InitMode::Balance, RewardKind::Dense),
            Task::BalanceSparse => (InitMode::Balance, RewardKind::Sparse),
            Task::SwingUp => (InitMode::SwingUp, RewardKind::Dense),
            Task::SwingUpSparse => (InitMode::SwingUp, RewardKind::Sparse),
        };
        config.sampler.mode = mode;
        config.task.reward = reward;
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// Always apply zero force
    Zero,
    /// Uniform random action in [-1, 1]
    Random,
}

#[derive(Parser, Debug)]
#[command(name = "safe_cartpole")]
#[command(about = "Run cart-pole episodes that start from certified-safe states")]
struct Args {
    /// JSON configuration file; defaults are used for missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Task variant, overrides the configured sampler mode and reward
    #[arg(long, value_enum)]
    task: Option<Task>,

    /// Number of episodes
    #[arg(short, long, default_value_t = 5)]
    episodes: usize,

    /// Base seed for resets and the random policy
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = Policy::Zero)]
    policy: Policy,

    /// Directory for the value function cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Solve again even when a cache file exists
    #[arg(long)]
    force_recompute: bool,

    /// Nodes per grid axis, overrides the configured resolution
    #[arg(long)]
    resolution: Option<usize>,

    /// Log solver progress at info level
    #[arg(long)]
    progress: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(args: &Args) -> Result<SafeCartPoleConfig> {
    let mut config = match &args.config {
        Some(path) => SafeCartPoleConfig::from_json_file(path)?,
        None => SafeCartPoleConfig::default(),
    };
    if let Some(task) = args.task {
        task.apply(&mut config);
    }
    if let Some(n) = args.resolution {
        config.grid.resolution = [n; 4];
    }
    if args.cache_dir.is_some() {
        config.cache.directory = args.cache_dir.clone();
    }
    config.cache.force_recompute |= args.force_recompute;
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let solver = LaxFriedrichsSolver::new().with_progress(args.progress);
    let mut env = RecordSafetyStatistics::new(SafeCartPoleEnv::from_config(&config, &solver, args.seed)?);

    let mut seeds = SeedSequence::new(args.seed);
    let mut policy_rng = seeds.next_rng();
    let mut total_return = 0.0;
    let mut total_unsafe = 0;

    for episode in 0..args.episodes {
        let (_obs, info) = env.reset(Some(seeds.next_subseed()));
        let init_value = info.get_f64("init_value").unwrap_or(f64::NAN);
        let fallback = info.get_bool("init_fallback").unwrap_or(false);
        loop {
            let action = match args.policy {
                Policy::Zero => [0.0],
                Policy::Random => env.inner().action_space().sample(&mut policy_rng),
            };
            let step = env.step(action)?;
            if step.done() {
                break;
            }
        }
        if let Some(stats) = env.last_episode() {
            total_return += stats.episode_return;
            total_unsafe += stats.unsafe_steps;
            println!(
                "episode {episode:>3}: return {:>9.3}  length {:>5}  unsafe steps {:>5}  init value {init_value:>8.4}{}",
                stats.episode_return,
                stats.length,
                stats.unsafe_steps,
                if fallback { "  (fallback)" } else { "" }
            );
        }
    }

    let n = args.episodes.max(1) as f64;
    println!(
        "mean return {:.3}, mean unsafe steps {:.1}, fallbacks {}",
        total_return / n,
        total_unsafe as f64 / n,
        env.inner().fallback_count()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "safe_cartpole failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
