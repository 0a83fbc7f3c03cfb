#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use idsgame::config::AppConfig;
use idsgame::game::{Environment, Side};
use idsgame::training::PpoTrainer;

/// Train attacker and defender agents on the intrusion game with PPO self-play.
#[derive(Parser)]
#[command(name = "train", about = "Train attacker/defender agents with PPO")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override total environment timesteps
    #[arg(long)]
    timesteps: Option<u64>,

    /// Override the learning rate of both sides
    #[arg(long)]
    lr: Option<f64>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the checkpoint directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Resume from a checkpoint directory or a checkpoint root with a `latest` link
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write the kept metrics records (see `trainer.max_history`) as JSON once training stops
    #[arg(long)]
    metrics_out: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("idsgame=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    init_logging()?;

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    if let Some(timesteps) = cli.timesteps {
        app_config.trainer.total_timesteps = timesteps;
    }
    if let Some(lr) = cli.lr {
        app_config.ppo.learning_rate = lr;
        app_config.ppo.defender_learning_rate = None;
    }
    if let Some(seed) = cli.seed {
        app_config.trainer.seed = Some(seed);
        app_config.game.seed = Some(seed);
    }
    if let Some(dir) = cli.checkpoint_dir {
        app_config.checkpoint.checkpoint_dir = dir;
    }
    app_config.validate().context("validating configuration")?;

    let mut trainer: PpoTrainer =
        PpoTrainer::from_config(&app_config).context("building trainer")?;
    info!(
        observation_size = trainer.env().observation_size(Side::Attacker),
        attacker_actions = trainer.env().num_actions(Side::Attacker),
        defender_actions = trainer.env().num_actions(Side::Defender),
        total_timesteps = app_config.trainer.total_timesteps,
        "trainer ready"
    );

    if let Some(dir) = &cli.resume {
        trainer
            .resume_from(dir)
            .with_context(|| format!("resuming from {}", dir.display()))?;
        info!(
            iteration = trainer.core().iteration(),
            num_timesteps = trainer.core().num_timesteps(),
            "resumed"
        );
    }

    let outcome = trainer.learn_to_end().context("training")?;
    info!(
        iterations = outcome.iterations,
        num_timesteps = outcome.num_timesteps,
        aborted = outcome.aborted,
        "training finished"
    );

    if let Some(path) = &cli.metrics_out {
        let json = serde_json::to_string_pretty(trainer.metrics().history())
            .context("serializing metrics history")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    Ok(())
}
