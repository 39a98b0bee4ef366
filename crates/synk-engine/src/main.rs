//! Trial-loop engine for the synk simulation-state kernel.
//!
//! This binary wires the kernel together end to end: it loads
//! configuration, registers the simulation's components, wraps them in
//! hooked modules and runs a fixed number of trials, journaling every
//! step's record under the current episode.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `synk-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build tiered storage and the state journal
//! 4. Open the episode counter (file-backed if `episode.state_path` is set)
//! 5. Register the world clock and forager and wrap them in modules
//! 6. Run the trial loop
//! 7. Log the result

mod error;
mod sim;

use std::path::Path;

use anyhow::Context as _;
use synk_core::config::{KernelConfig, LogFormat, LoggingConfig};
use synk_core::episode::DEFAULT_ROTATION_PERIOD;
use synk_core::{EpisodeCounter, Module, StateJournal, TieredStore, registry};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::sim::{Forager, SimulationSettings, WorldClock};

/// Name of the config file looked up in the working directory.
const CONFIG_FILE: &str = "synk-config.yaml";

/// Totals reported when a run finishes.
#[derive(Debug, Default)]
struct RunSummary {
    trials: u64,
    records: usize,
    episodes: usize,
}

/// Application entry point for the synk engine.
///
/// # Errors
///
/// Returns an error if any initialization step or a trial fails.
fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config().context("loading kernel configuration")?;
    let settings =
        sim::load_settings(Path::new(CONFIG_FILE)).context("loading simulation settings")?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        rotation_period = config.episode.rotation_period,
        tiers = ?config.storage.tiers,
        eager_journal = config.journal.eager,
        trials = settings.trials,
        seed = settings.seed,
        "synk-engine starting"
    );

    let summary = run(&config, &settings).context("running trials")?;

    info!(
        trials = summary.trials,
        records = summary.records,
        episodes = summary.episodes,
        "synk-engine shutdown complete"
    );
    Ok(())
}

/// Build the kernel from `config` and run `settings.trials` trials.
fn run(config: &KernelConfig, settings: &SimulationSettings) -> Result<RunSummary, EngineError> {
    // 3. Tiered storage and journal.
    let store = TieredStore::in_memory(&config.storage.tiers);
    let mut journal = if config.journal.eager {
        StateJournal::eager(store)
    } else {
        StateJournal::new(store)
    };
    info!(tiers = ?journal.store().tier_names(), "Storage initialized");

    // 4. Episode counter.
    let period = config.episode.period().unwrap_or(DEFAULT_ROTATION_PERIOD);
    let mut counter = match &config.episode.state_path {
        Some(path) => EpisodeCounter::open(path.clone())?,
        None => EpisodeCounter::in_memory(),
    }
    .with_rotation_period(period);
    info!(
        trial = counter.trial_count()?,
        timestep = counter.timestep()?,
        "Episode counter ready"
    );

    // 5. Components and modules.
    let registry = registry::global();
    let mut clock = Module::create(registry, WorldClock::default())?;
    let mut forager = Module::create(registry, Forager::new(settings.seed, settings.max_gather))?;
    sim::install_hooks(clock.hooks_mut());
    sim::install_hooks(forager.hooks_mut());
    info!(
        resources = registry.resources().len(),
        components = registry.len(),
        "Components registered"
    );

    // 6. Trial loop.
    let mut summary = RunSummary::default();
    let mut episodes = std::collections::BTreeSet::new();
    for _ in 0..settings.trials {
        let trial = counter.enter()?;
        let state = *trial.state();
        episodes.insert(state.episode);

        clock.bind_episode(&state);
        forager.bind_episode(&state);

        let tick = clock.step(Vec::new())?;
        journal.set(state.key(clock.name()), tick)?;
        let haul = forager.step(Vec::new())?;
        journal.set(state.key(forager.name()), haul)?;

        let report = journal.commit()?;
        summary.records = summary.records.saturating_add(report.committed);

        let next = trial.exit()?;
        summary.trials = summary.trials.saturating_add(1);
        if next.episode != state.episode {
            info!(finished = %state.episode, next = %next.episode, "Episode boundary");
        }
    }
    summary.episodes = episodes.len();

    // 7. Result.
    info!(
        ticks = clock.component().ticks(),
        stock = forager.component().stock(),
        timestep = counter.timestep()?,
        "Trial loop finished"
    );
    Ok(summary)
}

/// Load the kernel configuration from [`CONFIG_FILE`].
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<KernelConfig, EngineError> {
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        Ok(KernelConfig::from_file(config_path)?)
    } else {
        let mut config = KernelConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
