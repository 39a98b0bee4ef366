//! Components driven by the engine's trial loop.
//!
//! The engine runs two modules:
//!
//! - [`WorldClock`] -- a resource that counts ticks.
//! - [`Forager`] -- an agent that gathers a seeded random amount of food
//!   each step and keeps a running stock.
//!
//! Both get the same two hooks from [`install_hooks`]: a pre-hook that
//! appends the wall-clock time to the step arguments and a post-hook that
//! wraps the step result in an attributed record.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::json;
use synk_core::registry::{AGENT, RESOURCE};
use synk_core::{BoxError, Component, ContextScope, HookChain, HookOutput, Steppable};
use synk_types::Value;

use crate::error::EngineError;

/// Run parameters, read from the `simulation` section of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SimulationSettings {
    /// Number of trials to run.
    #[serde(default = "default_trials")]
    pub trials: u64,

    /// Seed for the forager's random yields.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Largest amount the forager can gather in one step.
    #[serde(default = "default_max_gather")]
    pub max_gather: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: default_seed(),
            max_gather: default_max_gather(),
        }
    }
}

const fn default_trials() -> u64 {
    12
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_gather() -> u64 {
    5
}

/// Load [`SimulationSettings`] from the `simulation` section of the YAML
/// file at `path`. A missing file or section yields the defaults.
pub fn load_settings(path: &Path) -> Result<SimulationSettings, EngineError> {
    if !path.exists() {
        return Ok(SimulationSettings::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Settings {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value =
        serde_yml::from_str(&contents).map_err(|e| EngineError::Settings {
            message: format!("failed to parse config YAML: {e}"),
        })?;

    match raw.get("simulation") {
        Some(section) => serde_yml::from_value(section.clone()).map_err(|e| {
            EngineError::Settings {
                message: format!("failed to parse simulation settings: {e}"),
            }
        }),
        None => Ok(SimulationSettings::default()),
    }
}

/// Tick-counting world clock.
#[derive(Debug, Default)]
pub struct WorldClock {
    ticks: AtomicU64,
}

impl WorldClock {
    /// Ticks elapsed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Component for WorldClock {
    fn type_tag(&self) -> &'static str {
        RESOURCE
    }
}

impl Steppable for WorldClock {
    fn step(&self, _scope: &mut ContextScope, _args: &[Value]) -> Result<Value, BoxError> {
        let tick = self
            .ticks
            .fetch_add(1, Ordering::SeqCst)
            .checked_add(1)
            .ok_or("world clock overflowed")?;
        Ok(json!(tick))
    }
}

/// Agent that gathers food each step.
#[derive(Debug)]
pub struct Forager {
    rng: Mutex<SmallRng>,
    max_gather: u64,
    stock: AtomicU64,
}

impl Forager {
    /// Create a forager with a seeded random source.
    pub fn new(seed: u64, max_gather: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            max_gather,
            stock: AtomicU64::new(0),
        }
    }

    /// Food gathered so far.
    pub fn stock(&self) -> u64 {
        self.stock.load(Ordering::SeqCst)
    }
}

impl Component for Forager {
    fn type_tag(&self) -> &'static str {
        AGENT
    }
}

impl Steppable for Forager {
    fn step(&self, _scope: &mut ContextScope, _args: &[Value]) -> Result<Value, BoxError> {
        let gathered = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..=self.max_gather);
        let stock = self
            .stock
            .fetch_add(gathered, Ordering::SeqCst)
            .saturating_add(gathered);
        Ok(json!({ "gathered": gathered, "stock": stock }))
    }
}

/// Register the `timestamp` pre-hook and the `record` post-hook.
pub fn install_hooks(hooks: &mut HookChain) {
    hooks.register_pre("timestamp", |_, mut args| {
        args.push(json!(Utc::now().to_rfc3339()));
        Ok(HookOutput::Args(args))
    });
    hooks.register_post("record", |scope, result, args| {
        let meta = scope.snapshot().metadata()?;
        Ok(json!({
            "module": meta.module_type,
            "module_id": meta.module_id,
            "timestep": meta.timestep,
            "at": args.last(),
            "value": result,
        }))
    });
}
