//! Trial, timestep and episode bookkeeping.
//!
//! The [`EpisodeCounter`] keeps three values in a backing store:
//!
//! | key         | meaning                                         |
//! |-------------|-------------------------------------------------|
//! | `trial_num` | completed trials                                |
//! | `timestep`  | global step counter, advanced once per trial    |
//! | `episode`   | id of the current episode (uuid string)         |
//!
//! A trial is one [`EpisodeCounter::enter`] / [`EpisodeScope::exit`] cycle.
//! Nothing changes while a scope is open; on exit the trial count and the
//! timestep each advance by one, and the episode id rotates whenever the
//! new trial count is a multiple of the rotation period.
//!
//! ```text
//! trial:    0    1    2    3    4    5    6   ...
//! episode:  E0   E0   E0   E0   E0   E1   E1  ...   (period = 5)
//! ```
//!
//! The first episode id is created the first time one is needed, which is
//! normally at the first [`EpisodeCounter::enter`]. Creating it does not
//! count as a rotation. If the id is missing when a trial exits, a fresh
//! one is created without logging a rotation.

use std::fmt;
use std::num::NonZeroU64;
use std::path::PathBuf;

use synk_db::{BackingStore, FileStore, MemoryStore, StoreError};
use synk_types::{EpisodeId, Value};

/// Store key holding the completed-trial count.
pub const TRIAL_KEY: &str = "trial_num";

/// Store key holding the timestep.
pub const TIMESTEP_KEY: &str = "timestep";

/// Store key holding the current episode id.
pub const EPISODE_KEY: &str = "episode";

/// Trials per episode unless configured otherwise.
pub const DEFAULT_ROTATION_PERIOD: NonZeroU64 = match NonZeroU64::new(5) {
    Some(period) => period,
    None => NonZeroU64::MIN,
};

/// Errors raised by the episode counter.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    /// The backing store failed.
    #[error("counter store error: {0}")]
    Store(#[from] StoreError),

    /// A stored value has the wrong shape.
    #[error("corrupt counter value under '{key}': {value}")]
    Corrupt {
        /// The offending key.
        key: &'static str,
        /// What was stored there.
        value: Value,
    },

    /// A counter reached `u64::MAX`.
    #[error("counter '{key}' overflowed")]
    Overflow {
        /// The counter that overflowed.
        key: &'static str,
    },
}

/// Counter values as seen by one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpisodeState {
    /// Completed trials before this one.
    pub trial: u64,
    /// Global timestep.
    pub timestep: u64,
    /// Current episode.
    pub episode: EpisodeId,
}

impl EpisodeState {
    /// Namespace `name` under this episode: `episode:{id}:{name}`.
    pub fn key(&self, name: &str) -> String {
        format!("episode:{}:{name}", self.episode)
    }
}

/// Persistent trial/timestep/episode state machine.
pub struct EpisodeCounter {
    store: Box<dyn BackingStore>,
    rotation_period: NonZeroU64,
}

impl fmt::Debug for EpisodeCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeCounter")
            .field("rotation_period", &self.rotation_period)
            .field("trial", &self.read_u64(TRIAL_KEY).ok().flatten())
            .field("timestep", &self.read_u64(TIMESTEP_KEY).ok().flatten())
            .finish_non_exhaustive()
    }
}

impl EpisodeCounter {
    /// Create a counter over `store`, rotating every `rotation_period`
    /// trials.
    pub fn new(store: impl BackingStore + 'static, rotation_period: NonZeroU64) -> Self {
        Self {
            store: Box::new(store),
            rotation_period,
        }
    }

    /// Create a counter that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), DEFAULT_ROTATION_PERIOD)
    }

    /// Open a counter persisted to the JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Store`] if the file exists but cannot be
    /// loaded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CounterError> {
        let store = FileStore::open(path)?;
        Ok(Self::new(store, DEFAULT_ROTATION_PERIOD))
    }

    /// Replace the rotation period.
    #[must_use]
    pub const fn with_rotation_period(mut self, rotation_period: NonZeroU64) -> Self {
        self.rotation_period = rotation_period;
        self
    }

    /// Trials per episode.
    pub const fn rotation_period(&self) -> NonZeroU64 {
        self.rotation_period
    }

    /// Completed trials so far; zero if never entered.
    pub fn trial_count(&self) -> Result<u64, CounterError> {
        Ok(self.read_u64(TRIAL_KEY)?.unwrap_or(0))
    }

    /// Current timestep; zero if never advanced.
    pub fn timestep(&self) -> Result<u64, CounterError> {
        Ok(self.read_u64(TIMESTEP_KEY)?.unwrap_or(0))
    }

    /// Current episode id, creating the first one if none exists yet.
    pub fn episode_id(&mut self) -> Result<EpisodeId, CounterError> {
        match self.read_episode()? {
            Some(id) => Ok(id),
            None => self.start_episode(false),
        }
    }

    /// Current counter values.
    pub fn state(&mut self) -> Result<EpisodeState, CounterError> {
        let episode = self.episode_id()?;
        Ok(EpisodeState {
            trial: self.trial_count()?,
            timestep: self.timestep()?,
            episode,
        })
    }

    /// Begin a trial.
    ///
    /// The returned scope advances the counter when it is exited or
    /// dropped.
    pub fn enter(&mut self) -> Result<EpisodeScope<'_>, CounterError> {
        if self.read_u64(TRIAL_KEY)?.is_none() {
            self.store.set(TRIAL_KEY, Value::from(0_u64))?;
        }
        let state = self.state()?;
        tracing::debug!(trial = state.trial, timestep = state.timestep, episode = %state.episode, "Trial entered");
        Ok(EpisodeScope {
            counter: self,
            state,
            exited: false,
        })
    }

    /// Apply the exit transition of one trial.
    ///
    /// The keys are written one at a time. If any write fails, the keys
    /// already written are put back to their previous values before the
    /// error is returned, so a failed exit leaves the counter where it was.
    fn advance(&mut self) -> Result<EpisodeState, CounterError> {
        let trial = self
            .trial_count()?
            .checked_add(1)
            .ok_or(CounterError::Overflow { key: TRIAL_KEY })?;
        let timestep = self
            .timestep()?
            .checked_add(1)
            .ok_or(CounterError::Overflow { key: TIMESTEP_KEY })?;
        let current = self.read_episode()?;

        let saved = [
            (TRIAL_KEY, self.read_raw(TRIAL_KEY)?),
            (TIMESTEP_KEY, self.read_raw(TIMESTEP_KEY)?),
        ];
        match self.write_advance(trial, timestep, current) {
            Ok(episode) => Ok(EpisodeState {
                trial,
                timestep,
                episode,
            }),
            Err(err) => {
                self.restore(saved);
                Err(err)
            }
        }
    }

    fn write_advance(
        &mut self,
        trial: u64,
        timestep: u64,
        current: Option<EpisodeId>,
    ) -> Result<EpisodeId, CounterError> {
        self.store.set(TRIAL_KEY, Value::from(trial))?;
        self.store.set(TIMESTEP_KEY, Value::from(timestep))?;

        // The episode key is written last; a failure here leaves the old id.
        match current {
            None => self.start_episode(false),
            Some(_) if trial.checked_rem(self.rotation_period.get()) == Some(0) => {
                self.start_episode(true)
            }
            Some(id) => Ok(id),
        }
    }

    fn restore(&mut self, saved: [(&'static str, Option<Value>); 2]) {
        for (key, previous) in saved {
            let result = match previous {
                Some(value) => self.store.set(key, value),
                None if self.store.exists(key) => self.store.delete(key),
                None => Ok(()),
            };
            if let Err(err) = result {
                tracing::warn!(key, error = %err, "Could not roll back counter key");
            }
        }
    }

    fn start_episode(&mut self, rotation: bool) -> Result<EpisodeId, CounterError> {
        let id = EpisodeId::new();
        self.store.set(EPISODE_KEY, Value::String(id.to_string()))?;
        if rotation {
            tracing::info!(episode = %id, period = self.rotation_period.get(), "Episode rotated");
        } else {
            tracing::debug!(episode = %id, "First episode created");
        }
        Ok(id)
    }

    fn read_raw(&self, key: &str) -> Result<Option<Value>, CounterError> {
        if !self.store.exists(key) {
            return Ok(None);
        }
        Ok(Some(self.store.get(key)?))
    }

    fn read_u64(&self, key: &'static str) -> Result<Option<u64>, CounterError> {
        let Some(value) = self.read_raw(key)? else {
            return Ok(None);
        };
        value
            .as_u64()
            .map(Some)
            .ok_or(CounterError::Corrupt { key, value })
    }

    fn read_episode(&self) -> Result<Option<EpisodeId>, CounterError> {
        if !self.store.exists(EPISODE_KEY) {
            return Ok(None);
        }
        let value = self.store.get(EPISODE_KEY)?;
        let parsed = value.as_str().and_then(|raw| raw.parse().ok());
        match parsed {
            Some(id) => Ok(Some(id)),
            None => Err(CounterError::Corrupt {
                key: EPISODE_KEY,
                value,
            }),
        }
    }
}

/// One open trial. Exiting (or dropping) it advances the counter.
#[derive(Debug)]
pub struct EpisodeScope<'a> {
    counter: &'a mut EpisodeCounter,
    state: EpisodeState,
    exited: bool,
}

impl EpisodeScope<'_> {
    /// Counter values at the time the trial was entered.
    pub const fn state(&self) -> &EpisodeState {
        &self.state
    }

    /// Finish the trial and return the advanced counter values.
    pub fn exit(mut self) -> Result<EpisodeState, CounterError> {
        self.exited = true;
        self.counter.advance()
    }
}

impl Drop for EpisodeScope<'_> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Err(err) = self.counter.advance() {
            tracing::warn!(
                trial = self.state.trial,
                error = %err,
                "Trial scope dropped without exit and the counter could not advance"
            );
        }
    }
}
