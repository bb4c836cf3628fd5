//! The agent lifecycle wrapper.
//!
//! A [`Processor`] supplies the one capability every agent must have:
//! turning an input into an output, or failing. [`Agent`] wraps each call
//! in a fixed sequence of lifecycle hooks that record timestamps and error
//! information into the agent's [`StateStore`]:
//!
//! ```text
//! Idle → Starting → Processing → {Succeeded | Failed} → Stopping → Idle
//!        last_start              last_success           last_stop
//!                                last_error
//! ```
//!
//! The stop hook and the return to `Idle` happen on every path, including
//! when `process` or another hook fails.

use crate::errors::{RunError, StateError, StateResult};
use crate::events::{AgentEvent, EventFilter, EventKind, EventManager, EventReceiver};
use crate::logging::{FileLogSink, LogSink};
use crate::store::{StateStore, StoreConfig, DEFAULT_BACKUP_DIR, DEFAULT_STATE_DIR};
use crate::types::{short_type_name, Phase, RunId, StateMap, StateValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Level;

/// Default log directory
pub const DEFAULT_LOG_DIR: &str = "logs";

/// State key written by the start hook
pub const LAST_START: &str = "last_start";
/// State key written by the success hook
pub const LAST_SUCCESS: &str = "last_success";
/// State key written by the error hook
pub const LAST_ERROR: &str = "last_error";
/// State key written by the stop hook
pub const LAST_STOP: &str = "last_stop";

/// Configuration for constructing an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable identifier; also names the log file and default snapshot
    pub agent_id: String,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_autosave() -> bool {
    true
}

impl AgentConfig {
    /// Create a config with default directories and autosave on
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            state_dir: default_state_dir(),
            log_dir: default_log_dir(),
            autosave: default_autosave(),
        }
    }

    /// Load a config from a JSON document
    pub fn from_json_file(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StateError::not_found(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Set the state directory
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Set the log directory
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Set autosave
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Store configuration derived from this agent config
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            state_dir: self.state_dir.clone(),
            autosave: self.autosave,
            backup_dir_name: DEFAULT_BACKUP_DIR.to_string(),
        }
    }

    /// `<log_dir>/<agent_id>.log`
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.agent_id))
    }

    /// Snapshot name used by `save_state(None)`
    pub fn default_state_name(&self) -> String {
        format!("{}_state", self.agent_id)
    }
}

/// The capability every concrete agent implements.
pub trait Processor {
    type Input;
    type Output;
    type Error: std::error::Error;

    /// Turn one input into an output, or fail.
    ///
    /// Called at most once per `Agent::run`.
    fn process(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error>;

    /// Name used when rendering the agent
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Structured record written under `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// ISO-8601 time the failure was recorded
    pub timestamp: String,

    /// Human-readable failure message
    pub message: String,

    /// Failure kind (error type name, or store error code for hook failures)
    pub kind: String,
}

/// A processor wrapped with lifecycle hooks, a state store and a log sink.
pub struct Agent<P: Processor> {
    config: AgentConfig,
    processor: P,
    store: StateStore,
    sink: Box<dyn LogSink>,
    phase: Phase,
    events: EventManager,
}

impl<P: Processor> Agent<P> {
    /// Create an agent writing its log lines to `sink`.
    pub fn new(config: AgentConfig, processor: P, sink: Box<dyn LogSink>) -> Self {
        let store = StateStore::new(config.store_config());
        let mut agent = Self {
            config,
            processor,
            store,
            sink,
            phase: Phase::Idle,
            events: EventManager::default(),
        };
        let message = format!("Agent {} initialized", agent.config.agent_id);
        agent.sink.log(Level::INFO, &message);
        agent
    }

    /// Create an agent logging to `<log_dir>/<agent_id>.log`.
    pub fn with_file_log(config: AgentConfig, processor: P) -> StateResult<Self> {
        let sink = FileLogSink::open(&config.log_dir, config.agent_id.clone())?;
        Ok(Self::new(config, processor, Box::new(sink)))
    }

    pub fn id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// True strictly between the start of `run` and its stop hook
    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    // ═══════════════════════════════════════════════════════
    // RUN
    // ═══════════════════════════════════════════════════════

    /// Run `process` once, wrapped in the lifecycle hooks.
    ///
    /// A processor failure is recorded under `last_error` and returned as
    /// `RunError::Process` carrying the original error. If a hook fails
    /// after an earlier failure, the earlier failure wins and the hook
    /// failure is logged.
    pub fn run(&mut self, input: P::Input) -> Result<P::Output, RunError<P::Error>> {
        let run_id = RunId::new();
        let started = Instant::now();

        self.phase = Phase::Starting;
        self.sink.log(Level::INFO, "Starting agent execution");
        self.emit(EventKind::RunStarted, Some(run_id));

        let outcome = match self.execute(input) {
            Ok(output) => {
                let duration = started.elapsed();
                self.sink.log(
                    Level::DEBUG,
                    &format!("Execution succeeded in {} ms", duration.as_millis()),
                );
                self.emit(EventKind::RunSucceeded { duration }, Some(run_id));
                Ok(output)
            }
            Err(err) => {
                self.phase = Phase::Failed;
                let message = err.to_string();
                self.sink
                    .log(Level::ERROR, &format!("Error during execution: {}", message));
                self.emit(
                    EventKind::RunFailed {
                        kind: err.kind(),
                        message,
                    },
                    Some(run_id),
                );
                if let Err(hook) = self.on_error(&err) {
                    self.log_masked_hook_failure(LAST_ERROR, &hook);
                }
                Err(err)
            }
        };

        self.phase = Phase::Stopping;
        let stopped = self.on_stop();
        if let (Err(_), Err(stop)) = (&outcome, &stopped) {
            self.log_masked_hook_failure(LAST_STOP, stop);
        }
        self.phase = Phase::Idle;
        self.emit(EventKind::RunStopped, Some(run_id));
        self.sink.log(Level::INFO, "Agent execution completed");

        match (outcome, stopped) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(stop)) => Err(RunError::Hook(stop)),
            (Err(err), _) => Err(err),
        }
    }

    fn execute(&mut self, input: P::Input) -> Result<P::Output, RunError<P::Error>> {
        self.on_start()?;
        self.phase = Phase::Processing;
        let output = self.processor.process(input).map_err(RunError::Process)?;
        self.phase = Phase::Succeeded;
        self.on_success()?;
        Ok(output)
    }

    fn on_start(&mut self) -> StateResult<()> {
        self.store.set(LAST_START, Timestamp::now())
    }

    fn on_success(&mut self) -> StateResult<()> {
        self.store.set(LAST_SUCCESS, Timestamp::now())
    }

    fn on_error(&mut self, err: &RunError<P::Error>) -> StateResult<()> {
        let record = ErrorRecord {
            timestamp: Timestamp::now().to_iso8601(),
            message: err.to_string(),
            kind: err.kind(),
        };
        self.store.set_serialized(LAST_ERROR, &record)
    }

    fn on_stop(&mut self) -> StateResult<()> {
        self.store.set(LAST_STOP, Timestamp::now())
    }

    fn log_masked_hook_failure(&mut self, key: &str, err: &StateError) {
        tracing::warn!(agent.id = %self.config.agent_id, key, error = %err, "lifecycle hook failed after an earlier failure");
        self.sink.log(
            Level::WARN,
            &format!("Hook writing {} failed: {}", key, err),
        );
    }

    // ═══════════════════════════════════════════════════════
    // STATE ACCESS
    // ═══════════════════════════════════════════════════════

    /// Owned copy of the store's entries
    pub fn get_state_snapshot(&self) -> StateMap {
        self.store.snapshot()
    }

    /// Delegates to `StateStore::set`
    pub fn set_state(
        &mut self,
        key: impl Into<String>,
        value: impl Into<StateValue>,
    ) -> StateResult<()> {
        self.store.set(key, value)
    }

    /// Save a snapshot, named `<agent_id>_state` unless `name` is given.
    pub fn save_state(&mut self, name: Option<&str>) -> StateResult<PathBuf> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_state_name());
        let path = self.store.save(Some(&name))?;
        self.emit(EventKind::StateSaved { path: path.clone() }, None);
        Ok(path)
    }

    /// Load a named snapshot into this agent's store.
    pub fn load_state(&mut self, name: &str) -> StateResult<()> {
        self.store.load(name)?;
        self.sink
            .log(Level::INFO, &format!("State loaded from {}", name));
        self.emit(
            EventKind::StateLoaded {
                name: name.to_string(),
            },
            None,
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════

    fn emit(&mut self, kind: EventKind, run_id: Option<RunId>) {
        let mut event = AgentEvent::new(self.config.agent_id.clone(), kind);
        if let Some(run_id) = run_id {
            event = event.in_run(run_id);
        }
        self.events.emit(event);
    }

    /// Subscribe to this agent's events
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Most recent events, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<AgentEvent> {
        self.events.recent(limit)
    }

    /// Most recent events matching `filter`, newest first
    pub fn recent_events_matching(&self, filter: &EventFilter, limit: usize) -> Vec<AgentEvent> {
        self.events.recent_matching(filter, limit)
    }
}

impl<P: Processor> Drop for Agent<P> {
    fn drop(&mut self) {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(agent.id = %self.config.agent_id, error = %e, "failed to flush agent log");
        }
    }
}

impl<P: Processor> std::fmt::Display for Agent<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(agent_id='{}', running={})",
            self.processor.name(),
            self.config.agent_id,
            self.is_running()
        )
    }
}

impl<P: Processor> std::fmt::Debug for Agent<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("agent_id", &self.config.agent_id)
            .field("processor", &self.processor.name())
            .field("phase", &self.phase)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
