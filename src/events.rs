//! Lifecycle events for observability.
//!
//! Every agent records what happened during each run (start, outcome,
//! stop) and around its snapshots. Events are kept in a bounded recent
//! buffer and broadcast to any subscribers.

use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// Event types emitted by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════════════════
    // RUN EVENTS
    // ═══════════════════════════════════════════════════════
    /// `run` entered; the start hook is next.
    RunStarted,

    /// `process` returned normally and the success hook ran.
    RunSucceeded {
        #[serde(with = "duration_millis")]
        duration: Duration,
    },

    /// `process` or a hook failed.
    RunFailed { kind: String, message: String },

    /// Stop hook done; the agent is idle again.
    RunStopped,

    // ═══════════════════════════════════════════════════════
    // STATE EVENTS
    // ═══════════════════════════════════════════════════════
    StateSaved { path: PathBuf },

    StateLoaded { name: String },
}

impl EventKind {
    /// Snake-case name of this event type
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::RunSucceeded { .. } => "run_succeeded",
            Self::RunFailed { .. } => "run_failed",
            Self::RunStopped => "run_stopped",
            Self::StateSaved { .. } => "state_saved",
            Self::StateLoaded { .. } => "state_loaded",
        }
    }
}

/// Event emitted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Which agent emitted this.
    pub agent_id: String,

    /// Run this event belongs to (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    /// Event type and data.
    #[serde(flatten)]
    pub kind: EventKind,

    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(agent_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            agent_id: agent_id.into(),
            run_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Attach a run ID.
    pub fn in_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Filter for selecting events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub agent_id: Option<String>,

    /// Event type names (see [`EventKind::name`]).
    pub event_types: Option<Vec<String>>,

    pub run_id: Option<RunId>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn of_type(mut self, name: impl Into<String>) -> Self {
        self.event_types.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn in_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &AgentEvent) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }

        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == event.kind.name()) {
                return false;
            }
        }

        if let Some(run_id) = &self.run_id {
            if event.run_id.as_ref() != Some(run_id) {
                return false;
            }
        }

        true
    }
}

/// Event receiver (broadcast channel).
pub type EventReceiver = broadcast::Receiver<AgentEvent>;

/// Keeps recent events and fans them out to subscribers.
#[derive(Debug)]
pub struct EventManager {
    sender: broadcast::Sender<AgentEvent>,
    recent: VecDeque<AgentEvent>,
    max_recent: usize,
}

impl EventManager {
    /// Create a new event manager with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            recent: VecDeque::new(),
            max_recent: 100,
        }
    }

    /// Emit an event.
    pub fn emit(&mut self, event: AgentEvent) {
        self.recent.push_back(event.clone());
        if self.recent.len() > self.max_recent {
            self.recent.pop_front();
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AgentEvent> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent events matching `filter`, newest first.
    pub fn recent_matching(&self, filter: &EventFilter, limit: usize) -> Vec<AgentEvent> {
        self.recent
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256)
    }
}

// Duration serialization as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
