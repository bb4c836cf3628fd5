//! Shared types used by the store and the agent wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current persisted document format version.
pub const FORMAT_VERSION: &str = "1.0";

/// A JSON-representable state value.
///
/// String, number, boolean, null, ordered sequence of values, or a
/// mapping of string to value.
pub type StateValue = serde_json::Value;

/// Key → value mapping held by a store.
pub type StateMap = serde_json::Map<String, StateValue>;

/// Unique identifier for a single `Agent::run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Where an agent is inside a single `run`.
///
/// `Idle → Starting → Processing → {Succeeded | Failed} → Stopping → Idle`.
/// The wrapper is synchronous, so these are hook points rather than
/// suspend points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Processing,
    Succeeded,
    Failed,
    Stopping,
}

impl Phase {
    /// True for every phase between the start of `run` and its stop hook.
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Timestamp wrapper for consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// ISO-8601 rendering used for timestamps written into state entries.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Second-resolution stamp used in generated snapshot names.
    pub fn file_stamp(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}

impl From<Timestamp> for StateValue {
    fn from(ts: Timestamp) -> Self {
        StateValue::String(ts.to_iso8601())
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_crate::errors::ParseError` → `ParseError`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
