//! # Agent State v1.0.0
//!
//! A minimal agent lifecycle backed by a durable key-value state store.
//!
//! - **StateStore**: string keys → JSON values, with metadata timestamps,
//!   named JSON snapshots, backups, and kind-based validation
//! - **Processor trait**: the one capability every concrete agent supplies
//! - **Agent**: wraps each `process` call in start/success/error/stop hooks
//!   that record timestamps and failures into the store
//! - **Errors**: Two-layer error model — StateError + RunError
//! - **LogSink**: injected log destination (file or `tracing`)
//! - **Events**: per-run lifecycle events for observability
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! agent-state = "1.0"
//! ```
//!
//! ```rust,ignore
//! use agent_state::prelude::*;
//!
//! struct Greeter;
//!
//! impl Processor for Greeter {
//!     type Input = String;
//!     type Output = String;
//!     type Error = std::io::Error;
//!
//!     fn process(&mut self, input: String) -> Result<String, Self::Error> {
//!         Ok(format!("Processed: {}", input))
//!     }
//! }
//!
//! let config = AgentConfig::new("greeter").autosave(false);
//! let mut agent = Agent::with_file_log(config, Greeter)?;
//! assert_eq!(agent.run("hello".into())?, "Processed: hello");
//! agent.save_state(None)?; // states/greeter_state.json
//! ```
//!
//! ## Single-threaded use
//!
//! Stores and agents are plain synchronous values. Several stores may share
//! a directory through named snapshots; nothing locks the files.

pub mod agent;
pub mod document;
pub mod errors;
pub mod events;
pub mod logging;
pub mod schema;
pub mod store;
pub mod types;

// Re-export everything in prelude for convenience
pub mod prelude {
    pub use crate::agent::*;
    pub use crate::document::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::logging::*;
    pub use crate::schema::*;
    pub use crate::store::*;
    pub use crate::types::*;
}

// Also re-export at crate root
pub use prelude::*;
