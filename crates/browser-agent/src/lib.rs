//! `browser-agent` — stdio driver for the external browser actor.
//!
//! The actor itself is site-specific scripting owned by an outside
//! collaborator (a Playwright/Puppeteer program, typically). This crate
//! spawns it as a subprocess and speaks a line-delimited JSON protocol over
//! stdin/stdout, exposing the result as `drover-core`'s [`WorkerActor`]
//! capability interface.
//!
//! ```text
//! ActorCommand (config)
//!     │
//!     ▼
//! ActorProcess     ← spawns the actor, one JSON request line per operation
//!     │               reads one JSON response line back
//!     ▼
//! BrowserActor     ← WorkerActor impl: login / navigate / fetch / apply
//!     ▲               + liveness ping with timeout
//!     │
//! BrowserActorFactory ← ActorFactory impl, one subprocess per session
//! ```
//!
//! [`WorkerActor`]: drover_core::WorkerActor

pub mod error;
pub mod handle;
pub mod types;

pub(crate) mod process;

pub use error::BridgeError;
pub use handle::{BrowserActor, BrowserActorFactory};
pub use types::{ActorRequest, ActorResponse};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
