//! hubdeck-app - Application state and orchestration for hubdeck
//!
//! This crate implements the TEA (The Elm Architecture) pattern for state
//! management: [`AppState`] is the model, [`Message`] the events,
//! [`handler::update`] the pure transitions and [`UpdateAction`] the effects
//! they request. The [`Engine`] owns the state, executes actions through a
//! sequential transport worker and broadcasts [`EngineEvent`]s.

pub mod actions;
pub mod config;
pub mod engine;
pub mod engine_event;
pub mod handler;
pub mod message;
pub mod process;
pub mod session;
pub mod signals;
pub mod state;

// Re-export primary types
pub use engine::{Engine, EngineOptions};
pub use engine_event::EngineEvent;
pub use handler::{UpdateAction, UpdateResult};
pub use message::Message;
pub use session::{Session, SessionManager, SessionPhase};
pub use state::{AppState, HostContext, Payload, PayloadKind, Screen};
