//! Session tracking for the single focused device
//!
//! At most one [`Session`] exists at a time. A session is created by
//! [`SessionManager::begin_open`] in the `Opening` phase, becomes `Open` when
//! the transport confirms the link, and is dropped by
//! [`SessionManager::close`]. Every session carries a generation number;
//! replies and timers tagged with an older generation are ignored.

use hubdeck_core::{ConnectionKind, DeviceId};
use hubdeck_transport::DeviceTarget;
use serde::Serialize;

/// Lifecycle phase of the focused-device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Closed,
    Opening,
    Open,
}

/// The one live session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Addressing captured at open time; close uses this even if the
    /// registry entry has since changed
    pub target: DeviceTarget,

    /// Connection kind active at open time
    pub kind: ConnectionKind,

    pub phase: SessionPhase,

    pub generation: u64,

    /// A liveness ping went out and nothing has come back yet
    pub awaiting_reply: bool,
}

impl Session {
    pub fn device_id(&self) -> &str {
        &self.target.id
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<Session>,
    next_generation: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focused device id, if a session exists
    pub fn focused(&self) -> Option<&DeviceId> {
        self.current.as_ref().map(|s| &s.target.id)
    }

    pub fn is_focused(&self, device_id: &str) -> bool {
        self.focused().is_some_and(|id| id == device_id)
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    pub fn phase(&self) -> SessionPhase {
        self.current
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(SessionPhase::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.current.is_none()
    }

    /// Whether `generation` belongs to the live session
    pub fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// Start opening a session; returns its generation.
    ///
    /// Returns `None` when a session already exists. Callers must close it
    /// first.
    pub fn begin_open(&mut self, target: DeviceTarget, kind: ConnectionKind) -> Option<u64> {
        if self.current.is_some() {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.current = Some(Session {
            target,
            kind,
            phase: SessionPhase::Opening,
            generation,
            awaiting_reply: false,
        });
        Some(generation)
    }

    /// Move the `generation` session from `Opening` to `Open`.
    ///
    /// Returns false if that session is gone or already open.
    pub fn mark_open(&mut self, generation: u64) -> bool {
        match self.current.as_mut() {
            Some(session) if session.generation == generation && session.phase == SessionPhase::Opening => {
                session.phase = SessionPhase::Open;
                true
            }
            _ => false,
        }
    }

    /// Drop the live session and return it; `None` when already closed
    pub fn close(&mut self) -> Option<Session> {
        self.current.take()
    }
}
