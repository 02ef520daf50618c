//! Session Module - session state machines, timers and the registry
//!
//! All session state is owned by `SessionRegistry` and mutated only from
//! the bridge task. Process output and timer fires arrive as
//! `SessionEvent`s on one channel, so handling is serialized per session.
//! Every event carries the instance id of the session that produced it, so
//! events from a replaced session never reach a newer one under the same key.

mod registry;
#[allow(clippy::module_inception)]
mod session;
mod timer;

use tokio::sync::mpsc;

pub use registry::SessionRegistry;
pub use session::Session;
pub use timer::{SessionTimer, TimerFired, TimerKind, TimingConfig, UpdateScheduler};

use crate::pty::ProcessEvent;
use crate::types::SessionKey;

/// Input to the registry from processes and timers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Process {
        key: SessionKey,
        instance: u64,
        event: ProcessEvent,
    },
    Timer(TimerFired),
}

impl SessionEvent {
    pub fn key(&self) -> &SessionKey {
        match self {
            SessionEvent::Process { key, .. } => key,
            SessionEvent::Timer(fired) => &fired.key,
        }
    }

    pub fn instance(&self) -> u64 {
        match self {
            SessionEvent::Process { instance, .. } => *instance,
            SessionEvent::Timer(fired) => fired.instance,
        }
    }
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;
