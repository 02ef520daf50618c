//! Session registry
//!
//! Owns every live session, keyed by `SessionKey`, plus the thread index
//! that enforces at most one live session per conversation thread.
//! Terminal sessions are removed as soon as their final frame is queued,
//! so everything in the map is live.
//!
//! A key can be reused once its session is gone (e.g. a redelivered
//! message), so each session gets a fresh instance id and events carrying
//! any other id are dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{Session, SessionEvent, SessionEventSender};
use crate::config::BridgeConfig;
use crate::pty::{LaunchConfig, ProcessEvent, ProcessEventSink, ProcessHost};
use crate::render::RenderFrame;
use crate::semantic::MarkerConfig;
use crate::session::TimingConfig;
use crate::types::{
    BridgeError, DisplaySnapshot, Phase, RegistryStats, SessionKey, StartOutcome, TaskRequest,
    ThreadId,
};

pub struct SessionRegistry {
    sessions: HashMap<SessionKey, Session>,
    threads: HashMap<ThreadId, SessionKey>,
    host: Arc<dyn ProcessHost>,
    launch: LaunchConfig,
    markers: MarkerConfig,
    timing: TimingConfig,
    events: SessionEventSender,
    outbox: VecDeque<RenderFrame>,
    /// Last instance id handed out
    last_instance: u64,
}

impl SessionRegistry {
    pub fn new(host: Arc<dyn ProcessHost>, config: &BridgeConfig, events: SessionEventSender) -> Self {
        Self {
            sessions: HashMap::new(),
            threads: HashMap::new(),
            host,
            launch: config.launch.clone(),
            markers: config.markers.clone(),
            timing: config.timing.clone(),
            events,
            outbox: VecDeque::new(),
            last_instance: 0,
        }
    }

    // ========== Commands ==========

    /// Forward the text to the thread's live session, or spawn a new one
    pub fn start_or_resume(&mut self, request: &TaskRequest) -> Result<StartOutcome, BridgeError> {
        if let Some(key) = self.threads.get(&request.thread_id).cloned() {
            if let Some(session) = self.sessions.get_mut(&key) {
                session.send_input(&request.text)?;
                info!(session_key = %key, thread_id = %request.thread_id, "Resumed session with input");
                return Ok(StartOutcome {
                    session_key: key,
                    thread_id: request.thread_id.clone(),
                    resumed: true,
                });
            }
            // Index without a session; repair and start fresh
            warn!(thread_id = %request.thread_id, session_key = %key, "Dangling thread index entry");
            self.threads.remove(&request.thread_id);
        }

        let key = request.session_key();
        if self.sessions.contains_key(&key) {
            return Err(BridgeError::KeyInUse(key));
        }

        self.last_instance += 1;
        let instance = self.last_instance;
        let mut session = Session::new(
            key.clone(),
            instance,
            request.thread_id.clone(),
            self.markers.clone(),
            self.timing.clone(),
            self.events.clone(),
        );
        let spec = self.launch.spec_for(&request.text);
        let sink = ProcessEventSink::new(key.clone(), instance, self.events.clone());

        match self.host.spawn(&spec, sink) {
            Ok(process) => {
                info!(
                    session_key = %key,
                    session_id = %session.id(),
                    instance,
                    thread_id = %request.thread_id,
                    pid = ?process.pid(),
                    "Session started"
                );
                session.attach(process);
                self.threads.insert(request.thread_id.clone(), key.clone());
                self.sessions.insert(key.clone(), session);
                Ok(StartOutcome {
                    session_key: key,
                    thread_id: request.thread_id.clone(),
                    resumed: false,
                })
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(session_key = %key, error = %reason, "Failed to spawn assistant");
                self.outbox.push_back(session.fail_spawn(&reason));
                Err(BridgeError::SpawnFailure { key, reason })
            }
        }
    }

    /// Stop a live session. Returns false for unknown or already terminal keys.
    pub fn stop(&mut self, key: &SessionKey) -> bool {
        let Some(session) = self.sessions.get_mut(key) else {
            debug!(session_key = %key, "Stop for unknown session");
            return false;
        };
        if let Some(frame) = session.stop() {
            self.outbox.push_back(frame);
        }
        self.remove(key);
        true
    }

    /// Write a line to a live session. Returns false when it cannot be delivered.
    pub fn send_input(&mut self, key: &SessionKey, text: &str) -> bool {
        match self.sessions.get_mut(key) {
            Some(session) => match session.send_input(text) {
                Ok(()) => true,
                Err(e) => {
                    warn!(session_key = %key, error = %e, "Input not delivered");
                    false
                }
            },
            None => false,
        }
    }

    /// Stop every live session. Returns how many were stopped.
    pub fn shutdown(&mut self) -> usize {
        let keys: Vec<SessionKey> = self.sessions.keys().cloned().collect();
        let count = keys.iter().filter(|key| self.stop(key)).count();
        if count > 0 {
            info!(count, "Stopped all sessions");
        }
        count
    }

    // ========== Queries ==========

    pub fn is_live(&self, key: &SessionKey) -> bool {
        self.sessions
            .get(key)
            .map_or(false, |s| s.phase().is_live())
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn find_by_thread(&self, thread_id: &ThreadId) -> Option<&Session> {
        self.threads
            .get(thread_id)
            .and_then(|key| self.sessions.get(key))
    }

    pub fn snapshot(&self, key: &SessionKey) -> Option<DisplaySnapshot> {
        self.sessions.get(key).map(Session::snapshot)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.sessions.len(),
            ..RegistryStats::default()
        };
        for session in self.sessions.values() {
            match session.phase() {
                Phase::Starting => stats.starting += 1,
                Phase::Running => stats.running += 1,
                Phase::AwaitingInput => stats.awaiting_input += 1,
                _ => {}
            }
        }
        stats
    }

    // ========== Events ==========

    /// Apply a process or timer event
    pub fn handle(&mut self, event: SessionEvent) {
        let key = event.key().clone();
        let Some(session) = self.sessions.get_mut(&key) else {
            debug!(session_key = %key, "Event for unknown session ignored");
            return;
        };
        if session.instance() != event.instance() {
            debug!(
                session_key = %key,
                instance = event.instance(),
                live_instance = session.instance(),
                "Event from a replaced session ignored"
            );
            return;
        }

        let frame = match event {
            SessionEvent::Process {
                event: ProcessEvent::Data(chunk),
                ..
            } => {
                session.on_data(&chunk);
                None
            }
            SessionEvent::Process {
                event: ProcessEvent::Exit { code, signal },
                ..
            } => session.on_exit(code, signal),
            SessionEvent::Timer(fired) => session.on_timer(&fired),
        };

        if let Some(frame) = frame {
            self.outbox.push_back(frame);
        }
        if session_is_terminal(&self.sessions, &key) {
            self.remove(&key);
        }
    }

    /// Take the frames queued since the last call, in order
    pub fn drain_renders(&mut self) -> Vec<RenderFrame> {
        self.outbox.drain(..).collect()
    }

    fn remove(&mut self, key: &SessionKey) {
        if let Some(session) = self.sessions.remove(key) {
            if self.threads.get(session.thread_id()) == Some(key) {
                self.threads.remove(session.thread_id());
            }
            debug!(session_key = %key, phase = %session.phase(), "Session removed");
        }
    }
}

fn session_is_terminal(sessions: &HashMap<SessionKey, Session>, key: &SessionKey) -> bool {
    sessions
        .get(key)
        .map_or(false, |s| s.phase().is_terminal())
}
