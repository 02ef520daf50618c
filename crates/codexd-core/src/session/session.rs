//! Session - one assistant subprocess bound to one conversation thread
//!
//! ```text
//!   Starting ──data / start confirm──► Running ◄──► AwaitingInput
//!      │                                  │               │
//!      └─ spawn failure ─► Errored        ├── exit ──► Closed
//!                                         └── stop ──► Stopped
//! ```
//!
//! Terminal phases never transition again; events reaching a terminal
//! session are no-ops. Every method that produces a final frame moves the
//! session into a terminal phase, so at most one final frame exists.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::timer::{TimerFired, TimerKind, TimingConfig, UpdateScheduler};
use super::SessionEventSender;
use crate::pty::ProcessHandle;
use crate::render::RenderFrame;
use crate::semantic::{
    detect_completion, extract_command, extract_errors, normalize, InputWaitDetector,
    MarkerConfig, OutputPipeline,
};
use crate::types::{
    BridgeError, DisplaySnapshot, InputWait, Phase, SessionKey, ThreadId,
};

pub struct Session {
    id: String,
    key: SessionKey,
    /// Registry-assigned; tags this session's process and timer events
    instance: u64,
    thread_id: ThreadId,
    phase: Phase,
    raw_buffer: String,
    output: OutputPipeline,
    detector: InputWaitDetector,
    wait: InputWait,
    created_at: DateTime<Utc>,
    last_activity_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    exit_signal: Option<String>,
    error: Option<String>,
    process: Option<Box<dyn ProcessHandle>>,
    scheduler: UpdateScheduler,
    /// Display changed since the last render
    dirty: bool,
    /// Busy indicator was shown after the inactivity timeout
    inactive: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("instance", &self.instance)
            .field("thread_id", &self.thread_id)
            .field("phase", &self.phase)
            .field("raw_len", &self.raw_buffer.len())
            .field("display_len", &self.output.display().len())
            .field("has_process", &self.process.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(
        key: SessionKey,
        instance: u64,
        thread_id: ThreadId,
        markers: MarkerConfig,
        timing: TimingConfig,
        events: SessionEventSender,
    ) -> Self {
        let id = format!(
            "pty-{}-{}",
            Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Self {
            id,
            scheduler: UpdateScheduler::new(key.clone(), instance, timing, events),
            key,
            instance,
            thread_id,
            phase: Phase::Starting,
            raw_buffer: String::new(),
            output: OutputPipeline::new(markers),
            detector: InputWaitDetector::new(),
            wait: InputWait::not_waiting(),
            created_at: Utc::now(),
            last_activity_at: None,
            exit_code: None,
            exit_signal: None,
            error: None,
            process: None,
            dirty: false,
            inactive: false,
        }
    }

    // ========== Accessors ==========

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw_buffer
    }

    pub fn display_buffer(&self) -> &str {
        self.output.display()
    }

    pub fn partial_line(&self) -> &str {
        self.output.partial_line()
    }

    pub fn expecting_content(&self) -> bool {
        self.output.expecting_content()
    }

    pub fn ignore_rest(&self) -> bool {
        self.output.ignore_rest()
    }

    pub fn input_wait(&self) -> &InputWait {
        &self.wait
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn exit_signal(&self) -> Option<&str> {
        self.exit_signal.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_inactive(&self) -> bool {
        self.inactive
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    pub fn has_pending_render(&self) -> bool {
        self.dirty
    }

    // ========== Lifecycle ==========

    /// Take ownership of the spawned process and start the confirmation timer
    pub fn attach(&mut self, process: Box<dyn ProcessHandle>) {
        self.process = Some(process);
        self.scheduler.arm_start_confirm();
    }

    /// Spawn failed: enter Errored and produce the final frame
    pub fn fail_spawn(&mut self, reason: &str) -> RenderFrame {
        self.error = Some(reason.to_string());
        self.enter_terminal(Phase::Errored);
        self.frame(false, true)
    }

    /// Append decoded output. Returns false when the session is terminal.
    pub fn on_data(&mut self, chunk: &str) -> bool {
        if self.phase.is_terminal() {
            debug!(session_key = %self.key, "Data after terminal phase ignored");
            return false;
        }

        self.raw_buffer.push_str(chunk);
        self.last_activity_at = Some(Utc::now());
        self.inactive = false;

        if self.phase == Phase::Starting {
            info!(session_key = %self.key, session_id = %self.id, "Session running (first output)");
            self.phase = Phase::Running;
        }

        if self.output.push(chunk) {
            self.dirty = true;
        }
        self.refresh_wait();

        self.scheduler.on_activity();
        true
    }

    /// Process exited: flush, close and produce the final frame
    pub fn on_exit(&mut self, code: i32, signal: Option<String>) -> Option<RenderFrame> {
        if self.phase.is_terminal() {
            debug!(session_key = %self.key, "Exit after terminal phase ignored");
            return None;
        }

        self.output.finish();
        self.refresh_wait();
        self.exit_code = Some(code);
        self.exit_signal = signal;
        self.process = None;

        let output = normalize(&self.raw_buffer);
        info!(
            session_key = %self.key,
            exit_code = code,
            signal = ?self.exit_signal,
            command = ?extract_command(&output),
            completed = detect_completion(&output),
            "Session closed"
        );
        self.enter_terminal(Phase::Closed);
        Some(self.frame(false, true))
    }

    /// Explicit stop: kill the process and produce the final frame
    pub fn stop(&mut self) -> Option<RenderFrame> {
        if self.phase.is_terminal() {
            return None;
        }

        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.kill() {
                warn!(session_key = %self.key, error = %e, "Kill failed during stop");
            }
        }

        info!(session_key = %self.key, "Session stopped");
        self.enter_terminal(Phase::Stopped);
        Some(self.frame(false, true))
    }

    /// Forward a line of human input. Does not change the phase.
    pub fn send_input(&mut self, text: &str) -> Result<(), BridgeError> {
        if self.phase.is_terminal() {
            return Err(BridgeError::ProcessNotRunning(self.key.clone()));
        }
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| BridgeError::ProcessNotRunning(self.key.clone()))?;

        process
            .write(&format!("{}\r", text))
            .map_err(|e| BridgeError::InputFailed {
                key: self.key.clone(),
                reason: format!("{:#}", e),
            })?;

        debug!(session_key = %self.key, len = text.len(), "Input forwarded");
        Ok(())
    }

    /// Handle a timer fire. Returns a frame when one should be rendered.
    pub fn on_timer(&mut self, fired: &TimerFired) -> Option<RenderFrame> {
        if self.phase.is_terminal() || !self.scheduler.accept(fired) {
            debug!(session_key = %self.key, kind = ?fired.kind, "Stale timer ignored");
            return None;
        }

        match fired.kind {
            TimerKind::Debounce => {
                if !self.dirty {
                    return None;
                }
                self.dirty = false;
                Some(self.frame(false, false))
            }
            TimerKind::Inactivity => {
                // A prompt on screen is not "busy"
                if self.wait.is_waiting_for_input || self.phase == Phase::Starting {
                    return None;
                }
                self.inactive = true;
                self.dirty = false;
                Some(self.frame(true, false))
            }
            TimerKind::StartConfirm => {
                if self.phase != Phase::Starting {
                    return None;
                }
                if self.process.is_some() {
                    info!(session_key = %self.key, "Session running (start confirmed)");
                    self.phase = Phase::Running;
                    self.dirty = true;
                    self.scheduler.schedule_render();
                    None
                } else {
                    self.error = Some("process handle missing after start".to_string());
                    self.enter_terminal(Phase::Errored);
                    Some(self.frame(false, true))
                }
            }
        }
    }

    // ========== Views ==========

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            session_key: self.key.clone(),
            phase: self.phase,
            display_text: self.output.display().trim_end().to_string(),
            is_waiting_for_input: self.wait.is_waiting_for_input,
            prompt_type: self.wait.prompt_type,
            suggestion: self.wait.suggestion.clone(),
            exit_code: self.exit_code,
        }
    }

    fn frame(&self, busy: bool, is_final: bool) -> RenderFrame {
        RenderFrame {
            session_key: self.key.clone(),
            thread_id: self.thread_id.clone(),
            phase: self.phase,
            display_text: self.output.display().trim_end().to_string(),
            input_wait: self.wait.clone(),
            busy,
            exit_code: self.exit_code,
            exit_signal: self.exit_signal.clone(),
            errors: if is_final { self.final_errors() } else { Vec::new() },
            is_final,
        }
    }

    fn final_errors(&self) -> Vec<String> {
        let failed = self.phase == Phase::Errored || self.exit_code.map_or(false, |c| c != 0);
        if !failed {
            return Vec::new();
        }

        let mut errors = Vec::new();
        if let Some(ref reason) = self.error {
            errors.push(reason.clone());
        }
        errors.extend(extract_errors(&normalize(&self.raw_buffer)));
        errors
    }

    fn refresh_wait(&mut self) {
        if !self.phase.is_live() {
            return;
        }
        self.wait = self.detector.detect(self.output.display());
        let next = if self.wait.is_waiting_for_input {
            Phase::AwaitingInput
        } else {
            Phase::Running
        };
        if self.phase != Phase::Starting && self.phase != next {
            debug!(session_key = %self.key, from = %self.phase, to = %next, "Phase change");
            self.phase = next;
            self.dirty = true;
        }
    }

    fn enter_terminal(&mut self, phase: Phase) {
        self.phase = phase;
        self.scheduler.cancel_all();
        self.dirty = false;
    }
}
