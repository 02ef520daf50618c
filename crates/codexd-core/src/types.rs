//! Core types for codexd
//!
//! Identifiers, session phases, display snapshots and the error taxonomy
//! shared by the registry, the bridge loop and the renderer seam.

use std::fmt;

use serde::{Deserialize, Serialize};

// ========== Identifiers ==========

/// Stable key of one session: conversation id + anchor message id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Build the key for a conversation and the message the session output is anchored to
    pub fn new(conversation_id: &str, anchor_message_id: &str) -> Self {
        Self(format!("{}-{}", conversation_id, anchor_message_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Conversation thread a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ========== Phase ==========

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Subprocess requested, not yet confirmed alive
    Starting,
    /// Producing output
    Running,
    /// The assistant is blocked on human input
    AwaitingInput,
    /// Terminated by an explicit stop
    Stopped,
    /// Subprocess exited (exit code recorded)
    Closed,
    /// Subprocess could not be started
    Errored,
}

impl Phase {
    /// Stopped, Closed and Errored never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Stopped | Phase::Closed | Phase::Errored)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::AwaitingInput => "awaiting_input",
            Phase::Stopped => "stopped",
            Phase::Closed => "closed",
            Phase::Errored => "errored",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== Input wait ==========

/// Category of an input prompt the assistant is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    /// Onboarding prompt offering to explain the codebase
    Explanation,
    General,
}

/// Result of input-wait classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputWait {
    pub is_waiting_for_input: bool,
    pub prompt_type: Option<PromptType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl InputWait {
    pub fn not_waiting() -> Self {
        Self::default()
    }

    pub fn waiting(prompt_type: PromptType) -> Self {
        Self {
            is_waiting_for_input: true,
            prompt_type: Some(prompt_type),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

// ========== Requests & results ==========

/// A new task or a reply arriving from the conversation event source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub thread_id: ThreadId,
    pub conversation_id: String,
    pub anchor_message_id: String,
    pub text: String,
}

impl TaskRequest {
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.conversation_id, &self.anchor_message_id)
    }
}

/// Outcome of `start_or_resume`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub session_key: SessionKey,
    pub thread_id: ThreadId,
    /// An existing live session received the text as input instead of a new spawn
    pub resumed: bool,
}

/// Point-in-time view of a session for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub session_key: SessionKey,
    pub phase: Phase,
    pub display_text: String,
    pub is_waiting_for_input: bool,
    pub prompt_type: Option<PromptType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub starting: usize,
    pub running: usize,
    pub awaiting_input: usize,
}

// ========== Errors ==========

/// Bridge errors
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn assistant for {key}: {reason}")]
    SpawnFailure { key: SessionKey, reason: String },

    #[error("Session not running: {0}")]
    ProcessNotRunning(SessionKey),

    #[error("Failed to write input to {key}: {reason}")]
    InputFailed { key: SessionKey, reason: String },

    #[error("Session key already owned by another thread: {0}")]
    KeyInUse(SessionKey),

    #[error("Bridge event loop is not running")]
    BridgeClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
