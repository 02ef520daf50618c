//! Render sink
//!
//! The session core produces `RenderFrame`s; a `Renderer` turns them into
//! chat updates. Frames for one session are delivered in order and a final
//! frame is always the last one for its session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{InputWait, Phase, SessionKey, ThreadId};

/// Character cap applied by renderers to the visible text
pub const MAX_OUTPUT_LENGTH: usize = 2900;

/// Marker placed in front of truncated output
const TRUNCATION_MARKER: &str = "...\n";

/// Room reserved for the marker and any renderer decoration
const TRUNCATION_SLACK: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub max_output_len: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_output_len: MAX_OUTPUT_LENGTH,
        }
    }
}

/// One visible update for a conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
    pub session_key: SessionKey,
    pub thread_id: ThreadId,
    pub phase: Phase,
    pub display_text: String,
    #[serde(flatten)]
    pub input_wait: InputWait,
    /// The assistant went quiet without asking for input
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Signal that terminated the process, when it did not exit on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_signal: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Last frame for this session
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl RenderFrame {
    pub fn truncated_text(&self, max_len: usize) -> String {
        truncate_output(&self.display_text, max_len)
    }
}

/// Delivers frames to the chat surface
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, frame: &RenderFrame) -> anyhow::Result<()>;
}

/// Keep the tail of `text` within `max_len` characters
///
/// Longer text is cut to its last `max_len - 10` characters behind a `...` line.
pub fn truncate_output(text: &str, max_len: usize) -> String {
    let total = text.chars().count();
    if total <= max_len {
        return text.to_string();
    }

    let keep = max_len.saturating_sub(TRUNCATION_SLACK);
    let tail: String = text.chars().skip(total - keep).collect();
    format!("{}{}", TRUNCATION_MARKER, tail)
}

/// Writes frames to the log at debug level
#[derive(Debug, Clone)]
pub struct LogRenderer {
    max_output_len: usize,
}

impl LogRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_output_len: config.max_output_len,
        }
    }
}

#[async_trait::async_trait]
impl Renderer for LogRenderer {
    async fn render(&self, frame: &RenderFrame) -> anyhow::Result<()> {
        debug!(
            session_key = %frame.session_key,
            thread_id = %frame.thread_id,
            phase = %frame.phase,
            waiting = frame.input_wait.is_waiting_for_input,
            busy = frame.busy,
            is_final = frame.is_final,
            exit_code = ?frame.exit_code,
            text = %frame.truncated_text(self.max_output_len),
            "Render"
        );
        Ok(())
    }
}
