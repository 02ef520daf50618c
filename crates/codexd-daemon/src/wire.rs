//! Line-delimited JSON protocol on stdin/stdout
//!
//! Inbound lines are conversation events and UI actions; outbound lines
//! are command results and render frames. One JSON object per line.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use codexd_core::render::RenderConfig;
use codexd_core::{
    DisplaySnapshot, LogRenderer, RegistryStats, RenderFrame, Renderer, SessionKey, StartOutcome,
    ThreadId,
};

// ============ Inbound ============

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A mention or thread reply; starts a session or feeds the live one
    #[serde(rename_all = "camelCase")]
    Message {
        thread_id: ThreadId,
        conversation_id: String,
        message_id: String,
        text: String,
    },
    /// Input typed into a session (e.g. from a resume modal)
    #[serde(rename_all = "camelCase")]
    Input { session_key: SessionKey, text: String },
    #[serde(rename_all = "camelCase")]
    Stop { session_key: SessionKey },
    #[serde(rename_all = "camelCase")]
    Snapshot { session_key: SessionKey },
    Stats,
}

impl Inbound {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

// ============ Outbound ============

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Started(StartOutcome),
    #[serde(rename_all = "camelCase")]
    Rejected { thread_id: ThreadId, reason: String },
    #[serde(rename_all = "camelCase")]
    Stopped { session_key: SessionKey, stopped: bool },
    #[serde(rename_all = "camelCase")]
    InputDelivered { session_key: SessionKey, delivered: bool },
    #[serde(rename_all = "camelCase")]
    Snapshot {
        session_key: SessionKey,
        snapshot: Option<DisplaySnapshot>,
    },
    Stats(RegistryStats),
    Frame(RenderFrame),
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<ThreadId>,
        message: String,
    },
}

/// Serializes whole lines onto a shared writer
pub struct JsonLineWriter {
    out: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl JsonLineWriter {
    pub fn new(out: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    pub async fn emit(&self, message: &Outbound) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }
}

/// Renders frames as `frame` lines with the display text capped.
/// Every frame is also traced through `LogRenderer`.
pub struct JsonLineRenderer {
    writer: Arc<JsonLineWriter>,
    log: LogRenderer,
    max_output_len: usize,
}

impl JsonLineRenderer {
    pub fn new(writer: Arc<JsonLineWriter>, config: &RenderConfig) -> Self {
        Self {
            writer,
            log: LogRenderer::new(config),
            max_output_len: config.max_output_len,
        }
    }
}

#[async_trait::async_trait]
impl Renderer for JsonLineRenderer {
    async fn render(&self, frame: &RenderFrame) -> Result<()> {
        self.log.render(frame).await?;
        let mut frame = frame.clone();
        frame.display_text = frame.truncated_text(self.max_output_len);
        self.writer.emit(&Outbound::Frame(frame)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codexd_core::{InputWait, Phase};

    #[test]
    fn test_parse_message() {
        let line = r#"{"type":"message","threadId":"T1","conversationId":"C1","messageId":"1700.1","text":"<@U1> fix it"}"#;
        assert_eq!(
            Inbound::parse(line).unwrap(),
            Inbound::Message {
                thread_id: ThreadId::from("T1"),
                conversation_id: "C1".to_string(),
                message_id: "1700.1".to_string(),
                text: "<@U1> fix it".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            Inbound::parse(r#"{"type":"stop","sessionKey":"C1-1"}"#).unwrap(),
            Inbound::Stop {
                session_key: SessionKey::from("C1-1")
            }
        );
        assert_eq!(Inbound::parse(r#"{"type":"stats"}"#).unwrap(), Inbound::Stats);
        assert!(Inbound::parse(r#"{"type":"reboot"}"#).is_err());
        assert!(Inbound::parse("not json").is_err());
    }

    #[test]
    fn test_outbound_shapes() {
        let json = serde_json::to_value(Outbound::Stopped {
            session_key: SessionKey::from("C1-1"),
            stopped: true,
        })
        .unwrap();
        assert_eq!(json["type"], "stopped");
        assert_eq!(json["sessionKey"], "C1-1");

        let json = serde_json::to_value(Outbound::Started(StartOutcome {
            session_key: SessionKey::from("C1-1"),
            thread_id: ThreadId::from("T1"),
            resumed: true,
        }))
        .unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["resumed"], true);
    }

    #[tokio::test]
    async fn test_renderer_truncates_and_writes_line() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(JsonLineWriter::new(Box::new(client)));
        let renderer = JsonLineRenderer::new(writer, &RenderConfig { max_output_len: 20 });

        let frame = RenderFrame {
            session_key: SessionKey::from("C1-1"),
            thread_id: ThreadId::from("T1"),
            phase: Phase::Running,
            display_text: "x".repeat(50),
            input_wait: InputWait::not_waiting(),
            busy: false,
            exit_code: None,
            exit_signal: None,
            errors: Vec::new(),
            is_final: false,
        };
        renderer.render(&frame).await.unwrap();

        let mut buf = vec![0u8; 64 * 1024];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf).await.unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(line.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["displayText"], format!("...\n{}", "x".repeat(10)));
        assert_eq!(json["final"], false);
    }
}
