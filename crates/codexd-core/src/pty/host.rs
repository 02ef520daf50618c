//! Process host - spawns the assistant under a PTY
//!
//! `ProcessHost` is the seam between the session core and process spawning.
//! `PtyHost` is the portable-pty implementation: one blocking I/O task per
//! process reads the master side, decodes UTF-8 across read boundaries and
//! forwards text in emission order, then reports the exit status last.

use std::io::{Read, Write as IoWrite};
use std::path::PathBuf;

use anyhow::{Context, Result};
use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize,
};
use tracing::{debug, error, info, warn};

use crate::session::{SessionEvent, SessionEventSender};
use crate::types::SessionKey;

// ========== Types ==========

/// What to run for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

/// Events emitted by a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Decoded terminal output
    Data(String),
    /// Terminal event; nothing follows it
    Exit { code: i32, signal: Option<String> },
}

/// Where a process delivers its events
///
/// Events are tagged with the owning session's instance id; the registry
/// drops them once that session has been replaced.
#[derive(Debug, Clone)]
pub struct ProcessEventSink {
    key: SessionKey,
    instance: u64,
    events: SessionEventSender,
}

impl ProcessEventSink {
    pub fn new(key: SessionKey, instance: u64, events: SessionEventSender) -> Self {
        Self {
            key,
            instance,
            events,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Returns false once the receiving side is gone
    pub fn data(&self, chunk: String) -> bool {
        self.send(ProcessEvent::Data(chunk))
    }

    pub fn exit(&self, code: i32, signal: Option<String>) -> bool {
        self.send(ProcessEvent::Exit { code, signal })
    }

    fn send(&self, event: ProcessEvent) -> bool {
        self.events
            .send(SessionEvent::Process {
                key: self.key.clone(),
                instance: self.instance,
                event,
            })
            .is_ok()
    }
}

/// Handle to a spawned process, exclusively owned by its session
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Write raw input to the process
    fn write(&mut self, data: &str) -> Result<()>;

    /// Ask the process to terminate. Best effort: the exit event drives cleanup.
    fn kill(&mut self) -> Result<()>;
}

/// Spawns processes
pub trait ProcessHost: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec, sink: ProcessEventSink) -> Result<Box<dyn ProcessHandle>>;
}

// ========== UTF-8 decoding ==========

/// Incremental UTF-8 decoder: holds an incomplete trailing sequence
/// until the next read completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            // Invalid sequence, not just truncated
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush a truncated trailing sequence at end of stream
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

// ========== PtyHost ==========

/// portable-pty backed process host
#[derive(Debug, Default)]
pub struct PtyHost;

impl PtyHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for PtyHost {
    fn spawn(&self, spec: &LaunchSpec, sink: ProcessEventSink) -> Result<Box<dyn ProcessHandle>> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(ref cwd) = spec.cwd {
            cmd.cwd(cwd);
        }

        // CommandBuilder starts with an empty env
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", spec.program))?;
        // Reader sees EOF once the child closes its side
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let writer = pair.master.take_writer().context("Failed to take PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;

        info!(session_key = %sink.key(), pid = ?pid, program = %spec.program, "PTY spawned");

        tokio::task::spawn_blocking(move || io_loop(reader, child, sink));

        Ok(Box::new(PtyProcess {
            pid,
            writer,
            killer,
            _master: pair.master,
        }))
    }
}

/// Read until EOF, then wait for the child so Exit is always the last event
fn io_loop(mut reader: Box<dyn Read + Send>, mut child: Box<dyn Child + Send + Sync>, sink: ProcessEventSink) {
    let mut decoder = Utf8Decoder::new();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() && !sink.data(text) {
                    debug!(session_key = %sink.key(), "Event receiver gone, stopping PTY reader");
                    break;
                }
            }
            // EIO on the master is how Linux reports the slave side closing
            Err(e) => {
                debug!(session_key = %sink.key(), error = %e, "PTY read ended");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        sink.data(tail);
    }

    let (code, signal) = match child.wait() {
        Ok(status) => (status.exit_code() as i32, exit_signal(&status)),
        Err(e) => {
            error!(session_key = %sink.key(), error = %e, "Failed to wait for PTY child");
            (-1, None)
        }
    };

    info!(session_key = %sink.key(), exit_code = code, signal = ?signal, "PTY exited");
    sink.exit(code, signal);
}

/// Name of the signal that terminated the child, if any
///
/// portable-pty keeps the signal private and only exposes it through
/// `Display` ("Terminated by <signal>").
fn exit_signal(status: &ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    status
        .to_string()
        .strip_prefix("Terminated by ")
        .map(str::to_string)
}

struct PtyProcess {
    pid: Option<u32>,
    writer: Box<dyn IoWrite + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    _master: Box<dyn MasterPty + Send>,
}

impl ProcessHandle for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&mut self, data: &str) -> Result<()> {
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()?;
        debug!(data_len = data.len(), "Wrote to PTY");
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        if let Err(e) = self.killer.kill() {
            warn!(pid = ?self.pid, error = %e, "Failed to kill PTY child");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_decoder_passes_ascii() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"codex\n"), "codex\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_joins_split_multibyte() {
        // "╭─" is E2 95 AD E2 94 80
        let bytes = "╭─╮".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        assert_eq!(out, "╭─╮");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_finish_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xe2\x95"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_sink_tags_events_with_key() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProcessEventSink::new(SessionKey::from("C1-1"), 7, tx);
        assert!(sink.data("hello".to_string()));
        assert!(sink.exit(0, None));

        match rx.try_recv().unwrap() {
            SessionEvent::Process {
                key,
                instance,
                event,
            } => {
                assert_eq!(key.as_str(), "C1-1");
                assert_eq!(instance, 7);
                assert_eq!(event, ProcessEvent::Data("hello".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            SessionEvent::Process { event, .. } => {
                assert_eq!(event, ProcessEvent::Exit { code: 0, signal: None });
            }
            other => panic!("unexpected event: {:?}", other),
        }

        drop(rx);
        assert!(!sink.data("late".to_string()));
    }

    #[test]
    fn test_exit_signal_from_status() {
        assert_eq!(exit_signal(&ExitStatus::with_exit_code(0)), None);
        assert_eq!(exit_signal(&ExitStatus::with_exit_code(2)), None);
        assert_eq!(
            exit_signal(&ExitStatus::with_signal("Terminated")),
            Some("Terminated".to_string())
        );
    }
}
