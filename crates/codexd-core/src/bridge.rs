//! Bridge - the event loop that owns the session registry
//!
//! One task owns `SessionRegistry` and serializes everything that touches
//! it: commands from the UI layer (through `BridgeHandle`), process output
//! and exits, and timer fires. After each step the queued render frames
//! are flushed to the `Renderer` in order.
//!
//! ```text
//! BridgeHandle ──Command──┐
//!                         ├──► Bridge::run ──► SessionRegistry ──frames──► Renderer
//! PTY / timers ──Event────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::pty::ProcessHost;
use crate::render::Renderer;
use crate::session::{SessionEventReceiver, SessionRegistry};
use crate::types::{
    BridgeError, DisplaySnapshot, RegistryStats, SessionKey, StartOutcome, TaskRequest,
};

const COMMAND_CHANNEL_CAPACITY: usize = 256;

// ========== Commands ==========

#[derive(Debug)]
enum Command {
    StartOrResume {
        request: TaskRequest,
        reply: oneshot::Sender<Result<StartOutcome, BridgeError>>,
    },
    Stop {
        key: SessionKey,
        reply: oneshot::Sender<bool>,
    },
    SendInput {
        key: SessionKey,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    IsLive {
        key: SessionKey,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        key: SessionKey,
        reply: oneshot::Sender<Option<DisplaySnapshot>>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

// ========== Handle ==========

/// Cloneable entry point used by the UI layer
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<Command>,
}

impl BridgeHandle {
    /// Start a session for the request's thread, or forward the text to its live session
    pub async fn start_or_resume(&self, request: TaskRequest) -> Result<StartOutcome, BridgeError> {
        self.call(|reply| Command::StartOrResume { request, reply }).await?
    }

    pub async fn stop(&self, key: &SessionKey) -> bool {
        let key = key.clone();
        self.call(|reply| Command::Stop { key, reply })
            .await
            .unwrap_or(false)
    }

    /// Returns false when the session is unknown, terminal or the write failed
    pub async fn send_input(&self, key: &SessionKey, text: &str) -> bool {
        let key = key.clone();
        let text = text.to_string();
        self.call(|reply| Command::SendInput { key, text, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn is_live(&self, key: &SessionKey) -> bool {
        let key = key.clone();
        self.call(|reply| Command::IsLive { key, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn snapshot(&self, key: &SessionKey) -> Option<DisplaySnapshot> {
        let key = key.clone();
        self.call(|reply| Command::Snapshot { key, reply })
            .await
            .ok()
            .flatten()
    }

    pub async fn stats(&self) -> Result<RegistryStats, BridgeError> {
        self.call(|reply| Command::Stats { reply }).await
    }

    /// Stop all sessions and end the loop. Returns how many sessions were stopped.
    pub async fn shutdown(&self) -> Result<usize, BridgeError> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| BridgeError::BridgeClosed)?;
        rx.await.map_err(|_| BridgeError::BridgeClosed)
    }
}

// ========== Bridge ==========

pub struct Bridge {
    registry: SessionRegistry,
    renderer: Arc<dyn Renderer>,
    commands: mpsc::Receiver<Command>,
    events: SessionEventReceiver,
}

impl Bridge {
    pub fn new(
        config: &BridgeConfig,
        host: Arc<dyn ProcessHost>,
        renderer: Arc<dyn Renderer>,
    ) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let bridge = Self {
            registry: SessionRegistry::new(host, config, event_tx),
            renderer,
            commands: command_rx,
            events: event_rx,
        };
        (bridge, BridgeHandle { commands: command_tx })
    }

    /// Run the loop on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown is requested or every handle is dropped
    pub async fn run(mut self) {
        info!("Bridge started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All bridge handles dropped");
                        break;
                    };
                    let done = self.dispatch(command);
                    self.flush().await;
                    if done {
                        info!("Bridge shut down");
                        return;
                    }
                }
                Some(event) = self.events.recv() => {
                    self.registry.handle(event);
                    self.flush().await;
                }
            }
        }

        let stopped = self.registry.shutdown();
        self.flush().await;
        info!(stopped, "Bridge stopped");
    }

    /// Apply one command. Returns true when the loop should end.
    fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::StartOrResume { request, reply } => {
                let _ = reply.send(self.registry.start_or_resume(&request));
            }
            Command::Stop { key, reply } => {
                let _ = reply.send(self.registry.stop(&key));
            }
            Command::SendInput { key, text, reply } => {
                let _ = reply.send(self.registry.send_input(&key, &text));
            }
            Command::IsLive { key, reply } => {
                let _ = reply.send(self.registry.is_live(&key));
            }
            Command::Snapshot { key, reply } => {
                let _ = reply.send(self.registry.snapshot(&key));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.registry.stats());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.registry.shutdown());
                return true;
            }
        }
        false
    }

    async fn flush(&mut self) {
        for frame in self.registry.drain_renders() {
            if let Err(e) = self.renderer.render(&frame).await {
                warn!(
                    session_key = %frame.session_key,
                    phase = %frame.phase,
                    error = %e,
                    "Render failed, frame dropped"
                );
            }
        }
    }
}
