//! codexd core
//!
//! Bridges conversation threads to interactive coding-assistant CLI
//! sessions running under a PTY.
//!
//! # Components
//! - `semantic`: terminal output normalization, reply extraction, input-wait detection
//! - `session`: per-session state machine, timers and the registry
//! - `pty`: process host seam and the portable-pty implementation
//! - `render`: renderer seam and render frames
//! - `bridge`: the event loop owning the registry, driven through `BridgeHandle`

pub mod bridge;
pub mod config;
pub mod mention;
pub mod pty;
pub mod render;
pub mod semantic;
pub mod session;
pub mod types;

pub use bridge::{Bridge, BridgeHandle};
pub use config::BridgeConfig;
pub use mention::extract_mention_text;
pub use pty::{LaunchConfig, ProcessHost, PtyHost};
pub use render::{truncate_output, LogRenderer, RenderFrame, Renderer};
pub use types::{
    BridgeError, DisplaySnapshot, InputWait, Phase, PromptType, RegistryStats, SessionKey,
    StartOutcome, TaskRequest, ThreadId,
};
