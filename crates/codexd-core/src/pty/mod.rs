//! PTY Module - Process hosting for assistant sessions
//!
//! Architecture: portable-pty (process) + semantic (output parsing, in `crate::semantic`)
//!
//! # Components
//! - `ProcessHost` / `ProcessHandle`: spawn seam, swapped for an in-memory host in tests
//! - `PtyHost`: portable-pty implementation
//! - `LaunchConfig`: command line and terminal settings for the assistant CLI

#[cfg(test)]
pub(crate) mod fake;
mod host;
mod launch;

pub use host::{
    LaunchSpec, ProcessEvent, ProcessEventSink, ProcessHandle, ProcessHost, PtyHost, Utf8Decoder,
};
pub use launch::LaunchConfig;
