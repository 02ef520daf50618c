//! In-memory process host for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::host::{LaunchSpec, ProcessEventSink, ProcessHandle, ProcessHost};
use crate::types::SessionKey;

#[derive(Debug, Clone)]
pub(crate) struct Spawned {
    pub key: SessionKey,
    pub spec: LaunchSpec,
    pub sink: ProcessEventSink,
    pub writes: Arc<Mutex<Vec<String>>>,
    pub killed: Arc<AtomicBool>,
}

#[derive(Default)]
struct FakeState {
    spawned: Vec<Spawned>,
    fail_next: Option<String>,
}

/// Records spawns, writes and kills; never runs anything
#[derive(Clone, Default)]
pub(crate) struct FakeHost {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_spawn(&self, reason: &str) {
        self.state.lock().unwrap().fail_next = Some(reason.to_string());
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned.len()
    }

    /// Most recent spawn for `key`
    pub fn spawned(&self, key: &SessionKey) -> Option<Spawned> {
        self.state
            .lock()
            .unwrap()
            .spawned
            .iter()
            .rev()
            .find(|s| &s.key == key)
            .cloned()
    }

    pub fn writes(&self, key: &SessionKey) -> Vec<String> {
        self.spawned(key)
            .map(|s| s.writes.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn was_killed(&self, key: &SessionKey) -> bool {
        self.spawned(key)
            .map(|s| s.killed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl ProcessHost for FakeHost {
    fn spawn(&self, spec: &LaunchSpec, sink: ProcessEventSink) -> Result<Box<dyn ProcessHandle>> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_next.take() {
            return Err(anyhow!(reason));
        }

        let writes = Arc::new(Mutex::new(Vec::new()));
        let killed = Arc::new(AtomicBool::new(false));
        state.spawned.push(Spawned {
            key: sink.key().clone(),
            spec: spec.clone(),
            sink,
            writes: writes.clone(),
            killed: killed.clone(),
        });

        Ok(Box::new(FakeProcess { writes, killed }))
    }
}

struct FakeProcess {
    writes: Arc<Mutex<Vec<String>>>,
    killed: Arc<AtomicBool>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn write(&mut self, data: &str) -> Result<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(anyhow!("process killed"));
        }
        self.writes.lock().unwrap().push(data.to_string());
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
