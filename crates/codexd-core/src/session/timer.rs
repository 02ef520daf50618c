//! Per-session timers
//!
//! Each timer is a tokio sleep task that posts a generation-tagged
//! `TimerFired` into the session event channel. Cancelling aborts the task
//! and bumps the generation, so a fire already queued for a cancelled or
//! re-armed timer is recognized as stale and ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::{SessionEvent, SessionEventSender};
use crate::types::SessionKey;

// ========== Timing ==========

/// Timer durations, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet period after the last output before a render
    pub debounce_ms: u64,
    /// Quiet period after which a busy indicator is shown
    pub inactivity_ms: u64,
    /// Grace period before a spawned process is considered running
    pub start_confirm_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            inactivity_ms: 5000,
            start_confirm_ms: 3000,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::from_millis(self.inactivity_ms)
    }

    pub fn start_confirm(&self) -> Duration {
        Duration::from_millis(self.start_confirm_ms)
    }
}

// ========== Timer ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Debounce,
    Inactivity,
    StartConfirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub key: SessionKey,
    pub instance: u64,
    pub kind: TimerKind,
    pub generation: u64,
}

/// A cancellable one-shot timer
#[derive(Debug)]
pub struct SessionTimer {
    key: SessionKey,
    instance: u64,
    kind: TimerKind,
    events: SessionEventSender,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new(key: SessionKey, instance: u64, kind: TimerKind, events: SessionEventSender) -> Self {
        Self {
            key,
            instance,
            kind,
            events,
            generation: 0,
            task: None,
        }
    }

    /// (Re)start the timer; a pending fire is invalidated
    pub fn arm(&mut self, after: Duration) {
        self.cancel();

        let fired = TimerFired {
            key: self.key.clone(),
            instance: self.instance,
            kind: self.kind,
            generation: self.generation,
        };
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(SessionEvent::Timer(fired));
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Accept a fire for this timer. False for stale generations.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.task.is_none() || generation != self.generation {
            return false;
        }
        self.task = None;
        self.generation += 1;
        true
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ========== Scheduler ==========

/// The three timers of one session
#[derive(Debug)]
pub struct UpdateScheduler {
    timing: TimingConfig,
    debounce: SessionTimer,
    inactivity: SessionTimer,
    start_confirm: SessionTimer,
}

impl UpdateScheduler {
    pub fn new(
        key: SessionKey,
        instance: u64,
        timing: TimingConfig,
        events: SessionEventSender,
    ) -> Self {
        Self {
            debounce: SessionTimer::new(key.clone(), instance, TimerKind::Debounce, events.clone()),
            inactivity: SessionTimer::new(
                key.clone(),
                instance,
                TimerKind::Inactivity,
                events.clone(),
            ),
            start_confirm: SessionTimer::new(key, instance, TimerKind::StartConfirm, events),
            timing,
        }
    }

    /// Output arrived: restart debounce and inactivity
    pub fn on_activity(&mut self) {
        self.debounce.arm(self.timing.debounce());
        self.inactivity.arm(self.timing.inactivity());
    }

    /// Request a render without postponing one already pending
    pub fn schedule_render(&mut self) {
        if !self.debounce.is_armed() {
            self.debounce.arm(self.timing.debounce());
        }
    }

    pub fn arm_start_confirm(&mut self) {
        self.start_confirm.arm(self.timing.start_confirm());
    }

    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        match fired.kind {
            TimerKind::Debounce => self.debounce.accept(fired.generation),
            TimerKind::Inactivity => self.inactivity.accept(fired.generation),
            TimerKind::StartConfirm => self.start_confirm.accept(fired.generation),
        }
    }

    pub fn cancel_all(&mut self) {
        self.debounce.cancel();
        self.inactivity.cancel();
        self.start_confirm.cancel();
    }

    pub fn pending(&self) -> Vec<TimerKind> {
        [
            (TimerKind::Debounce, &self.debounce),
            (TimerKind::Inactivity, &self.inactivity),
            (TimerKind::StartConfirm, &self.start_confirm),
        ]
        .into_iter()
        .filter(|(_, timer)| timer.is_armed())
        .map(|(kind, _)| kind)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fired(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Option<TimerFired> {
        match rx.try_recv() {
            Ok(SessionEvent::Timer(fired)) => Some(fired),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(SessionKey::from("k"), 1, TimerKind::Debounce, tx);
        timer.arm(Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(fired(&mut rx).is_none());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let event = fired(&mut rx).expect("timer should fire");
        assert_eq!(event.kind, TimerKind::Debounce);
        assert_eq!(event.instance, 1);
        assert!(timer.accept(event.generation));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(SessionKey::from("k"), 1, TimerKind::Inactivity, tx);
        timer.arm(Duration::from_millis(100));
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired(&mut rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_rejects_stale_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(SessionKey::from("k"), 1, TimerKind::Debounce, tx);
        timer.arm(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let stale = fired(&mut rx).expect("first arm fires");

        // Re-armed before the queued fire was handled
        timer.arm(Duration::from_millis(100));
        assert!(!timer.accept(stale.generation));
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh = fired(&mut rx).expect("second arm fires");
        assert!(timer.accept(fresh.generation));
        // A fire is accepted only once
        assert!(!timer.accept(fresh.generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_activity_restarts_debounce() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = UpdateScheduler::new(SessionKey::from("k"), 1, TimingConfig::default(), tx);

        scheduler.on_activity();
        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.on_activity();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(fired(&mut rx).is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let event = fired(&mut rx).expect("debounce fires after quiet period");
        assert_eq!(event.kind, TimerKind::Debounce);
        assert!(scheduler.accept(&event));
        assert_eq!(scheduler.pending(), vec![TimerKind::Inactivity]);

        scheduler.cancel_all();
        assert!(scheduler.pending().is_empty());
    }
}
