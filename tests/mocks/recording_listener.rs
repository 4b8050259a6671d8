use std::sync::Mutex;

use async_trait::async_trait;
use havoc::error::{AnnotationError, Result};
use havoc::lifecycle::ChaosSnapshot;
use havoc::{ChaosListener, ChaosStatus};

/// Captures every lifecycle notification as `(event, status at notification)`
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(String, ChaosStatus)>>,
    fail: bool,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records like [`new`](Self::new) but returns an error from every callback
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn events(&self) -> Vec<String> {
        self.entries().into_iter().map(|(event, _)| event).collect()
    }

    pub fn entries(&self) -> Vec<(String, ChaosStatus)> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, event: &str, chaos: &ChaosSnapshot) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((event.to_string(), chaos.status));
        if self.fail {
            return Err(AnnotationError::Rejected { status: 503, body: event.to_string() }.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ChaosListener for RecordingListener {
    async fn on_chaos_created(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.record("created", chaos)
    }

    async fn on_chaos_creation_failed(&self, chaos: &ChaosSnapshot, _reason: &str) -> Result<()> {
        self.record("creation_failed", chaos)
    }

    async fn on_chaos_started(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.record("started", chaos)
    }

    async fn on_chaos_paused(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.record("paused", chaos)
    }

    async fn on_chaos_ended(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.record("ended", chaos)
    }

    async fn on_chaos_status_unknown(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.record("status_unknown", chaos)
    }
}
