//! Chaos listeners shipped with havoc

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::annotate::{Annotation, Annotator, HAVOC_TAG};
use crate::error::Result;
use crate::lifecycle::{ChaosListener, ChaosSnapshot};

/// Marks chaos start and end on a dashboard
pub struct DashboardAnnotator {
    annotator: Arc<dyn Annotator>,
    dashboard_uid: String,
}

impl DashboardAnnotator {
    pub fn new(annotator: Arc<dyn Annotator>, dashboard_uid: impl Into<String>) -> Self {
        Self { annotator, dashboard_uid: dashboard_uid.into() }
    }

    async fn post(&self, chaos: &ChaosSnapshot, phase: &str, at: DateTime<Utc>) -> Result<()> {
        let annotation = Annotation {
            dashboard_uid: self.dashboard_uid.clone(),
            time: at.timestamp_millis(),
            time_end: None,
            tags: vec![HAVOC_TAG.to_string(), chaos.type_label()],
            text: annotation_body(chaos, phase),
        };
        self.annotator.post_annotation(&annotation).await?;
        Ok(())
    }
}

fn rfc3339(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "-".to_string())
}

/// HTML body shown in the annotation tooltip
pub fn annotation_body(chaos: &ChaosSnapshot, phase: &str) -> String {
    let mut body = String::from("<body>");
    let _ = write!(body, "<h4>{} {}</h4>", chaos.type_label(), phase);
    let _ = write!(body, "<div>Name: {}</div>", chaos.name);
    if !chaos.description.is_empty() {
        let _ = write!(body, "<div>Description: {}</div>", chaos.description);
    }
    let _ = write!(body, "<div>Start Time: {}</div>", rfc3339(chaos.started_at));
    if chaos.ended_at.is_some() {
        let _ = write!(body, "<div>End Time: {}</div>", rfc3339(chaos.ended_at));
    }
    if let Some(elapsed) = chaos.elapsed() {
        let _ = write!(body, "<div>Duration: {}s</div>", elapsed.num_seconds());
    }
    if !chaos.spec.is_empty() {
        let _ = write!(body, "<br><h5>Spec:</h5><pre>{}</pre><br>", chaos.spec);
    }
    body.push_str("</body>");
    body
}

#[async_trait]
impl ChaosListener for DashboardAnnotator {
    async fn on_chaos_started(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.post(chaos, "Started", chaos.started_at.unwrap_or_else(Utc::now)).await
    }

    async fn on_chaos_ended(&self, chaos: &ChaosSnapshot) -> Result<()> {
        self.post(chaos, "Ended", chaos.ended_at.unwrap_or_else(Utc::now)).await
    }
}
