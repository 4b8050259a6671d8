//! Dashboard annotations
//!
//! Experiments are marked on a Grafana dashboard so fault windows line up
//! with the metrics they disturbed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GrafanaConfig;
use crate::error::{AnnotationError, AnnotationResult, MonkeyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tag added to every annotation havoc posts
pub const HAVOC_TAG: &str = "havoc";

/// A dashboard annotation; times are unix milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(rename = "dashboardUID")]
    pub dashboard_uid: String,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<i64>,
    pub tags: Vec<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationResponse {
    id: i64,
}

/// Something that can record annotations
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Post an annotation and return its id
    async fn post_annotation(&self, annotation: &Annotation) -> AnnotationResult<i64>;
}

/// Dashboard URL, token and board id, all required
#[derive(Debug, Clone)]
pub struct GrafanaCredentials {
    pub url: String,
    pub token: String,
    pub dashboard_uid: String,
}

impl GrafanaCredentials {
    pub fn from_config(config: &GrafanaConfig) -> Result<Self, MonkeyError> {
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);

        let mut missing = Vec::new();
        for (name, value) in [
            ("GRAFANA_URL", &config.url),
            ("GRAFANA_TOKEN", &config.token),
            ("DASHBOARD_NAME", &config.dashboard_uid),
        ] {
            if present(value).is_none() {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(MonkeyError::MissingCredentials { missing: missing.join(", ") });
        }

        Ok(Self {
            url: present(&config.url).unwrap_or_default(),
            token: present(&config.token).unwrap_or_default(),
            dashboard_uid: present(&config.dashboard_uid).unwrap_or_default(),
        })
    }
}

/// Grafana HTTP API client
#[derive(Clone)]
pub struct GrafanaClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GrafanaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> AnnotationResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_credentials(credentials: &GrafanaCredentials) -> AnnotationResult<Self> {
        Self::new(credentials.url.clone(), credentials.token.clone())
    }
}

#[async_trait]
impl Annotator for GrafanaClient {
    async fn post_annotation(&self, annotation: &Annotation) -> AnnotationResult<i64> {
        let response = self
            .client
            .post(format!("{}/api/annotations", self.base_url))
            .bearer_auth(&self.token)
            .json(annotation)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnnotationError::Rejected { status: status.as_u16(), body });
        }

        let created: AnnotationResponse = response.json().await?;
        debug!(id = created.id, "Annotation posted");
        Ok(created.id)
    }
}
