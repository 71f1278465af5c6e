//! Client for the external credential-regeneration workflow
//!
//! Used only by the deep-external strategy: one POST that asks the
//! workflow-automation service to drive a fresh portal sign-in. The service
//! deposits the new credential into the store out of band; this client never
//! sees the credential itself.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;

use super::config::WorkflowConfig;

#[derive(Serialize)]
struct WorkflowPayload<'a> {
    token: &'a str,
    device_id: &'a str,
    profile_id: &'a str,
    workflow_id: &'a str,
    soft_id: &'a str,
    close_browser: bool,
}

/// HTTP client for the recovery-workflow endpoint
#[derive(Clone)]
pub struct WorkflowClient {
    http_client: reqwest::Client,
    config: WorkflowConfig,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent("declare-cli/1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Trigger the regeneration workflow.
    ///
    /// A non-2xx response is logged and tolerated; the strategy proceeds to
    /// its settle delay and refresh regardless. Only transport failures
    /// surface as errors, and the orchestrator tolerates those too.
    pub async fn trigger(&self, token: &str) -> Result<()> {
        if !self.is_configured() {
            warn!("Recovery workflow endpoint not configured, skipping external call");
            return Ok(());
        }

        let payload = WorkflowPayload {
            token,
            device_id: &self.config.device_id,
            profile_id: &self.config.profile_id,
            workflow_id: &self.config.workflow_id,
            soft_id: &self.config.soft_id,
            close_browser: self.config.close_browser,
        };

        debug!(
            "Triggering recovery workflow {} at {}",
            self.config.workflow_id, self.config.endpoint
        );

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&payload)
            .send()
            .await
            .context("Recovery workflow request failed")?;

        if response.status().is_success() {
            debug!("Recovery workflow accepted (status {})", response.status());
        } else {
            warn!(
                "Recovery workflow returned {}, proceeding anyway",
                response.status()
            );
        }

        Ok(())
    }
}
