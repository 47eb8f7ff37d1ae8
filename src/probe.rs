//! HTTP probes outside the lifecycle state machine
//!
//! - [`LifecycleController::ping_application`] requests a path on the first route
//!   of the application
//! - [`AutosleepProbe`] asks the autosleep service which applications it knows

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::config::AutosleepConfig;
use crate::controller::LifecycleController;
use crate::platform::ApplicationStats;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

fn probe_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| Error::transport("build probe client", e))
}

/// First route reported by any instance of the application
pub fn first_route(stats: &ApplicationStats) -> Option<&str> {
    stats
        .values()
        .filter_map(|instance| instance.stats.as_ref())
        .find_map(|detail| detail.uris.first())
        .map(String::as_str)
}

impl LifecycleController {
    /// `GET http://<route><path>` on the application and expect a 200
    pub async fn ping_application(&self, path: &str) -> Result<()> {
        let stats = self.api().application_stats(&self.application().guid).await?;
        if stats.is_empty() {
            return Err(Error::assertion(format!(
                "no stats found for application {}",
                self.application()
            )));
        }
        let route = first_route(&stats).ok_or_else(|| {
            Error::assertion(format!("no route found for application {}", self.application()))
        })?;

        let url = format!("http://{}{}", route, path);
        info!(url = %url, "ping_application - requesting");
        let response = probe_client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport("ping application", e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::assertion(format!(
                "ping {} answered {}",
                url, status
            )));
        }
        info!("ping_application - ok");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationList {
    #[serde(default)]
    body: Vec<KnownApplication>,
}

#[derive(Debug, Deserialize)]
struct KnownApplication {
    name: String,
}

/// Client for the autosleep service dashboard API
pub struct AutosleepProbe {
    http: reqwest::Client,
    config: AutosleepConfig,
    application_name: String,
}

impl AutosleepProbe {
    /// Create a probe watching `application_name`
    pub fn new(config: AutosleepConfig, application_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: probe_client()?,
            config,
            application_name: application_name.into(),
        })
    }

    /// Fail if the service still lists the application
    pub async fn should_not_know_application(&self) -> Result<()> {
        let operation = "list autosleep applications";
        let url = format!("{}/api/applications/", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(crate::error::RemoteError::new(operation, status).into());
        }
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(operation, e))?;
        let list: ApplicationList =
            serde_json::from_str(&text).map_err(|e| Error::malformed(operation, e.to_string()))?;

        if knows_application(&list, &self.application_name) {
            return Err(Error::assertion(format!(
                "{} is still listed by the autosleep service",
                self.application_name
            )));
        }
        info!(application = %self.application_name, "should_not_know_application - ok");
        Ok(())
    }
}

fn knows_application(list: &ApplicationList, name: &str) -> bool {
    list.body.iter().any(|app| app.name == name)
}
