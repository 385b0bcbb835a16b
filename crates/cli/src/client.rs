//! HTTP client for scraping the exporter's metrics endpoint

use anyhow::{Context, Result};
use reqwest::Client;
use url::Url;

use crate::exposition::{self, Sample};
use crate::report::ExporterSnapshot;

/// Client for a running serverless exporter
pub struct ExporterClient {
    client: Client,
    base_url: Url,
}

impl ExporterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid exporter URL")?;

        Ok(Self { client, base_url })
    }

    /// Fetch and parse every sample from `/metrics`
    pub async fn scrape(&self) -> Result<Vec<Sample>> {
        let url = self.base_url.join("metrics").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach exporter")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Exporter error ({}): {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read metrics body")?;
        Ok(exposition::parse(&body))
    }

    pub async fn snapshot(&self) -> Result<ExporterSnapshot> {
        let samples = self.scrape().await?;
        Ok(ExporterSnapshot::from_samples(&samples))
    }
}
