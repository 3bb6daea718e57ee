use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::{Liveness, LivenessProbe};

/// Single-shot HTTP GET prober. Only a 200 counts as live.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Self::build_client(timeout)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &crate::config::ResolverConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.probe_timeout)
    }

    pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .gzip(true)
            .build()
    }

    pub async fn classify(&self, url: &str) -> Liveness {
        match self.client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => Liveness::Live,
            Ok(response) => Liveness::Dead {
                status: response.status().as_u16(),
            },
            Err(e) if e.is_timeout() => Liveness::TimedOut,
            Err(e) => Liveness::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpProber {
    async fn probe(&self, url: &str) -> bool {
        let outcome = self.classify(url).await;
        match &outcome {
            Liveness::Live => debug!(url, "Manifest is live"),
            other => warn!(url, outcome = %other, "Manifest failed liveness probe"),
        }
        outcome.is_live()
    }
}
