//! Exchange API reachability probe

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::Result;

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reachable: bool,
    /// HTTP status, when a response arrived
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Bounded-time check that an external endpoint answers
#[async_trait::async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// Single GET with connect and total timeouts. Any HTTP response counts as
/// reachable; the body is never inspected.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> ProbeResult {
        let started = Instant::now();
        let result = self.client.get(&self.url).send().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                debug!("Probe {} -> {} in {}ms", self.url, response.status(), elapsed_ms);
                ProbeResult {
                    reachable: true,
                    status: Some(response.status().as_u16()),
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!("Probe {} failed after {}ms: {}", self.url, elapsed_ms, reason);
                ProbeResult {
                    reachable: false,
                    status: None,
                    elapsed_ms,
                    error: Some(reason),
                }
            }
        }
    }
}
