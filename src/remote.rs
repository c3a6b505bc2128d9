//! HTTP clients for the remote collaborators: the SOS pending queue and
//! the device-snapshot provider.
//!
//! Both are narrow, typed wrappers over reqwest's blocking client. Errors
//! bubble up as `anyhow::Error`; watchers treat them as transient, log a
//! warning, and carry on with an empty cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;

use crate::emergency::Snapshot;
use crate::task::SosRequest;

fn http_client(timeout_secs: u64) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("safewatch")
        .build()
        .context("Failed to build HTTP client")
}

/// Client for the SOS queue: the remote task source of record.
pub struct SosClient {
    http: HttpClient,
    base_url: String,
}

impl SosClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the currently pending requests.
    pub fn pending(&self) -> Result<Vec<SosRequest>> {
        let url = format!("{}/pending", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Failed to fetch pending requests from {}", url))?
            .error_for_status()
            .context("SOS server returned an error status")?;

        resp.json()
            .context("Failed to parse pending-request list")
    }

    /// Remote half of the idempotency ledger: tell the source of record a
    /// request has been handled. Only the server may move a request away
    /// from pending.
    pub fn acknowledge(&self, id: &str) -> Result<()> {
        let url = format!("{}/complete/{}", self.base_url, id);
        self.http
            .post(&url)
            .send()
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("Server refused completion of request {}", id))?;
        Ok(())
    }
}

/// Client for the device-snapshot provider.
pub struct MonitorClient {
    http: HttpClient,
    base_url: String,
}

impl MonitorClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The most recent snapshots, newest first.
    pub fn snapshots(&self, limit: usize) -> Result<Vec<Snapshot>> {
        let url = format!("{}/snapshots?limit={}", self.base_url, limit);
        self.http
            .get(&url)
            .send()
            .with_context(|| format!("Failed to fetch snapshots from {}", url))?
            .error_for_status()
            .context("Snapshot provider returned an error status")?
            .json()
            .context("Failed to parse snapshot list")
    }

    /// Snapshots from the last `hours` hours, newest first.
    pub fn recent_snapshots(&self, hours: i64, limit: usize) -> Result<Vec<Snapshot>> {
        let url = format!(
            "{}/snapshots/recent?hours={}&limit={}",
            self.base_url, hours, limit
        );
        self.http
            .get(&url)
            .send()
            .with_context(|| format!("Failed to fetch recent snapshots from {}", url))?
            .error_for_status()
            .context("Snapshot provider returned an error status")?
            .json()
            .context("Failed to parse snapshot list")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SosClient::new("https://sos.example.com/", 5).unwrap();
        assert_eq!(client.base_url, "https://sos.example.com");

        let client = MonitorClient::new("https://api.example.com///", 5).unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }

    #[test]
    fn test_unreachable_server_is_error_not_panic() {
        let client = SosClient::new("http://127.0.0.1:1", 1).unwrap();
        assert!(client.pending().is_err());
        assert!(client.acknowledge("req-1").is_err());

        let client = MonitorClient::new("http://127.0.0.1:1", 1).unwrap();
        assert!(client.snapshots(10).is_err());
        assert!(client.recent_snapshots(24, 10).is_err());
    }
}
