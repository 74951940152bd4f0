//! Shared reqwest client construction and JSON GET helper.

use crate::config::NetworkConfig;
use crate::error::{HarvestError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Thin wrapper around a configured [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpClient {
    /// Client for catalog API calls, with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Client for catalog API calls with a custom whole-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| HarvestError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                status: None,
            })?;

        Ok(Self {
            client,
            timeout: Some(timeout),
        })
    }

    /// Client for file transfers. Only the connect phase is bounded; bodies
    /// of multi-gigabyte artifacts may stream for a long time.
    pub fn for_downloads() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::DOWNLOAD_CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| HarvestError::Network {
                message: format!("Failed to create download client: {}", e),
                status: None,
            })?;

        Ok(Self {
            client,
            timeout: None,
        })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET `url` and decode the JSON body.
    ///
    /// Non-success statuses become [`HarvestError::Network`] carrying the
    /// status code so callers can map 404 to their own not-found error.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<T> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.request_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network {
                message: format!("GET {} returned {}", url, status),
                status: Some(status.as_u16()),
            });
        }

        response.json::<T>().await.map_err(|e| HarvestError::Json {
            message: format!("Failed to decode response from {}: {}", url, e),
            source: None,
        })
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> HarvestError {
        match (err.is_timeout(), self.timeout) {
            (true, Some(timeout)) => HarvestError::Timeout(timeout),
            _ => HarvestError::Network {
                message: format!("GET {} failed: {}", url, err),
                status: err.status().map(|s| s.as_u16()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new().is_ok());
        assert!(HttpClient::for_downloads().is_ok());
    }
}
