use std::time::Duration;

use alloy::primitives::Address;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use bondfi_connection_core::{NameResolverPort, PortError};

use crate::config::ENS_TIMEOUT_MS;

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    name: Option<String>,
}

/// Name lookups through an HTTP ENS gateway.
///
/// `GET {base}/resolve/{name}` answers `{"address": ...}` and
/// `GET {base}/reverse/{address}` answers `{"name": ...}`. A 404 means the
/// name or address has no record.
#[derive(Debug, Clone)]
pub struct EnsApiAdapter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EnsApiAdapter {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PortError> {
        Self::with_timeout(base_url, ENS_TIMEOUT_MS)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, PortError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("ens client init failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PortError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "ens lookup");
        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                PortError::Transport(format!("ens lookup timed out: {url}"))
            } else {
                PortError::Transport(format!("ens lookup failed: {e}"))
            }
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response
                .json()
                .map(Some)
                .map_err(|e| PortError::Transport(format!("ens response decode failed: {e}"))),
            s => {
                warn!(%url, status = %s, "ens lookup rejected");
                Err(PortError::Transport(format!("ens status {s}")))
            }
        }
    }
}

impl NameResolverPort for EnsApiAdapter {
    fn resolve(&self, name: &str) -> Result<Option<Address>, PortError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::Validation("empty ens name".to_owned()));
        }
        let Some(body) = self.get::<ResolveResponse>(&format!("/resolve/{name}"))? else {
            return Ok(None);
        };
        body.address
            .map(|raw| {
                raw.parse()
                    .map_err(|e| PortError::Validation(format!("invalid resolved address: {e}")))
            })
            .transpose()
    }

    fn reverse(&self, address: Address) -> Result<Option<String>, PortError> {
        let body = self.get::<ReverseResponse>(&format!("/reverse/{address}"))?;
        Ok(body.and_then(|b| b.name).filter(|n| !n.is_empty()))
    }
}
