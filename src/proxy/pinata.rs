//! IPFS pinning via Pinata.
//!
//! Website metadata and creative documents are pinned as JSON so their
//! hashes can be referenced from the registry contract. Reads go through
//! the configured IPFS gateway. No retry layer: failures surface as 500.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_API_BASE: &str = "https://api.pinata.cloud";

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Clone)]
pub struct PinataClient {
    client: reqwest::Client,
    jwt: String,
    api_base: String,
    gateway: String,
}

impl PinataClient {
    pub fn new(jwt: String, gateway: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build pinning HTTP client"),
            jwt,
            api_base: DEFAULT_API_BASE.to_string(),
            gateway: gateway.trim_end_matches('/').to_string(),
        }
    }

    /// Point the client at a different pinning API (self-hosted gateways,
    /// HTTP doubles in tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Pin a JSON document, returning its IPFS hash.
    pub async fn pin_json<T: Serialize>(&self, name: &str, content: &T) -> Result<String, AppError> {
        let body = serde_json::json!({
            "pinataMetadata": { "name": name },
            "pinataContent": content,
        });

        let resp = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_base))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("pin request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "pinning service returned {}: {}",
                status, body
            )));
        }

        let parsed: PinResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("pin response parse failed: {}", e)))?;
        Ok(parsed.ipfs_hash)
    }

    /// Unpin a hash. A 404 from the pinning service is treated as success —
    /// the content is already gone.
    pub async fn unpin(&self, hash: &str) -> Result<(), AppError> {
        let resp = self
            .client
            .delete(format!("{}/pinning/unpin/{}", self.api_base, hash))
            .bearer_auth(&self.jwt)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("unpin request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "unpin returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    /// Fetch a pinned JSON document through the gateway.
    pub async fn fetch_json<T: DeserializeOwned>(&self, hash: &str) -> Result<T, AppError> {
        let resp = self
            .client
            .get(format!("{}/ipfs/{}", self.gateway, hash))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("ipfs fetch failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("ipfs document"));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!("ipfs gateway returned {}", status)));
        }

        resp.json()
            .await
            .map_err(|e| AppError::Upstream(format!("ipfs document parse failed: {}", e)))
    }
}
