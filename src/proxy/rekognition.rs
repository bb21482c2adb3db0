//! Image moderation via Amazon Rekognition.
//!
//! Creatives are checked with `DetectModerationLabels` before they are
//! accepted. The endpoint speaks `x-amz-json-1.1`; requests are signed
//! with the local SigV4 implementation. No retry layer: a transient
//! Rekognition failure surfaces to the caller as a 500.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AppError;
use crate::proxy::sigv4;

const TARGET: &str = "RekognitionService.DetectModerationLabels";
/// Rekognition caps image bytes at 5 MB for the Bytes variant.
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationLabel {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
    #[serde(rename = "ParentName", default)]
    pub parent_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(rename = "ModerationLabels", default)]
    moderation_labels: Vec<ModerationLabel>,
}

/// Verdict returned to the management API.
#[derive(Debug, Serialize)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub labels: Vec<ModerationLabel>,
}

#[derive(Clone)]
pub struct ModerationClient {
    client: reqwest::Client,
    access_key: String,
    secret_key: String,
    region: String,
    min_confidence: f32,
}

impl ModerationClient {
    pub fn new(access_key: String, secret_key: String, region: String, min_confidence: f32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("failed to build moderation HTTP client"),
            access_key,
            secret_key,
            region,
            min_confidence,
        }
    }

    /// Download the creative image and run it through moderation.
    pub async fn check_image_url(&self, image_url: &str) -> Result<ModerationVerdict, AppError> {
        let resp = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("image fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AppError::BadRequest(format!(
                "image URL returned status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("image read failed: {}", e)))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::BadRequest("image exceeds 5 MB".into()));
        }

        self.detect(&bytes).await
    }

    async fn detect(&self, image: &[u8]) -> Result<ModerationVerdict, AppError> {
        let endpoint = format!("https://rekognition.{}.amazonaws.com/", self.region);
        let body = serde_json::json!({
            "Image": { "Bytes": base64::engine::general_purpose::STANDARD.encode(image) },
            "MinConfidence": self.min_confidence,
        });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("moderation payload: {}", e)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("content-type", "application/x-amz-json-1.1".parse().expect("static header"));
        headers.insert("x-amz-target", TARGET.parse().expect("static header"));
        sigv4::sign_request(
            "POST",
            &endpoint,
            &mut headers,
            &payload,
            &self.access_key,
            &self.secret_key,
            &self.region,
            "rekognition",
        )?;

        let resp = self
            .client
            .post(&endpoint)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("rekognition request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "rekognition returned {}: {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("rekognition response parse failed: {}", e)))?;

        Ok(verdict(parsed.moderation_labels, self.min_confidence))
    }
}

/// A creative is flagged when any label meets the confidence floor.
fn verdict(labels: Vec<ModerationLabel>, min_confidence: f32) -> ModerationVerdict {
    let flagged = labels.iter().any(|l| l.confidence >= min_confidence);
    ModerationVerdict { flagged, labels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str, confidence: f32) -> ModerationLabel {
        ModerationLabel {
            name: name.into(),
            confidence,
            parent_name: None,
        }
    }

    #[test]
    fn test_clean_image_is_not_flagged() {
        let v = verdict(vec![], 80.0);
        assert!(!v.flagged);
    }

    #[test]
    fn test_confident_label_flags() {
        let v = verdict(vec![label("Explicit Nudity", 97.2)], 80.0);
        assert!(v.flagged);
    }

    #[test]
    fn test_low_confidence_label_does_not_flag() {
        let v = verdict(vec![label("Suggestive", 42.0)], 80.0);
        assert!(!v.flagged);
        assert_eq!(v.labels.len(), 1);
    }
}
