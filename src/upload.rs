//! Uploads an assembled payload to the reconstruction service and reads
//! back the server trajectory.

use crate::config::UploadConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::types::{RoutePoint, UploadPayload};
use serde_json::Value;
use std::time::Duration;

/// Key of the trajectory array in the service response
const TRAJECTORY_KEY: &str = "Trajectory";

pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
}

impl Uploader {
    pub fn new(config: &UploadConfig) -> CaptureResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| CaptureError::Config("no upload endpoint configured".to_string()))?;
        Self::with_endpoint(config, endpoint)
    }

    pub fn with_endpoint(
        config: &UploadConfig,
        endpoint: impl Into<String>,
    ) -> CaptureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CaptureError::Upload(format!("failed to build HTTP client: {}", e)))?;

        Ok(Uploader {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the payload once.
    ///
    /// # Returns
    /// - Ok(Some(points)) when the response carries a usable trajectory
    /// - Ok(None) when the body has no trajectory or cannot be parsed
    /// - Err on transport failure or a non-2xx status
    pub async fn upload(
        &self,
        payload: &UploadPayload,
    ) -> CaptureResult<Option<Vec<RoutePoint>>> {
        log::info!(
            "Uploading {} records to {}",
            payload.record_count(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CaptureError::Upload("request timed out".to_string())
                } else {
                    CaptureError::Upload(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Upload rejected with HTTP {}", status.as_u16());
            return Err(CaptureError::HttpStatus(status.as_u16()));
        }

        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                log::warn!("Response is not JSON: {}", e);
                return Ok(None);
            }
            Err(e) => {
                return Err(CaptureError::Upload(format!(
                    "Failed to read response: {}",
                    e
                )))
            }
        };

        let trajectory = trajectory_from_value(&body);
        match &trajectory {
            Some(points) => log::info!("Server returned {} trajectory points", points.len()),
            None => log::warn!("Response carried no usable trajectory"),
        }
        Ok(trajectory)
    }
}

/// Extract `{"Trajectory": [[x, y], ...]}`.
///
/// Entries with fewer than two numbers are skipped; extra components are
/// ignored. Anything else about the body being wrong gives `None`.
pub fn parse_trajectory(body: &[u8]) -> Option<Vec<RoutePoint>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    trajectory_from_value(&value)
}

pub fn trajectory_from_value(value: &Value) -> Option<Vec<RoutePoint>> {
    let entries = value.get(TRAJECTORY_KEY)?.as_array()?;

    let points: Vec<RoutePoint> = entries.iter().filter_map(parse_point).collect();
    if points.len() < entries.len() {
        log::debug!(
            "Dropped {} malformed trajectory entries",
            entries.len() - points.len()
        );
    }
    Some(points)
}

fn parse_point(entry: &Value) -> Option<RoutePoint> {
    let coords = entry.as_array()?;
    match (coords.first()?.as_f64(), coords.get(1)?.as_f64()) {
        (Some(x), Some(y)) => Some(RoutePoint::new(x, y)),
        _ => None,
    }
}
