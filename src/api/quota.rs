use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use super::ApiClient;
use crate::error::{MmcodeError, Result};

#[derive(Debug, Clone)]
pub struct QuotaInfo {
    pub used: u64,
    pub total: u64,
    pub remaining: u64,
    pub reset_minutes: u64,
}

impl ApiClient {
    /// Fetch coding-plan quota. Polled outside the conversation loop
    /// (startup banner); failures are non-fatal for the caller.
    pub async fn fetch_quota(&self) -> Result<QuotaInfo> {
        let url = format!("{}/coding_plan/remains", self.base_url());
        let response = self
            .http()
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MmcodeError::ApiError {
                status: response.status().as_u16(),
                message: "quota endpoint returned an error".to_string(),
            });
        }

        let data: Value = response.json().await?;
        let entry = data
            .get("model_remains")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| MmcodeError::Other("No quota data in response".to_string()))?;

        let total = entry
            .get("current_interval_total_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let used = entry
            .get("current_interval_usage_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let remains_ms = entry
            .get("remains_time")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(QuotaInfo {
            used,
            total,
            remaining: total.saturating_sub(used),
            reset_minutes: remains_ms.div_ceil(60_000),
        })
    }
}
