use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::error::{MmcodeError, Result};
use crate::models::Message;

pub const BASE_URL: &str = "https://api.minimax.io/v1";

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub stream_options: StreamOptions,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<Message>, tools: Option<Vec<Value>>) -> Self {
        let tools = tools.filter(|t| !t.is_empty());
        let tool_choice = tools.is_some().then_some("auto");
        Self {
            model: model.to_string(),
            messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            temperature: 1.0,
            tools,
            tool_choice,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ApiClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| MmcodeError::ConfigError(format!("invalid API key: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("X-Reasoning-Split", HeaderValue::from_static("true"));
        Ok(headers)
    }

    /// POST the chat request and hand back the raw streaming response.
    /// Non-success statuses are turned into `ApiError` with the body text.
    pub async fn send_chat_request(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MmcodeError::ApiError { status, message });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_has_streaming_defaults() {
        let request = ChatRequest::new("MiniMax-M2.5", vec![Message::user("hi")], None);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "MiniMax-M2.5");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["temperature"], 1.0);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn tools_enable_auto_tool_choice() {
        let tools = vec![serde_json::json!({"type": "function"})];
        let request = ChatRequest::new("MiniMax-M2.5", vec![], Some(tools));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_tool_list_is_omitted() {
        let request = ChatRequest::new("MiniMax-M2.5", vec![], Some(Vec::new()));
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }
}
