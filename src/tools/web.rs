use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use super::ToolOutput;
use crate::config;

const SEARCH_URL: &str = "https://api.minimax.io/v1/coding_plan/search";
const RESULT_CAP: usize = 8;

pub fn definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "web_search",
            "description": "Search the web for current information. Use when you need up-to-date data, documentation, or answers not available in local files. Returns top results with titles, URLs, and snippets.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }
        }
    })
}

pub async fn execute(args: Value) -> ToolOutput {
    let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
    if query.is_empty() {
        return ToolOutput::text("Error: No query provided");
    }

    let app_config = config::load_config();
    if app_config.api_key.is_empty() {
        return ToolOutput::text("Error: No API key configured.");
    }

    let auth = match HeaderValue::from_str(&format!("Bearer {}", app_config.api_key)) {
        Ok(h) => h,
        Err(e) => return ToolOutput::text(format!("Error: Invalid API key: {}", e)),
    };

    let client = reqwest::Client::new();
    let response = match client
        .post(SEARCH_URL)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(AUTHORIZATION, auth)
        .json(&serde_json::json!({ "q": query }))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            if e.is_connect() {
                return ToolOutput::text("Error: No internet connection.");
            }
            return ToolOutput::text(format!("Error: {}", e));
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let preview: String = text.chars().take(200).collect();
        return ToolOutput::text(format!(
            "Error: Search API returned {}{}",
            status,
            if preview.is_empty() {
                String::new()
            } else {
                format!(" - {}", preview)
            }
        ));
    }

    let data: Value = match response.json().await {
        Ok(d) => d,
        Err(e) => return ToolOutput::text(format!("Error parsing response: {}", e)),
    };

    ToolOutput::text(format_results(query, &data))
}

fn format_results(query: &str, data: &Value) -> String {
    let results = data
        .get("organic_results")
        .or_else(|| data.get("results"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    if results.is_empty() {
        return format!("No results found for \"{}\".", query);
    }

    let formatted: Vec<String> = results
        .iter()
        .take(RESULT_CAP)
        .enumerate()
        .map(|(i, r)| {
            let title = r
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled");
            let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = r
                .get("snippet")
                .or_else(|| r.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            format!("{}. **{}**\n   {}\n   {}", i + 1, title, url, snippet)
        })
        .collect();

    let mut output = formatted.join("\n\n");

    if let Some(related) = data.get("related_searches").and_then(|v| v.as_array()) {
        let related: Vec<&str> = related.iter().take(5).filter_map(|v| v.as_str()).collect();
        if !related.is_empty() {
            output.push_str(&format!("\n\nRelated searches: {}", related.join(", ")));
        }
    }

    output
}
