//! Web search tool backed by the Tavily search API.
//!
//! The model requests a search with a `query` argument; the tool returns a
//! JSON array of results (title, URL, snippet) serialized to text so the
//! model can read it back as a tool message.

use async_trait::async_trait;
use brook_core::error::ToolError;
use brook_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// One search result as fed back to the model and to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// --- Tavily API response structures ---

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: Option<String>,
}

/// Web search tool using the Tavily API.
pub struct WebSearchTool {
    api_key: Option<String>,
    max_results: u32,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        if api_key.is_none() {
            warn!("No Tavily API key configured, web search will not work");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("brook/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            max_results,
            client,
        }
    }

    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>, ToolError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: "TAVILY_API_KEY not configured".into(),
            }
        })?;

        debug!(query = %query, count, "Performing Tavily search");

        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": count,
        });

        let resp = self
            .client
            .post(TAVILY_URL)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: "web_search".into(),
                        timeout_secs: 30,
                    }
                } else {
                    ToolError::ExecutionFailed {
                        tool_name: "web_search".into(),
                        reason: format!("Search request failed: {e}"),
                    }
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Tavily API error: {status} - {body}"),
            });
        }

        let data: TavilyResponse = resp.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: format!("Failed to parse search response: {e}"),
        })?;

        let results: Vec<SearchResult> = data
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.content.unwrap_or_default(),
            })
            .collect();

        debug!(result_count = results.len(), "Search completed");

        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let results = self.search(query, self.max_results).await?;
        let data = serde_json::to_value(&results)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Result serialization: {e}"),
            })?;
        let output = serde_json::to_string(&data).unwrap_or_default();

        Ok(ToolResult {
            call_id: String::new(),
            output,
            data: Some(data),
        })
    }
}
