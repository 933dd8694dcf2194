use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use nimbus_types::{SearchHit, ToolOutcome, TOOL_OUTCOME_SCHEMA_VERSION, WEB_SEARCH_TOOL};

use crate::tool::{Tool, ToolConfig, ToolError};

const DEFAULT_NUM_RESULTS: usize = 8;

static DESCRIPTION: &str = r#"Search the web for real-time information.

Use it when the answer depends on current events, recent releases, prices,
or anything else that may have changed since the knowledge cutoff. The
search returns page titles, URLs, and snippets."#;

pub struct WebSearchTool {
    client: Client,
    config: ToolConfig,
}

impl WebSearchTool {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
    #[serde(default = "default_num_results", alias = "numResults")]
    num_results: usize,
}

fn default_num_results() -> usize {
    DEFAULT_NUM_RESULTS
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResponseHit>,
}

#[derive(Debug, Deserialize)]
struct SearchResponseHit {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn id(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Web search query"
                },
                "num_results": {
                    "type": "integer",
                    "default": 8,
                    "description": "Number of search results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let input: WebSearchInput =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let response = self
            .client
            .post(&self.config.search_url)
            .bearer_auth(&self.config.api_key)
            .json(&SearchRequest {
                query: &input.query,
                num_results: input.num_results,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::ExecutionError("Search request timed out".to_string())
                } else {
                    ToolError::ExecutionError(format!("Search request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionError(format!(
                "Search error ({}): {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Malformed search response: {}", e)))?;

        tracing::debug!(query = %input.query, hits = parsed.results.len(), "web search finished");

        Ok(ToolOutcome::WebSearch {
            schema_version: TOOL_OUTCOME_SCHEMA_VERSION,
            query: input.query,
            results: parsed
                .results
                .into_iter()
                .map(|hit| SearchHit {
                    title: hit.title,
                    url: hit.url,
                    snippet: hit.snippet,
                })
                .collect(),
        })
    }
}
