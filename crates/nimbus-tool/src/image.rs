use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use nimbus_types::{
    GeneratedImage, ToolOutcome, IMAGE_EDIT_TOOL, IMAGE_GENERATION_TOOL,
    TOOL_OUTCOME_SCHEMA_VERSION,
};

use crate::tool::{Tool, ToolConfig, ToolError};

const DEFAULT_SIZE: &str = "1024x1024";

/// Response shape shared by the generation and edit endpoints: a `data`
/// array whose entries carry either a hosted `url` or inline `b64_json`.
#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

fn into_images(response: ImageResponse) -> Vec<GeneratedImage> {
    response
        .data
        .into_iter()
        .filter_map(|datum| {
            if let Some(url) = datum.url {
                return Some(GeneratedImage {
                    url,
                    mime: "image/png".to_string(),
                });
            }
            // Inline payloads are re-encoded as data URLs so the UI renders
            // them through the same path as hosted images.
            datum.b64_json.map(|b64| {
                let decoded_ok = base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .is_ok();
                if !decoded_ok {
                    tracing::warn!("image payload is not valid base64, passing through");
                }
                GeneratedImage {
                    url: format!("data:image/png;base64,{}", b64),
                    mime: "image/png".to_string(),
                }
            })
        })
        .collect()
}

async fn post_image_request(
    client: &Client,
    config: &ToolConfig,
    path: &str,
    body: serde_json::Value,
) -> Result<Vec<GeneratedImage>, ToolError> {
    let url = format!("{}/{}", config.image_url.trim_end_matches('/'), path);
    let response = client
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ToolError::ExecutionError("Image request timed out".to_string())
            } else {
                ToolError::ExecutionError(format!("Image request failed: {}", e))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ToolError::ExecutionError(format!(
            "Image error ({}): {}",
            status, body
        )));
    }

    let parsed: ImageResponse = response
        .json()
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Malformed image response: {}", e)))?;

    let images = into_images(parsed);
    if images.is_empty() {
        return Err(ToolError::ExecutionError(
            "Image backend returned no images".to_string(),
        ));
    }
    Ok(images)
}

pub struct ImageGenerationTool {
    client: Client,
    config: ToolConfig,
}

impl ImageGenerationTool {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationInput {
    prompt: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    n: Option<u8>,
}

#[async_trait]
impl Tool for ImageGenerationTool {
    fn id(&self) -> &str {
        IMAGE_GENERATION_TOOL
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What the image should depict"
                },
                "size": {
                    "type": "string",
                    "enum": ["1024x1024", "1536x1024", "1024x1536"],
                    "default": "1024x1024"
                },
                "n": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 4,
                    "default": 1,
                    "description": "Number of images to generate"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let input: GenerationInput =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let body = json!({
            "prompt": input.prompt,
            "size": input.size.as_deref().unwrap_or(DEFAULT_SIZE),
            "n": input.n.unwrap_or(1),
        });

        let images = post_image_request(&self.client, &self.config, "generations", body).await?;
        Ok(ToolOutcome::ImageGeneration {
            schema_version: TOOL_OUTCOME_SCHEMA_VERSION,
            images,
        })
    }
}

pub struct ImageEditTool {
    client: Client,
    config: ToolConfig,
}

impl ImageEditTool {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EditInput {
    prompt: String,
    /// URL of the image to edit, usually a file attachment from the thread.
    image_url: String,
    #[serde(default)]
    size: Option<String>,
}

#[async_trait]
impl Tool for ImageEditTool {
    fn id(&self) -> &str {
        IMAGE_EDIT_TOOL
    }

    fn description(&self) -> &str {
        "Edit an existing image according to a text instruction."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "How the image should be changed"
                },
                "image_url": {
                    "type": "string",
                    "description": "URL of the source image"
                },
                "size": {
                    "type": "string",
                    "enum": ["1024x1024", "1536x1024", "1024x1536"],
                    "default": "1024x1024"
                }
            },
            "required": ["prompt", "image_url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let input: EditInput =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let body = json!({
            "prompt": input.prompt,
            "image": input.image_url,
            "size": input.size.as_deref().unwrap_or(DEFAULT_SIZE),
        });

        let images = post_image_request(&self.client, &self.config, "edits", body).await?;
        Ok(ToolOutcome::ImageEdit {
            schema_version: TOOL_OUTCOME_SCHEMA_VERSION,
            images,
        })
    }
}
