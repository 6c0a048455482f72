//! Image generation tool — Freepik-style text-to-image backend.
//!
//! Returned images arrive base64-encoded; when a save directory is given
//! they are decoded and persisted as PNG files, skipping any item that
//! fails to decode so the rest still come back.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use stringer_core::error::ToolError;
use stringer_core::tool::Tool;

/// The image generation backend seam.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<ImageBatch, String>;
}

/// A text-to-image request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub guidance_scale: Option<f64>,
    pub seed: Option<u64>,
    pub num_images: u32,
    pub size: String,
    pub style: Option<String>,
    pub filter_nsfw: bool,
}

/// Generated images, base64-encoded.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub images_base64: Vec<String>,
}

/// HTTP client for the Freepik text-to-image endpoint.
pub struct FreepikBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl FreepikBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "generate_image".into(),
                reason: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl ImageBackend for FreepikBackend {
    async fn generate(&self, request: ImageRequest) -> Result<ImageBatch, String> {
        let url = format!("{}/ai/text-to-image", self.base_url);

        let mut body = serde_json::json!({
            "prompt": request.prompt,
            "num_images": request.num_images,
            "image": { "size": request.size },
            "filter_nsfw": request.filter_nsfw,
        });
        if let Some(negative) = &request.negative_prompt {
            body["negative_prompt"] = serde_json::json!(negative);
        }
        if let Some(scale) = request.guidance_scale {
            body["guidance_scale"] = serde_json::json!(scale);
        }
        if let Some(seed) = request.seed {
            body["seed"] = serde_json::json!(seed);
        }
        if let Some(style) = &request.style {
            body["styling"] = serde_json::json!({ "style": style });
        }

        debug!(num_images = request.num_images, "Sending image generation request");

        let response = self
            .client
            .post(&url)
            .header("x-freepik-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Image backend returned error");
            return Err(format!("image generation failed (status {status}): {error_body}"));
        }

        let api_response: ApiImageResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse image response: {e}"))?;

        Ok(ImageBatch {
            images_base64: api_response
                .data
                .into_iter()
                .filter_map(|d| d.base64)
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiImageResponse {
    #[serde(default)]
    data: Vec<ApiImageData>,
}

#[derive(Debug, Deserialize)]
struct ApiImageData {
    #[serde(default)]
    base64: Option<String>,
}

/// The generate_image tool.
pub struct GenerateImageTool {
    backend: Option<Arc<dyn ImageBackend>>,
    default_save_dir: Option<String>,
}

impl GenerateImageTool {
    pub fn new(backend: Option<Arc<dyn ImageBackend>>, default_save_dir: Option<String>) -> Self {
        Self {
            backend,
            default_save_dir,
        }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Create images from a text prompt. Optionally saves generated images as PNG files \
         to a directory and returns their paths."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Text prompt to generate the image from"
                },
                "negative_prompt": {
                    "type": "string",
                    "description": "Attributes to avoid"
                },
                "guidance_scale": {
                    "type": "number",
                    "description": "0.0..2.0 (higher = closer to the prompt)"
                },
                "seed": {
                    "type": "integer",
                    "description": "0..1000000 for reproducibility"
                },
                "num_images": {
                    "type": "integer",
                    "description": "Number of images to generate (1..4, default 1)",
                    "default": 1
                },
                "size": {
                    "type": "string",
                    "description": "e.g. 'square_1_1', 'landscape_16_9', 'portrait_9_16'",
                    "default": "square_1_1"
                },
                "style": {
                    "type": "string",
                    "description": "Optional style, e.g. 'anime'"
                },
                "save_dir": {
                    "type": "string",
                    "description": "If set, save generated images as PNG files here"
                },
                "filename_prefix": {
                    "type": "string",
                    "description": "Filename prefix when saving (default 'stringer')"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let prompt = arguments["prompt"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'prompt' argument".into()))?;

        let num_images = arguments["num_images"].as_u64().unwrap_or(1);
        if !(1..=4).contains(&num_images) {
            return Err(ToolError::InvalidArguments(
                "num_images must be between 1 and 4".into(),
            ));
        }

        let guidance_scale = arguments["guidance_scale"].as_f64();
        if let Some(scale) = guidance_scale
            && !(0.0..=2.0).contains(&scale)
        {
            return Err(ToolError::InvalidArguments(
                "guidance_scale must be between 0.0 and 2.0".into(),
            ));
        }

        let Some(backend) = &self.backend else {
            return Err(ToolError::MissingCredential {
                tool_name: "generate_image".into(),
                variable: "FREEPIK_API_KEY".into(),
            });
        };

        let request = ImageRequest {
            prompt: prompt.into(),
            negative_prompt: arguments["negative_prompt"].as_str().map(String::from),
            guidance_scale,
            seed: arguments["seed"].as_u64(),
            num_images: num_images as u32,
            size: arguments["size"].as_str().unwrap_or("square_1_1").into(),
            style: arguments["style"].as_str().map(String::from),
            filter_nsfw: true,
        };

        let batch = backend
            .generate(request)
            .await
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: "generate_image".into(),
                reason,
            })?;

        let save_dir = arguments["save_dir"]
            .as_str()
            .map(String::from)
            .or_else(|| self.default_save_dir.clone());
        let prefix = arguments["filename_prefix"].as_str().unwrap_or("stringer");

        let mut saved_paths: Vec<String> = Vec::new();
        if let Some(dir) = save_dir
            && !batch.images_base64.is_empty()
        {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "generate_image".into(),
                    reason: format!("Failed to create save directory: {e}"),
                })?;

            for (idx, encoded) in batch.images_base64.iter().enumerate() {
                let Ok(bytes) = BASE64.decode(encoded) else {
                    warn!(index = idx, "Skipping undecodable image payload");
                    continue;
                };
                let out_path = format!("{dir}/{prefix}_{}.png", idx + 1);
                match tokio::fs::write(&out_path, bytes).await {
                    Ok(()) => saved_paths.push(out_path),
                    Err(e) => warn!(path = %out_path, error = %e, "Failed to save image"),
                }
            }
        }

        Ok(serde_json::json!({
            "status": if batch.images_base64.is_empty() { "empty" } else { "ok" },
            "image_count": batch.images_base64.len(),
            "saved_paths": saved_paths,
        }))
    }
}
