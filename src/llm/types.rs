use serde::{Deserialize, Serialize};

/// One backend call: a prompt, optionally accompanied by a PNG screenshot.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Base64-encoded PNG (no data-URI prefix).
    pub image_png_base64: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            image_png_base64: None,
            max_tokens,
        }
    }

    pub fn with_image(prompt: impl Into<String>, png_base64: String, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            image_png_base64: Some(png_base64),
            max_tokens,
        }
    }
}

/// Per-provider call settings resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub model: String,
    pub temperature: Option<f64>,
    pub step_max_tokens: u32,
    pub journey_max_tokens: u32,
}

// ── OpenAI-compatible chat completions ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

// ── Anthropic Messages (direct and via Bedrock) ─────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    /// Only sent to Bedrock, which takes the model from the URL instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<AnthropicBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}
