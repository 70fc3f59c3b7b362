// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vision/language model proxy.
//!
//! Talks to any OpenAI-compatible `chat/completions` endpoint. Flows only see
//! the [`VisionBackend`] trait so they can run against a fake in tests.

use crate::client::png_data_uri;
use crate::error::{ClientError, Result};
use crate::protocol::{
    ChatContent, ChatMessage, ChatRequest, ChatResponse, ContentPart, HierarchyResponse, ImageUrl,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Reply budget for naming calls
pub const NAME_MAX_TOKENS: u32 = 50;

/// Default model for both naming and grouping
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";

const GROUPING_SYSTEM_PROMPT: &str = "You organize the parts of a 3D model into a scene hierarchy. \
Answer with JSON only, shaped as {\"hierarchy\": [{\"name\": string, \"type\": \"Group\" | \"Mesh\", \
\"children\": [...], \"ids\": [string]}]}. Mesh entries list the ids of the parts they name; \
Group entries hold children. Use every id at most once and give every entry a short \
descriptive name in PascalCase with underscores.";

/// A model that can look at images and propose hierarchies
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Describe an image in a few words, following `instruction`
    async fn describe(&self, image_png: &[u8], instruction: &str) -> Result<String>;

    /// Propose a hierarchy for the parts listed in `parts`
    async fn organize(&self, parts: &Value, instruction: &str) -> Result<HierarchyResponse>;
}

/// OpenAI-compatible chat client
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl VisionClient {
    /// Create a client for an API base such as `https://api.openai.com/v1`
    pub fn new(api_base: &str, api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            endpoint: resolve_endpoint(api_base),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
        })
    }

    /// Resolved `chat/completions` URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp: ChatResponse = builder.send().await?.error_for_status()?.json().await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::payload("chat reply without content"))
    }
}

#[async_trait]
impl VisionBackend for VisionClient {
    async fn describe(&self, image_png: &[u8], instruction: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: ChatContent::Parts(vec![
                    ContentPart::Text {
                        text: instruction.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: png_data_uri(image_png),
                        },
                    },
                ]),
            }],
            max_tokens: Some(NAME_MAX_TOKENS),
            response_format: None,
        };

        let reply = self.chat(&request).await?;
        let label = normalize_label(&reply);
        if label.is_empty() {
            return Err(ClientError::payload("empty label"));
        }
        debug!("Vision label: {label}");
        Ok(label)
    }

    async fn organize(&self, parts: &Value, instruction: &str) -> Result<HierarchyResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatContent::Text(GROUPING_SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: ChatContent::Text(format!("{instruction}\n\nParts:\n{parts}")),
                },
            ],
            max_tokens: None,
            response_format: Some(json!({ "type": "json_object" })),
        };

        let reply = self.chat(&request).await?;
        let hierarchy = parse_hierarchy(&reply)?;
        info!("Grouping model proposed {} top-level entries", hierarchy.hierarchy.len());
        Ok(hierarchy)
    }
}

/// Turn an API base into a `chat/completions` URL
pub fn resolve_endpoint(api_base: &str) -> String {
    let base = api_base.trim();
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}chat/completions")
    } else {
        format!("{base}/chat/completions")
    }
}

/// Make a model reply usable as a node name
pub fn normalize_label(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '.')
        .replace(['\n', '\r'], "")
        .replace(' ', "_")
}

/// Parse a grouping reply, tolerating a fenced JSON block
pub fn parse_hierarchy(reply: &str) -> Result<HierarchyResponse> {
    let text = reply.trim();
    match serde_json::from_str(text) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let fenced = fenced_json(text).ok_or(err)?;
            Ok(serde_json::from_str(fenced)?)
        }
    }
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = match text.find("```json") {
        Some(i) => i + "```json".len(),
        None => text.find("```")? + 3,
    };
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HierarchyKind;

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            resolve_endpoint("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            resolve_endpoint("http://proxy:9000/v1/"),
            "http://proxy:9000/v1/chat/completions"
        );
        assert_eq!(
            resolve_endpoint("http://proxy/v1/chat/completions"),
            "http://proxy/v1/chat/completions"
        );
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Front Left Wheel\n"), "Front_Left_Wheel");
        assert_eq!(normalize_label("\"Door\"."), "Door");
        assert_eq!(normalize_label("Roof\r\nPanel"), "RoofPanel");
    }

    #[test]
    fn test_parse_hierarchy_plain_and_fenced() {
        let plain = r#"{"hierarchy":[{"name":"Body","type":"Mesh","ids":["1"]}]}"#;
        let parsed = parse_hierarchy(plain).unwrap();
        assert_eq!(parsed.hierarchy[0].kind, HierarchyKind::Mesh);

        let fenced = format!("Here you go:\n```json\n{plain}\n```\nDone.");
        assert_eq!(parse_hierarchy(&fenced).unwrap(), parsed);

        assert!(matches!(parse_hierarchy("no json here"), Err(ClientError::Json(_))));
    }
}
