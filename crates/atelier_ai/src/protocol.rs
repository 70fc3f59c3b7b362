// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire types exchanged with the backends.

use crate::params::{ModelId, TrellisParams};
use serde::{Deserialize, Serialize};

/// Body of a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Text prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Single input image (URL or data URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Several base64 views of one object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Model to run
    pub model_id: ModelId,
    /// Pipeline sliders
    #[serde(flatten)]
    pub params: TrellisParams,
}

impl GenerationRequest {
    /// Text to 3D
    pub fn text(prompt: impl Into<String>, model_id: ModelId, params: TrellisParams) -> Self {
        Self {
            prompt: Some(prompt.into()),
            image_url: None,
            images: None,
            model_id,
            params,
        }
    }

    /// Single image to 3D
    pub fn image(image_url: impl Into<String>, model_id: ModelId, params: TrellisParams) -> Self {
        Self {
            prompt: None,
            image_url: Some(image_url.into()),
            images: None,
            model_id,
            params,
        }
    }

    /// Several views to 3D
    pub fn multi_view(images: Vec<String>, params: TrellisParams) -> Self {
        Self {
            prompt: None,
            image_url: None,
            images: Some(images),
            model_id: ModelId::TrellisMulti,
            params,
        }
    }

    /// Whether this request carries image input
    pub fn has_image(&self) -> bool {
        self.image_url.is_some() || self.images.as_ref().is_some_and(|i| !i.is_empty())
    }
}

/// Answer to a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// "success" or an error status
    pub status: String,
    /// Base64 GLB
    #[serde(default)]
    pub glb_data: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl GenerationResponse {
    /// Whether the backend reported success
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

/// Image dimensions reported by the segmentation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Answer to `set_image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetImageResponse {
    /// Session key for later predictions
    pub session_id: String,
    /// Size of the uploaded image
    pub image_size: ImageSize,
    /// Status message
    #[serde(default)]
    pub message: Option<String>,
}

/// Point and box prompts for a prediction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPrompt {
    /// Pixel coordinates
    pub points: Vec<[f32; 2]>,
    /// 1 = foreground, 0 = background, one per point
    pub labels: Vec<u8>,
    /// Optional box `[x1, y1, x2, y2]`
    pub bbox: Option<[f32; 4]>,
}

impl PointPrompt {
    /// Add a foreground click
    pub fn foreground(mut self, x: f32, y: f32) -> Self {
        self.points.push([x, y]);
        self.labels.push(1);
        self
    }

    /// Add a background click
    pub fn background(mut self, x: f32, y: f32) -> Self {
        self.points.push([x, y]);
        self.labels.push(0);
        self
    }

    /// Whether there is anything to predict from
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.bbox.is_none()
    }
}

/// Answer to `predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Session key
    pub session_id: String,
    /// Number of masks
    pub mask_count: usize,
    /// Download paths, best first
    pub masks: Vec<String>,
    /// Scores, best first
    pub scores: Vec<f32>,
    /// Download path of the best mask
    #[serde(default)]
    pub best_mask: Option<String>,
}

/// Answer to `predict_and_apply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResponse {
    /// Session key
    pub session_id: String,
    /// Score of the chosen mask
    pub score: f32,
    /// Download path of the cut-out image
    #[serde(default)]
    pub rgba_image: Option<String>,
    /// Download path of the mask
    pub mask: String,
}

/// One node of a proposed part hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Group or part name
    pub name: String,
    /// "Group" or "Mesh"
    #[serde(rename = "type", default)]
    pub kind: HierarchyKind,
    /// Nested nodes
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
    /// Part ids, leaf entries only
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Kind of a hierarchy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HierarchyKind {
    /// Named container
    #[default]
    Group,
    /// Leaf naming one or more parts
    Mesh,
}

/// Answer of the grouping model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyResponse {
    /// Top-level entries
    #[serde(default)]
    pub hierarchy: Vec<HierarchyNode>,
}

/// OpenAI-compatible chat request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_is_flat() {
        let request = GenerationRequest::text("a red car", ModelId::Trellis, TrellisParams::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["prompt"], "a red car");
        assert_eq!(json["model_id"], "trellis");
        assert_eq!(json["seed"], 1);
        assert_eq!(json["slat_sampling_steps"], 12);
        assert!(json.get("image_url").is_none());
        assert!(!request.has_image());
    }

    #[test]
    fn test_hierarchy_parse() {
        let text = r#"{"hierarchy":[{"name":"Car","type":"Group","children":[
            {"name":"Wheel_FL","type":"Mesh","ids":["a"]}]}]}"#;
        let parsed: HierarchyResponse = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.hierarchy[0].kind, HierarchyKind::Group);
        assert_eq!(parsed.hierarchy[0].children[0].ids, vec!["a"]);
    }

    #[test]
    fn test_chat_content_shape() {
        let message = ChatMessage {
            role: "user",
            content: ChatContent::Parts(vec![
                ContentPart::Text { text: "name it".into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: "data:image/png;base64,AAAA".into() },
                },
            ]),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
