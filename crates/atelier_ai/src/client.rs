// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP client for the generation and segmentation backends.

use crate::error::{ClientError, Result};
use crate::params::{ModelId, SegmentParams, TrellisParams};
use crate::protocol::{
    ApplyResponse, GenerationRequest, GenerationResponse, PointPrompt, PredictResponse,
    SetImageResponse,
};
use atelier_scene::import::import_gltf;
use atelier_scene::Scene;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Generation can take minutes on a cold backend
const GENERATION_TIMEOUT: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the generation and segmentation services
#[derive(Clone)]
pub struct StudioClient {
    client: Client,
    backend_url: String,
    segment_url: String,
}

impl StudioClient {
    /// Create a client for the given service roots
    pub fn new(backend_url: impl Into<String>, segment_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            segment_url: segment_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Generation service root
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    fn backend(&self, path: &str) -> String {
        format!("{}{}", self.backend_url, path)
    }

    fn segment(&self, path: &str) -> String {
        format!("{}{}", self.segment_url, path)
    }

    // Generation ---------------------------------------------------------

    /// Run a generation request and return the decoded GLB bytes
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
        let path = if request.has_image() {
            "/generate/image3d"
        } else {
            "/generate/text3d"
        };
        info!(model = request.model_id.as_str(), "Requesting {path}");

        let resp: GenerationResponse = self
            .client
            .post(self.backend(path))
            .timeout(GENERATION_TIMEOUT)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_generation(resp)
    }

    /// Text to 3D
    pub async fn generate_text(&self, prompt: &str, model: ModelId, params: &TrellisParams) -> Result<Vec<u8>> {
        self.generate(&GenerationRequest::text(prompt, model, params.clone()))
            .await
    }

    /// Image to 3D; `image_png` is sent as a data URI
    pub async fn generate_image(&self, image_png: &[u8], model: ModelId, params: &TrellisParams) -> Result<Vec<u8>> {
        let request = GenerationRequest::image(png_data_uri(image_png), model, params.clone());
        self.generate(&request).await
    }

    /// Several views of one object to 3D
    pub async fn generate_multi_view(&self, views_png: &[Vec<u8>], params: &TrellisParams) -> Result<Vec<u8>> {
        let images = views_png.iter().map(|png| STANDARD.encode(png)).collect();
        self.generate(&GenerationRequest::multi_view(images, params.clone()))
            .await
    }

    /// Run a generation request and import the result as a scene
    pub async fn generate_scene(&self, request: &GenerationRequest, name: &str) -> Result<Scene> {
        let glb = self.generate(request).await?;
        let scene = import_gltf(&glb, name)?;
        info!("Imported '{name}' with {} nodes", scene.len());
        Ok(scene)
    }

    // Segmentation -------------------------------------------------------

    /// Check whether the segmentation service is up
    pub async fn health(&self) -> Result<bool> {
        let resp = self
            .client
            .get(self.segment("/health"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// Upload an image and open a segmentation session
    pub async fn open_segmentation(&self, image_png: Vec<u8>) -> Result<SetImageResponse> {
        let part = Part::bytes(image_png)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = Form::new().part("file", part);

        let resp: SetImageResponse = self
            .client
            .post(self.segment("/set_image"))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(
            session = %resp.session_id,
            "Segmentation session opened for {}x{} image",
            resp.image_size.width, resp.image_size.height
        );
        Ok(resp)
    }

    /// Predict masks from point and box prompts
    pub async fn predict(&self, session_id: &str, prompt: &PointPrompt, params: &SegmentParams) -> Result<PredictResponse> {
        let mut fields = prompt_fields(session_id, prompt)?;
        fields.push(("use_previous_mask", params.use_previous_mask.to_string()));
        fields.push(("multimask_output", params.multimask_output.to_string()));

        let resp: PredictResponse = self
            .client
            .post(self.segment("/predict"))
            .timeout(REQUEST_TIMEOUT)
            .form(&fields)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(session = %session_id, "Predicted {} masks", resp.mask_count);
        Ok(resp)
    }

    /// Predict the best mask and cut the object out of the image
    pub async fn predict_and_apply(&self, session_id: &str, prompt: &PointPrompt, params: &SegmentParams) -> Result<ApplyResponse> {
        let mut fields = prompt_fields(session_id, prompt)?;
        fields.push(("return_rgba", params.return_rgba.to_string()));

        let resp: ApplyResponse = self
            .client
            .post(self.segment("/predict_and_apply"))
            .timeout(REQUEST_TIMEOUT)
            .form(&fields)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(session = %session_id, score = resp.score, "Applied mask");
        Ok(resp)
    }

    /// Fetch a file the segmentation service produced
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.segment(&format!("/{}", path.trim_start_matches('/')))
        };
        let bytes = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    /// Close a segmentation session
    pub async fn close_segmentation(&self, session_id: &str) -> Result<()> {
        self.client
            .delete(self.segment(&format!("/session/{session_id}")))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        debug!(session = %session_id, "Segmentation session closed");
        Ok(())
    }
}

/// Turn a generation response into GLB bytes
pub fn decode_generation(resp: GenerationResponse) -> Result<Vec<u8>> {
    if !resp.is_success() {
        let message = resp.message.unwrap_or_else(|| resp.status.clone());
        return Err(ClientError::Backend(message));
    }
    let glb_data = resp
        .glb_data
        .ok_or_else(|| ClientError::payload("generation succeeded without glb_data"))?;
    Ok(STANDARD.decode(glb_data.trim())?)
}

/// Encode PNG bytes as a data URI
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

fn prompt_fields(session_id: &str, prompt: &PointPrompt) -> Result<Vec<(&'static str, String)>> {
    if prompt.is_empty() {
        return Err(ClientError::payload("segmentation needs at least one point or a box"));
    }
    if prompt.points.len() != prompt.labels.len() {
        return Err(ClientError::payload("every point needs a label"));
    }

    let mut fields = vec![("session_id", session_id.to_string())];
    if !prompt.points.is_empty() {
        fields.push(("point_coords", serde_json::to_string(&prompt.points)?));
        fields.push(("point_labels", serde_json::to_string(&prompt.labels)?));
    }
    if let Some(bbox) = prompt.bbox {
        fields.push(("box", serde_json::to_string(&bbox)?));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_generation() {
        let ok = GenerationResponse {
            status: "success".into(),
            glb_data: Some(STANDARD.encode(b"glTF")),
            message: None,
        };
        assert_eq!(decode_generation(ok).unwrap(), b"glTF");

        let failed = GenerationResponse {
            status: "error".into(),
            glb_data: None,
            message: Some("CUDA out of memory".into()),
        };
        match decode_generation(failed) {
            Err(ClientError::Backend(msg)) => assert_eq!(msg, "CUDA out of memory"),
            other => panic!("unexpected {other:?}"),
        }

        let empty = GenerationResponse {
            status: "success".into(),
            glb_data: None,
            message: None,
        };
        assert!(matches!(decode_generation(empty), Err(ClientError::Payload(_))));
    }

    #[test]
    fn test_prompt_fields() {
        let prompt = PointPrompt::default().foreground(10.0, 20.0).background(5.0, 5.0);
        let fields = prompt_fields("abc", &prompt).unwrap();
        assert_eq!(fields[0], ("session_id", "abc".to_string()));
        assert_eq!(fields[1], ("point_coords", "[[10.0,20.0],[5.0,5.0]]".to_string()));
        assert_eq!(fields[2], ("point_labels", "[1,0]".to_string()));

        assert!(prompt_fields("abc", &PointPrompt::default()).is_err());
    }

    #[test]
    fn test_urls_are_trimmed() {
        let client = StudioClient::new("http://localhost:8000/", "http://localhost:8001").unwrap();
        assert_eq!(client.backend("/generate/text3d"), "http://localhost:8000/generate/text3d");
        assert_eq!(client.segment("/health"), "http://localhost:8001/health");
    }

    #[test]
    fn test_png_data_uri() {
        assert_eq!(png_data_uri(&[1, 2, 3]), "data:image/png;base64,AQID");
    }
}
