// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-backend generation parameters.
//!
//! These are echoed verbatim into outbound requests; nothing here interprets
//! them.

use serde::{Deserialize, Serialize};

/// Generation model understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelId {
    /// Text or single image to 3D
    #[default]
    #[serde(rename = "trellis")]
    Trellis,
    /// Several views of one object to 3D
    #[serde(rename = "trellis-multi")]
    TrellisMulti,
    /// Image plus mask to 3D
    #[serde(rename = "sam3d")]
    Sam3d,
}

impl ModelId {
    /// Identifier sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Trellis => "trellis",
            ModelId::TrellisMulti => "trellis-multi",
            ModelId::Sam3d => "sam3d",
        }
    }

    /// Get display name for this model
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::Trellis => "TRELLIS",
            ModelId::TrellisMulti => "TRELLIS (multi-view)",
            ModelId::Sam3d => "SAM 3D",
        }
    }

    /// Parse a wire identifier
    pub fn parse(text: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.as_str() == text)
    }

    /// Get all available models
    pub fn all() -> &'static [ModelId] {
        &[ModelId::Trellis, ModelId::TrellisMulti, ModelId::Sam3d]
    }
}

/// Sliders of the TRELLIS pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisParams {
    /// Random seed
    pub seed: u32,
    /// Mesh simplification ratio
    pub simplify: f32,
    /// Baked texture resolution
    pub texture_size: u32,
    /// Sparse structure sampling steps
    pub ss_sampling_steps: u32,
    /// Sparse structure guidance strength
    pub ss_guidance_strength: f32,
    /// Structured latent sampling steps
    pub slat_sampling_steps: u32,
    /// Structured latent guidance strength
    pub slat_guidance_strength: f32,
}

impl Default for TrellisParams {
    fn default() -> Self {
        Self {
            seed: 1,
            simplify: 0.95,
            texture_size: 1024,
            ss_sampling_steps: 12,
            ss_guidance_strength: 7.5,
            slat_sampling_steps: 12,
            slat_guidance_strength: 7.5,
        }
    }
}

impl TrellisParams {
    /// Defaults for multi-view generation
    pub fn multi_view() -> Self {
        Self {
            slat_guidance_strength: 3.0,
            ..Self::default()
        }
    }
}

/// Settings of the image+mask pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sam3dParams {
    /// Random seed
    pub seed: u32,
}

impl Default for Sam3dParams {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

/// Flags of a segmentation prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Ask for several candidate masks
    pub multimask_output: bool,
    /// Feed the previous best mask back in
    pub use_previous_mask: bool,
    /// Ask for the cut-out RGBA image as well as the mask
    pub return_rgba: bool,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            multimask_output: true,
            use_previous_mask: false,
            return_rgba: true,
        }
    }
}

/// Every parameter bundle, keyed by backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Model used when none is named
    pub model: ModelId,
    /// TRELLIS sliders
    pub trellis: TrellisParams,
    /// SAM 3D settings
    pub sam3d: Sam3dParams,
    /// Segmentation flags
    pub segment: SegmentParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = TrellisParams::default();
        assert_eq!(params.seed, 1);
        assert_eq!(params.simplify, 0.95);
        assert_eq!(params.ss_sampling_steps, 12);
        assert_eq!(TrellisParams::multi_view().slat_guidance_strength, 3.0);
        assert_eq!(Sam3dParams::default().seed, 42);
    }

    #[test]
    fn test_model_ids() {
        for model in ModelId::all() {
            assert_eq!(ModelId::parse(model.as_str()), Some(*model));
        }
        assert_eq!(serde_json::to_string(&ModelId::Sam3d).unwrap(), "\"sam3d\"");
        assert_eq!(ModelId::parse("dall-e"), None);
    }
}
