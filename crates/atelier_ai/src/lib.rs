// SPDX-License-Identifier: MIT OR Apache-2.0
//! Remote collaborators and AI organize flows for the Atelier asset studio.
//!
//! - [`client::StudioClient`] talks to the generation and segmentation services
//! - [`vision::VisionClient`] talks to an OpenAI-compatible chat endpoint
//! - [`flow::OrganizeFlow`] sequences vision calls into bulk scene edits
//!
//! The scene core in `atelier_scene` has no network dependency; everything
//! remote lives here.

pub mod client;
pub mod error;
pub mod flow;
pub mod params;
pub mod plan;
pub mod protocol;
pub mod thumbnail;
pub mod vision;

pub use client::StudioClient;
pub use error::{ClientError, Result};
pub use flow::{CancelToken, FlowError, FlowKind, FlowStage, OrganizeFlow};
pub use params::{GenerationParams, ModelId, Sam3dParams, SegmentParams, TrellisParams};
pub use vision::{VisionBackend, VisionClient};
