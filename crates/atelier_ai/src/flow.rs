// SPDX-License-Identifier: MIT OR Apache-2.0
//! AI organize flows as explicit state machines.
//!
//! A flow advances one transition per [`OrganizeFlow::step`] and makes at
//! most one remote call per transition:
//!
//! ```text
//! Idle -> Analyzing -> Classifying (once per mesh) -> Renaming -> Grouping -> Done
//! ```
//!
//! Auto-rename stops after Renaming; auto-group goes straight to Grouping.
//! Any failure clears the flow's progress and lands in `Failed`; batches
//! already committed to the store stay. Cancelling between steps parks the
//! flow in `Cancelled`, from where it can resume where it stopped.

use crate::error::ClientError;
use crate::plan::{apply_hierarchy, describe_parts};
use crate::thumbnail::{clamp_size, encode_png, render_scene, render_subtree, DEFAULT_THUMBNAIL_SIZE};
use crate::vision::VisionBackend;
use atelier_scene::{HistoryError, NodeId, SceneStore};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end a flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// A remote call failed
    #[error("Remote call failed: {0}")]
    Remote(#[from] ClientError),

    /// The store refused a batch
    #[error("Store error: {0}")]
    Store(#[from] HistoryError),
}

/// Which organize flow to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Analyze, name every part, then group
    SmartOrganize,
    /// Name every part
    AutoRename,
    /// Group the parts
    AutoGroup,
}

impl FlowKind {
    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            FlowKind::SmartOrganize => "Smart Organize",
            FlowKind::AutoRename => "Auto-Rename",
            FlowKind::AutoGroup => "Auto-Group",
        }
    }

    fn first_stage(&self) -> FlowStage {
        match self {
            FlowKind::SmartOrganize | FlowKind::AutoRename => FlowStage::Analyzing,
            FlowKind::AutoGroup => FlowStage::Grouping,
        }
    }

    fn after_renaming(&self) -> FlowStage {
        match self {
            FlowKind::SmartOrganize => FlowStage::Grouping,
            FlowKind::AutoRename | FlowKind::AutoGroup => FlowStage::Done,
        }
    }
}

/// Where a flow is. Non-terminal stages name the work the next step does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStage {
    /// Not started
    Idle,
    /// Ask what the whole scene shows
    Analyzing,
    /// Name the next part
    Classifying,
    /// Commit the collected names
    Renaming,
    /// Ask for and commit a hierarchy
    Grouping,
    /// Finished
    Done,
    /// Aborted by an error
    Failed(String),
    /// Stopped by the user
    Cancelled,
}

impl FlowStage {
    /// Whether stepping further does nothing
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStage::Done | FlowStage::Failed(_) | FlowStage::Cancelled)
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStage::Idle => write!(f, "idle"),
            FlowStage::Analyzing => write!(f, "analyzing scene"),
            FlowStage::Classifying => write!(f, "naming parts"),
            FlowStage::Renaming => write!(f, "renaming"),
            FlowStage::Grouping => write!(f, "grouping"),
            FlowStage::Done => write!(f, "done"),
            FlowStage::Failed(reason) => write!(f, "failed: {reason}"),
            FlowStage::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Shared flag that stops a flow at its next step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress snapshot for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowProgress {
    /// Parts named so far
    pub classified: usize,
    /// Parts to name
    pub total: usize,
}

/// Prompts sent to the vision model
#[derive(Debug, Clone)]
pub struct FlowPrompts {
    /// Asked about the whole scene
    pub analyze: String,
    /// Asked about each part; `{subject}` is replaced by the analysis answer
    pub classify: String,
    /// Sent with the part list; `{subject}` as above
    pub group: String,
}

impl Default for FlowPrompts {
    fn default() -> Self {
        Self {
            analyze: "What object does this 3D model show? Answer with one or two words.".into(),
            classify: "This is one part of a 3D model of {subject}. \
                       Give the part a short name (one to three words), nothing else."
                .into(),
            group: "These are the parts of a 3D model of {subject}. \
                    Group related parts and name every group and part."
                .into(),
        }
    }
}

/// One run of an organize flow
#[derive(Debug)]
pub struct OrganizeFlow {
    kind: FlowKind,
    stage: FlowStage,
    /// Stage to return to after a cancel
    resume_stage: Option<FlowStage>,
    /// Parts to name, depth-first
    targets: Vec<NodeId>,
    cursor: usize,
    /// Answer of the analysis step
    subject: Option<String>,
    proposals: Vec<(NodeId, String)>,
    cancel: CancelToken,
    prompts: FlowPrompts,
    thumbnail_size: u32,
}

impl OrganizeFlow {
    /// Create an idle flow
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            stage: FlowStage::Idle,
            resume_stage: None,
            targets: Vec::new(),
            cursor: 0,
            subject: None,
            proposals: Vec::new(),
            cancel: CancelToken::default(),
            prompts: FlowPrompts::default(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }

    /// Override the prompts
    pub fn with_prompts(mut self, prompts: FlowPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Override the preview size
    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = clamp_size(size);
        self
    }

    /// Flow kind
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Current stage
    pub fn stage(&self) -> &FlowStage {
        &self.stage
    }

    /// Answer of the analysis step, if it ran
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Names collected so far
    pub fn proposals(&self) -> &[(NodeId, String)] {
        &self.proposals
    }

    /// Handle that cancels this flow from elsewhere
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Progress through the classification pass
    pub fn progress(&self) -> FlowProgress {
        FlowProgress {
            classified: self.cursor,
            total: self.targets.len(),
        }
    }

    /// Stop at the next step
    pub fn cancel(&mut self) {
        self.cancel.cancel();
    }

    /// Continue a cancelled flow where it stopped. Returns false when the
    /// flow was not cancelled.
    pub fn resume(&mut self) -> bool {
        if self.stage != FlowStage::Cancelled {
            return false;
        }
        self.cancel.reset();
        self.stage = self.resume_stage.take().unwrap_or(FlowStage::Idle);
        info!("{} resumed at {}", self.kind.label(), self.stage);
        true
    }

    /// Make one transition. Returns the new stage.
    pub async fn step(&mut self, store: &mut SceneStore, backend: &dyn VisionBackend) -> Result<&FlowStage, FlowError> {
        if self.stage.is_terminal() {
            return Ok(&self.stage);
        }
        if self.cancel.is_cancelled() {
            info!("{} cancelled at {}", self.kind.label(), self.stage);
            self.resume_stage = Some(std::mem::replace(&mut self.stage, FlowStage::Cancelled));
            return Ok(&self.stage);
        }

        match self.advance(store, backend).await {
            Ok(next) => {
                debug!("{}: {} -> {}", self.kind.label(), self.stage, next);
                self.stage = next;
                Ok(&self.stage)
            }
            Err(err) => {
                warn!("{} failed at {}: {err}", self.kind.label(), self.stage);
                self.clear_progress();
                self.stage = FlowStage::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Step until the flow stops
    pub async fn run(&mut self, store: &mut SceneStore, backend: &dyn VisionBackend) -> Result<FlowStage, FlowError> {
        while !self.stage.is_terminal() {
            self.step(store, backend).await?;
        }
        Ok(self.stage.clone())
    }

    async fn advance(&mut self, store: &mut SceneStore, backend: &dyn VisionBackend) -> Result<FlowStage, FlowError> {
        match self.stage {
            FlowStage::Idle => {
                self.targets = store.scene().leaf_meshes();
                self.cursor = 0;
                if self.targets.is_empty() {
                    info!("{}: no meshes to organize", self.kind.label());
                    return Ok(FlowStage::Done);
                }
                info!("{} started on {} meshes", self.kind.label(), self.targets.len());
                Ok(self.kind.first_stage())
            }
            FlowStage::Analyzing => {
                let png = encode_png(&render_scene(store.scene(), self.thumbnail_size))?;
                let subject = backend.describe(&png, &self.prompts.analyze).await?;
                info!("Scene looks like: {subject}");
                self.subject = Some(subject);
                Ok(FlowStage::Classifying)
            }
            FlowStage::Classifying => {
                if let Some(&id) = self.targets.get(self.cursor) {
                    if store.scene().contains(id) {
                        let png = encode_png(&render_subtree(store.scene(), id, self.thumbnail_size))?;
                        let prompt = self.fill(&self.prompts.classify);
                        let name = backend.describe(&png, &prompt).await?;
                        self.proposals.push((id, name));
                    } else {
                        debug!("Part {id} vanished before it was named");
                    }
                    self.cursor += 1;
                }
                if self.cursor < self.targets.len() {
                    Ok(FlowStage::Classifying)
                } else {
                    Ok(FlowStage::Renaming)
                }
            }
            FlowStage::Renaming => {
                let renamed = store.bulk_rename(&self.proposals)?;
                info!("Renamed {renamed} parts");
                Ok(self.kind.after_renaming())
            }
            FlowStage::Grouping => {
                let parts = describe_parts(store.scene());
                let prompt = self.fill(&self.prompts.group);
                let proposal = backend.organize(&parts, &prompt).await?;
                apply_hierarchy(store, &proposal.hierarchy)?;
                Ok(FlowStage::Done)
            }
            FlowStage::Done | FlowStage::Failed(_) | FlowStage::Cancelled => Ok(self.stage.clone()),
        }
    }

    fn fill(&self, template: &str) -> String {
        template.replace("{subject}", self.subject.as_deref().unwrap_or("an object"))
    }

    fn clear_progress(&mut self) {
        self.targets.clear();
        self.cursor = 0;
        self.subject = None;
        self.proposals.clear();
        self.resume_stage = None;
    }
}
