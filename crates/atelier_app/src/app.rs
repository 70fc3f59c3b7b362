// SPDX-License-Identifier: MIT OR Apache-2.0
//! The studio application.
//!
//! Owns the scene store, the remote clients, and the transcript. Commands run
//! one at a time to completion; remote calls block on a current-thread
//! runtime, so no two edits ever interleave.

use crate::chat::Transcript;
use crate::commands::{self, resolve_node, resolve_nodes, Command, CommandError};
use crate::config::StudioSettings;
use atelier_ai::client::png_data_uri;
use atelier_ai::protocol::{GenerationRequest, PointPrompt};
use atelier_ai::{
    ClientError, FlowError, FlowKind, FlowStage, ModelId, OrganizeFlow, StudioClient, TrellisParams,
    VisionClient,
};
use atelier_scene::export::{export_obj, load_document, save_document, ExportError};
use atelier_scene::mirror::flatten;
use atelier_scene::{HistoryError, NodeId, Scene, Transform};
use std::path::Path;
use thiserror::Error;
use tokio::runtime::Runtime;

/// Errors surfaced to the user as transcript lines
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad command
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Undo stack refused
    #[error("history: {0}")]
    History(#[from] HistoryError),

    /// Remote call failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Organize flow failed
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Save, load, or export failed
    #[error(transparent)]
    Export(#[from] ExportError),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether to keep reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Read the next line
    Continue,
    /// Exit
    Quit,
}

/// The studio
pub struct StudioApp {
    settings: StudioSettings,
    store: atelier_scene::SceneStore,
    client: StudioClient,
    vision: VisionClient,
    transcript: Transcript,
    /// Last organize flow, kept so a cancelled run can resume
    flow: Option<OrganizeFlow>,
    runtime: Runtime,
}

impl StudioApp {
    /// Build the studio from settings
    pub fn new(settings: StudioSettings) -> Result<Self, AppError> {
        let endpoints = &settings.endpoints;
        let client = StudioClient::new(&endpoints.backend_url, &endpoints.segment_url)?;
        let vision = VisionClient::new(
            &endpoints.vision_api_base,
            endpoints.api_key.clone(),
            &endpoints.vision_model,
        )?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        tracing::info!(
            backend = %client.backend_url(),
            vision = %vision.endpoint(),
            "Studio ready"
        );

        Ok(Self {
            settings,
            store: atelier_scene::SceneStore::new(),
            client,
            vision,
            transcript: Transcript::new(),
            flow: None,
            runtime,
        })
    }

    /// Chat transcript
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Handle one console line. Failures become transcript lines.
    pub fn handle_line(&mut self, line: &str) -> Control {
        let command = match commands::parse(line) {
            Ok(command) => command,
            Err(err) => {
                self.transcript.system(err.to_string());
                return Control::Continue;
            }
        };
        if command == Command::Quit {
            return Control::Quit;
        }
        if let Err(err) = self.execute(command) {
            tracing::warn!("Command failed: {err}");
            self.transcript.system(err.to_string());
        }
        Control::Continue
    }

    /// Run one parsed command
    pub fn execute(&mut self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Empty | Command::Quit => {}
            Command::Help => {
                self.transcript.assistant(commands::HELP);
            }
            Command::Tree => {
                let tree = self.render_tree();
                self.transcript.assistant(tree);
            }
            Command::Select(tokens) => {
                let ids = resolve_nodes(self.store.scene(), &tokens)?;
                self.store.set_selection(ids);
                self.report_selection();
            }
            Command::Toggle { node, multi } => {
                let id = resolve_node(self.store.scene(), &node)?;
                self.store.toggle_select(id, multi);
                self.report_selection();
            }
            Command::Clear => {
                self.store.clear_selection();
                self.report_selection();
            }
            Command::Rename { node, name } => {
                let id = resolve_node(self.store.scene(), &node)?;
                let changed = self.store.rename(id, &name)?;
                self.report(changed, format!("Renamed to {}", name.trim()), "Name unchanged");
            }
            Command::Group(tokens) => {
                let ids = self.targets(&tokens)?;
                match self.store.group(&ids)? {
                    Some(group) => self.report(true, format!("Created group {}", short(group)), ""),
                    None => self.report(false, String::new(), "Nothing to group"),
                }
            }
            Command::Ungroup(node) => {
                let id = resolve_node(self.store.scene(), &node)?;
                match self.store.ungroup(id)? {
                    Some(freed) => self.report(true, format!("Ungrouped {} nodes", freed.len()), ""),
                    None => self.report(false, String::new(), "Only groups can be ungrouped"),
                }
            }
            Command::Reparent { child, parent } => {
                let child = resolve_node(self.store.scene(), &child)?;
                let parent = resolve_node(self.store.scene(), &parent)?;
                let moved = self.store.reparent(child, parent)?;
                self.report(moved, "Moved".to_string(), "That move would create a cycle");
            }
            Command::Merge(tokens) => {
                let ids = self.targets(&tokens)?;
                match self.store.merge(&ids)? {
                    Some(merged) => {
                        let name = self.node_name(merged);
                        self.report(true, format!("Merged into {name}"), "");
                    }
                    None => self.report(false, String::new(), "Merge needs at least two meshes"),
                }
            }
            Command::Delete(tokens) => {
                let ids = self.targets(&tokens)?;
                let removed = self.store.delete(&ids)?;
                self.report(removed > 0, format!("Deleted {removed} nodes"), "Nothing deleted");
            }
            Command::Move { node, position } => {
                let id = resolve_node(self.store.scene(), &node)?;
                self.move_node(id, position)?;
            }
            Command::Undo => {
                let undone = self.store.undo()?;
                self.report(undone, "Undone".to_string(), "Nothing to undo");
            }
            Command::Redo => {
                let redone = self.store.redo()?;
                self.report(redone, "Redone".to_string(), "Nothing to redo");
            }
            Command::Generate(prompt) => self.generate_text(&prompt)?,
            Command::Image(path) => self.generate_image(Path::new(&path))?,
            Command::Segment { path, point } => self.segment(Path::new(&path), point)?,
            Command::Organize => self.run_flow(OrganizeFlow::new(FlowKind::SmartOrganize))?,
            Command::AutoName => self.run_flow(OrganizeFlow::new(FlowKind::AutoRename))?,
            Command::AutoGroup => self.run_flow(OrganizeFlow::new(FlowKind::AutoGroup))?,
            Command::Resume => self.resume_flow()?,
            Command::Status => {
                let up = self.runtime.block_on(self.client.health()).unwrap_or(false);
                let status = if up { "up" } else { "unreachable" };
                self.transcript.assistant(format!("Segmentation service is {status}"));
            }
            Command::Save(path) => {
                let path = self.settings.output_path(&path);
                ensure_parent(&path)?;
                save_document(self.store.scene(), &path)?;
                self.store.mark_saved();
                self.transcript.assistant(format!("Saved {}", path.display()));
            }
            Command::Load(path) => {
                let path = self.settings.output_path(&path);
                let scene = load_document(&path)?;
                self.store.replace_scene(scene);
                self.flow = None;
                self.transcript
                    .assistant(format!("Loaded {} ({} nodes)", path.display(), self.store.scene().len()));
            }
            Command::Export(path) => {
                let path = self.settings.output_path(&path);
                ensure_parent(&path)?;
                let objects = export_obj(self.store.scene(), &path)?;
                self.transcript
                    .assistant(format!("Exported {objects} meshes to {}", path.display()));
            }
            Command::History => {
                let text = self.render_history();
                self.transcript.assistant(text);
            }
        }
        Ok(())
    }

    /// Explicit ids, or the selection when none are given
    fn targets(&self, tokens: &[String]) -> Result<Vec<NodeId>, AppError> {
        if tokens.is_empty() {
            Ok(self.store.selection().ids().to_vec())
        } else {
            Ok(resolve_nodes(self.store.scene(), tokens)?)
        }
    }

    fn move_node(&mut self, id: NodeId, position: [f32; 3]) -> Result<(), AppError> {
        let Some(node) = self.store.scene().get(id) else {
            return Ok(());
        };
        let transform = Transform {
            position,
            ..node.transform
        };
        if transform == node.transform || id == self.store.scene().root() {
            self.report(false, String::new(), "Nothing to move");
            return Ok(());
        }
        self.store.begin_transform_gesture()?;
        self.store.set_transform(id, transform);
        self.report(true, format!("Moved to {position:?}"), "");
        Ok(())
    }

    // Generation ---------------------------------------------------------

    fn trellis_params(&self, model: ModelId) -> TrellisParams {
        let generation = &self.settings.generation;
        match model {
            ModelId::TrellisMulti => TrellisParams {
                slat_guidance_strength: TrellisParams::multi_view().slat_guidance_strength,
                ..generation.trellis.clone()
            },
            ModelId::Sam3d => TrellisParams {
                seed: generation.sam3d.seed,
                ..generation.trellis.clone()
            },
            ModelId::Trellis => generation.trellis.clone(),
        }
    }

    fn generate_text(&mut self, prompt: &str) -> Result<(), AppError> {
        self.transcript.user(prompt);
        let model = match self.settings.generation.model {
            ModelId::TrellisMulti => ModelId::Trellis,
            model => model,
        };
        let request = GenerationRequest::text(prompt, model, self.trellis_params(model));
        self.import_generated(&request, &asset_name(prompt))
    }

    fn generate_image(&mut self, path: &Path) -> Result<(), AppError> {
        self.transcript.user(format!("image {}", path.display()));
        let png = std::fs::read(path)?;
        let model = ModelId::Trellis;
        let request = GenerationRequest::image(png_data_uri(&png), model, self.trellis_params(model));
        self.import_generated(&request, &file_stem_name(path))
    }

    fn segment(&mut self, path: &Path, [x, y]: [f32; 2]) -> Result<(), AppError> {
        self.transcript
            .user(format!("segment {} at ({x}, {y})", path.display()));
        let png = std::fs::read(path)?;
        let prompt = PointPrompt::default().foreground(x, y);
        let params = self.settings.generation.segment.clone();

        let client = &self.client;
        let cutout = self.runtime.block_on(async {
            let session = client.open_segmentation(png).await?;
            let outcome = async {
                let applied = client
                    .predict_and_apply(&session.session_id, &prompt, &params)
                    .await?;
                let file = applied.rgba_image.unwrap_or(applied.mask);
                client.download(&file).await
            }
            .await;
            if let Err(err) = client.close_segmentation(&session.session_id).await {
                tracing::debug!("Could not close segmentation session: {err}");
            }
            outcome
        })?;
        self.transcript.assistant("Object cut out, generating");

        let model = ModelId::Sam3d;
        let request = GenerationRequest::image(png_data_uri(&cutout), model, self.trellis_params(model));
        self.import_generated(&request, &file_stem_name(path))
    }

    fn import_generated(&mut self, request: &GenerationRequest, name: &str) -> Result<(), AppError> {
        let scene: Scene = match self.runtime.block_on(self.client.generate_scene(request, name)) {
            Ok(scene) => scene,
            Err(err) => {
                self.transcript.system(format!("Generation failed: {err}"));
                return Ok(());
            }
        };
        let parts = scene.leaf_meshes().len();
        if self.store.import(scene, name)?.is_some() {
            self.transcript
                .assistant(format!("Added '{name}' with {parts} parts"));
        }
        Ok(())
    }

    // Flows --------------------------------------------------------------

    fn run_flow(&mut self, flow: OrganizeFlow) -> Result<(), AppError> {
        let flow = flow.with_thumbnail_size(self.settings.output.thumbnail_size);
        self.transcript.user(flow.kind().label());
        self.flow = Some(flow);
        self.drive_flow()
    }

    fn resume_flow(&mut self) -> Result<(), AppError> {
        let resumed = self.flow.as_mut().is_some_and(OrganizeFlow::resume);
        if !resumed {
            self.transcript.system("No cancelled flow to resume");
            return Ok(());
        }
        self.drive_flow()
    }

    /// Step the current flow until it stops. Ctrl-C cancels between steps.
    fn drive_flow(&mut self) -> Result<(), AppError> {
        let Self {
            flow,
            store,
            vision,
            runtime,
            transcript,
            ..
        } = self;
        let Some(flow) = flow.as_mut() else {
            return Ok(());
        };
        let token = flow.cancel_token();

        let outcome: Result<(), FlowError> = runtime.block_on(async {
            while !flow.stage().is_terminal() {
                tokio::select! {
                    step = flow.step(store, &*vision) => {
                        step?;
                    }
                    _ = tokio::signal::ctrl_c() => token.cancel(),
                }
            }
            Ok(())
        });

        let label = flow.kind().label();
        match (outcome, flow.stage()) {
            (Err(err), _) => {
                transcript.system(format!("{label} stopped: {err}"));
            }
            (Ok(()), FlowStage::Cancelled) => {
                let progress = flow.progress();
                transcript.system(format!(
                    "{label} cancelled after {}/{} parts, type 'resume' to continue",
                    progress.classified, progress.total
                ));
            }
            (Ok(()), _) => {
                let named = flow.proposals().len();
                transcript.assistant(format!(
                    "{label} finished: {named} parts named, {} top-level nodes",
                    store.mirror().len()
                ));
            }
        }
        Ok(())
    }

    // Reporting ----------------------------------------------------------

    fn report(&mut self, changed: bool, done: String, unchanged: &str) {
        if changed {
            self.transcript.assistant(done);
        } else {
            self.transcript.system(unchanged);
        }
    }

    fn report_selection(&mut self) {
        let names: Vec<String> = self
            .store
            .selection()
            .iter()
            .map(|id| self.node_name(*id))
            .collect();
        let text = if names.is_empty() {
            "Selection cleared".to_string()
        } else {
            format!("Selected: {}", names.join(", "))
        };
        self.transcript.assistant(text);
    }

    fn node_name(&self, id: NodeId) -> String {
        self.store
            .scene()
            .get(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| short(id))
    }

    fn render_tree(&self) -> String {
        let mirror = self.store.mirror();
        if mirror.is_empty() {
            return "(empty scene)".to_string();
        }
        let selection = self.store.selection();
        flatten(mirror)
            .into_iter()
            .map(|(depth, node)| {
                let marker = if selection.contains(node.id) { "*" } else { " " };
                format!(
                    "{marker} {}{} [{}] {}",
                    "  ".repeat(depth),
                    node.name,
                    node.kind.as_str(),
                    short(node.id)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_history(&self) -> String {
        let history = self.store.history();
        let stats = history.stats();
        let mut text = format!(
            "{} undo / {} redo (max {}), {} bytes",
            stats.undo_count, stats.redo_count, stats.max_depth, stats.memory_used
        );
        if let Some(label) = history.undo_description() {
            text.push_str(&format!("\nundo: {label}"));
        }
        if let Some(label) = history.redo_description() {
            text.push_str(&format!("\nredo: {label}"));
        }
        if self.store.is_dirty() {
            text.push_str("\nunsaved changes");
        }
        text
    }
}

fn short(id: NodeId) -> String {
    id.to_string().chars().take(8).collect()
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Name for an asset generated from a prompt
fn asset_name(prompt: &str) -> String {
    let words: Vec<String> = prompt
        .split_whitespace()
        .filter(|w| !matches!(w.to_ascii_lowercase().as_str(), "a" | "an" | "the"))
        .take(3)
        .map(|w| {
            let w: String = w.chars().filter(|c| c.is_alphanumeric()).collect();
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        "Asset".to_string()
    } else {
        words.join("_")
    }
}

fn file_stem_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| asset_name(&s.to_string_lossy().replace(['_', '-'], " ")))
        .unwrap_or_else(|| "Asset".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_scene::{Geometry, Material, SceneNode};

    /// The export directory lives as long as the returned guard
    fn app() -> (StudioApp, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = StudioSettings::default();
        settings.output.export_dir = dir.path().join("exports");
        (StudioApp::new(settings).unwrap(), dir)
    }

    fn load_abc(app: &mut StudioApp) -> [NodeId; 3] {
        let mut scene = Scene::new();
        let root = scene.root();
        let tri = Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0, 1, 2]);
        let ids = ["A", "B", "C"]
            .map(|name| scene.add_child(root, SceneNode::mesh(name, tri.clone(), Material::default())).unwrap());
        app.store.replace_scene(scene);
        ids
    }

    fn last(app: &StudioApp) -> String {
        app.transcript().last().map(|e| e.text.clone()).unwrap_or_default()
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(asset_name("a red sports car with spoiler"), "Red_Sports_Car");
        assert_eq!(asset_name("!!!"), "Asset");
        assert_eq!(file_stem_name(Path::new("photos/old-chair.png")), "Old_Chair");
    }

    #[test]
    fn test_editing_session() {
        let (mut app, _dir) = app();
        let [a, b, c] = load_abc(&mut app);

        assert_eq!(app.handle_line("group A B"), Control::Continue);
        let root = app.store.scene().root();
        let group = app.store.scene().children_of(root)[0];
        assert_eq!(app.store.scene().children_of(group), &[a, b]);
        assert_eq!(app.store.selection().ids(), &[group]);

        app.handle_line(&format!("rename {} Wheels", short(group)));
        assert_eq!(app.store.scene().get(group).unwrap().name, "Wheels");

        app.handle_line("tree");
        assert!(last(&app).contains("* Wheels [group]"));

        app.handle_line("undo");
        app.handle_line("undo");
        assert_eq!(app.store.scene().children_of(root), &[a, b, c]);
        app.handle_line("undo");
        assert_eq!(last(&app), "Nothing to undo");
    }

    #[test]
    fn test_errors_go_to_transcript() {
        let (mut app, _dir) = app();
        load_abc(&mut app);

        app.handle_line("rename Door Hatch");
        assert_eq!(last(&app), "no node matches 'Door'");
        app.handle_line("merge A");
        assert_eq!(last(&app), "Merge needs at least two meshes");
        app.handle_line("reparent");
        assert_eq!(last(&app), "usage: reparent <child> <parent>");
    }

    #[test]
    fn test_merge_selection_and_move() {
        let (mut app, _dir) = app();
        let [a, b, _] = load_abc(&mut app);

        app.handle_line("select A B");
        app.handle_line("merge");
        assert_eq!(last(&app), "Merged into Merged_1");
        assert!(!app.store.scene().contains(a) && !app.store.scene().contains(b));

        app.handle_line("move C 0 2 0");
        app.handle_line("move C 0 2 0");
        assert_eq!(last(&app), "Nothing to move");
        assert_eq!(app.store.history().undo_depth(), 2);
    }

    #[test]
    fn test_save_load_export() {
        let (mut app, _dir) = app();
        load_abc(&mut app);
        let before = app.store.scene().clone();

        app.handle_line("save scene.ron");
        app.handle_line("delete A B C");
        assert!(app.store.mirror().is_empty());
        app.handle_line("load scene.ron");
        assert_eq!(app.store.scene(), &before);

        app.handle_line("export scene.obj");
        assert!(last(&app).starts_with("Exported 3 meshes"));
    }

    #[test]
    fn test_resume_without_flow() {
        let (mut app, _dir) = app();
        app.handle_line("resume");
        assert_eq!(last(&app), "No cancelled flow to resume");
        assert_eq!(app.handle_line("quit"), Control::Quit);
    }
}
