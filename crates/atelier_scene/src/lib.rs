// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene graph core for the Atelier asset studio.
//!
//! This crate owns everything that keeps the mesh hierarchy consistent:
//! - An arena-backed live tree of group and mesh nodes
//! - A detached mirror of that tree for display
//! - Selection tracking with single and multi toggle semantics
//! - Rename, group, reparent, merge and bulk mutations
//! - Bounded undo/redo over whole-scene snapshots
//! - glTF import, RON scene documents and OBJ export
//!
//! ## Architecture
//!
//! [`SceneStore`] is the single owner of the live tree. Front ends call its
//! methods; each mutating call snapshots first, mutates, then rebuilds the
//! mirror. The free functions in [`ops`] hold the structural logic and can be
//! used on a bare [`Scene`] when no history is wanted.

pub mod export;
pub mod geometry;
pub mod history;
pub mod import;
pub mod mirror;
pub mod node;
pub mod ops;
pub mod scene;
pub mod selection;
pub mod store;

pub use history::{History, HistoryError, HistoryStats, Snapshot, MAX_HISTORY};
pub use mirror::{refresh_mirror, MirrorNode};
pub use node::{Geometry, Material, NodeId, NodeKind, SceneNode, Transform};
pub use ops::GroupSpec;
pub use scene::{Scene, SceneError};
pub use selection::Selection;
pub use store::SceneStore;
