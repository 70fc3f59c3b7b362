// SPDX-License-Identifier: MIT OR Apache-2.0
//! Console command parsing.
//!
//! Node arguments may be full UUIDs, unique node names, or unique UUID
//! prefixes. Anything that is not a known command is a generation prompt.

use atelier_scene::{NodeId, Scene};
use thiserror::Error;

/// Errors raised while parsing or resolving a command
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// Not enough arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A coordinate did not parse
    #[error("not a number: {0}")]
    InvalidNumber(String),

    /// No node matches
    #[error("no node matches '{0}'")]
    UnknownNode(String),

    /// Several nodes match
    #[error("'{0}' matches {1} nodes, be more specific")]
    AmbiguousNode(String, usize),
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the tree
    Tree,
    /// Replace the selection
    Select(Vec<String>),
    /// Click a node
    Toggle {
        /// Node
        node: String,
        /// Multi-select mode
        multi: bool,
    },
    /// Empty the selection
    Clear,
    /// Rename a node
    Rename {
        /// Node
        node: String,
        /// New name
        name: String,
    },
    /// Group nodes, or the selection when empty
    Group(Vec<String>),
    /// Dissolve a group
    Ungroup(String),
    /// Move a node under another
    Reparent {
        /// Node to move
        child: String,
        /// New parent
        parent: String,
    },
    /// Merge meshes, or the selection when empty
    Merge(Vec<String>),
    /// Delete nodes, or the selection when empty
    Delete(Vec<String>),
    /// Set a node's position
    Move {
        /// Node
        node: String,
        /// New local position
        position: [f32; 3],
    },
    /// Undo the last change
    Undo,
    /// Redo the last undone change
    Redo,
    /// Text to 3D
    Generate(String),
    /// Image file to 3D
    Image(String),
    /// Cut an object out of an image at a pixel and turn it into 3D
    Segment {
        /// Image file
        path: String,
        /// Foreground click
        point: [f32; 2],
    },
    /// Run Smart Organize
    Organize,
    /// Run Auto-Rename
    AutoName,
    /// Run Auto-Group
    AutoGroup,
    /// Continue a cancelled flow
    Resume,
    /// Check the backends
    Status,
    /// Save the scene document
    Save(String),
    /// Load a scene document
    Load(String),
    /// Export OBJ
    Export(String),
    /// Show undo history
    History,
    /// Show help
    Help,
    /// Exit
    Quit,
    /// Blank line
    Empty,
}

/// Help text
pub const HELP: &str = "\
commands:
  tree                      show the scene tree
  select <node..>           replace the selection
  toggle <node> [multi]     click a node
  clear                     clear the selection
  rename <node> <name>      rename a node
  group [node..]            group nodes (default: selection)
  ungroup <node>            dissolve a group
  reparent <child> <parent> move a node under another
  merge [node..]            merge meshes (default: selection)
  delete [node..]           delete nodes (default: selection)
  move <node> <x> <y> <z>   set a node's position
  undo | redo               step through history
  generate <prompt>         text to 3D (or just type the prompt)
  image <file>              image to 3D
  segment <file> <x> <y>    cut out the object at a pixel, then image to 3D
  organize                  name and group every part
  autoname | autogroup      run one half of organize
  resume                    continue a cancelled flow
  status                    check the backends
  save <file> | load <file> scene documents
  export <file>             export OBJ
  history                   show undo history
  help | quit
nodes may be given as UUIDs, unique names or unique UUID prefixes";

/// Parse one console line
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<String> = rest.split_whitespace().map(String::from).collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "tree" | "ls" => Command::Tree,
        "select" => Command::Select(require(args, 1, "select <node..>")?),
        "toggle" => {
            let node = first(&args, "toggle <node> [multi]")?;
            let multi = matches!(args.get(1).map(String::as_str), Some("multi" | "+" | "true"));
            Command::Toggle { node, multi }
        }
        "clear" => Command::Clear,
        "rename" => {
            let node = first(&args, "rename <node> <name>")?;
            let name = rest
                .split_once(char::is_whitespace)
                .map(|(_, name)| name.trim().to_string())
                .ok_or(CommandError::Usage("rename <node> <name>"))?;
            Command::Rename { node, name }
        }
        "group" => Command::Group(args),
        "ungroup" => Command::Ungroup(first(&args, "ungroup <node>")?),
        "reparent" => {
            let args = require(args, 2, "reparent <child> <parent>")?;
            Command::Reparent {
                child: args[0].clone(),
                parent: args[1].clone(),
            }
        }
        "merge" => Command::Merge(args),
        "delete" | "rm" => Command::Delete(args),
        "move" => {
            let args = require(args, 4, "move <node> <x> <y> <z>")?;
            Command::Move {
                node: args[0].clone(),
                position: [number(&args[1])?, number(&args[2])?, number(&args[3])?],
            }
        }
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "generate" | "gen" if !rest.is_empty() => Command::Generate(rest.to_string()),
        "generate" | "gen" => return Err(CommandError::Usage("generate <prompt>")),
        "image" => Command::Image(path(rest, "image <file>")?),
        "segment" => {
            let args = require(args, 3, "segment <file> <x> <y>")?;
            Command::Segment {
                path: args[0].clone(),
                point: [number(&args[1])?, number(&args[2])?],
            }
        }
        "organize" => Command::Organize,
        "autoname" => Command::AutoName,
        "autogroup" => Command::AutoGroup,
        "resume" => Command::Resume,
        "status" => Command::Status,
        "save" => Command::Save(path(rest, "save <file>")?),
        "load" => Command::Load(path(rest, "load <file>")?),
        "export" => Command::Export(path(rest, "export <file>")?),
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Generate(line.to_string()),
    };
    Ok(command)
}

fn require(args: Vec<String>, count: usize, usage: &'static str) -> Result<Vec<String>, CommandError> {
    if args.len() < count {
        return Err(CommandError::Usage(usage));
    }
    Ok(args)
}

fn first(args: &[String], usage: &'static str) -> Result<String, CommandError> {
    args.first().cloned().ok_or(CommandError::Usage(usage))
}

fn path(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    let rest = rest.trim_matches(|c| c == '"' || c == '\'');
    if rest.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(rest.to_string())
}

fn number(text: &str) -> Result<f32, CommandError> {
    text.parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

/// Shortest UUID prefix accepted as a node reference
pub const MIN_PREFIX_LEN: usize = 4;

/// Resolve a node argument against the live tree.
///
/// Tried in order: full UUID, exact name, UUID prefix.
pub fn resolve_node(scene: &Scene, token: &str) -> Result<NodeId, CommandError> {
    if let Some(id) = NodeId::parse(token) {
        if scene.contains(id) {
            return Ok(id);
        }
        return Err(CommandError::UnknownNode(token.to_string()));
    }

    let by_name: Vec<NodeId> = scene
        .nodes()
        .filter(|n| n.name == token)
        .map(|n| n.id)
        .collect();
    match by_name.len() {
        0 => {}
        1 => return Ok(by_name[0]),
        n => return Err(CommandError::AmbiguousNode(token.to_string(), n)),
    }

    if token.len() < MIN_PREFIX_LEN {
        return Err(CommandError::UnknownNode(token.to_string()));
    }
    let prefix = token.to_ascii_lowercase();
    let by_prefix: Vec<NodeId> = scene
        .nodes()
        .map(|n| n.id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();
    match by_prefix.len() {
        0 => Err(CommandError::UnknownNode(token.to_string())),
        1 => Ok(by_prefix[0]),
        n => Err(CommandError::AmbiguousNode(token.to_string(), n)),
    }
}

/// Resolve several node arguments
pub fn resolve_nodes(scene: &Scene, tokens: &[String]) -> Result<Vec<NodeId>, CommandError> {
    tokens.iter().map(|t| resolve_node(scene, t)).collect()
}
