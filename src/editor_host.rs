//! Interfaces the bridge agent needs from the embedding editor.
//!
//! The scene graph, the asset pipeline and screen capture all belong to the host;
//! the bridge only drives them through these traits.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::bridge_command::{CommandError, Vector3, parse_bool, parse_vector3};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("GameObject '{0}' not found")]
    NotFound(String),
    #[error("GameObject '{0}' already exists")]
    AlreadyExists(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Editor operation failed: {0}")]
    OperationFailed(String),
}

/// Snapshot of a game object as reported back to the external actor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameObjectInfo {
    pub name: String,
    pub active: bool,
    pub position: Vector3,
    pub rotation: Vector3,
    pub scale: Vector3,
}

impl GameObjectInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
        }
    }
}

/// A typed property assignment, parsed before the host is touched
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Position(Vector3),
    Rotation(Vector3),
    Scale(Vector3),
    Active(bool),
    Name(String),
}

impl PropertyValue {
    pub const SUPPORTED: &'static [&'static str] = &["position", "rotation", "scale", "active", "name"];

    /// Parse a `property` / `value` argument pair
    pub fn parse(property: &str, value: &str) -> Result<Self, CommandError> {
        match property.trim().to_ascii_lowercase().as_str() {
            "position" => Ok(PropertyValue::Position(parse_vector3(value)?)),
            "rotation" => Ok(PropertyValue::Rotation(parse_vector3(value)?)),
            "scale" => Ok(PropertyValue::Scale(parse_vector3(value)?)),
            "active" => Ok(PropertyValue::Active(parse_bool(value)?)),
            "name" => {
                let name = value.trim();
                if name.is_empty() {
                    Err(CommandError::InvalidArgument("name cannot be empty".to_string()))
                } else {
                    Ok(PropertyValue::Name(name.to_string()))
                }
            }
            other => Err(CommandError::InvalidArgument(format!(
                "Unknown property '{}', supported: {}",
                other,
                Self::SUPPORTED.join(", ")
            ))),
        }
    }

    pub fn property_name(&self) -> &'static str {
        match self {
            PropertyValue::Position(_) => "position",
            PropertyValue::Rotation(_) => "rotation",
            PropertyValue::Scale(_) => "scale",
            PropertyValue::Active(_) => "active",
            PropertyValue::Name(_) => "name",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Position(v) | PropertyValue::Rotation(v) | PropertyValue::Scale(v) => {
                write!(f, "{}", v)
            }
            PropertyValue::Active(active) => write!(f, "{}", active),
            PropertyValue::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Outcome of a property assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    Changed,
    /// The object already had this value
    Unchanged,
}

/// Scene graph operations
pub trait SceneHost {
    fn create_game_object(&mut self, name: &str) -> Result<GameObjectInfo, HostError>;

    fn delete_game_object(&mut self, name: &str) -> Result<(), HostError>;

    fn find_game_object(&self, name: &str) -> Option<GameObjectInfo>;

    fn list_game_objects(&self) -> Vec<GameObjectInfo>;

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<PropertyChange, HostError>;

    /// Capture the editor view into `path`, returning the written file
    fn capture_screenshot(&mut self, path: &Path, width: u32, height: u32) -> Result<PathBuf, HostError>;
}

/// Independent remedies for getting the editor to pick up changed sources.
///
/// Every method must be idempotent; the escalation chain calls all of them in turn
/// because the editor does not tell us whether compilation actually started.
pub trait RefreshHost {
    /// Synchronously reimport changed assets
    fn reimport_assets(&mut self) -> anyhow::Result<()>;

    /// Ask the compilation pipeline for a script compile
    fn request_script_compilation(&mut self) -> anyhow::Result<()>;

    /// Persist unsaved asset changes
    fn save_assets(&mut self) -> anyhow::Result<()>;

    fn repaint_views(&mut self) -> anyhow::Result<()>;

    /// Explicit recompile entry point exposed by the host integration layer
    fn force_recompile(&mut self) -> anyhow::Result<()>;
}

/// Everything the bridge agent drives
pub trait EditorHost: SceneHost + RefreshHost {}

impl<T: SceneHost + RefreshHost + ?Sized> EditorHost for T {}
