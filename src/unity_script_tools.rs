use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs as async_fs;

use crate::{debug_log, info_log, warn_log};

/// Throwaway script written into Assets to make the editor notice a change
pub const TRIGGER_FILE_NAME: &str = "mcp_refresh_trigger.cs";

/// How long the trigger script stays on disk
const TRIGGER_LIFETIME: Duration = Duration::from_millis(100);

const DEFAULT_SCRIPT_FOLDER: &str = "Scripts";

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{0} is required")]
    MissingArgument(&'static str),
    #[error("Invalid script name '{0}'")]
    InvalidName(String),
    #[error("Script not found: {0}")]
    NotFound(String),
    #[error("Script already exists: {0}")]
    AlreadyExists(String),
    #[error("Path '{0}' is outside the Unity project")]
    OutsideProject(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedScript {
    pub success: bool,
    pub script_path: String,
    pub lines: usize,
    pub auto_refresh: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReceipt {
    pub success: bool,
    pub action: &'static str,
    pub reason: String,
    pub timestamp: String,
}

/// Relative path that cannot climb out of its base directory
fn contained_relative_path(raw: &str) -> Result<PathBuf, ScriptError> {
    let path = Path::new(raw.trim());
    let contained = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if raw.trim().is_empty() || !contained {
        return Err(ScriptError::OutsideProject(raw.to_string()));
    }
    Ok(path.to_path_buf())
}

fn display_relative(project_root: &Path, path: &Path) -> String {
    path.strip_prefix(project_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Read a script given its path relative to the project root
pub async fn read_script(project_root: &Path, script_path: &str) -> Result<String, ScriptError> {
    if script_path.trim().is_empty() {
        return Err(ScriptError::MissingArgument("script_path"));
    }
    let full_path = project_root.join(contained_relative_path(script_path)?);
    if !full_path.is_file() {
        return Err(ScriptError::NotFound(script_path.to_string()));
    }
    Ok(async_fs::read_to_string(full_path).await?)
}

/// Keep only characters valid in a C# class name
pub fn sanitize_script_name(name: &str) -> Result<String, ScriptError> {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match sanitized.chars().next() {
        None => Err(ScriptError::InvalidName(name.to_string())),
        Some(first) if first.is_ascii_digit() => Err(ScriptError::InvalidName(name.to_string())),
        Some(_) => Ok(sanitized),
    }
}

fn mono_behaviour_template(class_name: &str) -> String {
    format!(
        r#"using UnityEngine;

public class {class_name} : MonoBehaviour
{{
    void Start()
    {{

    }}

    void Update()
    {{

    }}
}}"#
    )
}

/// Create a MonoBehaviour script under `Assets/<folder>` and force a refresh
pub async fn create_script(
    project_root: &Path,
    script_name: &str,
    folder: Option<&str>,
) -> Result<CreatedScript, ScriptError> {
    if script_name.trim().is_empty() {
        return Err(ScriptError::MissingArgument("script_name"));
    }
    let class_name = sanitize_script_name(script_name)?;
    let folder = contained_relative_path(folder.unwrap_or(DEFAULT_SCRIPT_FOLDER))?;

    let target_dir = project_root.join("Assets").join(folder);
    async_fs::create_dir_all(&target_dir).await?;

    let script_file = target_dir.join(format!("{}.cs", class_name));
    let script_path = display_relative(project_root, &script_file);
    if script_file.exists() {
        return Err(ScriptError::AlreadyExists(script_path));
    }

    let content = mono_behaviour_template(&class_name);
    async_fs::write(&script_file, &content).await?;
    info_log!("Created script {}", script_path);

    if let Err(e) = force_refresh(project_root, &format!("Created script: {}", class_name)).await {
        warn_log!("Script created but refresh trigger failed: {}", e);
    }

    Ok(CreatedScript {
        success: true,
        script_path,
        lines: content.lines().count(),
        auto_refresh: "forced",
    })
}

/// Make the editor notice a change by briefly adding a script to Assets
pub async fn force_refresh(project_root: &Path, reason: &str) -> Result<RefreshReceipt, ScriptError> {
    let now = chrono::Local::now();
    let trigger_file = project_root.join("Assets").join(TRIGGER_FILE_NAME);
    let content = format!(
        "// MCP REFRESH TRIGGER - {}\n// This file forces Unity to refresh - it will be auto-deleted\n// Reason: {}\nusing UnityEngine;\npublic class McpRefreshTrigger_{} : MonoBehaviour {{ }}\n",
        now.format("%Y-%m-%d %H:%M:%S%.6f"),
        reason.replace('\n', " "),
        now.timestamp()
    );

    async_fs::write(&trigger_file, content).await?;
    tokio::time::sleep(TRIGGER_LIFETIME).await;
    if trigger_file.exists() {
        async_fs::remove_file(&trigger_file).await?;
    }
    debug_log!("Refresh trigger cycled: {}", reason);

    Ok(RefreshReceipt {
        success: true,
        action: "force_refresh",
        reason: reason.to_string(),
        timestamp: now.to_rfc3339(),
    })
}
