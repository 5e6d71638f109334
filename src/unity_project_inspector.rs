use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};
use walkdir::WalkDir;

use crate::debug_log;

#[derive(Debug, thiserror::Error)]
pub enum UnityProjectError {
    #[error("Not a Unity project: {0}")]
    NotUnityProject(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Unity version not found")]
    VersionNotFound,
    #[error("Unity process not found")]
    ProcessNotFound,
}

/// Contents of `ProjectSettings/ProjectVersion.txt`
#[derive(Debug, Deserialize)]
struct ProjectVersion {
    #[serde(rename = "m_EditorVersion")]
    editor_version: String,
}

/// Contents of `Library/EditorInstance.json`, written by a running editor
#[derive(Debug, Deserialize)]
struct EditorInstance {
    process_id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub project_root: String,
    pub project_name: String,
    pub unity_version: String,
    pub editor_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    /// Folder relative to Assets, empty for scripts directly in Assets
    pub folder: String,
}

/// Read-only view of a Unity project on disk
#[derive(Debug, Clone)]
pub struct UnityProjectInspector {
    project_root: PathBuf,
}

impl UnityProjectInspector {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Result<Self, UnityProjectError> {
        let project_root = project_root.as_ref();
        if !Self::is_unity_project_path(project_root) {
            return Err(UnityProjectError::NotUnityProject(format!(
                "Path '{}' is not a Unity project",
                project_root.display()
            )));
        }
        Ok(Self {
            project_root: project_root.to_path_buf(),
        })
    }

    /// Checks if the given path is a Unity project root
    pub fn is_unity_project_path<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        path.join("ProjectSettings").is_dir() && path.join("Assets").is_dir()
    }

    /// Find the project containing `start`, searching upwards through its ancestors
    pub fn find_project_root<P: AsRef<Path>>(start: P) -> Option<PathBuf> {
        let start = start.as_ref();
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
        start
            .ancestors()
            .find(|candidate| Self::is_unity_project_path(candidate))
            .map(Path::to_path_buf)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn assets_path(&self) -> PathBuf {
        self.project_root.join("Assets")
    }

    pub fn project_name(&self) -> String {
        self.project_root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Gets the Unity editor version from ProjectVersion.txt
    pub fn unity_version(&self) -> Result<String, UnityProjectError> {
        let version_path = self
            .project_root
            .join("ProjectSettings")
            .join("ProjectVersion.txt");
        let content = fs::read_to_string(version_path)?;
        let version: ProjectVersion =
            serde_yaml::from_str(&content).map_err(|_| UnityProjectError::VersionNotFound)?;
        let version = version.editor_version.trim().to_string();
        if version.is_empty() {
            Err(UnityProjectError::VersionNotFound)
        } else {
            Ok(version)
        }
    }

    /// Process ID of the editor that has this project open
    pub fn editor_process_id(&self) -> Result<u32, UnityProjectError> {
        let instance_path = self.project_root.join("Library").join("EditorInstance.json");
        if !instance_path.exists() {
            return Err(UnityProjectError::ProcessNotFound);
        }

        let content = fs::read_to_string(instance_path)?;
        let instance: EditorInstance = serde_json::from_str(&content)?;

        if is_unity_process_running(instance.process_id) {
            Ok(instance.process_id)
        } else {
            Err(UnityProjectError::ProcessNotFound)
        }
    }

    pub fn project_info(&self) -> ProjectInfo {
        ProjectInfo {
            project_root: self.project_root.display().to_string(),
            project_name: self.project_name(),
            unity_version: self
                .unity_version()
                .unwrap_or_else(|_| "Unknown".to_string()),
            editor_running: self.editor_process_id().is_ok(),
        }
    }

    pub fn list_scenes(&self) -> Vec<SceneEntry> {
        self.asset_files("unity")
            .into_iter()
            .map(|(path, size)| SceneEntry {
                name: file_stem(&path),
                path: self.relative_to_root(&path),
                size,
            })
            .collect()
    }

    pub fn list_scripts(&self) -> Vec<ScriptEntry> {
        let assets = self.assets_path();
        self.asset_files("cs")
            .into_iter()
            .map(|(path, size)| ScriptEntry {
                name: file_stem(&path),
                path: self.relative_to_root(&path),
                size,
                folder: path
                    .parent()
                    .and_then(|parent| parent.strip_prefix(&assets).ok())
                    .map(|folder| folder.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Files under Assets with `extension`, sorted by path
    fn asset_files(&self, extension: &str) -> Vec<(PathBuf, u64)> {
        let mut files: Vec<(PathBuf, u64)> = WalkDir::new(self.assets_path())
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug_log!("Skipping unreadable asset entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
            })
            .map(|entry| {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                (entry.into_path(), size)
            })
            .collect();
        files.sort();
        files
    }

    fn relative_to_root(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Checks if a process with the given PID is running and looks like the Unity Editor
fn is_unity_process_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().to_lowercase().contains("unity"))
        .unwrap_or(false)
}
