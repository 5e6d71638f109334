use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Creates a minimal Unity project in a temporary directory
///
/// Layout: `ProjectSettings/ProjectVersion.txt`, `Packages/manifest.json`,
/// `Assets/GameManager.cs`, `Assets/Scripts/Player.cs` and `Assets/Scenes/Main.unity`.
pub fn create_test_unity_project() -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix("UnityProject")
        .tempdir()
        .expect("Failed to create temp project directory");
    let root = dir.path();

    write_file(
        root,
        "ProjectSettings/ProjectVersion.txt",
        "m_EditorVersion: 6000.0.51f1\nm_EditorVersionWithRevision: 6000.0.51f1 (01c3ff5872c5)\n",
    );
    write_file(root, "Packages/manifest.json", "{\n  \"dependencies\": {}\n}\n");
    write_file(
        root,
        "Assets/GameManager.cs",
        "using UnityEngine;\n\npublic class GameManager : MonoBehaviour { }\n",
    );
    write_file(
        root,
        "Assets/Scripts/Player.cs",
        "using UnityEngine;\n\npublic class Player : MonoBehaviour { }\n",
    );
    write_file(root, "Assets/Scenes/Main.unity", "%YAML 1.1\n%TAG !u! tag:unity3d.com,2011:\n");

    dir
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create test project folder");
    }
    fs::write(&path, content).expect("Failed to write test project file");
}
