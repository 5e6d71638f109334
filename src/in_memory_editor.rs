use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::editor_host::{
    GameObjectInfo, HostError, PropertyChange, PropertyValue, RefreshHost, SceneHost,
};
use crate::refresh_escalation::RefreshStrategy;

/// A screenshot request recorded by the in-memory editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedScreenshot {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Editor stand-in that keeps the scene in memory
///
/// Used by the demo host mode and by tests. Refresh strategies are recorded in call
/// order and can be made to fail individually.
#[derive(Debug, Default)]
pub struct InMemoryEditor {
    objects: BTreeMap<String, GameObjectInfo>,
    refresh_calls: Vec<RefreshStrategy>,
    failing_strategies: HashSet<RefreshStrategy>,
    screenshots: Vec<CapturedScreenshot>,
}

impl InMemoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `strategy` fail
    pub fn fail_strategy(&mut self, strategy: RefreshStrategy) {
        self.failing_strategies.insert(strategy);
    }

    pub fn refresh_calls(&self) -> Vec<RefreshStrategy> {
        self.refresh_calls.clone()
    }

    pub fn screenshots(&self) -> &[CapturedScreenshot] {
        &self.screenshots
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn rename(&mut self, name: &str, new_name: &str) -> Result<PropertyChange, HostError> {
        if new_name == name {
            return Ok(PropertyChange::Unchanged);
        }
        if self.objects.contains_key(new_name) {
            return Err(HostError::AlreadyExists(new_name.to_string()));
        }
        let mut info = self
            .objects
            .remove(name)
            .ok_or_else(|| HostError::NotFound(name.to_string()))?;
        info.name = new_name.to_string();
        self.objects.insert(new_name.to_string(), info);
        Ok(PropertyChange::Changed)
    }

    fn record(&mut self, strategy: RefreshStrategy) -> anyhow::Result<()> {
        self.refresh_calls.push(strategy);
        if self.failing_strategies.contains(&strategy) {
            anyhow::bail!("{} is unavailable in this editor", strategy);
        }
        Ok(())
    }
}

/// Apply a transform or active value in place, returning whether it changed
///
/// `None` for values that are not stored on the object itself (renames).
fn apply_transform(info: &mut GameObjectInfo, value: &PropertyValue) -> Option<bool> {
    let changed = match value {
        PropertyValue::Position(v) => std::mem::replace(&mut info.position, *v) != *v,
        PropertyValue::Rotation(v) => std::mem::replace(&mut info.rotation, *v) != *v,
        PropertyValue::Scale(v) => std::mem::replace(&mut info.scale, *v) != *v,
        PropertyValue::Active(active) => std::mem::replace(&mut info.active, *active) != *active,
        PropertyValue::Name(_) => return None,
    };
    Some(changed)
}

impl SceneHost for InMemoryEditor {
    fn create_game_object(&mut self, name: &str) -> Result<GameObjectInfo, HostError> {
        if self.objects.contains_key(name) {
            return Err(HostError::AlreadyExists(name.to_string()));
        }
        let info = GameObjectInfo::new(name);
        self.objects.insert(name.to_string(), info.clone());
        Ok(info)
    }

    fn delete_game_object(&mut self, name: &str) -> Result<(), HostError> {
        self.objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound(name.to_string()))
    }

    fn find_game_object(&self, name: &str) -> Option<GameObjectInfo> {
        self.objects.get(name).cloned()
    }

    fn list_game_objects(&self) -> Vec<GameObjectInfo> {
        self.objects.values().cloned().collect()
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<PropertyChange, HostError> {
        if !self.objects.contains_key(name) {
            return Err(HostError::NotFound(name.to_string()));
        }
        if let PropertyValue::Name(new_name) = value {
            return self.rename(name, new_name);
        }

        let info = self
            .objects
            .get_mut(name)
            .ok_or_else(|| HostError::NotFound(name.to_string()))?;
        Ok(match apply_transform(info, value) {
            Some(true) => PropertyChange::Changed,
            Some(false) | None => PropertyChange::Unchanged,
        })
    }

    fn capture_screenshot(&mut self, path: &Path, width: u32, height: u32) -> Result<PathBuf, HostError> {
        if path.as_os_str().is_empty() {
            return Err(HostError::InvalidValue("screenshot path is empty".to_string()));
        }
        self.screenshots.push(CapturedScreenshot {
            path: path.to_path_buf(),
            width,
            height,
        });
        Ok(path.to_path_buf())
    }
}

impl RefreshHost for InMemoryEditor {
    fn reimport_assets(&mut self) -> anyhow::Result<()> {
        self.record(RefreshStrategy::ForceReimport)
    }

    fn request_script_compilation(&mut self) -> anyhow::Result<()> {
        self.record(RefreshStrategy::RequestCompilation)
    }

    fn save_assets(&mut self) -> anyhow::Result<()> {
        self.record(RefreshStrategy::SaveAssets)
    }

    fn repaint_views(&mut self) -> anyhow::Result<()> {
        self.record(RefreshStrategy::Repaint)
    }

    fn force_recompile(&mut self) -> anyhow::Result<()> {
        self.record(RefreshStrategy::ForceRecompile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge_command::Vector3;

    #[test]
    fn test_create_find_delete() {
        let mut editor = InMemoryEditor::new();
        editor.create_game_object("Player").unwrap();
        assert!(editor.find_game_object("Player").is_some());
        assert_eq!(
            editor.create_game_object("Player"),
            Err(HostError::AlreadyExists("Player".to_string()))
        );

        editor.delete_game_object("Player").unwrap();
        assert!(editor.find_game_object("Player").is_none());
        assert_eq!(
            editor.delete_game_object("Player"),
            Err(HostError::NotFound("Player".to_string()))
        );
    }

    #[test]
    fn test_set_property_reports_unchanged() {
        let mut editor = InMemoryEditor::new();
        editor.create_game_object("Player").unwrap();
        let value = PropertyValue::Position(Vector3::new(1.0, 2.0, 3.0));

        assert_eq!(editor.set_property("Player", &value), Ok(PropertyChange::Changed));
        assert_eq!(editor.set_property("Player", &value), Ok(PropertyChange::Unchanged));
        assert_eq!(
            editor.find_game_object("Player").unwrap().position,
            Vector3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_rename() {
        let mut editor = InMemoryEditor::new();
        editor.create_game_object("Player").unwrap();
        editor.create_game_object("Enemy").unwrap();

        let rename = PropertyValue::Name("Hero".to_string());
        assert_eq!(editor.set_property("Player", &rename), Ok(PropertyChange::Changed));
        assert!(editor.find_game_object("Player").is_none());
        assert_eq!(editor.find_game_object("Hero").unwrap().name, "Hero");

        let clash = PropertyValue::Name("Enemy".to_string());
        assert_eq!(
            editor.set_property("Hero", &clash),
            Err(HostError::AlreadyExists("Enemy".to_string()))
        );
    }

    #[test]
    fn test_rename_missing_object_onto_existing_name() {
        let mut editor = InMemoryEditor::new();
        editor.create_game_object("Enemy").unwrap();

        let rename = PropertyValue::Name("Enemy".to_string());
        assert_eq!(
            editor.set_property("Ghost", &rename),
            Err(HostError::NotFound("Ghost".to_string()))
        );
        assert_eq!(
            editor.set_property("Ghost", &PropertyValue::Name("Ghost".to_string())),
            Err(HostError::NotFound("Ghost".to_string()))
        );
        assert_eq!(
            editor.set_property("Enemy", &PropertyValue::Name("Enemy".to_string())),
            Ok(PropertyChange::Unchanged)
        );
        assert_eq!(editor.object_count(), 1);
    }

    #[test]
    fn test_set_property_missing_object() {
        let mut editor = InMemoryEditor::new();
        let result = editor.set_property("Ghost", &PropertyValue::Active(false));
        assert_eq!(result, Err(HostError::NotFound("Ghost".to_string())));
    }
}
