//! Ramp-up model catalog.
//!
//! Ramp-up models are XML files shipped with the engine (and imported by the
//! user) that shape how difficulty escalates within a generated arrangement.
//! They live anywhere underneath the engine directory; user imports are kept
//! in `umdls/` with a `user_` prefix that is hidden from display names.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

/// Selected unless the user picks something else.
pub const DEFAULT_MODEL: &str = "ddc_default";
/// Selecting this model strips difficulty levels instead of generating them.
pub const REMOVER_MODEL: &str = "ddc_dd_remover";
const USER_PREFIX: &str = "user_";
const USER_DIR: &str = "umdls";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampModel {
    pub name: String,
    pub path: PathBuf,
}

impl RampModel {
    pub fn is_remover(&self) -> bool {
        self.name == REMOVER_MODEL
    }
}

#[derive(Debug, Clone, Default)]
pub struct RampModels {
    models: Vec<RampModel>,
}

impl RampModels {
    /// Catalog every `*.xml` underneath `engine_dir`. A missing directory is
    /// an empty catalog.
    pub fn discover(engine_dir: impl AsRef<Path>) -> Result<Self> {
        let engine_dir = engine_dir.as_ref();
        let mut models = Vec::new();
        if engine_dir.is_dir() {
            collect(engine_dir, &mut models)?;
        } else {
            tracing::info!(dir = %engine_dir.display(), "Engine directory missing; no ramp-up models available");
        }
        models.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        models.dedup_by(|later, first| later.name == first.name);
        tracing::debug!(count = models.len(), "Discovered ramp-up models");
        Ok(Self { models })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RampModel> {
        self.models.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RampModel> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn default_model(&self) -> Option<&RampModel> {
        self.get(DEFAULT_MODEL)
    }

    /// Resolve either a catalog name or a path to an existing model file.
    pub fn resolve(&self, name_or_path: &str) -> Option<RampModel> {
        if let Some(model) = self.get(name_or_path) {
            return Some(model.clone());
        }
        let path = Path::new(name_or_path);
        match path.is_file() {
            true => Some(RampModel { name: display_name(path)?, path: path.to_path_buf() }),
            false => None,
        }
    }

    /// Copy a user model into the engine directory so it shows up in
    /// subsequent discoveries. Re-importing the same name replaces the file.
    pub fn import(engine_dir: impl AsRef<Path>, file: impl AsRef<Path>) -> Result<RampModel> {
        let file = file.as_ref();
        let Some(name) = file.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()) else {
            exn::bail!(ErrorKind::Model(file.to_path_buf()));
        };
        let target_dir = engine_dir.as_ref().join(USER_DIR);
        fs::create_dir_all(&target_dir).or_raise(|| ErrorKind::Model(target_dir.clone()))?;
        let target = target_dir.join(format!("{USER_PREFIX}{name}.xml"));
        fs::copy(file, &target).or_raise(|| ErrorKind::Model(file.to_path_buf()))?;
        tracing::info!(name, path = %target.display(), "Imported ramp-up model");
        Ok(RampModel { name: name.to_string(), path: target })
    }
}

fn collect(dir: &Path, models: &mut Vec<RampModel>) -> Result<()> {
    let entries = fs::read_dir(dir).or_raise(|| ErrorKind::Model(dir.to_path_buf()))?;
    for entry in entries {
        let path = entry.or_raise(|| ErrorKind::Model(dir.to_path_buf()))?.path();
        if path.is_dir() {
            collect(&path, models)?;
        } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xml"))
            && let Some(name) = display_name(&path)
        {
            models.push(RampModel { name, path });
        }
    }
    Ok(())
}

fn display_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.strip_prefix(USER_PREFIX).unwrap_or(stem).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<model/>").unwrap();
    }

    #[test]
    fn discover_strips_user_prefix_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ddc_default.xml"));
        touch(&dir.path().join("ddc_dd_remover.xml"));
        touch(&dir.path().join("umdls").join("user_gentle.xml"));
        touch(&dir.path().join("ddc.exe"));
        let models = RampModels::discover(dir.path()).unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["ddc_dd_remover", "ddc_default", "gentle"]);
        assert!(models.get(REMOVER_MODEL).unwrap().is_remover());
        assert!(!models.default_model().unwrap().is_remover());
    }

    #[test]
    fn discover_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RampModels::discover(dir.path().join("ddc")).unwrap().is_empty());
    }

    #[test]
    fn import_then_discover() {
        let dir = tempfile::tempdir().unwrap();
        let engine_dir = dir.path().join("ddc");
        let source = dir.path().join("steep.xml");
        touch(&source);
        let imported = RampModels::import(&engine_dir, &source).unwrap();
        assert_eq!(imported.name, "steep");
        assert_eq!(imported.path, engine_dir.join("umdls").join("user_steep.xml"));
        let models = RampModels::discover(&engine_dir).unwrap();
        assert_eq!(models.get("steep").unwrap().path, imported.path);
    }

    #[test]
    fn resolve_by_name_or_path() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ddc_default.xml"));
        let outside = elsewhere.path().join("custom.xml");
        touch(&outside);
        let models = RampModels::discover(dir.path()).unwrap();
        assert!(models.get("custom").is_none());
        assert_eq!(models.resolve(DEFAULT_MODEL).unwrap().name, DEFAULT_MODEL);
        let resolved = models.resolve(outside.to_str().unwrap()).unwrap();
        assert_eq!(resolved.name, "custom");
        assert!(models.resolve("missing").is_none());
    }
}
