use crate::arrangement::Arrangement;
use crate::error::{ErrorKind, Result};
use crate::summary::Summary;
use exn::{OptionExt, ResultExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::instrument;

/// Rewrites the summary fields of an arrangement's manifest after the engine
/// has changed the arrangement.
///
/// Only `PhraseIterations`, `Phrases`, `Sections` and `MaxPhraseDifficulty`
/// are replaced. Every other field keeps its position and its value; numbers
/// also keep their exact text. The file itself is re-serialised, so string
/// escapes and whitespace are normalised.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestSynchronizer;

impl ManifestSynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// Recompute the summary of `arrangement` and write it into `record`.
    ///
    /// Returns the key the entry is now stored under: the persistent ID from
    /// its attributes, or its previous key if it has none. Nothing is written
    /// unless every step succeeds.
    #[instrument(skip(self), fields(arrangement = %arrangement.display(), record = %record.display()))]
    pub fn resync(&self, arrangement: &Path, record: &Path) -> Result<String> {
        let summary = Summary::compute(&Arrangement::load(arrangement)?)?;
        let bytes = fs::read(record).or_raise(|| ErrorKind::Io(record.to_path_buf()))?;
        let mut manifest: Value =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::MalformedManifest(record.to_path_buf()))?;
        let key = apply(&mut manifest, &summary, record)?;
        write_atomically(record, &manifest)?;
        tracing::debug!(%key, max_difficulty = summary.max_phrase_difficulty, "Manifest resynchronised");
        Ok(key)
    }
}

fn set(attributes: &mut Map<String, Value>, field: &str, value: impl Serialize, record: &Path) -> Result<()> {
    let value = serde_json::to_value(value).or_raise(|| ErrorKind::MalformedManifest(record.to_path_buf()))?;
    attributes.insert(field.to_string(), value);
    Ok(())
}

/// Replace the summary fields of the first entry and re-key it.
fn apply(manifest: &mut Value, summary: &Summary, record: &Path) -> Result<String> {
    let malformed = || ErrorKind::MalformedManifest(record.to_path_buf());
    let entries = manifest.get_mut("Entries").and_then(Value::as_object_mut).ok_or_raise(malformed)?;
    let mut rebuilt = Map::new();
    let mut updated = None;
    for (key, mut entry) in std::mem::take(entries) {
        if updated.is_some() {
            rebuilt.insert(key, entry);
            continue;
        }
        let attributes = entry.get_mut("Attributes").and_then(Value::as_object_mut).ok_or_raise(malformed)?;
        set(attributes, "PhraseIterations", &summary.phrase_iterations, record)?;
        set(attributes, "Phrases", &summary.phrases, record)?;
        set(attributes, "Sections", &summary.sections, record)?;
        set(attributes, "MaxPhraseDifficulty", summary.max_phrase_difficulty, record)?;
        let key = match attributes.get("PersistentID").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => key,
        };
        rebuilt.insert(key.clone(), entry);
        updated = Some(key);
    }
    *entries = rebuilt;
    updated.ok_or_raise(malformed)
}

fn write_atomically(path: &Path, manifest: &Value) -> Result<()> {
    let io = || ErrorKind::Io(path.to_path_buf());
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut file = NamedTempFile::new_in(dir).or_raise(io)?;
    serde_json::to_writer_pretty(&mut file, manifest).or_raise(io)?;
    file.persist(path).or_raise(io)?;
    Ok(())
}
