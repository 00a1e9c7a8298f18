//! Classification of candidate paths and the pending work set.

use derive_more::Display;
use ddforge_package::naming::{COMPANION_SUFFIX, OUTPUT_PREFIX, SHOWLIGHTS_SUFFIX};
use std::path::{Path, PathBuf};

/// What a path is, judged by its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum WorkKind {
    /// A bare arrangement XML file, processed in place.
    #[display("arrangement")]
    LooseArrangement,
    /// A platform container holding arrangements and their manifests.
    #[display("container")]
    PackagedContainer,
    #[display("unrecognized")]
    Unrecognized,
}

/// Classify `path` by extension (ASCII case-insensitive).
///
/// | Extension                      | Kind                |
/// |--------------------------------|---------------------|
/// | `.xml`                         | LooseArrangement    |
/// | `.psarc`, `.dat`, `.edat`, none| PackagedContainer   |
/// | anything else                  | Unrecognized        |
pub fn classify(path: impl AsRef<Path>) -> WorkKind {
    let Some(ext) = path.as_ref().extension() else {
        return WorkKind::PackagedContainer;
    };
    match ext.to_string_lossy().to_ascii_lowercase().as_str() {
        "xml" => WorkKind::LooseArrangement,
        "psarc" | "dat" | "edat" | "" => WorkKind::PackagedContainer,
        _ => WorkKind::Unrecognized,
    }
}

/// Why a path was refused at intake.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Rejection {
    #[display("unrecognized file type")]
    Unrecognized,
    #[display("showlights are not arrangement data")]
    Showlights,
    #[display("reserved companion file")]
    Companion,
    #[display("output of a previous run")]
    PreviousOutput,
    #[display("no usable file name")]
    InvalidName,
    #[display("another file is already queued as '{_0}'")]
    DuplicateId(String),
}

/// Byproducts and auxiliary files that must never become work items,
/// whatever their extension says.
fn excluded(file_name: &str) -> Option<Rejection> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(SHOWLIGHTS_SUFFIX) {
        Some(Rejection::Showlights)
    } else if lower.ends_with(COMPANION_SUFFIX) {
        Some(Rejection::Companion)
    } else if file_name.starts_with(OUTPUT_PREFIX) {
        Some(Rejection::PreviousOutput)
    } else {
        None
    }
}

/// One file queued for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// File name without its extension; unique within a work set.
    pub id: String,
    pub path: PathBuf,
    pub kind: WorkKind,
}

impl WorkItem {
    /// Classify `path` and check it against the intake exclusions.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Rejection> {
        let path = path.into();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(Rejection::InvalidName);
        };
        if let Some(rejection) = excluded(file_name) {
            return Err(rejection);
        }
        let kind = classify(&path);
        if kind == WorkKind::Unrecognized {
            return Err(Rejection::Unrecognized);
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()) else {
            return Err(Rejection::InvalidName);
        };
        Ok(Self { id: id.to_string(), path, kind })
    }
}

/// Result of offering a path to a [`WorkSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Added(String),
    /// The exact path is already queued; nothing changed.
    AlreadyPresent(String),
    Rejected(Rejection),
}

/// Pending work, in the order it was added.
///
/// Owned by whoever collects work; a batch only ever sees a
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Clone, Default)]
pub struct WorkSet {
    items: Vec<WorkItem>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `path` for processing. Adding is idempotent.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> Admission {
        let item = match WorkItem::new(path) {
            Ok(item) => item,
            Err(rejection) => {
                tracing::debug!(%rejection, "Path rejected at intake");
                return Admission::Rejected(rejection);
            },
        };
        if let Some(existing) = self.items.iter().find(|existing| existing.id == item.id) {
            return match existing.path == item.path {
                true => Admission::AlreadyPresent(item.id),
                false => Admission::Rejected(Rejection::DuplicateId(item.id)),
            };
        }
        tracing::debug!(id = %item.id, kind = %item.kind, "Queued for processing");
        let id = item.id.clone();
        self.items.push(item);
        Admission::Added(id)
    }

    /// Discard a queued item, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<WorkItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    /// An immutable copy of the queue, handed to a batch at start.
    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.items.clone()
    }
}
