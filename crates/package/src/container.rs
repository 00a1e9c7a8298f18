use crate::backend::{Packer, walk_files};
use crate::error::{ErrorKind, Result};
use crate::naming::{DifficultyMode, derived_container_path};
use crate::platform::Platform;
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, TempDir};
use tracing::instrument;

const SCRATCH_PREFIX: &str = "ddforge-";
const EXCLUDED_MARKERS: [&str; 2] = ["vocal", "showlight"];

/// Unpacks containers into scratch space and packs them back up.
#[derive(Clone)]
pub struct ContainerAdapter {
    packer: Arc<dyn Packer>,
    scratch_root: Option<PathBuf>,
}

impl ContainerAdapter {
    pub fn new(packer: Arc<dyn Packer>) -> Self {
        Self { packer, scratch_root: None }
    }

    /// Create scratch directories underneath `root` instead of the system
    /// temporary directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch(&self) -> Result<TempDir> {
        let mut builder = Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .or_raise(|| ErrorKind::Io)
    }

    /// Extract `container` into a fresh scratch directory.
    ///
    /// The scratch directory belongs to the returned [`UnpackedContainer`] and
    /// is removed when it is closed or dropped, whatever happened in between.
    #[instrument(skip(self), fields(container = %container.display()))]
    pub fn unpack(&self, container: &Path) -> Result<UnpackedContainer> {
        let Some(platform) = Platform::detect(container) else {
            exn::bail!(ErrorKind::UnknownPlatform(container.to_path_buf()));
        };
        let scratch = self.scratch()?;
        let root = self.packer.unpack(container, scratch.path(), platform)?;
        tracing::debug!(%platform, scratch = %scratch.path().display(), "Container unpacked");
        Ok(UnpackedContainer { source: container.to_path_buf(), platform, root, scratch })
    }

    /// Pack the tree of `unpacked` into a new container at `target`.
    ///
    /// The container is built beside `target` and moved into place only once
    /// complete, so a failed pack never clobbers an existing file.
    #[instrument(skip(self, unpacked), fields(target = %target.display()))]
    pub fn repack(&self, unpacked: &UnpackedContainer, target: &Path) -> Result<()> {
        let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
            exn::bail!(ErrorKind::InvalidPath(target.to_path_buf()));
        };
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        let staging = Builder::new().prefix(".ddforge-").tempdir_in(dir).or_raise(|| ErrorKind::Io)?;
        let staged = staging.path().join(name);
        self.packer.pack(&unpacked.root, &staged, unpacked.platform)?;
        fs::rename(&staged, target).or_raise(|| ErrorKind::Io)?;
        tracing::info!(source = %unpacked.source.display(), "Container repacked");
        Ok(())
    }
}

/// A container exploded into scratch space.
#[derive(Debug)]
pub struct UnpackedContainer {
    source: PathBuf,
    platform: Platform,
    root: PathBuf,
    scratch: TempDir,
}

impl UnpackedContainer {
    /// The container this was unpacked from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Root of the extracted tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the repacked container goes for the given mode.
    pub fn derived_path(&self, mode: DifficultyMode) -> Result<PathBuf> {
        derived_container_path(&self.source, self.platform, mode)
    }

    /// Every arrangement file in the tree, in a stable order.
    ///
    /// Vocals and showlights are XML too, but never arrangement data.
    pub fn arrangements(&self) -> Result<Vec<PathBuf>> {
        Ok(walk_files(&self.root)?.into_iter().filter(|path| is_arrangement(path)).collect())
    }

    /// Every file in the tree, relative to the root.
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        walk_files(&self.root)?
            .into_iter()
            .map(|path| path.strip_prefix(&self.root).map(Path::to_path_buf).or_raise(|| ErrorKind::Io))
            .collect()
    }

    /// The JSON manifest that describes `arrangement`, if the container has one.
    ///
    /// Manifests are matched on their name ending with the arrangement's stem.
    pub fn manifest_for(&self, arrangement: &Path) -> Result<Option<PathBuf>> {
        if !self.platform.has_manifests() {
            return Ok(None);
        }
        let Some(stem) = arrangement.file_stem().map(|s| s.to_string_lossy().to_ascii_lowercase()) else {
            return Ok(None);
        };
        let wanted = format!("{stem}.json");
        Ok(walk_files(&self.root)?.into_iter().find(|path| {
            path.file_name().is_some_and(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(&wanted))
        }))
    }

    /// Remove the scratch directory, reporting failure instead of ignoring it.
    pub fn close(self) -> Result<()> {
        self.scratch.close().or_raise(|| ErrorKind::Io)
    }
}

fn is_arrangement(path: &Path) -> bool {
    if !path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xml")) {
        return false;
    }
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_ascii_lowercase()) else {
        return false;
    };
    !EXCLUDED_MARKERS.iter().any(|marker| stem.contains(marker))
}
