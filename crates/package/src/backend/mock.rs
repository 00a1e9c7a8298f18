//! JSON-backed container codec for testing.

use super::{Packer, walk_files};
use crate::error::{ErrorKind, Result};
use crate::platform::Platform;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Serialize, Deserialize)]
struct Image {
    platform: String,
    entries: BTreeMap<String, String>,
}

/// Container codec for testing.
///
/// A "container" is a JSON document mapping `/`-separated relative paths to
/// UTF-8 file contents. Ideal for tests that need a [`Packer`] without an
/// external tool; counts operations so tests can assert whether a repack
/// happened at all.
///
/// # Examples
///
/// ```
/// use ddforge_package::backend::MockPacker;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let container = dir.path().join("song_p.psarc");
/// MockPacker::write_container(&container, [("songs/arr/song_lead.xml", "<song/>")])?;
/// let entries = MockPacker::read_entries(&container)?;
/// assert_eq!(entries["songs/arr/song_lead.xml"], "<song/>");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockPacker {
    unpacked: AtomicUsize,
    packed: AtomicUsize,
}

impl MockPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful [`Packer::unpack`] calls.
    pub fn unpack_count(&self) -> usize {
        self.unpacked.load(Ordering::SeqCst)
    }

    /// Number of successful [`Packer::pack`] calls.
    pub fn pack_count(&self) -> usize {
        self.packed.load(Ordering::SeqCst)
    }

    /// Write a container image straight to disk.
    pub fn write_container(
        path: impl AsRef<Path>,
        entries: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<()> {
        let path = path.as_ref();
        let platform = Platform::detect(path).map(|p| p.to_string()).unwrap_or_default();
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        write_image(path, &Image { platform, entries })
    }

    pub fn read_entries(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
        Ok(read_image(path.as_ref())?.entries)
    }
}

fn read_image(path: &Path) -> Result<Image> {
    let bytes = fs::read(path).or_raise(|| ErrorKind::Io)?;
    serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))
}

fn write_image(path: &Path, image: &Image) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(image).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))?;
    fs::write(path, bytes).or_raise(|| ErrorKind::Io)
}

/// Entries must stay inside the extraction directory.
fn entry_path(container: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
    match safe && !name.is_empty() {
        true => Ok(relative.to_path_buf()),
        false => exn::bail!(ErrorKind::Corrupt(container.to_path_buf())),
    }
}

impl Packer for MockPacker {
    fn unpack(&self, container: &Path, destination: &Path, _platform: Platform) -> Result<PathBuf> {
        let image = read_image(container)?;
        for (name, contents) in &image.entries {
            let target = destination.join(entry_path(container, name)?);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
            }
            fs::write(&target, contents).or_raise(|| ErrorKind::Io)?;
        }
        self.unpacked.fetch_add(1, Ordering::SeqCst);
        Ok(destination.to_path_buf())
    }

    fn pack(&self, source: &Path, destination: &Path, platform: Platform) -> Result<()> {
        let mut entries = BTreeMap::new();
        for file in walk_files(source)? {
            let Ok(relative) = file.strip_prefix(source) else {
                exn::bail!(ErrorKind::Io);
            };
            let name = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
            let contents = fs::read_to_string(&file).or_raise(|| ErrorKind::Corrupt(file.clone()))?;
            entries.insert(name, contents);
        }
        write_image(destination, &Image { platform: platform.to_string(), entries })?;
        self.packed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
