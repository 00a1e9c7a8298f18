//! Container codec backends.
//!
//! The binary container format is not implemented here. A [`Packer`] is
//! anything that can explode a container into a directory tree and build a
//! container back from one; the pipeline only ever works on the tree.

mod command;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::command::CommandPacker;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockPacker;
use crate::error::{ErrorKind, Result};
use crate::platform::Platform;
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

/// Unified interface for container codecs.
pub trait Packer: Send + Sync {
    /// Extract `container` into the existing, empty `destination` directory.
    ///
    /// Returns the root of the extracted tree, which is `destination` or a
    /// directory underneath it. The same root is later handed to [`pack`](Self::pack).
    fn unpack(&self, container: &Path, destination: &Path, platform: Platform) -> Result<PathBuf>;

    /// Build a container at `destination` from every file under `source`.
    fn pack(&self, source: &Path, destination: &Path, platform: Platform) -> Result<()>;
}

/// Every regular file underneath `dir`, recursively, in a stable order.
pub(crate) fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk_into(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).or_raise(|| ErrorKind::Io)? {
        let entry = entry.or_raise(|| ErrorKind::Io)?;
        let file_type = entry.file_type().or_raise(|| ErrorKind::Io)?;
        if file_type.is_dir() {
            walk_into(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}
