use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Slot holding the output of the last `get` run.
pub const QUERY_RESULT_SLOT: &str = "logs_get";
/// Slot holding the last full log-group listing.
pub const LOG_GROUPS_SLOT: &str = "log_groups";

/// Directory the cache slots live in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRoot(PathBuf);

impl CacheRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// `<temp dir>/awsq`
    pub fn default_location() -> Self {
        Self(std::env::temp_dir().join("awsq"))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Last-output store, one file per slot, overwritten on every run.
#[derive(Clone, Debug)]
pub struct ResultCache {
    root: CacheRoot,
}

impl ResultCache {
    pub fn new(root: CacheRoot) -> Self {
        Self { root }
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.root.path().join(format!("{slot}.out"))
    }

    /// Truncates (or creates) the slot file and hands it out for streaming writes.
    pub fn create(&self, slot: &str) -> Result<File> {
        fs::create_dir_all(self.root.path())?;
        let path = self.slot_path(slot);
        debug!(path = %path.display(), "opening cache slot");
        Ok(File::create(path)?)
    }

    pub fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
        fs::create_dir_all(self.root.path())?;
        fs::write(self.slot_path(slot), data)?;
        Ok(())
    }

    pub fn read(&self, slot: &str) -> Result<Vec<u8>> {
        let path = self.slot_path(slot);
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::CacheMiss {
                slot: slot.to_string(),
                path,
            },
            _ => Error::Io(err),
        })
    }
}
