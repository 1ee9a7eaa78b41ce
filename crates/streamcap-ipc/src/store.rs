//! Per-instance status record storage.
//!
//! Each recorder publishes exactly one file named
//! `streamcap-<instance id>.status` in a well-known shared directory. Writes
//! go to a temp sibling first and are renamed into place so readers never
//! observe a half-written record.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::StatusRecord;

pub(crate) const FILE_PREFIX: &str = "streamcap-";
pub(crate) const FILE_SUFFIX: &str = ".status";

/// The well-known shared directory holding all status records on this host.
///
/// Overridable with `STREAMCAP_STATUS_DIR`; defaults to the system temp dir.
pub fn status_dir() -> PathBuf {
    std::env::var_os("STREAMCAP_STATUS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Handle to one instance's status record file.
pub struct StatusStore {
    path: PathBuf,
    instance_id: String,
}

impl StatusStore {
    /// Create a store for a new instance with a locally-unique id.
    pub fn create(dir: &Path) -> Self {
        let instance_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let path = dir.join(format!("{FILE_PREFIX}{instance_id}{FILE_SUFFIX}"));
        Self { path, instance_id }
    }

    /// Open a store at an existing record path (used by stop dispatch).
    pub fn open(path: &Path) -> Self {
        let instance_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(FILE_PREFIX))
            .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            .unwrap_or_default()
            .to_string();
        Self {
            path: path.to_path_buf(),
            instance_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Write the record atomically: temp sibling, then rename.
    pub fn publish(&self, record: &StatusRecord) -> crate::Result<()> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| StoreError::malformed(&self.path, e))?;
        let tmp = self.path.with_extension("status.tmp");
        fs::write(&tmp, payload).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "published status record");
        Ok(())
    }

    /// Read the record back.
    pub fn load(&self) -> crate::Result<StatusRecord> {
        load_record(&self.path)
    }

    /// Remove the record. Missing files are not an error: a stop tool or a
    /// previous shutdown pass may have raced us to the delete.
    pub fn delete(&self) -> crate::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

pub(crate) fn load_record(path: &Path) -> crate::Result<StatusRecord> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&data).map_err(|e| StoreError::malformed(path, e))
}
