//! Crash-safe file replacement

use crate::error::{HarvestError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Sibling temp path used while `path` is being written
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path` atomically: the closure writes into `<path>.tmp` in the same
/// directory, which is synced and renamed over the target. Readers see either
/// the old file or the complete new one. The temp file is removed on failure.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            HarvestError::PersistenceError(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let tmp = temp_path(path);
    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        write(&mut file)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(match e {
            HarvestError::PersistenceError(_) => e,
            other => HarvestError::PersistenceError(format!("writing {}: {}", path.display(), other)),
        });
    }
    Ok(())
}
