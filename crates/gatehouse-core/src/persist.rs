//! Small JSON persistence helpers shared by the config and directory files.
//!
//! Writes go to `<path>.tmp` first and are renamed over the target, so a
//! crash mid-write leaves either the old or the new file, never a torn one.

use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Path of the temporary sibling used for atomic replacement.
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// # Errors
/// Returns an error if serialization, the temporary write, or the rename fails.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let body = serde_json::to_vec_pretty(value)?;
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read JSON from `path`, falling back to `T::default()` when the file is
/// missing or unreadable.
///
/// A missing file is the normal first-boot case and is not logged; a file
/// that exists but does not parse is logged at `warn` so a corrupt state
/// file never keeps the controller from starting.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read state file, using defaults");
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt state file, using defaults");
            T::default()
        }
    }
}
