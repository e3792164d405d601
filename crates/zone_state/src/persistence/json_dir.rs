//! One JSON document per zone in a directory.

use super::backend::SnapshotBackend;
use super::PersistenceError;
use crate::snapshot::ZoneSnapshot;
use crate::types::ZoneId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Stores each zone as `<dir>/<zone>.json`, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `zone_id`.
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, so distinct ids
    /// always get distinct files.
    pub fn path_for(&self, zone_id: &ZoneId) -> PathBuf {
        let mut file_stem = String::with_capacity(zone_id.as_str().len());
        for byte in zone_id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file_stem.push(char::from(byte));
            } else {
                file_stem.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{file_stem}.{EXTENSION}"))
    }

    fn snapshot_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl SnapshotBackend for JsonDirBackend {
    fn load_all(&self) -> Result<Vec<ZoneSnapshot>, PersistenceError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for path in self.snapshot_files()? {
            let content = fs::read_to_string(&path)?;
            let snapshot = serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupt {
                zone: path.display().to_string(),
                reason: e.to_string(),
            })?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn write(&self, snapshot: &ZoneSnapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_bytes_atomic(&self.path_for(&snapshot.zone_id), &bytes)?;
        Ok(())
    }

    fn remove(&self, zone_id: &ZoneId) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(zone_id)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        if !self.dir.exists() {
            return Ok(());
        }
        for path in self.snapshot_files()? {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!("{EXTENSION}.tmp"));
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}
