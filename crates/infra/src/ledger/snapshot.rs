use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON snapshot of a whole table, replaced atomically on every write.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records, or an empty table if the file does not exist yet.
    pub(crate) fn load<R: DeserializeOwned>(&self) -> io::Result<Vec<R>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Write and fsync a sibling temp file, then rename it over the snapshot.
    pub(crate) fn write<'a, R, I>(&self, records: I) -> io::Result<()>
    where
        R: Serialize + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let records: Vec<&R> = records.into_iter().collect();
        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.tmp_path();
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        sync_dir(self.path.parent())
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

/// Persist the rename itself. Directories cannot be opened for sync on Windows.
#[cfg(unix)]
fn sync_dir(dir: Option<&Path>) -> io::Result<()> {
    match dir {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: Option<&Path>) -> io::Result<()> {
    Ok(())
}
