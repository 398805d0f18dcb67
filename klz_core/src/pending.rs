use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Staged output for one file operation.
///
/// The temporary file lives next to the destination so the final rename
/// never crosses a filesystem. Dropping a `PendingOutput` that was not
/// promoted deletes the temporary file.
pub struct PendingOutput {
    file: NamedTempFile,
    destination: PathBuf,
}

impl PendingOutput {
    pub fn create(destination: &Path) -> io::Result<Self> {
        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let prefix = match destination.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".klzip.".to_string(),
        };
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self {
            file,
            destination: destination.to_path_buf(),
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Path of the temporary file while it is staged.
    pub fn staged_path(&self) -> &Path {
        self.file.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Bytes staged so far.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    /// Sync the staged data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.as_file().sync_all()
    }

    /// Atomically rename the staged file onto the destination. On failure
    /// the staged file is removed.
    ///
    /// Without `overwrite`, a destination that appeared since it was last
    /// checked is left alone and the error kind is `AlreadyExists`.
    pub fn promote(self, overwrite: bool) -> io::Result<()> {
        let persisted = if overwrite {
            self.file.persist(&self.destination)
        } else {
            self.file.persist_noclobber(&self.destination)
        };
        persisted.map(|_| ()).map_err(|e| e.error)
    }

    /// Delete the staged file now, reporting a failed deletion.
    pub fn discard(self) -> io::Result<()> {
        self.file.close()
    }
}
