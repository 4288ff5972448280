//! Append-only result log plus per-iteration output blobs.
//!
//! ```text
//! <state>/runs.jsonl            one RunRecord per line
//! <state>/output/<id>.stdout    raw captured bytes
//! <state>/output/<id>.stderr    raw captured bytes
//! ```
mod writer;
pub use writer::RecordWriter;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use ranger_model::{OutputStream, RunRecord};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::state::StateDir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode run record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Partition produced by [`ResultStore::delete_where`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub kept: Vec<RunRecord>,
    pub removed: Vec<RunRecord>,
}

/// File-backed result store rooted at a [`StateDir`].
///
/// Appends are not synchronized here; concurrent writers must go through a
/// shared [`RecordWriter`].
#[derive(Debug, Clone)]
pub struct ResultStore {
    state: StateDir,
}

impl ResultStore {
    pub fn new(state: StateDir) -> Self {
        Self { state }
    }

    #[inline]
    pub fn state(&self) -> &StateDir {
        &self.state
    }

    /// Path of the blob holding `stream` for record `id`.
    pub fn output_path(&self, id: &str, stream: OutputStream) -> PathBuf {
        self.state
            .output_dir()
            .join(format!("{id}.{}", stream.extension()))
    }

    /// All records in log order.
    ///
    /// A missing or empty log yields an empty list; malformed lines are skipped.
    pub fn load(&self) -> Result<Vec<RunRecord>, StoreError> {
        let path = self.state.runs_path();
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut records = Vec::new();
        for (n, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice::<RunRecord>(line) {
                Ok(r) => records.push(r),
                Err(e) => {
                    debug!(target: "ranger.core.store", line = n + 1, error = %e, "skipping malformed record");
                }
            }
        }
        trace!(target: "ranger.core.store", count = records.len(), "records loaded");
        Ok(records)
    }

    /// Append one record as a single line.
    pub fn append(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let root = self.state.root();
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;

        let path = self.state.runs_path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(&line)
            .and_then(|_| file.sync_data())
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Write one output blob. Empty content still produces a zero-length file.
    pub fn write_output(
        &self,
        id: &str,
        stream: OutputStream,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let dir = self.state.output_dir();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let path = self.output_path(id, stream);
        fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))
    }

    /// Read one output blob; `None` if it was never written.
    pub fn read_output(&self, id: &str, stream: OutputStream) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.output_path(id, stream);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Remove every record matching `predicate` together with its blobs.
    ///
    /// The log is rewritten with the kept records only, or removed when none
    /// remain. Missing blobs are ignored.
    pub fn delete_where<P>(&self, predicate: P) -> Result<Deletion, StoreError>
    where
        P: Fn(&RunRecord) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = self.load()?.into_iter().partition(|r| predicate(r));

        for record in &removed {
            for stream in OutputStream::ALL {
                let path = self.output_path(&record.id, stream);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(target: "ranger.core.store", path = %path.display(), error = %e, "failed to remove output blob");
                    }
                }
            }
        }

        let path = self.state.runs_path();
        if kept.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        } else {
            let mut content = Vec::new();
            for record in &kept {
                serde_json::to_writer(&mut content, record)?;
                content.push(b'\n');
            }
            replace_file(&path, &content)?;
        }

        debug!(
            target: "ranger.core.store",
            kept = kept.len(),
            removed = removed.len(),
            "records deleted"
        );
        Ok(Deletion { kept, removed })
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("runs.jsonl");
    let tmp = path.with_file_name(format!(".{name}.tmp.{}", std::process::id()));

    let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
