use ranger_model::{OutputStream, RunRecord};
use tokio::sync::Mutex;
use tracing::trace;

use super::{ResultStore, StoreError};

/// Single logical writer for the result log.
///
/// Owned by the coordinator and shared by every worker of a pool. Appends
/// are mutually exclusive but not FIFO. Output blobs are per-id and are
/// written outside the critical section.
#[derive(Debug)]
pub struct RecordWriter {
    store: ResultStore,
    gate: Mutex<()>,
}

impl RecordWriter {
    pub fn new(store: ResultStore) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    #[inline]
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Persist both captured streams of record `id`.
    pub fn write_outputs(&self, id: &str, stdout: &[u8], stderr: &[u8]) -> Result<(), StoreError> {
        self.store.write_output(id, OutputStream::Stdout, stdout)?;
        self.store.write_output(id, OutputStream::Stderr, stderr)
    }

    /// Append `record` while holding the writer gate.
    pub async fn append(&self, record: &RunRecord) -> Result<(), StoreError> {
        let _guard = self.gate.lock().await;
        self.store.append(record)?;
        trace!(target: "ranger.core.store", id = %record.id, "record appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::state::StateDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_stay_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(RecordWriter::new(ResultStore::new(StateDir::for_project(dir.path()))));

        let mut handles = Vec::new();
        for i in 0..64u32 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                let record = RunRecord {
                    id: format!("id-{i}"),
                    version: "120".into(),
                    revision: "main".into(),
                    sha: "aaa".into(),
                    iteration: i,
                    timestamp: "2026-02-18T10:30:00.000Z".into(),
                    duration_ms: u64::from(i),
                    exit_code: 0,
                };
                writer.write_outputs(&record.id, b"out", b"").unwrap();
                writer.append(&record).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let raw = std::fs::read_to_string(writer.store().state().runs_path()).unwrap();
        assert_eq!(raw.lines().count(), 64);
        let records = writer.store().load().unwrap();
        let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 64);
    }
}
