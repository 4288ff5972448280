use serde::{Deserialize, Serialize};

use crate::{Iteration, Version};

/// One persisted, immutable fact about a completed iteration attempt.
///
/// Serialized as one line of `runs.jsonl`:
/// `{"id":..,"chrome":..,"ref":..,"sha":..,"iteration":..,"timestamp":..,"durationMs":..,"exitCode":..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique record id; also names the output blobs.
    pub id: String,
    /// Browser version.
    #[serde(rename = "chrome")]
    pub version: Version,
    /// Revision display name at the time of the run.
    #[serde(rename = "ref")]
    pub revision: String,
    /// Revision sha at the time of the run.
    pub sha: String,
    pub iteration: Iteration,
    /// ISO-8601 UTC start time with millisecond precision.
    pub timestamp: String,
    pub duration_ms: u64,
    pub exit_code: i32,
}

impl RunRecord {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Captured output stream of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const ALL: [OutputStream; 2] = [OutputStream::Stdout, OutputStream::Stderr];

    /// File extension of the blob holding this stream.
    #[inline]
    pub fn extension(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(exit_code: i32) -> RunRecord {
        RunRecord {
            id: "id-1".into(),
            version: "120".into(),
            revision: "main".into(),
            sha: "aaa".into(),
            iteration: 0,
            timestamp: "2026-02-18T10:30:00.000Z".into(),
            duration_ms: 1000,
            exit_code,
        }
    }

    #[test]
    fn wire_field_names() {
        let json = serde_json::to_string(&record(0)).unwrap();
        assert_eq!(
            json,
            r#"{"id":"id-1","chrome":"120","ref":"main","sha":"aaa","iteration":0,"timestamp":"2026-02-18T10:30:00.000Z","durationMs":1000,"exitCode":0}"#
        );
    }

    #[test]
    fn missing_field_is_rejected() {
        let line = r#"{"id":"x","chrome":"120","ref":"main","sha":"aaa","iteration":0,"timestamp":"t","durationMs":1}"#;
        assert!(serde_json::from_str::<RunRecord>(line).is_err());
    }
}
