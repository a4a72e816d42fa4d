//! Ledger records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ResourceIdentity;

/// How an identity left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The final frame was written to the output sink
    #[default]
    Stored,
    /// Extraction or output failed and the item was given up on
    Failed,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Stored => "stored",
            RecordOutcome::Failed => "failed",
        }
    }
}

/// One entry of the dedup ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Identity of the handled video
    pub identity: ResourceIdentity,
    /// When the identity was recorded (milliseconds since epoch)
    pub processed_at_ms: i64,
    /// Outcome of processing
    #[serde(default)]
    pub outcome: RecordOutcome,
}

impl ProcessedRecord {
    pub fn new(identity: ResourceIdentity, processed_at_ms: i64, outcome: RecordOutcome) -> Self {
        Self {
            identity,
            processed_at_ms,
            outcome,
        }
    }

    /// The record timestamp as a UTC datetime.
    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.processed_at_ms).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = ProcessedRecord::new("abc123".into(), 1_700_000_000_000, RecordOutcome::Stored);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["identity"], "abc123");
        assert_eq!(json["processed_at_ms"], 1_700_000_000_000i64);
        assert_eq!(json["outcome"], "stored");
    }

    #[test]
    fn test_outcome_defaults_to_stored() {
        let record: ProcessedRecord =
            serde_json::from_str(r#"{"identity":"k","processed_at_ms":5}"#).unwrap();
        assert_eq!(record.outcome, RecordOutcome::Stored);
        assert!(record.processed_at().is_some());
    }
}
