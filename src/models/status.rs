use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Stage of a transcode job in the pipeline state machine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Queued,
    Converting,
    Segmenting,
    Publishing,
    Completed,
    Failed,
}

impl Stage {
    /// Terminal stages admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// The externally observable state of a job.
///
/// There is a single writer per id (the worker driving the job); any number
/// of status-query callers may read concurrently. `percentage` never
/// decreases, and `content_address` is present exactly when the stage is
/// `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: Uuid,
    pub percentage: u8,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_address: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    /// Initial record written before the job is enqueued.
    pub fn queued(id: Uuid) -> Self {
        Self {
            id,
            percentage: 0,
            stage: Stage::Queued,
            content_address: None,
            updated_at: Utc::now(),
        }
    }

    /// Advance to a checkpoint. Regressions are clamped so the observed
    /// percentage sequence stays non-decreasing.
    pub fn checkpoint(&mut self, percentage: u8, stage: Stage) {
        self.percentage = self.percentage.max(percentage.min(100));
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    /// Terminal success: percentage 100 and the published address, set once.
    pub fn complete(&mut self, content_address: String) {
        self.percentage = 100;
        self.stage = Stage::Completed;
        self.content_address = Some(content_address);
        self.updated_at = Utc::now();
    }

    /// Terminal failure: the percentage stays at the last good checkpoint.
    pub fn fail(&mut self) {
        self.stage = Stage::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_round_trips_through_text() {
        use std::str::FromStr;

        for stage in [
            Stage::Queued,
            Stage::Converting,
            Stage::Segmenting,
            Stage::Publishing,
            Stage::Completed,
            Stage::Failed,
        ] {
            let text = stage.to_string();
            assert_eq!(Stage::from_str(&text).unwrap(), stage);
        }
        assert_eq!(Stage::Converting.to_string(), "converting");
    }

    #[test]
    fn checkpoint_never_decreases_percentage() {
        let mut record = StatusRecord::queued(Uuid::new_v4());
        record.checkpoint(40, Stage::Segmenting);
        record.checkpoint(5, Stage::Converting);
        assert_eq!(record.percentage, 40);
    }

    #[test]
    fn failure_keeps_last_checkpoint() {
        let mut record = StatusRecord::queued(Uuid::new_v4());
        record.checkpoint(5, Stage::Converting);
        record.fail();
        assert_eq!(record.percentage, 5);
        assert_eq!(record.stage, Stage::Failed);
        assert!(record.content_address.is_none());
    }

    #[test]
    fn content_address_only_on_completion() {
        let mut record = StatusRecord::queued(Uuid::new_v4());
        assert!(record.content_address.is_none());
        record.complete("QmExample".to_string());
        assert_eq!(record.percentage, 100);
        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.content_address.as_deref(), Some("QmExample"));
    }

    #[test]
    fn serializes_without_null_address() {
        let record = StatusRecord::queued(Uuid::new_v4());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("content_address").is_none());
        assert_eq!(json["stage"], "queued");
        assert_eq!(json["percentage"], 0);
    }
}
