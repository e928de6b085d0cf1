//! Push notification types and parser.
//!
//! The backend pushes JSON messages with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`PushEvent`] enum at the boundary where push
//! data enters the system; everything past this point works with the
//! closed union.

use atelier_core::{JobId, Progress, Timestamp};
use serde::{Deserialize, Serialize};

/// All known push notification types.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content. Every variant carries the correlation
/// `job_id` and a timestamp that is monotonic per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PushEvent {
    /// The backend confirmed the job is executing.
    #[serde(rename = "job_running")]
    JobRunning(JobRunningData),

    /// Progress update during job execution.
    #[serde(rename = "job_progress")]
    JobProgress(JobProgressData),

    /// Job completed successfully.
    #[serde(rename = "job_completed")]
    JobCompleted(JobCompletedData),

    /// Job failed with an error.
    #[serde(rename = "job_failed")]
    JobFailed(JobFailedData),

    /// Job was cancelled (by user or system).
    #[serde(rename = "job_cancelled")]
    JobCancelled(JobCancelledData),
}

/// Payload for `job_running` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunningData {
    pub job_id: JobId,
    pub timestamp: Timestamp,
}

/// Payload for `job_progress` messages (unit-level progress).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressData {
    pub job_id: JobId,
    /// Units finished so far.
    pub completed: u32,
    /// Total units, when the backend knows it.
    #[serde(default)]
    pub total: Option<u32>,
    pub timestamp: Timestamp,
}

/// Payload for `job_completed` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletedData {
    pub job_id: JobId,
    /// Kind-specific result data (generated assets, chat reply, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

/// Payload for `job_failed` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailedData {
    pub job_id: JobId,
    /// Backend error message, surfaced to the user verbatim.
    pub error: String,
    pub timestamp: Timestamp,
}

/// Payload for `job_cancelled` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCancelledData {
    pub job_id: JobId,
    pub timestamp: Timestamp,
}

impl PushEvent {
    /// The correlation id carried by every variant.
    pub fn job_id(&self) -> JobId {
        match self {
            PushEvent::JobRunning(d) => d.job_id,
            PushEvent::JobProgress(d) => d.job_id,
            PushEvent::JobCompleted(d) => d.job_id,
            PushEvent::JobFailed(d) => d.job_id,
            PushEvent::JobCancelled(d) => d.job_id,
        }
    }

    /// The per-job monotonic timestamp carried by every variant.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            PushEvent::JobRunning(d) => d.timestamp,
            PushEvent::JobProgress(d) => d.timestamp,
            PushEvent::JobCompleted(d) => d.timestamp,
            PushEvent::JobFailed(d) => d.timestamp,
            PushEvent::JobCancelled(d) => d.timestamp,
        }
    }

    /// Reported progress, for variants that carry it.
    pub fn progress(&self) -> Option<Progress> {
        match self {
            PushEvent::JobProgress(d) => Some(Progress {
                completed: d.completed,
                total: d.total,
            }),
            _ => None,
        }
    }

    /// The discriminant used for bus subscription routing.
    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::JobRunning(_) => EventKind::JobRunning,
            PushEvent::JobProgress(_) => EventKind::JobProgress,
            PushEvent::JobCompleted(_) => EventKind::JobCompleted,
            PushEvent::JobFailed(_) => EventKind::JobFailed,
            PushEvent::JobCancelled(_) => EventKind::JobCancelled,
        }
    }
}

/// Payload-free discriminant of [`PushEvent`], used as the subscription
/// key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobRunning,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl EventKind {
    /// Every kind, in a stable order.
    pub const ALL: [EventKind; 5] = [
        EventKind::JobRunning,
        EventKind::JobProgress,
        EventKind::JobCompleted,
        EventKind::JobFailed,
        EventKind::JobCancelled,
    ];
}

/// Parse a raw push payload into a typed event.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown types and continue; a missed push is recovered by
/// the hydration poll.
pub fn parse_push(text: &str) -> Result<PushEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ts() -> &'static str {
        "2026-08-25T12:00:00Z"
    }

    #[test]
    fn parse_job_running() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_running","data":{{"job_id":"{id}","timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        assert_matches!(&event, PushEvent::JobRunning(d) if d.job_id == id);
        assert_eq!(event.job_id(), id);
    }

    #[test]
    fn parse_job_progress() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_progress","data":{{"job_id":"{id}","completed":2,"total":3,"timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        let progress = event.progress().unwrap();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.total, Some(3));
    }

    #[test]
    fn parse_job_progress_without_total() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_progress","data":{{"job_id":"{id}","completed":1,"timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        assert_eq!(event.progress().unwrap().total, None);
    }

    #[test]
    fn parse_job_completed_with_payload() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_completed","data":{{"job_id":"{id}","payload":{{"images":["a.png"]}},"timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        assert_matches!(&event, PushEvent::JobCompleted(d) if d.payload["images"][0] == "a.png");
        assert_eq!(event.kind(), EventKind::JobCompleted);
    }

    #[test]
    fn parse_job_failed() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_failed","data":{{"job_id":"{id}","error":"out of credits","timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        assert_matches!(&event, PushEvent::JobFailed(d) if d.error == "out of credits");
    }

    #[test]
    fn parse_job_cancelled() {
        let id = uuid::Uuid::new_v4();
        let json = format!(
            r#"{{"type":"job_cancelled","data":{{"job_id":"{id}","timestamp":"{}"}}}}"#,
            ts()
        );
        let event = parse_push(&json).unwrap();
        assert_eq!(event.kind(), EventKind::JobCancelled);
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        let json = r#"{"type":"job_levitated","data":{}}"#;
        assert!(parse_push(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_push("not json at all").is_err());
    }

    #[test]
    fn parse_missing_correlation_id_returns_error() {
        let json = format!(
            r#"{{"type":"job_running","data":{{"timestamp":"{}"}}}}"#,
            ts()
        );
        assert!(parse_push(&json).is_err());
    }
}
