use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GradingError;
use crate::status::SolutionStatus;

/// Entity family a solution belongs to.
///
/// The external grader is shared between several solution-bearing entity
/// types; every request and callback carries the kind so a tracking handle
/// can be resolved back to the right table. Each kind also gets its own
/// dispatch/poll queue, so workers can be scaled per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionKind {
    Education,
    Competition,
}

impl SolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionKind::Education => "education",
            SolutionKind::Competition => "competition",
        }
    }
}

impl std::fmt::Display for SolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SolutionKind {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "education" => Ok(SolutionKind::Education),
            "competition" => Ok(SolutionKind::Competition),
            other => Err(GradingError::Validation(format!(
                "unknown solution kind: {}",
                other
            ))),
        }
    }
}

/// Uploaded binary submission, base64-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    pub content_b64: String,
}

/// What the learner actually handed in.
///
/// Exactly one variant per solution, enforced by construction. The three
/// optional fields arriving at the submission boundary go through
/// [`SolutionPayload::from_parts`], which rejects zero or multiple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionPayload {
    Code(String),
    File(FilePayload),
    Url(String),
}

impl SolutionPayload {
    /// Build a payload from the three mutually exclusive submission fields.
    pub fn from_parts(
        code: Option<String>,
        file: Option<FilePayload>,
        url: Option<String>,
    ) -> Result<Self, GradingError> {
        match (code, file, url) {
            (Some(code), None, None) => Ok(SolutionPayload::Code(code)),
            (None, Some(file), None) => Ok(SolutionPayload::File(file)),
            (None, None, Some(url)) => Ok(SolutionPayload::Url(url)),
            (None, None, None) => Err(GradingError::Validation(
                "one of code, file or url is required".to_string(),
            )),
            _ => Err(GradingError::Validation(
                "code, file and url are mutually exclusive".to_string(),
            )),
        }
    }
}

/// Persisted unit of work: one submission by one learner against one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub id: Uuid,
    pub student_id: Uuid,
    pub task_id: Uuid,
    pub kind: SolutionKind,
    pub payload: SolutionPayload,
    pub status: SolutionStatus,
    /// Tracking handle returned by the grader for asynchronous grading.
    pub check_status_location: Option<String>,
    pub test_output: Option<String>,
    pub return_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Solution {
    /// New gradable solution, awaiting dispatch.
    pub fn gradable(
        student_id: Uuid,
        task_id: Uuid,
        kind: SolutionKind,
        payload: SolutionPayload,
    ) -> Self {
        Self::new(student_id, task_id, kind, payload, SolutionStatus::Pending)
    }

    /// New non-gradable solution; terminal immediately, never dispatched.
    pub fn without_grading(
        student_id: Uuid,
        task_id: Uuid,
        kind: SolutionKind,
        payload: SolutionPayload,
    ) -> Self {
        Self::new(
            student_id,
            task_id,
            kind,
            payload,
            SolutionStatus::SubmittedWithoutGrading,
        )
    }

    fn new(
        student_id: Uuid,
        task_id: Uuid,
        kind: SolutionKind,
        payload: SolutionPayload,
        status: SolutionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student_id,
            task_id,
            kind,
            payload,
            status,
            check_status_location: None,
            test_output: None,
            return_code: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Envelope sent to the external grading backend. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRequest {
    pub solution_id: Uuid,
    pub solution_kind: SolutionKind,
    pub payload: SolutionPayload,
}

/// Normalized grader verdict for a single request or poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingOutcome {
    Ok,
    NotOk,
    Running,
}

/// Normalized grader response. Either a synchronous verdict (`ok`/`not_ok`
/// with output and return code) or an asynchronous acknowledgement
/// (`running` plus a tracking handle for later polling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    pub outcome: GradingOutcome,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub return_code: Option<i32>,
    #[serde(default)]
    pub tracking_handle: Option<String>,
}

/// Queued unit of work for the dispatch queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTask {
    pub solution_id: Uuid,
    pub kind: SolutionKind,
}

/// Queued unit of work for the poll queue. `polls` counts attempts made
/// so far; the poll loop gives up after the configured bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollTask {
    pub solution_id: Uuid,
    pub kind: SolutionKind,
    pub tracking_handle: String,
    pub polls: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FilePayload {
        FilePayload {
            name: "solution.jar".to_string(),
            content_b64: "aGVsbG8=".to_string(),
        }
    }

    #[test]
    fn test_payload_exactly_one_field() {
        let payload =
            SolutionPayload::from_parts(Some("print(1)".to_string()), None, None).unwrap();
        assert_eq!(payload, SolutionPayload::Code("print(1)".to_string()));

        let payload = SolutionPayload::from_parts(None, Some(file()), None).unwrap();
        assert!(matches!(payload, SolutionPayload::File(_)));

        let payload =
            SolutionPayload::from_parts(None, None, Some("http://example.com".to_string()))
                .unwrap();
        assert_eq!(
            payload,
            SolutionPayload::Url("http://example.com".to_string())
        );
    }

    #[test]
    fn test_payload_none_set_rejected() {
        let err = SolutionPayload::from_parts(None, None, None).unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));
    }

    #[test]
    fn test_payload_multiple_set_rejected() {
        let err = SolutionPayload::from_parts(
            Some("print(1)".to_string()),
            None,
            Some("http://example.com".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let err = SolutionPayload::from_parts(Some("print(1)".to_string()), Some(file()), None)
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));
    }

    #[test]
    fn test_gradable_solution_starts_pending() {
        let solution = Solution::gradable(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SolutionKind::Education,
            SolutionPayload::Code("print(1)".to_string()),
        );
        assert_eq!(solution.status, SolutionStatus::Pending);
        assert!(solution.check_status_location.is_none());
        assert!(solution.test_output.is_none());
    }

    #[test]
    fn test_non_gradable_solution_is_terminal_at_birth() {
        let solution = Solution::without_grading(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SolutionKind::Education,
            SolutionPayload::Url("http://example.com".to_string()),
        );
        assert_eq!(solution.status, SolutionStatus::SubmittedWithoutGrading);
        assert!(solution.status.is_terminal());
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [SolutionKind::Education, SolutionKind::Competition] {
            let parsed: SolutionKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("interview".parse::<SolutionKind>().is_err());
    }
}
