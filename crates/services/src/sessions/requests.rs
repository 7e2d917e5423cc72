//! Wire-shaped request and acknowledgement types shared by the HTTP layer
//! and the client driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drill_core::model::{IntervalStats, Mode, QuestionSetId, Responses, TestId};
use drill_core::navigation::Position;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub mode: Mode,
    #[serde(alias = "practiceSheetId")]
    pub question_set_id: QuestionSetId,
    /// Anonymous attempts are allowed but never show up in history.
    #[serde(default, alias = "candidateName")]
    pub candidate: Option<String>,
}

/// Autosave payload: the latest `{responses, position}` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    pub test_id: TestId,
    #[serde(default)]
    pub responses: Responses,
    pub current_section_index: usize,
    pub current_question_index: usize,
}

impl SaveProgressRequest {
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.current_section_index, self.current_question_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    pub success: bool,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub test_id: TestId,
    #[serde(default)]
    pub responses: Responses,
    pub time_taken: u32,
    #[serde(default)]
    pub intervals: Option<Vec<IntervalStats>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_accepts_sheet_aliases() {
        let req: GenerateRequest = serde_json::from_str(
            r#"{"mode":"test","practiceSheetId":3,"candidateName":"ana"}"#,
        )
        .unwrap();
        assert_eq!(req.mode, Mode::Test);
        assert_eq!(req.question_set_id, QuestionSetId::new(3));
        assert_eq!(req.candidate.as_deref(), Some("ana"));

        let anonymous: GenerateRequest =
            serde_json::from_str(r#"{"mode":"practice","questionSetId":1}"#).unwrap();
        assert_eq!(anonymous.candidate, None);
    }

    #[test]
    fn submit_request_intervals_are_optional() {
        let id = TestId::generate();
        let body = format!(r#"{{"testId":"{id}","timeTaken":12}}"#);
        let req: SubmitRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(req.test_id, id);
        assert!(req.responses.is_empty());
        assert_eq!(req.intervals, None);
    }
}
