mod ids;
mod question_set;
mod response;
mod result;

pub use ids::{ParseIdError, QuestionId, QuestionSetId, SectionId, SessionId, TestId};
pub use question_set::{QuestionItem, QuestionSet, QuestionSetError};
pub use response::{
    Response, Responses, Totals, is_correct_answer, parse_answer, sanitize_answer,
};
pub use result::{IntervalStats, SectionResult, TestResult, intervals_tile, reconcile_intervals};
pub use test::{Mode, Question, Section, TEST_TIME_LIMIT_SECS, Test, TestError, TestStatus};
