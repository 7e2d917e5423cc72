//! Shared error types for the services crate.

use thiserror::Error;

use drill_core::model::{QuestionSetError, QuestionSetId, TestError, TestId};
use drill_core::timer::IntervalConfigError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SessionGenerator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerateError {
    #[error("question set {0} not found")]
    QuestionSetNotFound(QuestionSetId),
    #[error(transparent)]
    Test(#[from] TestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("test {0} not found")]
    NotFound(TestId),
    #[error("test {0} was already submitted")]
    AlreadySubmitted(TestId),
    #[error("position {section}/{question} is outside the test")]
    InvalidPosition { section: usize, question: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the client-side attempt driver and its runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    #[error(transparent)]
    IntervalConfig(#[from] IntervalConfigError),
    #[error("saved position does not exist in the test")]
    InvalidSnapshot,
    #[error("attempt runtime stopped")]
    RuntimeStopped,
}

/// Errors emitted by `ExpressionGenerator`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("no operators configured")]
    NoOperators,
    #[error("operand digits must satisfy 1 <= min <= max <= 9, got {min}..={max}")]
    InvalidDigits { min: u32, max: u32 },
    #[error(transparent)]
    QuestionSet(#[from] QuestionSetError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
