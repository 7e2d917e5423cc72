#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod expressions;
pub mod sessions;

pub use drill_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, AttemptError, DriverError, ExpressionError, GenerateError};
pub use expressions::{ExpressionGenerator, ExpressionSpec, Operator};
pub use sessions::{
    AttemptDriver, AttemptGateway, AttemptHandle, AttemptRuntime, AttemptService, AutosaveConfig,
    Command, FinishOutcome, GenerateRequest, RuntimeEvent, SaveAck, SaveProgressRequest,
    SessionGenerator, SubmitRequest, TimerConfig,
};
