mod driver;
mod generator;
mod progress;
mod requests;
mod runtime;
mod workflow;

// Public API of the attempt subsystem.
pub use crate::error::{AttemptError, DriverError, GenerateError};
pub use driver::{AttemptDriver, FinishOutcome, TimerConfig};
pub use generator::{MENTAL_MATH_SECTION, SessionGenerator, build_test};
pub use progress::AttemptProgress;
pub use requests::{GenerateRequest, SaveAck, SaveProgressRequest, SubmitRequest};
pub use runtime::{AttemptHandle, AttemptRuntime, AutosaveConfig, Command, RuntimeEvent};
pub use workflow::{AttemptGateway, AttemptService, response_records};
