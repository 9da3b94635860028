pub mod attempt;
pub mod registration;
pub mod verification;

pub use attempt::{AttemptCounter, AttemptId};
pub use registration::RegistrationWorkflow;
pub use verification::VerificationWorkflow;
