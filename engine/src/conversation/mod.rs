//! Conversation services
//!
//! - [`orchestrator`]: one turn of a live session, plus the opening greeting
//! - [`finalizer`]: summary, planner tasks and profile refresh at session end
//! - [`planner_gen`] / [`profile`]: prompts and reply validation for the
//!   two JSON-mode calls the finalizer makes
//! - [`prompt`]: pure rendering of records into prompt text

pub mod finalizer;
pub mod orchestrator;
pub mod planner_gen;
pub mod profile;
pub mod prompt;

pub use finalizer::{FailureReason, FinalizeReport, FinalizeStage, FinalizeStep, SessionFinalizer};
pub use orchestrator::{SessionOrchestrator, TurnInput, TurnOutput};
