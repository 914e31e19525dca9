//! Learning services.
//!
//! [`base::Lifecycle`] carries the shared scenario lifecycle; each mode adds
//! its own programs, scoring, and extras. [`registry::ServiceRegistry`]
//! hands out services by mode.

pub mod assessment;
pub mod base;
pub mod discovery;
pub mod pbl;
pub mod registry;

pub use assessment::{
    AnswerOutcome, AssessmentAttempt, AssessmentHistory, AssessmentReport, AssessmentResult,
    AssessmentService, AttemptOptions, ProficiencyLevel,
};
pub use base::{LearningContext, Lifecycle, ModeHooks, ProgramPlan, TaskPlan};
pub use discovery::{DiscoveryService, ExplorationSummary};
pub use pbl::{LearningProgress, PblService};
pub use registry::{LearningService, ServiceKey, ServiceRegistry};
