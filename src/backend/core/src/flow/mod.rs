//! Flow orchestrator: the four first-class workflow templates and the
//! atomic-submission/cascading-release machinery around them.

pub mod orchestrator;
pub mod templates;

pub use orchestrator::{FlowOrchestrator, FlowSubmission};
pub use templates::{flow_names, build, JobNode};
