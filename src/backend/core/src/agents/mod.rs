//! Agent execution contract and registry.
//!
//! The twelve concrete SEO agents (research, content writing, etc.) are out
//! of scope here; this module only defines the uniform interface the job
//! worker invokes them through (`AgentRunner`), the registry that resolves an
//! agent name to an implementation, and the subagent depth guard.

pub mod registry;
pub use registry::{AgentRegistry, AgentRunContext, AgentRunner, SubagentExecutor, MAX_SUBAGENT_DEPTH};
