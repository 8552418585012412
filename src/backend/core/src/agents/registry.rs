//! Uniform agent invocation contract and the process-wide registry the job
//! worker dispatches into.
//!
//! The twelve concrete SEO agents (content writer, SERP tracker, backlink
//! auditor, and so on) are out of scope here; what this module fixes is the
//! *shape* every agent must present so the worker can stay generic: a single
//! `run(input, ctx)` entry point and a depth-bounded way to call sub-agents.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{AiseoError, Result};
use crate::events::EventPublisher;

/// Maximum recursion depth for sub-agent invocation (spec §4.2/§9).
pub const MAX_SUBAGENT_DEPTH: u32 = 3;

/// Everything an agent needs to do its job without reaching for globals.
#[derive(Clone)]
pub struct AgentRunContext {
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub agent_id: String,
    pub workspace_path: PathBuf,
    pub tools: Arc<HashMap<String, Value>>,
    pub event_bus: Arc<dyn EventPublisher>,
    pub subagents: SubagentExecutor,
    pub depth: u32,
}

/// The contract every registered agent implements.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, input: Value, ctx: &AgentRunContext) -> Result<Value>;
}

/// Process-wide map from agent name to its runner, shared by every worker
/// task.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, Arc<dyn AgentRunner>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent: Arc<dyn AgentRunner>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentRunner>> {
        self.agents.get(name).map(|entry| entry.clone())
    }

    /// Invoke `agent_name` at the given context's depth, refusing once the
    /// recursion bound is exceeded.
    pub async fn invoke(&self, agent_name: &str, input: Value, ctx: &AgentRunContext) -> Result<Value> {
        if ctx.depth >= MAX_SUBAGENT_DEPTH {
            return Err(AiseoError::subagent_depth_exceeded(ctx.depth, MAX_SUBAGENT_DEPTH));
        }

        let agent = self
            .get(agent_name)
            .ok_or_else(|| AiseoError::agent_not_found(agent_name))?;

        agent.run(input, ctx).await
    }
}

/// Handed to an agent so it can call sub-agents without holding a reference
/// to the whole registry or being able to forge a deeper/shallower depth
/// than its own.
#[derive(Clone)]
pub struct SubagentExecutor {
    registry: AgentRegistry,
    depth: u32,
}

impl SubagentExecutor {
    pub fn new(registry: AgentRegistry, depth: u32) -> Self {
        Self { registry, depth }
    }

    /// Invoke a sub-agent one level deeper than the caller.
    pub async fn invoke(&self, agent_name: &str, input: Value, ctx: &AgentRunContext) -> Result<Value> {
        if self.depth + 1 >= MAX_SUBAGENT_DEPTH {
            return Err(AiseoError::subagent_depth_exceeded(self.depth + 1, MAX_SUBAGENT_DEPTH));
        }
        let child_ctx = AgentRunContext {
            depth: self.depth + 1,
            subagents: SubagentExecutor::new(self.registry.clone(), self.depth + 1),
            ..ctx.clone()
        };
        self.registry.invoke(agent_name, input, &child_ctx).await
    }
}

impl Clone for AgentRunContext {
    fn clone(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            project_id: self.project_id.clone(),
            agent_id: self.agent_id.clone(),
            workspace_path: self.workspace_path.clone(),
            tools: self.tools.clone(),
            event_bus: self.event_bus.clone(),
            subagents: self.subagents.clone(),
            depth: self.depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent;

    #[async_trait]
    impl AgentRunner for EchoAgent {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run(&self, input: Value, _ctx: &AgentRunContext) -> Result<Value> {
            Ok(input)
        }
    }

    fn test_ctx(registry: AgentRegistry, depth: u32) -> AgentRunContext {
        AgentRunContext {
            tenant_id: "acme".to_string(),
            project_id: None,
            agent_id: "echo".to_string(),
            workspace_path: PathBuf::from("/tmp"),
            tools: Arc::new(HashMap::new()),
            event_bus: Arc::new(crate::events::RecordingEventPublisher::new()),
            subagents: SubagentExecutor::new(registry, depth),
            depth,
        }
    }

    #[tokio::test]
    async fn registered_agent_is_invocable() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent));
        let ctx = test_ctx(registry.clone(), 0);

        let out = registry
            .invoke("echo", serde_json::json!({"hi": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"hi": true}));
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected() {
        let registry = AgentRegistry::new();
        let ctx = test_ctx(registry.clone(), 0);
        let err = registry.invoke("missing", Value::Null, &ctx).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AgentNotFound);
    }

    #[tokio::test]
    async fn depth_at_maximum_is_rejected() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent));
        let ctx = test_ctx(registry.clone(), MAX_SUBAGENT_DEPTH);
        let err = registry.invoke("echo", Value::Null, &ctx).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SubagentDepthExceeded);
    }
}
