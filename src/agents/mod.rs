// src/agents/mod.rs
// Scene agents: one capability per visual type, looked up through the
// registry at dispatch time. Agents never touch the workflow store; they
// report everything through AgentResult and the orchestrator commits it.

pub mod a_roll;
pub mod b_roll;
pub mod graphics;
pub mod image;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::memory::AgentMemory;
use crate::model::{Scene, VisualType};
use crate::result::AgentResult;

/// Read-only snapshot handed to an agent for one dispatch. Taken after the
/// agent start is registered, so the memory reflects the claim.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub memory: AgentMemory,
}

impl AgentContext {
    pub fn new(memory: AgentMemory) -> Self {
        Self { memory }
    }

    /// Reference to the project's master voiceover track, when ingestion
    /// provided one under the well-known `voiceover_ref` metadata key.
    pub fn voiceover_ref(&self) -> Option<&str> {
        self.memory.metadata.as_ref()?.get("voiceover_ref")?.as_str()
    }
}

/// The capability contract for producing one scene's asset. Failures are
/// reported inside the returned `AgentResult`, never as a panic or an outer
/// error.
#[async_trait]
pub trait SceneAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Human-readable description of what this agent produces.
    fn role(&self) -> &str;

    fn visual_type(&self) -> VisualType;

    async fn process(&self, scene: Scene, ctx: AgentContext) -> AgentResult;
}

/// Maps visual types to agents. Populated at startup and read-only
/// afterwards; supporting a new visual type means registering another
/// implementation here, not editing a dispatch branch somewhere.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<VisualType, Arc<dyn SceneAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under its own visual type. A second registration
    /// for the same type replaces the first.
    pub fn register(&mut self, agent: Arc<dyn SceneAgent>) {
        self.agents.insert(agent.visual_type(), agent);
    }

    pub fn agent_for(&self, visual_type: VisualType) -> Option<Arc<dyn SceneAgent>> {
        self.agents.get(&visual_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<VisualType> {
        let mut types: Vec<VisualType> = self.agents.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
