// lib.rs - Library surface for the scene workflow engine

pub mod agents;
pub mod audio;
pub mod config;
pub mod heygen_client;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod pexels_client;
pub mod reconcile;
pub mod render_client;
pub mod result;
pub mod store;
pub mod tools;

// Re-export the types most callers need
pub use agents::{AgentContext, AgentRegistry, SceneAgent};
pub use memory::{AgentMemory, WorkflowStatus};
pub use model::{ModelError, Project, Scene, SceneStatus, Storyboard, VisualPayload, VisualType};
pub use orchestrator::{Orchestrator, OrchestratorError, RunReport, TickOutcome};
pub use reconcile::{ReconcileReport, Reconciler};
pub use result::{AgentResult, AssetUpdate, FailureCode, RenderJobRef};
pub use store::{MemoryWorkflowStore, PgWorkflowStore, StoreError, WorkflowStore};
