// The workflow store: persistence seam for memory, scenes, and render jobs.
//
// Concurrency contract (what keeps single-writer-per-project true):
// - `claim_scene` is an atomic todo -> in_progress compare-and-swap; it is
//   the at-most-once dispatch gate. Two ticks racing for the same scene
//   serialize here, never at the provider.
// - `update_workflow_status` compares-and-swaps on the memory `revision`;
//   a stale revision returns `RevisionConflict` and mutates nothing.
// - `register_agent_done` and `requeue_failed_scene` mutate scene and memory
//   rows in one transaction, so counters and scene statuses cannot drift
//   apart.

pub mod memory;
pub mod postgres;

pub use memory::MemoryWorkflowStore;
pub use postgres::PgWorkflowStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::memory::{AgentMemory, WorkflowStatus};
use crate::model::{AssetStatus, Scene, SceneStatus, Storyboard};
use crate::result::AgentResult;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no workflow memory for project {0}")]
    MemoryNotFound(Uuid),
    #[error("scene {0} not found")]
    SceneNotFound(Uuid),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("project {0} already has an ingested storyboard")]
    AlreadyIngested(Uuid),
    #[error("stale revision {expected} for project {project_id}")]
    RevisionConflict { project_id: Uuid, expected: i64 },
    #[error("scene {scene_id} is {found}, cannot requeue")]
    UnexpectedSceneStatus { scene_id: Uuid, found: SceneStatus },
    #[error("unrecognized status value '{0}' in store")]
    InvalidStatus(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderJobState {
    Submitted,
    Succeeded,
    Failed,
}

impl RenderJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderJobState::Submitted => "submitted",
            RenderJobState::Succeeded => "succeeded",
            RenderJobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(RenderJobState::Submitted),
            "succeeded" => Some(RenderJobState::Succeeded),
            "failed" => Some(RenderJobState::Failed),
            _ => None,
        }
    }
}

/// Terminal outcome applied to a render-job handle by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderJobOutcome {
    Succeeded,
    Failed,
}

impl RenderJobOutcome {
    pub fn state(&self) -> RenderJobState {
        match self {
            RenderJobOutcome::Succeeded => RenderJobState::Succeeded,
            RenderJobOutcome::Failed => RenderJobState::Failed,
        }
    }
}

/// A fire-and-forget provider job awaiting reconciliation. One per scene:
/// a scene submits at most one render job per dispatch, and a redispatch
/// replaces the handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJobHandle {
    pub scene_id: Uuid,
    pub project_id: Uuid,
    pub provider: String,
    pub job_id: String,
    pub state: RenderJobState,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Commit a validated storyboard atomically: the project, every scene in
    /// `todo`, and exactly one zero-counter `idle` memory row. A second
    /// ingest for the same project fails with [`StoreError::AlreadyIngested`].
    async fn ingest_storyboard(&self, board: &Storyboard) -> Result<AgentMemory, StoreError>;

    async fn project_memory(&self, project_id: Uuid) -> Result<AgentMemory, StoreError>;

    /// Compare-and-swap the workflow status on `expected_revision`.
    async fn update_workflow_status(
        &self,
        project_id: Uuid,
        status: WorkflowStatus,
        expected_revision: i64,
    ) -> Result<AgentMemory, StoreError>;

    /// Record "agent started" (name + scene index + timestamp) in the
    /// workflow log and flip `idle` to `running`. Runs before the agent is
    /// awaited so a crash mid-call leaves durable evidence of the dispatch.
    async fn register_agent_start(
        &self,
        project_id: Uuid,
        agent_name: &str,
        scene_index: u32,
    ) -> Result<AgentMemory, StoreError>;

    /// The single commit point for a dispatch, in one transaction: scene to
    /// `done`/`failed` from `result.success`, exactly one counter increment,
    /// `last_log` from `result.log_line()`, and any [`AssetUpdate`] carried
    /// in `result.data` (payload refresh plus render-job handle).
    ///
    /// [`AssetUpdate`]: crate::result::AssetUpdate
    async fn register_agent_done(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
        agent_name: &str,
        result: &AgentResult,
    ) -> Result<AgentMemory, StoreError>;

    /// Lowest-index scene still in `todo`, if any.
    async fn next_todo_scene(&self, project_id: Uuid) -> Result<Option<Scene>, StoreError>;

    /// Atomic todo -> in_progress transition. Returns `false` when the scene
    /// was no longer `todo`, i.e. another tick already claimed it.
    async fn claim_scene(&self, scene_id: Uuid) -> Result<bool, StoreError>;

    /// Retry policy support: move a `failed` scene back to `todo`, decrement
    /// `failed_count`, and reopen a `completed` workflow, atomically.
    async fn requeue_failed_scene(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
    ) -> Result<AgentMemory, StoreError>;

    async fn scene(&self, scene_id: Uuid) -> Result<Scene, StoreError>;

    /// All scenes of a project, ordered by `index`.
    async fn scenes_for_project(&self, project_id: Uuid) -> Result<Vec<Scene>, StoreError>;

    async fn count_scenes_in_status(
        &self,
        project_id: Uuid,
        status: SceneStatus,
    ) -> Result<u32, StoreError>;

    /// Projects whose workflow still permits dispatch (`idle` or `running`).
    async fn active_projects(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Unresolved render-job handles, oldest first.
    async fn open_render_jobs(&self, limit: u32) -> Result<Vec<RenderJobHandle>, StoreError>;

    async fn resolve_render_job(
        &self,
        scene_id: Uuid,
        outcome: RenderJobOutcome,
    ) -> Result<(), StoreError>;

    /// Reconciler write path: promote the asset status and record the
    /// produced source URL on the scene's payload.
    async fn update_asset(
        &self,
        scene_id: Uuid,
        asset_status: AssetStatus,
        source_url: Option<&str>,
    ) -> Result<(), StoreError>;
}
