// In-memory workflow store. Backs the test suite and hosts that run without
// Postgres; one writer lock over all maps keeps every commit atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::memory::{AgentMemory, WorkflowStatus};
use crate::model::{AssetStatus, Project, Scene, SceneStatus, Storyboard};
use crate::result::AgentResult;
use crate::store::{
    RenderJobHandle, RenderJobOutcome, RenderJobState, StoreError, WorkflowStore,
};

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, Project>,
    memories: HashMap<Uuid, AgentMemory>,
    scenes: HashMap<Uuid, Scene>,
    // Keyed by scene: one open job per scene, a redispatch replaces it.
    render_jobs: HashMap<Uuid, RenderJobHandle>,
}

#[derive(Default)]
pub struct MemoryWorkflowStore {
    inner: RwLock<Inner>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn ingest_storyboard(&self, board: &Storyboard) -> Result<AgentMemory, StoreError> {
        let mut inner = self.inner.write().await;
        let project_id = board.project.id;
        if inner.memories.contains_key(&project_id) {
            return Err(StoreError::AlreadyIngested(project_id));
        }

        let memory = AgentMemory::for_storyboard(board);
        inner.projects.insert(project_id, board.project.clone());
        for scene in &board.scenes {
            inner.scenes.insert(scene.id, scene.clone());
        }
        inner.memories.insert(project_id, memory.clone());
        Ok(memory)
    }

    async fn project_memory(&self, project_id: Uuid) -> Result<AgentMemory, StoreError> {
        let inner = self.inner.read().await;
        inner
            .memories
            .get(&project_id)
            .cloned()
            .ok_or(StoreError::MemoryNotFound(project_id))
    }

    async fn update_workflow_status(
        &self,
        project_id: Uuid,
        status: WorkflowStatus,
        expected_revision: i64,
    ) -> Result<AgentMemory, StoreError> {
        let mut inner = self.inner.write().await;
        let memory = inner
            .memories
            .get_mut(&project_id)
            .ok_or(StoreError::MemoryNotFound(project_id))?;
        if memory.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                project_id,
                expected: expected_revision,
            });
        }
        memory.workflow_status = status;
        memory.last_log = format!("Workflow status set to {status}");
        memory.revision += 1;
        memory.updated_at = Utc::now();
        Ok(memory.clone())
    }

    async fn register_agent_start(
        &self,
        project_id: Uuid,
        agent_name: &str,
        scene_index: u32,
    ) -> Result<AgentMemory, StoreError> {
        let mut inner = self.inner.write().await;
        let memory = inner
            .memories
            .get_mut(&project_id)
            .ok_or(StoreError::MemoryNotFound(project_id))?;
        if memory.workflow_status == WorkflowStatus::Idle {
            memory.workflow_status = WorkflowStatus::Running;
        }
        memory.last_log = format!(
            "Agent {} started scene {} at {}",
            agent_name,
            scene_index,
            Utc::now().to_rfc3339()
        );
        memory.revision += 1;
        memory.updated_at = Utc::now();
        Ok(memory.clone())
    }

    async fn register_agent_done(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
        agent_name: &str,
        result: &AgentResult,
    ) -> Result<AgentMemory, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.memories.contains_key(&project_id) {
            return Err(StoreError::MemoryNotFound(project_id));
        }

        let scene = inner
            .scenes
            .get_mut(&scene_id)
            .ok_or(StoreError::SceneNotFound(scene_id))?;
        scene.status = if result.success {
            SceneStatus::Done
        } else {
            SceneStatus::Failed
        };
        if let Some(update) = result.asset_update() {
            scene.visual = update.payload;
            if let Some(job) = update.job {
                inner.render_jobs.insert(
                    scene_id,
                    RenderJobHandle {
                        scene_id,
                        project_id,
                        provider: job.provider,
                        job_id: job.job_id,
                        state: RenderJobState::Submitted,
                        submitted_at: Utc::now(),
                        resolved_at: None,
                    },
                );
            }
        }

        let memory = inner
            .memories
            .get_mut(&project_id)
            .ok_or(StoreError::MemoryNotFound(project_id))?;
        if result.success {
            memory.completed_count += 1;
        } else {
            memory.failed_count += 1;
        }
        memory.last_log = format!("Agent {}: {}", agent_name, result.log_line());
        memory.revision += 1;
        memory.updated_at = Utc::now();
        Ok(memory.clone())
    }

    async fn next_todo_scene(&self, project_id: Uuid) -> Result<Option<Scene>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .scenes
            .values()
            .filter(|s| s.project_id == project_id && s.status == SceneStatus::Todo)
            .min_by_key(|s| s.index)
            .cloned())
    }

    async fn claim_scene(&self, scene_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let scene = inner
            .scenes
            .get_mut(&scene_id)
            .ok_or(StoreError::SceneNotFound(scene_id))?;
        if scene.status != SceneStatus::Todo {
            return Ok(false);
        }
        scene.status = SceneStatus::InProgress;
        Ok(true)
    }

    async fn requeue_failed_scene(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
    ) -> Result<AgentMemory, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.memories.contains_key(&project_id) {
            return Err(StoreError::MemoryNotFound(project_id));
        }

        let scene = inner
            .scenes
            .get_mut(&scene_id)
            .ok_or(StoreError::SceneNotFound(scene_id))?;
        if scene.status != SceneStatus::Failed {
            return Err(StoreError::UnexpectedSceneStatus {
                scene_id,
                found: scene.status,
            });
        }
        scene.status = SceneStatus::Todo;
        let scene_index = scene.index;

        let memory = inner
            .memories
            .get_mut(&project_id)
            .ok_or(StoreError::MemoryNotFound(project_id))?;
        memory.failed_count = memory.failed_count.saturating_sub(1);
        if memory.workflow_status == WorkflowStatus::Completed {
            memory.workflow_status = WorkflowStatus::Running;
        }
        memory.last_log = format!("Scene {scene_index} requeued for another attempt");
        memory.revision += 1;
        memory.updated_at = Utc::now();
        Ok(memory.clone())
    }

    async fn scene(&self, scene_id: Uuid) -> Result<Scene, StoreError> {
        let inner = self.inner.read().await;
        inner
            .scenes
            .get(&scene_id)
            .cloned()
            .ok_or(StoreError::SceneNotFound(scene_id))
    }

    async fn scenes_for_project(&self, project_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        let inner = self.inner.read().await;
        let mut scenes: Vec<Scene> = inner
            .scenes
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        scenes.sort_by_key(|s| s.index);
        Ok(scenes)
    }

    async fn count_scenes_in_status(
        &self,
        project_id: Uuid,
        status: SceneStatus,
    ) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .scenes
            .values()
            .filter(|s| s.project_id == project_id && s.status == status)
            .count() as u32)
    }

    async fn active_projects(&self) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.inner.read().await;
        let mut ids: Vec<Uuid> = inner
            .memories
            .values()
            .filter(|m| m.workflow_status.allows_dispatch())
            .map(|m| m.project_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn open_render_jobs(&self, limit: u32) -> Result<Vec<RenderJobHandle>, StoreError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<RenderJobHandle> = inner
            .render_jobs
            .values()
            .filter(|j| j.state == RenderJobState::Submitted)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn resolve_render_job(
        &self,
        scene_id: Uuid,
        outcome: RenderJobOutcome,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .render_jobs
            .get_mut(&scene_id)
            .ok_or(StoreError::SceneNotFound(scene_id))?;
        job.state = outcome.state();
        job.resolved_at = Some(Utc::now());
        Ok(())
    }

    async fn update_asset(
        &self,
        scene_id: Uuid,
        asset_status: AssetStatus,
        source_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let scene = inner
            .scenes
            .get_mut(&scene_id)
            .ok_or(StoreError::SceneNotFound(scene_id))?;
        scene.visual.set_asset_status(asset_status);
        if let Some(url) = source_url {
            scene.visual.set_source_url(Some(url.to_string()));
        }
        Ok(())
    }
}
