// Postgres workflow store. Schema is created at startup; all queries are
// runtime-bound so no live database is needed at build time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::memory::{AgentMemory, WorkflowStatus};
use crate::model::{AssetStatus, Scene, SceneStatus, Storyboard, Transition, VisualPayload};
use crate::result::AgentResult;
use crate::store::{
    RenderJobHandle, RenderJobOutcome, RenderJobState, StoreError, WorkflowStore,
};

const MEMORY_COLUMNS: &str = "project_id, project_name, workflow_status, total_scenes, \
     completed_count, failed_count, last_log, metadata, revision, updated_at";

const SCENE_COLUMNS: &str =
    "id, project_id, scene_index, start_time, end_time, script, visual, transition, status";

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables and indexes if they don't exist yet.
    pub async fn setup(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                total_duration DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scenes (
                id UUID PRIMARY KEY,
                project_id UUID NOT NULL REFERENCES projects(id),
                scene_index INTEGER NOT NULL,
                start_time DOUBLE PRECISION NOT NULL,
                end_time DOUBLE PRECISION NOT NULL,
                script TEXT NOT NULL,
                visual JSONB NOT NULL,
                transition JSONB NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'todo',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (project_id, scene_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_memory (
                project_id UUID PRIMARY KEY REFERENCES projects(id),
                project_name TEXT NOT NULL,
                workflow_status VARCHAR(16) NOT NULL DEFAULT 'idle',
                total_scenes INTEGER NOT NULL,
                completed_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                last_log TEXT NOT NULL DEFAULT '',
                metadata JSONB,
                revision BIGINT NOT NULL DEFAULT 1,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS render_jobs (
                scene_id UUID PRIMARY KEY REFERENCES scenes(id),
                project_id UUID NOT NULL,
                provider VARCHAR(64) NOT NULL,
                job_id TEXT NOT NULL,
                state VARCHAR(16) NOT NULL DEFAULT 'submitted',
                submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                resolved_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes created separately
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_scenes_project_status
            ON scenes(project_id, status, scene_index)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_agent_memory_status
            ON agent_memory(workflow_status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_render_jobs_state
            ON render_jobs(state, submitted_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Workflow store schema setup complete");
        Ok(())
    }

    async fn memory_exists(&self, project_id: Uuid) -> Result<bool, StoreError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM agent_memory WHERE project_id = $1")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn ingest_storyboard(&self, board: &Storyboard) -> Result<AgentMemory, StoreError> {
        let project_id = board.project.id;
        let mut tx = self.pool.begin().await?;

        let existing: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM agent_memory WHERE project_id = $1")
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::AlreadyIngested(project_id));
        }

        sqlx::query("INSERT INTO projects (id, title, total_duration) VALUES ($1, $2, $3)")
            .bind(project_id)
            .bind(&board.project.title)
            .bind(board.project.total_duration)
            .execute(&mut *tx)
            .await?;

        for scene in &board.scenes {
            sqlx::query(
                r#"
                INSERT INTO scenes
                (id, project_id, scene_index, start_time, end_time, script, visual, transition, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(scene.id)
            .bind(project_id)
            .bind(scene.index as i32)
            .bind(scene.start_time)
            .bind(scene.end_time)
            .bind(&scene.script)
            .bind(serde_json::to_value(&scene.visual)?)
            .bind(serde_json::to_value(&scene.transition)?)
            .bind(scene.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let memory = AgentMemory::for_storyboard(board);
        sqlx::query(
            r#"
            INSERT INTO agent_memory
            (project_id, project_name, workflow_status, total_scenes, completed_count,
             failed_count, last_log, metadata, revision, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(memory.project_id)
        .bind(&memory.project_name)
        .bind(memory.workflow_status.as_str())
        .bind(memory.total_scenes as i32)
        .bind(memory.completed_count as i32)
        .bind(memory.failed_count as i32)
        .bind(&memory.last_log)
        .bind(memory.metadata.clone())
        .bind(memory.revision)
        .bind(memory.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "💾 Ingested storyboard for '{}' ({} scenes)",
            memory.project_name, memory.total_scenes
        );
        Ok(memory)
    }

    async fn project_memory(&self, project_id: Uuid) -> Result<AgentMemory, StoreError> {
        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            "SELECT {MEMORY_COLUMNS} FROM agent_memory WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::MemoryNotFound(project_id))?.into_memory()
    }

    async fn update_workflow_status(
        &self,
        project_id: Uuid,
        status: WorkflowStatus,
        expected_revision: i64,
    ) -> Result<AgentMemory, StoreError> {
        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"
            UPDATE agent_memory
            SET workflow_status = $2, last_log = $3, revision = revision + 1, updated_at = NOW()
            WHERE project_id = $1 AND revision = $4
            RETURNING {MEMORY_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(status.as_str())
        .bind(format!("Workflow status set to {status}"))
        .bind(expected_revision)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_memory(),
            None => {
                if self.memory_exists(project_id).await? {
                    Err(StoreError::RevisionConflict {
                        project_id,
                        expected: expected_revision,
                    })
                } else {
                    Err(StoreError::MemoryNotFound(project_id))
                }
            }
        }
    }

    async fn register_agent_start(
        &self,
        project_id: Uuid,
        agent_name: &str,
        scene_index: u32,
    ) -> Result<AgentMemory, StoreError> {
        let log_line = format!(
            "Agent {} started scene {} at {}",
            agent_name,
            scene_index,
            Utc::now().to_rfc3339()
        );
        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"
            UPDATE agent_memory
            SET workflow_status = CASE WHEN workflow_status = 'idle' THEN 'running'
                                       ELSE workflow_status END,
                last_log = $2,
                revision = revision + 1,
                updated_at = NOW()
            WHERE project_id = $1
            RETURNING {MEMORY_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(log_line)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::MemoryNotFound(project_id))?.into_memory()
    }

    async fn register_agent_done(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
        agent_name: &str,
        result: &AgentResult,
    ) -> Result<AgentMemory, StoreError> {
        let scene_status = if result.success {
            SceneStatus::Done
        } else {
            SceneStatus::Failed
        };

        let mut tx = self.pool.begin().await?;

        let affected = if let Some(update) = result.asset_update() {
            let affected = sqlx::query(
                "UPDATE scenes SET status = $2, visual = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(scene_id)
            .bind(scene_status.as_str())
            .bind(serde_json::to_value(&update.payload)?)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if let Some(job) = update.job {
                sqlx::query(
                    r#"
                    INSERT INTO render_jobs (scene_id, project_id, provider, job_id, state, submitted_at)
                    VALUES ($1, $2, $3, $4, 'submitted', NOW())
                    ON CONFLICT (scene_id) DO UPDATE
                    SET provider = EXCLUDED.provider,
                        job_id = EXCLUDED.job_id,
                        state = 'submitted',
                        submitted_at = NOW(),
                        resolved_at = NULL
                    "#,
                )
                .bind(scene_id)
                .bind(project_id)
                .bind(&job.provider)
                .bind(&job.job_id)
                .execute(&mut *tx)
                .await?;
            }
            affected
        } else {
            sqlx::query("UPDATE scenes SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(scene_id)
                .bind(scene_status.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected()
        };
        if affected == 0 {
            return Err(StoreError::SceneNotFound(scene_id));
        }

        let (done, failed) = if result.success { (1i32, 0i32) } else { (0i32, 1i32) };
        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"
            UPDATE agent_memory
            SET completed_count = completed_count + $2,
                failed_count = failed_count + $3,
                last_log = $4,
                revision = revision + 1,
                updated_at = NOW()
            WHERE project_id = $1
            RETURNING {MEMORY_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(done)
        .bind(failed)
        .bind(format!("Agent {}: {}", agent_name, result.log_line()))
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or(StoreError::MemoryNotFound(project_id))?;
        tx.commit().await?;
        row.into_memory()
    }

    async fn next_todo_scene(&self, project_id: Uuid) -> Result<Option<Scene>, StoreError> {
        let row = sqlx::query_as::<_, SceneRow>(&format!(
            r#"
            SELECT {SCENE_COLUMNS} FROM scenes
            WHERE project_id = $1 AND status = 'todo'
            ORDER BY scene_index ASC
            LIMIT 1
            "#
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SceneRow::into_scene).transpose()
    }

    async fn claim_scene(&self, scene_id: Uuid) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "UPDATE scenes SET status = 'in_progress', updated_at = NOW() \
             WHERE id = $1 AND status = 'todo'",
        )
        .bind(scene_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 1 {
            return Ok(true);
        }
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM scenes WHERE id = $1")
            .bind(scene_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::SceneNotFound(scene_id));
        }
        Ok(false)
    }

    async fn requeue_failed_scene(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
    ) -> Result<AgentMemory, StoreError> {
        let mut tx = self.pool.begin().await?;

        let requeued: Option<(i32,)> = sqlx::query_as(
            "UPDATE scenes SET status = 'todo', updated_at = NOW() \
             WHERE id = $1 AND status = 'failed' RETURNING scene_index",
        )
        .bind(scene_id)
        .fetch_optional(&mut *tx)
        .await?;

        let scene_index = match requeued {
            Some((index,)) => index,
            None => {
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM scenes WHERE id = $1")
                        .bind(scene_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match status {
                    None => Err(StoreError::SceneNotFound(scene_id)),
                    Some(s) => {
                        let found = SceneStatus::parse(&s)
                            .ok_or_else(|| StoreError::InvalidStatus(s.clone()))?;
                        Err(StoreError::UnexpectedSceneStatus { scene_id, found })
                    }
                };
            }
        };

        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"
            UPDATE agent_memory
            SET failed_count = GREATEST(failed_count - 1, 0),
                workflow_status = CASE WHEN workflow_status = 'completed' THEN 'running'
                                       ELSE workflow_status END,
                last_log = $2,
                revision = revision + 1,
                updated_at = NOW()
            WHERE project_id = $1
            RETURNING {MEMORY_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(format!("Scene {scene_index} requeued for another attempt"))
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or(StoreError::MemoryNotFound(project_id))?;
        tx.commit().await?;
        row.into_memory()
    }

    async fn scene(&self, scene_id: Uuid) -> Result<Scene, StoreError> {
        let row = sqlx::query_as::<_, SceneRow>(&format!(
            "SELECT {SCENE_COLUMNS} FROM scenes WHERE id = $1"
        ))
        .bind(scene_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::SceneNotFound(scene_id))?.into_scene()
    }

    async fn scenes_for_project(&self, project_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        let rows = sqlx::query_as::<_, SceneRow>(&format!(
            "SELECT {SCENE_COLUMNS} FROM scenes WHERE project_id = $1 ORDER BY scene_index ASC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SceneRow::into_scene).collect()
    }

    async fn count_scenes_in_status(
        &self,
        project_id: Uuid,
        status: SceneStatus,
    ) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scenes WHERE project_id = $1 AND status = $2",
        )
        .bind(project_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn active_projects(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT project_id FROM agent_memory \
             WHERE workflow_status IN ('idle', 'running') \
             ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn open_render_jobs(&self, limit: u32) -> Result<Vec<RenderJobHandle>, StoreError> {
        let rows = sqlx::query_as::<_, RenderJobRow>(
            r#"
            SELECT scene_id, project_id, provider, job_id, state, submitted_at, resolved_at
            FROM render_jobs
            WHERE state = 'submitted'
            ORDER BY submitted_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RenderJobRow::into_handle).collect()
    }

    async fn resolve_render_job(
        &self,
        scene_id: Uuid,
        outcome: RenderJobOutcome,
    ) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE render_jobs SET state = $2, resolved_at = NOW() WHERE scene_id = $1",
        )
        .bind(scene_id)
        .bind(outcome.state().as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::SceneNotFound(scene_id));
        }
        Ok(())
    }

    async fn update_asset(
        &self,
        scene_id: Uuid,
        asset_status: AssetStatus,
        source_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT visual FROM scenes WHERE id = $1 FOR UPDATE")
                .bind(scene_id)
                .fetch_optional(&mut *tx)
                .await?;
        let visual = row.ok_or(StoreError::SceneNotFound(scene_id))?.0;

        let mut payload: VisualPayload = serde_json::from_value(visual)?;
        payload.set_asset_status(asset_status);
        if let Some(url) = source_url {
            payload.set_source_url(Some(url.to_string()));
        }

        sqlx::query("UPDATE scenes SET visual = $2, updated_at = NOW() WHERE id = $1")
            .bind(scene_id)
            .bind(serde_json::to_value(&payload)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MemoryRow {
    project_id: Uuid,
    project_name: String,
    workflow_status: String,
    total_scenes: i32,
    completed_count: i32,
    failed_count: i32,
    last_log: String,
    metadata: Option<serde_json::Value>,
    revision: i64,
    updated_at: DateTime<Utc>,
}

impl MemoryRow {
    fn into_memory(self) -> Result<AgentMemory, StoreError> {
        let workflow_status = WorkflowStatus::parse(&self.workflow_status)
            .ok_or_else(|| StoreError::InvalidStatus(self.workflow_status.clone()))?;
        Ok(AgentMemory {
            project_id: self.project_id,
            project_name: self.project_name,
            workflow_status,
            total_scenes: self.total_scenes as u32,
            completed_count: self.completed_count as u32,
            failed_count: self.failed_count as u32,
            last_log: self.last_log,
            metadata: self.metadata,
            revision: self.revision,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SceneRow {
    id: Uuid,
    project_id: Uuid,
    scene_index: i32,
    start_time: f64,
    end_time: f64,
    script: String,
    visual: serde_json::Value,
    transition: serde_json::Value,
    status: String,
}

impl SceneRow {
    fn into_scene(self) -> Result<Scene, StoreError> {
        let status = SceneStatus::parse(&self.status)
            .ok_or_else(|| StoreError::InvalidStatus(self.status.clone()))?;
        let visual: VisualPayload = serde_json::from_value(self.visual)?;
        let transition: Transition = serde_json::from_value(self.transition)?;
        Ok(Scene {
            id: self.id,
            project_id: self.project_id,
            index: self.scene_index as u32,
            start_time: self.start_time,
            end_time: self.end_time,
            script: self.script,
            visual,
            transition,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RenderJobRow {
    scene_id: Uuid,
    project_id: Uuid,
    provider: String,
    job_id: String,
    state: String,
    submitted_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl RenderJobRow {
    fn into_handle(self) -> Result<RenderJobHandle, StoreError> {
        let state = RenderJobState::parse(&self.state)
            .ok_or_else(|| StoreError::InvalidStatus(self.state.clone()))?;
        Ok(RenderJobHandle {
            scene_id: self.scene_id,
            project_id: self.project_id,
            provider: self.provider,
            job_id: self.job_id,
            state,
            submitted_at: self.submitted_at,
            resolved_at: self.resolved_at,
        })
    }
}
