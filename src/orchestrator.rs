// src/orchestrator.rs
// The tick engine: advance a project by exactly one scene per call. All
// progress flows through the store's CAS operations, so concurrent ticks on
// the same project serialize at the scene claim and the loser resolves to a
// benign no-op.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentContext, AgentRegistry};
use crate::memory::{AgentMemory, WorkflowStatus};
use crate::model::{SceneStatus, VisualType};
use crate::result::{AgentResult, FailureCode};
use crate::store::{StoreError, WorkflowStore};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(
        "project {project_id} is inconsistent: {completed} completed + {failed} failed of \
         {total} scenes, but no scene is todo or in_progress"
    )]
    InconsistentState {
        project_id: Uuid,
        completed: u32,
        failed: u32,
        total: u32,
    },
    #[error("project {project_id} still has work after {max_ticks} ticks")]
    TickBudgetExhausted { project_id: Uuid, max_ticks: u32 },
    #[error("invalid workflow transition: {from} -> {to}")]
    InvalidControl {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
}

/// What one `advance` call did dispatch, when it dispatched anything.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedScene {
    pub scene_id: Uuid,
    pub index: u32,
    pub visual_type: VisualType,
    pub agent: String,
}

/// Outcome of one tick. `scene` is `None` for no-ops (paused, completed,
/// in-flight, unroutable visual type) and for the completion transition.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub project_id: Uuid,
    pub scene: Option<DispatchedScene>,
    pub result: AgentResult,
    /// Workflow status observed after the tick, so callers can act without
    /// re-reading the store.
    pub workflow_status: WorkflowStatus,
}

/// Accounting for a `run_to_completion` drive.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub ticks: u32,
    pub completed: u32,
    pub failed: u32,
    pub final_status: WorkflowStatus,
}

fn no_op(project_id: Uuid, status: WorkflowStatus, result: AgentResult) -> TickOutcome {
    TickOutcome {
        project_id,
        scene: None,
        result,
        workflow_status: status,
    }
}

pub struct Orchestrator {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<AgentRegistry>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<AgentRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Advance the project by at most one scene of work.
    ///
    /// Order matters: preconditions, completion check, scene selection,
    /// registry lookup, claim, dispatch, commit. The completion check runs
    /// before scene lookup so the loop terminates once counters are
    /// exhausted, and an agent fault is always normalized into the returned
    /// [`AgentResult`] rather than escaping as an error.
    pub async fn advance(&self, project_id: Uuid) -> Result<TickOutcome, OrchestratorError> {
        loop {
            let memory = self.store.project_memory(project_id).await?;

            match memory.workflow_status {
                WorkflowStatus::Paused => {
                    return Ok(no_op(
                        project_id,
                        WorkflowStatus::Paused,
                        AgentResult::failure(FailureCode::WorkflowPaused, "Workflow is paused"),
                    ));
                }
                WorkflowStatus::Completed => {
                    return Ok(no_op(
                        project_id,
                        WorkflowStatus::Completed,
                        AgentResult::failure(
                            FailureCode::WorkflowCompleted,
                            "Workflow already completed",
                        ),
                    ));
                }
                WorkflowStatus::Idle | WorkflowStatus::Running => {}
            }

            if memory.is_exhausted() {
                match self
                    .store
                    .update_workflow_status(project_id, WorkflowStatus::Completed, memory.revision)
                    .await
                {
                    Ok(updated) => {
                        info!(
                            "✅ Project {} completed: {}/{} scenes done, {} failed",
                            project_id,
                            memory.completed_count,
                            memory.total_scenes,
                            memory.failed_count
                        );
                        return Ok(no_op(
                            project_id,
                            updated.workflow_status,
                            AgentResult::success(format!(
                                "All {} scenes settled; workflow completed",
                                memory.total_scenes
                            )),
                        ));
                    }
                    // Another writer moved the memory under us. Re-read and
                    // re-decide from the top: it may have completed, paused,
                    // or had a failed scene requeued in the meantime.
                    Err(StoreError::RevisionConflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            return self.dispatch_next(memory).await;
        }
    }

    async fn dispatch_next(&self, memory: AgentMemory) -> Result<TickOutcome, OrchestratorError> {
        let project_id = memory.project_id;

        let scene = match self.store.next_todo_scene(project_id).await? {
            Some(scene) => scene,
            None => {
                let in_flight = self
                    .store
                    .count_scenes_in_status(project_id, SceneStatus::InProgress)
                    .await?;
                if in_flight > 0 {
                    return Ok(no_op(
                        project_id,
                        memory.workflow_status,
                        AgentResult::failure(
                            FailureCode::SceneInFlight,
                            format!("{} scene(s) already being processed", in_flight),
                        ),
                    ));
                }
                return Err(OrchestratorError::InconsistentState {
                    project_id,
                    completed: memory.completed_count,
                    failed: memory.failed_count,
                    total: memory.total_scenes,
                });
            }
        };

        let visual_type = scene.visual_type();
        let agent = match self.registry.agent_for(visual_type) {
            Some(agent) => agent,
            None => {
                warn!(
                    "No agent registered for {} (scene {} of project {})",
                    visual_type, scene.index, project_id
                );
                return Ok(no_op(
                    project_id,
                    memory.workflow_status,
                    AgentResult::failure(
                        FailureCode::NoAgentForType,
                        format!("No agent registered for visual type {}", visual_type),
                    )
                    .with_log(format!(
                        "Scene {}: no agent registered for {}",
                        scene.index, visual_type
                    )),
                ));
            }
        };

        // At-most-once dispatch: the claim is the serialization point for
        // concurrent ticks on the same project.
        if !self.store.claim_scene(scene.id).await? {
            return Ok(no_op(
                project_id,
                memory.workflow_status,
                AgentResult::failure(
                    FailureCode::SceneInFlight,
                    format!("Scene {} was claimed by another tick", scene.index),
                ),
            ));
        }

        let snapshot = self
            .store
            .register_agent_start(project_id, agent.name(), scene.index)
            .await?;

        info!(
            "🤖 Dispatching {} for scene {} ({}) of project {}",
            agent.name(),
            scene.index,
            visual_type,
            project_id
        );

        let scene_id = scene.id;
        let scene_index = scene.index;
        let task_agent = agent.clone();
        let ctx = AgentContext::new(snapshot);

        // The agent runs on its own task so a panic surfaces as a JoinError
        // here instead of tearing down the tick. No store state is held
        // across this await.
        let result = match tokio::spawn(async move { task_agent.process(scene, ctx).await }).await
        {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "❌ Agent {} fault on scene {}: {}",
                    agent.name(),
                    scene_index,
                    e
                );
                AgentResult::failure(FailureCode::AgentException, "Agent fault during processing")
                    .with_log(format!("Scene {}: AGENT_EXCEPTION: {}", scene_index, e))
            }
        };

        let updated = self
            .store
            .register_agent_done(project_id, scene_id, agent.name(), &result)
            .await?;

        info!(
            "💾 Scene {} committed as {} ({}/{} settled)",
            scene_index,
            if result.success { "done" } else { "failed" },
            updated.settled(),
            updated.total_scenes
        );

        Ok(TickOutcome {
            project_id,
            scene: Some(DispatchedScene {
                scene_id,
                index: scene_index,
                visual_type,
                agent: agent.name().to_string(),
            }),
            result,
            workflow_status: updated.workflow_status,
        })
    }

    /// Suspend dispatch. Only `idle` or `running` workflows can pause.
    pub async fn pause(&self, project_id: Uuid) -> Result<AgentMemory, OrchestratorError> {
        self.control(project_id, WorkflowStatus::Paused).await
    }

    /// Resume a paused workflow.
    pub async fn resume(&self, project_id: Uuid) -> Result<AgentMemory, OrchestratorError> {
        self.control(project_id, WorkflowStatus::Running).await
    }

    async fn control(
        &self,
        project_id: Uuid,
        to: WorkflowStatus,
    ) -> Result<AgentMemory, OrchestratorError> {
        let memory = self.store.project_memory(project_id).await?;
        if !memory.workflow_status.can_transition(to) {
            return Err(OrchestratorError::InvalidControl {
                from: memory.workflow_status,
                to,
            });
        }
        let updated = self
            .store
            .update_workflow_status(project_id, to, memory.revision)
            .await?;
        info!("Project {} workflow {}", project_id, updated.workflow_status);
        Ok(updated)
    }

    /// Retry policy: put a failed scene back in the queue. Decrements
    /// `failed_count` and reopens a completed workflow so the next tick can
    /// pick the scene up again.
    pub async fn requeue_scene(
        &self,
        project_id: Uuid,
        scene_id: Uuid,
    ) -> Result<AgentMemory, OrchestratorError> {
        let updated = self.store.requeue_failed_scene(project_id, scene_id).await?;
        info!("Scene {} requeued for project {}", scene_id, project_id);
        Ok(updated)
    }

    /// Drive `advance` until the workflow completes, pauses, or reports work
    /// in flight elsewhere. `max_ticks` bounds the drive; exceeding it with
    /// work remaining is an error, not a silent stop.
    pub async fn run_to_completion(
        &self,
        project_id: Uuid,
        max_ticks: u32,
    ) -> Result<RunReport, OrchestratorError> {
        let mut report = RunReport {
            ticks: 0,
            completed: 0,
            failed: 0,
            final_status: self.store.project_memory(project_id).await?.workflow_status,
        };

        while report.ticks < max_ticks {
            let outcome = self.advance(project_id).await?;
            report.ticks += 1;
            report.final_status = outcome.workflow_status;

            if outcome.scene.is_some() {
                if outcome.result.success {
                    report.completed += 1;
                } else {
                    report.failed += 1;
                }
            }

            if outcome.workflow_status == WorkflowStatus::Completed {
                return Ok(report);
            }
            match outcome.result.error {
                Some(FailureCode::WorkflowPaused) | Some(FailureCode::SceneInFlight) => {
                    return Ok(report);
                }
                _ => {}
            }
        }

        Err(OrchestratorError::TickBudgetExhausted {
            project_id,
            max_ticks,
        })
    }
}
