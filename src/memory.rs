// Per-project workflow memory: the durable progress record orchestration
// reads and commits against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Storyboard;

/// Project-level workflow status. `idle` and `running` both permit dispatch;
/// `idle` specifically means "never started". `completed` is terminal,
/// `paused` suspends dispatch until externally resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(WorkflowStatus::Idle),
            "running" => Some(WorkflowStatus::Running),
            "paused" => Some(WorkflowStatus::Paused),
            "completed" => Some(WorkflowStatus::Completed),
            _ => None,
        }
    }

    pub fn allows_dispatch(&self) -> bool {
        matches!(self, WorkflowStatus::Idle | WorkflowStatus::Running)
    }

    /// Legal control transitions (pause, resume). The completion transition
    /// and requeue's reopen go through the store directly and are not
    /// guarded here.
    pub fn can_transition(self, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, to),
            (Idle, Paused) | (Running, Paused) | (Paused, Running)
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record per project, the source of truth for orchestration progress.
/// Mutated only through the workflow store; `revision` is the optimistic
/// concurrency token bumped on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    pub project_id: Uuid,
    pub project_name: String,
    pub workflow_status: WorkflowStatus,
    pub total_scenes: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    /// Most recent human-readable status line. Observability aid, not
    /// authoritative state.
    pub last_log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl AgentMemory {
    /// The zero-counter record created when a storyboard is ingested.
    pub fn for_storyboard(board: &Storyboard) -> Self {
        Self {
            project_id: board.project.id,
            project_name: board.project.title.clone(),
            workflow_status: WorkflowStatus::Idle,
            total_scenes: board.total_scenes(),
            completed_count: 0,
            failed_count: 0,
            last_log: format!("Storyboard ingested: {} scenes queued", board.total_scenes()),
            metadata: board.metadata.clone(),
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn settled(&self) -> u32 {
        self.completed_count + self.failed_count
    }

    /// True once every scene has been counted done or failed.
    pub fn is_exhausted(&self) -> bool {
        self.settled() >= self.total_scenes
    }

    pub fn progress(&self) -> f32 {
        if self.total_scenes == 0 {
            return 0.0;
        }
        self.settled() as f32 / self.total_scenes as f32
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} scenes settled ({} failed), status {}",
            self.project_name,
            self.settled(),
            self.total_scenes,
            self.failed_count,
            self.workflow_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, Scene, Storyboard, Transition};
    use crate::model::{AssetStatus, ImageFit, ImageVisual, VisualPayload};

    fn board(scene_count: usize) -> Storyboard {
        let project = Project::new("Launch Teaser");
        let scenes: Vec<Scene> = (0..scene_count)
            .map(|i| {
                Scene::new(
                    project.id,
                    (i + 1) as u32,
                    i as f64 * 2.0,
                    (i + 1) as f64 * 2.0,
                    "narration",
                    VisualPayload::Image(ImageVisual {
                        provider: "pexels".to_string(),
                        source_url: None,
                        asset_status: AssetStatus::PendingGeneration,
                        fitting_required: false,
                        fitting_strategy: ImageFit::None,
                        search_query: Some("ocean".to_string()),
                        image_id: None,
                        zoom_params: None,
                    }),
                    Transition::cut(),
                )
                .unwrap()
            })
            .collect();
        Storyboard::new(project, scenes, Some(serde_json::json!({"brand_tone": "upbeat"})))
            .unwrap()
    }

    #[test]
    fn memory_starts_idle_with_zero_counters() {
        let memory = AgentMemory::for_storyboard(&board(3));
        assert_eq!(memory.workflow_status, WorkflowStatus::Idle);
        assert_eq!(memory.total_scenes, 3);
        assert_eq!(memory.settled(), 0);
        assert!(!memory.is_exhausted());
        assert_eq!(memory.metadata.as_ref().unwrap()["brand_tone"], "upbeat");
    }

    #[test]
    fn exhaustion_and_progress_track_counters() {
        let mut memory = AgentMemory::for_storyboard(&board(4));
        memory.completed_count = 3;
        memory.failed_count = 1;
        assert!(memory.is_exhausted());
        assert!((memory.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn dispatch_allowed_only_while_idle_or_running() {
        assert!(WorkflowStatus::Idle.allows_dispatch());
        assert!(WorkflowStatus::Running.allows_dispatch());
        assert!(!WorkflowStatus::Paused.allows_dispatch());
        assert!(!WorkflowStatus::Completed.allows_dispatch());
    }

    #[test]
    fn control_transition_table() {
        use WorkflowStatus::*;
        assert!(Running.can_transition(Paused));
        assert!(Paused.can_transition(Running));
        assert!(Idle.can_transition(Paused));
        // Resume needs a paused workflow; reopening a completed one is the
        // requeue operation's job, not a control transition.
        assert!(!Idle.can_transition(Running));
        assert!(!Completed.can_transition(Running));
        assert!(!Completed.can_transition(Paused));
        assert!(!Paused.can_transition(Completed));
        assert!(!Running.can_transition(Running));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            WorkflowStatus::Idle,
            WorkflowStatus::Running,
            WorkflowStatus::Paused,
            WorkflowStatus::Completed,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()), Some(status));
        }
        assert!(WorkflowStatus::parse("archived").is_none());
    }
}
