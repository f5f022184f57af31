// Scenes: atomic, time-bounded segments of a project's timeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::visual::{VisualPayload, VisualType};
use crate::model::ModelError;

/// Workflow status of a single scene. Owned exclusively by the orchestration
/// pipeline; `done` and `failed` are terminal for the orchestrator (requeue
/// is a separate control operation, not an automatic retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Todo,
    InProgress,
    Done,
    Failed,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Todo => "todo",
            SceneStatus::InProgress => "in_progress",
            SceneStatus::Done => "done",
            SceneStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(SceneStatus::Todo),
            "in_progress" => Some(SceneStatus::InProgress),
            "done" => Some(SceneStatus::Done),
            "failed" => Some(SceneStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SceneStatus::Done | SceneStatus::Failed)
    }
}

impl std::fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Cut,
    Fade,
    Slide,
    Zoom,
    Wipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    Left,
    Right,
    Up,
    Down,
}

/// How a scene visually connects to the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<TransitionDirection>,
}

impl Transition {
    pub fn cut() -> Self {
        Self {
            kind: TransitionKind::Cut,
            duration: 0.0,
            direction: None,
        }
    }

    pub fn fade(duration: f64) -> Self {
        Self {
            kind: TransitionKind::Fade,
            duration,
            direction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub project_id: Uuid,
    /// 1-based position in the timeline; contiguous and unique per project.
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub script: String,
    pub visual: VisualPayload,
    pub transition: Transition,
    pub status: SceneStatus,
}

impl Scene {
    /// Build a scene in `todo` status, enforcing the single-scene invariants.
    /// Cross-scene invariants (index contiguity, timeline alignment) are
    /// enforced by [`Storyboard::new`](crate::model::Storyboard::new).
    pub fn new(
        project_id: Uuid,
        index: u32,
        start_time: f64,
        end_time: f64,
        script: impl Into<String>,
        visual: VisualPayload,
        transition: Transition,
    ) -> Result<Self, ModelError> {
        if index == 0 {
            return Err(ModelError::NonContiguousIndex { index, expected: 1 });
        }
        if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 || start_time >= end_time {
            return Err(ModelError::InvalidTiming {
                index,
                start: start_time,
                end: end_time,
            });
        }
        let script = script.into();
        if script.trim().is_empty() {
            return Err(ModelError::EmptyScript { index });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            project_id,
            index,
            start_time,
            end_time,
            script,
            visual,
            transition,
            status: SceneStatus::Todo,
        })
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn visual_type(&self) -> VisualType {
        self.visual.visual_type()
    }
}
