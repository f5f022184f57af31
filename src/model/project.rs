// Projects and the storyboard ingestion unit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::scene::Scene;
use crate::model::ModelError;

/// A video production unit. Created once from a storyboard; the orchestrator
/// never mutates it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    /// Sum of scene durations in seconds. Informational, not authoritative.
    pub total_duration: f64,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            total_duration: 0.0,
        }
    }
}

/// A validated project decomposition, ready for ingestion. Construction is
/// the only place the cross-scene invariants are checked; everything
/// downstream may rely on them without re-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub project: Project,
    pub scenes: Vec<Scene>,
    /// Free-form context (brand tone, voiceover reference, ...) handed to
    /// agents through the workflow memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Storyboard {
    /// Validate an ordered scene list against the timeline invariants:
    /// 1-based contiguous indexes, each scene starting where the previous
    /// one ended, ownership by the given project. `total_duration` is
    /// recomputed from the scenes.
    pub fn new(
        mut project: Project,
        scenes: Vec<Scene>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, ModelError> {
        if scenes.is_empty() {
            return Err(ModelError::EmptyStoryboard);
        }

        let mut previous_end: Option<f64> = None;
        for (pos, scene) in scenes.iter().enumerate() {
            let expected_index = (pos + 1) as u32;
            if scene.index != expected_index {
                return Err(ModelError::NonContiguousIndex {
                    index: scene.index,
                    expected: expected_index,
                });
            }
            if scene.project_id != project.id {
                return Err(ModelError::ForeignScene { index: scene.index });
            }
            if let Some(end) = previous_end {
                if (scene.start_time - end).abs() > 1e-9 {
                    return Err(ModelError::TimelineGap {
                        index: scene.index,
                        start: scene.start_time,
                        expected: end,
                    });
                }
            }
            previous_end = Some(scene.end_time);
        }

        project.total_duration = scenes.iter().map(Scene::duration).sum();

        Ok(Self {
            project,
            scenes,
            metadata,
        })
    }

    pub fn total_scenes(&self) -> u32 {
        self.scenes.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scene::Transition;
    use crate::model::visual::{AssetStatus, ImageFit, ImageVisual, VisualPayload};

    fn image_payload() -> VisualPayload {
        VisualPayload::Image(ImageVisual {
            provider: "pexels".to_string(),
            source_url: None,
            asset_status: AssetStatus::PendingGeneration,
            fitting_required: false,
            fitting_strategy: ImageFit::None,
            search_query: Some("mountain sunrise".to_string()),
            image_id: None,
            zoom_params: None,
        })
    }

    fn scene(project: &Project, index: u32, start: f64, end: f64) -> Scene {
        Scene::new(
            project.id,
            index,
            start,
            end,
            format!("scene {index} narration"),
            image_payload(),
            Transition::cut(),
        )
        .unwrap()
    }

    #[test]
    fn valid_storyboard_computes_total_duration() {
        let project = Project::new("Morning Routine");
        let scenes = vec![
            scene(&project, 1, 0.0, 3.5),
            scene(&project, 2, 3.5, 7.0),
            scene(&project, 3, 7.0, 12.25),
        ];
        let board = Storyboard::new(project, scenes, None).unwrap();
        assert_eq!(board.total_scenes(), 3);
        assert!((board.project.total_duration - 12.25).abs() < 1e-9);
    }

    #[test]
    fn rejects_timeline_gap_and_overlap() {
        let project = Project::new("p");
        let gapped = vec![scene(&project, 1, 0.0, 3.0), scene(&project, 2, 3.5, 6.0)];
        assert!(matches!(
            Storyboard::new(project.clone(), gapped, None),
            Err(ModelError::TimelineGap { index: 2, .. })
        ));

        let overlapping = vec![scene(&project, 1, 0.0, 3.0), scene(&project, 2, 2.5, 6.0)];
        assert!(matches!(
            Storyboard::new(project, overlapping, None),
            Err(ModelError::TimelineGap { index: 2, .. })
        ));
    }

    #[test]
    fn rejects_non_contiguous_indexes() {
        let project = Project::new("p");
        let skipped = vec![scene(&project, 1, 0.0, 3.0), scene(&project, 3, 3.0, 6.0)];
        assert!(matches!(
            Storyboard::new(project.clone(), skipped, None),
            Err(ModelError::NonContiguousIndex { index: 3, expected: 2 })
        ));

        let duplicated = vec![
            scene(&project, 1, 0.0, 3.0),
            scene(&project, 2, 3.0, 6.0),
            scene(&project, 2, 6.0, 9.0),
        ];
        assert!(matches!(
            Storyboard::new(project, duplicated, None),
            Err(ModelError::NonContiguousIndex { index: 2, expected: 3 })
        ));
    }

    #[test]
    fn rejects_scene_from_another_project() {
        let project = Project::new("p");
        let other = Project::new("q");
        let scenes = vec![scene(&project, 1, 0.0, 3.0), scene(&other, 2, 3.0, 6.0)];
        assert!(matches!(
            Storyboard::new(project, scenes, None),
            Err(ModelError::ForeignScene { index: 2 })
        ));
    }

    #[test]
    fn rejects_empty_storyboard() {
        let project = Project::new("p");
        assert!(matches!(
            Storyboard::new(project, vec![], None),
            Err(ModelError::EmptyStoryboard)
        ));
    }
}
