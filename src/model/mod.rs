// Domain model: projects, scenes, and the per-type visual payloads.

pub mod project;
pub mod scene;
pub mod visual;

pub use project::{Project, Storyboard};
pub use scene::{Scene, SceneStatus, Transition, TransitionDirection, TransitionKind};
pub use visual::{
    ARollFit, ARollVisual, AssetStatus, BRollFit, BRollVisual, GenerationParams, GraphicsFit,
    GraphicsVisual, ImageFit, ImageVisual, VisualPayload, VisualType, ZoomParams,
};

use thiserror::Error;

/// Construction-time validation failures. These are the only place the
/// timeline invariants are enforced; persisted scenes are trusted.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("scene {index} breaks index order, expected {expected}")]
    NonContiguousIndex { index: u32, expected: u32 },
    #[error("scene {index} has invalid timing {start}..{end}")]
    InvalidTiming { index: u32, start: f64, end: f64 },
    #[error("scene {index} starts at {start} but the previous scene ended at {expected}")]
    TimelineGap { index: u32, start: f64, expected: f64 },
    #[error("scene {index} has an empty script")]
    EmptyScript { index: u32 },
    #[error("scene {index} belongs to a different project")]
    ForeignScene { index: u32 },
    #[error("storyboard contains no scenes")]
    EmptyStoryboard,
}
