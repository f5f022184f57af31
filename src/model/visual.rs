// Scene visual payloads: one tagged variant per visual type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisualType {
    ARoll,
    BRoll,
    Graphics,
    Image,
}

impl VisualType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualType::ARoll => "a-roll",
            VisualType::BRoll => "b-roll",
            VisualType::Graphics => "graphics",
            VisualType::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "a-roll" => Some(VisualType::ARoll),
            "b-roll" => Some(VisualType::BRoll),
            "graphics" => Some(VisualType::Graphics),
            "image" => Some(VisualType::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for VisualType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the asset backing a scene, independent of the scene's own
/// workflow status: a scene can be `done` (job submitted) while its asset is
/// still `pending_generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    PendingGeneration,
    Generated,
    Ready,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::PendingGeneration => "pending_generation",
            AssetStatus::Generated => "generated",
            AssetStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_generation" => Some(AssetStatus::PendingGeneration),
            "generated" => Some(AssetStatus::Generated),
            "ready" => Some(AssetStatus::Ready),
            _ => None,
        }
    }
}

// Fitting strategies are deliberately separate enums per visual type. An
// a-roll can never be pan-fitted and an image can never be trimmed, so the
// type system rules those states out instead of a shared catch-all enum.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ARollFit {
    GenerateToDuration,
    Trim,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BRollFit {
    Trim,
    Slowdown,
    Speedup,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsFit {
    GenerateToDuration,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFit {
    Zoom,
    Pan,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ARollVisual {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub asset_status: AssetStatus,
    pub fitting_required: bool,
    pub fitting_strategy: ARollFit,
    pub avatar_id: String,
    pub emotion: String,
    pub camera_angle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BRollVisual {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub asset_status: AssetStatus,
    pub fitting_required: bool,
    pub fitting_strategy: BRollFit,
    pub search_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Duration of the retrieved clip; unknown until the search runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,
    pub target_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsVisual {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub asset_status: AssetStatus,
    pub fitting_required: bool,
    pub fitting_strategy: GraphicsFit,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_params: Option<GenerationParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomParams {
    pub start_zoom: f64,
    pub end_zoom: f64,
    pub center_x: f64,
    pub center_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVisual {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub asset_status: AssetStatus,
    pub fitting_required: bool,
    pub fitting_strategy: ImageFit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_params: Option<ZoomParams>,
}

/// The visual side of a scene. The variant *is* the visual type: the tag and
/// the payload cannot disagree, and deserializing a tag whose fields don't
/// match the variant fails outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "visual_type", rename_all = "kebab-case")]
pub enum VisualPayload {
    ARoll(ARollVisual),
    BRoll(BRollVisual),
    Graphics(GraphicsVisual),
    Image(ImageVisual),
}

impl VisualPayload {
    pub fn visual_type(&self) -> VisualType {
        match self {
            VisualPayload::ARoll(_) => VisualType::ARoll,
            VisualPayload::BRoll(_) => VisualType::BRoll,
            VisualPayload::Graphics(_) => VisualType::Graphics,
            VisualPayload::Image(_) => VisualType::Image,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            VisualPayload::ARoll(v) => &v.provider,
            VisualPayload::BRoll(v) => &v.provider,
            VisualPayload::Graphics(v) => &v.provider,
            VisualPayload::Image(v) => &v.provider,
        }
    }

    pub fn asset_status(&self) -> AssetStatus {
        match self {
            VisualPayload::ARoll(v) => v.asset_status,
            VisualPayload::BRoll(v) => v.asset_status,
            VisualPayload::Graphics(v) => v.asset_status,
            VisualPayload::Image(v) => v.asset_status,
        }
    }

    pub fn source_url(&self) -> Option<&str> {
        match self {
            VisualPayload::ARoll(v) => v.source_url.as_deref(),
            VisualPayload::BRoll(v) => v.source_url.as_deref(),
            VisualPayload::Graphics(v) => v.source_url.as_deref(),
            VisualPayload::Image(v) => v.source_url.as_deref(),
        }
    }

    pub fn fitting_required(&self) -> bool {
        match self {
            VisualPayload::ARoll(v) => v.fitting_required,
            VisualPayload::BRoll(v) => v.fitting_required,
            VisualPayload::Graphics(v) => v.fitting_required,
            VisualPayload::Image(v) => v.fitting_required,
        }
    }

    pub fn set_asset_status(&mut self, status: AssetStatus) {
        match self {
            VisualPayload::ARoll(v) => v.asset_status = status,
            VisualPayload::BRoll(v) => v.asset_status = status,
            VisualPayload::Graphics(v) => v.asset_status = status,
            VisualPayload::Image(v) => v.asset_status = status,
        }
    }

    pub fn set_source_url(&mut self, url: Option<String>) {
        match self {
            VisualPayload::ARoll(v) => v.source_url = url,
            VisualPayload::BRoll(v) => v.source_url = url,
            VisualPayload::Graphics(v) => v.source_url = url,
            VisualPayload::Image(v) => v.source_url = url,
        }
    }
}
