// Image scenes: stock photo search. The still is ready the moment a URL is
// known; any Ken Burns motion is applied at assembly from zoom_params.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::{AgentContext, SceneAgent};
use crate::model::{AssetStatus, Scene, VisualPayload, VisualType, ZoomParams};
use crate::result::{AgentResult, AssetUpdate, FailureCode};
use crate::tools::StockFootageApi;

const SEARCH_RESULT_COUNT: u32 = 3;

/// Gentle push-in, centered. Used when fitting is required but ingestion
/// didn't choose the motion.
const DEFAULT_KEN_BURNS: ZoomParams = ZoomParams {
    start_zoom: 1.0,
    end_zoom: 1.1,
    center_x: 0.5,
    center_y: 0.5,
};

pub struct ImageAgent {
    stock: Arc<dyn StockFootageApi>,
}

impl ImageAgent {
    pub fn new(stock: Arc<dyn StockFootageApi>) -> Self {
        Self { stock }
    }
}

#[async_trait]
impl SceneAgent for ImageAgent {
    fn name(&self) -> &str {
        "ImageAgent"
    }

    fn role(&self) -> &str {
        "Finds stock photos for image scenes"
    }

    fn visual_type(&self) -> VisualType {
        VisualType::Image
    }

    async fn process(&self, scene: Scene, _ctx: AgentContext) -> AgentResult {
        let mut visual = match scene.visual.clone() {
            VisualPayload::Image(v) => v,
            other => {
                return AgentResult::failure(
                    FailureCode::TypeMismatch,
                    format!("ImageAgent received a {} scene", other.visual_type()),
                );
            }
        };

        // Fall back to the script when ingestion supplied no explicit query.
        let query = visual
            .search_query
            .clone()
            .unwrap_or_else(|| scene.script.clone());

        let photos = match self.stock.search_photos(&query, SEARCH_RESULT_COUNT).await {
            Ok(photos) => photos,
            Err(e) => {
                warn!(
                    "❌ Stock photo search failed for scene {}: {}",
                    scene.index, e
                );
                return AgentResult::failure(FailureCode::ProviderError, "Photo search failed")
                    .with_log(format!("Scene {}: photo search failed: {}", scene.index, e));
            }
        };

        let photo = match photos.into_iter().next() {
            Some(photo) => photo,
            None => {
                return AgentResult::failure(FailureCode::NoSearchResults, "No stock photos found")
                    .with_log(format!(
                        "Scene {}: no stock photos for query \"{}\"",
                        scene.index, query
                    ));
            }
        };

        info!("✅ Scene {}: photo {} selected", scene.index, photo.id);

        visual.image_id = Some(photo.id.clone());
        visual.source_url = Some(photo.image_url.clone());
        visual.search_query = Some(query.clone());
        visual.asset_status = AssetStatus::Ready;
        if visual.fitting_required && visual.zoom_params.is_none() {
            visual.zoom_params = Some(DEFAULT_KEN_BURNS);
        }

        let update = AssetUpdate {
            payload: VisualPayload::Image(visual),
            job: None,
        };

        AgentResult::success("Stock image selected")
            .with_log(format!(
                "Scene {}: photo {} selected for \"{}\"",
                scene.index, photo.id, query
            ))
            .with_data(serde_json::json!({ "image_id": photo.id }))
            .with_asset(&update)
    }
}
