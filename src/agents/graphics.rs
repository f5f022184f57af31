// Graphics scenes: programmatic motion graphics rendered asynchronously.
// The scene duration is folded into the generation params so the renderer
// produces a clip that already fits the slot.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::{AgentContext, SceneAgent};
use crate::model::{AssetStatus, Scene, VisualPayload, VisualType};
use crate::result::{AgentResult, AssetUpdate, FailureCode, RenderJobRef};
use crate::tools::GraphicsApi;

pub struct GraphicsAgent {
    graphics: Arc<dyn GraphicsApi>,
}

impl GraphicsAgent {
    pub fn new(graphics: Arc<dyn GraphicsApi>) -> Self {
        Self { graphics }
    }
}

#[async_trait]
impl SceneAgent for GraphicsAgent {
    fn name(&self) -> &str {
        "GraphicsAgent"
    }

    fn role(&self) -> &str {
        "Renders motion graphics for graphics scenes"
    }

    fn visual_type(&self) -> VisualType {
        VisualType::Graphics
    }

    async fn process(&self, scene: Scene, _ctx: AgentContext) -> AgentResult {
        let mut visual = match scene.visual.clone() {
            VisualPayload::Graphics(v) => v,
            other => {
                return AgentResult::failure(
                    FailureCode::TypeMismatch,
                    format!("GraphicsAgent received a {} scene", other.visual_type()),
                );
            }
        };

        let mut params = visual.generation_params.clone().unwrap_or_default();
        params.duration = Some(scene.duration());

        let job_id = match self.graphics.create_job(&visual.prompt, &params).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "❌ Graphics job submission failed for scene {}: {}",
                    scene.index, e
                );
                return AgentResult::failure(
                    FailureCode::ProviderError,
                    "Graphics job submission failed",
                )
                .with_log(format!(
                    "Scene {}: graphics job submission failed: {}",
                    scene.index, e
                ));
            }
        };

        info!("🎬 Scene {}: graphics job {} submitted", scene.index, job_id);

        visual.generation_params = Some(params);
        visual.asset_status = AssetStatus::PendingGeneration;
        let provider = self.graphics.provider().to_string();
        let update = AssetUpdate {
            payload: VisualPayload::Graphics(visual),
            job: Some(RenderJobRef {
                provider: provider.clone(),
                job_id: job_id.clone(),
            }),
        };

        AgentResult::success("Graphics render job initiated")
            .with_log(format!(
                "Scene {}: graphics job {} submitted to {} for a {:.2}s clip",
                scene.index,
                job_id,
                provider,
                scene.duration()
            ))
            .with_data(serde_json::json!({ "job_id": job_id, "provider": provider }))
            .with_asset(&update)
    }
}
