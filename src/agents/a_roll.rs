// A-roll scenes: presenter avatar video rendered by an external provider.
// The agent trims the scene's slice of the master voiceover when one exists,
// submits the render job and reports it pending; the reconciler observes
// completion later.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::agents::{AgentContext, SceneAgent};
use crate::model::{AssetStatus, Scene, VisualPayload, VisualType};
use crate::result::{AgentResult, AssetUpdate, FailureCode, RenderJobRef};
use crate::tools::{AudioTool, AvatarApi};

pub struct ARollAgent {
    avatar: Arc<dyn AvatarApi>,
    audio: Arc<dyn AudioTool>,
}

impl ARollAgent {
    pub fn new(avatar: Arc<dyn AvatarApi>, audio: Arc<dyn AudioTool>) -> Self {
        Self { avatar, audio }
    }
}

#[async_trait]
impl SceneAgent for ARollAgent {
    fn name(&self) -> &str {
        "ARollAgent"
    }

    fn role(&self) -> &str {
        "Renders presenter avatar video for a-roll scenes"
    }

    fn visual_type(&self) -> VisualType {
        VisualType::ARoll
    }

    async fn process(&self, scene: Scene, ctx: AgentContext) -> AgentResult {
        let mut visual = match scene.visual.clone() {
            VisualPayload::ARoll(v) => v,
            other => {
                return AgentResult::failure(
                    FailureCode::TypeMismatch,
                    format!("ARollAgent received a {} scene", other.visual_type()),
                );
            }
        };

        // Isolate this scene's slice of the master voiceover, if ingestion
        // provided one. Without it the provider generates the voice from the
        // script text.
        let audio_ref = match ctx.voiceover_ref() {
            Some(source) => {
                match self
                    .audio
                    .trim(source, scene.start_time, scene.duration())
                    .await
                {
                    Ok(output) => {
                        debug!(
                            "Scene {}: voiceover slice ready at {}",
                            scene.index, output
                        );
                        Some(output)
                    }
                    Err(e) => {
                        warn!("❌ Voiceover trim failed for scene {}: {}", scene.index, e);
                        return AgentResult::failure(
                            FailureCode::ProviderError,
                            "Voiceover trim failed",
                        )
                        .with_log(format!(
                            "Scene {}: voiceover trim failed: {}",
                            scene.index, e
                        ));
                    }
                }
            }
            None => None,
        };

        let job_id = match self
            .avatar
            .create_job(&scene.script, audio_ref.as_deref(), &visual.avatar_id)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "❌ Avatar job submission failed for scene {}: {}",
                    scene.index, e
                );
                return AgentResult::failure(
                    FailureCode::ProviderError,
                    "Avatar job submission failed",
                )
                .with_log(format!(
                    "Scene {}: avatar job submission failed: {}",
                    scene.index, e
                ));
            }
        };

        info!("🎬 Scene {}: avatar job {} submitted", scene.index, job_id);

        visual.asset_status = AssetStatus::PendingGeneration;
        let provider = self.avatar.provider().to_string();
        let update = AssetUpdate {
            payload: VisualPayload::ARoll(visual),
            job: Some(RenderJobRef {
                provider: provider.clone(),
                job_id: job_id.clone(),
            }),
        };

        let log = match &audio_ref {
            Some(slice) => format!(
                "Scene {}: avatar job {} submitted to {} with voiceover {}",
                scene.index, job_id, provider, slice
            ),
            None => format!(
                "Scene {}: avatar job {} submitted to {} with generated voice",
                scene.index, job_id, provider
            ),
        };

        AgentResult::success("Avatar render job initiated")
            .with_log(log)
            .with_data(serde_json::json!({ "job_id": job_id, "provider": provider }))
            .with_asset(&update)
    }
}
