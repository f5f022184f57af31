// B-roll scenes: stock footage search plus duration fitting. Selection and
// the fitting thresholds are product-tuned policy, kept in one place here.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::{AgentContext, SceneAgent};
use crate::model::{AssetStatus, BRollFit, Scene, VisualPayload, VisualType};
use crate::result::{AgentResult, AssetUpdate, FailureCode};
use crate::tools::StockFootageApi;

/// Clips within this fraction of the slot length play untouched.
const DURATION_TOLERANCE: f64 = 0.02;
/// Above this source/target ratio, speeding up looks jittery; trim instead.
const MAX_SPEEDUP_RATIO: f64 = 1.25;
/// Below this ratio the slowdown is too visible and the clip is unusable.
const MIN_SLOWDOWN_RATIO: f64 = 0.5;

const SEARCH_RESULT_COUNT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPlan {
    pub strategy: BRollFit,
    pub fitting_required: bool,
    pub speed_factor: Option<f64>,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
}

/// Decides how a clip of `source` seconds fills a `target`-second slot.
/// `None` means the clip cannot be used at all.
pub fn plan_fit(source: f64, target: f64) -> Option<FitPlan> {
    if source <= 0.0 || target <= 0.0 {
        return None;
    }
    let ratio = source / target;

    if (ratio - 1.0).abs() <= DURATION_TOLERANCE {
        return Some(FitPlan {
            strategy: BRollFit::None,
            fitting_required: false,
            speed_factor: None,
            trim_start: None,
            trim_end: None,
        });
    }
    if ratio > 1.0 && ratio <= MAX_SPEEDUP_RATIO {
        return Some(FitPlan {
            strategy: BRollFit::Speedup,
            fitting_required: true,
            speed_factor: Some(ratio),
            trim_start: None,
            trim_end: None,
        });
    }
    if ratio > MAX_SPEEDUP_RATIO {
        return Some(FitPlan {
            strategy: BRollFit::Trim,
            fitting_required: true,
            speed_factor: None,
            trim_start: Some(0.0),
            trim_end: Some(target),
        });
    }
    if ratio >= MIN_SLOWDOWN_RATIO {
        return Some(FitPlan {
            strategy: BRollFit::Slowdown,
            fitting_required: true,
            speed_factor: Some(ratio),
            trim_start: None,
            trim_end: None,
        });
    }
    None
}

pub struct BRollAgent {
    stock: Arc<dyn StockFootageApi>,
}

impl BRollAgent {
    pub fn new(stock: Arc<dyn StockFootageApi>) -> Self {
        Self { stock }
    }
}

#[async_trait]
impl SceneAgent for BRollAgent {
    fn name(&self) -> &str {
        "BRollAgent"
    }

    fn role(&self) -> &str {
        "Selects and fits stock footage for b-roll scenes"
    }

    fn visual_type(&self) -> VisualType {
        VisualType::BRoll
    }

    async fn process(&self, scene: Scene, _ctx: AgentContext) -> AgentResult {
        let mut visual = match scene.visual.clone() {
            VisualPayload::BRoll(v) => v,
            other => {
                return AgentResult::failure(
                    FailureCode::TypeMismatch,
                    format!("BRollAgent received a {} scene", other.visual_type()),
                );
            }
        };

        // The scene timeline is authoritative for the slot length.
        let target = scene.duration();

        let clips = match self
            .stock
            .search_videos(&visual.search_query, SEARCH_RESULT_COUNT)
            .await
        {
            Ok(clips) => clips,
            Err(e) => {
                warn!(
                    "❌ Stock footage search failed for scene {}: {}",
                    scene.index, e
                );
                return AgentResult::failure(FailureCode::ProviderError, "Stock search failed")
                    .with_log(format!("Scene {}: stock search failed: {}", scene.index, e));
            }
        };

        if clips.is_empty() {
            return AgentResult::failure(FailureCode::NoSearchResults, "No stock footage found")
                .with_log(format!(
                    "Scene {}: no stock footage for query \"{}\"",
                    scene.index, visual.search_query
                ));
        }

        let found = clips.len();
        let candidates: Vec<_> = clips
            .into_iter()
            .filter_map(|clip| plan_fit(clip.duration, target).map(|plan| (clip, plan)))
            .collect();

        let (clip, plan) = match candidates.into_iter().min_by(|a, b| {
            (a.0.duration - target)
                .abs()
                .total_cmp(&(b.0.duration - target).abs())
        }) {
            Some(best) => best,
            None => {
                return AgentResult::failure(
                    FailureCode::NoSearchResults,
                    "No usable stock footage found",
                )
                .with_log(format!(
                    "Scene {}: {} clips found for \"{}\" but none fit a {:.2}s slot",
                    scene.index, found, visual.search_query, target
                ));
            }
        };

        info!(
            "✅ Scene {}: clip {} ({:.2}s) fitted to {:.2}s via {:?}",
            scene.index, clip.id, clip.duration, target, plan.strategy
        );

        visual.video_id = Some(clip.id.clone());
        visual.source_url = Some(clip.video_url.clone());
        visual.source_duration = Some(clip.duration);
        visual.target_duration = target;
        visual.fitting_strategy = plan.strategy;
        visual.fitting_required = plan.fitting_required;
        visual.speed_factor = plan.speed_factor;
        visual.trim_start = plan.trim_start;
        visual.trim_end = plan.trim_end;
        visual.asset_status = if plan.fitting_required {
            AssetStatus::Generated
        } else {
            AssetStatus::Ready
        };

        let update = AssetUpdate {
            payload: VisualPayload::BRoll(visual),
            job: None,
        };

        AgentResult::success("Stock footage selected")
            .with_log(format!(
                "Scene {}: clip {} ({:.2}s) fitted to {:.2}s via {:?}",
                scene.index, clip.id, clip.duration, target, plan.strategy
            ))
            .with_data(serde_json::json!({
                "video_id": clip.id,
                "source_duration": clip.duration,
            }))
            .with_asset(&update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AgentMemory, WorkflowStatus};
    use crate::model::{ARollFit, ARollVisual, BRollVisual, Transition};
    use crate::tools::{StockClip, StockPhoto, ToolError};
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MockStockApi {
        clips: Vec<StockClip>,
        fail: bool,
        queries: Mutex<Vec<(String, u32)>>,
    }

    impl MockStockApi {
        fn with_durations(durations: &[f64]) -> Self {
            let clips = durations
                .iter()
                .enumerate()
                .map(|(i, d)| StockClip {
                    id: format!("clip-{}", i),
                    video_url: format!("https://videos.example.com/{}.mp4", i),
                    duration: *d,
                    thumbnail: None,
                })
                .collect();
            Self {
                clips,
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                clips: Vec::new(),
                fail: true,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StockFootageApi for MockStockApi {
        async fn search_videos(
            &self,
            query: &str,
            count: u32,
        ) -> Result<Vec<StockClip>, ToolError> {
            if self.fail {
                return Err(ToolError::Api {
                    provider: "pexels".to_string(),
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            self.queries.lock().unwrap().push((query.to_string(), count));
            Ok(self.clips.clone())
        }

        async fn search_photos(
            &self,
            _query: &str,
            _count: u32,
        ) -> Result<Vec<StockPhoto>, ToolError> {
            Ok(Vec::new())
        }
    }

    fn memory() -> AgentMemory {
        AgentMemory {
            project_id: Uuid::new_v4(),
            project_name: "Launch video".to_string(),
            workflow_status: WorkflowStatus::Running,
            total_scenes: 3,
            completed_count: 0,
            failed_count: 0,
            last_log: String::new(),
            metadata: None,
            revision: 2,
            updated_at: Utc::now(),
        }
    }

    fn b_roll_scene() -> Scene {
        Scene::new(
            Uuid::new_v4(),
            2,
            4.0,
            8.0,
            "The city wakes up",
            VisualPayload::BRoll(BRollVisual {
                provider: "pexels".to_string(),
                source_url: None,
                asset_status: AssetStatus::PendingGeneration,
                fitting_required: false,
                fitting_strategy: BRollFit::None,
                search_query: "city sunrise timelapse".to_string(),
                video_id: None,
                source_duration: None,
                target_duration: 4.0,
                speed_factor: None,
                trim_start: None,
                trim_end: None,
            }),
            Transition::fade(0.5),
        )
        .unwrap()
    }

    fn a_roll_scene() -> Scene {
        Scene::new(
            Uuid::new_v4(),
            1,
            0.0,
            4.0,
            "Welcome",
            VisualPayload::ARoll(ARollVisual {
                provider: "heygen".to_string(),
                source_url: None,
                asset_status: AssetStatus::PendingGeneration,
                fitting_required: true,
                fitting_strategy: ARollFit::GenerateToDuration,
                avatar_id: "anna".to_string(),
                emotion: "friendly".to_string(),
                camera_angle: "front".to_string(),
            }),
            Transition::cut(),
        )
        .unwrap()
    }

    #[test]
    fn fit_plan_within_tolerance_needs_no_fitting() {
        let plan = plan_fit(4.0, 4.0).unwrap();
        assert_eq!(plan.strategy, BRollFit::None);
        assert!(!plan.fitting_required);
        assert!(plan.speed_factor.is_none());

        let close = plan_fit(101.0, 100.0).unwrap();
        assert_eq!(close.strategy, BRollFit::None);
    }

    #[test]
    fn fit_plan_speeds_up_slightly_long_clips() {
        let plan = plan_fit(5.0, 4.0).unwrap();
        assert_eq!(plan.strategy, BRollFit::Speedup);
        assert!(plan.fitting_required);
        assert!((plan.speed_factor.unwrap() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn fit_plan_trims_clips_past_the_speedup_ceiling() {
        let plan = plan_fit(5.2, 4.0).unwrap();
        assert_eq!(plan.strategy, BRollFit::Trim);
        assert_eq!(plan.trim_start, Some(0.0));
        assert!((plan.trim_end.unwrap() - 4.0).abs() < 1e-9);
        assert!(plan.speed_factor.is_none());
    }

    #[test]
    fn fit_plan_slows_down_to_the_floor() {
        let plan = plan_fit(2.0, 4.0).unwrap();
        assert_eq!(plan.strategy, BRollFit::Slowdown);
        assert!((plan.speed_factor.unwrap() - 0.5).abs() < 1e-9);

        assert!(plan_fit(1.9, 4.0).is_none());
        assert!(plan_fit(0.0, 4.0).is_none());
    }

    #[tokio::test]
    async fn picks_the_clip_that_best_covers_the_slot() {
        let stock = Arc::new(MockStockApi::with_durations(&[10.0, 4.2, 2.4]));
        let agent = BRollAgent::new(stock.clone());

        let result = agent
            .process(b_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(result.success);
        let update = result.asset_update().unwrap();
        let VisualPayload::BRoll(visual) = update.payload else {
            panic!("expected b-roll payload");
        };
        assert_eq!(visual.video_id.as_deref(), Some("clip-1"));
        assert_eq!(visual.fitting_strategy, BRollFit::Speedup);
        assert_eq!(visual.asset_status, AssetStatus::Generated);
        assert!((visual.source_duration.unwrap() - 4.2).abs() < 1e-9);
        assert!((visual.speed_factor.unwrap() - 1.05).abs() < 1e-6);

        let queries = stock.queries.lock().unwrap();
        assert_eq!(
            queries.as_slice(),
            &[("city sunrise timelapse".to_string(), SEARCH_RESULT_COUNT)]
        );
    }

    #[tokio::test]
    async fn exact_fit_reports_ready() {
        let agent = BRollAgent::new(Arc::new(MockStockApi::with_durations(&[4.0])));

        let result = agent
            .process(b_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(result.success);
        let update = result.asset_update().unwrap();
        assert_eq!(update.payload.asset_status(), AssetStatus::Ready);
        assert!(!update.payload.fitting_required());
        assert!(update.job.is_none());
    }

    #[tokio::test]
    async fn empty_results_report_no_search_results() {
        let agent = BRollAgent::new(Arc::new(MockStockApi::with_durations(&[])));

        let result = agent
            .process(b_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(FailureCode::NoSearchResults));
    }

    #[tokio::test]
    async fn unusable_results_report_no_search_results() {
        // All clips shorter than half the 4s slot.
        let agent = BRollAgent::new(Arc::new(MockStockApi::with_durations(&[1.0, 1.5])));

        let result = agent
            .process(b_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(FailureCode::NoSearchResults));
        assert!(result.log_line().contains("none fit"));
    }

    #[tokio::test]
    async fn search_failure_reports_provider_error() {
        let agent = BRollAgent::new(Arc::new(MockStockApi::failing()));

        let result = agent
            .process(b_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(FailureCode::ProviderError));
    }

    #[tokio::test]
    async fn rejects_wrong_visual_type() {
        let agent = BRollAgent::new(Arc::new(MockStockApi::with_durations(&[4.0])));

        let result = agent
            .process(a_roll_scene(), AgentContext::new(memory()))
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(FailureCode::TypeMismatch));
    }
}
