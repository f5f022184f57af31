// End-to-end workflow coverage over the in-memory store: scripted agents
// drive the orchestrator through dispatch, failure containment, controls,
// and the retry path, asserting on the durable state after each tick.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use sceneflow::agents::{AgentContext, AgentRegistry, SceneAgent};
use sceneflow::memory::WorkflowStatus;
use sceneflow::model::{
    ARollFit, ARollVisual, AssetStatus, BRollFit, BRollVisual, ImageFit, ImageVisual, Project,
    Scene, SceneStatus, Storyboard, Transition, VisualPayload, VisualType,
};
use sceneflow::orchestrator::{Orchestrator, OrchestratorError};
use sceneflow::result::{AgentResult, AssetUpdate, FailureCode, RenderJobRef};
use sceneflow::store::{MemoryWorkflowStore, RenderJobState, StoreError, WorkflowStore};

fn a_roll_payload() -> VisualPayload {
    VisualPayload::ARoll(ARollVisual {
        provider: "heygen".to_string(),
        source_url: None,
        asset_status: AssetStatus::PendingGeneration,
        fitting_required: true,
        fitting_strategy: ARollFit::GenerateToDuration,
        avatar_id: "anna".to_string(),
        emotion: "friendly".to_string(),
        camera_angle: "front".to_string(),
    })
}

fn b_roll_payload() -> VisualPayload {
    VisualPayload::BRoll(BRollVisual {
        provider: "pexels".to_string(),
        source_url: None,
        asset_status: AssetStatus::PendingGeneration,
        fitting_required: true,
        fitting_strategy: BRollFit::None,
        search_query: "city skyline at dusk".to_string(),
        video_id: None,
        source_duration: None,
        target_duration: 4.0,
        speed_factor: None,
        trim_start: None,
        trim_end: None,
    })
}

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

fn board_of(payloads: Vec<VisualPayload>, metadata: Option<serde_json::Value>) -> Storyboard {
    let project = Project::new("Integration board");
    let scenes: Vec<Scene> = payloads
        .into_iter()
        .enumerate()
        .map(|(i, visual)| {
            Scene::new(
                project.id,
                (i + 1) as u32,
                i as f64 * 4.0,
                (i + 1) as f64 * 4.0,
                format!("Scene {} narration", i + 1),
                visual,
                Transition::cut(),
            )
            .unwrap()
        })
        .collect();
    Storyboard::new(project, scenes, metadata).unwrap()
}

async fn ingest(
    store: &MemoryWorkflowStore,
    payloads: Vec<VisualPayload>,
    metadata: Option<serde_json::Value>,
) -> (Uuid, Vec<Uuid>) {
    let board = board_of(payloads, metadata);
    let project_id = board.project.id;
    let scene_ids = board.scenes.iter().map(|s| s.id).collect();
    store.ingest_storyboard(&board).await.unwrap();
    (project_id, scene_ids)
}

enum Behavior {
    Succeed,
    SucceedWithAsset,
    Fail(FailureCode),
    FailThenSucceed(AtomicU32),
    Panic,
    Gated {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// A per-visual-type agent with a scripted outcome. Records every call
/// (scene index plus the voiceover ref it saw) for assertions.
struct ScriptedAgent {
    agent_name: &'static str,
    visual_type: VisualType,
    behavior: Behavior,
    calls: Arc<Mutex<Vec<(u32, Option<String>)>>>,
}

impl ScriptedAgent {
    fn new(visual_type: VisualType, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            agent_name: "ScriptedAgent",
            visual_type,
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn recorded_indexes(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|(i, _)| *i).collect()
    }
}

#[async_trait]
impl SceneAgent for ScriptedAgent {
    fn name(&self) -> &str {
        self.agent_name
    }

    fn role(&self) -> &str {
        "scripted test agent"
    }

    fn visual_type(&self) -> VisualType {
        self.visual_type
    }

    async fn process(&self, scene: Scene, ctx: AgentContext) -> AgentResult {
        self.calls
            .lock()
            .unwrap()
            .push((scene.index, ctx.voiceover_ref().map(str::to_string)));

        match &self.behavior {
            Behavior::Succeed => AgentResult::success(format!("Scene {} produced", scene.index)),
            Behavior::SucceedWithAsset => {
                let mut payload = scene.visual.clone();
                payload.set_source_url(Some("https://cdn.example.com/a.mp4".to_string()));
                let update = AssetUpdate {
                    payload,
                    job: Some(RenderJobRef {
                        provider: "heygen".to_string(),
                        job_id: "vid_9".to_string(),
                    }),
                };
                AgentResult::success("Render job submitted").with_asset(&update)
            }
            Behavior::Fail(code) => AgentResult::failure(*code, "scripted failure")
                .with_log(format!("Scene {}: scripted failure", scene.index)),
            Behavior::FailThenSucceed(counter) => {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    AgentResult::failure(FailureCode::ProviderError, "first attempt fails")
                } else {
                    AgentResult::success(format!("Scene {} produced on retry", scene.index))
                }
            }
            Behavior::Panic => panic!("scripted agent panic"),
            Behavior::Gated { entered, release } => {
                entered.notify_one();
                release.notified().await;
                AgentResult::success("released")
            }
        }
    }
}

fn orchestrator_with(
    store: Arc<MemoryWorkflowStore>,
    agents: Vec<Arc<ScriptedAgent>>,
) -> Orchestrator {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        registry.register(agent);
    }
    Orchestrator::new(store, Arc::new(registry))
}

#[tokio::test]
async fn mixed_board_dispatches_only_routable_scenes() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) =
        ingest(&store, vec![a_roll_payload(), b_roll_payload()], None).await;

    // Only the a-roll type has an agent; the b-roll scene is unroutable.
    let a_roll = ScriptedAgent::new(VisualType::ARoll, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![a_roll.clone()]);

    let first = orchestrator.advance(project_id).await.unwrap();
    let dispatched = first.scene.expect("first tick should dispatch scene 1");
    assert_eq!(dispatched.index, 1);
    assert_eq!(dispatched.visual_type, VisualType::ARoll);
    assert!(first.result.success);

    let second = orchestrator.advance(project_id).await.unwrap();
    assert!(second.scene.is_none());
    assert_eq!(second.result.error, Some(FailureCode::NoAgentForType));
    assert!(!second.result.error.unwrap().is_benign());

    // The unroutable scene stays todo and nothing was committed for it.
    let b_roll_scene = store.scene(scene_ids[1]).await.unwrap();
    assert_eq!(b_roll_scene.status, SceneStatus::Todo);
    let memory = store.project_memory(project_id).await.unwrap();
    assert_eq!(memory.completed_count, 1);
    assert_eq!(memory.failed_count, 0);

    // A later tick hits the same no-op without mutating the store.
    let revision_before = memory.revision;
    orchestrator.advance(project_id).await.unwrap();
    let memory_after = store.project_memory(project_id).await.unwrap();
    assert_eq!(memory_after.revision, revision_before);
    assert_eq!(a_roll.recorded_indexes(), vec![1]);
}

#[tokio::test]
async fn exhausted_counters_complete_the_workflow_exactly_once() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) = ingest(&store, vec![image_payload()], None).await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image]);

    let dispatch = orchestrator.advance(project_id).await.unwrap();
    assert!(dispatch.scene.is_some());
    assert_eq!(dispatch.workflow_status, WorkflowStatus::Running);

    // Counters are now exhausted; this tick performs the completion
    // transition without touching any scene.
    let completion = orchestrator.advance(project_id).await.unwrap();
    assert!(completion.scene.is_none());
    assert!(completion.result.success);
    assert_eq!(completion.workflow_status, WorkflowStatus::Completed);

    let revision_at_completion = store.project_memory(project_id).await.unwrap().revision;

    // Further ticks are benign no-ops that leave the store untouched.
    let noop = orchestrator.advance(project_id).await.unwrap();
    assert_eq!(noop.result.error, Some(FailureCode::WorkflowCompleted));
    assert!(noop.result.error.unwrap().is_benign());
    assert_eq!(
        store.project_memory(project_id).await.unwrap().revision,
        revision_at_completion
    );
    assert_eq!(
        store.scene(scene_ids[0]).await.unwrap().status,
        SceneStatus::Done
    );
}

#[tokio::test]
async fn agent_panic_is_contained_and_recorded() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) = ingest(&store, vec![image_payload()], None).await;

    let panicking = ScriptedAgent::new(VisualType::Image, Behavior::Panic);
    let orchestrator = orchestrator_with(store.clone(), vec![panicking]);

    // The panic must not escape the tick.
    let outcome = orchestrator.advance(project_id).await.unwrap();
    assert!(outcome.scene.is_some());
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.error, Some(FailureCode::AgentException));

    let scene = store.scene(scene_ids[0]).await.unwrap();
    assert_eq!(scene.status, SceneStatus::Failed);

    let memory = store.project_memory(project_id).await.unwrap();
    assert_eq!(memory.failed_count, 1);
    assert!(memory.last_log.contains("AGENT_EXCEPTION"));
    assert!(memory.last_log.contains("Scene 1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_ticks_dispatch_a_scene_at_most_once() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(&store, vec![image_payload()], None).await;

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gated = ScriptedAgent::new(
        VisualType::Image,
        Behavior::Gated {
            entered: entered.clone(),
            release: release.clone(),
        },
    );
    let orchestrator = Arc::new(orchestrator_with(store.clone(), vec![gated.clone()]));

    let winner_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.advance(project_id).await })
    };

    // Wait until the first tick is inside the agent, then race a second one.
    entered.notified().await;
    let loser = orchestrator.advance(project_id).await.unwrap();
    assert!(loser.scene.is_none());
    assert_eq!(loser.result.error, Some(FailureCode::SceneInFlight));
    assert!(loser.result.error.unwrap().is_benign());

    release.notify_one();
    let winner = winner_handle.await.unwrap().unwrap();
    assert!(winner.scene.is_some());
    assert!(winner.result.success);

    // Exactly one dispatch reached the agent.
    assert_eq!(gated.recorded_indexes(), vec![1]);
    let memory = store.project_memory(project_id).await.unwrap();
    assert_eq!(memory.completed_count, 1);
}

#[tokio::test]
async fn scenes_are_dispatched_in_index_order() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(
        &store,
        vec![image_payload(), image_payload(), image_payload()],
        None,
    )
    .await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image.clone()]);

    let report = orchestrator.run_to_completion(project_id, 10).await.unwrap();
    assert_eq!(report.completed, 3);
    assert_eq!(image.recorded_indexes(), vec![1, 2, 3]);
}

#[tokio::test]
async fn paused_workflow_blocks_dispatch_until_resumed() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) =
        ingest(&store, vec![image_payload(), image_payload()], None).await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image]);

    orchestrator.advance(project_id).await.unwrap();
    let paused = orchestrator.pause(project_id).await.unwrap();
    assert_eq!(paused.workflow_status, WorkflowStatus::Paused);

    // Dispatch is suspended; the remaining scene is untouched.
    let blocked = orchestrator.advance(project_id).await.unwrap();
    assert!(blocked.scene.is_none());
    assert_eq!(blocked.result.error, Some(FailureCode::WorkflowPaused));
    assert_eq!(
        store.scene(scene_ids[1]).await.unwrap().status,
        SceneStatus::Todo
    );

    let resumed = orchestrator.resume(project_id).await.unwrap();
    assert_eq!(resumed.workflow_status, WorkflowStatus::Running);

    let next = orchestrator.advance(project_id).await.unwrap();
    assert_eq!(next.scene.unwrap().index, 2);
}

#[tokio::test]
async fn invalid_controls_are_rejected() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(&store, vec![image_payload()], None).await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image]);

    // Resuming a workflow that is not paused is rejected.
    let err = orchestrator.resume(project_id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidControl {
            from: WorkflowStatus::Idle,
            to: WorkflowStatus::Running,
        }
    ));

    orchestrator.run_to_completion(project_id, 5).await.unwrap();

    // So is pausing a completed one.
    let err = orchestrator.pause(project_id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidControl {
            from: WorkflowStatus::Completed,
            to: WorkflowStatus::Paused,
        }
    ));
}

#[tokio::test]
async fn requeued_scene_reopens_a_completed_workflow() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) = ingest(&store, vec![image_payload()], None).await;

    let flaky = ScriptedAgent::new(
        VisualType::Image,
        Behavior::FailThenSucceed(AtomicU32::new(0)),
    );
    let orchestrator = orchestrator_with(store.clone(), vec![flaky]);

    let first_run = orchestrator.run_to_completion(project_id, 5).await.unwrap();
    assert_eq!(first_run.failed, 1);
    assert_eq!(first_run.completed, 0);
    assert_eq!(first_run.final_status, WorkflowStatus::Completed);

    // Requeue puts the scene back in the queue, shrinks the settled sum, and
    // reopens the workflow.
    let reopened = orchestrator
        .requeue_scene(project_id, scene_ids[0])
        .await
        .unwrap();
    assert_eq!(reopened.workflow_status, WorkflowStatus::Running);
    assert_eq!(reopened.failed_count, 0);
    assert_eq!(
        store.scene(scene_ids[0]).await.unwrap().status,
        SceneStatus::Todo
    );

    let second_run = orchestrator.run_to_completion(project_id, 5).await.unwrap();
    assert_eq!(second_run.completed, 1);
    assert_eq!(second_run.failed, 0);

    let memory = store.project_memory(project_id).await.unwrap();
    assert_eq!(memory.completed_count, 1);
    assert_eq!(memory.failed_count, 0);
    assert_eq!(memory.workflow_status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn requeueing_a_non_failed_scene_is_rejected() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) = ingest(&store, vec![image_payload()], None).await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image]);

    // Scene is still todo.
    let err = orchestrator
        .requeue_scene(project_id, scene_ids[0])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Store(StoreError::UnexpectedSceneStatus { .. })
    ));
}

#[tokio::test]
async fn run_to_completion_reports_the_drive() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(
        &store,
        vec![image_payload(), a_roll_payload(), image_payload()],
        None,
    )
    .await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let a_roll = ScriptedAgent::new(
        VisualType::ARoll,
        Behavior::Fail(FailureCode::ProviderError),
    );
    let orchestrator = orchestrator_with(store.clone(), vec![image, a_roll]);

    let report = orchestrator.run_to_completion(project_id, 10).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    // Three dispatches plus the completion tick.
    assert_eq!(report.ticks, 4);
    assert_eq!(report.final_status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn unroutable_scene_exhausts_the_tick_budget() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(&store, vec![b_roll_payload()], None).await;

    // No agent registered at all.
    let orchestrator = orchestrator_with(store.clone(), vec![]);

    let err = orchestrator
        .run_to_completion(project_id, 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::TickBudgetExhausted { max_ticks: 3, .. }
    ));
}

#[tokio::test]
async fn done_commit_applies_the_asset_update() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, scene_ids) = ingest(&store, vec![a_roll_payload()], None).await;

    let submitting = ScriptedAgent::new(VisualType::ARoll, Behavior::SucceedWithAsset);
    let orchestrator = orchestrator_with(store.clone(), vec![submitting]);

    orchestrator.advance(project_id).await.unwrap();

    // Payload refresh and render-job handle land in the same commit as the
    // scene status.
    let scene = store.scene(scene_ids[0]).await.unwrap();
    assert_eq!(scene.status, SceneStatus::Done);
    assert_eq!(
        scene.visual.source_url(),
        Some("https://cdn.example.com/a.mp4")
    );

    let handles = store.open_render_jobs(10).await.unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].scene_id, scene_ids[0]);
    assert_eq!(handles[0].project_id, project_id);
    assert_eq!(handles[0].provider, "heygen");
    assert_eq!(handles[0].job_id, "vid_9");
    assert_eq!(handles[0].state, RenderJobState::Submitted);
}

#[tokio::test]
async fn settled_counters_never_exceed_total() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(
        &store,
        vec![image_payload(), a_roll_payload(), image_payload()],
        None,
    )
    .await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let a_roll = ScriptedAgent::new(
        VisualType::ARoll,
        Behavior::Fail(FailureCode::ProviderError),
    );
    let orchestrator = orchestrator_with(store.clone(), vec![image, a_roll]);

    for _ in 0..6 {
        orchestrator.advance(project_id).await.unwrap();
        let memory = store.project_memory(project_id).await.unwrap();
        assert!(
            memory.settled() <= memory.total_scenes,
            "settled {} exceeded total {}",
            memory.settled(),
            memory.total_scenes
        );
    }
}

#[tokio::test]
async fn agent_context_carries_the_voiceover_ref() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let (project_id, _) = ingest(
        &store,
        vec![image_payload()],
        Some(serde_json::json!({ "voiceover_ref": "s3://audio/master.wav" })),
    )
    .await;

    let image = ScriptedAgent::new(VisualType::Image, Behavior::Succeed);
    let orchestrator = orchestrator_with(store.clone(), vec![image.clone()]);

    orchestrator.advance(project_id).await.unwrap();

    let calls = image.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.as_deref(), Some("s3://audio/master.wav"));
}

#[tokio::test]
async fn advancing_an_unknown_project_is_a_store_error() {
    let store = Arc::new(MemoryWorkflowStore::new());
    let orchestrator = orchestrator_with(store, vec![]);

    let err = orchestrator.advance(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Store(StoreError::MemoryNotFound(_))
    ));
}
