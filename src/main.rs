use std::sync::Arc;
use std::time::Duration;

use sceneflow::agents::a_roll::ARollAgent;
use sceneflow::agents::b_roll::BRollAgent;
use sceneflow::agents::graphics::GraphicsAgent;
use sceneflow::agents::image::ImageAgent;
use sceneflow::agents::AgentRegistry;
use sceneflow::audio::FfmpegAudio;
use sceneflow::config::Config;
use sceneflow::heygen_client::HeyGenClient;
use sceneflow::pexels_client::PexelsClient;
use sceneflow::render_client::RenderServiceClient;
use sceneflow::store::{MemoryWorkflowStore, PgWorkflowStore, WorkflowStore};
use sceneflow::tools::AudioTool;
use sceneflow::{Orchestrator, Reconciler};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let config = Config::from_env();

    if let Err(e) = std::fs::create_dir_all(&config.work_dir) {
        tracing::warn!("Failed to create work directory: {}", e);
    } else {
        tracing::info!("Work directory ready at {}", config.work_dir.display());
    }

    // Build the workflow store. Postgres when configured, otherwise the
    // in-memory store for local runs.
    let store: Arc<dyn WorkflowStore> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL workflow store...");
            let pg = PgWorkflowStore::connect(url)
                .await
                .expect("Failed to connect to database");
            pg.setup().await.expect("Failed to set up workflow tables");
            tracing::info!("✅ Workflow store ready (PostgreSQL)");
            Arc::new(pg)
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not found. Using in-memory store; workflow state will not survive a restart."
            );
            Arc::new(MemoryWorkflowStore::new())
        }
    };

    let audio: Arc<dyn AudioTool> = Arc::new(FfmpegAudio::new(config.work_dir.clone()));

    // Register an agent only when its tool client is configured; missing
    // keys disable the corresponding visual type rather than the process.
    let mut registry = AgentRegistry::new();
    let mut reconciler = Reconciler::new(store.clone(), config.reconcile_batch_size);

    match config.pexels_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing Pexels stock media client...");
            let pexels = Arc::new(PexelsClient::new(api_key));
            registry.register(Arc::new(BRollAgent::new(pexels.clone())));
            registry.register(Arc::new(ImageAgent::new(pexels)));
        }
        None => {
            tracing::warn!("PEXELS_API_KEY not found. B-roll and image agents disabled.");
        }
    }

    match config.heygen_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing HeyGen avatar client...");
            let heygen = Arc::new(HeyGenClient::new(api_key));
            registry.register(Arc::new(ARollAgent::new(heygen.clone(), audio.clone())));
            reconciler.register_poller(heygen);
        }
        None => {
            tracing::warn!("HEYGEN_API_KEY not found. A-roll agent disabled.");
        }
    }

    match config.render_service_url.clone() {
        Some(base_url) => {
            tracing::info!("Initializing render service client ({})...", base_url);
            let renderer = Arc::new(RenderServiceClient::new(base_url));
            registry.register(Arc::new(GraphicsAgent::new(renderer.clone())));
            reconciler.register_poller(renderer);
        }
        None => {
            tracing::warn!("RENDER_SERVICE_URL not found. Graphics agent disabled.");
        }
    }

    if registry.is_empty() {
        tracing::warn!(
            "No agents registered; scenes will not be dispatched until a tool client is configured."
        );
    } else {
        tracing::info!(
            "Registered agents for visual types: {:?}",
            registry
                .registered_types()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
        );
    }

    let orchestrator = Arc::new(Orchestrator::new(store, Arc::new(registry)));

    let mut ticker = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
    tracing::info!(
        "🎬 Scene workflow runner started (tick every {}s, reconcile batch {})",
        config.tick_interval_secs,
        config.reconcile_batch_size
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&orchestrator, &reconciler).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping runner");
                break;
            }
        }
    }
}

/// One runner cycle: advance every active project by one tick, concurrently,
/// then run a reconcile pass over open render jobs.
async fn run_cycle(orchestrator: &Arc<Orchestrator>, reconciler: &Reconciler) {
    let projects = match orchestrator.store().active_projects().await {
        Ok(projects) => projects,
        Err(e) => {
            tracing::error!("❌ Failed to list active projects: {}", e);
            return;
        }
    };

    if !projects.is_empty() {
        tracing::debug!("Advancing {} active project(s)", projects.len());

        let ticks = projects.into_iter().map(|project_id| {
            let orchestrator = orchestrator.clone();
            async move { (project_id, orchestrator.advance(project_id).await) }
        });

        for (project_id, outcome) in futures::future::join_all(ticks).await {
            match outcome {
                Ok(outcome) if outcome.scene.is_some() => {
                    match orchestrator.store().project_memory(project_id).await {
                        Ok(memory) => tracing::info!("{}", memory.summary()),
                        Err(e) => {
                            tracing::warn!("Could not read memory for {}: {}", project_id, e)
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("❌ Tick failed for project {}: {}", project_id, e),
            }
        }
    }

    if reconciler.has_pollers() {
        if let Err(e) = reconciler.run_once().await {
            tracing::error!("❌ Reconcile cycle failed: {}", e);
        }
    }
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,sceneflow=trace,sqlx=info,reqwest=info,hyper=info".to_string()
        } else {
            "info,sceneflow=info,sqlx=warn,reqwest=warn,hyper=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON logging for production (easier for log aggregation)
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("🎬 SceneFlow starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );

    let db_configured = std::env::var("DATABASE_URL").is_ok();
    let pexels_configured = std::env::var("PEXELS_API_KEY").is_ok();
    let heygen_configured = std::env::var("HEYGEN_API_KEY").is_ok();
    let renderer_configured = std::env::var("RENDER_SERVICE_URL").is_ok();

    tracing::info!(
        "Configuration - Database: {}, Pexels: {}, HeyGen: {}, Renderer: {}",
        if db_configured { "✅" } else { "❌" },
        if pexels_configured { "✅" } else { "❌" },
        if heygen_configured { "✅" } else { "❌" },
        if renderer_configured { "✅" } else { "❌" }
    );

    Ok(())
}
