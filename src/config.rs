use std::path::PathBuf;

/// Runtime configuration, read once at startup. Optional keys disable the
/// corresponding integration rather than failing the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub pexels_api_key: Option<String>,
    pub heygen_api_key: Option<String>,
    pub render_service_url: Option<String>,
    pub tick_interval_secs: u64,
    pub reconcile_batch_size: u32,
    pub work_dir: PathBuf,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parsed_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: non_empty("DATABASE_URL"),
            pexels_api_key: non_empty("PEXELS_API_KEY"),
            heygen_api_key: non_empty("HEYGEN_API_KEY"),
            render_service_url: non_empty("RENDER_SERVICE_URL"),
            tick_interval_secs: parsed_or("TICK_INTERVAL_SECS", 5),
            reconcile_batch_size: parsed_or("RECONCILE_BATCH_SIZE", 20),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/sceneflow")),
        }
    }
}
