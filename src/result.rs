// The outcome contract every agent invocation reports back through.

use serde::{Deserialize, Serialize};

use crate::model::VisualPayload;

/// Machine-readable failure codes. The paused/completed/in-flight codes mark
/// benign no-ops, distinguishable from true failures by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    NoAgentForType,
    TypeMismatch,
    AgentException,
    WorkflowPaused,
    WorkflowCompleted,
    SceneInFlight,
    ProviderError,
    NoSearchResults,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::NoAgentForType => "NO_AGENT_FOR_TYPE",
            FailureCode::TypeMismatch => "TYPE_MISMATCH",
            FailureCode::AgentException => "AGENT_EXCEPTION",
            FailureCode::WorkflowPaused => "WORKFLOW_PAUSED",
            FailureCode::WorkflowCompleted => "WORKFLOW_COMPLETED",
            FailureCode::SceneInFlight => "SCENE_IN_FLIGHT",
            FailureCode::ProviderError => "PROVIDER_ERROR",
            FailureCode::NoSearchResults => "NO_SEARCH_RESULTS",
        }
    }

    /// True for outcomes that report "nothing to do right now" rather than a
    /// failed piece of work.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            FailureCode::WorkflowPaused | FailureCode::WorkflowCompleted | FailureCode::SceneInFlight
        )
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted render job, referenced for later reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJobRef {
    pub provider: String,
    pub job_id: String,
}

/// What an agent learned about the scene's asset: the refreshed payload and,
/// for asynchronous providers, the job handle to poll. Travels under the
/// `"asset"` key of [`AgentResult::data`]; the store commit, not the agent,
/// writes scene rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdate {
    pub payload: VisualPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<RenderJobRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    /// User-facing summary of what happened.
    pub message: String,
    /// Detailed trace, preferred over `message` for the workflow log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCode>,
    /// Agent-specific payload, e.g. job identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AgentResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            log: None,
            error: None,
            data: None,
        }
    }

    pub fn failure(error: FailureCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            log: None,
            error: Some(error),
            data: None,
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach the asset outcome under the well-known `"asset"` data key,
    /// preserving any other data fields already present.
    pub fn with_asset(mut self, update: &AssetUpdate) -> Self {
        let mut map = match self.data.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Ok(value) = serde_json::to_value(update) {
            map.insert("asset".to_string(), value);
        }
        self.data = Some(serde_json::Value::Object(map));
        self
    }

    pub fn asset_update(&self) -> Option<AssetUpdate> {
        let value = self.data.as_ref()?.get("asset")?;
        serde_json::from_value(value.clone()).ok()
    }

    /// The line the workflow log keeps: the detailed trace when present,
    /// otherwise the summary.
    pub fn log_line(&self) -> &str {
        self.log.as_deref().unwrap_or(&self.message)
    }
}
