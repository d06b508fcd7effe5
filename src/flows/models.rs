use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::{FlowError, GenerateError};
use crate::llm::ModelInfo;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSupports {
    pub image: bool,
    pub embedding: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSummary {
    pub name: String,
    /// Trailing segment of the slash-delimited identifier.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub supports: ModelSupports,
}

/// Queries the backend's catalog and reshapes each entry into a summary.
/// A backend without a catalog capability fails the flow.
pub async fn run_list_models(client: &Client) -> Result<Vec<ModelSummary>, FlowError> {
    tracing::info!(target: "flow_sdk::flows", "list models flow start");

    let catalog = client.list_models().await.map_err(GenerateError::from)?;
    Ok(catalog.into_iter().map(summarize).collect())
}

/// Capability flags are a substring heuristic on the identifier: they track
/// naming conventions, not declared capabilities.
pub fn summarize(info: ModelInfo) -> ModelSummary {
    let label = info
        .name
        .rsplit('/')
        .next()
        .unwrap_or(info.name.as_str())
        .to_string();

    let lowered = info.name.to_ascii_lowercase();
    let supports = ModelSupports {
        image: lowered.contains("vision") || lowered.contains("flash"),
        embedding: lowered.contains("embedding"),
    };

    ModelSummary {
        label,
        description: info.description,
        supports,
        name: info.name,
    }
}
