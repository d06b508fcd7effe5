mod google;
mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;

pub use google::{GoogleModel, GoogleModelConfig};
pub use openai::{OpenAiCompatModel, OpenAiCompatModelConfig};

/// A media attachment on a user message, referenced by URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPart {
    pub url: String,
    pub content_type: Option<String>,
}

impl MediaPart {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelMessage {
    System(String),
    User {
        content: String,
        media: Vec<MediaPart>,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ModelToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl ModelMessage {
    /// Convenience constructor for a plain-text user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            media: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
pub struct ModelToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ModelToolChoice {
    #[default]
    Auto,
    Required,
    None,
    Tool(String),
}

/// One generation request as handed to a provider adapter.
///
/// `model` overrides the provider's default model id for this call only.
/// `output_schema` constrains the response to a JSON payload matching the
/// schema, for providers that support structured output natively.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub model: Option<String>,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ModelToolDefinition>,
    pub tool_choice: ModelToolChoice,
    pub output_schema: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCompletion {
    pub text: Option<String>,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: Option<ModelUsage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One entry of a provider's model catalog, as returned by the remote API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelCompletion, ProviderError>;

    /// Lists the provider's model catalog. Providers without a catalog
    /// endpoint keep the default and surface the gap to the caller.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Err(ProviderError::Unsupported("model catalog listing"))
    }
}

/// Name-to-provider mapping for setups with more than one backend.
///
/// Lookup is a single level: a registered name resolves directly to a shared
/// provider handle.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    providers: HashMap<String, Arc<dyn GenerativeModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn GenerativeModel>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerativeModel>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.providers.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCatalogModel;

    #[async_trait]
    impl GenerativeModel for NoCatalogModel {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelCompletion, ProviderError> {
            Ok(ModelCompletion::default())
        }
    }

    #[tokio::test]
    async fn list_models_default_reports_unsupported() {
        let err = NoCatalogModel
            .list_models()
            .await
            .expect_err("default must fail");

        assert!(matches!(err, ProviderError::Unsupported(_)));
        assert!(err.to_string().contains("catalog"));
    }

    #[test]
    fn registry_resolves_registered_names() {
        let mut registry = ModelRegistry::new();
        registry.register("stub", Arc::new(NoCatalogModel));

        assert!(registry.get("stub").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["stub".to_string()]);
    }
}
