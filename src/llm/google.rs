use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ProviderError;
use crate::llm::{
    GenerativeModel, MediaPart, ModelCompletion, ModelInfo, ModelMessage, ModelRequest,
    ModelToolCall, ModelToolChoice, ModelUsage,
};

const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const LIST_MODELS_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone)]
/// Runtime configuration for [`GoogleModel`].
pub struct GoogleModelConfig {
    /// Google Generative Language API key.
    pub api_key: String,
    /// Default model id (for example `gemini-2.5-flash`), overridable per call.
    pub model: String,
    /// Optional base URL override for proxies or compatible endpoints.
    pub api_base_url: Option<String>,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
    /// Optional nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Maximum output tokens per call.
    pub max_output_tokens: Option<u32>,
}

impl GoogleModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            temperature: None,
            top_p: None,
            max_output_tokens: Some(4096),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone)]
/// Google Generative Language adapter implementing [`GenerativeModel`].
pub struct GoogleModel {
    client: Client,
    config: GoogleModelConfig,
}

impl GoogleModel {
    pub fn new(config: GoogleModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Creates an adapter using `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) from
    /// the environment.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                ProviderError::Request("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string())
            })?;

        Self::new(GoogleModelConfig::new(api_key, model))
    }

    fn base_url(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    fn generate_endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url())
    }

    fn list_models_endpoint(&self) -> String {
        format!(
            "{}/models?pageSize={LIST_MODELS_PAGE_SIZE}",
            self.base_url()
        )
    }
}

#[async_trait]
impl GenerativeModel for GoogleModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelCompletion, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        let payload = build_request(&request, &self.config);

        tracing::debug!(target: "flow_sdk::google", %model, "generateContent request");

        let response = self
            .client
            .post(self.generate_endpoint(&model))
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(extract_api_error(response).await));
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(self.list_models_endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(extract_api_error(response).await));
        }

        let payload = response
            .json::<ListModelsResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        Ok(payload.models.into_iter().map(to_model_info).collect())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GoogleTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GoogleToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GoogleContent {
    role: String,
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSystemInstruction {
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTool {
    function_declarations: Vec<GoogleFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleToolConfig {
    function_calling_config: GoogleFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleFunctionCallingConfig {
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct GooglePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<GoogleFileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GoogleFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GoogleFunctionResponse>,
}

impl GooglePart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GoogleFileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    file_uri: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GoogleFunctionCall {
    id: Option<String>,
    name: Option<String>,
    args: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GoogleFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GoogleModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModelEntry {
    name: String,
    display_name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleErrorEnvelope {
    error: GoogleApiError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
}

fn build_request(request: &ModelRequest, config: &GoogleModelConfig) -> GenerateContentRequest {
    let (contents, system_instruction) = to_google_contents(&request.messages);

    let tools_payload = if request.tools.is_empty() {
        None
    } else {
        let declarations = request
            .tools
            .iter()
            .map(|tool| GoogleFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: clean_gemini_schema(tool.parameters.clone()),
            })
            .collect::<Vec<_>>();
        Some(vec![GoogleTool {
            function_declarations: declarations,
        }])
    };

    let tool_config = if request.tools.is_empty() {
        None
    } else {
        Some(match request.tool_choice.clone() {
            ModelToolChoice::Auto => google_tool_config("AUTO", None),
            ModelToolChoice::Required => google_tool_config("ANY", None),
            ModelToolChoice::None => google_tool_config("NONE", None),
            ModelToolChoice::Tool(name) => google_tool_config("ANY", Some(vec![name])),
        })
    };

    let response_schema = request
        .output_schema
        .as_ref()
        .map(|schema| clean_gemini_schema(schema.clone()));

    let generation_config = GoogleGenerationConfig {
        temperature: config.temperature,
        top_p: config.top_p,
        max_output_tokens: config.max_output_tokens,
        response_mime_type: response_schema
            .is_some()
            .then(|| "application/json".to_string()),
        response_schema,
    };

    GenerateContentRequest {
        contents,
        system_instruction: system_instruction.map(|instruction| GoogleSystemInstruction {
            parts: vec![GooglePart::text(instruction)],
        }),
        tools: tools_payload,
        tool_config,
        generation_config: Some(generation_config),
    }
}

fn google_tool_config(mode: &str, allowed: Option<Vec<String>>) -> GoogleToolConfig {
    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode: mode.to_string(),
            allowed_function_names: allowed,
        },
    }
}

fn to_google_contents(messages: &[ModelMessage]) -> (Vec<GoogleContent>, Option<String>) {
    let mut system_lines = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(content) => {
                if !content.is_empty() {
                    system_lines.push(content.clone());
                }
            }
            ModelMessage::User { content, media } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(GooglePart::text(content.clone()));
                }
                for part in media {
                    parts.push(to_file_part(part));
                }
                if !parts.is_empty() {
                    contents.push(GoogleContent {
                        role: "user".to_string(),
                        parts,
                    });
                }
            }
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut parts = Vec::new();

                if let Some(text) = content
                    && !text.is_empty()
                {
                    parts.push(GooglePart::text(text.clone()));
                }

                for call in tool_calls {
                    parts.push(GooglePart {
                        function_call: Some(GoogleFunctionCall {
                            id: Some(call.id.clone()),
                            name: Some(call.name.clone()),
                            args: Some(call.arguments.clone()),
                        }),
                        ..GooglePart::default()
                    });
                }

                if !parts.is_empty() {
                    contents.push(GoogleContent {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
            ModelMessage::ToolResult {
                tool_call_id: _,
                tool_name,
                content,
                is_error,
            } => contents.push(GoogleContent {
                role: "user".to_string(),
                parts: vec![GooglePart {
                    function_response: Some(GoogleFunctionResponse {
                        name: tool_name.clone(),
                        response: tool_result_payload(content, *is_error),
                    }),
                    ..GooglePart::default()
                }],
            }),
        }
    }

    let system = if system_lines.is_empty() {
        None
    } else {
        Some(system_lines.join("\n\n"))
    };

    (contents, system)
}

fn to_file_part(media: &MediaPart) -> GooglePart {
    GooglePart {
        file_data: Some(GoogleFileData {
            mime_type: media.content_type.clone(),
            file_uri: media.url.clone(),
        }),
        ..GooglePart::default()
    }
}

fn tool_result_payload(content: &str, is_error: bool) -> Value {
    if is_error {
        return json!({"error": content});
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(content) {
        parsed
    } else {
        json!({"result": content})
    }
}

fn normalize_response(response: GenerateContentResponse) -> Result<ModelCompletion, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Response(
            "google response missing candidates".to_string(),
        ));
    };

    let mut text_parts = Vec::new();
    let mut thinking_parts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(content) = candidate.content {
        for (index, part) in content.parts.into_iter().enumerate() {
            if let Some(text) = part.text {
                if part.thought.unwrap_or(false) {
                    thinking_parts.push(text);
                } else {
                    text_parts.push(text);
                }
            }

            if let Some(function_call) = part.function_call {
                let Some(name) = function_call.name else {
                    return Err(ProviderError::Response(
                        "google functionCall missing name".to_string(),
                    ));
                };

                tool_calls.push(ModelToolCall {
                    id: function_call
                        .id
                        .unwrap_or_else(|| format!("call_{}", index + 1)),
                    name,
                    arguments: function_call.args.unwrap_or_else(|| json!({})),
                });
            }
        }
    }

    let usage = response.usage_metadata.map(|usage| ModelUsage {
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage
            .candidates_token_count
            .unwrap_or(0)
            .saturating_add(usage.thoughts_token_count.unwrap_or(0)),
    });

    let text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    };

    let thinking = if thinking_parts.is_empty() {
        None
    } else {
        Some(thinking_parts.join("\n"))
    };

    Ok(ModelCompletion {
        text,
        thinking,
        tool_calls,
        usage,
    })
}

fn to_model_info(entry: GoogleModelEntry) -> ModelInfo {
    ModelInfo {
        name: entry.name,
        display_name: entry.display_name,
        description: entry.description,
    }
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<GoogleErrorEnvelope>(&body) {
        let code = parsed.error.code.unwrap_or(status.as_u16());
        let status_name = parsed
            .error
            .status
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown google api error".to_string());
        return format!("google api error {code} {status_name}: {message}");
    }

    if body.is_empty() {
        format!("google api request failed ({status})")
    } else {
        format!("google api request failed ({status}): {body}")
    }
}

/// Prunes schema keywords the Gemini API rejects and inlines `$defs`
/// references, so both tool parameter schemas and response schemas derived
/// via `schemars` serialize into the accepted subset.
fn clean_gemini_schema(schema: Value) -> Value {
    let mut root = schema;
    let defs = match &mut root {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("$defs")
                .and_then(|value| match value {
                    Value::Object(defs) => Some(defs),
                    _ => None,
                })
                .unwrap_or_default()
        }
        _ => Map::new(),
    };

    let resolved = resolve_schema_refs(root, &defs);
    clean_schema_node(resolved, None)
}

fn resolve_schema_refs(value: Value, defs: &Map<String, Value>) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let ref_name = reference.rsplit('/').next().unwrap_or("");
                if let Some(definition) = defs.get(ref_name) {
                    let mut resolved = definition.clone();
                    if let Value::Object(ref mut resolved_map) = resolved {
                        for (key, value) in map {
                            if key != "$ref" {
                                resolved_map.insert(key, value);
                            }
                        }
                    }
                    return resolve_schema_refs(resolved, defs);
                }
            }

            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key, resolve_schema_refs(value, defs));
            }
            Value::Object(out)
        }
        Value::Array(values) => Value::Array(
            values
                .into_iter()
                .map(|value| resolve_schema_refs(value, defs))
                .collect(),
        ),
        other => other,
    }
}

const SUPPORTED_FORMATS: [&str; 6] = ["enum", "date-time", "int32", "int64", "float", "double"];

fn clean_schema_node(value: Value, parent_key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut cleaned = Map::new();

            for (key, value) in map {
                let is_metadata_title = key == "title" && parent_key != Some("properties");
                if key == "additionalProperties" || key == "default" || is_metadata_title {
                    continue;
                }

                // schemars stamps formats like "uint32" that the API rejects.
                let is_format_keyword = key == "format" && parent_key != Some("properties");
                if is_format_keyword
                    && !value
                        .as_str()
                        .map(|format| SUPPORTED_FORMATS.contains(&format))
                        .unwrap_or(false)
                {
                    continue;
                }

                cleaned.insert(key.clone(), clean_schema_node(value, Some(&key)));
            }

            let type_name = cleaned
                .get("type")
                .and_then(Value::as_str)
                .map(|t| t.to_ascii_lowercase());
            if type_name.as_deref() == Some("object") {
                let needs_placeholder = cleaned
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|properties| properties.is_empty())
                    .unwrap_or(false);

                if needs_placeholder {
                    cleaned.insert(
                        "properties".to_string(),
                        json!({"_placeholder": {"type": "string"}}),
                    );
                }
            }

            Value::Object(cleaned)
        }
        Value::Array(values) => Value::Array(
            values
                .into_iter()
                .map(|value| clean_schema_node(value, parent_key))
                .collect(),
        ),
        other => other,
    }
}
