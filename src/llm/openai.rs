use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ProviderError;
use crate::llm::{
    GenerativeModel, ModelCompletion, ModelInfo, ModelMessage, ModelRequest, ModelToolCall,
    ModelToolChoice, ModelUsage,
};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const EMPTY_USER_CONTENT_FALLBACK: &str = " ";

#[derive(Debug, Clone)]
pub struct OpenAiCompatModelConfig {
    pub api_key: String,
    /// Default model id, overridable per call.
    pub model: String,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAiCompatModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            temperature: None,
            top_p: None,
            max_tokens: Some(4096),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone)]
/// Adapter for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatModel {
    client: Client,
    config: OpenAiCompatModelConfig,
}

impl OpenAiCompatModel {
    pub fn new(config: OpenAiCompatModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Creates an adapter using `OPENAI_API_KEY` from the environment.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Request("OPENAI_API_KEY is not set".to_string()))?;

        Self::new(OpenAiCompatModelConfig::new(api_key, model))
    }

    fn base_url(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url())
    }

    fn models_endpoint(&self) -> String {
        format!("{}/models", self.base_url())
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelCompletion, ProviderError> {
        let payload = build_request(&request, &self.config);

        tracing::debug!(target: "flow_sdk::openai", model = %payload.model, "chat completion request");

        let response = self
            .client
            .post(self.chat_endpoint())
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(extract_api_error(response).await));
        }

        let payload = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(self.models_endpoint())
            .header("authorization", format!("Bearer {}", self.config.api_key))
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

        Ok(payload
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                name: entry.id,
                display_name: None,
                description: None,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinitionPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum RequestMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCallPayload>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPayload },
}

#[derive(Debug, Serialize)]
struct ImageUrlPayload {
    url: String,
}

#[derive(Debug, Serialize)]
struct ToolDefinitionPayload {
    #[serde(rename = "type")]
    type_: String,
    function: ToolFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct ToolFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ToolChoicePayload {
    Mode(String),
    Specific {
        #[serde(rename = "type")]
        type_: String,
        function: ToolChoiceFunction,
    },
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction {
    name: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormatPayload {
    #[serde(rename = "type")]
    type_: String,
    json_schema: JsonSchemaPayload,
}

#[derive(Debug, Serialize)]
struct JsonSchemaPayload {
    name: String,
    schema: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ToolCallPayload {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: ToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: Option<AssistantMessagePayload>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessagePayload {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    completion_tokens_details: Option<CompletionTokenDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokenDetails {
    reasoning_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<Value>,
}

fn build_request(
    request: &ModelRequest,
    config: &OpenAiCompatModelConfig,
) -> ChatCompletionRequest {
    let request_messages = ensure_non_empty_messages(to_request_messages(&request.messages));

    let tools_payload = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| ToolDefinitionPayload {
                    type_: "function".to_string(),
                    function: ToolFunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect::<Vec<_>>(),
        )
    };

    let tool_choice_payload = if request.tools.is_empty() {
        None
    } else {
        Some(match request.tool_choice.clone() {
            ModelToolChoice::Auto => ToolChoicePayload::Mode("auto".to_string()),
            ModelToolChoice::Required => ToolChoicePayload::Mode("required".to_string()),
            ModelToolChoice::None => ToolChoicePayload::Mode("none".to_string()),
            ModelToolChoice::Tool(name) => ToolChoicePayload::Specific {
                type_: "function".to_string(),
                function: ToolChoiceFunction { name },
            },
        })
    };

    let response_format = request
        .output_schema
        .as_ref()
        .map(|schema| ResponseFormatPayload {
            type_: "json_schema".to_string(),
            json_schema: JsonSchemaPayload {
                name: "response".to_string(),
                schema: schema.clone(),
            },
        });

    ChatCompletionRequest {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| config.model.clone()),
        messages: request_messages,
        tools: tools_payload,
        tool_choice: tool_choice_payload,
        response_format,
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_tokens,
    }
}

fn to_request_messages(messages: &[ModelMessage]) -> Vec<RequestMessage> {
    let mut request_messages = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(content) => {
                if content.is_empty() {
                    continue;
                }
                request_messages.push(RequestMessage::System {
                    content: content.clone(),
                });
            }
            ModelMessage::User { content, media } => {
                if content.is_empty() && media.is_empty() {
                    continue;
                }
                request_messages.push(RequestMessage::User {
                    content: to_user_content(content, media),
                });
            }
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let serialized_tool_calls = tool_calls
                    .iter()
                    .map(|tool_call| ToolCallPayload {
                        id: tool_call.id.clone(),
                        type_: "function".to_string(),
                        function: ToolCallFunction {
                            name: tool_call.name.clone(),
                            arguments: tool_call.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>();

                let assistant_content = content.as_ref().filter(|text| !text.is_empty()).cloned();
                if assistant_content.is_none() && serialized_tool_calls.is_empty() {
                    continue;
                }

                request_messages.push(RequestMessage::Assistant {
                    content: assistant_content,
                    tool_calls: if serialized_tool_calls.is_empty() {
                        None
                    } else {
                        Some(serialized_tool_calls)
                    },
                });
            }
            ModelMessage::ToolResult {
                tool_call_id,
                tool_name: _,
                content,
                is_error,
            } => {
                let rendered = if *is_error {
                    format!("Error: {content}")
                } else {
                    content.clone()
                };

                request_messages.push(RequestMessage::Tool {
                    tool_call_id: tool_call_id.clone(),
                    content: rendered,
                });
            }
        }
    }

    request_messages
}

fn to_user_content(content: &str, media: &[crate::llm::MediaPart]) -> UserContent {
    if media.is_empty() {
        return UserContent::Text(content.to_string());
    }

    let mut parts = Vec::new();
    if !content.is_empty() {
        parts.push(ContentPart::Text {
            text: content.to_string(),
        });
    }
    for part in media {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrlPayload {
                url: part.url.clone(),
            },
        });
    }

    UserContent::Parts(parts)
}

fn ensure_non_empty_messages(mut messages: Vec<RequestMessage>) -> Vec<RequestMessage> {
    if messages.is_empty() {
        messages.push(RequestMessage::User {
            content: UserContent::Text(EMPTY_USER_CONTENT_FALLBACK.to_string()),
        });
    }

    messages
}

fn normalize_response(response: ChatCompletionResponse) -> Result<ModelCompletion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("openai response missing choices".to_string()))?;

    let message = choice.message.ok_or_else(|| {
        ProviderError::Response("openai response missing choice message".to_string())
    })?;

    let mut tool_calls = Vec::new();
    for tool_call in message.tool_calls {
        let arguments = if tool_call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str::<Value>(&tool_call.function.arguments).map_err(|err| {
                ProviderError::Response(format!(
                    "openai tool call arguments for '{}' are not valid JSON: {err}",
                    tool_call.function.name
                ))
            })?
        };

        tool_calls.push(ModelToolCall {
            id: tool_call.id,
            name: tool_call.function.name,
            arguments,
        });
    }

    let usage = response.usage.map(|usage| ModelUsage {
        input_tokens: usage.prompt_tokens.unwrap_or(0),
        output_tokens: usage.completion_tokens.unwrap_or(0).saturating_add(
            usage
                .completion_tokens_details
                .and_then(|details| details.reasoning_tokens)
                .unwrap_or(0),
        ),
    });

    Ok(ModelCompletion {
        text: message.content.filter(|text| !text.is_empty()),
        thinking: message.reasoning_content.filter(|text| !text.is_empty()),
        tool_calls,
        usage,
    })
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = parsed
            .error
            .code
            .map(|value| match value {
                Value::String(value) => value,
                other => other.to_string(),
            })
            .unwrap_or_else(|| status.as_u16().to_string());
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown openai api error".to_string());

        return format!("openai api error {code} {error_type}: {message}");
    }

    if body.is_empty() {
        format!("openai api request failed ({status})")
    } else {
        format!("openai api request failed ({status}): {body}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::{MediaPart, ModelToolDefinition};

    fn tool_definition() -> ModelToolDefinition {
        ModelToolDefinition {
            name: "current_weather".to_string(),
            description: "Get the current weather for a location".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"}
                },
                "required": ["location"],
                "additionalProperties": false
            }),
        }
    }

    #[test]
    fn build_request_serializes_messages_tools_and_tool_choice() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a cheerful forecaster".to_string()),
                ModelMessage::user("How is the weather in Lisbon?"),
                ModelMessage::Assistant {
                    content: Some("Checking the weather".to_string()),
                    tool_calls: vec![ModelToolCall {
                        id: "call_1".to_string(),
                        name: "current_weather".to_string(),
                        arguments: json!({"location": "Lisbon"}),
                    }],
                },
                ModelMessage::ToolResult {
                    tool_call_id: "call_1".to_string(),
                    tool_name: "current_weather".to_string(),
                    content: "{\"temperature\":63.0}".to_string(),
                    is_error: false,
                },
            ],
            tools: vec![tool_definition()],
            tool_choice: ModelToolChoice::Tool("current_weather".to_string()),
            ..ModelRequest::default()
        };

        let mut config = OpenAiCompatModelConfig::new("key", "gpt-4.1-mini");
        config.temperature = Some(0.2);
        config.max_tokens = Some(512);

        let value = serde_json::to_value(build_request(&request, &config)).expect("serializes");

        assert_eq!(value["model"], "gpt-4.1-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "How is the weather in Lisbon?");
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["name"],
            "current_weather"
        );
        assert_eq!(value["messages"][3]["role"], "tool");
        assert_eq!(value["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(value["tools"][0]["function"]["name"], "current_weather");
        assert_eq!(value["tool_choice"]["type"], "function");
        assert_eq!(value["max_tokens"], 512);
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn build_request_uses_model_override_and_response_format() {
        let request = ModelRequest {
            model: Some("gpt-4.1".to_string()),
            messages: vec![ModelMessage::user("Generate a recipe")],
            output_schema: Some(json!({
                "type": "object",
                "properties": {"title": {"type": "string"}},
                "required": ["title"]
            })),
            ..ModelRequest::default()
        };

        let config = OpenAiCompatModelConfig::new("key", "gpt-4.1-mini");
        let value = serde_json::to_value(build_request(&request, &config)).expect("serializes");

        assert_eq!(value["model"], "gpt-4.1");
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(
            value["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
    }

    #[test]
    fn build_request_maps_media_to_image_url_parts() {
        let request = ModelRequest {
            messages: vec![ModelMessage::User {
                content: "Describe this image".to_string(),
                media: vec![MediaPart::new("https://example.com/scones.jpg")],
            }],
            ..ModelRequest::default()
        };

        let config = OpenAiCompatModelConfig::new("key", "gpt-4.1-mini");
        let value = serde_json::to_value(build_request(&request, &config)).expect("serializes");

        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(
            value["messages"][0]["content"][1]["image_url"]["url"],
            "https://example.com/scones.jpg"
        );
    }

    #[test]
    fn build_request_adds_fallback_content_for_empty_user_message() {
        let request = ModelRequest {
            messages: vec![ModelMessage::user("")],
            ..ModelRequest::default()
        };
        let config = OpenAiCompatModelConfig::new("key", "gpt-4.1-mini");

        let value = serde_json::to_value(build_request(&request, &config)).expect("serializes");

        assert_eq!(
            value["messages"].as_array().map(|values| values.len()),
            Some(1)
        );
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], " ");
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn normalize_response_extracts_text_thinking_tool_calls_and_usage() {
        let response = ChatCompletionResponse {
            choices: vec![ResponseChoice {
                message: Some(AssistantMessagePayload {
                    content: Some("answer".to_string()),
                    tool_calls: vec![ToolCallPayload {
                        id: "call_x".to_string(),
                        type_: "function".to_string(),
                        function: ToolCallFunction {
                            name: "current_weather".to_string(),
                            arguments: "{\"location\":\"Lisbon\"}".to_string(),
                        },
                    }],
                    reasoning_content: Some("reasoning".to_string()),
                }),
            }],
            usage: Some(UsagePayload {
                prompt_tokens: Some(11),
                completion_tokens: Some(7),
                completion_tokens_details: Some(CompletionTokenDetails {
                    reasoning_tokens: Some(3),
                }),
            }),
        };

        let completion = normalize_response(response).expect("response normalizes");

        assert_eq!(completion.text.as_deref(), Some("answer"));
        assert_eq!(completion.thinking.as_deref(), Some("reasoning"));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "call_x");
        assert_eq!(
            completion.usage,
            Some(ModelUsage {
                input_tokens: 11,
                output_tokens: 10,
            })
        );
    }

    #[test]
    fn normalize_response_fails_on_invalid_tool_arguments() {
        let err = normalize_response(ChatCompletionResponse {
            choices: vec![ResponseChoice {
                message: Some(AssistantMessagePayload {
                    content: None,
                    tool_calls: vec![ToolCallPayload {
                        id: "call_x".to_string(),
                        type_: "function".to_string(),
                        function: ToolCallFunction {
                            name: "current_weather".to_string(),
                            arguments: "{not json}".to_string(),
                        },
                    }],
                    reasoning_content: None,
                }),
            }],
            usage: None,
        })
        .expect_err("should fail");

        match err {
            ProviderError::Response(message) => {
                assert!(message.contains("not valid JSON"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn list_models_response_maps_catalog_entries() {
        let payload = json!({
            "object": "list",
            "data": [
                {"id": "gpt-4.1-mini", "object": "model", "owned_by": "openai"},
                {"id": "gpt-4.1", "object": "model", "owned_by": "openai"}
            ]
        });

        let parsed = serde_json::from_value::<ListModelsResponse>(payload).expect("parses");
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].id, "gpt-4.1-mini");
    }
}
