use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GenerateError, ProviderError};
use crate::llm::{
    GenerativeModel, MediaPart, ModelCompletion, ModelInfo, ModelMessage, ModelRequest,
    ModelToolCall, ModelToolChoice, ModelToolDefinition, ModelUsage,
};
use crate::tools::ToolSpec;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on model/tool round trips within one generation call.
    pub max_tool_turns: u32,
    /// System prompt applied when a call does not carry its own.
    pub system_prompt: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_tool_turns: 5,
            system_prompt: None,
        }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub system: Option<String>,
    pub media: Vec<MediaPart>,
    pub output_schema: Option<Value>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_media(mut self, media: MediaPart) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// Events yielded while one generation call settles.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Thinking {
        content: String,
    },
    Text {
        content: String,
    },
    ToolCall {
        tool: String,
        args_json: Value,
        tool_call_id: String,
    },
    ToolResult {
        tool: String,
        result_text: String,
        tool_call_id: String,
        is_error: bool,
    },
    Completed {
        result: GenerateResult,
    },
}

/// The settled outcome of one generation call.
///
/// `output` is populated only when the call carried an output schema and the
/// final text parsed as JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResult {
    pub text: Option<String>,
    pub output: Option<Value>,
    pub usage: Option<ModelUsage>,
}

pub struct ClientBuilder {
    backend: Option<Arc<dyn GenerativeModel>>,
    tools: Vec<ToolSpec>,
    config: ClientConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            backend: None,
            tools: Vec::new(),
            config: ClientConfig::default(),
        }
    }
}

impl ClientBuilder {
    pub fn backend<M>(mut self, backend: M) -> Self
    where
        M: GenerativeModel + 'static,
    {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Accepts an already-shared handle, e.g. one resolved from a
    /// [`crate::llm::ModelRegistry`].
    pub fn backend_shared(mut self, backend: Arc<dyn GenerativeModel>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_tool_turns(mut self, max_tool_turns: u32) -> Self {
        self.config.max_tool_turns = max_tool_turns;
        self
    }

    pub fn build(self) -> Result<Client, GenerateError> {
        let Some(backend) = self.backend else {
            return Err(GenerateError::Config(
                "client backend must be configured via ClientBuilder::backend(...)".to_string(),
            ));
        };

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(GenerateError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        Ok(Client {
            backend,
            tools: self.tools,
            tool_map,
            config: self.config,
        })
    }
}

/// A configured handle over one generation backend plus its registered tools.
///
/// Each call is self-contained: the client holds no conversation state across
/// calls.
pub struct Client {
    backend: Arc<dyn GenerativeModel>,
    tools: Vec<ToolSpec>,
    tool_map: HashMap<String, ToolSpec>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tools", &self.tools)
            .field("tool_map", &self.tool_map)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Runs one generation call to completion and returns its settled result.
    pub async fn generate(
        &self,
        prompt: impl Into<String>,
        options: GenerateOptions,
    ) -> Result<GenerateResult, GenerateError> {
        let stream = self.generate_stream(prompt, options);
        futures_util::pin_mut!(stream);

        let mut completed: Option<GenerateResult> = None;

        while let Some(event) = stream.next().await {
            match event? {
                GenerationEvent::Completed { result } => completed = Some(result),
                GenerationEvent::Thinking { .. }
                | GenerationEvent::Text { .. }
                | GenerationEvent::ToolCall { .. }
                | GenerationEvent::ToolResult { .. } => {}
            }
        }

        completed.ok_or(GenerateError::MissingCompletion)
    }

    /// Runs one generation call constrained to the schema of `T` and
    /// deserializes the structured payload.
    pub async fn generate_object<T>(
        &self,
        prompt: impl Into<String>,
        mut options: GenerateOptions,
    ) -> Result<T, GenerateError>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|err| GenerateError::Config(format!("schema derivation failed: {err}")))?;
        options.output_schema = Some(schema);

        let result = self.generate(prompt, options).await?;
        let output = result.output.ok_or_else(|| {
            GenerateError::StructuredOutput("model returned no structured output".to_string())
        })?;

        serde_json::from_value(output).map_err(|err| GenerateError::StructuredOutput(err.to_string()))
    }

    /// Passes the backend's model catalog through.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        self.backend.list_models().await
    }

    /// Streams the events of one generation call: thinking, text, tool
    /// dispatch, and finally the settled result.
    pub fn generate_stream(
        &self,
        prompt: impl Into<String>,
        options: GenerateOptions,
    ) -> impl Stream<Item = Result<GenerationEvent, GenerateError>> + '_ {
        let prompt = prompt.into();

        try_stream! {
            let mut history = Vec::new();

            if let Some(system) = options
                .system
                .clone()
                .or_else(|| self.config.system_prompt.clone())
            {
                history.push(ModelMessage::System(system));
            }

            history.push(ModelMessage::User {
                content: prompt,
                media: options.media.clone(),
            });

            // Structured output and tool dispatch are mutually exclusive on
            // the wire; a schema-constrained call never offers tools.
            let tool_definitions = if options.output_schema.is_some() {
                Vec::new()
            } else {
                self.tools
                    .iter()
                    .map(|tool| ModelToolDefinition {
                        name: tool.name().to_string(),
                        description: tool.description().to_string(),
                        parameters: tool.json_schema().clone(),
                    })
                    .collect::<Vec<_>>()
            };

            let tool_choice = if tool_definitions.is_empty() {
                ModelToolChoice::None
            } else {
                ModelToolChoice::Auto
            };

            for _ in 0..self.config.max_tool_turns {
                let completion = self
                    .backend
                    .generate(ModelRequest {
                        model: options.model.clone(),
                        messages: history.clone(),
                        tools: tool_definitions.clone(),
                        tool_choice: tool_choice.clone(),
                        output_schema: options.output_schema.clone(),
                    })
                    .await?;

                if let Some(thinking) = completion.thinking.clone() {
                    yield GenerationEvent::Thinking { content: thinking };
                }

                history.push(ModelMessage::Assistant {
                    content: completion.text.clone(),
                    tool_calls: completion.tool_calls.clone(),
                });

                if let Some(text) = completion.text.clone()
                    && !text.is_empty()
                {
                    yield GenerationEvent::Text { content: text };
                }

                if completion.tool_calls.is_empty() {
                    yield GenerationEvent::Completed {
                        result: settle(completion, options.output_schema.is_some()),
                    };
                    return;
                }

                for tool_call in completion.tool_calls {
                    yield GenerationEvent::ToolCall {
                        tool: tool_call.name.clone(),
                        args_json: tool_call.arguments.clone(),
                        tool_call_id: tool_call.id.clone(),
                    };

                    let execution = self.execute_tool_call(&tool_call).await;
                    history.push(ModelMessage::ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        content: execution.result_text.clone(),
                        is_error: execution.is_error,
                    });

                    yield GenerationEvent::ToolResult {
                        tool: tool_call.name.clone(),
                        result_text: execution.result_text,
                        tool_call_id: tool_call.id,
                        is_error: execution.is_error,
                    };
                }
            }

            Err::<(), GenerateError>(GenerateError::MaxToolTurnsReached {
                max_tool_turns: self.config.max_tool_turns,
            })?;
        }
    }

    async fn execute_tool_call(&self, tool_call: &ModelToolCall) -> ToolExecutionResult {
        let Some(tool) = self.tool_map.get(&tool_call.name) else {
            return ToolExecutionResult {
                result_text: format!("Unknown tool '{}'.", tool_call.name),
                is_error: true,
            };
        };

        tracing::debug!(
            target: "flow_sdk::client",
            tool = %tool_call.name,
            "executing tool call"
        );

        match tool.execute(tool_call.arguments.clone()).await {
            Ok(value) => ToolExecutionResult {
                result_text: value.to_string(),
                is_error: false,
            },
            Err(err) => ToolExecutionResult {
                result_text: err.to_string(),
                is_error: true,
            },
        }
    }
}

struct ToolExecutionResult {
    result_text: String,
    is_error: bool,
}

fn settle(completion: ModelCompletion, expects_output: bool) -> GenerateResult {
    let output = if expects_output {
        completion.text.as_deref().and_then(parse_structured_text)
    } else {
        None
    };

    GenerateResult {
        text: completion.text,
        output,
        usage: completion.usage,
    }
}

/// Parses the final text as a JSON payload, tolerating a markdown code fence
/// around it.
fn parse_structured_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(inner).ok()
}
