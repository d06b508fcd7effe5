use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
    #[error("provider does not support {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("tool turn budget exhausted ({max_tool_turns})")]
    MaxToolTurnsReached { max_tool_turns: u32 },
    #[error("generation stream ended without a completion")]
    MissingCompletion,
    #[error("structured output invalid: {0}")]
    StructuredOutput(String),
    #[error("client configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("failed to generate {0}: model returned no structured output")]
    MissingOutput(&'static str),
}
