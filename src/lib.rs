//! Typed generative-AI flows for Rust.
//!
//! v0 surface:
//! - `Client` handle with `generate`, `generate_stream`, and schema-constrained
//!   `generate_object`, plus a bounded tool-dispatch loop
//! - Demo flows: weather, recipe, explanation, image explanation, model list
//! - Provider adapters: `GoogleModel` and `OpenAiCompatModel`, with a
//!   `ModelRegistry` for multi-provider setups

pub mod client;
pub mod error;
pub mod flows;
pub mod llm;
pub mod tools;

pub use client::{
    Client, ClientBuilder, ClientConfig, GenerateOptions, GenerateResult, GenerationEvent,
};
pub use error::{FlowError, GenerateError, ProviderError, SchemaError, ToolError};
pub use llm::{
    GenerativeModel, GoogleModel, GoogleModelConfig, MediaPart, ModelInfo, ModelRegistry,
    OpenAiCompatModel, OpenAiCompatModelConfig,
};
pub use tools::{Condition, ToolSpec, WeatherReport, current_weather};
