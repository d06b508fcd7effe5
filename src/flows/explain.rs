use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::client::{Client, GenerateOptions};
use crate::error::FlowError;
use crate::llm::MediaPart;

const DEFAULT_EXPLAIN_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_TOPIC: &str = "how large language models turn a prompt into text";

const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_URL: &str =
    "https://storage.googleapis.com/cloud-samples-data/generative-ai/image/scones.jpg";
const DEFAULT_QUESTION: &str = "What is shown in this image?";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplainRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Model variant to run against; the flow picks a default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplainResponse {
    pub model: String,
    pub explanation: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageExplainRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageExplainResponse {
    pub description: String,
}

/// One generation call against a named model variant, default prompt when
/// none is supplied.
pub async fn run_explain(
    client: &Client,
    request: ExplainRequest,
) -> Result<ExplainResponse, FlowError> {
    let model = request
        .model
        .unwrap_or_else(|| DEFAULT_EXPLAIN_MODEL.to_string());
    let topic = request.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    tracing::info!(target: "flow_sdk::flows", %model, %topic, "explain flow start");

    let prompt =
        format!("Explain {topic} in two or three plain sentences for a curious beginner.");

    let result = client
        .generate(prompt, GenerateOptions::new().with_model(model.clone()))
        .await?;

    Ok(ExplainResponse {
        model,
        explanation: result.text.unwrap_or_default(),
    })
}

/// One generation call whose prompt carries a media part, against a
/// vision-capable model variant.
pub async fn run_image_explain(
    client: &Client,
    request: ImageExplainRequest,
) -> Result<ImageExplainResponse, FlowError> {
    let image_url = request
        .image_url
        .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string());
    let question = request
        .question
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string());

    tracing::info!(target: "flow_sdk::flows", %image_url, "image explain flow start");

    let mut media = MediaPart::new(image_url.clone());
    if let Some(mime) = guess_image_mime(&image_url) {
        media = media.with_content_type(mime);
    }

    let options = GenerateOptions::new()
        .with_model(DEFAULT_IMAGE_MODEL)
        .with_media(media);

    let result = client.generate(question, options).await?;

    Ok(ImageExplainResponse {
        description: result.text.unwrap_or_default(),
    })
}

fn guess_image_mime(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit('.').next()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
