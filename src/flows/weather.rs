use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{Client, GenerateOptions};
use crate::error::{FlowError, GenerateError, ToolError};
use crate::tools::{Condition, WeatherReport, current_weather};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherRequest {
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherResponse {
    pub location: String,
    pub temperature: f64,
    pub condition: Condition,
    pub message: String,
}

/// Executes the weather tool for the location, then asks the model for a
/// one-sentence friendly description of the report. Falls back to a templated
/// sentence when the model returns empty text.
pub async fn run_weather(
    client: &Client,
    request: WeatherRequest,
) -> Result<WeatherResponse, FlowError> {
    tracing::info!(target: "flow_sdk::flows", location = %request.location, "weather flow start");

    let tool = current_weather();
    let raw = tool
        .execute(json!({"location": request.location}))
        .await
        .map_err(GenerateError::from)?;
    let report = serde_json::from_value::<WeatherReport>(raw)
        .map_err(|err| GenerateError::from(ToolError::Execution(err.to_string())))?;

    let prompt = format!(
        "The weather in {} is currently {} at {:.0} degrees Fahrenheit. \
         In one short, friendly sentence, tell someone what their day outside will feel like.",
        request.location, report.condition, report.temperature
    );

    let result = client.generate(prompt, GenerateOptions::default()).await?;
    let message = result
        .text
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| fallback_message(&request.location, &report));

    Ok(compose_response(request, report, message))
}

/// The response carries the tool's values untouched; only `message` comes
/// from the model.
fn compose_response(
    request: WeatherRequest,
    report: WeatherReport,
    message: String,
) -> WeatherResponse {
    WeatherResponse {
        location: request.location,
        temperature: report.temperature,
        condition: report.condition,
        message,
    }
}

fn fallback_message(location: &str, report: &WeatherReport) -> String {
    format!(
        "It is {} and {:.0} degrees Fahrenheit in {} right now.",
        report.condition, report.temperature, location
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ProviderError;
    use crate::llm::{GenerativeModel, ModelCompletion, ModelRequest};

    struct ScriptedModel {
        responses: Mutex<VecDeque<ModelCompletion>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ModelCompletion>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelCompletion, ProviderError> {
            let mut guard = self.responses.lock().expect("lock poisoned");
            guard.pop_front().ok_or_else(|| {
                ProviderError::Response("scripted model exhausted responses".to_string())
            })
        }
    }

    fn client_with(responses: Vec<ModelCompletion>) -> Client {
        Client::builder()
            .backend(ScriptedModel::new(responses))
            .build()
            .expect("client builds")
    }

    #[tokio::test]
    async fn response_uses_model_text_and_stays_in_tool_ranges() {
        let client = client_with(vec![ModelCompletion {
            text: Some("A fine day to be outside!".to_string()),
            ..ModelCompletion::default()
        }]);

        let response = run_weather(
            &client,
            WeatherRequest {
                location: "Lisbon".to_string(),
            },
        )
        .await
        .expect("flow succeeds");

        assert_eq!(response.location, "Lisbon");
        assert!((50.0..80.0).contains(&response.temperature));
        assert_eq!(response.message, "A fine day to be outside!");
    }

    #[tokio::test]
    async fn empty_model_text_falls_back_to_templated_sentence() {
        let client = client_with(vec![ModelCompletion::default()]);

        let response = run_weather(
            &client,
            WeatherRequest {
                location: "Lisbon".to_string(),
            },
        )
        .await
        .expect("flow succeeds");

        assert!(response.message.contains("Lisbon"));
        assert!(response.message.contains(&response.condition.to_string()));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let client = client_with(Vec::new());

        let err = run_weather(
            &client,
            WeatherRequest {
                location: "Lisbon".to_string(),
            },
        )
        .await
        .expect_err("must fail");

        assert!(matches!(
            err,
            FlowError::Generate(GenerateError::Provider(_))
        ));
    }

    #[test]
    fn composed_response_preserves_tool_report_fields() {
        let report = WeatherReport {
            temperature: 63.0,
            condition: Condition::Cloudy,
        };

        let response = compose_response(
            WeatherRequest {
                location: "Lisbon".to_string(),
            },
            report,
            "msg".to_string(),
        );

        assert_eq!(response.temperature, report.temperature);
        assert_eq!(response.condition, report.condition);
    }
}
