use rand::Rng;
use rand::seq::SliceRandom;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ToolError;
use crate::tools::ToolSpec;

/// Sky condition reported by the weather tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Sunny,
    Cloudy,
    Rainy,
    Snowy,
}

const CONDITIONS: [Condition; 4] = [
    Condition::Sunny,
    Condition::Cloudy,
    Condition::Rainy,
    Condition::Snowy,
];

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Condition::Sunny => "sunny",
            Condition::Cloudy => "cloudy",
            Condition::Rainy => "rainy",
            Condition::Snowy => "snowy",
        };
        f.write_str(name)
    }
}

/// What the weather tool reports for a location.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherReport {
    pub temperature: f64,
    pub condition: Condition,
}

impl WeatherReport {
    /// Samples a report: temperature is a uniform integer in [50, 80),
    /// condition a uniform pick from the four-value set.
    pub fn sample() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            temperature: rng.gen_range(50..80) as f64,
            condition: *CONDITIONS
                .choose(&mut rng)
                .expect("condition set is non-empty"),
        }
    }
}

/// The `current_weather` tool. Pure local randomness, no external call;
/// malformed input is rejected by schema validation before the handler runs.
pub fn current_weather() -> ToolSpec {
    ToolSpec::new(
        "current_weather",
        "Get the current weather for a given location",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "location": {
                "type": "string",
                "description": "City or place to report the weather for"
            }
        },
        "required": ["location"],
        "additionalProperties": false
    }))
    .expect("weather tool schema is valid")
    .with_handler(|args| async move {
        let location = args
            .get("location")
            .and_then(|value| value.as_str())
            .ok_or_else(|| ToolError::Execution("location missing".to_string()))?;

        let report = WeatherReport::sample();
        tracing::debug!(
            target: "flow_sdk::tools",
            %location,
            temperature = report.temperature,
            condition = %report.condition,
            "sampled weather report"
        );

        serde_json::to_value(report).map_err(|err| ToolError::Execution(err.to_string()))
    })
}
