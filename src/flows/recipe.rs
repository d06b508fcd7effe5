use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::client::{Client, GenerateOptions};
use crate::error::{FlowError, GenerateError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecipeRequest {
    pub ingredient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<String>,
}

/// The exact shape constrained generation must produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecipeResponse {
    pub title: String,
    pub description: String,
    pub prep_time: String,
    pub cook_time: String,
    pub servings: u32,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
}

/// Requests a recipe as structured output. Fails explicitly when the model
/// yields no payload matching [`RecipeResponse`]; there is no partial result.
pub async fn run_recipe(
    client: &Client,
    request: RecipeRequest,
) -> Result<RecipeResponse, FlowError> {
    let restrictions = request
        .dietary_restrictions
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or("none");

    tracing::info!(
        target: "flow_sdk::flows",
        ingredient = %request.ingredient,
        %restrictions,
        "recipe flow start"
    );

    let prompt = format!(
        "Create a recipe with the following requirements:\n\
         Main ingredient: {}\n\
         Dietary restrictions: {restrictions}",
        request.ingredient
    );

    client
        .generate_object::<RecipeResponse>(prompt, GenerateOptions::default())
        .await
        .map_err(|err| match err {
            GenerateError::StructuredOutput(_) => FlowError::MissingOutput("recipe"),
            other => FlowError::Generate(other),
        })
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

    fn avocado_request() -> RecipeRequest {
        RecipeRequest {
            ingredient: "avocado".to_string(),
            dietary_restrictions: Some("vegetarian".to_string()),
        }
    }

    const RECIPE_JSON: &str = r#"{
        "title": "Creamy Avocado Pasta",
        "description": "A quick vegetarian pasta tossed in an avocado sauce.",
        "prep_time": "10 minutes",
        "cook_time": "12 minutes",
        "servings": 4,
        "ingredients": ["2 ripe avocados", "300 g spaghetti", "1 clove garlic"],
        "instructions": ["Cook the spaghetti.", "Blend the sauce.", "Toss and serve."],
        "tips": ["Serve immediately so the sauce keeps its color."]
    }"#;

    #[tokio::test]
    async fn structured_payload_yields_full_recipe() {
        let client = client_with(vec![ModelCompletion {
            text: Some(RECIPE_JSON.to_string()),
            ..ModelCompletion::default()
        }]);

        let recipe = run_recipe(&client, avocado_request())
            .await
            .expect("flow succeeds");

        assert!(!recipe.ingredients.is_empty());
        assert!(!recipe.instructions.is_empty());
        assert!(recipe.servings > 0);
        assert_eq!(recipe.title, "Creamy Avocado Pasta");
    }

    #[tokio::test]
    async fn missing_structured_payload_fails_explicitly() {
        let client = client_with(vec![ModelCompletion {
            text: Some("Sorry, here is prose instead of a recipe.".to_string()),
            ..ModelCompletion::default()
        }]);

        let err = run_recipe(&client, avocado_request())
            .await
            .expect_err("must fail");

        assert!(matches!(err, FlowError::MissingOutput("recipe")));
        assert!(err.to_string().contains("failed to generate recipe"));
    }

    #[tokio::test]
    async fn provider_failure_propagates_unwrapped() {
        let client = client_with(Vec::new());

        let err = run_recipe(&client, avocado_request())
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            FlowError::Generate(GenerateError::Provider(_))
        ));
    }
}
