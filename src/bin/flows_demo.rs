use std::env;
use std::error::Error;
use std::sync::Arc;

use flow_sdk_rs::flows::{
    ExplainRequest, ImageExplainRequest, RecipeRequest, WeatherRequest, run_explain,
    run_image_explain, run_list_models, run_recipe, run_weather,
};
use flow_sdk_rs::{
    Client, GoogleModel, GoogleModelConfig, ModelRegistry, OpenAiCompatModel, current_weather,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let registry = build_registry()?;
    let provider = env::var("MODEL_PROVIDER").unwrap_or_else(|_| "googleai".to_string());
    let backend = registry
        .get(&provider)
        .ok_or_else(|| format!("unknown model provider: {provider}"))?;

    info!(target: "flows_demo", %provider, "running demo flows");

    let client = Client::builder()
        .backend_shared(backend)
        .tool(current_weather())
        .build()?;

    println!("--- weather flow ---");
    let weather = run_weather(
        &client,
        WeatherRequest {
            location: "West Valley City, UT".to_string(),
        },
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&weather)?);

    println!("--- recipe flow ---");
    let recipe = run_recipe(
        &client,
        RecipeRequest {
            ingredient: "avocado".to_string(),
            dietary_restrictions: Some("vegetarian".to_string()),
        },
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&recipe)?);

    println!("--- explanation flow ---");
    let explanation = run_explain(&client, ExplainRequest::default()).await?;
    println!("[{}] {}", explanation.model, explanation.explanation);

    println!("--- image explanation flow ---");
    let described = run_image_explain(&client, ImageExplainRequest::default()).await?;
    println!("{}", described.description);

    println!("--- list models flow ---");
    let summaries = run_list_models(&client).await?;
    for summary in summaries.iter().take(15) {
        println!(
            "{} (image={}, embedding={})",
            summary.label, summary.supports.image, summary.supports.embedding
        );
    }
    if summaries.len() > 15 {
        println!("... and {} more", summaries.len() - 15);
    }

    Ok(())
}

/// Registers every backend an API key is present for; the Google backend is
/// required, the OpenAI-compatible one optional.
fn build_registry() -> Result<ModelRegistry, Box<dyn Error>> {
    let mut registry = ModelRegistry::new();

    let api_key = env::var("GOOGLE_API_KEY")
        .or_else(|_| env::var("GEMINI_API_KEY"))
        .map_err(|_| "GOOGLE_API_KEY (or GEMINI_API_KEY) is not set")?;
    let model = env::var("GOOGLE_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    let google = GoogleModel::new(GoogleModelConfig::new(api_key, model).with_temperature(0.8))?;
    registry.register("googleai", Arc::new(google));

    if let Ok(openai) = OpenAiCompatModel::from_env("gpt-4.1-mini") {
        registry.register("openai", Arc::new(openai));
    }

    Ok(registry)
}
