//! Demo flows: typed request/response units over a [`crate::Client`].
//!
//! Each flow performs at most one or two generation calls and reshapes the
//! result. Flows hold no state; a failure surfaces to the caller unchanged.

pub mod explain;
pub mod models;
pub mod recipe;
pub mod weather;

pub use explain::{
    ExplainRequest, ExplainResponse, ImageExplainRequest, ImageExplainResponse, run_explain,
    run_image_explain,
};
pub use models::{ModelSummary, ModelSupports, run_list_models};
pub use recipe::{RecipeRequest, RecipeResponse, run_recipe};
pub use weather::{WeatherRequest, WeatherResponse, run_weather};
