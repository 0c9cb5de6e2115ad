//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use nutrition_core::{AiGateway, NutritionResolver};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<AiGateway>,
    pub resolver: Arc<NutritionResolver>,
}
