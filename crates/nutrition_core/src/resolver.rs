//! crates/nutrition_core/src/resolver.rs
//!
//! Cache-first nutrition resolution. A food name is answered from the user's
//! local cache, then the curated table, then a fuzzy curated match, and only
//! then from the generative backend. AI answers are written back to the local
//! cache and to the shared index so the next lookup never reaches the backend.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    FoodSource, GenerationRequest, MealAnalysis, MealItem, NutritionCacheEntry, SharedFoodInput,
    SharedFoodRecord, TokenUsage,
};
use crate::food_table::{self, CuratedFood};
use crate::gateway::AiGateway;
use crate::search_index::SharedFoodIndex;

const FOOD_PROMPT: &str = r#"You are a nutrition database. Give the nutrition facts for ONE typical serving of the food below.

FOOD: {food}

Respond with ONLY a JSON object, no markdown, in exactly this shape:
{
  "name": "canonical English name of the food",
  "emoji": "a single emoji that represents the food",
  "calories": number (kcal),
  "sugar": number (grams),
  "protein": number (grams),
  "carbs": number (grams),
  "fat": number (grams),
  "fiber": number (grams),
  "servingSize": "short description of the serving, e.g. 1 cup (240g)",
  "category": "one of fruit, vegetable, protein, grain, dairy, fast food, snack, drink, other"
}

Use realistic average values. If the input is not a food, return calories 0."#;

const MEAL_PROMPT: &str = r#"You are a nutrition assistant. The user describes a meal in free text, possibly in any language.

MEAL: {meal}

Split the meal into its individual food items. For each item estimate the nutrition for the quantity described
(assume one typical serving when no quantity is given). Then add up the totals, rate how healthy the whole meal is
from 1 (very unhealthy) to 10 (very healthy) and give one or two sentences of practical advice in the user's language.

Respond with ONLY a JSON object, no markdown, in exactly this shape:
{
  "items": [
    {
      "name": "food name in English",
      "emoji": "single emoji",
      "quantity": "quantity as described",
      "calories": number,
      "sugar": number,
      "protein": number,
      "carbs": number,
      "fat": number,
      "fiber": number,
      "servingSize": "serving description"
    }
  ],
  "totals": { "calories": number, "sugar": number, "protein": number, "carbs": number, "fat": number, "fiber": number },
  "healthScore": number,
  "advice": "short advice"
}"#;

/// Canonical cache key: lowercase, trimmed, internal whitespace collapsed.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Shape of the single-food structured response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoodAnalysis {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    calories: f64,
    #[serde(default)]
    sugar: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
    #[serde(default)]
    fiber: f64,
    #[serde(default)]
    serving_size: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

pub struct NutritionResolver {
    gateway: Arc<AiGateway>,
    index: SharedFoodIndex,
}

impl NutritionResolver {
    pub fn new(gateway: Arc<AiGateway>, index: SharedFoodIndex) -> Self {
        Self { gateway, index }
    }

    pub fn gateway(&self) -> &Arc<AiGateway> {
        &self.gateway
    }

    //=====================================================================================
    // Local resolution
    //=====================================================================================

    /// Resolves `name` without the AI backend. `None` means the caller has to
    /// escalate.
    pub fn lookup_food(&self, name: &str) -> Option<NutritionCacheEntry> {
        let key = normalize(name);
        if key.is_empty() {
            return None;
        }

        let settings = self.gateway.settings();
        if let Some(hit) = settings.read(|s| s.food_cache.get(&key).cloned()) {
            debug!(food = %key, source = ?hit.source, "Nutrition cache hit");
            return Some(hit);
        }

        if let Some(food) = food_table::find_exact(&key) {
            debug!(food = %key, "Curated table hit");
            return Some(self.cache_curated(&key, food));
        }

        if let [only] = food_table::search(&key).as_slice() {
            if normalize(only.name).contains(&key) {
                debug!(food = %key, matched = only.name, "Fuzzy curated match");
                return Some(self.cache_curated(&key, only));
            }
        }

        None
    }

    fn cache_curated(&self, key: &str, food: &CuratedFood) -> NutritionCacheEntry {
        let entry = NutritionCacheEntry {
            name: food.name.to_string(),
            calories: food.calories,
            sugar: food.sugar,
            protein: food.protein,
            carbs: food.carbs,
            fat: food.fat,
            fiber: food.fiber,
            source: FoodSource::Database,
            timestamp: self.gateway.clock().now(),
            serving_size: food.serving_size.to_string(),
        };
        self.store_entry(key, entry.clone());
        entry
    }

    fn store_entry(&self, key: &str, entry: NutritionCacheEntry) {
        self.gateway.settings().update_local(|s| {
            s.food_cache.insert(key.to_string(), entry);
        });
    }

    /// Writes the settings document on a background task.
    fn persist_in_background(&self) {
        let settings = self.gateway.settings().clone();
        tokio::spawn(async move {
            settings.persist().await;
        });
    }

    /// Stores a food entered by the user. It takes precedence over every other
    /// source on later lookups.
    pub async fn cache_user_food(
        &self,
        mut entry: NutritionCacheEntry,
    ) -> Option<NutritionCacheEntry> {
        let key = normalize(&entry.name);
        if key.is_empty() {
            return None;
        }
        entry.source = FoodSource::User;
        entry.timestamp = self.gateway.clock().now();
        self.store_entry(&key, entry.clone());
        self.gateway.settings().persist().await;
        Some(entry)
    }

    //=====================================================================================
    // AI-backed resolution
    //=====================================================================================

    /// Cache-first lookup that falls back to the AI backend on a miss.
    pub async fn analyze_food(&self, name: &str) -> Option<NutritionCacheEntry> {
        if let Some(hit) = self.lookup_food(name) {
            return Some(hit);
        }
        if !self.gateway.is_available() {
            info!(food = %name.trim(), "Food not cached and AI unavailable");
            return None;
        }

        let key = normalize(name);
        let request = GenerationRequest::new(FOOD_PROMPT.replace("{food}", name.trim()))
            .feature("food_analysis")
            .temperature(0.2)
            .max_tokens(400);
        let analysis: FoodAnalysis = self.gateway.generate_json_as(request).await?;

        if !analysis.calories.is_finite() || analysis.calories <= 0.0 {
            warn!(food = %key, calories = analysis.calories, "AI returned no usable nutrition");
            return None;
        }

        let display_name = analysis
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(name.trim())
            .to_string();

        self.store_entry(
            &key,
            NutritionCacheEntry {
                name: display_name.clone(),
                calories: analysis.calories,
                sugar: analysis.sugar,
                protein: analysis.protein,
                carbs: analysis.carbs,
                fat: analysis.fat,
                fiber: analysis.fiber,
                source: FoodSource::Ai,
                timestamp: self.gateway.clock().now(),
                serving_size: analysis
                    .serving_size
                    .clone()
                    .unwrap_or_else(|| "1 serving".to_string()),
            },
        );
        self.persist_in_background();
        self.index.upsert_in_background(SharedFoodInput {
            name: display_name,
            emoji: analysis.emoji,
            calories: analysis.calories,
            sugar: analysis.sugar,
            protein: analysis.protein,
            carbs: analysis.carbs,
            fat: analysis.fat,
            fiber: analysis.fiber,
            serving_size: analysis.serving_size,
            category: analysis.category,
        });

        self.lookup_food(name)
    }

    /// Decomposes a free-text meal into items, totals, a health score and advice.
    ///
    /// Items not already known are cached for the user, zero-calorie drinks
    /// included. Items with a blank name or a negative or non-finite calorie
    /// count are not cached.
    pub async fn analyze_meal(&self, description: &str) -> Option<MealAnalysis> {
        if description.trim().is_empty() {
            return None;
        }
        if !self.gateway.is_available() {
            info!("Meal analysis requested but AI unavailable");
            return None;
        }

        let request = GenerationRequest::new(MEAL_PROMPT.replace("{meal}", description.trim()))
            .feature("meal_analysis")
            .temperature(0.3)
            .max_tokens(1500);
        let mut analysis: MealAnalysis = self.gateway.generate_json_as(request).await?;
        analysis.health_score = analysis.health_score.clamp(1.0, 10.0);

        let mut cached = 0usize;
        for item in &analysis.items {
            if normalize(&item.name).is_empty()
                || !item.calories.is_finite()
                || item.calories < 0.0
            {
                continue;
            }
            if self.lookup_food(&item.name).is_some() {
                continue;
            }
            self.cache_meal_item(item);
            cached += 1;
        }
        if cached > 0 {
            self.persist_in_background();
        }

        info!(
            items = analysis.items.len(),
            newly_cached = cached,
            health_score = analysis.health_score,
            "Meal analyzed"
        );
        Some(analysis)
    }

    fn cache_meal_item(&self, item: &MealItem) {
        let serving_size = item
            .serving_size
            .clone()
            .or_else(|| item.quantity.clone())
            .unwrap_or_else(|| "1 serving".to_string());

        self.store_entry(
            &normalize(&item.name),
            NutritionCacheEntry {
                name: item.name.trim().to_string(),
                calories: item.calories,
                sugar: item.sugar,
                protein: item.protein,
                carbs: item.carbs,
                fat: item.fat,
                fiber: item.fiber,
                source: FoodSource::Ai,
                timestamp: self.gateway.clock().now(),
                serving_size: serving_size.clone(),
            },
        );
        self.index.upsert_in_background(SharedFoodInput {
            name: item.name.trim().to_string(),
            emoji: item.emoji.clone(),
            calories: item.calories,
            sugar: item.sugar,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
            fiber: item.fiber,
            serving_size: Some(serving_size),
            category: None,
        });
    }

    //=====================================================================================
    // Shared index and status passthroughs
    //=====================================================================================

    /// Adds `food` to the shared index. Failures are logged, never returned.
    pub async fn add_food_to_shared_index(&self, food: &SharedFoodInput) {
        if let Err(e) = self.index.upsert(food).await {
            warn!(name = %food.name, error = %e, "Failed to add food to shared index");
        }
    }

    pub async fn search_shared_foods(&self, query: &str) -> Vec<SharedFoodRecord> {
        self.index.search(query).await
    }

    pub fn is_ai_available(&self) -> bool {
        self.gateway.is_available()
    }

    pub fn token_stats(&self) -> TokenUsage {
        self.gateway.token_stats()
    }
}
