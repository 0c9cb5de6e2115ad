//! Integration tests for the cache-first resolver.
//!
//! These tests wire a `NutritionResolver` to in-memory stores, a manual clock
//! and a scripted generative backend, and check which lookups reach the backend
//! and what gets written back to the caches.

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use nutrition_core::memory::{InMemorySettingsStore, InMemorySharedFoodStore};
use nutrition_core::{
    AiGateway, BackendReply, EnvCredentials, FoodSource, GatewayConfig, GenerationRequest,
    GenerativeBackend, ManualClock, NutritionCacheEntry, NutritionResolver, PortError,
    PortResult, SettingsHandle, SharedFoodIndex, UserSettings,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    fn reply_with(&self, text: &str) {
        self.replies.lock().unwrap().push_back(text.to_string());
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_request(&self) -> Option<GenerationRequest> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(
        &self,
        _secret: &str,
        _model: &str,
        request: &GenerationRequest,
    ) -> PortResult<BackendReply> {
        self.prompts.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(BackendReply { text, usage: None }),
            None => Err(PortError::Backend("500 nothing scripted".to_string())),
        }
    }
}

struct Harness {
    resolver: NutritionResolver,
    backend: Arc<ScriptedBackend>,
    foods: Arc<InMemorySharedFoodStore>,
    settings_store: Arc<InMemorySettingsStore>,
    user_id: Uuid,
}

fn harness(env: EnvCredentials, settings: UserSettings) -> Harness {
    let backend = Arc::new(ScriptedBackend::default());
    let foods = Arc::new(InMemorySharedFoodStore::new());
    let settings_store = Arc::new(InMemorySettingsStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 9, 10, 18, 30, 0).unwrap(),
    ));
    let user_id = Uuid::new_v4();
    let handle = Arc::new(SettingsHandle::with_settings(
        settings_store.clone(),
        user_id,
        settings,
    ));
    let gateway = Arc::new(AiGateway::new(
        backend.clone(),
        handle,
        clock,
        env,
        GatewayConfig::default(),
    ));
    let resolver = NutritionResolver::new(gateway, SharedFoodIndex::new(foods.clone()));

    Harness {
        resolver,
        backend,
        foods,
        settings_store,
        user_id,
    }
}

fn with_key() -> EnvCredentials {
    EnvCredentials {
        single: Some("test-key".to_string()),
        ..Default::default()
    }
}

/// Lets fire-and-forget writes run until `done` holds.
async fn settle(done: impl Fn() -> bool) {
    for _ in 0..50 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

const TWO_ITEM_MEAL: &str = r#"```json
{
  "items": [
    {"name": "Scrambled Eggs", "emoji": "🍳", "quantity": "2 eggs", "calories": 182, "sugar": 1.1, "protein": 12.2, "carbs": 2.0, "fat": 13.4, "fiber": 0, "servingSize": "2 large eggs"},
    {"name": "Buttered Toast", "emoji": "🍞", "quantity": "1 slice", "calories": 120, "sugar": 1.5, "protein": 3.0, "carbs": 15.0, "fat": 5.0, "fiber": 1.0}
  ],
  "totals": {"calories": 302, "sugar": 2.6, "protein": 15.2, "carbs": 17.0, "fat": 18.4, "fiber": 1.0},
  "healthScore": 6,
  "advice": "Add some fruit or vegetables for fiber."
}
```"#;

// ---------------------------------------------------------------------------
// Cache-first lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn curated_food_resolves_without_backend() {
    let h = harness(with_key(), UserSettings::default());

    let entry = h.resolver.lookup_food("Apple").unwrap();
    assert_eq!(entry.name, "Apple");
    assert_eq!(entry.source, FoodSource::Database);

    let analyzed = h.resolver.analyze_food("  apple ").await.unwrap();
    assert_eq!(analyzed.calories, entry.calories);
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn fuzzy_match_needs_a_single_candidate() {
    let h = harness(EnvCredentials::default(), UserSettings::default());

    // Only "Strawberries" contains "strawberr".
    assert_eq!(
        h.resolver.lookup_food("strawberr").map(|e| e.name),
        Some("Strawberries".to_string())
    );
    // "apple" alone is exact, but "appl" matches three curated foods.
    assert!(h.resolver.lookup_food("appl").is_none());
}

#[tokio::test]
async fn user_foods_win_over_curated_ones() {
    let h = harness(EnvCredentials::default(), UserSettings::default());
    let entry = NutritionCacheEntry {
        name: "Banana".to_string(),
        calories: 90.0,
        sugar: 12.0,
        protein: 1.0,
        carbs: 23.0,
        fat: 0.3,
        fiber: 2.6,
        source: FoodSource::Ai,
        timestamp: Utc::now(),
        serving_size: "1 small".to_string(),
    };

    h.resolver.cache_user_food(entry).await.unwrap();

    let hit = h.resolver.lookup_food("BANANA").unwrap();
    assert_eq!(hit.source, FoodSource::User);
    assert_eq!(hit.calories, 90.0);
    assert!(h.settings_store.stored(h.user_id).is_some());
}

// ---------------------------------------------------------------------------
// AI-backed food analysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_food_generates_and_writes_back() {
    let h = harness(with_key(), UserSettings::default());
    h.backend.reply_with(
        r#"{"name": "Pad Thai", "emoji": "🍜", "calories": 357, "sugar": 9, "protein": 14,
            "carbs": 45, "fat": 13, "fiber": 2, "servingSize": "1 plate (200g)", "category": "other"}"#,
    );

    let entry = h.resolver.analyze_food("pad  thai").await.unwrap();

    assert_eq!(entry.name, "Pad Thai");
    assert_eq!(entry.source, FoodSource::Ai);
    assert_eq!(entry.serving_size, "1 plate (200g)");
    assert!(h.backend.last_request().unwrap().json_mode);

    // Second call is a cache hit.
    let again = h.resolver.analyze_food("Pad Thai").await.unwrap();
    assert_eq!(again, entry);
    assert_eq!(h.backend.call_count(), 1);

    settle(|| h.foods.get("pad_thai").is_some()).await;
    let record = h.foods.get("pad_thai").unwrap();
    assert_eq!(record.emoji, "🍜");
    assert!(record.search_keywords.contains(&"pad".to_string()));
}

#[tokio::test]
async fn analyze_food_rejects_zero_calories() {
    let h = harness(with_key(), UserSettings::default());
    h.backend.reply_with(r#"{"name": "Rock", "calories": 0}"#);

    assert!(h.resolver.analyze_food("rock").await.is_none());
    assert!(h.resolver.lookup_food("rock").is_none());
}

#[tokio::test]
async fn analyze_food_without_credentials_is_unavailable() {
    let h = harness(EnvCredentials::default(), UserSettings::default());

    assert!(!h.resolver.is_ai_available());
    assert!(h.resolver.analyze_food("pad thai").await.is_none());
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn analyze_food_with_malformed_reply_returns_none() {
    let h = harness(with_key(), UserSettings::default());
    h.backend.reply_with("Pad Thai has about 350 calories.");

    assert!(h.resolver.analyze_food("pad thai").await.is_none());
    assert!(h.resolver.token_stats().today > 0);
}

// ---------------------------------------------------------------------------
// Meal analysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_meal_without_credentials_returns_none() {
    let h = harness(EnvCredentials::default(), UserSettings::default());

    assert!(h.resolver.analyze_meal("2 eggs and toast").await.is_none());
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn analyze_meal_caches_every_item() {
    let h = harness(with_key(), UserSettings::default());
    h.backend.reply_with(TWO_ITEM_MEAL);

    let meal = h.resolver.analyze_meal("2 eggs and toast").await.unwrap();

    assert_eq!(meal.items.len(), 2);
    assert_eq!(meal.health_score, 6.0);
    assert_eq!(meal.totals.calories, 302.0);
    for item in &meal.items {
        let hit = h.resolver.lookup_food(&item.name);
        assert_matches!(hit, Some(NutritionCacheEntry { source: FoodSource::Ai, .. }));
    }
    assert_eq!(
        h.resolver.lookup_food("buttered toast").unwrap().serving_size,
        "1 slice"
    );
    assert_eq!(h.backend.call_count(), 1);

    settle(|| h.foods.len() == 2).await;
    assert!(h.foods.get("scrambled_eggs").is_some());
    assert!(h.foods.get("buttered_toast").is_some());
}

#[tokio::test]
async fn analyze_meal_caches_zero_calorie_drinks() {
    let h = harness(with_key(), UserSettings::default());
    h.backend.reply_with(
        r#"{"items": [
              {"name": "Sparkling Water", "quantity": "1 glass", "calories": 0},
              {"name": "Ghost Snack", "quantity": "1", "calories": -5},
              {"name": "  ", "quantity": "1", "calories": 40}
            ],
            "totals": {"calories": 0},
            "healthScore": 9,
            "advice": "Good hydration."}"#,
    );

    let meal = h.resolver.analyze_meal("a glass of sparkling water").await.unwrap();
    assert_eq!(meal.items.len(), 3);

    let water = h.resolver.lookup_food("sparkling water").unwrap();
    assert_eq!(water.calories, 0.0);
    assert_eq!(water.source, FoodSource::Ai);
    assert!(h.resolver.lookup_food("ghost snack").is_none());
}

#[tokio::test]
async fn analyze_meal_respects_exhausted_budget() {
    let settings = UserSettings {
        daily_token_budget: 10,
        today_tokens_used: 10,
        ..Default::default()
    };
    let h = harness(with_key(), settings);
    h.backend.reply_with(TWO_ITEM_MEAL);

    assert!(h.resolver.analyze_meal("2 eggs and toast").await.is_none());
    assert_eq!(h.backend.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Settings store outages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_only_settings_store_does_not_break_lookups() {
    let h = harness(with_key(), UserSettings::default());
    h.settings_store.fail_writes(true);

    h.backend.reply_with("plain text");
    let generation = h
        .resolver
        .gateway()
        .generate(GenerationRequest::new("hello"))
        .await
        .unwrap();
    assert_eq!(generation.text, "plain text");

    h.backend.reply_with(r#"{"name": "Pad Thai", "calories": 357, "protein": 14}"#);
    let analyzed = h.resolver.analyze_food("pad thai").await.unwrap();
    assert_eq!(analyzed.calories, 357.0);
    assert_eq!(h.resolver.lookup_food("pad thai"), Some(analyzed));

    let entry = NutritionCacheEntry {
        name: "Grandma's Stew".to_string(),
        calories: 410.0,
        sugar: 4.0,
        protein: 22.0,
        carbs: 30.0,
        fat: 18.0,
        fiber: 5.0,
        source: FoodSource::Ai,
        timestamp: Utc::now(),
        serving_size: "1 bowl".to_string(),
    };
    let cached = h.resolver.cache_user_food(entry).await.unwrap();
    assert_eq!(cached.source, FoodSource::User);
    assert_eq!(h.resolver.lookup_food("grandma's stew"), Some(cached));

    assert!(h.settings_store.stored(h.user_id).is_none());
    assert_eq!(h.settings_store.save_count(), 0);
}

// ---------------------------------------------------------------------------
// Shared index passthroughs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_index_search_finds_added_foods() {
    let h = harness(EnvCredentials::default(), UserSettings::default());
    h.resolver
        .add_food_to_shared_index(&nutrition_core::SharedFoodInput {
            name: "Chicken Soup".to_string(),
            emoji: Some("🍲".to_string()),
            calories: 120.0,
            sugar: 1.0,
            protein: 9.0,
            carbs: 10.0,
            fat: 4.0,
            fiber: 1.0,
            serving_size: Some("1 bowl".to_string()),
            category: Some("other".to_string()),
        })
        .await;

    let results = h.resolver.search_shared_foods("soup").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "chicken_soup");
}
