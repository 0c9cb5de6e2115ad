//! crates/nutrition_core/src/domain.rs
//!
//! Defines the core data structures shared by the gateway, the resolver and the
//! shared food index. Everything here is plain data; the only behaviour is small
//! bookkeeping helpers that keep the invariants of each type in one place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Maximum number of entries kept in a user's request log.
pub const REQUEST_LOG_CAPACITY: usize = 100;

/// Daily token budget given to a user that has never configured one.
pub const DEFAULT_DAILY_TOKEN_BUDGET: u64 = 500_000;

//=========================================================================================
// Credentials
//=========================================================================================

/// Where an environment-sourced credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "position", rename_all = "snake_case")]
pub enum EnvSlot {
    /// One of the numbered slots, 1-based.
    Numbered(u8),
    /// An entry of the legacy comma-separated slot, 0-based.
    Combined(usize),
    /// The legacy single-credential slot.
    Single,
}

impl fmt::Display for EnvSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvSlot::Numbered(n) => write!(f, "env#{}", n),
            EnvSlot::Combined(i) => write!(f, "env-csv#{}", i),
            EnvSlot::Single => write!(f, "env"),
        }
    }
}

/// Identity of a pooled credential, used for per-credential usage bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", content = "slot", rename_all = "snake_case")]
pub enum CredentialId {
    Env(EnvSlot),
    /// Index into the user's managed credential list.
    User(usize),
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialId::Env(slot) => slot.fmt(f),
            CredentialId::User(index) => write!(f, "user#{}", index),
        }
    }
}

/// Per-day token counter attached to a single credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUsage {
    pub tokens_used_today: u64,
    pub last_reset_date: Option<NaiveDate>,
}

impl CredentialUsage {
    /// Adds `tokens` to today's counter, starting a fresh day first if needed.
    pub fn record(&mut self, tokens: u64, today: NaiveDate) {
        if self.last_reset_date != Some(today) {
            self.tokens_used_today = 0;
            self.last_reset_date = Some(today);
        }
        self.tokens_used_today += tokens;
    }
}

/// A credential added by the user and persisted in their settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCredential {
    pub secret: String,
    #[serde(default)]
    pub label: Option<String>,
    pub enabled: bool,
    #[serde(flatten)]
    pub usage: CredentialUsage,
}

impl ManagedCredential {
    pub fn new(secret: impl Into<String>, label: Option<String>) -> Self {
        Self {
            secret: secret.into(),
            label,
            enabled: true,
            usage: CredentialUsage::default(),
        }
    }
}

//=========================================================================================
// Generation requests and results
//=========================================================================================

/// A single logical request to the generative backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub json_mode: bool,
    /// Name of the calling feature, recorded in the request log.
    #[serde(default)]
    pub feature: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            feature: "general".to_string(),
            ..Default::default()
        }
    }

    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = feature.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
}

/// What the backend hands back for one successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub text: String,
    pub usage: Option<TokenCounts>,
}

/// A successful dispatch, tagged with the credential that served it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub credential: CredentialId,
    pub tokens: TokenCounts,
}

/// One line of the per-user request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub feature: String,
    pub cached: bool,
}

/// Summary of today's token consumption against the budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub today: u64,
    pub limit: u64,
    pub remaining: u64,
    pub percentage: f64,
    pub lifetime: u64,
}

//=========================================================================================
// Nutrition
//=========================================================================================

/// Where a cached nutrition entry was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodSource {
    Ai,
    Database,
    User,
}

/// A locally cached nutrition lookup, keyed by normalized food name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionCacheEntry {
    pub name: String,
    pub calories: f64,
    pub sugar: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub source: FoodSource,
    pub timestamp: DateTime<Utc>,
    pub serving_size: String,
}

/// One item of a decomposed meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealItem {
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub serving_size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MealTotals {
    pub calories: f64,
    pub sugar: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

/// The structured result of decomposing a free-text meal description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealAnalysis {
    pub items: Vec<MealItem>,
    #[serde(default)]
    pub totals: MealTotals,
    pub health_score: f64,
    #[serde(default)]
    pub advice: String,
}

/// Game-stat deltas derived from a meal's health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthImpact {
    pub hp_impact: i32,
    pub mana_impact: i32,
}

//=========================================================================================
// Shared food index
//=========================================================================================

/// Food data offered to the shared cross-user index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFoodInput {
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    pub calories: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A record of the shared food index as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFoodRecord {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub calories: f64,
    pub sugar: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub serving_size: String,
    pub category: String,
    pub name_lower_case: String,
    pub search_keywords: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// User settings document
//=========================================================================================

/// The per-user settings document persisted in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub credentials: Vec<ManagedCredential>,
    pub daily_token_budget: u64,
    pub today_tokens_used: u64,
    pub total_tokens_used: u64,
    /// Day `today_tokens_used` belongs to.
    pub usage_date: Option<NaiveDate>,
    pub preferred_model: Option<String>,
    pub request_log: VecDeque<RequestLogEntry>,
    pub food_cache: HashMap<String, NutritionCacheEntry>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            daily_token_budget: DEFAULT_DAILY_TOKEN_BUDGET,
            today_tokens_used: 0,
            total_tokens_used: 0,
            usage_date: None,
            preferred_model: None,
            request_log: VecDeque::new(),
            food_cache: HashMap::new(),
        }
    }
}

impl UserSettings {
    /// Appends to the request log, evicting the oldest entries beyond capacity.
    pub fn push_request(&mut self, entry: RequestLogEntry) {
        self.request_log.push_back(entry);
        while self.request_log.len() > REQUEST_LOG_CAPACITY {
            self.request_log.pop_front();
        }
    }

    /// True when the daily counter belongs to a day other than `today`.
    ///
    /// Documents written before `usage_date` existed fall back to the date of
    /// the most recent request.
    pub fn usage_is_stale(&self, today: NaiveDate) -> bool {
        self.usage_date
            .or_else(|| self.request_log.back().map(|last| last.timestamp.date_naive()))
            .is_some_and(|day| day != today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn log_entry(day: u32) -> RequestLogEntry {
        RequestLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            model: "m".to_string(),
            tokens_input: 1,
            tokens_output: 1,
            feature: "test".to_string(),
            cached: false,
        }
    }

    #[test]
    fn request_log_keeps_only_latest_hundred() {
        let mut settings = UserSettings::default();
        for i in 0..(REQUEST_LOG_CAPACITY + 5) {
            let mut entry = log_entry(1);
            entry.tokens_input = i as u64;
            settings.push_request(entry);
        }

        assert_eq!(settings.request_log.len(), REQUEST_LOG_CAPACITY);
        assert_eq!(settings.request_log.front().unwrap().tokens_input, 5);
    }

    #[test]
    fn credential_usage_rolls_over_on_new_day() {
        let day1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let mut usage = CredentialUsage::default();

        usage.record(100, day1);
        usage.record(50, day1);
        assert_eq!(usage.tokens_used_today, 150);

        usage.record(10, day2);
        assert_eq!(usage.tokens_used_today, 10);
        assert_eq!(usage.last_reset_date, Some(day2));
    }

    #[test]
    fn usage_date_takes_precedence_over_request_log() {
        let mut settings = UserSettings::default();
        settings.push_request(log_entry(1));
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(settings.usage_is_stale(today));

        settings.usage_date = Some(today);
        assert!(!settings.usage_is_stale(today));
        assert!(settings.usage_is_stale(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()));
    }

    #[test]
    fn usage_is_stale_falls_back_to_last_log_entry() {
        let mut settings = UserSettings::default();
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(!settings.usage_is_stale(today));

        settings.push_request(log_entry(1));
        assert!(settings.usage_is_stale(today));

        settings.push_request(log_entry(2));
        assert!(!settings.usage_is_stale(today));
    }

    #[test]
    fn settings_document_deserializes_with_missing_fields() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"preferredModel":"gemini-2.0-flash"}"#).unwrap();
        assert_eq!(settings.daily_token_budget, DEFAULT_DAILY_TOKEN_BUDGET);
        assert_eq!(settings.preferred_model.as_deref(), Some("gemini-2.0-flash"));
        assert!(settings.credentials.is_empty());
    }
}
