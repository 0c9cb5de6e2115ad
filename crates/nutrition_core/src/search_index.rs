//! crates/nutrition_core/src/search_index.rs
//!
//! The shared, cross-user food index. Every food resolved by the AI backend is
//! merged here under a stable id so other users can find it without another
//! generation.

use chrono::Utc;
use futures::join;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{SharedFoodInput, SharedFoodRecord};
use crate::ports::{PortError, PortResult, SharedFoodStore};
use crate::resolver::normalize;

/// Maximum number of search keywords stored per record.
pub const MAX_KEYWORDS: usize = 30;
/// Result cap of each of the two search queries.
pub const SEARCH_LIMIT: usize = 15;

const MIN_PREFIX_LEN: usize = 3;
const MAX_PREFIX_LEN: usize = 10;

/// Stable record key: lowercase, non-alphanumeric runs collapsed to `_`, no
/// leading or trailing `_`.
pub fn normalize_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !id.is_empty() {
                id.push('_');
            }
            pending_separator = false;
            id.push(c);
        } else {
            pending_separator = true;
        }
    }

    id
}

/// Keywords for prefix search: the full normalized name, every word longer than
/// two characters, and each word's prefixes of length 3 to 10.
pub fn generate_keywords(name: &str) -> Vec<String> {
    let lower = normalize(name);
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    let mut push = |keyword: String| {
        if keywords.len() < MAX_KEYWORDS && seen.insert(keyword.clone()) {
            keywords.push(keyword);
        }
    };

    if !lower.is_empty() {
        push(lower.clone());
    }

    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|w| w.chars().count() > 2)
        .collect();

    for word in &words {
        push(word.to_string());
    }

    for word in &words {
        let chars: Vec<char> = word.chars().collect();
        let longest = chars.len().min(MAX_PREFIX_LEN);
        for len in MIN_PREFIX_LEN..=longest {
            push(chars[..len].iter().collect());
        }
    }

    keywords
}

/// Builds the stored record for `food`.
pub fn build_record(food: &SharedFoodInput) -> PortResult<SharedFoodRecord> {
    let name = food.name.trim();
    let id = normalize_id(name);
    if id.is_empty() {
        return Err(PortError::Unexpected(format!(
            "food name '{}' has no usable characters",
            food.name
        )));
    }

    Ok(SharedFoodRecord {
        id,
        name: name.to_string(),
        emoji: food.emoji.clone().unwrap_or_else(|| "🍽️".to_string()),
        calories: food.calories,
        sugar: food.sugar,
        protein: food.protein,
        carbs: food.carbs,
        fat: food.fat,
        fiber: food.fiber,
        serving_size: food
            .serving_size
            .clone()
            .unwrap_or_else(|| "1 serving".to_string()),
        category: food.category.clone().unwrap_or_else(|| "other".to_string()),
        name_lower_case: normalize(name),
        search_keywords: generate_keywords(name),
        updated_at: Utc::now(),
    })
}

#[derive(Clone)]
pub struct SharedFoodIndex {
    store: Arc<dyn SharedFoodStore>,
}

impl SharedFoodIndex {
    pub fn new(store: Arc<dyn SharedFoodStore>) -> Self {
        Self { store }
    }

    /// Merge-writes `food` under `normalize_id(name)`.
    pub async fn upsert(&self, food: &SharedFoodInput) -> PortResult<()> {
        let record = build_record(food)?;
        debug!(id = %record.id, "Merging food into shared index");
        self.store.merge_food(&record).await
    }

    /// Best-effort upsert on a background task. Failures are only logged.
    pub fn upsert_in_background(&self, food: SharedFoodInput) {
        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.upsert(&food).await {
                warn!(name = %food.name, error = %e, "Failed to add food to shared index");
            }
        });
    }

    /// Keyword matches first, then name-prefix matches, without duplicates.
    ///
    /// The query is lowercased with runs of whitespace collapsed, matching how
    /// names are stored. The keyword branch matches the whole query against stored
    /// keywords, so multi-word queries only hit through the full-name keyword.
    /// A failing branch is logged and skipped.
    pub async fn search(&self, query: &str) -> Vec<SharedFoodRecord> {
        let needle = normalize(query);
        if needle.is_empty() {
            return Vec::new();
        }

        let (by_keyword, by_prefix) = join!(
            self.store.find_by_keyword(&needle, SEARCH_LIMIT),
            self.store.find_by_name_prefix(&needle, SEARCH_LIMIT)
        );

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for (branch, outcome) in [("keyword", by_keyword), ("prefix", by_prefix)] {
            match outcome {
                Ok(records) => {
                    for record in records {
                        if seen.insert(record.id.clone()) {
                            results.push(record);
                        }
                    }
                }
                Err(e) => {
                    warn!(branch, query = %needle, error = %e, "Shared food search branch failed")
                }
            }
        }

        results
    }
}
