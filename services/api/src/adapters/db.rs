//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `SettingsStore` and `SharedFoodStore` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nutrition_core::domain::{SharedFoodRecord, UserSettings};
use nutrition_core::ports::{PortError, PortResult, SettingsStore, SharedFoodStore};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements both store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SettingsRecord {
    settings: Json<UserSettings>,
}

#[derive(FromRow)]
struct SharedFoodRow {
    id: String,
    name: String,
    emoji: String,
    calories: f64,
    sugar: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    fiber: f64,
    serving_size: String,
    category: String,
    name_lower_case: String,
    search_keywords: Vec<String>,
    updated_at: DateTime<Utc>,
}
impl SharedFoodRow {
    fn to_domain(self) -> SharedFoodRecord {
        SharedFoodRecord {
            id: self.id,
            name: self.name,
            emoji: self.emoji,
            calories: self.calories,
            sugar: self.sugar,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            fiber: self.fiber,
            serving_size: self.serving_size,
            category: self.category,
            name_lower_case: self.name_lower_case,
            search_keywords: self.search_keywords,
            updated_at: self.updated_at,
        }
    }
}

const SHARED_FOOD_COLUMNS: &str = "id, name, emoji, calories, sugar, protein, carbs, fat, fiber, \
     serving_size, category, name_lower_case, search_keywords, updated_at";

//=========================================================================================
// `SettingsStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SettingsStore for DbAdapter {
    async fn load_settings(&self, user_id: Uuid) -> PortResult<Option<UserSettings>> {
        let record = sqlx::query_as::<_, SettingsRecord>(
            "SELECT settings FROM user_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(record.map(|r| r.settings.0))
    }

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, settings, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET settings = EXCLUDED.settings, updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(Json(settings))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

//=========================================================================================
// `SharedFoodStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SharedFoodStore for DbAdapter {
    async fn merge_food(&self, record: &SharedFoodRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO shared_foods (id, name, emoji, calories, sugar, protein, carbs, fat, fiber, \
             serving_size, category, name_lower_case, search_keywords, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, emoji = EXCLUDED.emoji, calories = EXCLUDED.calories, \
             sugar = EXCLUDED.sugar, protein = EXCLUDED.protein, carbs = EXCLUDED.carbs, \
             fat = EXCLUDED.fat, fiber = EXCLUDED.fiber, serving_size = EXCLUDED.serving_size, \
             category = EXCLUDED.category, name_lower_case = EXCLUDED.name_lower_case, \
             search_keywords = EXCLUDED.search_keywords, updated_at = EXCLUDED.updated_at",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.emoji)
        .bind(record.calories)
        .bind(record.sugar)
        .bind(record.protein)
        .bind(record.carbs)
        .bind(record.fat)
        .bind(record.fiber)
        .bind(&record.serving_size)
        .bind(&record.category)
        .bind(&record.name_lower_case)
        .bind(&record.search_keywords)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn find_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> PortResult<Vec<SharedFoodRecord>> {
        let rows = sqlx::query_as::<_, SharedFoodRow>(&format!(
            "SELECT {} FROM shared_foods WHERE $1 = ANY(search_keywords) ORDER BY id LIMIT $2",
            SHARED_FOOD_COLUMNS
        ))
        .bind(keyword)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(SharedFoodRow::to_domain).collect())
    }

    async fn find_by_name_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> PortResult<Vec<SharedFoodRecord>> {
        let rows = sqlx::query_as::<_, SharedFoodRow>(&format!(
            "SELECT {} FROM shared_foods WHERE starts_with(name_lower_case, $1) \
             ORDER BY name_lower_case COLLATE \"C\" LIMIT $2",
            SHARED_FOOD_COLUMNS
        ))
        .bind(prefix)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(SharedFoodRow::to_domain).collect())
    }
}
