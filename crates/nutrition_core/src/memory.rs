//! In-memory implementations of the store ports, for tests and local runs
//! without a database.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{SharedFoodRecord, UserSettings};
use crate::ports::{PortError, PortResult, SettingsStore, SharedFoodStore};

#[derive(Default)]
pub struct InMemorySettingsStore {
    documents: Mutex<HashMap<Uuid, UserSettings>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save_settings` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self, user_id: Uuid) -> Option<UserSettings> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    /// Makes every subsequent write fail, to exercise persistence error paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load_settings(&self, user_id: Uuid) -> PortResult<Option<UserSettings>> {
        Ok(self.stored(user_id))
    }

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Storage("settings store is read-only".to_string()));
        }
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, settings.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared food table ordered by id, with switches to make either query fail.
#[derive(Default)]
pub struct InMemorySharedFoodStore {
    records: Mutex<BTreeMap<String, SharedFoodRecord>>,
    fail_keyword_queries: AtomicBool,
    fail_prefix_queries: AtomicBool,
}

impl InMemorySharedFoodStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<SharedFoodRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_keyword_queries(&self, fail: bool) {
        self.fail_keyword_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_prefix_queries(&self, fail: bool) {
        self.fail_prefix_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SharedFoodStore for InMemorySharedFoodStore {
    async fn merge_food(&self, record: &SharedFoodRecord) -> PortResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> PortResult<Vec<SharedFoodRecord>> {
        if self.fail_keyword_queries.load(Ordering::SeqCst) {
            return Err(PortError::Storage("keyword index unavailable".to_string()));
        }
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .filter(|r| r.search_keywords.iter().any(|k| k == keyword))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_name_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> PortResult<Vec<SharedFoodRecord>> {
        if self.fail_prefix_queries.load(Ordering::SeqCst) {
            return Err(PortError::Storage("name index unavailable".to_string()));
        }
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<SharedFoodRecord> = records
            .values()
            .filter(|r| r.name_lower_case.starts_with(prefix))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name_lower_case.cmp(&b.name_lower_case));
        matches.truncate(limit);
        Ok(matches)
    }
}
