//! In-memory copy of one user's settings document, written back to the
//! `SettingsStore` after mutations.
//!
//! Reads are synchronous so that cache lookups never suspend. The lock is never
//! held across an `.await`: writes clone a snapshot and persist it afterwards.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::UserSettings;
use crate::ports::{PortResult, SettingsStore};

pub struct SettingsHandle {
    user_id: Uuid,
    store: Arc<dyn SettingsStore>,
    state: Mutex<UserSettings>,
}

impl SettingsHandle {
    /// Loads the user's document, starting from defaults when none exists yet.
    pub async fn load(
        store: Arc<dyn SettingsStore>,
        user_id: Uuid,
        defaults: UserSettings,
    ) -> PortResult<Self> {
        let settings = match store.load_settings(user_id).await? {
            Some(settings) => settings,
            None => {
                info!(%user_id, "No settings document yet, starting from defaults");
                defaults
            }
        };

        Ok(Self::with_settings(store, user_id, settings))
    }

    pub fn with_settings(
        store: Arc<dyn SettingsStore>,
        user_id: Uuid,
        settings: UserSettings,
    ) -> Self {
        Self {
            user_id,
            store,
            state: Mutex::new(settings),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn snapshot(&self) -> UserSettings {
        self.lock().clone()
    }

    /// Runs `f` against the current document without persisting.
    pub fn read<R>(&self, f: impl FnOnce(&UserSettings) -> R) -> R {
        f(&self.lock())
    }

    /// Mutates the in-memory document only. Call `persist` to write it back.
    pub fn update_local<R>(&self, f: impl FnOnce(&mut UserSettings) -> R) -> R {
        f(&mut self.lock())
    }

    /// Mutates the document and writes it back to the store.
    ///
    /// A failed write undoes the mutation before the error is returned. If the
    /// document changed again while the write was in flight it is kept as is.
    pub async fn update<R>(&self, f: impl FnOnce(&mut UserSettings) -> R) -> PortResult<R> {
        let (result, previous, snapshot) = {
            let mut state = self.lock();
            let previous = state.clone();
            let result = f(&mut state);
            (result, previous, state.clone())
        };
        if let Err(e) = self.store.save_settings(self.user_id, &snapshot).await {
            let mut state = self.lock();
            if *state == snapshot {
                *state = previous;
            } else {
                warn!(
                    user_id = %self.user_id,
                    "Settings changed during a failed write, not rolled back"
                );
            }
            return Err(e);
        }
        Ok(result)
    }

    /// Writes the current document back, logging instead of failing.
    pub async fn persist(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.store.save_settings(self.user_id, &snapshot).await {
            warn!(user_id = %self.user_id, error = %e, "Failed to persist settings");
        }
    }

    fn lock(&self) -> MutexGuard<'_, UserSettings> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
