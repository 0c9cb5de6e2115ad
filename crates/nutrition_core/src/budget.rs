//! Daily token ledger: one global counter plus one counter per credential.
//!
//! The global counter rolls over when its `usage_date` is an earlier day.
//! Per-credential counters roll over on their own date.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::{
    CredentialId, CredentialUsage, EnvSlot, RequestLogEntry, TokenUsage, UserSettings,
};
use crate::ports::Clock;
use crate::settings::SettingsHandle;

pub struct TokenBudgetTracker {
    settings: Arc<SettingsHandle>,
    clock: Arc<dyn Clock>,
    /// Environment credentials are not part of the settings document, so their
    /// counters live for the lifetime of the process only.
    env_usage: Mutex<HashMap<EnvSlot, CredentialUsage>>,
}

impl TokenBudgetTracker {
    pub fn new(settings: Arc<SettingsHandle>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            env_usage: Mutex::new(HashMap::new()),
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Today's consumption against the daily budget.
    pub fn usage(&self) -> TokenUsage {
        let today = self.today();
        self.settings.read(|s| {
            let used = if s.usage_is_stale(today) { 0 } else { s.today_tokens_used };
            let limit = s.daily_token_budget;
            let percentage = if limit == 0 {
                100.0
            } else {
                (used as f64 / limit as f64 * 100.0).min(100.0)
            };
            TokenUsage {
                today: used,
                limit,
                remaining: limit.saturating_sub(used),
                percentage,
                lifetime: s.total_tokens_used,
            }
        })
    }

    /// False once today's usage has reached the budget.
    pub fn has_capacity(&self) -> bool {
        let usage = self.usage();
        usage.today < usage.limit
    }

    /// Adds a call's tokens to the global and per-credential counters and persists.
    pub async fn add_usage(&self, input: u64, output: u64, credential: Option<CredentialId>) {
        self.apply(input, output, credential, None);
        self.settings.persist().await;
    }

    /// `add_usage` plus a request-log entry, persisted in a single write.
    pub async fn record_dispatch(&self, entry: RequestLogEntry, credential: Option<CredentialId>) {
        let (input, output) = (entry.tokens_input, entry.tokens_output);
        self.apply(input, output, credential, Some(entry));
        self.settings.persist().await;
    }

    fn apply(
        &self,
        input: u64,
        output: u64,
        credential: Option<CredentialId>,
        entry: Option<RequestLogEntry>,
    ) {
        let today = self.today();
        let tokens = input + output;

        if let Some(CredentialId::Env(slot)) = credential {
            self.env_usage
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(slot)
                .or_default()
                .record(tokens, today);
        }

        self.settings.update_local(|s| {
            if s.usage_is_stale(today) {
                info!("New day detected, resetting daily token usage");
                s.today_tokens_used = 0;
            }
            s.usage_date = Some(today);
            s.today_tokens_used += tokens;
            s.total_tokens_used += tokens;

            if let Some(CredentialId::User(index)) = credential {
                match s.credentials.get_mut(index) {
                    Some(managed) => managed.usage.record(tokens, today),
                    None => warn!(index, "Usage recorded for unknown user credential"),
                }
            }

            if let Some(entry) = entry {
                s.push_request(entry);
            }
        });
    }

    /// Zeroes every per-day counter.
    pub async fn reset_daily(&self) {
        let today = self.today();
        for usage in self
            .env_usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values_mut()
        {
            usage.tokens_used_today = 0;
            usage.last_reset_date = Some(today);
        }
        self.settings.update_local(|s| {
            s.today_tokens_used = 0;
            s.usage_date = Some(today);
            for managed in s.credentials.iter_mut() {
                managed.usage.tokens_used_today = 0;
                managed.usage.last_reset_date = Some(today);
            }
        });
        self.settings.persist().await;
    }

    pub async fn set_daily_budget(&self, budget: u64) {
        self.settings
            .update_local(|s: &mut UserSettings| s.daily_token_budget = budget);
        self.settings.persist().await;
    }

    /// Today's tokens for one credential, zero when it has not been used today.
    pub fn credential_usage(&self, id: CredentialId) -> u64 {
        let today = self.today();
        let usage = match id {
            CredentialId::Env(slot) => self
                .env_usage
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&slot)
                .cloned(),
            CredentialId::User(index) => self
                .settings
                .read(|s| s.credentials.get(index).map(|c| c.usage.clone())),
        };
        usage
            .filter(|u| u.last_reset_date == Some(today))
            .map(|u| u.tokens_used_today)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::ManagedCredential;
    use crate::memory::InMemorySettingsStore;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use uuid::Uuid;

    fn setup(
        settings: UserSettings,
    ) -> (TokenBudgetTracker, Arc<ManualClock>, Arc<InMemorySettingsStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemorySettingsStore::new());
        let handle = Arc::new(SettingsHandle::with_settings(
            store.clone(),
            Uuid::new_v4(),
            settings,
        ));
        (TokenBudgetTracker::new(handle, clock.clone()), clock, store)
    }

    fn entry(clock: &ManualClock, input: u64, output: u64) -> RequestLogEntry {
        RequestLogEntry {
            timestamp: clock.now(),
            model: "gemini".to_string(),
            tokens_input: input,
            tokens_output: output,
            feature: "test".to_string(),
            cached: false,
        }
    }

    #[tokio::test]
    async fn usage_reports_remaining_and_percentage() {
        let settings = UserSettings {
            daily_token_budget: 1000,
            ..Default::default()
        };
        let (tracker, _, store) = setup(settings);

        tracker.add_usage(150, 100, None).await;

        let usage = tracker.usage();
        assert_eq!(usage.today, 250);
        assert_eq!(usage.remaining, 750);
        assert_eq!(usage.percentage, 25.0);
        assert_eq!(usage.lifetime, 250);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn remaining_never_goes_negative() {
        let settings = UserSettings {
            daily_token_budget: 100,
            ..Default::default()
        };
        let (tracker, _, _) = setup(settings);

        tracker.add_usage(90, 60, None).await;

        let usage = tracker.usage();
        assert_eq!(usage.remaining, 0);
        assert!(!tracker.has_capacity());
    }

    #[tokio::test]
    async fn global_counter_rolls_over_with_request_log() {
        let (tracker, clock, _) = setup(UserSettings::default());

        tracker.record_dispatch(entry(&clock, 10, 10), None).await;
        assert_eq!(tracker.usage().today, 20);

        clock.advance(Duration::from_secs(24 * 3600));
        assert_eq!(tracker.usage().today, 0);

        tracker.record_dispatch(entry(&clock, 5, 0), None).await;
        let usage = tracker.usage();
        assert_eq!(usage.today, 5);
        assert_eq!(usage.lifetime, 25);
    }

    #[tokio::test]
    async fn add_usage_accumulates_on_a_new_day() {
        let (tracker, clock, _) = setup(UserSettings::default());
        tracker.record_dispatch(entry(&clock, 1, 0), None).await;

        clock.advance(Duration::from_secs(24 * 3600));
        tracker.set_daily_budget(100).await;
        tracker.add_usage(60, 0, None).await;
        tracker.add_usage(60, 0, None).await;

        let usage = tracker.usage();
        assert_eq!(usage.today, 120);
        assert_eq!(usage.lifetime, 121);
        assert!(!tracker.has_capacity());
    }

    #[tokio::test]
    async fn per_credential_counters_are_independent() {
        let settings = UserSettings {
            credentials: vec![ManagedCredential::new("k", None)],
            ..Default::default()
        };
        let (tracker, _, _) = setup(settings);

        tracker
            .add_usage(10, 5, Some(CredentialId::User(0)))
            .await;
        tracker
            .add_usage(1, 1, Some(CredentialId::Env(EnvSlot::Numbered(1))))
            .await;

        assert_eq!(tracker.credential_usage(CredentialId::User(0)), 15);
        assert_eq!(
            tracker.credential_usage(CredentialId::Env(EnvSlot::Numbered(1))),
            2
        );
        assert_eq!(tracker.usage().today, 17);
    }

    #[tokio::test]
    async fn reset_daily_zeroes_every_counter() {
        let settings = UserSettings {
            credentials: vec![ManagedCredential::new("k", None)],
            ..Default::default()
        };
        let (tracker, _, _) = setup(settings);
        tracker.add_usage(10, 5, Some(CredentialId::User(0))).await;
        tracker
            .add_usage(3, 3, Some(CredentialId::Env(EnvSlot::Single)))
            .await;

        tracker.reset_daily().await;

        assert_eq!(tracker.usage().today, 0);
        assert_eq!(tracker.usage().lifetime, 21);
        assert_eq!(tracker.credential_usage(CredentialId::User(0)), 0);
        assert_eq!(tracker.credential_usage(CredentialId::Env(EnvSlot::Single)), 0);
    }
}
