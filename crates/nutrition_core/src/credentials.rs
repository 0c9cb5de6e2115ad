//! Credential pool: the ordered list of secrets the gateway fails over across.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::domain::{
    BackendReply, CredentialId, EnvSlot, GenerationRequest, ManagedCredential,
};
use crate::ports::{GenerativeBackend, PortResult};

/// Number of numbered environment slots scanned before the legacy ones.
pub const NUMBERED_SLOTS: usize = 8;

/// Credentials supplied through the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    /// Slot `i` holds the credential numbered `i + 1`.
    pub numbered: Vec<Option<String>>,
    /// Legacy comma-separated list.
    pub combined: Option<String>,
    /// Legacy single credential.
    pub single: Option<String>,
}

impl EnvCredentials {
    /// Environment credentials in pool order. The legacy slots are only read
    /// when no numbered slot is filled.
    pub fn resolve(&self) -> Vec<(EnvSlot, String)> {
        let numbered: Vec<(EnvSlot, String)> = self
            .numbered
            .iter()
            .take(NUMBERED_SLOTS)
            .enumerate()
            .filter_map(|(i, slot)| {
                non_blank(slot.as_deref()).map(|secret| (EnvSlot::Numbered(i as u8 + 1), secret))
            })
            .collect();
        if !numbered.is_empty() {
            return numbered;
        }

        if let Some(combined) = non_blank(self.combined.as_deref()) {
            let entries: Vec<(EnvSlot, String)> = combined
                .split(',')
                .filter_map(|part| non_blank(Some(part)))
                .enumerate()
                .map(|(i, secret)| (EnvSlot::Combined(i), secret))
                .collect();
            if !entries.is_empty() {
                return entries;
            }
        }

        non_blank(self.single.as_deref())
            .map(|secret| vec![(EnvSlot::Single, secret)])
            .unwrap_or_default()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A usable credential, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Env { slot: EnvSlot, secret: String },
    User { index: usize, secret: String },
}

impl Credential {
    pub fn id(&self) -> CredentialId {
        match self {
            Credential::Env { slot, .. } => CredentialId::Env(*slot),
            Credential::User { index, .. } => CredentialId::User(*index),
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Credential::Env { secret, .. } | Credential::User { secret, .. } => secret,
        }
    }

    /// Runs one backend call with this credential.
    pub async fn attempt(
        &self,
        backend: &dyn GenerativeBackend,
        model: &str,
        request: &GenerationRequest,
    ) -> PortResult<BackendReply> {
        debug!(credential = %self.id(), model, "Dispatching to generative backend");
        backend.generate(self.secret(), model, request).await
    }
}

/// Builds the pool from environment and user-managed credentials.
pub fn build_pool(env: &EnvCredentials, managed: &[ManagedCredential]) -> Vec<Credential> {
    let mut seen = HashSet::new();
    let mut pool = Vec::new();

    for (slot, secret) in env.resolve() {
        if seen.insert(secret.clone()) {
            pool.push(Credential::Env { slot, secret });
        }
    }

    for (index, credential) in managed.iter().enumerate() {
        if !credential.enabled {
            continue;
        }
        let secret = credential.secret.trim();
        if secret.is_empty() || !seen.insert(secret.to_string()) {
            continue;
        }
        pool.push(Credential::User {
            index,
            secret: secret.to_string(),
        });
    }

    pool
}

/// Memoizes `build_pool` until `invalidate` is called.
pub struct CredentialPool {
    env: EnvCredentials,
    cached: Mutex<Option<Arc<Vec<Credential>>>>,
}

impl CredentialPool {
    pub fn new(env: EnvCredentials) -> Self {
        Self {
            env,
            cached: Mutex::new(None),
        }
    }

    /// The memoized pool, building it from `managed` on first use.
    pub fn get(&self, managed: &[ManagedCredential]) -> Arc<Vec<Credential>> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = cached.as_ref() {
            return pool.clone();
        }

        let pool = Arc::new(build_pool(&self.env, managed));
        info!(size = pool.len(), "Built credential pool");
        *cached = Some(pool.clone());
        pool
    }

    /// Drops the memoized pool so the next `get` rebuilds it.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(slots: &[(usize, &str)]) -> Vec<Option<String>> {
        let mut out = vec![None; NUMBERED_SLOTS];
        for (i, secret) in slots {
            out[*i] = Some(secret.to_string());
        }
        out
    }

    #[test]
    fn numbered_slots_take_precedence_over_legacy() {
        let env = EnvCredentials {
            numbered: numbered(&[(0, "k1"), (2, "k3")]),
            combined: Some("a,b".to_string()),
            single: Some("s".to_string()),
        };

        assert_eq!(
            env.resolve(),
            vec![
                (EnvSlot::Numbered(1), "k1".to_string()),
                (EnvSlot::Numbered(3), "k3".to_string()),
            ]
        );
    }

    #[test]
    fn combined_slot_is_split_and_trimmed() {
        let env = EnvCredentials {
            numbered: numbered(&[]),
            combined: Some(" a , ,b ".to_string()),
            single: Some("s".to_string()),
        };

        assert_eq!(
            env.resolve(),
            vec![
                (EnvSlot::Combined(0), "a".to_string()),
                (EnvSlot::Combined(1), "b".to_string()),
            ]
        );
    }

    #[test]
    fn single_slot_is_the_last_resort() {
        let env = EnvCredentials {
            single: Some("only".to_string()),
            ..Default::default()
        };
        assert_eq!(env.resolve(), vec![(EnvSlot::Single, "only".to_string())]);
    }

    #[test]
    fn pool_appends_enabled_user_credentials_and_skips_duplicates() {
        let env = EnvCredentials {
            single: Some("shared".to_string()),
            ..Default::default()
        };
        let mut disabled = ManagedCredential::new("off", None);
        disabled.enabled = false;
        let managed = vec![
            ManagedCredential::new("mine", Some("personal".to_string())),
            disabled,
            ManagedCredential::new("shared", None),
        ];

        let pool = build_pool(&env, &managed);

        let ids: Vec<CredentialId> = pool.iter().map(Credential::id).collect();
        assert_eq!(
            ids,
            vec![CredentialId::Env(EnvSlot::Single), CredentialId::User(0)]
        );
    }

    #[test]
    fn pool_is_memoized_until_invalidated() {
        let pool = CredentialPool::new(EnvCredentials::default());
        let first = vec![ManagedCredential::new("a", None)];
        let second = vec![
            ManagedCredential::new("a", None),
            ManagedCredential::new("b", None),
        ];

        assert_eq!(pool.get(&first).len(), 1);
        assert_eq!(pool.get(&second).len(), 1);

        pool.invalidate();
        assert_eq!(pool.get(&second).len(), 2);
    }
}
