//! crates/nutrition_core/src/gateway.rs
//!
//! The failover dispatcher. One `AiGateway` owns the credential pool, the rate
//! limiter and the token ledger of a single user, and is the only path through
//! which the rest of the crate talks to the generative backend.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::budget::TokenBudgetTracker;
use crate::credentials::{CredentialPool, EnvCredentials};
use crate::domain::{
    Generation, GenerationRequest, ManagedCredential, RequestLogEntry, TokenCounts, TokenUsage,
};
use crate::json;
use crate::ports::{Clock, GenerativeBackend, PortError, PortResult};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{self, RetryPolicy};
use crate::settings::SettingsHandle;

/// Model used when neither the request nor the user's settings name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Characters per token assumed when the backend reports no usage.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_model: String,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct AiGateway {
    backend: Arc<dyn GenerativeBackend>,
    settings: Arc<SettingsHandle>,
    clock: Arc<dyn Clock>,
    pool: CredentialPool,
    limiter: RateLimiter,
    budget: TokenBudgetTracker,
    config: GatewayConfig,
}

impl AiGateway {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        settings: Arc<SettingsHandle>,
        clock: Arc<dyn Clock>,
        env: EnvCredentials,
        config: GatewayConfig,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            budget: TokenBudgetTracker::new(settings.clone(), clock.clone()),
            pool: CredentialPool::new(env),
            backend,
            settings,
            clock,
            config,
        }
    }

    pub fn settings(&self) -> &Arc<SettingsHandle> {
        &self.settings
    }

    pub fn budget(&self) -> &TokenBudgetTracker {
        &self.budget
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    //=====================================================================================
    // Dispatch
    //=====================================================================================

    /// Sends `request` to the backend, failing over across the whole pool.
    ///
    /// Returns `None` when the budget is spent, no credential is configured, or
    /// every credential failed.
    pub async fn generate(&self, request: GenerationRequest) -> Option<Generation> {
        if !self.budget.has_capacity() {
            info!(feature = %request.feature, "Daily token budget exhausted, skipping AI call");
            return None;
        }

        let pool = self.pool.get(&self.settings.read(|s| s.credentials.clone()));
        if pool.is_empty() {
            warn!("No AI credentials configured");
            return None;
        }

        self.limiter.acquire().await;

        let model = self.resolve_model(&request);
        let backend = self.backend.as_ref();
        let (model_ref, request_ref) = (model.as_str(), &request);

        for credential in pool.iter() {
            let outcome = retry::with_backoff(self.clock.as_ref(), &self.config.retry, move || {
                credential.attempt(backend, model_ref, request_ref)
            })
            .await;

            match outcome {
                Ok(reply) => {
                    let tokens = reply
                        .usage
                        .unwrap_or_else(|| estimate_tokens(&request, &reply.text));
                    let entry = RequestLogEntry {
                        timestamp: self.clock.now(),
                        model: model.clone(),
                        tokens_input: tokens.input,
                        tokens_output: tokens.output,
                        feature: request.feature.clone(),
                        cached: false,
                    };
                    self.budget.record_dispatch(entry, Some(credential.id())).await;

                    info!(
                        credential = %credential.id(),
                        model = %model,
                        tokens_input = tokens.input,
                        tokens_output = tokens.output,
                        "AI call succeeded"
                    );
                    return Some(Generation {
                        text: reply.text,
                        model,
                        credential: credential.id(),
                        tokens,
                    });
                }
                Err(e) => {
                    warn!(
                        credential = %credential.id(),
                        error = %e,
                        "Credential failed, trying next"
                    );
                }
            }
        }

        error!(pool_size = pool.len(), "All AI credentials failed");
        None
    }

    /// `generate` in structured-output mode, parsed as JSON.
    pub async fn generate_json(&self, request: GenerationRequest) -> Option<Value> {
        let generation = self.generate(request.json()).await?;
        json::parse_json_response(&generation.text)
    }

    /// `generate_json` deserialized straight into `T`.
    pub async fn generate_json_as<T: DeserializeOwned>(
        &self,
        request: GenerationRequest,
    ) -> Option<T> {
        let generation = self.generate(request.json()).await?;
        json::parse_json_as(&generation.text)
    }

    fn resolve_model(&self, request: &GenerationRequest) -> String {
        request
            .model
            .clone()
            .or_else(|| self.settings.read(|s| s.preferred_model.clone()))
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    //=====================================================================================
    // Status
    //=====================================================================================

    /// At least one usable credential and budget left for today.
    pub fn is_available(&self) -> bool {
        let pool = self.pool.get(&self.settings.read(|s| s.credentials.clone()));
        !pool.is_empty() && self.budget.has_capacity()
    }

    pub fn token_stats(&self) -> TokenUsage {
        self.budget.usage()
    }

    pub fn recent_requests(&self, limit: usize) -> Vec<RequestLogEntry> {
        self.settings.read(|s| {
            s.request_log
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect()
        })
    }

    pub async fn reset_daily_usage(&self) {
        self.budget.reset_daily().await;
    }

    pub async fn set_daily_budget(&self, budget: u64) {
        self.budget.set_daily_budget(budget).await;
    }

    //=====================================================================================
    // Credential management
    //=====================================================================================

    // Each change invalidates the pool, also when the settings write fails and
    // the change is rolled back.

    /// Adds a user-managed credential. Returns its index.
    pub async fn add_credential(&self, secret: &str, label: Option<String>) -> PortResult<usize> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(PortError::Unexpected("credential secret is empty".to_string()));
        }
        let index = self
            .settings
            .update(|s| {
                s.credentials.push(ManagedCredential::new(secret, label));
                s.credentials.len() - 1
            })
            .await;
        self.pool.invalidate();
        index
    }

    pub async fn remove_credential(&self, index: usize) -> PortResult<()> {
        let outcome = self
            .settings
            .update(|s| {
                if index < s.credentials.len() {
                    s.credentials.remove(index);
                    Ok(())
                } else {
                    Err(PortError::NotFound(format!("credential {}", index)))
                }
            })
            .await;
        self.pool.invalidate();
        outcome?
    }

    pub async fn set_credential_enabled(&self, index: usize, enabled: bool) -> PortResult<()> {
        let outcome = self
            .settings
            .update(|s| match s.credentials.get_mut(index) {
                Some(credential) => {
                    credential.enabled = enabled;
                    Ok(())
                }
                None => Err(PortError::NotFound(format!("credential {}", index))),
            })
            .await;
        self.pool.invalidate();
        outcome?
    }

    /// Forces the next dispatch to rebuild the pool.
    pub fn rebuild_pool(&self) {
        self.pool.invalidate();
    }
}

/// Rough token counts at four characters per token, rounded up.
fn estimate_tokens(request: &GenerationRequest, output: &str) -> TokenCounts {
    let input_chars = request.prompt.chars().count()
        + request
            .system_instruction
            .as_deref()
            .map(|s| s.chars().count())
            .unwrap_or(0);
    TokenCounts {
        input: input_chars.div_ceil(CHARS_PER_TOKEN) as u64,
        output: output.chars().count().div_ceil(CHARS_PER_TOKEN) as u64,
    }
}
