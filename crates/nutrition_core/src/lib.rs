pub mod budget;
pub mod clock;
pub mod credentials;
pub mod domain;
pub mod food_table;
pub mod gateway;
pub mod health;
pub mod json;
pub mod memory;
pub mod ports;
pub mod rate_limiter;
pub mod resolver;
pub mod retry;
pub mod search_index;
pub mod settings;

pub use clock::{ManualClock, SystemClock};
pub use credentials::{Credential, CredentialPool, EnvCredentials};
pub use domain::{
    BackendReply, CredentialId, EnvSlot, FoodSource, Generation, GenerationRequest, HealthImpact,
    ManagedCredential, MealAnalysis, MealItem, MealTotals, NutritionCacheEntry, RequestLogEntry,
    SharedFoodInput, SharedFoodRecord, TokenCounts, TokenUsage, UserSettings,
};
pub use gateway::{AiGateway, GatewayConfig};
pub use health::calculate_health_impact;
pub use ports::{
    Clock, GenerativeBackend, PortError, PortResult, SettingsStore, SharedFoodStore,
};
pub use resolver::{normalize, NutritionResolver};
pub use search_index::{generate_keywords, normalize_id, SharedFoodIndex};
pub use settings::SettingsHandle;
