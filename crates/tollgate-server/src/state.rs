use std::sync::Arc;

use tollgate::limiter::{CounterStore, MemoryCounterStore, RateLimiter, RestCounterStore};
use tollgate::models::tool::ToolDefinition;
use tollgate::normalize::builtin_tools;
use tollgate::providers::elevenlabs::SpeechClient;
use tollgate::providers::openai::ChatClient;
use tollgate::providers::registry::{ModelMatcher, ProviderRegistry, ProviderTarget};
use tollgate::storage::{ObjectStore, SupabaseStore};

use crate::configuration::Settings;

/// Shared application state: everything here is constructed once at startup
/// and read-only afterwards, except the rate-limit counters behind the
/// limiter's store.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub chat: Arc<ChatClient>,
    pub speech: Arc<SpeechClient>,
    pub storage: Arc<dyn ObjectStore>,
    pub tools: Arc<Vec<ToolDefinition>>,
    pub default_model: String,
    pub max_tokens: Option<i32>,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let registry = ProviderRegistry::new(vec![
            ProviderTarget {
                id: "openai".to_string(),
                base_url: settings.providers.openai_host.clone(),
                credential: settings.providers.openai_api_key.clone(),
                matcher: ModelMatcher::Contains("gpt".to_string()),
                supports_vision: true,
                supports_tools: true,
            },
            ProviderTarget {
                id: "together".to_string(),
                base_url: settings.providers.together_host.clone(),
                credential: settings.providers.together_api_key.clone(),
                matcher: ModelMatcher::Any,
                supports_vision: false,
                supports_tools: true,
            },
        ]);

        let store: Box<dyn CounterStore> = match &settings.redis {
            Some(redis) => Box::new(RestCounterStore::new(
                redis.url.as_str(),
                redis.token.as_str(),
            )?),
            None => {
                tracing::warn!("no redis endpoint configured, rate limits are per-process");
                Box::new(MemoryCounterStore::new())
            }
        };
        let limiter = RateLimiter::new(store, settings.rate.limit, settings.rate.window());

        let speech = SpeechClient::new(
            settings.voice.host.as_str(),
            settings.voice.api_key.as_str(),
            settings.voice.voice_id.as_str(),
        )?;
        let storage = SupabaseStore::new(
            settings.storage.url.as_str(),
            settings.storage.service_key.as_str(),
            settings.storage.bucket.as_str(),
        )?;

        Ok(AppState {
            registry: Arc::new(registry),
            limiter: Arc::new(limiter),
            chat: Arc::new(ChatClient::new()?),
            speech: Arc::new(speech),
            storage: Arc::new(storage),
            tools: Arc::new(builtin_tools()),
            default_model: settings.providers.default_model,
            max_tokens: settings.providers.max_tokens,
        })
    }
}
