use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port).parse().map_err(|_| {
            ConfigError::Other(config::ConfigError::Message(format!(
                "invalid listen address {}:{}",
                self.host, self.port
            )))
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub openai_host: String,
    pub openai_api_key: String,
    #[serde(default = "default_together_host")]
    pub together_host: String,
    pub together_api_key: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RateSettings {
    #[serde(default = "default_rate_limit")]
    pub limit: u32,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

impl Default for RateSettings {
    fn default() -> Self {
        RateSettings {
            limit: default_rate_limit(),
            window_secs: default_rate_window_secs(),
        }
    }
}

impl RateSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub url: String,
    pub service_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_voice_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub providers: ProviderSettings,
    #[serde(default)]
    pub rate: RateSettings,
    #[serde(default)]
    pub redis: Option<RedisSettings>,
    pub storage: StorageSettings,
    pub voice: VoiceSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TOLLGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Surface missing required fields as the environment variable the
        // operator needs to set, rather than a serde path.
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_together_host() -> String {
    "https://api.together.xyz".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> Option<i32> {
    Some(500)
}

fn default_rate_limit() -> u32 {
    tollgate::limiter::DEFAULT_LIMIT
}

fn default_rate_window_secs() -> u64 {
    tollgate::limiter::DEFAULT_WINDOW.as_secs()
}

fn default_bucket() -> String {
    "uploads".to_string()
}

fn default_voice_host() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}
