mod loader;
pub mod typed;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use typed::{
    AppConfig, AuthConfig, ConsulConfig, CorsConfig, DataConfig, DatabaseConfig, DiscoveryConfig,
    ExtensionConfig, FrontendConfig, JwtConfig, RunMode, ServerConfig,
};
pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Raw configuration loaded from YAML files, `.env` files, and environment
/// variables, flattened to dot-separated keys.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml` (base)
/// 2. `application-{profile}.yaml` (profile override)
/// 3. `.env` file (loaded into process environment)
/// 4. `.env.{profile}` file (loaded into process environment)
/// 5. Environment variables (e.g., `AUTH_JWT_SECRET` overrides `auth.jwt.secret`)
///
/// `.env` files never overwrite already-set environment variables.
///
/// Profile is determined by: `TESSERA_PROFILE` env var > argument > default `"dev"`.
///
/// Project the raw map into the immutable typed snapshot with
/// [`AppConfig::from_config`]; the typed snapshot is what the runtime shares.
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl Config {
    /// Load configuration for the given profile.
    ///
    /// Looks for `application.yaml` and `application-{profile}.yaml` in the
    /// current working directory, then overlays environment variables.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("TESSERA_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();

        loader::load_yaml_file(Path::new("application.yaml"), &mut values)?;
        let profile_path = format!("application-{active_profile}.yaml");
        loader::load_yaml_file(Path::new(&profile_path), &mut values)?;

        let _ = dotenvy::dotenv();
        let profile_env = format!(".env.{active_profile}");
        let _ = dotenvy::from_filename(&profile_env);

        // Overlay environment variables. Convention: `auth.jwt.secret` <-> `AUTH_JWT_SECRET`.
        for (env_key, env_val) in std::env::vars() {
            let config_key = env_key.to_lowercase().replace('_', ".");
            values.insert(config_key, ConfigValue::String(env_val));
        }

        Ok(Config {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(Config {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        Config {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for the given dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the key does not exist, or
    /// `ConfigError::TypeMismatch` if the value cannot be converted.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, returning a default if the key is missing or mistyped.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Check whether a key exists in the config.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Collect `child -> value` string pairs for every key under `prefix.`.
    ///
    /// Used for free-form map sections such as `consul.discovery.default_meta`.
    pub fn strings_by_prefix(&self, prefix: &str) -> HashMap<String, String> {
        let dotted = format!("{prefix}.");
        let mut out = HashMap::new();
        for (key, value) in &self.values {
            if let Some(child) = key.strip_prefix(&dotted) {
                if !child.contains('.') {
                    if let Ok(s) = String::from_config_value(value, key) {
                        out.insert(child.to_string(), s);
                    }
                }
            }
        }
        out
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}
