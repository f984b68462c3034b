use std::collections::HashMap;

use super::{Config, ConfigError};

/// Process run mode; controls redirects and strictness defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Debug,
    Test,
    Release,
}

impl RunMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "release" => RunMode::Release,
            "test" => RunMode::Test,
            _ => RunMode::Debug,
        }
    }

    pub fn is_release(self) -> bool {
        self == RunMode::Release
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Lifetime of freshly minted access tokens, in seconds.
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    /// Path prefixes that bypass the authorization step entirely.
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Directory scanned for dynamic plugin artifacts.
    pub path: String,
    pub hot_reload: bool,
    /// Whitelist; when non-empty only these plugin names load.
    pub includes: Vec<String>,
    /// Blacklist; consulted only when `includes` is empty.
    pub excludes: Vec<String>,
    /// Abort boot when any extension fails its lifecycle.
    pub strict_boot: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub master: String,
    pub slaves: Vec<String>,
    pub migrate: bool,
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub database: DatabaseConfig,
    pub redis: Option<String>,
    pub meili: Option<String>,
    pub elastic: Option<String>,
    pub mongo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub default_tags: Vec<String>,
    pub default_meta: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ConsulConfig {
    pub address: Option<String>,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub sign_in_url: String,
    pub sign_up_url: String,
}

/// Immutable typed configuration snapshot shared across the runtime.
///
/// Built once from the raw [`Config`] at boot and passed around as
/// `Arc<AppConfig>`; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run_mode: RunMode,
    pub domain: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub extension: ExtensionConfig,
    pub data: DataConfig,
    pub consul: ConsulConfig,
    pub frontend: FrontendConfig,
}

impl AppConfig {
    /// Project the raw dot-keyed config into the typed snapshot.
    ///
    /// Every section has a sensible default; only malformed values error.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(AppConfig {
            run_mode: RunMode::parse(&config.get_or("run_mode", "debug".to_string())),
            domain: config.get_or("domain", "localhost".to_string()),
            server: ServerConfig {
                host: config.get_or("server.host", "0.0.0.0".to_string()),
                port: config.get_or("server.port", 8080),
            },
            auth: AuthConfig {
                jwt: JwtConfig {
                    secret: config.get_or("auth.jwt.secret", String::new()),
                    token_ttl_secs: config.get_or("auth.jwt.token_ttl_secs", 7200),
                },
                whitelist: config.get_or("auth.whitelist", Vec::new()),
            },
            cors: CorsConfig {
                allow_origins: config.get_or("cors.allow_origins", vec!["*".to_string()]),
                allow_methods: config.get_or("cors.allow_methods", Vec::new()),
                allow_headers: config.get_or("cors.allow_headers", Vec::new()),
            },
            extension: ExtensionConfig {
                path: config.get_or("extension.path", "plugins".to_string()),
                hot_reload: config.get_or("extension.hot_reload", false),
                includes: config.get_or("extension.includes", Vec::new()),
                excludes: config.get_or("extension.excludes", Vec::new()),
                strict_boot: config.get_or("extension.strict_boot", false),
            },
            data: DataConfig {
                database: DatabaseConfig {
                    master: config.get_or("data.database.master", String::new()),
                    slaves: config.get_or("data.database.slaves", Vec::new()),
                    migrate: config.get_or("data.database.migrate", false),
                },
                redis: config.get("data.redis").ok(),
                meili: config.get("data.meili").ok(),
                elastic: config.get("data.elastic").ok(),
                mongo: config.get("data.mongo").ok(),
            },
            consul: ConsulConfig {
                address: config.get("consul.address").ok(),
                discovery: DiscoveryConfig {
                    default_tags: config.get_or("consul.discovery.default_tags", Vec::new()),
                    default_meta: config.strings_by_prefix("consul.discovery.default_meta"),
                },
            },
            frontend: FrontendConfig {
                sign_in_url: config.get_or("frontend.sign_in_url", "/sign-in".to_string()),
                sign_up_url: config.get_or("frontend.sign_up_url", "/sign-up".to_string()),
            },
        })
    }

    /// Whether `/` should redirect to the configured domain.
    ///
    /// A domain of `localhost` disables the redirect (heartbeat instead).
    pub fn redirect_enabled(&self) -> bool {
        self.domain != "localhost" && !self.domain.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig::from_config(&Config::empty()).expect("defaults never fail")
    }
}
