//! Environment-sourced settings, grounded in `original_source/apps/fm-app/fm_app/config.py`'s
//! env-var-constant convention. Every field is read once at startup;
//! `ConfigError` is fatal and non-recoverable per the spec's error policy.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Warehouse connection parameters (`DATABASE_WH_*`).
#[derive(Clone, Debug)]
pub struct WarehouseSettings {
    pub user: String,
    pub pass: String,
    pub server: String,
    pub port: u16,
    pub db: String,
    pub params: String,
    pub driver: String,
}

/// One provider's key/url/model triple; absent providers are simply
/// unavailable to `FlowRunner` dispatch rather than a startup error.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Two JWKS issuers (`OIDC_*`, `GUEST_ISSUER_HOST`) a bearer token may be
/// verified against.
#[derive(Clone, Debug, Default)]
pub struct AuthSettings {
    pub oidc_domain: Option<String>,
    pub oidc_audience: Option<String>,
    pub oidc_issuer: Option<String>,
    pub oidc_algorithms: Option<String>,
    pub guest_issuer_host: Option<String>,
}

/// Prompt pack resolution parameters (`PACKS_*`).
#[derive(Clone, Debug)]
pub struct PackSettings {
    pub resources_dir: String,
    pub client_id: String,
    pub env: String,
    pub system_version: String,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub warehouse: WarehouseSettings,
    /// Application DB connection string; `None` means fall back to the
    /// in-memory store, which is also the default for tests.
    pub database_url: Option<String>,
    pub auth: AuthSettings,
    pub llm_providers: Vec<ProviderSettings>,
    pub broker_connection: Option<String>,
    pub packs: PackSettings,
    pub max_steps: u32,
    pub log_level: String,
    pub json_log: bool,
    pub worker_concurrency: u32,
    pub listen_addr: String,
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env(key).unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: key_to_static(key),
            reason: format!("could not parse `{raw}`"),
        }),
    }
}

/// `env_parsed`'s error carries a `&'static str` field name; this maps the
/// small fixed set of keys we parse non-strings from, since `key` itself
/// is a runtime `&str` borrowed from the call site.
fn key_to_static(key: &str) -> &'static str {
    match key {
        "DATABASE_WH_PORT" => "DATABASE_WH_PORT",
        "MAX_STEPS" => "MAX_STEPS",
        "WORKER_CONCURRENCY" => "WORKER_CONCURRENCY",
        "JSON_LOG" => "JSON_LOG",
        _ => "unknown",
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let warehouse = WarehouseSettings {
            user: env_or("DATABASE_WH_USER", "default"),
            pass: env_or("DATABASE_WH_PASS", ""),
            server: env_or("DATABASE_WH_SERVER", "localhost"),
            port: env_parsed("DATABASE_WH_PORT", 8123)?,
            db: env_or("DATABASE_WH_DB", "default"),
            params: env_or("DATABASE_WH_PARAMS", ""),
            driver: env_or("DATABASE_WH_DRIVER", "http"),
        };

        let auth = AuthSettings {
            oidc_domain: env("OIDC_DOMAIN"),
            oidc_audience: env("OIDC_AUDIENCE"),
            oidc_issuer: env("OIDC_ISSUER"),
            oidc_algorithms: env("OIDC_ALGORITHMS"),
            guest_issuer_host: env("GUEST_ISSUER_HOST"),
        };

        let mut llm_providers = Vec::new();
        for (name, prefix) in [
            ("openai", "OPENAI"),
            ("anthropic", "ANTHROPIC"),
            ("azure", "AZURE_OPENAI"),
        ] {
            if let Some(api_key) = env(&format!("{prefix}_API_KEY")) {
                llm_providers.push(ProviderSettings {
                    name: name.to_string(),
                    api_key,
                    base_url: env_or(&format!("{prefix}_URL"), default_url_for(name)),
                    model: env_or(&format!("{prefix}_MODEL"), default_model_for(name)),
                });
            }
        }

        let packs = PackSettings {
            resources_dir: env_or("PACKS_RESOURCES_DIR", "./resources"),
            client_id: env_or("CLIENT_ID", "default"),
            env: env_or("ENV", "dev"),
            system_version: env_or("SYSTEM_VERSION", "latest"),
        };

        Ok(Settings {
            warehouse,
            database_url: env("DATABASE_URL"),
            auth,
            llm_providers,
            broker_connection: env("WRK_BROKER_CONNECTION"),
            packs,
            max_steps: env_parsed("MAX_STEPS", 6)?,
            log_level: env_or("LOG_LEVEL", "info"),
            json_log: env_parsed("JSON_LOG", false)?,
            worker_concurrency: env_parsed("WORKER_CONCURRENCY", 4)?,
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:8080"),
        })
    }
}

fn default_url_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        "azure" => "",
        "anthropic" => "https://api.anthropic.com/v1",
        _ => "",
    }
}

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o-mini",
        "azure" => "gpt-4o-mini",
        "anthropic" => "claude-3-5-sonnet-latest",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn falls_back_to_in_memory_store_when_database_url_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        let settings = Settings::from_env().unwrap();
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn absent_providers_are_simply_unavailable() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in ["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "AZURE_OPENAI_API_KEY"] {
            std::env::remove_var(key);
        }
        let settings = Settings::from_env().unwrap();
        assert!(settings.llm_providers.is_empty());
    }

    #[test]
    fn rejects_malformed_numeric_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MAX_STEPS", "not-a-number");
        let err = Settings::from_env().unwrap_err();
        std::env::remove_var("MAX_STEPS");
        assert!(matches!(err, ConfigError::InvalidValue { field: "MAX_STEPS", .. }));
    }
}
