use crate::application::schema_store::CodePolicy;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub code_conflict: CodePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    /// Emission period for bindings that declare no interval
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    /// Lower clamp for client supplied intervals
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Consecutive failed ticks before a subscription is closed
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub source: String,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderKind {
    Random {
        #[serde(default)]
        min: i64,
        #[serde(default = "default_random_max")]
        max: i64,
        #[serde(default)]
        latency_ms: u64,
    },
    Constant {
        value: Value,
    },
    Http {
        url: String,
        #[serde(default = "default_field")]
        field: String,
    },
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dir: default_store_dir(),
            code_conflict: CodePolicy::default(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            failure_threshold: default_failure_threshold(),
            grace_period_ms: default_grace_period_ms(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

impl StreamingConfig {
    /// Emission period for a binding's optional interval.
    pub fn period(&self, interval_ms: Option<u64>) -> Duration {
        let ms = interval_ms
            .unwrap_or(self.default_interval_ms)
            .max(self.min_interval_ms)
            .max(1);
        Duration::from_millis(ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProvidersConfig {
    /// The demo binding served when a deployment configures nothing.
    pub fn demo() -> Self {
        Self {
            providers: vec![ProviderConfig {
                source: "online-users".to_string(),
                kind: ProviderKind::Random {
                    min: 0,
                    max: default_random_max(),
                    latency_ms: 50,
                },
            }],
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/screens")
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_min_interval_ms() -> u64 {
    50
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_grace_period_ms() -> u64 {
    2000
}

fn default_provider_timeout_ms() -> u64 {
    1000
}

fn default_random_max() -> i64 {
    1000
}

fn default_field() -> String {
    "value".to_string()
}

/// `config/dashboard.{toml,yaml,json}` if present, overridden by
/// `DASHBOARD__SECTION__KEY` environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_providers_config() -> anyhow::Result<ProvidersConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/providers").required(false))
        .build()?;

    let providers: ProvidersConfig = settings.try_deserialize()?;
    if providers.providers.is_empty() {
        tracing::info!("no providers configured, serving the demo `online-users` source");
        return Ok(ProvidersConfig::demo());
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse<T: serde::de::DeserializeOwned>(toml: &str) -> T {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_app_config_defaults() {
        let config: AppConfig = parse("");
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.store.code_conflict, CodePolicy::Upsert);
        assert_eq!(config.streaming.failure_threshold, 3);
        assert_eq!(config.streaming.period(None), Duration::from_millis(1000));
    }

    #[test]
    fn test_app_config_overrides() {
        let config: AppConfig = parse(
            r#"
            [server]
            port = 9000

            [store]
            kind = "file"
            dir = "/var/lib/screens"
            code_conflict = "reject"

            [streaming]
            default_interval_ms = 500
            min_interval_ms = 100
            failure_threshold = 5
            "#,
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.store.dir, PathBuf::from("/var/lib/screens"));
        assert_eq!(config.store.code_conflict, CodePolicy::Reject);
        assert_eq!(config.streaming.failure_threshold, 5);
        assert_eq!(config.streaming.period(None), Duration::from_millis(500));
        assert_eq!(config.streaming.period(Some(20)), Duration::from_millis(100));
        assert_eq!(config.streaming.period(Some(2500)), Duration::from_millis(2500));
    }

    #[test]
    fn test_providers_config() {
        let config: ProvidersConfig = parse(
            r#"
            [[providers]]
            source = "online-users"
            kind = "random"
            max = 500

            [[providers]]
            source = "build"
            kind = "constant"
            value = "v1.2.0"

            [[providers]]
            source = "orders"
            kind = "http"
            url = "http://metrics.internal/orders"
            "#,
        );
        assert_eq!(
            config.providers,
            vec![
                ProviderConfig {
                    source: "online-users".into(),
                    kind: ProviderKind::Random { min: 0, max: 500, latency_ms: 0 },
                },
                ProviderConfig {
                    source: "build".into(),
                    kind: ProviderKind::Constant { value: Value::from("v1.2.0") },
                },
                ProviderConfig {
                    source: "orders".into(),
                    kind: ProviderKind::Http {
                        url: "http://metrics.internal/orders".into(),
                        field: "value".into(),
                    },
                },
            ]
        );
    }
}
