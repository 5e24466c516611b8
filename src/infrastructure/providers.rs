// Metric provider implementations selected by deployment configuration
use crate::application::provider_registry::{MetricProvider, ProviderError, ProviderRegistry};
use crate::domain::metric::MetricValue;
use crate::infrastructure::config::{ProviderKind, ProvidersConfig};
use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Demo source: a uniform integer in `[min, max)` after a fixed latency.
#[derive(Debug, Clone)]
pub struct RandomProvider {
    min: i64,
    /// Inclusive, never below `min`
    upper: i64,
    latency: Duration,
}

impl RandomProvider {
    pub fn new(min: i64, max: i64, latency: Duration) -> Self {
        Self {
            min,
            upper: max.saturating_sub(1).max(min),
            latency,
        }
    }
}

#[async_trait]
impl MetricProvider for RandomProvider {
    async fn produce(&self) -> Result<MetricValue, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let value = rand::thread_rng().gen_range(self.min..=self.upper);
        Ok(MetricValue::new(value))
    }
}

#[derive(Debug, Clone)]
pub struct ConstantProvider {
    value: Value,
}

impl ConstantProvider {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[async_trait]
impl MetricProvider for ConstantProvider {
    async fn produce(&self) -> Result<MetricValue, ProviderError> {
        Ok(MetricValue::new(self.value.clone()))
    }
}

/// Reads one field out of a JSON document served by an upstream endpoint.
/// `field` is a top-level key, or a JSON pointer when it starts with `/`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    field: String,
}

impl HttpProvider {
    pub fn new(client: reqwest::Client, url: String, field: String) -> Self {
        Self { client, url, field }
    }

    fn extract(&self, doc: &Value) -> Option<Value> {
        if self.field.starts_with('/') {
            doc.pointer(&self.field).cloned()
        } else {
            doc.get(&self.field).cloned()
        }
    }
}

#[async_trait]
impl MetricProvider for HttpProvider {
    async fn produce(&self) -> Result<MetricValue, ProviderError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Failed(format!("request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Failed(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Failed(format!("bad payload from {}: {}", self.url, e)))?;

        self.extract(&doc)
            .map(MetricValue::new)
            .ok_or_else(|| ProviderError::Failed(format!("`{}` missing in {}", self.field, self.url)))
    }
}

/// Build the registry for a deployment's provider list.
pub fn build_registry(config: &ProvidersConfig) -> anyhow::Result<ProviderRegistry> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client for providers")?;

    let registry = config
        .providers
        .iter()
        .fold(ProviderRegistry::builder(), |builder, entry| {
            let provider: Arc<dyn MetricProvider> = match &entry.kind {
                ProviderKind::Random { min, max, latency_ms } => Arc::new(RandomProvider::new(
                    *min,
                    *max,
                    Duration::from_millis(*latency_ms),
                )),
                ProviderKind::Constant { value } => Arc::new(ConstantProvider::new(value.clone())),
                ProviderKind::Http { url, field } => {
                    Arc::new(HttpProvider::new(client.clone(), url.clone(), field.clone()))
                }
            };
            tracing::info!(source = %entry.source, kind = ?entry.kind, "registered metric provider");
            builder.register(entry.source.clone(), provider)
        })
        .build();

    Ok(registry)
}
