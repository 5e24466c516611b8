// Data provider registry - maps binding sources to metric providers
use crate::domain::dashboard::DataBinding;
use crate::domain::metric::MetricValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no provider registered for `{0}`")]
    UnknownBinding(String),
    #[error("provider failed: {0}")]
    Failed(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Something that yields the current value of one metric.
///
/// Implementations are shared by every session subscribed to the same
/// source and must tolerate concurrent calls.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    async fn produce(&self) -> Result<MetricValue, ProviderError>;
}

/// Immutable source -> provider mapping, built once at startup and shared
/// read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MetricProvider>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    pub fn resolve(&self, binding: &DataBinding) -> Result<Arc<dyn MetricProvider>, ProviderError> {
        let source = binding
            .source()
            .ok_or_else(|| ProviderError::UnknownBinding(String::new()))?;
        self.resolve_source(source)
    }

    pub fn resolve_source(&self, source: &str) -> Result<Arc<dyn MetricProvider>, ProviderError> {
        self.providers
            .get(source)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownBinding(source.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, Arc<dyn MetricProvider>>,
}

impl ProviderRegistryBuilder {
    /// Register a provider; a later registration for the same source wins.
    pub fn register(mut self, source: impl Into<String>, provider: Arc<dyn MetricProvider>) -> Self {
        let source = source.into();
        if self.providers.insert(source.clone(), provider).is_some() {
            tracing::warn!(source = %source, "provider registered twice, keeping the last one");
        }
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dashboard::BindingMode;

    struct Fixed(i64);

    #[async_trait]
    impl MetricProvider for Fixed {
        async fn produce(&self) -> Result<MetricValue, ProviderError> {
            Ok(MetricValue::new(self.0))
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builder()
            .register("online-users", Arc::new(Fixed(1)))
            .register("cpu", Arc::new(Fixed(2)))
            .build()
    }

    #[tokio::test]
    async fn test_resolves_topic_and_api_paths_to_same_provider() {
        let registry = registry();
        let by_topic = registry.resolve(&DataBinding::stream("online-users", None)).unwrap();
        let by_api = registry.resolve(&DataBinding::poll("/api/data/online-users")).unwrap();
        assert!(Arc::ptr_eq(&by_topic, &by_api));
        assert_eq!(by_topic.produce().await.unwrap().value, 1);
    }

    #[test]
    fn test_unknown_source() {
        let registry = registry();
        let err = registry.resolve(&DataBinding::stream("disk", None)).err();
        assert_eq!(err, Some(ProviderError::UnknownBinding("disk".into())));

        let sourceless = DataBinding {
            mode: BindingMode::Stream,
            api: None,
            topic: None,
            interval: None,
        };
        assert!(matches!(
            registry.resolve(&sourceless),
            Err(ProviderError::UnknownBinding(_))
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = ProviderRegistry::builder()
            .register("cpu", Arc::new(Fixed(1)))
            .register("cpu", Arc::new(Fixed(2)))
            .build();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sources().collect::<Vec<_>>(), vec!["cpu"]);
    }
}
