// Dashboard service - Use cases for reading and saving dashboard schemas
use crate::application::schema_store::{SchemaStore, StoreError};
use crate::domain::dashboard::DashboardSchema;
use std::sync::Arc;

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn SchemaStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<DashboardSchema>, StoreError> {
        self.store.get_by_code(code).await
    }

    pub async fn save(&self, schema: DashboardSchema) -> Result<DashboardSchema, StoreError> {
        let saved = self.store.save(schema).await?;
        tracing::info!(
            code = %saved.code,
            id = saved.id.as_deref().unwrap_or_default(),
            widgets = saved.widgets.len(),
            "dashboard saved"
        );
        Ok(saved)
    }
}
