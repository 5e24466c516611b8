// In-process schema store
use crate::application::schema_store::{CodePolicy, SchemaStore, StoreError, assign_identity};
use crate::domain::dashboard::DashboardSchema;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Documents {
    by_id: HashMap<String, DashboardSchema>,
    by_code: HashMap<String, String>,
}

/// Documents and the unique code index live under one lock, so a replace
/// is never observed half-applied.
#[derive(Default)]
pub struct MemorySchemaStore {
    docs: RwLock<Documents>,
    policy: CodePolicy,
}

impl MemorySchemaStore {
    pub fn new(policy: CodePolicy) -> Self {
        Self {
            docs: RwLock::new(Documents::default()),
            policy,
        }
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn get_by_code(&self, code: &str) -> Result<Option<DashboardSchema>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .by_code
            .get(code)
            .and_then(|id| docs.by_id.get(id))
            .cloned())
    }

    async fn save(&self, mut schema: DashboardSchema) -> Result<DashboardSchema, StoreError> {
        schema.validate()?;

        let mut docs = self.docs.write().await;
        let code_owner = docs.by_code.get(&schema.code).map(String::as_str);
        let stored_code = schema
            .id
            .as_deref()
            .and_then(|id| docs.by_id.get(id))
            .map(|d| d.code.as_str());
        let id = assign_identity(&schema, code_owner, stored_code, self.policy)?;

        schema.id = Some(id.clone());
        docs.by_code.insert(schema.code.clone(), id.clone());
        docs.by_id.insert(id, schema.clone());

        Ok(schema)
    }
}
