// Repository trait for dashboard schema persistence
use crate::domain::dashboard::{DashboardSchema, SchemaError};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient; callers may retry with backoff.
    #[error("schema storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("code `{code}` already belongs to dashboard {existing_id}")]
    Conflict { code: String, existing_id: String },
    #[error("dashboard {id} has code `{stored}`, codes cannot change")]
    CodeImmutable { id: String, stored: String },
    #[error("identity `{0}` cannot be stored by this backend")]
    UnsupportedId(String),
    #[error(transparent)]
    Invalid(#[from] SchemaError),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::StorageUnavailable(e.to_string())
    }
}

/// What a save does when its code is already held by another identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePolicy {
    /// Adopt the existing identity and replace that document.
    #[default]
    Upsert,
    /// Refuse the save with `StoreError::Conflict`.
    Reject,
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Point lookup on the unique code index. A miss is `Ok(None)`.
    async fn get_by_code(&self, code: &str) -> Result<Option<DashboardSchema>, StoreError>;

    /// Insert or fully replace a document. Durable once this returns.
    async fn save(&self, schema: DashboardSchema) -> Result<DashboardSchema, StoreError>;
}

/// Decide the identity a save is written under.
///
/// `code_owner` is the id currently holding `schema.code`, `stored_code` is
/// the code currently stored under `schema.id` (if that id exists). Both
/// must be read under the same lock the write happens under.
pub fn assign_identity(
    schema: &DashboardSchema,
    code_owner: Option<&str>,
    stored_code: Option<&str>,
    policy: CodePolicy,
) -> Result<String, StoreError> {
    if let (Some(id), Some(stored)) = (schema.id.as_deref(), stored_code) {
        if stored != schema.code {
            return Err(StoreError::CodeImmutable {
                id: id.to_string(),
                stored: stored.to_string(),
            });
        }
    }

    match (schema.id.as_deref(), code_owner) {
        (Some(id), Some(owner)) if id == owner => Ok(id.to_string()),
        (_, Some(owner)) => match policy {
            CodePolicy::Upsert => Ok(owner.to_string()),
            CodePolicy::Reject => Err(StoreError::Conflict {
                code: schema.code.clone(),
                existing_id: owner.to_string(),
            }),
        },
        (Some(id), None) => Ok(id.to_string()),
        (None, None) => Ok(uuid::Uuid::new_v4().to_string()),
    }
}
