// File-backed schema store - one JSON document per identity
use crate::application::schema_store::{CodePolicy, SchemaStore, StoreError, assign_identity};
use crate::domain::dashboard::DashboardSchema;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

#[derive(Default)]
struct Index {
    /// code -> id
    by_code: HashMap<String, String>,
    /// id -> code
    by_id: HashMap<String, String>,
}

pub struct FileSchemaStore {
    dir: PathBuf,
    index: RwLock<Index>,
    policy: CodePolicy,
}

impl FileSchemaStore {
    /// Open (creating if needed) a store directory and index the documents
    /// already in it. Unreadable documents are logged and skipped.
    pub async fn open(dir: impl Into<PathBuf>, policy: CodePolicy) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = Index::default();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = document_id(&path) else {
                continue;
            };

            match read_document(&path).await {
                Ok(Some(schema)) => {
                    if let Some(previous) = index.by_code.insert(schema.code.clone(), id.clone()) {
                        tracing::warn!(code = %schema.code, kept = %id, dropped = %previous, "duplicate code on disk");
                    }
                    index.by_id.insert(id, schema.code);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable schema: {}", e),
            }
        }

        tracing::info!(dir = %dir.display(), documents = index.by_id.len(), "schema store opened");
        Ok(Self {
            dir,
            index: RwLock::new(index),
            policy,
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write to a temp file, fsync, then rename over the target.
    async fn write_document(&self, id: &str, schema: &DashboardSchema) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(schema)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        let tmp = self.dir.join(format!(".{}.json.tmp", id));

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, self.path_for(id)).await?;

        #[cfg(unix)]
        tokio::fs::File::open(&self.dir).await?.sync_all().await?;

        Ok(())
    }
}

#[async_trait]
impl SchemaStore for FileSchemaStore {
    async fn get_by_code(&self, code: &str) -> Result<Option<DashboardSchema>, StoreError> {
        let index = self.index.read().await;
        let Some(id) = index.by_code.get(code) else {
            return Ok(None);
        };

        let schema = read_document(&self.path_for(id)).await?;
        Ok(schema.map(|mut s| {
            s.id = Some(id.clone());
            s
        }))
    }

    async fn save(&self, mut schema: DashboardSchema) -> Result<DashboardSchema, StoreError> {
        schema.validate()?;
        if let Some(id) = &schema.id {
            if !is_safe_id(id) {
                return Err(StoreError::UnsupportedId(id.clone()));
            }
        }

        let mut index = self.index.write().await;
        let code_owner = index.by_code.get(&schema.code).map(String::as_str);
        let stored_code = schema
            .id
            .as_deref()
            .and_then(|id| index.by_id.get(id))
            .map(String::as_str);
        let id = assign_identity(&schema, code_owner, stored_code, self.policy)?;

        schema.id = Some(id.clone());
        self.write_document(&id, &schema).await?;

        index.by_code.insert(schema.code.clone(), id.clone());
        index.by_id.insert(id, schema.code.clone());

        Ok(schema)
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn document_id(path: &Path) -> Option<String> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    is_safe_id(stem).then(|| stem.to_string())
}

async fn read_document(path: &Path) -> Result<Option<DashboardSchema>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::StorageUnavailable(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dashboard::{DataBinding, WidgetConfig};
    use serde_json::json;
    use tempfile::TempDir;

    fn screen(code: &str, name: &str) -> DashboardSchema {
        DashboardSchema {
            id: None,
            code: code.into(),
            name: name.into(),
            canvas_config: None,
            widgets: vec![WidgetConfig {
                id: "w1".into(),
                kind: "line-chart".into(),
                props: json!({"smooth": true}).as_object().cloned(),
                position: None,
                data_binding: Some(DataBinding::poll("/api/data/online-users")),
            }],
        }
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let saved = {
            let store = FileSchemaStore::open(dir.path(), CodePolicy::Upsert).await.unwrap();
            store.save(screen("ops", "Ops")).await.unwrap()
        };

        let store = FileSchemaStore::open(dir.path(), CodePolicy::Upsert).await.unwrap();
        let fetched = store.get_by_code("ops").await.unwrap().unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_last_write_wins_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = FileSchemaStore::open(dir.path(), CodePolicy::Upsert).await.unwrap();
        store.save(screen("ops", "Before")).await.unwrap();
        store.save(screen("ops", "After")).await.unwrap();

        let documents = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "json"))
            .count();
        assert_eq!(documents, 1);
        assert_eq!(store.get_by_code("ops").await.unwrap().unwrap().name, "After");
    }

    #[tokio::test]
    async fn test_reject_policy_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FileSchemaStore::open(dir.path(), CodePolicy::Reject).await.unwrap();
        store.save(screen("ops", "Before")).await.unwrap();
        assert!(matches!(
            store.save(screen("ops", "After")).await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.get_by_code("ops").await.unwrap().unwrap().name, "Before");
    }

    #[tokio::test]
    async fn test_unsafe_id_refused() {
        let dir = TempDir::new().unwrap();
        let store = FileSchemaStore::open(dir.path(), CodePolicy::Upsert).await.unwrap();
        let mut schema = screen("ops", "Ops");
        schema.id = Some("../escape".into());
        assert!(matches!(store.save(schema).await, Err(StoreError::UnsupportedId(_))));
    }

    #[tokio::test]
    async fn test_corrupt_document_skipped_on_open() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let store = FileSchemaStore::open(dir.path(), CodePolicy::Upsert).await.unwrap();
        store.save(screen("ops", "Ops")).await.unwrap();
        assert!(store.get_by_code("ops").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = FileSchemaStore::open(dir.path().join("screens"), CodePolicy::Upsert)
            .await
            .unwrap();
        std::fs::remove_dir_all(dir.path().join("screens")).unwrap();

        let err = store.save(screen("ops", "Ops")).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
        assert!(store.get_by_code("ops").await.unwrap().is_none());
    }
}
