//! Product persistence for fetched catalog pages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sync_core::{Error, Result, StoreErrorCode};

/// How a batch of products landed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
}

/// Destination for fetched products.
#[async_trait]
pub trait ProductSink: Send + Sync + 'static {
    /// Inserts or updates `items`, keyed by their `id` field.
    async fn upsert(&self, category: &str, items: &[Value]) -> Result<UpsertCounts>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredProduct {
    category: String,
    data: Value,
}

/// Product catalog kept as one JSON document keyed by product id.
#[derive(Debug)]
pub struct FileProductSink {
    path: PathBuf,
    products: Mutex<BTreeMap<String, StoredProduct>>,
}

impl FileProductSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let products = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Error::store(
                    StoreErrorCode::ReadFailed,
                    format!("failed to read {}: {}", path.display(), e),
                ))
            }
        };

        info!(path = %path.display(), products = products.len(), "Opened product catalog");
        Ok(Self {
            path,
            products: Mutex::new(products),
        })
    }

    pub async fn len(&self) -> usize {
        self.products.lock().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<Value> {
        self.products.lock().await.get(id).map(|p| p.data.clone())
    }

    async fn persist(&self, products: &BTreeMap<String, StoredProduct>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(products)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| write_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_error(&self.path, e))
    }
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::store(
        StoreErrorCode::WriteFailed,
        format!("failed to write {}: {}", path.display(), e),
    )
}

fn product_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ProductSink for FileProductSink {
    async fn upsert(&self, category: &str, items: &[Value]) -> Result<UpsertCounts> {
        let mut products = self.products.lock().await;
        let before = products.clone();
        let mut counts = UpsertCounts::default();

        for item in items {
            let Some(id) = product_id(item) else {
                warn!(category, "Skipping product without id");
                continue;
            };
            let incoming = StoredProduct {
                category: category.to_string(),
                data: item.clone(),
            };
            match products.insert(id, incoming.clone()) {
                None => counts.created += 1,
                Some(previous) if previous == incoming => counts.unchanged += 1,
                Some(_) => counts.updated += 1,
            }
        }

        if counts.created + counts.updated > 0 {
            if let Err(e) = self.persist(&products).await {
                *products = before;
                return Err(e);
            }
        }

        debug!(
            category,
            created = counts.created,
            updated = counts.updated,
            unchanged = counts.unchanged,
            "Upserted products"
        );
        Ok(counts)
    }
}
