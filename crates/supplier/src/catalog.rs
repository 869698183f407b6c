//! Catalog ingestion executor.
//!
//! Walks the job's categories page by page, upserting each page before
//! asking for the next. Whatever stops an attempt early, the outcome carries
//! the counts so far and the cursor of the first page not yet persisted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use sync_core::{Job, Outcome, ProgressDelta, SyncCursor};
use telemetry::metrics;
use worker::JobExecutor;

use crate::client::SupplierClient;
use crate::costs::Operation;
use crate::error::SupplierError;
use crate::sink::ProductSink;

const PRODUCTS_QUERY: &str = r#"
query Products($category: String!, $first: Int!, $after: String) {
  products(category: $category, first: $first, after: $after) {
    nodes { id sku title price currency stock updatedAt }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a category listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub items: Vec<Value>,
    pub page_info: PageInfo,
}

impl ProductPage {
    /// Cursor to request next, or `None` once the category is exhausted.
    pub fn next_cursor(&self) -> Option<&str> {
        if self.page_info.has_next_page {
            self.page_info.end_cursor.as_deref()
        } else {
            None
        }
    }
}

/// Paged product listing.
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    async fn fetch_page(
        &self,
        category: &str,
        after: Option<&str>,
        first: u32,
    ) -> Result<ProductPage, SupplierError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductConnection {
    nodes: Vec<Value>,
    page_info: PageInfo,
}

#[async_trait]
impl CatalogSource for SupplierClient {
    async fn fetch_page(
        &self,
        category: &str,
        after: Option<&str>,
        first: u32,
    ) -> Result<ProductPage, SupplierError> {
        let variables = json!({ "category": category, "first": first, "after": after });
        let mut response = self
            .query(Operation::ProductList, PRODUCTS_QUERY, variables)
            .await?;

        let products = response
            .data
            .get_mut("products")
            .map(Value::take)
            .ok_or_else(|| SupplierError::Malformed("response has no products".into()))?;
        let connection: ProductConnection = serde_json::from_value(products)
            .map_err(|e| SupplierError::Malformed(format!("invalid products connection: {}", e)))?;

        Ok(ProductPage {
            items: connection.nodes,
            page_info: connection.page_info,
        })
    }
}

/// Runs catalog sync jobs against a source and a sink.
pub struct CatalogExecutor<C, S> {
    source: Arc<C>,
    sink: Arc<S>,
    page_size: u32,
}

impl<C: CatalogSource, S: ProductSink> CatalogExecutor<C, S> {
    pub fn new(source: Arc<C>, sink: Arc<S>, page_size: u32) -> Self {
        Self {
            source,
            sink,
            page_size: page_size.max(1),
        }
    }

    async fn run(&self, job: &Job) -> Outcome {
        let start = job.cursor.clone().unwrap_or_default();
        let mut delta = ProgressDelta::new();

        if start.category_index > 0 || start.page_cursor.is_some() {
            info!(
                job_id = %job.id,
                category_index = start.category_index,
                page_cursor = start.page_cursor.as_deref().unwrap_or_default(),
                "Resuming catalog sync"
            );
        }

        for (index, category) in job.categories.iter().enumerate().skip(start.category_index) {
            let mut after = if index == start.category_index {
                start.page_cursor.clone()
            } else {
                None
            };

            loop {
                let page = match self
                    .source
                    .fetch_page(category, after.as_deref(), self.page_size)
                    .await
                {
                    Ok(page) => page,
                    Err(err) => {
                        delta.cursor = Some(SyncCursor {
                            category_index: index,
                            page_cursor: after,
                        });
                        return err.into_outcome(delta);
                    }
                };

                let counts = match self.sink.upsert(category, &page.items).await {
                    Ok(counts) => counts,
                    Err(e) => {
                        delta.cursor = Some(SyncCursor {
                            category_index: index,
                            page_cursor: after,
                        });
                        return Outcome::transient(format!("failed to persist products: {}", e))
                            .with_progress(delta);
                    }
                };

                let fetched = page.items.len() as u64;
                delta.fetched += fetched;
                delta.created += counts.created;
                delta.updated += counts.updated;
                delta.unchanged += counts.unchanged;
                metrics().items_fetched.inc_by(fetched);

                debug!(job_id = %job.id, category, fetched, "Processed catalog page");

                match page.next_cursor() {
                    Some(next) => after = Some(next.to_string()),
                    None => break,
                }
            }
        }

        Outcome::success(delta)
    }
}

#[async_trait]
impl<C: CatalogSource, S: ProductSink> JobExecutor for CatalogExecutor<C, S> {
    async fn execute(&self, job: &Job) -> Outcome {
        self.run(job).await
    }
}
