//! Catalog executor driven by the scheduler, resuming across rate limits.

use std::sync::Arc;

use chrono::Duration;
use integration_tests::fixtures::{pending_job, product_page};
use integration_tests::mocks::ScriptedSource;
use integration_tests::setup::TestContext;
use supplier::{CatalogExecutor, FileProductSink, SupplierError};
use sync_core::{JobStatus, SyncCursor};

fn temp_catalog() -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("catalog-sync-{}", uuid::Uuid::new_v4()))
        .join("catalog.json")
}

#[tokio::test]
async fn test_throttled_sync_resumes_where_it_stopped() {
    let source = Arc::new(ScriptedSource::new());
    source.push_page(product_page(&["a", "b"], Some("c1")));
    source.push_error(SupplierError::Throttled {
        retry_after_secs: Some(45),
    });
    source.push_page(product_page(&["c"], None));
    source.push_page(product_page(&["d", "e"], None));

    let path = temp_catalog();
    let sink = Arc::new(FileProductSink::open(&path).await.unwrap());
    let ctx = TestContext::new(CatalogExecutor::new(source.clone(), sink.clone(), 2));
    let id = ctx.insert(pending_job(&["tools", "paint"], 3, ctx.now())).await;

    ctx.scheduler.run_tick().await;
    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::RateLimited);
    assert_eq!(job.rate_limit_wait_seconds, Some(45));
    assert_eq!(job.progress.items_fetched, 2);
    assert_eq!(
        job.cursor,
        Some(SyncCursor {
            category_index: 0,
            page_cursor: Some("c1".into()),
        })
    );

    ctx.clock.advance(Duration::seconds(45));
    ctx.scheduler.run_tick().await;

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.items_fetched, 5);
    assert_eq!(job.progress.items_created, 5);
    assert_eq!(job.cursor, None);
    assert_eq!(sink.len().await, 5);

    assert_eq!(
        source.calls(),
        vec![
            ("tools".to_string(), None),
            ("tools".to_string(), Some("c1".to_string())),
            ("tools".to_string(), Some("c1".to_string())),
            ("paint".to_string(), None),
        ]
    );

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn test_auth_rejection_fails_without_spending_retries() {
    let source = Arc::new(ScriptedSource::new());
    source.push_error(SupplierError::Unauthorized { status: 401 });

    let path = temp_catalog();
    let sink = Arc::new(FileProductSink::open(&path).await.unwrap());
    let ctx = TestContext::new(CatalogExecutor::new(source, sink, 50));
    let id = ctx.insert(pending_job(&["tools"], 3, ctx.now())).await;

    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.failed, 1);

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.unwrap().contains("401"));
}
