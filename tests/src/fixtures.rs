//! Job and page builders.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use supplier::{PageInfo, ProductPage};
use sync_core::{Job, JobStatus, ProgressDelta};

/// A fresh pending job over `categories`.
pub fn pending_job(categories: &[&str], max_retries: u32, now: DateTime<Utc>) -> Job {
    Job::new(
        categories.iter().map(|c| c.to_string()).collect(),
        max_retries,
        now,
    )
}

/// A job waiting out a rate limit that ends `due_in` from `now`.
pub fn rate_limited_job(retry_count: u32, max_retries: u32, now: DateTime<Utc>, due_in: Duration) -> Job {
    let mut job = pending_job(&["tools"], max_retries, now - Duration::minutes(10));
    job.status = JobStatus::RateLimited;
    job.retry_count = retry_count;
    job.retry_after = Some(now + due_in);
    job.rate_limit_wait_seconds = Some(60);
    job
}

pub fn delta(fetched: u64, created: u64, updated: u64, unchanged: u64) -> ProgressDelta {
    ProgressDelta {
        fetched,
        created,
        updated,
        unchanged,
        cursor: None,
    }
}

/// A page of products with the given ids.
pub fn product_page(ids: &[&str], next: Option<&str>) -> ProductPage {
    ProductPage {
        items: ids
            .iter()
            .map(|id| json!({ "id": id, "sku": format!("SKU-{}", id), "price": 10 }))
            .collect(),
        page_info: PageInfo {
            has_next_page: next.is_some(),
            end_cursor: next.map(str::to_string),
        },
    }
}
