//! Store traffic metrics.
//!
//! Batching and caching exist to keep store traffic flat as the fleet
//! grows, so the interesting signals are per-operation request volume and
//! latency, how often transient failures force a retry, and how many pages
//! a paginated find actually walks.

use std::time::Duration;

use metrics::{counter, histogram};

/// Requests issued, labeled by operation and response status.
pub const REQUESTS: &str = "mlog_store_requests_total";

/// Operations retried after a transient failure, labeled by operation.
pub const RETRIES: &str = "mlog_store_retries_total";

/// Request latency in seconds, labeled by operation.
pub const REQUEST_SECONDS: &str = "mlog_store_request_seconds";

/// Pages walked by one paginated find, labeled by layout. A distribution
/// creeping above 1 means a status class is accumulating records faster
/// than the fleet drains them.
pub const FIND_PAGES: &str = "mlog_store_find_pages";

/// Record one completed HTTP interaction with the store.
pub fn observe_request(operation: &str, status: u16, elapsed: Duration) {
    counter!(
        REQUESTS,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(REQUEST_SECONDS, "operation" => operation.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one retry of a transiently failed operation.
pub fn observe_retry(operation: &str) {
    counter!(RETRIES, "operation" => operation.to_string()).increment(1);
}

/// Record how many pages a paginated find walked before stopping.
pub fn observe_find_pages(layout: &str, pages: u64) {
    histogram!(FIND_PAGES, "layout" => layout.to_string()).record(pages as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_one_prefix() {
        for name in [REQUESTS, RETRIES, REQUEST_SECONDS, FIND_PAGES] {
            assert!(name.starts_with("mlog_store_"), "{name}");
        }
    }
}
