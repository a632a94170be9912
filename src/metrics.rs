//! Run metrics for API traffic and export outcomes
//!
//! Counters go through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder; without one every call is a no-op.

use metrics::{counter, describe_counter, Unit};

/// Requests sent to the API (one per attempt)
pub const API_REQUESTS_TOTAL: &str = "api_requests_total";
/// Retries scheduled by the retry executor
pub const API_RETRIES_TOTAL: &str = "api_retries_total";
/// Endpoint calls that ended in a soft failure (`null` result)
pub const API_SOFT_FAILURES_TOTAL: &str = "api_soft_failures_total";
/// Access token refreshes
pub const TOKEN_REFRESHES_TOTAL: &str = "token_refreshes_total";
/// Catalog tasks that fell back to their empty placeholder
pub const EXPORT_TASKS_FAILED_TOTAL: &str = "export_tasks_failed_total";

/// Register descriptions with whatever recorder is installed
pub fn describe() {
    describe_counter!(API_REQUESTS_TOTAL, Unit::Count, "HTTP requests sent to the API");
    describe_counter!(API_RETRIES_TOTAL, Unit::Count, "Retry attempts scheduled");
    describe_counter!(
        API_SOFT_FAILURES_TOTAL,
        Unit::Count,
        "Endpoint calls converted to an empty result"
    );
    describe_counter!(TOKEN_REFRESHES_TOTAL, Unit::Count, "Access token refreshes");
    describe_counter!(
        EXPORT_TASKS_FAILED_TOTAL,
        Unit::Count,
        "Export tasks stored as empty placeholders"
    );
}

/// Count one outgoing request
pub fn record_request(method: &str, status: u16) {
    counter!(API_REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Count one scheduled retry
pub fn record_retry(operation: &str) {
    counter!(API_RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Count one soft failure
pub fn record_soft_failure(endpoint: &str) {
    counter!(API_SOFT_FAILURES_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// Count one token refresh
pub fn record_token_refresh() {
    counter!(TOKEN_REFRESHES_TOTAL).increment(1);
}

/// Count one failed export task
pub fn record_task_failure(task: &str) {
    counter!(EXPORT_TASKS_FAILED_TOTAL, "task" => task.to_string()).increment(1);
}
