use std::time::Duration;

/// Connection settings for the accrual service.
#[derive(Debug, Clone)]
pub struct AccrualClientConfig {
    /// Base URL, e.g. `http://localhost:8080`. Joined with `/api/orders/{number}`.
    pub base_url: String,
    /// Per-request timeout. Applies to the whole request, connect included.
    pub timeout: Duration,
}

impl AccrualClientConfig {
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), timeout }
    }
}
