//! Shared types for the apiprobe engine.

use std::time::Duration;

pub mod error;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// The target under test, passed explicitly to every component that talks to
/// it. There is no ambient session or global configuration anywhere else.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub host: String,
    /// Per-request timeout for probes and test-case execution.
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra headers applied to every request (e.g. authorization).
    pub headers: Vec<(String, String)>,
}

impl TargetContext {
    pub fn new(host: impl Into<String>) -> Self {
        TargetContext {
            host: host.into(),
            timeout: Duration::from_secs(10),
            user_agent: format!("apiprobe/{}", version()),
            headers: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a bearer token to every request issued against this target.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .push(("Authorization".to_string(), format!("Bearer {token}")));
        self
    }

    pub fn base_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }
}
