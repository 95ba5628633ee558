//! Metrics collection for monitoring agent activity

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the agent counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_created: u64,
    pub events_failed: u64,
    pub resolutions_ok: u64,
    pub resolutions_failed: u64,
    /// Resolutions postponed by the outcome verifier
    pub resolutions_deferred: u64,
    pub price_fetch_failures: u64,
    pub llm_calls: u64,
    pub llm_errors: u64,
}

/// Cheaply clonable metrics collector
#[derive(Debug, Clone, Default)]
pub struct AgentMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    events_created: AtomicU64,
    events_failed: AtomicU64,
    resolutions_ok: AtomicU64,
    resolutions_failed: AtomicU64,
    resolutions_deferred: AtomicU64,
    price_fetch_failures: AtomicU64,
    llm_calls: AtomicU64,
    llm_errors: AtomicU64,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_events_created(&self) {
        self.inner.events_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_failed(&self) {
        self.inner.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolutions_ok(&self) {
        self.inner.resolutions_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolutions_failed(&self) {
        self.inner.resolutions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolutions_deferred(&self) {
        self.inner.resolutions_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_price_fetch_failures(&self) {
        self.inner.price_fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_calls(&self) {
        self.inner.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_errors(&self) {
        self.inner.llm_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_created: self.inner.events_created.load(Ordering::Relaxed),
            events_failed: self.inner.events_failed.load(Ordering::Relaxed),
            resolutions_ok: self.inner.resolutions_ok.load(Ordering::Relaxed),
            resolutions_failed: self.inner.resolutions_failed.load(Ordering::Relaxed),
            resolutions_deferred: self.inner.resolutions_deferred.load(Ordering::Relaxed),
            price_fetch_failures: self.inner.price_fetch_failures.load(Ordering::Relaxed),
            llm_calls: self.inner.llm_calls.load(Ordering::Relaxed),
            llm_errors: self.inner.llm_errors.load(Ordering::Relaxed),
        }
    }
}
