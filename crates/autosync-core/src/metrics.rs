//! Global atomic counters for AutoSync runs.
//!
//! Counters are incremented at the call site. Call [`Metrics::flush`] to emit
//! the current values as a single `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    pipeline_runs: AtomicU64,
    modules_patched: AtomicU64,
    module_failures: AtomicU64,
    gate_checks: AtomicU64,
    patches_blocked: AtomicU64,
    deploys: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pipeline_runs: AtomicU64::new(0),
            modules_patched: AtomicU64::new(0),
            module_failures: AtomicU64::new(0),
            gate_checks: AtomicU64::new(0),
            patches_blocked: AtomicU64::new(0),
            deploys: AtomicU64::new(0),
        }
    }

    pub fn inc_pipeline_runs(&self) {
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_modules_patched(&self) {
        self.modules_patched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_module_failures(&self) {
        self.module_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_gate_checks(&self) {
        self.gate_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_patches_blocked(&self) {
        self.patches_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deploys(&self) {
        self.deploys.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counter values as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pipeline_runs = self.pipeline_runs(),
            modules_patched = self.modules_patched(),
            module_failures = self.module_failures(),
            gate_checks = self.gate_checks(),
            patches_blocked = self.patches_blocked(),
            deploys = self.deploys(),
        );
    }

    pub fn pipeline_runs(&self) -> u64 {
        self.pipeline_runs.load(Ordering::Relaxed)
    }

    pub fn modules_patched(&self) -> u64 {
        self.modules_patched.load(Ordering::Relaxed)
    }

    pub fn module_failures(&self) -> u64 {
        self.module_failures.load(Ordering::Relaxed)
    }

    pub fn gate_checks(&self) -> u64 {
        self.gate_checks.load(Ordering::Relaxed)
    }

    pub fn patches_blocked(&self) -> u64 {
        self.patches_blocked.load(Ordering::Relaxed)
    }

    pub fn deploys(&self) -> u64 {
        self.deploys.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.pipeline_runs,
            &self.modules_patched,
            &self.module_failures,
            &self.gate_checks,
            &self.patches_blocked,
            &self.deploys,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_reset() {
        let m = Metrics::new();
        m.inc_pipeline_runs();
        m.inc_modules_patched();
        m.inc_modules_patched();
        m.inc_patches_blocked();
        assert_eq!(m.pipeline_runs(), 1);
        assert_eq!(m.modules_patched(), 2);
        assert_eq!(m.patches_blocked(), 1);

        m.reset();
        assert_eq!(m.modules_patched(), 0);
        assert_eq!(m.deploys(), 0);
    }
}
