//! Shared health state for the /health endpoint.
//! Updated by the cycle runner.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared health metrics. Updated by the cycle runner, read by API.
#[derive(Default)]
pub struct HealthState {
    /// True while a cycle is in progress.
    pub cycle_running: AtomicBool,
    pub cycles_completed: AtomicU64,
    /// Nanosecond timestamp of the last finished cycle (0 = none).
    pub last_cycle_at_ns: AtomicU64,
    /// Groups whose reconciliation failed in the last cycle.
    pub last_cycle_failed_groups: AtomicU64,
    /// Alerts that could not be delivered, since startup.
    pub alerts_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cycle_running(&self, v: bool) {
        self.cycle_running.store(v, Ordering::Relaxed);
    }

    pub fn finish_cycle(&self, at_ns: u64, failed_groups: u64) {
        self.last_cycle_at_ns.store(at_ns, Ordering::Relaxed);
        self.last_cycle_failed_groups.store(failed_groups, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.cycle_running.store(false, Ordering::Relaxed);
    }

    pub fn inc_alerts_failed(&self) {
        self.alerts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at_ns(&self) -> u64 {
        self.last_cycle_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_cycle_failed_groups(&self) -> u64 {
        self.last_cycle_failed_groups.load(Ordering::Relaxed)
    }

    pub fn alerts_failed(&self) -> u64 {
        self.alerts_failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_cycle_records_outcome() {
        let health = HealthState::new();
        health.set_cycle_running(true);

        health.finish_cycle(42, 1);
        health.finish_cycle(43, 0);

        assert!(!health.cycle_running());
        assert_eq!(health.cycles_completed(), 2);
        assert_eq!(health.last_cycle_at_ns(), 43);
        assert_eq!(health.last_cycle_failed_groups(), 0);
    }
}
