use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

const RING_CAPACITY: usize = 25;

/// A bounded FIFO list, capped at 25 entries (spec §6).
///
/// Grounded on the teacher's `PerformanceMonitor::metrics_history`
/// trim-to-`max_history_size` pattern (`performance/mod.rs`: `if ...
/// len() > max { remove(0) }`), generalized here from "trim to 1000" to the
/// spec's "cap 25".
pub struct MetricRing {
    values: Mutex<VecDeque<f64>>,
}

impl MetricRing {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
        }
    }

    pub async fn push(&self, value: f64) {
        let mut values = self.values.lock().await;
        if values.len() >= RING_CAPACITY {
            values.pop_front();
        }
        values.push_back(value);
    }

    pub async fn snapshot(&self) -> Vec<f64> {
        self.values.lock().await.iter().copied().collect()
    }
}

impl Default for MetricRing {
    fn default() -> Self {
        Self::new()
    }
}

/// The metrics sink described in spec §6: three bounded ring lists plus two
/// monotonic counters.
pub struct Metrics {
    pub vbrowser_start_ms: MetricRing,
    pub vbrowser_stage_retries: MetricRing,
    pub vbrowser_stage_fails: Mutex<VecDeque<String>>,
    pub vbrowser_launches: AtomicU64,
    pub vbrowser_staging_fails: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            vbrowser_start_ms: MetricRing::new(),
            vbrowser_stage_retries: MetricRing::new(),
            vbrowser_stage_fails: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            vbrowser_launches: AtomicU64::new(0),
            vbrowser_staging_fails: AtomicU64::new(0),
        }
    }

    pub fn record_launch(&self) {
        self.vbrowser_launches.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_stage_fail(&self, vmid: String) {
        self.vbrowser_staging_fails.fetch_add(1, Ordering::Relaxed);
        let mut fails = self.vbrowser_stage_fails.lock().await;
        if fails.len() >= RING_CAPACITY {
            fails.pop_front();
        }
        fails.push_back(vmid);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_caps_at_twenty_five_entries() {
        let ring = MetricRing::new();
        for i in 0..30 {
            ring.push(i as f64).await;
        }
        let snapshot = ring.snapshot().await;
        assert_eq!(snapshot.len(), 25);
        assert_eq!(snapshot.first(), Some(&5.0));
        assert_eq!(snapshot.last(), Some(&29.0));
    }

    #[tokio::test]
    async fn stage_fails_records_vmid_and_counter() {
        let metrics = Metrics::new();
        metrics.record_stage_fail("vm-1".to_string()).await;
        assert_eq!(metrics.vbrowser_staging_fails.load(Ordering::Relaxed), 1);
        let fails = metrics.vbrowser_stage_fails.lock().await;
        assert!(fails.contains(&"vm-1".to_string()));
    }
}
