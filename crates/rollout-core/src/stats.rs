use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Per-request bookkeeping kept next to the dashboard counters: how many
/// requests went out, how many came back, and how long they took.
#[derive(Debug, Clone)]
pub struct RequestStats {
    pub sent: u64,
    pub completed: u64,
    pub unclassified: u64,
    pub client_errors: u64,
    latency_buckets: Vec<u64>,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        // One bucket per millisecond, last bucket catches everything slower
        let buckets = vec![0; 1000];
        Self {
            sent: 0,
            completed: 0,
            unclassified: 0,
            client_errors: 0,
            latency_buckets: buckets,
            start_time: Instant::now(),
        }
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_completed(&mut self, classified: bool, latency_ms: u64) {
        self.completed += 1;
        if !classified {
            self.unclassified += 1;
        }
        self.record_latency(latency_ms);
    }

    pub fn record_client_error(&mut self) {
        self.client_errors += 1;
    }

    fn record_latency(&mut self, latency_ms: u64) {
        let bucket_idx = latency_ms.min((self.latency_buckets.len() - 1) as u64) as usize;
        self.latency_buckets[bucket_idx] += 1;
    }

    /// Percentile from the histogram (integer ms)
    pub fn percentile(&self, p: u64) -> u64 {
        let total: u64 = self.latency_buckets.iter().sum();
        if total == 0 {
            return 0;
        }

        let target = (total * p).div_ceil(100);
        let mut cumulative = 0u64;

        for (bucket_idx, &count) in self.latency_buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return bucket_idx as u64;
            }
        }

        self.latency_buckets.len() as u64
    }

    pub fn in_flight(&self) -> u64 {
        self.sent
            .saturating_sub(self.completed)
            .saturating_sub(self.client_errors)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            sent: self.sent,
            completed: self.completed,
            unclassified: self.unclassified,
            client_errors: self.client_errors,
            in_flight: self.in_flight(),
            latency_p50_ms: self.percentile(50),
            latency_p95_ms: self.percentile(95),
            latency_p99_ms: self.percentile(99),
            duration_ms: self.elapsed_ms(),
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSummary {
    pub sent: u64,
    pub completed: u64,
    pub unclassified: u64,
    pub client_errors: u64,
    pub in_flight: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
    pub duration_ms: u64,
}
