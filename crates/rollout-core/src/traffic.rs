use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::counters::{ApiCounters, Hit};
use crate::random::KeyGenerator;
use crate::sender::RequestSender;
use crate::stats::{RequestStats, StatsSummary};

struct Shared {
    sender: Arc<dyn RequestSender>,
    keys: KeyGenerator,
    counters: Mutex<ApiCounters>,
    stats: Mutex<RequestStats>,
}

impl Shared {
    fn counters(&self) -> MutexGuard<'_, ApiCounters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, RequestStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn send_one_request(&self) -> Option<Hit> {
        let key = self.keys.next_key();
        self.stats().record_sent();
        let start = Instant::now();

        let response = match self.sender.send(&key).await {
            Ok(response) => response,
            Err(e) => {
                warn!(key = %key, "Error generating traffic: {}", e);
                self.stats().record_client_error();
                return None;
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match classify(&response) {
            Ok(hit) => {
                if let Some(hit) = hit {
                    self.counters().record(hit);
                } else {
                    debug!(key = %key, status = response.status, "Unrecognised response ignored");
                }
                self.stats().record_completed(hit.is_some(), latency_ms);
                hit
            }
            Err(e) => {
                warn!(key = %key, status = response.status, "Error generating traffic: {}", e);
                self.stats().record_client_error();
                None
            }
        }
    }
}

/// Fixed-interval request loop feeding the four API counters.
///
/// Each tick spawns an independent request task, so several requests may be
/// in flight at once. Stopping cancels the ticker only; requests already in
/// flight still complete and are counted.
pub struct TrafficGenerator {
    shared: Arc<Shared>,
    interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TrafficGenerator {
    pub fn new(sender: Arc<dyn RequestSender>, interval: Duration, keys: KeyGenerator) -> Self {
        Self {
            shared: Arc::new(Shared {
                sender,
                keys,
                counters: Mutex::new(ApiCounters::new()),
                stats: Mutex::new(RequestStats::new()),
            }),
            interval: interval.max(Duration::from_millis(1)),
            ticker: Mutex::new(None),
        }
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.ticker().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the ticker. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut ticker = self.ticker();
        if ticker.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let shared = self.shared.clone();
        let period = self.interval;
        info!(
            sender = shared.sender.name(),
            interval_ms = period.as_millis() as u64,
            "Starting traffic"
        );

        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let shared = shared.clone();
                tokio::spawn(async move {
                    shared.send_one_request().await;
                });
            }
        }));
        true
    }

    /// Cancel the ticker. Safe to call when already stopped.
    pub fn stop(&self) {
        if let Some(handle) = self.ticker().take() {
            handle.abort();
            info!("Stopped traffic");
        }
    }

    /// Stop if running, start otherwise. Returns the new running state.
    pub fn toggle(&self) -> bool {
        if self.is_running() {
            self.stop();
            false
        } else {
            self.start()
        }
    }

    /// Zero the counters without touching the running state.
    pub fn reset(&self) {
        self.shared.counters().reset();
    }

    pub async fn send_one_request(&self) -> Option<Hit> {
        self.shared.send_one_request().await
    }

    pub fn snapshot(&self) -> ApiCounters {
        *self.shared.counters()
    }

    pub fn stats(&self) -> StatsSummary {
        self.shared.stats().summary()
    }
}

impl Drop for TrafficGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
