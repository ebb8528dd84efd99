use serde::{Deserialize, Serialize};

use crate::responder::ApiPath;

/// A classified response: which path answered and whether it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub path: ApiPath,
    pub error: bool,
}

impl Hit {
    pub fn success(path: ApiPath) -> Self {
        Self { path, error: false }
    }

    pub fn failure(path: ApiPath) -> Self {
        Self { path, error: true }
    }
}

/// The four dashboard counters. Every hit bumps its path's hit counter;
/// failures also bump that path's error counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCounters {
    pub old_hits: u64,
    pub new_hits: u64,
    pub old_errors: u64,
    pub new_errors: u64,
}

impl ApiCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, hit: Hit) {
        match hit.path {
            ApiPath::Old => {
                self.old_hits += 1;
                if hit.error {
                    self.old_errors += 1;
                }
            }
            ApiPath::New => {
                self.new_hits += 1;
                if hit.error {
                    self.new_errors += 1;
                }
            }
        }
    }

    /// Counters after applying `hit`, leaving `self` untouched.
    pub fn with(mut self, hit: Hit) -> Self {
        self.record(hit);
        self
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_hits(&self) -> u64 {
        self.old_hits + self.new_hits
    }

    pub fn total_errors(&self) -> u64 {
        self.old_errors + self.new_errors
    }

    /// Share of `path` requests that failed, as a percentage.
    pub fn error_percent(&self, path: ApiPath) -> u64 {
        let (hits, errors) = match path {
            ApiPath::Old => (self.old_hits, self.old_errors),
            ApiPath::New => (self.new_hits, self.new_errors),
        };
        if hits == 0 {
            return 0;
        }
        (errors * 100) / hits
    }
}
