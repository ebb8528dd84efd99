use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ResponderConfig;
use crate::flags::{evaluate_or_default, EventSink, FlagContext, FlagEvaluator};
use crate::random::RandomSource;

pub const OLD_API_ERROR: &str = "OLD API ERROR";
pub const NEW_API_ERROR: &str = "NEW API ERROR";

/// The two mutually exclusive API implementations behind the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiPath {
    Old,
    New,
}

impl ApiPath {
    /// Value of `msg` in replies from this path.
    pub fn label(self) -> &'static str {
        match self {
            ApiPath::Old => "OLD",
            ApiPath::New => "NEW",
        }
    }

    pub fn error_marker(self) -> &'static str {
        match self {
            ApiPath::Old => OLD_API_ERROR,
            ApiPath::New => NEW_API_ERROR,
        }
    }

    /// Name of the event tracked when this path fails.
    pub fn error_event(self) -> &'static str {
        match self {
            ApiPath::Old => "old-api-error",
            ApiPath::New => "new-api-error",
        }
    }
}

/// Deliberately injected failure of one API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", .path.error_marker())]
pub struct SimulatedPathError {
    pub path: ApiPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiReply {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorReply {
    pub msg: String,
    pub error: String,
}

impl From<SimulatedPathError> for ApiErrorReply {
    fn from(value: SimulatedPathError) -> Self {
        Self {
            msg: value.path.label().to_string(),
            error: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    OldSuccess,
    OldError,
    NewSuccess,
    NewError,
}

/// Result of one request: which path ran and what it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub path: ApiPath,
    pub draw: f64,
    pub result: Result<ApiReply, SimulatedPathError>,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match (self.path, self.result.is_ok()) {
            (ApiPath::Old, true) => OutcomeKind::OldSuccess,
            (ApiPath::Old, false) => OutcomeKind::OldError,
            (ApiPath::New, true) => OutcomeKind::NewSuccess,
            (ApiPath::New, false) => OutcomeKind::NewError,
        }
    }
}

/// Routes each keyed request to the old or new path by flag and fails it
/// with that path's configured probability.
pub struct DualPathResponder {
    config: ResponderConfig,
    flags: Arc<dyn FlagEvaluator>,
    events: Arc<dyn EventSink>,
    random: Arc<dyn RandomSource>,
}

impl DualPathResponder {
    pub fn new(
        config: ResponderConfig,
        flags: Arc<dyn FlagEvaluator>,
        events: Arc<dyn EventSink>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            config,
            flags,
            events,
            random,
        }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    pub fn flag_evaluator_name(&self) -> &'static str {
        self.flags.name()
    }

    /// One flag evaluation; an unreachable flag service serves the
    /// configured default variation.
    pub async fn select_path(&self, context: &FlagContext) -> ApiPath {
        let serve_new = evaluate_or_default(
            self.flags.as_ref(),
            &self.config.flag_key,
            context,
            self.config.default_variation,
        )
        .await;

        if serve_new {
            ApiPath::New
        } else {
            ApiPath::Old
        }
    }

    pub fn error_rate(&self, path: ApiPath) -> f64 {
        match path {
            ApiPath::Old => self.config.old_error_rate,
            ApiPath::New => self.config.new_error_rate,
        }
    }

    /// Run one path's handler against a draw in `[0, 100)`.
    pub fn run_path(&self, path: ApiPath, draw: f64) -> Result<ApiReply, SimulatedPathError> {
        if draw < self.error_rate(path) {
            return Err(SimulatedPathError { path });
        }
        Ok(ApiReply {
            msg: path.label().to_string(),
        })
    }

    pub async fn respond(&self, key: &str) -> Outcome {
        let context = FlagContext::user(key);
        let path = self.select_path(&context).await;
        let draw = self.random.draw();
        let result = self.run_path(path, draw);

        if result.is_err() {
            self.events.track(path.error_event(), &context);
        }
        debug!(key, path = path.label(), draw, ok = result.is_ok(), "Responded");

        Outcome { path, draw, result }
    }
}
