use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{FlagConfig, FlagMode};
use crate::error::{ConfigError, FlagEvaluationError};

/// Evaluation context sent to the flag service for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagContext {
    pub kind: String,
    pub key: String,
}

impl FlagContext {
    pub fn user(key: impl Into<String>) -> Self {
        Self {
            kind: "user".to_string(),
            key: key.into(),
        }
    }
}

pub type VariationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<bool, FlagEvaluationError>> + Send + 'a>>;

/// Trait for boolean flag lookups against an external configuration service
pub trait FlagEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn variation<'a>(
        &'a self,
        flag_key: &'a str,
        context: &'a FlagContext,
        default: bool,
    ) -> VariationFuture<'a>;
}

/// Evaluate a flag, serving `default` when the service cannot answer.
pub async fn evaluate_or_default(
    evaluator: &dyn FlagEvaluator,
    flag_key: &str,
    context: &FlagContext,
    default: bool,
) -> bool {
    match evaluator.variation(flag_key, context, default).await {
        Ok(value) => value,
        Err(e) => {
            warn!(
                evaluator = evaluator.name(),
                flag_key,
                key = %context.key,
                "Flag evaluation failed, serving default {}: {}",
                default,
                e
            );
            default
        }
    }
}

/// Serves the same variation for every context.
#[derive(Debug, Clone, Copy)]
pub struct StaticFlagEvaluator {
    value: bool,
}

impl StaticFlagEvaluator {
    pub fn new(value: bool) -> Self {
        Self { value }
    }
}

impl FlagEvaluator for StaticFlagEvaluator {
    fn name(&self) -> &'static str {
        "static"
    }

    fn variation<'a>(
        &'a self,
        _flag_key: &'a str,
        _context: &'a FlagContext,
        _default: bool,
    ) -> VariationFuture<'a> {
        let value = self.value;
        Box::pin(async move { Ok(value) })
    }
}

/// Deterministic percentage rollout: each key lands in a stable bucket in
/// `[0, 100)` and is served the new variation when its bucket is below
/// `percent`.
#[derive(Debug, Clone, Copy)]
pub struct PercentageRollout {
    percent: u8,
}

impl PercentageRollout {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
        }
    }

    pub fn bucket(flag_key: &str, key: &str) -> u8 {
        // FNV-1a over "<flag_key>.<key>"
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in flag_key
            .bytes()
            .chain(std::iter::once(b'.'))
            .chain(key.bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % 100) as u8
    }
}

impl FlagEvaluator for PercentageRollout {
    fn name(&self) -> &'static str {
        "rollout"
    }

    fn variation<'a>(
        &'a self,
        flag_key: &'a str,
        context: &'a FlagContext,
        _default: bool,
    ) -> VariationFuture<'a> {
        let served = Self::bucket(flag_key, &context.key) < self.percent;
        Box::pin(async move { Ok(served) })
    }
}

#[derive(Debug, Deserialize)]
struct RemoteVariation {
    value: bool,
}

/// HTTP/JSON flag client: `GET {base}/flags/{flag_key}?kind=..&key=..`
/// answering `{"value": bool}`.
pub struct RemoteFlagEvaluator {
    client: reqwest::Client,
    base_url: url::Url,
    sdk_key: Option<String>,
}

impl RemoteFlagEvaluator {
    pub fn new(base_url: &str, sdk_key: Option<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        let base_url = url::Url::parse(base_url)?;

        Ok(Self {
            client,
            base_url,
            sdk_key,
        })
    }

    fn flag_url(&self, flag_key: &str) -> Result<url::Url, FlagEvaluationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FlagEvaluationError::Malformed("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .push("flags")
            .push(flag_key);
        Ok(url)
    }
}

impl FlagEvaluator for RemoteFlagEvaluator {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn variation<'a>(
        &'a self,
        flag_key: &'a str,
        context: &'a FlagContext,
        _default: bool,
    ) -> VariationFuture<'a> {
        Box::pin(async move {
            let url = self.flag_url(flag_key)?;
            let mut request = self
                .client
                .get(url)
                .query(&[("kind", context.kind.as_str()), ("key", context.key.as_str())]);
            if let Some(sdk_key) = &self.sdk_key {
                request = request.header(reqwest::header::AUTHORIZATION, sdk_key);
            }

            let response = request
                .send()
                .await
                .map_err(FlagEvaluationError::Unreachable)?;
            if !response.status().is_success() {
                return Err(FlagEvaluationError::Status(response.status().as_u16()));
            }

            let body = response
                .text()
                .await
                .map_err(FlagEvaluationError::Unreachable)?;
            let parsed: RemoteVariation = serde_json::from_str(&body)
                .map_err(|e| FlagEvaluationError::Malformed(e.to_string()))?;
            Ok(parsed.value)
        })
    }
}

/// Build the evaluator selected by `[flags]`.
pub fn evaluator_from_config(config: &FlagConfig) -> anyhow::Result<Box<dyn FlagEvaluator>> {
    let evaluator: Box<dyn FlagEvaluator> = match config.mode {
        FlagMode::Static => Box::new(StaticFlagEvaluator::new(config.static_value)),
        FlagMode::Rollout => Box::new(PercentageRollout::new(config.rollout_percent)),
        FlagMode::Remote => {
            let url = config
                .remote_url
                .as_deref()
                .ok_or(ConfigError::MissingRemoteUrl)?;
            Box::new(RemoteFlagEvaluator::new(
                url,
                config.sdk_key.clone(),
                config.timeout_ms,
            )?)
        }
    };
    Ok(evaluator)
}

/// Fire-and-forget sink for tracked error events.
pub trait EventSink: Send + Sync {
    fn track(&self, event_name: &str, context: &FlagContext);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn track(&self, _event_name: &str, _context: &FlagContext) {}
}

/// Emits each tracked event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn track(&self, event_name: &str, context: &FlagContext) {
        info!(
            event = event_name,
            kind = %context.kind,
            key = %context.key,
            "Tracked event"
        );
    }
}

/// Keeps every tracked event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, FlagContext)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, FlagContext)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for RecordingEventSink {
    fn track(&self, event_name: &str, context: &FlagContext) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((event_name.to_string(), context.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEvaluator;

    impl FlagEvaluator for FailingEvaluator {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn variation<'a>(
            &'a self,
            _flag_key: &'a str,
            _context: &'a FlagContext,
            _default: bool,
        ) -> VariationFuture<'a> {
            Box::pin(async move { Err(FlagEvaluationError::Status(503)) })
        }
    }

    #[tokio::test]
    async fn test_static_evaluator_ignores_key() {
        let evaluator = StaticFlagEvaluator::new(true);
        for key in ["1234567890", "", "abc"] {
            let ctx = FlagContext::user(key);
            assert!(evaluate_or_default(&evaluator, "release-new-api", &ctx, false).await);
        }
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_default() {
        let ctx = FlagContext::user("1234567890");
        assert!(!evaluate_or_default(&FailingEvaluator, "release-new-api", &ctx, false).await);
        assert!(evaluate_or_default(&FailingEvaluator, "release-new-api", &ctx, true).await);
    }

    #[tokio::test]
    async fn test_rollout_is_sticky_per_key() {
        let evaluator = PercentageRollout::new(50);
        let ctx = FlagContext::user("4815162342");
        let first = evaluate_or_default(&evaluator, "release-new-api", &ctx, false).await;
        for _ in 0..10 {
            assert_eq!(
                evaluate_or_default(&evaluator, "release-new-api", &ctx, false).await,
                first
            );
        }
    }

    #[tokio::test]
    async fn test_rollout_bounds() {
        let none = PercentageRollout::new(0);
        let all = PercentageRollout::new(100);
        for i in 0..200u64 {
            let ctx = FlagContext::user((1_000_000_000 + i).to_string());
            assert!(!evaluate_or_default(&none, "f", &ctx, true).await);
            assert!(evaluate_or_default(&all, "f", &ctx, false).await);
        }
    }

    #[test]
    fn test_rollout_share_is_roughly_percent() {
        let served = (0..10_000u64)
            .filter(|i| PercentageRollout::bucket("release-new-api", &i.to_string()) < 30)
            .count();
        assert!((2_500..3_500).contains(&served), "served: {}", served);
    }

    #[tokio::test]
    async fn test_remote_unreachable_falls_back() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let evaluator = RemoteFlagEvaluator::new("http://127.0.0.1:9", None, 200).unwrap();
        let ctx = FlagContext::user("1234567890");
        assert!(evaluator.variation("release-new-api", &ctx, false).await.is_err());
        assert!(!evaluate_or_default(&evaluator, "release-new-api", &ctx, false).await);
    }

    #[test]
    fn test_remote_flag_url() {
        let evaluator =
            RemoteFlagEvaluator::new("http://flags.internal:8080/", None, 1000).unwrap();
        let url = evaluator.flag_url("release-new-api").unwrap();
        assert_eq!(url.as_str(), "http://flags.internal:8080/flags/release-new-api");
    }

    #[test]
    fn test_remote_mode_requires_url() {
        let config = FlagConfig {
            mode: FlagMode::Remote,
            ..FlagConfig::default()
        };
        assert!(evaluator_from_config(&config).is_err());

        let config = FlagConfig {
            mode: FlagMode::Rollout,
            rollout_percent: 20,
            ..FlagConfig::default()
        };
        assert_eq!(evaluator_from_config(&config).unwrap().name(), "rollout");
    }

    #[test]
    fn test_recording_sink_keeps_events() {
        let sink = RecordingEventSink::new();
        sink.track("old-api-error", &FlagContext::user("1"));
        sink.track("new-api-error", &FlagContext::user("2"));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "old-api-error");
        assert_eq!(events[1].1.key, "2");
    }
}
