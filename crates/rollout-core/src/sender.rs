use anyhow::Result;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use crate::classify::RawResponse;
use crate::config::Route;
use crate::error::ClientError;
use crate::responder::{ApiErrorReply, DualPathResponder};

pub type SendFuture<'a> =
    Pin<Box<dyn std::future::Future<Output = Result<RawResponse, ClientError>> + Send + 'a>>;

/// Trait for issuing one keyed request to the responder
pub trait RequestSender: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, key: &'a str) -> SendFuture<'a>;
}

/// Scripted sender for tests and offline runs.
///
/// Responses are replayed in order; once the script runs out the fallback
/// response is returned for every call.
pub struct MockSender {
    script: Mutex<VecDeque<Result<RawResponse, String>>>,
    fallback: RawResponse,
    delay_ms: u64,
    calls: AtomicUsize,
}

impl MockSender {
    pub fn new(fallback: RawResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn push_response(&self, response: RawResponse) {
        self.lock_script().push_back(Ok(response));
    }

    pub fn push_network_error(&self, message: impl Into<String>) {
        self.lock_script().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<RawResponse, String>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RequestSender for MockSender {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(&'a self, _key: &'a str) -> SendFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.lock_script().pop_front();

        Box::pin(async move {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            match next {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(ClientError::Network(message)),
                None => Ok(self.fallback.clone()),
            }
        })
    }
}

/// HTTP sender against a running responder.
pub struct HttpSender {
    client: reqwest::Client,
    base_url: url::Url,
    route: Route,
}

impl HttpSender {
    /// `timeout_ms = None` leaves requests without a deadline.
    pub fn new(base_url: &str, route: Route, timeout_ms: Option<u64>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build()?;
        let base_url = url::Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("target URL cannot be a base: {}", base_url);
        }

        Ok(Self {
            client,
            base_url,
            route,
        })
    }

    pub fn request_url(&self, key: &str) -> url::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if self.route == Route::Echo {
                segments.push("echo");
            }
            segments.push(key);
        }
        url
    }
}

impl RequestSender for HttpSender {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send<'a>(&'a self, key: &'a str) -> SendFuture<'a> {
        Box::pin(async move {
            let response = self.client.get(self.request_url(key)).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(RawResponse { status, body })
        })
    }
}

/// Runs a responder in-process and renders its outcome the way the server
/// does, for offline runs without a listening server.
pub struct LocalSender {
    responder: DualPathResponder,
}

impl LocalSender {
    pub fn new(responder: DualPathResponder) -> Self {
        Self { responder }
    }
}

impl RequestSender for LocalSender {
    fn name(&self) -> &'static str {
        "local"
    }

    fn send<'a>(&'a self, key: &'a str) -> SendFuture<'a> {
        Box::pin(async move {
            let outcome = self.responder.respond(key).await;
            let response = match outcome.result {
                Ok(reply) => RawResponse::new(200, serde_json::to_string(&reply)?),
                Err(e) if self.responder.config().structured_errors => {
                    RawResponse::new(500, serde_json::to_string(&ApiErrorReply::from(e))?)
                }
                Err(e) => RawResponse::new(500, e.to_string()),
            };
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_then_fallback() {
        let sender = MockSender::new(RawResponse::new(200, r#"{"msg":"OLD"}"#));
        sender.push_response(RawResponse::new(500, "NEW API ERROR"));
        sender.push_network_error("connection reset");

        assert_eq!(sender.send("1").await.unwrap().status, 500);
        assert!(matches!(
            sender.send("2").await,
            Err(ClientError::Network(_))
        ));
        assert_eq!(sender.send("3").await.unwrap().body, r#"{"msg":"OLD"}"#);
        assert_eq!(sender.calls(), 3);
    }

    #[test]
    fn test_request_url_for_each_route() {
        let root = HttpSender::new("http://localhost:3000", Route::Root, None).unwrap();
        assert_eq!(
            root.request_url("1234567890").as_str(),
            "http://localhost:3000/1234567890"
        );

        let echo = HttpSender::new("http://localhost:3000/api/", Route::Echo, Some(500)).unwrap();
        assert_eq!(
            echo.request_url("1234567890").as_str(),
            "http://localhost:3000/api/echo/1234567890"
        );
    }

    #[tokio::test]
    async fn test_local_sender_renders_like_server() {
        use crate::config::ResponderConfig;
        use crate::flags::{NoopEventSink, StaticFlagEvaluator};
        use crate::random::FixedDraw;
        use std::sync::Arc;

        let local = |serve_new: bool, draw: f64, structured_errors: bool| {
            LocalSender::new(DualPathResponder::new(
                ResponderConfig {
                    structured_errors,
                    ..ResponderConfig::default()
                },
                Arc::new(StaticFlagEvaluator::new(serve_new)),
                Arc::new(NoopEventSink),
                Arc::new(FixedDraw(draw)),
            ))
        };

        let ok = local(true, 95.0, true).send("1").await.unwrap();
        assert_eq!(ok, RawResponse::new(200, r#"{"msg":"NEW"}"#));

        let structured = local(false, 5.0, true).send("1").await.unwrap();
        assert_eq!(
            structured,
            RawResponse::new(500, r#"{"msg":"OLD","error":"OLD API ERROR"}"#)
        );

        let plain = local(false, 5.0, false).send("1").await.unwrap();
        assert_eq!(plain, RawResponse::new(500, "OLD API ERROR"));
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(HttpSender::new("mailto:ops@example.com", Route::Root, None).is_err());
        assert!(HttpSender::new("not a url", Route::Root, None).is_err());
    }
}
