//! HTTP endpoints for the rollout server.
//!
//! `GET /{key}` and `GET /echo/{key}` run the dual-path responder for the
//! path key. Failures become `500` responses whose body contains the
//! `OLD API ERROR` / `NEW API ERROR` marker, either as `{msg, error}` JSON or
//! as the bare marker text.
//!
//! Health lives at `GET /-/healthy`, two segments deep, so every single
//! segment path (including `/health`) stays a key.

use actix_web::{get, web, HttpResponse, ResponseError};
use rollout_core::{ApiErrorReply, DualPathResponder, SimulatedPathError};
use serde_json::json;
use tracing::warn;

pub struct AppState {
    pub responder: DualPathResponder,
}

/// Unhandled path failure, rendered by actix as a plain-text 500.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct PathFailure(#[from] SimulatedPathError);

impl ResponseError for PathFailure {}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_endpoint)
        .service(echo_endpoint)
        .service(key_endpoint);
}

#[get("/-/healthy")]
pub async fn health_endpoint(state: web::Data<AppState>) -> HttpResponse {
    let config = state.responder.config();
    HttpResponse::Ok().json(json!({
        "healthy": true,
        "flag_evaluator": state.responder.flag_evaluator_name(),
        "flag_key": config.flag_key,
        "old_error_rate": config.old_error_rate,
        "new_error_rate": config.new_error_rate,
    }))
}

#[get("/echo/{key}")]
pub async fn echo_endpoint(
    state: web::Data<AppState>,
    key: web::Path<String>,
) -> Result<HttpResponse, PathFailure> {
    respond(&state, &key).await
}

#[get("/{key}")]
pub async fn key_endpoint(
    state: web::Data<AppState>,
    key: web::Path<String>,
) -> Result<HttpResponse, PathFailure> {
    respond(&state, &key).await
}

async fn respond(state: &AppState, key: &str) -> Result<HttpResponse, PathFailure> {
    let outcome = state.responder.respond(key).await;

    match outcome.result {
        Ok(reply) => Ok(HttpResponse::Ok().json(reply)),
        Err(e) => {
            warn!(key, path = e.path.label(), draw = outcome.draw, "{}", e);
            if state.responder.config().structured_errors {
                Ok(HttpResponse::InternalServerError().json(ApiErrorReply::from(e)))
            } else {
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use rollout_core::{
        FixedDraw, FlagContext, FlagEvaluationError, FlagEvaluator, PercentageRollout,
        RecordingEventSink, ResponderConfig, StaticFlagEvaluator, VariationFuture,
    };
    use serde_json::Value;
    use std::sync::Arc;

    struct UnreachableFlags;

    impl FlagEvaluator for UnreachableFlags {
        fn name(&self) -> &'static str {
            "unreachable"
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

    fn state(
        flags: Arc<dyn FlagEvaluator>,
        draw: f64,
        structured_errors: bool,
    ) -> (web::Data<AppState>, Arc<RecordingEventSink>) {
        let events = Arc::new(RecordingEventSink::new());
        let config = ResponderConfig {
            structured_errors,
            ..ResponderConfig::default()
        };
        let responder =
            DualPathResponder::new(config, flags, events.clone(), Arc::new(FixedDraw(draw)));
        (web::Data::new(AppState { responder }), events)
    }

    #[actix_web::test]
    async fn test_new_path_success() {
        let (state, _) = state(Arc::new(StaticFlagEvaluator::new(true)), 95.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/1234567890").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({"msg": "NEW"}));
    }

    #[actix_web::test]
    async fn test_old_path_structured_error() {
        let (state, events) = state(Arc::new(StaticFlagEvaluator::new(false)), 5.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/echo/1234567890").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({"msg": "OLD", "error": "OLD API ERROR"})
        );

        let events = events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "old-api-error");
        assert_eq!(events[0].1.key, "1234567890");
    }

    #[actix_web::test]
    async fn test_plain_error_body_contains_marker() {
        let (state, _) = state(Arc::new(StaticFlagEvaluator::new(true)), 29.0, false);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/4242424242").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("NEW API ERROR"), "body: {}", text);
    }

    #[actix_web::test]
    async fn test_unreachable_flags_serve_old_path() {
        let (state, _) = state(Arc::new(UnreachableFlags), 50.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/1234567890").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["msg"], "OLD");
    }

    #[actix_web::test]
    async fn test_rollout_branch_is_sticky_per_key() {
        let (state, _) = state(Arc::new(PercentageRollout::new(50)), 99.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        for key in ["1000000001", "5555555555", "9876543210"] {
            let expected = if PercentageRollout::bucket("release-new-api", key) < 50 {
                "NEW"
            } else {
                "OLD"
            };
            for _ in 0..3 {
                let req = test::TestRequest::get().uri(&format!("/{key}")).to_request();
                let body: Value = test::call_and_read_body_json(&app, req).await;
                assert_eq!(body["msg"], expected, "key {}", key);
            }
        }
    }

    #[actix_web::test]
    async fn test_health() {
        let (state, _) = state(Arc::new(StaticFlagEvaluator::new(false)), 50.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/-/healthy").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["flag_evaluator"], "static");
        assert_eq!(body["old_error_rate"], 10.0);
    }

    #[actix_web::test]
    async fn test_health_is_an_ordinary_key() {
        let (state, events) = state(Arc::new(StaticFlagEvaluator::new(true)), 99.0, true);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({"msg": "NEW"}));

        let req = test::TestRequest::get().uri("/echo/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({"msg": "NEW"}));
        assert!(events.events().is_empty());
    }
}
