//! HTTP boundary for the execution engine

use crate::config::types::{Result, SnipboxError};
use crate::core::cancel::CancellationToken;
use crate::runtime::engine::ExecutionEngine;
use crate::server::types::{
    ErrorResponse, ExecuteBody, ExecuteResponse, HealthResponse, ServiceIndex,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Largest accepted `/execute` body.
pub const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

const INTERNAL_FAILURE: &str = "Server error: internal execution failure";
const UNREADABLE_BODY: &str = "Server error: request body could not be read";

/// Shared state behind the routes.
///
/// Tracks the cancellation token of every request in flight so shutdown can
/// end their units instead of waiting out their deadlines. Requests that
/// register after shutdown began get a token that is already cancelled.
pub struct ServerState {
    engine: Arc<ExecutionEngine>,
    in_flight: Mutex<HashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl ServerState {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(self: &Arc<Self>) -> InFlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            // Checked under the lock so a concurrent cancel_all either sees
            // this token or this request sees the flag.
            let mut tokens = self.tokens();
            if self.shutting_down.load(Ordering::SeqCst) {
                token.cancel();
            }
            tokens.insert(id, token.clone());
        }
        InFlightGuard {
            state: Arc::clone(self),
            id,
            token,
            finished: false,
        }
    }

    /// Cancel every request currently executing, and every request that
    /// arrives afterwards.
    pub fn cancel_all(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let tokens = self.tokens();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    async fn execute(self: Arc<Self>, body: Bytes) -> WithStatus<Json> {
        let body: ExecuteBody = match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Rejecting unreadable /execute body: {}", e);
                return error_reply(StatusCode::INTERNAL_SERVER_ERROR, UNREADABLE_BODY);
            }
        };

        let code = body.code.unwrap_or_default();
        let request = match self.engine.request(&code, &body.language) {
            Ok(request) => request,
            Err(e) => return reply_for_error(&e),
        };

        let mut guard = self.register();
        let token = guard.token.clone();
        let engine = Arc::clone(&self.engine);
        let joined =
            tokio::task::spawn_blocking(move || engine.execute_request(&request, &token)).await;
        guard.finished = true;

        match joined {
            Ok(Ok(result)) => {
                warp::reply::with_status(warp::reply::json(&ExecuteResponse::from(&result)), StatusCode::OK)
            }
            Ok(Err(e)) => reply_for_error(&e),
            Err(e) => {
                log::error!("Execution task failed: {}", e);
                error_reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_FAILURE)
            }
        }
    }
}

/// Deregisters a request; cancels its unit when the handler is dropped
/// before the unit finished (client went away).
struct InFlightGuard {
    state: Arc<ServerState>,
    id: u64,
    token: CancellationToken,
    finished: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.token.cancel();
        }
        self.state.tokens().remove(&self.id);
    }
}

fn error_reply(status: StatusCode, message: &str) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ErrorResponse::new(message)), status)
}

/// Map an engine error onto a status code. Infrastructure detail stays in
/// the log.
pub fn reply_for_error(error: &SnipboxError) -> WithStatus<Json> {
    if error.is_client_error() {
        error_reply(StatusCode::BAD_REQUEST, &error.to_string())
    } else if error.is_unavailable() {
        error_reply(StatusCode::SERVICE_UNAVAILABLE, &error.to_string())
    } else {
        log::error!("Internal execution failure: {}", error);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_FAILURE)
    }
}

async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body exceeds {} bytes", MAX_BODY_BYTES),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "CORS request forbidden".to_string())
    } else {
        log::warn!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, UNREADABLE_BODY.to_string())
    };
    Ok(error_reply(status, &message))
}

/// All routes with permissive CORS, including on error replies.
pub fn routes(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_state = warp::any().map(move || Arc::clone(&state));

    let execute = warp::path("execute")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(|body: Bytes, state: Arc<ServerState>| async move {
            Ok::<_, Rejection>(state.execute(body).await)
        });

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&HealthResponse::healthy()));

    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&ServiceIndex::new()));

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state)
        .map(|state: Arc<ServerState>| {
            warp::reply::with_header(
                state.engine().metrics().render_prometheus(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["POST", "GET"]);

    // Error replies get CORS headers too; the outer recover handles CORS rejections.
    execute
        .or(health)
        .or(index)
        .or(metrics)
        .recover(handle_rejection)
        .with(cors)
        .recover(handle_rejection)
}

/// Serve until Ctrl-C. In-flight units are cancelled on shutdown.
pub async fn serve(engine: Arc<ExecutionEngine>, addr: SocketAddr) -> Result<()> {
    let state = Arc::new(ServerState::new(engine));
    let shutdown_state = Arc::clone(&state);

    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            let cancelled = shutdown_state.cancel_all();
            log::info!("Shutting down; cancelled {} in-flight executions", cancelled);
        })
        .map_err(|e| SnipboxError::Config(format!("cannot bind {}: {}", addr, e)))?;

    log::info!("Code execution server listening on http://{}", bound);
    server.await;
    log::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::engine::EngineConfig;

    fn state() -> Arc<ServerState> {
        let engine = ExecutionEngine::new(EngineConfig::default()).unwrap();
        Arc::new(ServerState::new(Arc::new(engine)))
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            json(res.body()),
            serde_json::json!({"status": "healthy", "message": "Code execution server is running"})
        );
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let res = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res.body());
        assert!(body["endpoints"]["POST /execute"].is_string());
    }

    #[tokio::test]
    async fn test_empty_code_is_400() {
        let res = warp::test::request()
            .method("POST")
            .path("/execute")
            .json(&serde_json::json!({"code": "", "language": "python"}))
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res.body())["error"], "No code provided");
    }

    #[tokio::test]
    async fn test_missing_code_is_400() {
        let res = warp::test::request()
            .method("POST")
            .path("/execute")
            .json(&serde_json::json!({"language": "python"}))
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_400_naming_it() {
        let res = warp::test::request()
            .method("POST")
            .path("/execute")
            .json(&serde_json::json!({"code": "puts 1", "language": "ruby"}))
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json(res.body());
        assert!(body["error"].as_str().unwrap().contains("ruby"));
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_generic_500() {
        let res = warp::test::request()
            .method("POST")
            .path("/execute")
            .body("{not json")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(res.body())["error"], UNREADABLE_BODY);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let res = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_are_prometheus_text() {
        let state = state();
        let _ = warp::test::request()
            .method("POST")
            .path("/execute")
            .json(&serde_json::json!({"code": ""}))
            .reply(&routes(Arc::clone(&state)))
            .await;

        let res = warp::test::request()
            .method("GET")
            .path("/metrics")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let text = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(text.contains("snipbox_validation_rejections_total 1"));
    }

    #[tokio::test]
    async fn test_error_replies_carry_cors_headers() {
        let res = warp::test::request()
            .method("GET")
            .path("/nope")
            .header("origin", "http://client.example")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "http://client.example"
        );
    }

    #[tokio::test]
    async fn test_request_after_shutdown_is_cancelled() {
        let state = state();
        assert_eq!(state.cancel_all(), 0);

        let res = warp::test::request()
            .method("POST")
            .path("/execute")
            .json(&serde_json::json!({"code": "while True: pass"}))
            .reply(&routes(Arc::clone(&state)))
            .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(res.body())["success"], false);
        assert_eq!(state.engine().in_flight(), 0);
    }

    #[test]
    fn test_registration_after_shutdown_gets_cancelled_token() {
        let state = state();
        state.cancel_all();
        let guard = state.register();
        assert!(guard.token.is_cancelled());
    }

    #[test]
    fn test_error_mapping() {
        let busy = reply_for_error(&SnipboxError::Busy { limit: 2 }).into_response();
        assert_eq!(busy.status(), StatusCode::SERVICE_UNAVAILABLE);

        let cancelled = reply_for_error(&SnipboxError::Cancelled).into_response();
        assert_eq!(cancelled.status(), StatusCode::SERVICE_UNAVAILABLE);

        let internal = reply_for_error(&SnipboxError::Process("spawn failed".into())).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let invalid = reply_for_error(&SnipboxError::Validation("No code provided".into())).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cancel_all_reaches_registered_requests() {
        let state = state();
        let guard = state.register();
        assert_eq!(state.cancel_all(), 1);
        assert!(guard.token.is_cancelled());
        drop(guard);
        assert_eq!(state.cancel_all(), 0);
    }

    #[test]
    fn test_dropped_unfinished_request_is_cancelled() {
        let state = state();
        let guard = state.register();
        let token = guard.token.clone();
        drop(guard);
        assert!(token.is_cancelled());

        let mut finished = state.register();
        let token = finished.token.clone();
        finished.finished = true;
        drop(finished);
        assert!(!token.is_cancelled());
    }
}
