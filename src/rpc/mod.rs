//! json-rpc surface of the sealer

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use jsonrpc_core::IoHandler;

use crate::logging::error;

pub mod sealer;
pub mod service;

pub use service::SealerService;

/// path of the json-rpc endpoint
pub const RPC_PATH: &str = "/rpc/v0";

/// `POST /rpc/v0`, calls are handled on the blocking pool
pub fn router(io: Arc<IoHandler>) -> Router {
    Router::new().route(RPC_PATH, post(handle_rpc)).with_state(io)
}

async fn handle_rpc(State(io): State<Arc<IoHandler>>, body: String) -> Response {
    match tokio::task::spawn_blocking(move || io.handle_request_sync(&body)).await {
        Ok(Some(out)) => ([(header::CONTENT_TYPE, "application/json")], out).into_response(),

        // notifications only
        Ok(None) => StatusCode::NO_CONTENT.into_response(),

        Err(e) => {
            error!("handle rpc request: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use jsonrpc_core::{IoHandler, Params, Value};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let mut io = IoHandler::new();
        io.add_sync_method("Venus.Echo", |params: Params| {
            let vals: Vec<Value> = params.parse()?;
            Ok(Value::Array(vals))
        });
        router(Arc::new(io))
    }

    fn post_body(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(RPC_PATH)
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_call() {
        let resp = app()
            .oneshot(post_body(r#"{"jsonrpc":"2.0","id":7,"method":"Venus.Echo","params":[1,"a"]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let out: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(out["id"], serde_json::json!(7));
        assert_eq!(out["result"], serde_json::json!([1, "a"]));
    }

    #[tokio::test]
    async fn test_notification() {
        let resp = app()
            .oneshot(post_body(r#"{"jsonrpc":"2.0","method":"Venus.Echo","params":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let req = Request::builder()
            .method(Method::GET)
            .uri(RPC_PATH)
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
