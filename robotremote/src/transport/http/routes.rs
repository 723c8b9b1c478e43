//! HTTP route handlers.

use std::sync::Arc;

use axum::{Router, body::Bytes, extract::State, response::Json, routing::post};

use crate::service::RemoteService;

use super::protocol::{JsonRpcResponse, RpcError, parse_request};

/// Single JSON-RPC endpoint. Every outcome, including request errors, is a
/// 200 with a JSON-RPC body.
async fn handle_rpc(
    State(service): State<Arc<RemoteService>>,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let (id, call) = parse_request(&body);
    let call = match call {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "Rejected remote call");
            return Json(JsonRpcResponse::error(id, &e));
        }
    };

    let method = call.method();
    // Keyword code is blocking and runs under the request gate.
    let result = tokio::task::spawn_blocking(move || service.dispatch(call))
        .await
        .map_err(|e| RpcError::Internal(e.to_string()))
        .and_then(|reply| reply.map_err(RpcError::from));

    match result {
        Ok(reply) => Json(JsonRpcResponse::success(id, reply)),
        Err(e) => {
            tracing::error!(method, code = e.code(), error = %e, "Remote call failed");
            Json(JsonRpcResponse::error(id, &e))
        }
    }
}

pub fn routes(service: Arc<RemoteService>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/RPC2", post(handle_rpc))
        .with_state(service)
}
