//! JSON-RPC task protocol handlers.
//!
//! A single POST endpoint dispatches on the `method` field. Protocol-level
//! failures (unparseable body, bad envelope, unknown method) come back as
//! JSON-RPC error objects with HTTP 200, per the JSON-RPC convention; only
//! transport concerns (auth, rate limiting) surface as HTTP errors from the
//! middleware layer.

use crate::AppState;
use crate::auth::Caller;
use crate::rpc::{
    CODE_PARSE_ERROR, CancelTaskParams, GetTaskParams, JsonRpcRequest, JsonRpcResponse,
    METHOD_CANCEL, METHOD_GET, METHOD_SEND, METHOD_SEND_SUBSCRIBE, RpcError, SendTaskParams,
    SendTaskResult,
};
use crate::types::Task;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::Stream;
use serde_json::Value;
use tracing::{debug, warn};

/// `POST /rpc` - JSON-RPC dispatch.
#[utoipa::path(
    post,
    path = "/rpc",
    request_body = JsonRpcRequest,
    responses(
        (status = 200, description = "JSON-RPC response, or an SSE stream for tasks/sendSubscribe", body = JsonRpcResponse),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Rate limited")
    ),
    tag = "tasks",
    security(("bearer" = []))
)]
pub async fn dispatch(State(state): State<AppState>, caller: Caller, body: String) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(caller = %caller.0, "unparseable rpc body: {e}");
            return Json(JsonRpcResponse::err(
                Value::Null,
                RpcError::new(CODE_PARSE_ERROR, format!("parse error: {e}")),
            ))
            .into_response();
        }
    };

    if let Err(error) = request.validate() {
        return Json(JsonRpcResponse::err(request.id.clone(), error)).into_response();
    }

    debug!(caller = %caller.0, method = %request.method, "rpc request");

    let id = request.id.clone();
    match request.method.as_str() {
        METHOD_SEND => reply(id, send_task(&state, request.params)),
        METHOD_GET => reply(id, get_task(&state, request.params)),
        METHOD_CANCEL => reply(id, cancel_task(&state, request.params)),
        METHOD_SEND_SUBSCRIBE => send_subscribe(state, id, request.params),
        other => {
            Json(JsonRpcResponse::err(id, RpcError::method_not_found(other))).into_response()
        }
    }
}

/// Wrap a dispatch result into a JSON-RPC response body.
fn reply(id: Value, result: Result<Value, RpcError>) -> Response {
    match result {
        Ok(value) => Json(JsonRpcResponse::ok(id, value)).into_response(),
        Err(error) => Json(JsonRpcResponse::err(id, error)).into_response(),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn send_task(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let params: SendTaskParams = parse_params(params)?;
    let task = state
        .runtime
        .submit(&params.skill_id, params.input, params.task_id)?;
    let result = SendTaskResult {
        task_id: task.id,
        status: task.status,
    };
    Ok(serde_json::to_value(result).unwrap_or(Value::Null))
}

fn get_task(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let params: GetTaskParams = parse_params(params)?;
    let task = state.runtime.get(&params.task_id)?;
    Ok(serde_json::to_value(task).unwrap_or(Value::Null))
}

fn cancel_task(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let params: CancelTaskParams = parse_params(params)?;
    let task = state.runtime.cancel(&params.task_id)?;
    Ok(serde_json::to_value(task).unwrap_or(Value::Null))
}

/// `tasks/sendSubscribe` - submit, then stream status updates as SSE events
/// until the task reaches a terminal state. Submission failures come back as
/// a plain JSON-RPC error body instead of a stream.
fn send_subscribe(state: AppState, id: Value, params: Value) -> Response {
    let params: SendTaskParams = match parse_params(params) {
        Ok(p) => p,
        Err(error) => return Json(JsonRpcResponse::err(id, error)).into_response(),
    };

    let task = match state
        .runtime
        .submit(&params.skill_id, params.input, params.task_id)
    {
        Ok(task) => task,
        Err(e) => return Json(JsonRpcResponse::err(id, e.into())).into_response(),
    };

    Sse::new(status_stream(state, id, task)).keep_alive(KeepAlive::default()).into_response()
}

/// One SSE event per committed status, starting from the submission
/// snapshot. The stream always closes with a terminal event.
fn status_stream(
    state: AppState,
    id: Value,
    task: Task,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let task_id = task.id.clone();
        yield Ok(status_event(&id, &task));
        if task.status.is_terminal() {
            return;
        }

        let Ok((snapshot, receiver)) = state.runtime.subscribe(&task_id) else {
            return;
        };
        // The snapshot may already be ahead of the submission record.
        if snapshot.status != task.status {
            yield Ok(status_event(&id, &snapshot));
        }
        if snapshot.status.is_terminal() {
            return;
        }
        let Some(mut receiver) = receiver else {
            return;
        };

        loop {
            match receiver.recv().await {
                Ok(update) => {
                    let terminal = update.status.is_terminal();
                    yield Ok(status_event(&id, &update));
                    if terminal {
                        return;
                    }
                }
                // Lagged receivers recover from the committed record.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    if let Ok(current) = state.runtime.get(&task_id) {
                        let terminal = current.status.is_terminal();
                        yield Ok(status_event(&id, &current));
                        if terminal {
                            return;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    // Channel torn down after the terminal commit; emit the
                    // final record in case we missed it.
                    if let Ok(current) = state.runtime.get(&task_id) {
                        yield Ok(status_event(&id, &current));
                    }
                    return;
                }
            }
        }
    }
}

fn status_event(id: &Value, task: &Task) -> Event {
    let payload = JsonRpcResponse::ok(
        id.clone(),
        serde_json::to_value(task).unwrap_or(Value::Null),
    );
    Event::default()
        .event("status")
        .data(serde_json::to_string(&payload).unwrap_or_default())
}
