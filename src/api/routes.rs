use crate::AppState;
use crate::auth::TokenVerifier;
use crate::auth::rate_limit::CallerRateLimiter;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

/// Build the gateway router: public discovery surface plus the
/// authenticated `/rpc` endpoint.
pub fn create_router(
    verifier: Arc<dyn TokenVerifier>,
    limiter: Arc<CallerRateLimiter>,
) -> Router<AppState> {
    let public_routes = Router::new()
        // Discovery surface (no auth required)
        .route(
            "/.well-known/agent.json",
            get(crate::api::handlers::card::agent_card),
        )
        .route("/health", get(crate::api::handlers::card::health));

    let protected_routes = Router::new()
        .route("/rpc", post(crate::api::handlers::rpc::dispatch))
        // The MCP bridge submits tasks too; it sits behind the same
        // verifier and rate limit as /rpc.
        .merge(crate::mcp::bridge::create_router())
        .layer(middleware::from_fn(move |req, next| {
            crate::auth::auth_middleware(verifier.clone(), limiter.clone(), req, next)
        }));

    public_routes.merge(protected_routes)
}
