//! Axum router and handlers for the intake RPC.
//!
//! `build_router` is the single entry point; `supervisor::run` attaches
//! further middleware layers (tracing, CORS) after this call.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use subreg_schemas::{parse_register_request, RegisterRequest};
use tracing::{info, warn};

use crate::api_types::{ErrorResponse, HealthResponse, RegisteredResponse};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .fallback(unsupported_method)
        // Axum's Bytes extractor otherwise enforces its own implicit 2 MiB
        // cap ahead of the handler, which would surface as a bare 413
        // instead of the documented 403 JSON body for any oversized request.
        .layer(DefaultBodyLimit::max(subreg_schemas::MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

async fn unsupported_method() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Unsupported API method".to_string(),
        }),
    )
}

async fn register(State(st): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(declared) = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if declared > st.max_request_body_bytes {
            return request_too_large();
        }
    }
    if body.len() > st.max_request_body_bytes {
        return request_too_large();
    }

    let req: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to parse intake request body");
            return error_response(StatusCode::UNAUTHORIZED, "Problem parsing request");
        }
    };

    let subdomain = match parse_register_request(&req) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "intake request failed schema validation");
            return error_response(StatusCode::UNAUTHORIZED, "Problem parsing request");
        }
    };

    if st.oracle.exists(&st.parent_domain, &subdomain.name).await {
        return error_response(StatusCode::FORBIDDEN, "Subdomain already exists on this domain");
    }

    match st.store.enqueue(&st.parent_domain, &subdomain).await {
        Ok(()) => {
            info!(domain = %st.parent_domain, subdomain = %subdomain.name, "subdomain queued");
            (
                StatusCode::ACCEPTED,
                Json(RegisteredResponse {
                    status: "true",
                    message: "Subdomain registration queued.",
                }),
            )
                .into_response()
        }
        Err(subreg_db::QueueError::DuplicateSubdomain(_)) => {
            error_response(StatusCode::FORBIDDEN, "Subdomain already exists on this domain")
        }
        Err(e) => {
            warn!(error = %e, "queue storage failure during intake");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn request_too_large() -> Response {
    error_response(StatusCode::FORBIDDEN, "Content length too long. Request Denied.")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}
