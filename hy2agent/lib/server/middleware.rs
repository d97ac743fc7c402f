use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::gate::{self, AccessRequest, Decision, API_KEY_HEADER};

use super::{types::ErrorResponse, AgentState};

//--------------------------------------------------------------------------------------------------
// Functions: Middleware
//--------------------------------------------------------------------------------------------------

/// Runs the access gate before any handler.
///
/// Credential failures are answered with 401, origin denials with 403.
pub async fn access_gate(State(state): State<AgentState>, req: Request, next: Next) -> Response {
    let source_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let headers = req.headers();
    let access = AccessRequest {
        source_ip,
        host: request_host(&req),
        api_key: headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()),
    };

    let decision = {
        let policy = state.get_policy().read().await;
        gate::evaluate(&policy, &access)
    };

    match decision {
        Decision::Allow => next.run(req).await,
        Decision::Deny(reason) => {
            let status = if reason.is_auth_failure() {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::FORBIDDEN
            };

            tracing::warn!(
                "rejected {} {} from {}: {}",
                req.method(),
                req.uri().path(),
                source_ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
                reason
            );

            (
                status,
                Json(ErrorResponse {
                    error: reason.to_string(),
                    output: None,
                }),
            )
                .into_response()
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Returns the origin host of a request.
///
/// HTTP/1.1 carries it in `Host`. HTTP/2 carries it in `:authority`, which ends up in the URI.
fn request_host(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}
