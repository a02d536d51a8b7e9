//! Mock Microsoft identity platform, Graph and SharePoint REST endpoints.
//!
//! # Layout
//! - `POST /login/{tenant}/oauth2/v2.0/token`: client-credentials grant
//!   (secret or JWT client assertion).
//! - `/v1.0/...`: the Graph routes the client library calls.
//! - `/sites/{site}/_api/...`: the SharePoint REST routes.
//!
//! Every API request is recorded and must carry a bearer token issued for
//! the matching resource. Tests can queue fault statuses that are returned
//! ahead of the real handler.

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod graph;
pub mod odata;
mod sharepoint;
pub mod state;

pub use state::{MockState, RecordedRequest, USER_INFO_LIST};

const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";
const JWT_BEARER: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

pub fn app() -> Router {
    app_with_state(MockState::new())
}

pub fn app_with_state(state: MockState) -> Router {
    let api = Router::new()
        .nest("/v1.0", graph::routes())
        .merge(sharepoint::routes())
        .layer(middleware::from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/login/{tenant}/oauth2/v2.0/token", post(issue_token))
        .merge(api)
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock graph server listening");
    }
    axum::serve(listener, app_with_state(state)).await
}

/// Graph-style error body.
pub(crate) fn graph_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = json!({ "error": { "code": code, "message": message.into() } });
    (status, Json(body)).into_response()
}

fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    let body = json!({ "error": error, "error_description": description });
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    client_assertion_type: Option<String>,
    client_assertion: Option<String>,
    scope: Option<String>,
}

async fn issue_token(
    State(state): State<MockState>,
    Path(tenant): Path<String>,
    Form(form): Form<TokenForm>,
) -> Response {
    if form.grant_type.as_deref() != Some("client_credentials") {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "AADSTS70003: The app requested an unsupported grant type.",
        );
    }
    let Some(scope) = form.scope.filter(|s| s.ends_with("/.default")) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_scope",
            "AADSTS1002012: The provided value for scope is not valid.",
        );
    };
    let client_id = form.client_id.unwrap_or_default();

    let mut data = state.lock();
    let Some(expected_secret) = data.clients.get(&client_id) else {
        warn!(%tenant, %client_id, "unknown client");
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "AADSTS700016: Application was not found in the directory.",
        );
    };
    let by_secret = form.client_secret.as_deref() == Some(expected_secret.as_str());
    let by_assertion = form.client_assertion_type.as_deref() == Some(JWT_BEARER)
        && form
            .client_assertion
            .as_deref()
            .is_some_and(|jwt| jwt.split('.').count() == 3);
    if !by_secret && !by_assertion {
        warn!(%tenant, %client_id, "rejected client credentials");
        return oauth_error(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "AADSTS7000215: Invalid client secret provided.",
        );
    }

    let token = format!("mock-{}", Uuid::new_v4());
    data.valid_tokens.insert(token.clone(), scope);
    data.tokens_issued += 1;
    debug!(%client_id, issued = data.tokens_issued, "issued token");
    Json(json!({
        "token_type": "Bearer",
        "expires_in": data.token_ttl_secs,
        "ext_expires_in": data.token_ttl_secs,
        "access_token": token,
    }))
    .into_response()
}

/// Records the request, replays a queued fault if any, then checks that the
/// bearer token was issued for the resource being called.
async fn guard(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (fault, scope) = {
        let mut data = state.lock();
        data.requests.push(RecordedRequest {
            method: request.method().to_string(),
            path: path.clone(),
            query: request.uri().query().map(str::to_string),
            authorization: authorization.clone(),
        });
        let scope = authorization
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .and_then(|token| data.valid_tokens.get(token).cloned());
        (data.faults.pop_front(), scope)
    };

    if let Some(status) = fault {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        debug!(%path, %status, "injecting fault");
        return graph_error(status, "injectedFault", "fault injected by test");
    }

    let Some(scope) = scope else {
        return graph_error(
            StatusCode::UNAUTHORIZED,
            "InvalidAuthenticationToken",
            "Access token is empty or invalid.",
        );
    };
    let wants_graph = path.starts_with("/v1.0/");
    if wants_graph != scope.starts_with(GRAPH_RESOURCE) {
        return graph_error(
            StatusCode::UNAUTHORIZED,
            "InvalidAuthenticationToken",
            "Access token audience does not match the resource.",
        );
    }

    next.run(request).await
}
