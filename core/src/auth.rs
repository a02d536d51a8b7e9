//! OAuth2 client-credentials token acquisition and caching.
//!
//! # Design
//! One `TokenProvider` per credential set. The token request is built and
//! the response parsed as plain data, the same way the endpoint wrappers do
//! it, so both halves are testable without a network. The cached token sits
//! behind a mutex that is held across a refresh: concurrent callers that
//! find the token stale wait for the one refresh in flight instead of each
//! starting their own.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::config::{AppCredentials, ClientCredential};
use crate::error::GraphError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SKEW_SECS: i64 = 60;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// A bearer token and the moment it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// Seconds; the v1 endpoint sends it as a string.
    expires_in: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Fetches and caches the bearer token for one app registration.
#[derive(Debug)]
pub struct TokenProvider {
    credentials: AppCredentials,
    token_url: String,
    cache: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(credentials: AppCredentials) -> Self {
        let token_url = credentials.token_url();
        Self {
            credentials,
            token_url,
            cache: Mutex::new(None),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Current bearer token, fetching a new one if none is cached or the
    /// cached one has expired.
    pub fn bearer(&self, transport: &dyn Transport) -> Result<String, GraphError> {
        self.bearer_at(transport, Utc::now())
    }

    pub(crate) fn bearer_at(
        &self,
        transport: &dyn Transport,
        now: DateTime<Utc>,
    ) -> Result<String, GraphError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cache.as_ref() {
            if !token.is_expired_at(now) {
                return Ok(token.secret.clone());
            }
        }

        debug!(client_id = %self.credentials.client_id, "requesting access token");
        let token = self.fetch(transport, now).map_err(|err| {
            error!(client_id = %self.credentials.client_id, %err, "token request failed");
            err
        })?;
        let secret = token.secret.clone();
        *cache = Some(token);
        Ok(secret)
    }

    /// Forget the cached token so the next call fetches a fresh one.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn fetch(&self, transport: &dyn Transport, now: DateTime<Utc>) -> Result<AccessToken, GraphError> {
        let request = self.build_token_request(now)?;
        let response = transport
            .execute(&request)
            .map_err(|err| GraphError::Authentication {
                status: None,
                message: format!("identity provider unreachable: {err}"),
            })?;
        parse_token_response(response, now)
    }

    /// Form-encoded client-credentials request for the token endpoint.
    pub fn build_token_request(&self, now: DateTime<Utc>) -> Result<HttpRequest, GraphError> {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("client_id", &self.credentials.client_id)
            .append_pair("scope", &self.credentials.scopes)
            .append_pair("grant_type", "client_credentials");
        match &self.credentials.credential {
            ClientCredential::Secret(secret) => {
                form.append_pair("client_secret", secret);
            }
            ClientCredential::Certificate(cert) => {
                let assertion =
                    cert.client_assertion(&self.credentials.client_id, &self.token_url, now)?;
                form.append_pair("client_assertion_type", CLIENT_ASSERTION_TYPE)
                    .append_pair("client_assertion", &assertion);
            }
        }

        Ok(HttpRequest::new(HttpMethod::Post, self.token_url.clone())
            .with_header("accept", "application/json")
            .with_body(
                "application/x-www-form-urlencoded",
                form.finish().into_bytes(),
            ))
    }
}

/// Turn the token endpoint's answer into an `AccessToken` issued at `now`.
pub fn parse_token_response(
    response: HttpResponse,
    now: DateTime<Utc>,
) -> Result<AccessToken, GraphError> {
    if !response.is_success() {
        let message = match serde_json::from_slice::<TokenErrorResponse>(&response.body) {
            Ok(TokenErrorResponse {
                error: Some(error),
                error_description,
            }) => match error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            },
            _ => response.text(),
        };
        return Err(GraphError::Authentication {
            status: Some(response.status),
            message,
        });
    }

    let parsed: TokenResponse =
        serde_json::from_slice(&response.body).map_err(|e| GraphError::Authentication {
            status: Some(response.status),
            message: format!("malformed token response: {e}"),
        })?;
    let secret = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GraphError::Authentication {
            status: Some(response.status),
            message: "token response has no access_token".into(),
        })?;
    let expires_at = parsed
        .expires_in
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
        .filter(|secs| *secs >= 0)
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| GraphError::Authentication {
            status: Some(response.status),
            message: "token response has no usable expires_in".into(),
        })?;

    Ok(AccessToken { secret, expires_at })
}
