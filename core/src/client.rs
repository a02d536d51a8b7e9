//! The client object and its authenticated request helper.
//!
//! # Design
//! `GraphClient` owns everything a call needs: the Graph and SharePoint
//! token providers, the retry policy and the transport. There is no
//! process-wide state; two clients with different credentials never see
//! each other's tokens.
//!
//! Endpoint wrappers live in their own modules (`sites`, `lists`, ...) as
//! `impl GraphClient` blocks. Each one builds an unauthenticated
//! `HttpRequest`, hands it to [`GraphClient::send`] or
//! [`GraphClient::get_all`], and parses the response.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use backon::BlockingRetryable;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::GraphError;
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::RetryPolicy;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Page, Verbose};

/// `Accept`/`Content-Type` for SharePoint REST calls.
pub const SP_ODATA_VERBOSE: &str = "application/json;odata=verbose;charset=utf-8";

/// Lets `$filter` target non-indexed list columns.
pub const GRAPH_PREFER_NON_INDEXED: &str = "HonorNonIndexedQueriesWarningMayFailRandomly";

/// Which API, and therefore which token, a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Graph,
    SharePoint,
}

/// Client for the Microsoft Graph and SharePoint REST endpoints.
pub struct GraphClient {
    graph_base: Url,
    graph_auth: TokenProvider,
    sharepoint_auth: Option<TokenProvider>,
    retry: RetryPolicy,
    file_timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("graph_base", &self.graph_base.as_str())
            .field("graph_auth", &self.graph_auth)
            .field("sharepoint_auth", &self.sharepoint_auth)
            .field("retry", &self.retry)
            .field("file_timeout", &self.file_timeout)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Client using the blocking ureq transport.
    pub fn new(config: ClientConfig) -> Result<Self, GraphError> {
        let transport = Arc::new(UreqTransport::new(config.timeout));
        Self::with_transport(config, transport)
    }

    /// Client configured from `GRAPH_*`, `SP_*` and `GRAFAP_*` variables.
    pub fn from_env() -> Result<Self, GraphError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, GraphError> {
        let graph_base = parse_base(&config.graph_base_url)?;
        Ok(Self {
            graph_base,
            graph_auth: TokenProvider::new(config.graph),
            sharepoint_auth: config.sharepoint.map(TokenProvider::new),
            retry: config.retry,
            file_timeout: config.file_timeout,
            transport,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Timeout applied to file uploads and downloads.
    pub fn file_timeout(&self) -> Duration {
        self.file_timeout
    }

    fn provider(&self, api: Api) -> Result<&TokenProvider, GraphError> {
        match api {
            Api::Graph => Ok(&self.graph_auth),
            Api::SharePoint => self
                .sharepoint_auth
                .as_ref()
                .ok_or(GraphError::SharePointNotConfigured),
        }
    }

    /// `{GRAPH_BASE_URL}/{segments...}?{query}` with every segment
    /// percent-encoded.
    pub(crate) fn graph_url(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, GraphError> {
        let mut url = self.graph_base.clone();
        url.path_segments_mut()
            .map_err(|()| GraphError::InvalidUrl {
                url: self.graph_base.to_string(),
                reason: "cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    /// Send an authenticated request, retrying transient failures.
    ///
    /// 2xx responses are returned as-is; 404 becomes `NotFound`; any other
    /// status becomes `Http`. 429 and 5xx are retried per the client's
    /// `RetryPolicy` and surface as `RetriesExhausted` once it runs out.
    pub fn send(
        &self,
        api: Api,
        request: HttpRequest,
        context: &str,
    ) -> Result<HttpResponse, GraphError> {
        self.send_tolerating(api, request, context, |_| false)
    }

    /// Like `send`, but non-2xx responses for which `tolerate` returns true
    /// are handed back as successes instead of being classified.
    pub(crate) fn send_tolerating<F>(
        &self,
        api: Api,
        request: HttpRequest,
        context: &str,
        tolerate: F,
    ) -> Result<HttpResponse, GraphError>
    where
        F: Fn(&HttpResponse) -> bool,
    {
        let provider = self.provider(api)?;
        let attempts = Cell::new(0u32);

        let attempt = || -> Result<HttpResponse, GraphError> {
            attempts.set(attempts.get() + 1);
            let token = provider.bearer(self.transport.as_ref())?;
            let authed = request
                .clone()
                .with_header("authorization", format!("Bearer {token}"));
            debug!(
                method = request.method.as_str(),
                url = %request.url,
                attempt = attempts.get(),
                "{context}"
            );
            let response = self.transport.execute(&authed)?;
            if response.is_success() || tolerate(&response) {
                return Ok(response);
            }
            if response.status == 401 {
                provider.invalidate();
            }
            Err(classify(response))
        };

        let result = attempt
            .retry(self.retry.backoff())
            .sleep(std::thread::sleep)
            .when(GraphError::is_transient)
            .notify(|err: &GraphError, delay: Duration| {
                warn!(%err, ?delay, "{context}: transient failure, retrying");
            })
            .call();

        result.map_err(|err| {
            let err = if err.is_transient() {
                GraphError::RetriesExhausted {
                    attempts: attempts.get(),
                    last: Box::new(err),
                }
            } else {
                err
            };
            error!(%err, status = ?err.status(), "{context} failed");
            err
        })
    }

    /// Fetch every page of a Graph collection, following `@odata.nextLink`.
    pub fn get_all<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        context: &str,
    ) -> Result<Vec<T>, GraphError> {
        let mut items = Vec::new();
        let mut next = Some(request);
        while let Some(request) = next.take() {
            let response = self.send(Api::Graph, request.clone(), context)?;
            let page: Page<T> = parse_json(&response)?;
            items.extend(page.value);
            next = page.next_link.map(|link| HttpRequest { url: link, ..request });
        }
        Ok(items)
    }
}

fn parse_base(raw: &str) -> Result<Url, GraphError> {
    let url = Url::parse(raw).map_err(|e| GraphError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(GraphError::InvalidUrl {
            url: raw.to_string(),
            reason: "cannot be a base".into(),
        });
    }
    Ok(url)
}

/// Map a non-success response to the matching error.
fn classify(response: HttpResponse) -> GraphError {
    let body = response.text();
    match response.status {
        404 => GraphError::NotFound { body },
        status => GraphError::Http { status, body },
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GraphError> {
    Ok(serde_json::from_slice(&response.body)?)
}

/// Parse a SharePoint verbose-OData body, unwrapping the `d` envelope.
pub(crate) fn parse_verbose<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GraphError> {
    let envelope: Verbose<T> = parse_json(response)?;
    Ok(envelope.d)
}

/// Quote a value as an OData string literal, doubling embedded quotes.
pub(crate) fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
