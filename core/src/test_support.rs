//! Scripted transport and client builders for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::GraphClient;
use crate::config::{AppCredentials, ClientConfig};
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::RetryPolicy;
use crate::transport::{Transport, TransportError};

/// Replays queued responses in order and records every request it sees.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    pub fn push_err(&self, err: TransportError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Requests other than token fetches.
    pub fn api_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.url.contains("/oauth2/v2.0/token"))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other(format!("no reply scripted for {}", request.url))))
    }
}

pub(crate) fn token_json(secret: &str, expires_in: i64) -> String {
    format!(r#"{{"token_type":"Bearer","expires_in":{expires_in},"access_token":"{secret}"}}"#)
}

/// Graph-only configuration pointing at fake hosts, with millisecond backoff.
pub(crate) fn config() -> ClientConfig {
    let graph = AppCredentials::with_secret("tenant", "client", "secret", "https://graph.microsoft.com/.default")
        .login_base_url("http://login.test");
    let mut config = ClientConfig::new(graph);
    config.graph_base_url = "http://graph.test/v1.0".into();
    config.retry = RetryPolicy {
        max_retries: 2,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: false,
    };
    config
}

/// `config()` plus SharePoint REST credentials.
pub(crate) fn sharepoint_config() -> ClientConfig {
    let mut config = config();
    config.sharepoint = Some(
        AppCredentials::with_secret("tenant", "sp-client", "sp-secret", "https://contoso.sharepoint.com/.default")
            .login_base_url("http://login.test"),
    );
    config
}

pub(crate) fn client_with(transport: ScriptedTransport) -> (GraphClient, Arc<ScriptedTransport>) {
    build(config(), transport)
}

pub(crate) fn sharepoint_client_with(transport: ScriptedTransport) -> (GraphClient, Arc<ScriptedTransport>) {
    build(sharepoint_config(), transport)
}

fn build(config: ClientConfig, transport: ScriptedTransport) -> (GraphClient, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let client = GraphClient::with_transport(config, transport.clone()).unwrap();
    (client, transport)
}
