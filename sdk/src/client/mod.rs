//! HTTP plumbing shared by the auth and sync flows.
//!
//! All requests go through the [`Transport`] trait. The default transport
//! wraps a process-wide, lazily initialized, connection-pooled
//! `reqwest` client; tests and embedders inject their own with
//! [`Client::with_transport`].

mod auth;
mod sync;

pub use {
    auth::{RegisterInput, SignInInput, SignInOutput},
    sync::{GetItemsInput, GetItemsOutput, PutItemsInput, PutItemsOutput},
};

use {
    crate::error::{Error, Result},
    once_cell::sync::Lazy,
    reqwest::{blocking, header::CONTENT_TYPE, Method},
    std::{sync::Arc, time::Duration},
    tracing::debug,
};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const KEEPALIVE: Duration = Duration::from_secs(10);
pub const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 100;

/// One HTTP exchange, reduced to what this protocol needs.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    /// JSON body; requests with a body are sent as `application/json`.
    pub body: Option<String>,
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Seam between the protocol flows and the network.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Shared connection pool. Held for the life of the process; dropping the
/// last `Client` does not tear it down.
static HTTP_CLIENT: Lazy<blocking::Client> = Lazy::new(|| {
    blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
        .tcp_keepalive(KEEPALIVE)
        .gzip(true)
        .build()
        .unwrap()
});

/// Default transport backed by the global connection pool.
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        if !request.url.contains("://") {
            return Err(Error::MissingProtocol);
        }
        let mut builder = HTTP_CLIENT.request(request.method, &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = builder.send().map_err(classify_transport_error)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(classify_transport_error)?
            .to_vec();
        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse { status, body })
    }
}

/// Maps transport failures onto the connection error kinds. Message
/// wording differs between resolvers and platforms, so this matches on
/// the whole error chain.
fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::ConnectTimeout(CONNECT_TIMEOUT.as_secs());
    }
    let chain = error_chain_text(&err);
    if chain.contains("dns error")
        || chain.contains("no such host")
        || chain.contains("failed to lookup address")
    {
        return Error::CannotResolveHost;
    }
    if chain.contains("unsupported protocol") || chain.contains("relative url without a base") {
        return Error::MissingProtocol;
    }
    if chain.contains("timed out") {
        return Error::ConnectTimeout(CONNECT_TIMEOUT.as_secs());
    }
    if chain.contains("connection refused") || chain.contains("permission denied") {
        return Error::ConnectRefused;
    }
    Error::Transport(err.to_string())
}

fn error_chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(err) = source {
        text.push_str(": ");
        text.push_str(&err.to_string());
        source = err.source();
    }
    text.to_lowercase()
}

/// Entry point for every server interaction.
///
/// Cheap to clone; clones share the transport. The default constructor
/// uses the global connection pool.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn get(&self, url: String) -> Result<HttpResponse> {
        self.transport.execute(HttpRequest {
            method: Method::GET,
            url,
            bearer: None,
            body: None,
        })
    }

    fn post(&self, url: String, bearer: Option<String>, body: String) -> Result<HttpResponse> {
        self.transport.execute(HttpRequest {
            method: Method::POST,
            url,
            bearer,
            body: Some(body),
        })
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
