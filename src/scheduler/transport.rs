//! HTTP transport with one shared session
//!
//! This module handles the actual network calls, including:
//! - Building the HTTP client with user agent, default headers and a cookie jar
//! - Executing a `RequestSpec` and collecting status, headers and body
//! - Mapping low-level failures to machine-readable error codes
//!
//! The transport never retries and never interprets bodies.

use crate::config::TransportConfig;
use crate::scheduler::retry::ErrorCode;
use crate::scheduler::task::{BodyEncoding, RequestSpec};
use crate::PacerError;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use url::Url;

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: Url,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Creates a response with no headers
    pub fn new(status: StatusCode, url: Url, body: Body) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Response body, decoded according to the request's `BodyEncoding`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    /// The body as text, if it was decoded as text
    pub fn text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A network-level failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: ErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            code: classify_reqwest_error(&error),
            message: error_chain(&error),
        }
    }
}

/// Performs one HTTP call
///
/// Implementations must report every network failure as a `TransportError`
/// and every HTTP response, whatever its status, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &RequestSpec) -> Result<Response, TransportError>;
}

/// Transport backed by a reqwest client and a shared cookie jar
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    /// Builds a transport with a fresh, empty cookie jar
    pub fn new(config: &TransportConfig) -> Result<Self, PacerError> {
        let jar = Arc::new(Jar::default());
        let client = build_http_client(config, Arc::clone(&jar))?;
        Ok(Self { client, jar })
    }

    /// The session shared by every request issued through this transport
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &RequestSpec) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        let body = match request.encoding {
            BodyEncoding::Text => Body::Text(response.text().await?),
            BodyEncoding::Bytes => Body::Bytes(response.bytes().await?.to_vec()),
        };

        tracing::trace!(%url, status = status.as_u16(), bytes = body.len(), "response received");

        Ok(Response {
            status,
            headers,
            url,
            body,
        })
    }
}

/// Builds an HTTP client with the session cookie jar attached
///
/// # Arguments
///
/// * `config` - The transport configuration
/// * `jar` - Cookie jar shared by every request made with this client
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(PacerError)` - Invalid header or client construction failure
pub fn build_http_client(config: &TransportConfig, jar: Arc<Jar>) -> Result<Client, PacerError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            crate::ConfigError::InvalidHeader(format!("name '{}'", name))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            crate::ConfigError::InvalidHeader(format!("value for '{}'", name.as_str()))
        })?;
        headers.insert(name, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(10))
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Maps a reqwest failure to an error code
///
/// Socket-level causes are found by walking the source chain down to the
/// underlying `io::Error`; resolver failures only surface as messages.
pub fn classify_reqwest_error(error: &reqwest::Error) -> ErrorCode {
    if error.is_timeout() {
        return ErrorCode::Timeout;
    }

    if let Some(code) = find_source::<io::Error>(error).and_then(classify_io_error) {
        return code;
    }

    let chain = source_chain(error).to_lowercase();
    if chain.contains("temporary failure in name resolution") || chain.contains("try again") {
        return ErrorCode::DnsTemporary;
    }
    if chain.contains("name or service not known")
        || chain.contains("nodename nor servname")
        || chain.contains("no such host")
    {
        return ErrorCode::DnsNotFound;
    }
    if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        return ErrorCode::Tls;
    }

    if error.is_redirect() {
        ErrorCode::Redirect
    } else if error.is_connect() {
        ErrorCode::HostUnreachable
    } else if error.is_body() || error.is_decode() {
        ErrorCode::Body
    } else if error.is_builder() || error.is_request() {
        ErrorCode::Request
    } else {
        ErrorCode::Unknown
    }
}

/// Maps an `io::Error` to an error code, if it is a socket-level failure
pub fn classify_io_error(error: &io::Error) -> Option<ErrorCode> {
    match error.kind() {
        io::ErrorKind::TimedOut => Some(ErrorCode::Timeout),
        io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof => {
            Some(ErrorCode::ConnectionReset)
        }
        io::ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
        io::ErrorKind::ConnectionAborted => Some(ErrorCode::ConnectionAborted),
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            Some(ErrorCode::HostUnreachable)
        }
        io::ErrorKind::BrokenPipe => Some(ErrorCode::BrokenPipe),
        io::ErrorKind::ResourceBusy => Some(ErrorCode::ResourceBusy),
        _ => None,
    }
}

/// Finds the first error of type `T` in the source chain
fn find_source<'a, T: StdError + 'static>(error: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(found) = err.downcast_ref::<T>() {
            return Some(found);
        }
        source = err.source();
    }
    None
}

/// Renders an error and all of its causes on one line
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let causes = source_chain(error);
    if causes.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", error, causes)
    }
}

/// Renders only the causes of an error, without the top-level message
///
/// The top-level reqwest message embeds the URL, which must not influence
/// classification.
fn source_chain(error: &(dyn StdError + 'static)) -> String {
    let mut causes: Vec<String> = Vec::new();
    let mut source = error.source();
    while let Some(err) = source {
        let cause = err.to_string();
        if !causes.iter().any(|seen| seen.contains(&cause)) {
            causes.push(cause);
        }
        source = err.source();
    }
    causes.join(": ")
}
