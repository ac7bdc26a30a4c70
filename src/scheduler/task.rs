//! Request descriptions and queued tasks
//!
//! A `RequestSpec` is what callers hand to the scheduler. The scheduler wraps it
//! in a `Task` that carries retry accounting and the one-shot completion handle.

use crate::scheduler::transport::Response;
use crate::PacerError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;

/// Decides whether a completed response should be retried anyway
pub type RetryPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// Default retry predicate: retry gateway errors (502, 503, 504)
pub fn is_gateway_error(response: &Response) -> bool {
    matches!(response.status.as_u16(), 502..=504)
}

/// How the response body is surfaced to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// Decode the body as text using the response charset
    #[default]
    Text,
    /// Keep the raw bytes
    Bytes,
}

/// One outbound HTTP request plus its per-call scheduling overrides
///
/// The scheduler never looks inside the request; it only hands it to the
/// transport and consults the overrides.
///
/// # Example
///
/// ```
/// use request_pacer::RequestSpec;
///
/// let request = RequestSpec::get("https://example.com/ledger")
///     .unwrap()
///     .immediate()
///     .retry_if(|response| response.status.as_u16() == 503);
/// assert!(request.is_immediate());
/// ```
#[derive(Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,

    /// Target URL
    pub url: Url,

    /// Extra headers for this request only
    pub headers: HeaderMap,

    /// Request body, if any
    pub body: Option<Vec<u8>>,

    /// How to decode the response body
    pub encoding: BodyEncoding,

    immediate: bool,
    retry: bool,
    retry_if: Option<RetryPredicate>,
}

impl RequestSpec {
    /// Creates a request with default overrides
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            encoding: BodyEncoding::default(),
            immediate: false,
            retry: true,
            retry_if: None,
        }
    }

    /// Creates a GET request, parsing the URL
    pub fn get(url: &str) -> Result<Self, PacerError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Creates a POST request, parsing the URL
    pub fn post(url: &str) -> Result<Self, PacerError> {
        Ok(Self::new(Method::POST, Url::parse(url)?))
    }

    /// Adds a header to this request
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the raw request body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body
    pub fn form<K, V>(mut self, fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Some(encoded.into_bytes());
        self
    }

    /// Selects how the response body is decoded
    pub fn encoding(mut self, encoding: BodyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Puts this request at the front of the queue
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Disables automatic retries for this request
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    /// Replaces the default gateway-status retry predicate
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn retries_enabled(&self) -> bool {
        self.retry
    }

    /// Applies the configured retry predicate to a completed response
    pub fn should_retry(&self, response: &Response) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(response),
            None => is_gateway_error(response),
        }
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("encoding", &self.encoding)
            .field("immediate", &self.immediate)
            .field("retry", &self.retry)
            .field("custom_retry_if", &self.retry_if.is_some())
            .finish()
    }
}

/// Outcome delivered to the caller
pub(crate) type TaskResult = Result<Response, PacerError>;

/// A pending request owned by the scheduler
///
/// The completion handle is consumed by `settle`, so a task can be resolved at
/// most once.
pub(crate) struct Task {
    pub spec: RequestSpec,
    pub attempts_used: u32,
    pub retry_budget: u32,
    completion: oneshot::Sender<TaskResult>,
}

impl Task {
    /// Creates a task with the given retry budget (forced to 0 if the request
    /// disabled retries)
    pub fn new(spec: RequestSpec, max_retries: u32) -> (Self, oneshot::Receiver<TaskResult>) {
        let (completion, receiver) = oneshot::channel();
        let retry_budget = if spec.retries_enabled() { max_retries } else { 0 };
        let task = Self {
            spec,
            attempts_used: 0,
            retry_budget,
            completion,
        };
        (task, receiver)
    }

    pub fn has_retry_budget(&self) -> bool {
        self.attempts_used < self.retry_budget
    }

    /// Whether the caller has stopped waiting for this task
    pub fn is_abandoned(&self) -> bool {
        self.completion.is_closed()
    }

    /// Delivers the final outcome to the caller
    pub fn settle(self, result: TaskResult) {
        // The caller may have gone away; nothing left to do then.
        let _ = self.completion.send(result);
    }
}
