//! Retry classification for completed attempts
//!
//! After every attempt the classifier decides whether the task goes back to
//! the queue or is settled with its final outcome.
//!
//! # Decision table
//!
//! | Outcome | Budget left | Action |
//! |---------|-------------|--------|
//! | Transport error with a transient code | yes | retry after backoff |
//! | Response matching the retry predicate | yes | retry after backoff |
//! | Transport error (any other case) | - | fail with code and URL |
//! | Response (any other case) | - | fulfill with the response |
//!
//! The backoff before retry `n` is `sleep_for * n * 2`: linear, not
//! exponential.

use crate::scheduler::task::Task;
use crate::scheduler::transport::{Response, TransportError};
use crate::PacerError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Machine-readable transport failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "ETIMEDOUT")]
    Timeout,
    #[serde(rename = "ECONNRESET")]
    ConnectionReset,
    #[serde(rename = "ECONNREFUSED")]
    ConnectionRefused,
    #[serde(rename = "ECONNABORTED")]
    ConnectionAborted,
    #[serde(rename = "EHOSTUNREACH")]
    HostUnreachable,
    #[serde(rename = "EAI_AGAIN")]
    DnsTemporary,
    #[serde(rename = "ENOTFOUND")]
    DnsNotFound,
    #[serde(rename = "EPIPE")]
    BrokenPipe,
    #[serde(rename = "EBUSY")]
    ResourceBusy,
    #[serde(rename = "ETLS")]
    Tls,
    #[serde(rename = "EREDIRECT")]
    Redirect,
    #[serde(rename = "EBODY")]
    Body,
    #[serde(rename = "EREQUEST")]
    Request,
    #[serde(rename = "EUNKNOWN")]
    Unknown,
}

impl ErrorCode {
    /// The conventional string form of this code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "ETIMEDOUT",
            ErrorCode::ConnectionReset => "ECONNRESET",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::ConnectionAborted => "ECONNABORTED",
            ErrorCode::HostUnreachable => "EHOSTUNREACH",
            ErrorCode::DnsTemporary => "EAI_AGAIN",
            ErrorCode::DnsNotFound => "ENOTFOUND",
            ErrorCode::BrokenPipe => "EPIPE",
            ErrorCode::ResourceBusy => "EBUSY",
            ErrorCode::Tls => "ETLS",
            ErrorCode::Redirect => "EREDIRECT",
            ErrorCode::Body => "EBODY",
            ErrorCode::Request => "EREQUEST",
            ErrorCode::Unknown => "EUNKNOWN",
        }
    }

    /// Codes retried when no transient set is configured
    pub fn default_transient() -> HashSet<ErrorCode> {
        [
            ErrorCode::Timeout,
            ErrorCode::ConnectionReset,
            ErrorCode::ConnectionRefused,
            ErrorCode::DnsTemporary,
            ErrorCode::ResourceBusy,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a task after an attempt
#[derive(Debug)]
pub(crate) enum Verdict {
    /// Re-queue at the front once the delay has passed
    Retry(Duration),
    /// Deliver this outcome to the caller
    Settle(Result<Response, PacerError>),
}

/// Decides retries and computes backoff
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    base_delay: Duration,
    transient: HashSet<ErrorCode>,
}

impl RetryClassifier {
    pub fn new(base_delay: Duration, transient: HashSet<ErrorCode>) -> Self {
        Self {
            base_delay,
            transient,
        }
    }

    pub fn is_transient(&self, code: ErrorCode) -> bool {
        self.transient.contains(&code)
    }

    /// Delay before the retry numbered `attempts_used` (1-based)
    pub fn backoff(&self, attempts_used: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempts_used.saturating_mul(2))
    }

    /// Classifies one completed attempt, consuming retry budget on retry
    pub(crate) fn classify(
        &self,
        task: &mut Task,
        outcome: Result<Response, TransportError>,
    ) -> Verdict {
        let retryable = match &outcome {
            Err(error) => self.is_transient(error.code),
            Ok(response) => task.spec.should_retry(response),
        };

        if retryable && task.has_retry_budget() {
            task.attempts_used += 1;
            return Verdict::Retry(self.backoff(task.attempts_used));
        }

        let attempts = task.attempts_used + 1;
        Verdict::Settle(outcome.map_err(|error| PacerError::Transport {
            url: task.spec.url.to_string(),
            code: error.code,
            attempts,
            message: error.message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::RequestSpec;
    use crate::scheduler::transport::Body;
    use reqwest::StatusCode;
    use url::Url;

    fn classifier() -> RetryClassifier {
        RetryClassifier::new(Duration::from_millis(1000), ErrorCode::default_transient())
    }

    fn task(spec: RequestSpec) -> Task {
        Task::new(spec, 3).0
    }

    fn get() -> RequestSpec {
        RequestSpec::get("https://example.com/report").unwrap()
    }

    fn response(status: u16) -> Response {
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            Url::parse("https://example.com/report").unwrap(),
            Body::Text("body".to_string()),
        )
    }

    fn error(code: ErrorCode) -> TransportError {
        TransportError::new(code, "simulated")
    }

    #[test]
    fn test_backoff_is_linear() {
        let classifier = classifier();
        assert_eq!(classifier.backoff(1), Duration::from_millis(2000));
        assert_eq!(classifier.backoff(2), Duration::from_millis(4000));
        assert_eq!(classifier.backoff(3), Duration::from_millis(6000));
    }

    #[test]
    fn test_transient_error_retried_until_budget_spent() {
        let classifier = classifier();
        let mut task = task(get());

        for expected in 1..=3 {
            match classifier.classify(&mut task, Err(error(ErrorCode::ConnectionReset))) {
                Verdict::Retry(delay) => assert_eq!(delay, classifier.backoff(expected)),
                other => panic!("expected retry, got {:?}", other),
            }
        }

        match classifier.classify(&mut task, Err(error(ErrorCode::ConnectionReset))) {
            Verdict::Settle(Err(PacerError::Transport {
                url,
                code,
                attempts,
                ..
            })) => {
                assert_eq!(url, "https://example.com/report");
                assert_eq!(code, ErrorCode::ConnectionReset);
                assert_eq!(attempts, 4);
            }
            other => panic!("expected terminal error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_transient_error_fails_immediately() {
        let mut task = task(get());
        let verdict = classifier().classify(&mut task, Err(error(ErrorCode::Tls)));

        assert!(matches!(
            verdict,
            Verdict::Settle(Err(PacerError::Transport {
                code: ErrorCode::Tls,
                attempts: 1,
                ..
            }))
        ));
        assert_eq!(task.attempts_used, 0);
    }

    #[test]
    fn test_no_retry_fails_on_first_transient_error() {
        let mut task = task(get().no_retry());
        let verdict = classifier().classify(&mut task, Err(error(ErrorCode::Timeout)));

        assert!(matches!(
            verdict,
            Verdict::Settle(Err(PacerError::Transport {
                code: ErrorCode::Timeout,
                attempts: 1,
                ..
            }))
        ));
    }

    #[test]
    fn test_gateway_response_retried() {
        let mut task = task(get());
        let verdict = classifier().classify(&mut task, Ok(response(504)));
        assert!(matches!(verdict, Verdict::Retry(_)));
        assert_eq!(task.attempts_used, 1);
    }

    #[test]
    fn test_exhausted_predicate_fulfills_with_response() {
        let mut task = task(get());
        task.attempts_used = 3;

        match classifier().classify(&mut task, Ok(response(503))) {
            Verdict::Settle(Ok(response)) => {
                assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_error_response_not_matching_predicate_is_fulfilled() {
        let mut task = task(get());
        match classifier().classify(&mut task, Ok(response(404))) {
            Verdict::Settle(Ok(response)) => assert_eq!(response.status, StatusCode::NOT_FOUND),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_transient_set() {
        let classifier = RetryClassifier::new(
            Duration::ZERO,
            [ErrorCode::BrokenPipe].into_iter().collect(),
        );
        assert!(classifier.is_transient(ErrorCode::BrokenPipe));
        assert!(!classifier.is_transient(ErrorCode::Timeout));
        assert_eq!(classifier.backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_code_display() {
        assert_eq!(ErrorCode::DnsTemporary.to_string(), "EAI_AGAIN");
        assert_eq!(ErrorCode::ResourceBusy.as_str(), "EBUSY");
    }
}
