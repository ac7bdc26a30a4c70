//! Scheduler event loop and the public `Pacer` handle
//!
//! All admission decisions happen inside one tokio task that owns the
//! `SchedulerState`. It wakes up for three reasons:
//! - a caller submitted a task
//! - an attempt completed
//! - a cooldown, rate-window or backoff deadline passed
//!
//! and each time runs one admission pass. Attempts run on their own tasks and
//! report back over a channel, so the state is never touched concurrently.

use crate::config::{Config, SchedulerConfig};
use crate::scheduler::cooldown::CooldownGovernor;
use crate::scheduler::gate::{ConcurrencyGate, Slot};
use crate::scheduler::rate_window::RateWindow;
use crate::scheduler::retry::{RetryClassifier, Verdict};
use crate::scheduler::task::{RequestSpec, Task};
use crate::scheduler::transport::{HttpTransport, Response, Transport, TransportError};
use crate::PacerError;
use reqwest::cookie::Jar;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

/// Snapshot of the scheduler's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerStats {
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Tasks waiting out a retry backoff
    pub backing_off: usize,
    /// Slots currently occupied
    pub in_flight: usize,
    /// Attempts started since creation
    pub dispatched: u64,
    /// Retries scheduled since creation
    pub retried: u64,
    /// A cooldown pause was active at the last admission pass
    pub cooling_down: bool,
    /// The rate window was exhausted at the last admission pass
    pub rate_limited: bool,
}

/// Handle to one scheduler instance
///
/// Clones share the scheduler, its limits and its session. When the last
/// clone is dropped the scheduler finishes the work already submitted and
/// stops.
///
/// # Example
///
/// ```no_run
/// use request_pacer::{Config, Pacer, RequestSpec};
///
/// # async fn run() -> request_pacer::Result<()> {
/// let pacer = Pacer::new(Config::default())?;
/// let response = pacer.dispatch(RequestSpec::get("https://example.com/")?).await?;
/// println!("{} ({} bytes)", response.status, response.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pacer {
    submissions: mpsc::UnboundedSender<Task>,
    stats: watch::Receiver<PacerStats>,
    max_retries: u32,
    jar: Option<Arc<Jar>>,
}

impl Pacer {
    /// Creates a scheduler with an HTTP transport built from `config`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self, PacerError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.transport)?;
        let jar = transport.cookie_jar();
        let mut pacer = Self::with_transport(config.scheduler, Arc::new(transport));
        pacer.jar = Some(jar);
        Ok(pacer)
    }

    /// Creates a scheduler around a caller-supplied transport
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(config: SchedulerConfig, transport: Arc<dyn Transport>) -> Self {
        let (submissions, submission_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(PacerStats::default());

        let state = SchedulerState {
            queue: VecDeque::new(),
            backing_off: Vec::new(),
            gate: ConcurrencyGate::new(config.max_slots as usize),
            cooldown: CooldownGovernor::new(config.sleep_every, config.sleep_for()),
            window: RateWindow::new(config.max_per_minute),
            classifier: RetryClassifier::new(config.sleep_for(), config.transient_codes.clone()),
            transport,
            completions,
            stats: stats_tx,
            outstanding: 0,
            dispatched: 0,
            retried: 0,
            cooling_down: false,
            rate_limited: false,
        };

        tracing::debug!(
            max_slots = config.max_slots,
            sleep_every = config.sleep_every,
            sleep_for_ms = config.sleep_for,
            max_per_minute = config.max_per_minute,
            "scheduler started"
        );
        tokio::spawn(state.run(submission_rx, completion_rx));

        Self {
            submissions,
            stats,
            max_retries: config.max_retries,
            jar: None,
        }
    }

    /// Submits a request and returns its eventual outcome
    ///
    /// The request is queued as soon as this is called, before the returned
    /// future is polled. Dropping the future cancels the request if it has
    /// not been dispatched yet.
    pub fn dispatch(
        &self,
        request: RequestSpec,
    ) -> impl Future<Output = Result<Response, PacerError>> + Send + 'static {
        let url = request.url.to_string();
        let (task, receiver) = Task::new(request, self.max_retries);
        // A send failure drops the task, which closes the receiver below.
        let _ = self.submissions.send(task);

        async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(PacerError::Closed { url }))
        }
    }

    /// The cookie jar shared by every request, when using the HTTP transport
    pub fn cookie_jar(&self) -> Option<Arc<Jar>> {
        self.jar.clone()
    }

    /// Current scheduler counters
    pub fn stats(&self) -> PacerStats {
        *self.stats.borrow()
    }
}

/// A finished attempt travelling back to the event loop
struct Completion {
    task: Task,
    outcome: Result<Response, TransportError>,
}

/// Everything the event loop owns
struct SchedulerState {
    queue: VecDeque<Task>,
    backing_off: Vec<(Instant, Task)>,
    gate: ConcurrencyGate,
    cooldown: CooldownGovernor,
    window: RateWindow,
    classifier: RetryClassifier,
    transport: Arc<dyn Transport>,
    completions: mpsc::UnboundedSender<Completion>,
    stats: watch::Sender<PacerStats>,
    outstanding: usize,
    dispatched: u64,
    retried: u64,
    cooling_down: bool,
    rate_limited: bool,
}

impl SchedulerState {
    async fn run(
        mut self,
        mut submissions: mpsc::UnboundedReceiver<Task>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut accepting = true;

        loop {
            let wake_at = self.pump(Instant::now());
            self.publish_stats();

            if !accepting && self.is_drained() {
                tracing::debug!(dispatched = self.dispatched, "scheduler stopped");
                break;
            }

            tokio::select! {
                task = submissions.recv(), if accepting => match task {
                    Some(task) => self.enqueue(task),
                    None => accepting = false,
                },
                Some(done) = completions.recv() => self.complete(done, Instant::now()),
                _ = sleep_until_deadline(wake_at) => {}
            }
        }
    }

    fn enqueue(&mut self, task: Task) {
        tracing::trace!(url = %task.spec.url, immediate = task.spec.is_immediate(), "task queued");
        if task.spec.is_immediate() {
            self.queue.push_front(task);
        } else {
            self.queue.push_back(task);
        }
    }

    /// Dispatches as many tasks as the limits allow
    ///
    /// Returns the next instant at which a pass could make progress without
    /// any other event arriving.
    fn pump(&mut self, now: Instant) -> Option<Instant> {
        self.promote_due_retries(now);
        let next_retry = self.next_retry_due();
        self.cooling_down = false;
        self.rate_limited = false;

        loop {
            if let Some(until) = self.cooldown.paused_until(now) {
                self.cooling_down = true;
                return earliest(Some(until), next_retry);
            }

            while self.queue.front().is_some_and(Task::is_abandoned) {
                if let Some(task) = self.queue.pop_front() {
                    tracing::debug!(url = %task.spec.url, "caller went away, dropping task");
                }
            }

            if self.queue.is_empty() || !self.gate.has_capacity() {
                return next_retry;
            }

            if let Some(until) = self.window.blocked_until(now) {
                self.rate_limited = true;
                return earliest(Some(until), next_retry);
            }

            let Some(slot) = self.gate.try_acquire() else {
                return next_retry;
            };
            let Some(task) = self.queue.pop_front() else {
                return next_retry;
            };

            self.window.record_dispatch();
            self.cooldown.record_dispatch(now);
            self.launch(task, slot);
        }
    }

    fn launch(&mut self, task: Task, slot: Slot) {
        self.outstanding += 1;
        self.dispatched += 1;
        tracing::debug!(
            url = %task.spec.url,
            attempt = task.attempts_used + 1,
            in_flight = self.gate.in_flight(),
            "dispatching"
        );

        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let outcome = transport.execute(&task.spec).await;
            // Free the slot before classification so a retry competes for a new one.
            drop(slot);
            let _ = completions.send(Completion { task, outcome });
        });
    }

    fn complete(&mut self, done: Completion, now: Instant) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let Completion { mut task, outcome } = done;

        match self.classifier.classify(&mut task, outcome) {
            Verdict::Retry(delay) => {
                self.retried += 1;
                tracing::debug!(
                    url = %task.spec.url,
                    retry = task.attempts_used,
                    delay = ?delay,
                    "retry scheduled"
                );
                self.backing_off.push((now + delay, task));
            }
            Verdict::Settle(result) => task.settle(result),
        }
    }

    /// Moves tasks whose backoff has elapsed to the front of the queue,
    /// earliest deadline first
    fn promote_due_retries(&mut self, now: Instant) {
        if self.backing_off.is_empty() {
            return;
        }

        let (mut due, waiting): (Vec<_>, Vec<_>) = self
            .backing_off
            .drain(..)
            .partition(|(deadline, _)| *deadline <= now);
        self.backing_off = waiting;

        due.sort_by_key(|(deadline, _)| *deadline);
        for (_, task) in due.into_iter().rev() {
            self.queue.push_front(task);
        }
    }

    fn next_retry_due(&self) -> Option<Instant> {
        self.backing_off.iter().map(|(deadline, _)| *deadline).min()
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.backing_off.is_empty() && self.outstanding == 0
    }

    fn publish_stats(&self) {
        self.stats.send_replace(PacerStats {
            queued: self.queue.len(),
            backing_off: self.backing_off.len(),
            in_flight: self.gate.in_flight(),
            dispatched: self.dispatched,
            retried: self.retried,
            cooling_down: self.cooling_down,
            rate_limited: self.rate_limited,
        });
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
