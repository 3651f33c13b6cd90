//! Deduplicating download scheduler.
//!
//! One job exists per resource id while anyone is subscribed to it. Every
//! `fetch` for the same id attaches another subscriber to that job instead of
//! starting a second transfer. Jobs wait in a [`JobQueue`] until a slot is
//! free, then run as tokio tasks that stream events back to each subscriber.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use super::job::{DownloadEvent, DownloadOptions, DownloadOutcome, DownloadPriority};
use super::queue::JobQueue;
use crate::domain::errors::LoadError;
use crate::domain::ports::{Credentials, Headers, HeadersFilter, NetworkClient, NetworkRequest};
use crate::infrastructure::config::{DownloaderConfig, ExecutionOrder};

const USER_AGENT_HEADER: &str = "User-Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    InFlight,
}

struct Subscriber {
    id: u64,
    progressive: bool,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl Subscriber {
    fn send(&self, event: DownloadEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

struct Job {
    id: u64,
    state: JobState,
    priority: DownloadPriority,
    options: DownloadOptions,
    subscribers: Vec<Subscriber>,
    task: Option<AbortHandle>,
}

impl Job {
    fn finish(self, outcome: &DownloadOutcome) {
        if let Some(task) = &self.task {
            task.abort();
        }
        for subscriber in &self.subscribers {
            subscriber.send(DownloadEvent::Finished(outcome.clone()));
        }
    }
}

struct State {
    jobs: HashMap<String, Job>,
    queue: JobQueue,
    in_flight: usize,
    suspended: bool,
    max_concurrent: usize,
    order: ExecutionOrder,
    timeout: Duration,
    headers: Headers,
    credentials: Option<Credentials>,
    headers_filter: Option<HeadersFilter>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_free_slot(&self) -> bool {
        !self.suspended && self.in_flight < self.max_concurrent.max(1)
    }

    fn build_request(&self, url: &str, options: DownloadOptions) -> NetworkRequest {
        let headers = match &self.headers_filter {
            Some(filter) => filter(url, self.headers.clone()),
            None => self.headers.clone(),
        };
        NetworkRequest {
            url: url.to_string(),
            headers,
            credentials: self.credentials.clone(),
            timeout: self.timeout,
            handle_cookies: options.handle_cookies,
            allow_invalid_certificates: options.allow_invalid_certificates,
        }
    }
}

struct Inner {
    client: Arc<dyn NetworkClient>,
    state: Mutex<State>,
}

impl Inner {
    /// Starts queued jobs while slots are free. Runs under the state lock so
    /// that admission and the job table never disagree.
    fn pump(self: &Arc<Self>, state: &mut State) {
        while state.has_free_slot() {
            let Some(url) = state.queue.pop() else {
                break;
            };
            let Some(job) = state.jobs.get(&url) else {
                continue;
            };
            let (job_id, options) = (job.id, job.options);
            let request = state.build_request(&url, options);

            let inner = Arc::clone(self);
            let task_url = url.clone();
            let task = tokio::spawn(async move { inner.run(task_url, job_id, request).await });

            if let Some(job) = state.jobs.get_mut(&url) {
                job.state = JobState::InFlight;
                job.task = Some(task.abort_handle());
            }
            state.in_flight += 1;
            debug!(url = %url, job_id, in_flight = state.in_flight, "Download started");
        }
    }

    async fn run(self: Arc<Self>, url: String, job_id: u64, request: NetworkRequest) {
        let timeout = request.timeout;
        let result = tokio::time::timeout(timeout, self.transfer(&url, job_id, request))
            .await
            .unwrap_or_else(|_| {
                Err(LoadError::timeout(format!(
                    "Download timed out after {}s",
                    timeout.as_secs_f32()
                )))
            });

        let outcome = match result {
            Ok(data) if data.is_empty() => {
                DownloadOutcome::Failed(LoadError::invalid_data("Downloaded image is empty"))
            }
            Ok(data) => DownloadOutcome::Completed(data),
            Err(e) => DownloadOutcome::Failed(e),
        };
        self.complete(&url, job_id, &outcome);
    }

    async fn transfer(
        &self,
        url: &str,
        job_id: u64,
        request: NetworkRequest,
    ) -> Result<Bytes, LoadError> {
        let response = self.client.request(request).await?;
        let expected = response.expected_length;
        let mut body = response.body;

        #[allow(clippy::cast_possible_truncation)]
        let mut buffer = BytesMut::with_capacity(expected.unwrap_or(0).min(16 * 1024 * 1024) as usize);
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
            self.notify_progress(url, job_id, &buffer, expected);
        }
        Ok(buffer.freeze())
    }

    /// Sends progress, and the received prefix to progressive subscribers.
    ///
    /// The prefix is copied outside the state lock. Sending happens under it,
    /// so nothing reaches a subscriber after its terminal event.
    fn notify_progress(&self, url: &str, job_id: u64, buffer: &BytesMut, expected: Option<u64>) {
        let wants_partial = {
            let state = self.state.lock();
            let Some(job) = state.jobs.get(url).filter(|job| job.id == job_id) else {
                return;
            };
            job.subscribers.iter().any(|s| s.progressive)
        };
        let partial = wants_partial.then(|| Bytes::copy_from_slice(buffer));

        let state = self.state.lock();
        let Some(job) = state.jobs.get(url).filter(|job| job.id == job_id) else {
            return;
        };
        let received = buffer.len() as u64;
        trace!(url = %url, received, expected, "Download progress");

        for subscriber in &job.subscribers {
            subscriber.send(DownloadEvent::Progress { received, expected });
            if subscriber.progressive
                && let Some(partial) = &partial
            {
                subscriber.send(DownloadEvent::Partial(partial.clone()));
            }
        }
    }

    fn complete(self: &Arc<Self>, url: &str, job_id: u64, outcome: &DownloadOutcome) {
        let mut state = self.state.lock();
        if state.jobs.get(url).is_none_or(|job| job.id != job_id) {
            // Cancelled while the transfer was finishing.
            return;
        }
        let Some(mut job) = state.jobs.remove(url) else {
            return;
        };
        state.in_flight = state.in_flight.saturating_sub(1);

        match outcome {
            DownloadOutcome::Failed(e) => {
                warn!(url = %url, error = %e, "Download failed");
            }
            _ => debug!(url = %url, subscribers = job.subscribers.len(), "Download finished"),
        }
        job.task = None;
        job.finish(outcome);
        self.pump(&mut state);
    }

    fn cancel(self: &Arc<Self>, url: &str, subscriber_id: u64) {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(url) else {
            return;
        };
        let Some(pos) = job.subscribers.iter().position(|s| s.id == subscriber_id) else {
            return;
        };

        let subscriber = job.subscribers.remove(pos);
        subscriber.send(DownloadEvent::Finished(DownloadOutcome::Cancelled));
        if !job.subscribers.is_empty() {
            trace!(url = %url, remaining = job.subscribers.len(), "Subscriber detached");
            return;
        }

        let (priority, job_state) = (job.priority, job.state);
        let Some(job) = state.jobs.remove(url) else {
            return;
        };
        match job_state {
            JobState::Queued => {
                state.queue.remove(url, priority);
            }
            JobState::InFlight => {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
        }
        debug!(url = %url, "Download cancelled, last subscriber detached");
        job.finish(&DownloadOutcome::Cancelled);
        self.pump(&mut state);
    }
}

/// Cancels one subscription. Holds only a weak reference to the coordinator.
#[derive(Debug, Clone)]
pub struct DownloadToken {
    coordinator: Weak<Inner>,
    url: String,
    subscriber_id: u64,
}

impl DownloadToken {
    /// The resource id this token subscribes to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Detaches this subscriber. The transfer is aborted if it was the last
    /// one. Does nothing once the subscriber has received its terminal event.
    pub fn cancel(&self) {
        if let Some(inner) = self.coordinator.upgrade() {
            inner.cancel(&self.url, self.subscriber_id);
        }
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator").finish_non_exhaustive()
    }
}

/// One subscriber's view of a download.
#[derive(Debug)]
pub struct DownloadHandle {
    token: DownloadToken,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
}

impl DownloadHandle {
    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &DownloadToken {
        &self.token
    }

    /// Receives the next event. `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Splits into token and event receiver.
    #[must_use]
    pub fn into_parts(self) -> (DownloadToken, mpsc::UnboundedReceiver<DownloadEvent>) {
        (self.token, self.events)
    }

    /// Skips progress and waits for the terminal outcome.
    pub async fn outcome(mut self) -> DownloadOutcome {
        while let Some(event) = self.events.recv().await {
            if let DownloadEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        DownloadOutcome::Cancelled
    }
}

/// Deduplicating, priority-ordered download scheduler.
///
/// Cheap to clone; clones share the same job table.
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

impl DownloadCoordinator {
    /// Creates a coordinator over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn NetworkClient>, config: &DownloaderConfig) -> Self {
        let mut headers = config.headers.clone();
        headers.insert(USER_AGENT_HEADER.to_string(), config.user_agent.clone());

        let state = State {
            jobs: HashMap::new(),
            queue: JobQueue::new(),
            in_flight: 0,
            suspended: false,
            max_concurrent: config.max_concurrent_downloads,
            order: config.execution_order,
            timeout: config.timeout(),
            headers,
            credentials: config.credentials(),
            headers_filter: None,
            next_id: 0,
        };
        Self {
            inner: Arc::new(Inner {
                client,
                state: Mutex::new(state),
            }),
        }
    }

    /// Subscribes to `url`, starting a download if none is running.
    ///
    /// Attaching to a queued job with a higher priority promotes that job.
    /// The job keeps the options of the fetch that created it, except
    /// `progressive`, which applies per subscriber.
    pub fn fetch(
        &self,
        url: &str,
        priority: DownloadPriority,
        options: DownloadOptions,
    ) -> DownloadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let subscriber_id = state.next_id();
        let token = DownloadToken {
            coordinator: Arc::downgrade(&self.inner),
            url: url.to_string(),
            subscriber_id,
        };
        let subscriber = Subscriber {
            id: subscriber_id,
            progressive: options.progressive,
            events: tx,
        };

        if url.is_empty() {
            subscriber.send(DownloadEvent::Finished(DownloadOutcome::Failed(
                LoadError::InvalidUrl,
            )));
            return DownloadHandle { token, events: rx };
        }

        let order = state.order;
        if let Some(job) = state.jobs.get_mut(url) {
            job.subscribers.push(subscriber);
            let subscribers = job.subscribers.len();
            if job.state == JobState::Queued && priority > job.priority {
                let from = job.priority;
                job.priority = priority;
                state.queue.promote(url, from, priority, order);
                debug!(url = %url, ?priority, "Queued download promoted");
            }
            trace!(url = %url, subscribers, "Attached to running download");
            return DownloadHandle { token, events: rx };
        }

        let job_id = state.next_id();
        state.jobs.insert(
            url.to_string(),
            Job {
                id: job_id,
                state: JobState::Queued,
                priority,
                options,
                subscribers: vec![subscriber],
                task: None,
            },
        );
        state.queue.push(url.to_string(), priority, order);
        debug!(url = %url, job_id, ?priority, "Download queued");

        self.inner.pump(state);
        DownloadHandle { token, events: rx }
    }

    /// Detaches the subscriber behind `token`.
    pub fn cancel(&self, token: &DownloadToken) {
        self.inner.cancel(&token.url, token.subscriber_id);
    }

    /// Cancels every job and detaches every subscriber.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock();
        let jobs: Vec<Job> = state.jobs.drain().map(|(_, job)| job).collect();
        state.queue.clear();
        state.in_flight = 0;
        drop(state);

        debug!(count = jobs.len(), "Cancelled all downloads");
        for job in jobs {
            job.finish(&DownloadOutcome::Cancelled);
        }
    }

    /// Stops or resumes admission of queued jobs. Running jobs continue.
    pub fn set_suspended(&self, suspended: bool) {
        let mut state = self.inner.state.lock();
        state.suspended = suspended;
        debug!(suspended, "Download queue suspension changed");
        if !suspended {
            self.inner.pump(&mut state);
        }
    }

    /// Returns true while admission is suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().suspended
    }

    /// Changes the concurrency limit and admits queued jobs if it grew.
    pub fn set_max_concurrent_downloads(&self, max: usize) {
        let mut state = self.inner.state.lock();
        state.max_concurrent = max;
        self.inner.pump(&mut state);
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn max_concurrent_downloads(&self) -> usize {
        self.inner.state.lock().max_concurrent
    }

    /// Changes the order of future queue insertions.
    pub fn set_execution_order(&self, order: ExecutionOrder) {
        self.inner.state.lock().order = order;
    }

    /// Changes the timeout of future requests.
    pub fn set_download_timeout(&self, timeout: Duration) {
        self.inner.state.lock().timeout = timeout;
    }

    /// Sets or, with `None`, removes a default header.
    pub fn set_header(&self, name: &str, value: Option<&str>) {
        let mut state = self.inner.state.lock();
        match value {
            Some(value) => {
                state.headers.insert(name.to_string(), value.to_string());
            }
            None => {
                state.headers.remove(name);
            }
        }
    }

    /// Returns a default header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.state.lock().headers.get(name).cloned()
    }

    /// Sets the default basic-auth credentials.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        self.inner.state.lock().credentials = credentials;
    }

    /// Installs a filter that rewrites the headers of every request.
    pub fn set_headers_filter(&self, filter: Option<HeadersFilter>) {
        self.inner.state.lock().headers_filter = filter;
    }

    /// Queued plus in-flight jobs.
    #[must_use]
    pub fn current_download_count(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    /// In-flight jobs.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Number of subscribers attached to the job for `url`.
    #[must_use]
    pub fn subscriber_count(&self, url: &str) -> usize {
        self.inner
            .state
            .lock()
            .jobs
            .get(url)
            .map_or(0, |job| job.subscribers.len())
    }

    /// Jobs waiting for a slot.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}
