//! Resilient wrapper around a [`RemoteWorkspace`].
//!
//! Every call goes through, in order:
//! 1. the per-page write lock, when a page id is given,
//! 2. the circuit breaker, which fails fast while open and is consulted
//!    again before every retry,
//! 3. the concurrency and rate limiter,
//! 4. the remote call, with 429 backoff and bounded transient retries.

mod backoff;
mod breaker;
mod limiter;
mod page_lock;
mod translate;

pub use breaker::CircuitState;
pub use page_lock::{PageGuard, PageLocks};
pub use translate::translate;

use crate::config::ClientConfig;
use crate::error::{RemoteError, RemoteErrorKind, SyncError, SyncResult};
use crate::remote::{BlockPage, DatabasePage, PageMetadata, RemoteUser, RemoteWorkspace};
use backoff::RateLimitBackoff;
use breaker::CircuitBreaker;
use chrono::{DateTime, Utc};
use limiter::RateLimiter;
use pagesync_protocol::Block;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Page size used when listing blocks.
pub const BLOCK_PAGE_SIZE: usize = 100;

/// Remote client with rate limiting, backoff, a circuit breaker and
/// per-page write serialization.
pub struct ResilientClient<R: RemoteWorkspace> {
    remote: Arc<R>,
    config: ClientConfig,
    limiter: RateLimiter,
    backoff: Mutex<RateLimitBackoff>,
    breaker: Mutex<CircuitBreaker>,
    locks: PageLocks,
}

impl<R: RemoteWorkspace> ResilientClient<R> {
    /// Wraps `remote`.
    pub fn new(remote: Arc<R>, config: ClientConfig) -> Self {
        Self {
            limiter: RateLimiter::new(
                config.concurrency,
                config.requests_per_window,
                config.rate_window,
            ),
            backoff: Mutex::new(RateLimitBackoff::new(
                config.initial_delay,
                config.max_delay,
                config.rate_limit_pause_after,
                config.rate_limit_cooldown,
            )),
            breaker: Mutex::new(CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_check_interval,
            )),
            locks: PageLocks::new(),
            remote,
            config,
        }
    }

    /// The wrapped workspace.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Current breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.lock().state()
    }

    /// Consecutive counted failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.lock().consecutive_failures()
    }

    /// Time of the last successful call.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.breaker.lock().last_success()
    }

    /// Takes the write lock for `page_id`.
    ///
    /// Calls made while holding the guard must pass `None` as page id.
    pub async fn lock_page(&self, page_id: &str) -> PageGuard {
        self.locks.lock(page_id).await
    }

    /// Runs `op` under the full resilience stack.
    ///
    /// `op` may be invoked several times; 429s are retried until they stop
    /// and transient failures up to `transient_retries` times.
    pub async fn call<T, F, Fut>(&self, page_id: Option<&str>, op: F) -> SyncResult<T>
    where
        F: Fn(Arc<R>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _page = match page_id {
            Some(id) => Some(self.locks.lock(id).await),
            None => None,
        };

        let mut transient_attempts = 0u32;
        loop {
            // Re-checked per attempt: another caller may have opened the
            // circuit while this one was backing off.
            let admitted = self.breaker.lock().try_acquire(Instant::now());
            if let Err(retry_in) = admitted {
                return Err(SyncError::CircuitOpen { retry_in });
            }
            let permit = self.limiter.acquire().await;
            let result = op(Arc::clone(&self.remote)).await;
            drop(permit);

            let err = match result {
                Ok(value) => {
                    self.breaker.lock().record_success();
                    self.backoff.lock().reset();
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.kind() {
                RemoteErrorKind::RateLimited => {
                    let step = self.backoff.lock().on_rate_limited(err.retry_after);
                    if let Some(cooldown) = step.cooldown {
                        warn!(
                            cooldown_secs = cooldown.as_secs(),
                            "repeated rate limiting, pausing"
                        );
                        sleep(cooldown).await;
                    }
                    debug!(delay_ms = step.delay.as_millis() as u64, "rate limited, backing off");
                    sleep(step.delay).await;
                }
                RemoteErrorKind::Transient => {
                    let opened = self.breaker.lock().record_failure(Instant::now());
                    if opened {
                        warn!(error = %err, "circuit opened");
                    }
                    if opened || transient_attempts >= self.config.transient_retries {
                        return Err(translate(&err).into());
                    }
                    transient_attempts += 1;
                    let delay = self.config.delay_for_attempt(transient_attempts);
                    debug!(attempt = transient_attempts, error = %err, "transient failure, retrying");
                    sleep(delay).await;
                }
                RemoteErrorKind::Permanent => {
                    self.breaker.lock().record_failure(Instant::now());
                    return Err(translate(&err).into());
                }
            }
        }
    }

    /// Checks the token against the remote.
    pub async fn validate_token(&self) -> SyncResult<RemoteUser> {
        self.call(None, |r| async move { r.current_user().await })
            .await
    }

    /// Lists every block of a page, following cursors.
    pub async fn list_all_blocks(&self, page_id: &str) -> SyncResult<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: BlockPage = self
                .call(None, |r| {
                    let id = page_id.to_string();
                    let cursor = cursor.clone();
                    async move { r.list_blocks(&id, cursor.as_deref(), BLOCK_PAGE_SIZE).await }
                })
                .await?;
            blocks.extend(page.results);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(blocks),
            }
        }
    }

    /// Deletes one block.
    pub async fn delete_block(&self, block_id: &str) -> SyncResult<()> {
        self.call(None, |r| {
            let id = block_id.to_string();
            async move { r.delete_block(&id).await }
        })
        .await
    }

    /// Appends blocks to a page.
    pub async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> SyncResult<()> {
        self.call(None, |r| {
            let id = page_id.to_string();
            let blocks = blocks.to_vec();
            async move { r.append_blocks(&id, &blocks).await }
        })
        .await
    }

    /// Reads page metadata.
    pub async fn page_metadata(&self, page_id: &str) -> SyncResult<PageMetadata> {
        self.call(None, |r| {
            let id = page_id.to_string();
            async move { r.page_metadata(&id).await }
        })
        .await
    }

    /// Leaves a removal note on a page, under its write lock.
    pub async fn annotate_removed(&self, page_id: &str, note: &str) -> SyncResult<()> {
        self.call(Some(page_id), |r| {
            let id = page_id.to_string();
            let note = note.to_string();
            async move { r.annotate_removed(&id, &note).await }
        })
        .await
    }

    /// Queries one page of a database.
    pub async fn query_database(
        &self,
        database_id: &str,
        edited_after: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> SyncResult<DatabasePage> {
        self.call(None, |r| {
            let id = database_id.to_string();
            let cursor = cursor.map(str::to_string);
            async move { r.query_database(&id, edited_after, cursor.as_deref()).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorkspace;
    use std::time::Duration;

    fn client(config: ClientConfig) -> (Arc<MemoryWorkspace>, ResilientClient<MemoryWorkspace>) {
        let remote = Arc::new(MemoryWorkspace::new());
        remote.insert_page("p1", "# Hello");
        (remote.clone(), ResilientClient::new(remote, config))
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_back_off_without_tripping_the_breaker() {
        let (remote, client) = client(ClientConfig::default());
        remote.fail_next(2, RemoteError::rate_limited(None));

        let begin = Instant::now();
        let meta = client.page_metadata("p1").await.unwrap();
        assert_eq!(meta.id, "p1");
        assert!(begin.elapsed() >= Duration::from_secs(3));
        assert_eq!(client.consecutive_failures(), 0);
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert_eq!(remote.call_count("page_metadata"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_fails_fast_and_recovers() {
        let (remote, client) = client(
            ClientConfig::default()
                .with_circuit_breaker_threshold(3)
                .with_transient_retries(0),
        );
        remote.fail_next(3, RemoteError::status(503, "down"));

        for _ in 0..3 {
            assert!(matches!(
                client.page_metadata("p1").await,
                Err(SyncError::Api(_))
            ));
        }
        assert_eq!(client.circuit_state(), CircuitState::Open);

        let calls = remote.total_calls();
        assert!(matches!(
            client.page_metadata("p1").await,
            Err(SyncError::CircuitOpen { .. })
        ));
        assert_eq!(remote.total_calls(), calls);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(client.page_metadata("p1").await.is_ok());
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert_eq!(client.consecutive_failures(), 0);
        assert!(client.last_success().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_once_another_caller_opens_the_circuit() {
        let (remote, client) = client(
            ClientConfig::default()
                .with_circuit_breaker_threshold(2)
                .with_transient_retries(2),
        );
        remote.fail_next(2, RemoteError::status(503, "down"));

        let (first, second) = tokio::join!(client.page_metadata("p1"), client.page_metadata("p1"));

        assert!(matches!(second, Err(SyncError::Api(_))));
        assert!(matches!(first, Err(SyncError::CircuitOpen { .. })));
        assert_eq!(remote.total_calls(), 2);
        assert_eq!(client.circuit_state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let (remote, client) = client(ClientConfig::default());
        remote.fail_next(2, RemoteError::network("reset"));

        assert!(client.page_metadata("p1").await.is_ok());
        assert_eq!(remote.call_count("page_metadata"), 3);
        assert_eq!(client.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_translated_immediately() {
        let (remote, client) = client(ClientConfig::default());
        remote.fail_next(1, RemoteError::status(403, "restricted"));

        match client.page_metadata("p1").await {
            Err(SyncError::Api(api)) => {
                assert_eq!(api.status, 403);
                assert!(api.remediation.contains("Share the page"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(remote.call_count("page_metadata"), 1);
        assert_eq!(client.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_all_blocks_follows_cursors() {
        let (remote, client) = client(ClientConfig::default());
        let body: Vec<String> = (0..250).map(|i| format!("para {i}")).collect();
        remote.set_page_markdown("p1", &body.join("\n\n"));

        let blocks = client.list_all_blocks("p1").await.unwrap();
        assert_eq!(blocks.len(), 250);
        assert_eq!(remote.call_count("list_blocks"), 3);
    }

    #[tokio::test]
    async fn validate_token_reports_user() {
        let (_remote, client) = client(ClientConfig::default());
        assert_eq!(client.validate_token().await.unwrap().id, "memory-user");
    }
}
