//! Drives a query through its lifecycle: submit, poll with back-off, fetch.

use crate::query::error::QueryError;
use crate::query::result::QueryResult;
use crate::query::service::{QueryHandle, QueryService};
use crate::query::spec::QuerySpec;
use crate::query::status::{QueryState, QueryStatus};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often to poll a running query, and for how long.
///
/// The wait between polls starts at `initial_interval` and is multiplied by `backoff_factor`
/// after every poll, up to `max_interval`. A query that has not finished `timeout` after
/// submission is abandoned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            backoff_factor: 1.5,
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl PollPolicy {
    /// The wait following one of `current`. Never shrinks and never exceeds `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Runs queries against a [`QueryService`].
///
/// All queries started by one runner share its cancellation token: cancelling it stops every
/// wait in progress at the next opportunity.
pub struct QueryRunner<S> {
    service: S,
    policy: PollPolicy,
    cancellation: CancellationToken,
}

impl<S: QueryService> QueryRunner<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            policy: PollPolicy::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Validates and submits `spec`, waits for it to finish and fetches its result.
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidSpec`] if `spec` does not validate; nothing is submitted.
    /// * [`QueryError::Failed`], [`QueryError::TimedOut`] or [`QueryError::Cancelled`] if the
    ///   query does not succeed. Its result is never fetched in that case.
    /// * [`QueryError::InvalidTransition`] if the service reports an impossible status
    ///   sequence.
    /// * Transport errors of the underlying service.
    pub async fn run(&self, spec: &QuerySpec) -> Result<QueryResult, QueryError> {
        spec.validate()?;

        let handle = self.service.submit_query(spec).await?;
        info!(
            "Submitted query {} for layers [{}]",
            handle,
            spec.layer_names().collect::<Vec<_>>().join(", ")
        );

        self.wait(&handle).await?;

        let result = self.service.fetch_result(&handle).await?;
        info!(
            "Fetched result of query {} ({} layers)",
            handle,
            result.layers.len()
        );
        Ok(result)
    }

    /// Polls `handle` until it succeeds, fails, times out or is cancelled.
    pub async fn wait(&self, handle: &QueryHandle) -> Result<(), QueryError> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut state = QueryState::Submitted;
        let mut interval = self.policy.initial_interval;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(self.abandon(handle, state, QueryState::Cancelled, started));
            }

            let status = self.service.poll_status(handle).await?;
            let next = state.transition(status.state())?;
            if next != state {
                debug!("Query {} moved from {} to {}", handle, state, next);
            }
            state = next;

            match status {
                QueryStatus::Succeeded => return Ok(()),
                QueryStatus::Failed { reason } => {
                    warn!(
                        "Query {} failed after {:?}: {}",
                        handle,
                        started.elapsed(),
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    return Err(QueryError::Failed {
                        id: handle.id.clone(),
                        reason,
                    });
                }
                QueryStatus::Pending | QueryStatus::Running => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.abandon(handle, state, QueryState::TimedOut, started));
            }

            let pause = interval.min(deadline - now);
            debug!("Query {} is {}, polling again in {:?}", handle, state, pause);
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    return Err(self.abandon(handle, state, QueryState::Cancelled, started));
                }
                _ = tokio::time::sleep(pause) => {}
            }
            interval = self.policy.next_interval(interval);
        }
    }

    fn abandon(
        &self,
        handle: &QueryHandle,
        state: QueryState,
        to: QueryState,
        started: Instant,
    ) -> QueryError {
        if let Err(error) = state.transition(to) {
            return error;
        }
        let elapsed = started.elapsed();
        warn!(
            "Abandoning query {} ({}) after {:?}: {}",
            handle, state, elapsed, to
        );
        let id = handle.id.clone();
        match to {
            QueryState::TimedOut => QueryError::TimedOut { id, elapsed },
            _ => QueryError::Cancelled { id },
        }
    }
}
