//! Optimistic concurrency retry.
//!
//! [`retry_on_conflict`] re-reads the latest object, applies a mutation and
//! writes it back, retrying only when the write loses a version race.

use std::future::Future;
use std::time::Duration;

use certconform_core::config::TimingConfig;
use certconform_core::error::ClientError;
use certconform_core::metrics as m;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ConformanceError;

/// How many conflicting writes to tolerate and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictBudget {
    /// Total write attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ConflictBudget {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            max_attempts: timing.conflict_max_attempts,
            backoff: timing.conflict_backoff(),
        }
    }
}

impl Default for ConflictBudget {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

/// Read, mutate and write `target` until the write is accepted.
///
/// Only `Conflict` write errors are retried. A failed read is a `Fetch`
/// error, any other write error is an `Update` error, and running out of
/// attempts is a `Conflict` error.
pub async fn retry_on_conflict<T, R, RFut, M, W, WFut>(
    budget: ConflictBudget,
    target: &str,
    cancel: &CancellationToken,
    mut read: R,
    mut mutate: M,
    mut write: W,
) -> Result<T, ConformanceError>
where
    R: FnMut() -> RFut,
    RFut: Future<Output = Result<T, ClientError>>,
    M: FnMut(T) -> T,
    W: FnMut(T) -> WFut,
    WFut: Future<Output = Result<T, ClientError>>,
{
    let cancelled = || ConformanceError::Cancelled {
        target: target.to_owned(),
    };
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let current = read().await.map_err(|source| ConformanceError::Fetch {
            target: target.to_owned(),
            source,
        })?;
        attempts += 1;

        match write(mutate(current)).await {
            Ok(written) => {
                debug!(target_object = target, attempts, "update accepted");
                return Ok(written);
            }
            Err(err) if err.is_conflict() => {
                if attempts >= budget.max_attempts {
                    return Err(ConformanceError::Conflict {
                        target: target.to_owned(),
                        attempts,
                    });
                }
                metrics::counter!(m::CONFLICT_RETRIES_TOTAL).increment(1);
                warn!(
                    target_object = target,
                    attempt = attempts,
                    max_attempts = budget.max_attempts,
                    error = %err,
                    "update conflicted, re-reading"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(budget.backoff) => {}
                }
            }
            Err(source) => {
                return Err(ConformanceError::Update {
                    target: target.to_owned(),
                    source,
                });
            }
        }
    }
}
