use std::sync::Arc;

use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;

use crate::rmc_client::{RmcClient, RmcClientError, ViolationRecord};

use super::types::Outcome;

/// Shared process-local limiter enforcing the politeness budget across every
/// probe in an invocation, retries included.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Probes one violation number and classifies what came back.
///
/// This trait exists so the engine can be unit-tested against scripted
/// outcomes without live network access.
pub trait RecordSource: Send + Sync {
    fn probe<'a>(&'a self, violation_number: u64) -> BoxFuture<'a, Outcome>;
}

impl<T> RecordSource for Arc<T>
where
    T: RecordSource + ?Sized,
{
    fn probe<'a>(&'a self, violation_number: u64) -> BoxFuture<'a, Outcome> {
        (**self).probe(violation_number)
    }
}

/// Production record source: the RMC HTTP client behind the shared rate
/// limiter.
pub struct RmcRecordSource {
    client: RmcClient,
    rate_limiter: GlobalRateLimiter,
}

impl RmcRecordSource {
    pub fn new(client: RmcClient, rate_limiter: GlobalRateLimiter) -> Self {
        Self {
            client,
            rate_limiter,
        }
    }
}

impl RecordSource for RmcRecordSource {
    fn probe<'a>(&'a self, violation_number: u64) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            self.rate_limiter.until_ready().await;
            classify(self.client.search_violation(violation_number).await)
        })
    }
}

/// Maps a raw lookup result onto the closed outcome set.
pub fn classify(result: Result<Option<ViolationRecord>, RmcClientError>) -> Outcome {
    match result {
        Ok(Some(record)) => Outcome::Match(record),
        Ok(None) => Outcome::Empty,
        Err(RmcClientError::UnexpectedStatus { status: 403, .. }) => Outcome::Forbidden,
        Err(RmcClientError::UnexpectedStatus { status: 429, .. }) => Outcome::RateLimited,
        Err(RmcClientError::UnexpectedStatus { status: 404, .. }) => Outcome::NotFound,
        Err(err) => Outcome::TransportError(err.to_string()),
    }
}
