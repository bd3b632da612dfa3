//! Batching and query pacing.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use leadscout_shared::{PersonRecord, RunConfig};

/// Splits records into ordered batches.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    /// `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Lazy batches of at most `batch_size` records, in input order.
    pub fn batches<'a>(
        &self,
        records: &'a [PersonRecord],
    ) -> impl Iterator<Item = &'a [PersonRecord]> + 'a {
        records.chunks(self.batch_size)
    }

    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.batch_size)
    }
}

/// Where the next query sits relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Another query within the same batch.
    Query,
    /// The first query of a new batch.
    Batch,
}

/// Randomized delay between queries.
///
/// The first query of a run goes out immediately. Later queries wait a delay
/// drawn uniformly from `[min_delay, max_delay]`, multiplied by
/// `batch_cooldown` when a new batch starts.
pub struct Pacer {
    min_delay: f64,
    max_delay: f64,
    batch_cooldown: f64,
    rng: StdRng,
    started: bool,
}

impl Pacer {
    pub fn new(min_delay: f64, max_delay: f64, batch_cooldown: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            min_delay: min_delay.max(0.0),
            max_delay: max_delay.max(min_delay).max(0.0),
            batch_cooldown: batch_cooldown.max(1.0),
            rng,
            started: false,
        }
    }

    /// The delay owed before the next query. Consumes one jitter draw unless
    /// this is the first query of the run.
    pub fn next_delay(&mut self, boundary: Boundary) -> Duration {
        if !self.started {
            self.started = true;
            return Duration::ZERO;
        }
        let jitter = if self.max_delay > self.min_delay {
            self.rng.gen_range(self.min_delay..=self.max_delay)
        } else {
            self.min_delay
        };
        let secs = match boundary {
            Boundary::Query => jitter,
            Boundary::Batch => jitter * self.batch_cooldown,
        };
        Duration::from_secs_f64(secs)
    }

    /// Wait before the next query. Returns `false` if cancelled while waiting.
    pub async fn pace(&mut self, boundary: Boundary, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay(boundary);
        debug!(delay_ms = delay.as_millis() as u64, ?boundary, "pacing");
        sleep_or_cancel(delay, cancel).await
    }
}

impl From<&RunConfig> for Pacer {
    fn from(config: &RunConfig) -> Self {
        Self::new(
            config.min_delay,
            config.max_delay,
            config.batch_cooldown,
            config.seed,
        )
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
