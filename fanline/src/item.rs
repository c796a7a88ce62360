//! Per-request retry/timeout state machine.

use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::Instant;

use crate::config::RetryPolicy;
use crate::connection::{Exchange, Step};
use crate::error::FailReason;
use crate::metrics;

/// Callback capability implemented per request kind.
///
/// A task drives one [`PendingItem`]: the scheduler asks it for new
/// attempts and delivers exactly one terminal callback per item. All
/// callbacks run synchronously on the thread driving the set and must
/// not block; panics are not caught and propagate out of `work`. Tasks
/// never receive the set itself, so sweep iteration cannot be
/// invalidated from a callback.
pub trait Task<K, T> {
    /// Build the next attempt. `tries` counts attempts already started.
    /// Returning `None` leaves the item sleeping for this tick without
    /// consuming an attempt.
    fn on_retry(&mut self, id: &K, tries: u32) -> Option<Exchange<T>>;

    /// Delivered exactly once, on final success.
    fn on_ok(&mut self, id: &K, rows: Vec<T>);

    /// Delivered exactly once, on terminal failure.
    fn on_error(&mut self, id: &K, reason: FailReason);
}

/// Tri-state of an item. The in-flight exchange lives inside the
/// `Pending` variant, so "done implies no connection" and "pending
/// implies an exchange" hold by construction.
enum Phase<T> {
    /// Waiting out `retry_delay` before the next attempt.
    Sleeping,
    /// An attempt is in flight on the owned connection.
    Pending(Exchange<T>),
    /// Terminal. A callback has fired or is about to fire.
    Done,
}

/// Result of driving an item's exchange one step.
pub(crate) enum Advanced<T> {
    /// Recoverable failure; the caller closes the item back to sleeping.
    Failed,
    /// More to read on a later cycle, possibly on a swapped connection.
    Continuing,
    /// Final rows, postprocess already applied. The item is done.
    Finished(Vec<T>),
}

/// One logical request against one shard.
///
/// Owns the retry budget, the per-attempt deadlines, the task callbacks,
/// and, while an attempt is in flight, the connection. Created by the
/// caller, installed into a [`PendingSet`](crate::PendingSet), and
/// removed at the first of: success, retry exhaustion, or set-level
/// finish.
pub struct PendingItem<K, T> {
    id: K,
    policy: RetryPolicy,
    tries: u32,
    phase: Phase<T>,
    /// Time of the last phase transition. `None` until the first
    /// transition, so a freshly installed item is eligible immediately.
    since: Option<Instant>,
    task: Box<dyn Task<K, T>>,
}

impl<K, T> PendingItem<K, T> {
    /// Create a sleeping item. The first attempt starts on the next
    /// `send` sweep.
    pub fn new(id: K, policy: RetryPolicy, task: Box<dyn Task<K, T>>) -> Self {
        PendingItem {
            id,
            policy,
            tries: 0,
            phase: Phase::Sleeping,
            since: None,
            task,
        }
    }

    /// The item's id (its shard key).
    pub fn id(&self) -> &K {
        &self.id
    }

    /// Attempts started so far.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// The item's retry/timeout policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending(_))
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self.phase, Phase::Sleeping)
    }

    /// Whether the phase deadline has elapsed since the last transition:
    /// `retry_delay` while sleeping, `timeout` while pending. Always
    /// false once done.
    pub fn is_timeout(&self) -> bool {
        let limit = match self.phase {
            Phase::Sleeping => self.policy.retry_delay,
            Phase::Pending(_) => self.policy.timeout,
            Phase::Done => return false,
        };
        match self.since {
            Some(since) => since.elapsed() > limit,
            None => true,
        }
    }

    /// The pollable descriptor, present only while pending. Re-read every
    /// cycle because a chunked advance may swap the connection.
    pub(crate) fn pollable(&self) -> Option<BorrowedFd<'_>> {
        match &self.phase {
            Phase::Pending(exchange) => Some(exchange.connection.as_fd()),
            _ => None,
        }
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.pollable().map(|fd| fd.as_raw_fd())
    }

    /// Ask the task for the next attempt and install it. Returns whether
    /// an attempt was started; `false` leaves the item sleeping with its
    /// budget untouched.
    pub(crate) fn next_attempt(&mut self) -> bool {
        let Some(exchange) = self.task.on_retry(&self.id, self.tries) else {
            return false;
        };
        self.phase = Phase::Pending(exchange);
        self.tries += 1;
        self.since = Some(Instant::now());
        metrics::ATTEMPTS_STARTED.increment();
        true
    }

    /// Run the exchange one step. Only called while pending, with the
    /// descriptor readable.
    pub(crate) fn advance(&mut self) -> Advanced<T> {
        let step = match &mut self.phase {
            Phase::Pending(exchange) => (exchange.advance)(),
            _ => {
                debug_assert!(false, "advance on a non-pending item");
                return Advanced::Failed;
            }
        };
        match step {
            Err(error) => {
                tracing::debug!(error = %error, tries = self.tries, "exchange step failed");
                Advanced::Failed
            }
            Ok(Step::More(fresh)) => {
                if let Some(connection) = fresh {
                    if let Phase::Pending(exchange) = &mut self.phase {
                        exchange.connection = connection;
                    }
                }
                self.since = Some(Instant::now());
                Advanced::Continuing
            }
            Ok(Step::Done(rows)) => {
                let Phase::Pending(mut exchange) = mem::replace(&mut self.phase, Phase::Done)
                else {
                    unreachable!("phase checked above");
                };
                let rows = match exchange.postprocess.take() {
                    Some(postprocess) => postprocess(rows),
                    None => rows,
                };
                Advanced::Finished(rows)
            }
        }
    }

    /// Close the in-flight exchange and drop back to sleeping. No-op on
    /// sleeping and done items.
    pub fn close(&mut self, reason: &str) {
        if !self.is_pending() {
            return;
        }
        let Phase::Pending(mut exchange) = mem::replace(&mut self.phase, Phase::Sleeping) else {
            unreachable!("phase checked above");
        };
        exchange.connection.close(reason);
        self.since = Some(Instant::now());
        tracing::debug!(reason, tries = self.tries, "attempt closed");
    }

    /// Deliver the success callback. The item must already be done and
    /// removed from its set.
    pub(crate) fn finish_ok(mut self, rows: Vec<T>) {
        debug_assert!(self.is_done());
        metrics::ITEMS_OK.increment();
        self.task.on_ok(&self.id, rows);
    }

    /// Deliver the error callback. The item must not be pending (callers
    /// close first) and must already be removed from its set.
    pub(crate) fn finish_error(mut self, reason: FailReason) {
        debug_assert!(!self.is_pending());
        self.phase = Phase::Done;
        metrics::ITEMS_ERROR.increment();
        self.task.on_error(&self.id, reason);
    }
}

impl<K, T> Drop for PendingItem<K, T> {
    fn drop(&mut self) {
        // Dropping an item with an exchange in flight leaks the attempt;
        // every scheduler path closes or finishes before release.
        if self.is_pending() && !std::thread::panicking() {
            tracing::error!(tries = self.tries, "pending item dropped with an exchange in flight");
            debug_assert!(false, "PendingItem dropped while pending");
        }
    }
}
