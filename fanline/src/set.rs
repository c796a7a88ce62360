//! The pending-set scheduling loop.
//!
//! A [`PendingSet`] advances all installed items concurrently using
//! readiness multiplexing: one cycle is a start-or-retry sweep over
//! sleeping items, one bounded readiness wait across every in-flight
//! descriptor, and one drain pass over the items that became ready.
//! `work` repeats cycles until the set empties or the overall deadline
//! expires, then drains the remainder with timeout errors.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::os::fd::BorrowedFd;
use std::time::{Duration, Instant};

use crate::config::SetConfig;
use crate::connection::close_reason;
use crate::error::{Error, FailReason};
use crate::item::{Advanced, PendingItem};
use crate::metrics;
use crate::poll::{self, Readiness};

/// Outcome of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The readiness primitive itself failed; the current `work`
    /// invocation stops and remaining items drain as timeouts.
    Failed,
    /// Zero events within the iteration timeout.
    Idle,
    /// This many descriptors reported readiness.
    Ready(usize),
}

/// Callback invoked whenever a readiness wait times out with zero events.
pub type IdleFn = Box<dyn FnMut()>;

/// A keyed collection of [`PendingItem`]s driven as a group.
///
/// Single-threaded: parallelism comes from multiplexing many sockets,
/// not from threads. The only suspension point is the readiness wait;
/// every callback runs synchronously on the driving thread.
pub struct PendingSet<K, T> {
    name: String,
    maxtime: Duration,
    itertime: Duration,
    on_idle: Option<IdleFn>,
    pending: HashMap<K, PendingItem<K, T>>,
    /// Readiness snapshot from the last wait, consumed by the next recv.
    waitresult: Readiness,
}

impl<K, T> PendingSet<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty set from a validated configuration.
    pub fn new(config: SetConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(PendingSet {
            name: config.name,
            maxtime: config.maxtime,
            itertime: config.itertime,
            on_idle: None,
            pending: HashMap::new(),
            waitresult: Readiness::default(),
        })
    }

    /// Install the idle callback, fired at most once per cycle on the
    /// zero-events path.
    pub fn on_idle(mut self, callback: IdleFn) -> Self {
        self.on_idle = Some(callback);
        self
    }

    /// Diagnostic label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of installed items, in any phase.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Install an item. Fails if its id is already present.
    pub fn add(&mut self, item: PendingItem<K, T>) -> Result<(), Error> {
        if self.pending.contains_key(item.id()) {
            return Err(Error::DuplicateId(format!("{:?}", item.id())));
        }
        metrics::ITEMS_INSTALLED.increment();
        self.pending.insert(item.id().clone(), item);
        Ok(())
    }

    /// Install several items, stopping at the first duplicate id.
    pub fn add_all(
        &mut self,
        items: impl IntoIterator<Item = PendingItem<K, T>>,
    ) -> Result<(), Error> {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    /// Remove an item by id and hand it back. Fails if absent.
    pub fn remove(&mut self, id: &K) -> Result<PendingItem<K, T>, Error> {
        self.take(id).ok_or_else(|| Error::UnknownId(format!("{id:?}")))
    }

    fn take(&mut self, id: &K) -> Option<PendingItem<K, T>> {
        let item = self.pending.remove(id);
        if item.is_some() {
            metrics::ITEMS_INSTALLED.decrement();
        }
        item
    }

    /// Start-or-retry sweep. Sleeping items whose sleep interval has
    /// elapsed either start their next attempt or, with the budget
    /// exhausted, leave the set with a terminal error. Items still inside
    /// their sleep interval are skipped.
    pub fn send(&mut self) {
        let mut exhausted: Vec<K> = Vec::new();
        for item in self.pending.values_mut() {
            if !item.is_sleeping() || !item.is_timeout() {
                continue;
            }
            if item.tries() < item.policy().retries {
                // A task declining to build an attempt leaves the item
                // sleeping without consuming budget.
                item.next_attempt();
            } else {
                exhausted.push(item.id().clone());
            }
        }
        for id in exhausted {
            if let Some(item) = self.take(&id) {
                let retries = item.policy().retries;
                item.finish_error(FailReason::RetriesExhausted(retries));
            }
        }
    }

    /// Readiness wait over the descriptors of all pending items. The
    /// snapshot is taken after `send` completes so attempts started this
    /// cycle are polled too.
    pub fn wait(&mut self) -> WaitOutcome {
        self.waitresult.clear();
        let fds: Vec<BorrowedFd<'_>> = self.pending.values().filter_map(|i| i.pollable()).collect();
        match poll::wait(&fds, self.itertime) {
            Err(errno) => {
                metrics::POLL_FAILURES.increment();
                tracing::error!(set = %self.name, error = %errno, "readiness wait failed");
                WaitOutcome::Failed
            }
            Ok((0, _)) => {
                metrics::IDLE_TICKS.increment();
                if let Some(callback) = self.on_idle.as_mut() {
                    callback();
                }
                WaitOutcome::Idle
            }
            Ok((events, readiness)) => {
                self.waitresult = readiness;
                WaitOutcome::Ready(events)
            }
        }
    }

    /// Drain pass over pending items, consuming the last wait's snapshot.
    /// Readable items advance their exchange; exceptional ones close with
    /// a reset; quiet ones close once their attempt deadline passes.
    /// Closed items stay installed as sleeping and are retried by a later
    /// `send`.
    pub fn recv(&mut self) {
        let ready = mem::take(&mut self.waitresult);
        let mut finished: Vec<(K, Vec<T>)> = Vec::new();
        for item in self.pending.values_mut() {
            if !item.is_pending() {
                continue;
            }
            // Re-read the descriptor: a chunked advance may have swapped
            // the connection since the snapshot.
            let Some(fd) = item.raw_fd() else { continue };
            if ready.readable.contains(&fd) {
                match item.advance() {
                    Advanced::Finished(rows) => finished.push((item.id().clone(), rows)),
                    Advanced::Continuing => {}
                    Advanced::Failed => {
                        metrics::ATTEMPTS_RECV_ERROR.increment();
                        item.close(close_reason::RECV_ERROR);
                    }
                }
            } else if ready.errored.contains(&fd) {
                metrics::ATTEMPTS_RESET.increment();
                item.close(close_reason::RESET);
            } else if item.is_timeout() {
                metrics::ATTEMPTS_TIMEOUT.increment();
                item.close(close_reason::TIMEOUT);
            }
        }
        for (id, rows) in finished {
            if let Some(item) = self.take(&id) {
                item.finish_ok(rows);
            }
        }
    }

    /// One scheduling cycle: `send`, `wait`, then `recv` unless the wait
    /// was idle. Returns whether the `work` loop should continue.
    pub fn iter(&mut self) -> bool {
        self.send();
        match self.wait() {
            WaitOutcome::Failed => false,
            WaitOutcome::Idle => true,
            WaitOutcome::Ready(_) => {
                self.recv();
                true
            }
        }
    }

    /// Deadline-expiry drain: every remaining non-done item is removed,
    /// closed, and delivered a timeout error. No item is left pending.
    pub fn finish(&mut self) {
        let ids: Vec<K> = self.pending.keys().cloned().collect();
        for id in ids {
            let Some(mut item) = self.take(&id) else { continue };
            if item.is_done() {
                continue;
            }
            if item.is_pending() {
                metrics::ATTEMPTS_TIMEOUT.increment();
            }
            item.close(close_reason::TIMEOUT);
            item.finish_error(FailReason::Timeout);
        }
    }

    /// Drive the set to completion or deadline. Individual item failures
    /// never propagate; each surfaces through its own task callbacks.
    pub fn work(&mut self) {
        let start = Instant::now();
        while !self.pending.is_empty() && start.elapsed() <= self.maxtime {
            if !self.iter() {
                break;
            }
        }
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::connection::Exchange;

    #[derive(Default)]
    struct Log {
        oks: Vec<Vec<&'static str>>,
        errors: Vec<FailReason>,
        tries_seen: Vec<u32>,
    }

    /// Task that never starts an attempt and records everything.
    struct Recorder {
        log: Rc<RefCell<Log>>,
    }

    impl crate::Task<u32, &'static str> for Recorder {
        fn on_retry(&mut self, _id: &u32, tries: u32) -> Option<Exchange<&'static str>> {
            self.log.borrow_mut().tries_seen.push(tries);
            None
        }
        fn on_ok(&mut self, _id: &u32, rows: Vec<&'static str>) {
            self.log.borrow_mut().oks.push(rows);
        }
        fn on_error(&mut self, _id: &u32, reason: FailReason) {
            self.log.borrow_mut().errors.push(reason);
        }
    }

    fn quick_config() -> SetConfig {
        SetConfig {
            name: "test".into(),
            maxtime: Duration::from_millis(80),
            itertime: Duration::from_millis(10),
        }
    }

    fn recorder_item(id: u32, log: &Rc<RefCell<Log>>) -> PendingItem<u32, &'static str> {
        let policy = RetryPolicy {
            retry_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        PendingItem::new(id, policy, Box::new(Recorder { log: Rc::clone(log) }))
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut set = PendingSet::new(quick_config()).unwrap();
        set.add(recorder_item(1, &log)).unwrap();
        assert!(matches!(
            set.add(recorder_item(1, &log)),
            Err(Error::DuplicateId(_))
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_unknown_id_fails() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut set: PendingSet<u32, &'static str> = PendingSet::new(quick_config()).unwrap();
        assert!(matches!(set.remove(&9), Err(Error::UnknownId(_))));
        drop(log);
    }

    #[test]
    fn remove_after_add_is_a_noop_on_contents() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut set = PendingSet::new(quick_config()).unwrap();
        set.add(recorder_item(3, &log)).unwrap();
        let item = set.remove(&3).unwrap();
        assert!(set.is_empty());
        assert!(item.is_sleeping());
        drop(item);
        // No callbacks fired along the way.
        assert!(log.borrow().oks.is_empty());
        assert!(log.borrow().errors.is_empty());
    }

    #[test]
    fn empty_set_work_returns_immediately() {
        let mut set: PendingSet<u32, &'static str> = PendingSet::new(quick_config()).unwrap();
        let start = Instant::now();
        set.work();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn zero_maxtime_drains_everything_via_finish() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut set = PendingSet::new(SetConfig {
            maxtime: Duration::ZERO,
            ..quick_config()
        })
        .unwrap();
        set.add(recorder_item(1, &log)).unwrap();
        set.add(recorder_item(2, &log)).unwrap();
        set.work();

        assert!(set.is_empty());
        let log = log.borrow();
        assert_eq!(log.errors, vec![FailReason::Timeout, FailReason::Timeout]);
        // Zero iterations ran, so no retry was ever requested.
        assert!(log.tries_seen.is_empty());
    }

    #[test]
    fn declined_retries_never_consume_budget() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut set = PendingSet::new(quick_config()).unwrap();
        set.add(recorder_item(1, &log)).unwrap();
        set.work();

        assert!(set.is_empty());
        let log = log.borrow();
        // The deadline expired before any attempt started, so the item
        // drained as a timeout, not as retry exhaustion.
        assert_eq!(log.errors, vec![FailReason::Timeout]);
        assert!(!log.tries_seen.is_empty());
        assert!(log.tries_seen.iter().all(|&tries| tries == 0));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = SetConfig {
            itertime: Duration::from_micros(10),
            ..SetConfig::default()
        };
        assert!(PendingSet::<u32, &'static str>::new(config).is_err());
    }
}
