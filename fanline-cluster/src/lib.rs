//! fanline-cluster — sharded scatter facade over the fanline core.
//!
//! Routes keys to shards and fans one pending request out per call,
//! driving them all through a single [`PendingSet`](fanline::PendingSet).
//! Command shaping stays with the caller: each [`ShardCall`] carries an
//! opaque `begin` callable that dials the shard and encodes the request,
//! so the facade never touches wire framing.
//!
//! # Example
//!
//! ```no_run
//! use fanline_cluster::{Cluster, ClusterConfig, ShardCall};
//!
//! # fn begin_fetch(_shard: usize) -> fanline_cluster::Begin<String> { unimplemented!() }
//! fn example() -> Result<(), fanline_cluster::Error> {
//!     let cluster = Cluster::new(ClusterConfig {
//!         shards: vec!["10.0.0.1:3301".into(), "10.0.0.2:3301".into()],
//!         ..ClusterConfig::default()
//!     })?;
//!
//!     let shard = cluster.route(b"user:1842");
//!     let replies = cluster.scatter(vec![ShardCall::query(shard, begin_fetch(shard))])?;
//!     for reply in replies {
//!         println!("shard {}: {:?}", reply.shard, reply.outcome);
//!     }
//!     Ok(())
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use fanline::{Exchange, FailReason, PendingItem, PendingSet, RetryPolicy, SetConfig, Task};

pub(crate) mod route;

pub mod error;
pub mod options;

/// Errors returned by the cluster facade.
pub use error::Error;
/// Options accepted by mutating calls.
pub use options::CallOptions;
/// Key to shard routing table.
pub use route::ShardMap;

/// Callable that dials a shard and builds the next protocol exchange.
/// Receives the number of attempts already started; returning `None`
/// leaves the call sleeping for this tick.
pub type Begin<T> = Box<dyn FnMut(u32) -> Option<Exchange<T>>>;

/// How a call's reply rows are treated.
#[derive(Debug, Clone, Copy)]
enum CallKind {
    /// Reply rows pass through untouched.
    Query,
    /// Mutating call; rows are suppressed unless `want_deleted_tuples`.
    Mutation(CallOptions),
}

/// One unit of scatter work against one shard.
pub struct ShardCall<T> {
    shard: usize,
    begin: Begin<T>,
    kind: CallKind,
}

impl<T> ShardCall<T> {
    /// A read call. Reply rows are handed back untouched.
    pub fn query(shard: usize, begin: Begin<T>) -> Self {
        ShardCall {
            shard,
            begin,
            kind: CallKind::Query,
        }
    }

    /// A mutating call. Reply rows are suppressed unless the options ask
    /// for the affected tuples.
    pub fn mutation(shard: usize, begin: Begin<T>, options: CallOptions) -> Self {
        ShardCall {
            shard,
            begin,
            kind: CallKind::Mutation(options),
        }
    }

    /// Target shard index.
    pub fn shard(&self) -> usize {
        self.shard
    }
}

/// Outcome of one shard call.
#[derive(Debug)]
pub struct ShardReply<T> {
    /// The shard the call targeted.
    pub shard: usize,
    /// Final rows on success, the terminal failure reason otherwise.
    pub outcome: Result<Vec<T>, FailReason>,
}

/// Configuration for a [`Cluster`].
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Shard identity strings (addresses), one backend each.
    pub shards: Vec<String>,
    /// Retry/timeout policy applied to every call.
    pub policy: RetryPolicy,
    /// Pending-set configuration used by `scatter`.
    pub set: SetConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            shards: Vec::new(),
            policy: RetryPolicy::default(),
            set: SetConfig {
                name: "cluster".into(),
                ..SetConfig::default()
            },
        }
    }
}

/// Sharded scatter driver.
///
/// Holds the routing table and the shared policy; each `scatter` builds
/// a fresh pending set, one item per call, and drives it to completion
/// or deadline. Mirrors the outer cycle of a sharded client: build the
/// per-shard requests, install them, work the set, collect.
pub struct Cluster {
    map: ShardMap,
    policy: RetryPolicy,
    set_config: SetConfig,
}

impl Cluster {
    /// Build a cluster from its configuration.
    pub fn new(config: ClusterConfig) -> Result<Self, Error> {
        if config.shards.is_empty() {
            return Err(Error::NoShards);
        }
        config.set.validate()?;
        let identities: Vec<&str> = config.shards.iter().map(String::as_str).collect();
        Ok(Cluster {
            map: ShardMap::build(&identities),
            policy: config.policy,
            set_config: config.set,
        })
    }

    /// Route a key to its shard index.
    pub fn route(&self, key: &[u8]) -> usize {
        self.map.route(key)
    }

    /// Number of configured shards.
    pub fn shard_count(&self) -> usize {
        self.map.shard_count()
    }

    /// Identity string of one shard.
    pub fn shard(&self, index: usize) -> &str {
        self.map.shard(index)
    }

    /// Fan the calls out and drive them to completion or deadline.
    ///
    /// Every call produces exactly one reply; replies come back in call
    /// order. Individual failures never abort the batch, they surface as
    /// `Err` outcomes in the matching reply.
    pub fn scatter<T: 'static>(&self, calls: Vec<ShardCall<T>>) -> Result<Vec<ShardReply<T>>, Error> {
        let count = self.map.shard_count();
        for call in &calls {
            if call.shard >= count {
                return Err(Error::ShardOutOfRange {
                    shard: call.shard,
                    count,
                });
            }
        }

        let total = calls.len();
        let mut set: PendingSet<usize, T> = PendingSet::new(self.set_config.clone())?;
        let sink: Sink<T> = Rc::new(RefCell::new(Vec::with_capacity(total)));
        for (seq, call) in calls.into_iter().enumerate() {
            let task = CollectTask {
                shard: call.shard,
                seq,
                begin: call.begin,
                kind: call.kind,
                sink: Rc::clone(&sink),
            };
            set.add(PendingItem::new(seq, self.policy, Box::new(task)))?;
        }

        tracing::debug!(calls = total, "scatter started");
        set.work();

        let mut tagged = sink.take();
        debug_assert_eq!(tagged.len(), total, "every call reports exactly once");
        tagged.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(tagged.into_iter().map(|(_, reply)| reply).collect())
    }
}

type Sink<T> = Rc<RefCell<Vec<(usize, ShardReply<T>)>>>;

/// Task funneling one call's terminal outcome into the shared sink.
struct CollectTask<T> {
    shard: usize,
    seq: usize,
    begin: Begin<T>,
    kind: CallKind,
    sink: Sink<T>,
}

impl<T: 'static> CollectTask<T> {
    /// Apply the call kind to a freshly built exchange: mutations without
    /// `want_deleted_tuples` get their reply rows suppressed.
    fn shape(&self, mut exchange: Exchange<T>) -> Exchange<T> {
        let CallKind::Mutation(options) = self.kind else {
            return exchange;
        };
        if options.want_deleted_tuples {
            return exchange;
        }
        let previous = exchange.postprocess.take();
        exchange.postprocess = Some(Box::new(move |rows| {
            let rows = match previous {
                Some(postprocess) => postprocess(rows),
                None => rows,
            };
            drop(rows);
            Vec::new()
        }));
        exchange
    }
}

impl<T: 'static> Task<usize, T> for CollectTask<T> {
    fn on_retry(&mut self, _id: &usize, tries: u32) -> Option<Exchange<T>> {
        let exchange = (self.begin)(tries)?;
        Some(self.shape(exchange))
    }

    fn on_ok(&mut self, _id: &usize, rows: Vec<T>) {
        self.sink.borrow_mut().push((
            self.seq,
            ShardReply {
                shard: self.shard,
                outcome: Ok(rows),
            },
        ));
    }

    fn on_error(&mut self, _id: &usize, reason: FailReason) {
        self.sink.borrow_mut().push((
            self.seq,
            ShardReply {
                shard: self.shard,
                outcome: Err(reason),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_config(shards: Vec<String>) -> ClusterConfig {
        ClusterConfig {
            shards,
            policy: RetryPolicy {
                retry_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            set: SetConfig {
                name: "cluster-test".into(),
                maxtime: Duration::from_millis(60),
                itertime: Duration::from_millis(10),
            },
        }
    }

    #[test]
    fn empty_shard_list_is_rejected() {
        assert!(matches!(
            Cluster::new(ClusterConfig::default()),
            Err(Error::NoShards)
        ));
    }

    #[test]
    fn out_of_range_shard_is_rejected() {
        let cluster = Cluster::new(test_config(vec!["s0:3301".into()])).unwrap();
        let call: ShardCall<String> = ShardCall::query(3, Box::new(|_| None));
        assert!(matches!(
            cluster.scatter(vec![call]),
            Err(Error::ShardOutOfRange { shard: 3, count: 1 })
        ));
    }

    #[test]
    fn undialable_calls_drain_as_timeouts_in_call_order() {
        let cluster =
            Cluster::new(test_config(vec!["s0:3301".into(), "s1:3301".into()])).unwrap();
        // Neither call can ever dial; both must still report, in order.
        let calls: Vec<ShardCall<String>> = vec![
            ShardCall::query(1, Box::new(|_| None)),
            ShardCall::query(0, Box::new(|_| None)),
        ];
        let replies = cluster.scatter(calls).unwrap();

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].shard, 1);
        assert_eq!(replies[1].shard, 0);
        for reply in &replies {
            assert_eq!(reply.outcome, Err(FailReason::Timeout));
        }
    }

    #[test]
    fn route_is_within_range() {
        let cluster = Cluster::new(test_config(vec![
            "s0:3301".into(),
            "s1:3301".into(),
            "s2:3301".into(),
        ]))
        .unwrap();
        for i in 0..100u32 {
            let key = format!("key-{i}");
            assert!(cluster.route(key.as_bytes()) < 3);
        }
    }
}
