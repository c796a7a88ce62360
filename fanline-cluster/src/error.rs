use thiserror::Error;

/// Errors returned by the cluster facade.
#[derive(Debug, Error)]
pub enum Error {
    /// Option key is not recognized. Only `want_deleted_tuples` exists.
    #[error("unknown option: {0}")]
    UnknownOption(String),
    /// Option value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidOption { key: String, value: String },
    /// The cluster was configured with an empty shard list.
    #[error("no shards configured")]
    NoShards,
    /// A call referenced a shard index outside the configured range.
    #[error("shard index {shard} out of range (cluster has {count})")]
    ShardOutOfRange { shard: usize, count: usize },
    /// Error bubbled up from the coordination core.
    #[error(transparent)]
    Core(#[from] fanline::Error),
}
