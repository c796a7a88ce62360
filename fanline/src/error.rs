use std::io;

use thiserror::Error;

/// Errors returned by the fanline scheduler API.
#[derive(Debug, Error)]
pub enum Error {
    /// An item with the same id is already installed in the set.
    #[error("duplicate item id: {0}")]
    DuplicateId(String),
    /// No item with the given id is installed in the set.
    #[error("unknown item id: {0}")]
    UnknownId(String),
    /// Configuration value out of range.
    #[error("config: {0}")]
    Config(String),
}

/// Terminal failure reason delivered to [`Task::on_error`](crate::Task::on_error).
///
/// Soft failures (a failed step, a reset, a per-attempt timeout) close the
/// attempt back to sleeping and are only reported here once the retry
/// budget is exhausted or the set-wide deadline expires.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The retry budget ran out while the item was still sleeping.
    #[error("no success after {0} retries")]
    RetriesExhausted(u32),
    /// The set-wide deadline expired with the item not done.
    #[error("timeout")]
    Timeout,
    /// The last attempt ended with a recoverable step failure.
    #[error("error while receiving")]
    Recv,
    /// The descriptor reported exceptional readiness.
    #[error("connection reset")]
    Reset,
}

/// Recoverable failure raised by an exchange step.
///
/// Returning this from [`Exchange::advance`](crate::Exchange) closes the
/// connection and returns the item to sleeping; whether it is retried is
/// decided by the scheduler from the item's retry budget.
#[derive(Debug, Error)]
pub enum StepError {
    /// I/O failure while advancing the exchange.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The peer sent something the decoder could not accept.
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_reason_display_strings() {
        assert_eq!(
            FailReason::RetriesExhausted(2).to_string(),
            "no success after 2 retries"
        );
        assert_eq!(FailReason::Timeout.to_string(), "timeout");
        assert_eq!(FailReason::Recv.to_string(), "error while receiving");
        assert_eq!(FailReason::Reset.to_string(), "connection reset");
    }
}
