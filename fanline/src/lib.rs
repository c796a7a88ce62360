//! fanline — pending-request coordination for sharded key/value clients.
//!
//! fanline drives many independent, single-connection request flows in
//! parallel, multiplexing their socket readiness through one poll loop.
//! Each request is a small retry/timeout state machine (sleeping,
//! pending, done); a [`PendingSet`] services all outstanding work evenly
//! within an overall deadline, and every item surfaces exactly one
//! terminal callback.
//!
//! The library owns coordination only. Connections, wire framing, and
//! command shaping arrive through the [`Connection`] capability and the
//! [`Exchange`] continuation descriptor, so any caller that can produce
//! socket-backed exchanges can use it.
//!
//! # Quick start
//!
//! ```no_run
//! use std::io::Read;
//! use std::net::{Shutdown, TcpStream};
//! use std::os::fd::{AsFd, BorrowedFd};
//!
//! use fanline::{
//!     Connection, Exchange, FailReason, PendingItem, PendingSet, RetryPolicy, SetConfig, Step,
//!     StepError, Task,
//! };
//!
//! struct Sock(TcpStream);
//!
//! impl AsFd for Sock {
//!     fn as_fd(&self) -> BorrowedFd<'_> {
//!         self.0.as_fd()
//!     }
//! }
//!
//! impl Connection for Sock {
//!     fn close(&mut self, _reason: &str) {
//!         let _ = self.0.shutdown(Shutdown::Both);
//!     }
//! }
//!
//! struct Fetch;
//!
//! impl Task<u32, String> for Fetch {
//!     fn on_retry(&mut self, _id: &u32, _tries: u32) -> Option<Exchange<String>> {
//!         let stream = TcpStream::connect("127.0.0.1:3301").ok()?;
//!         stream.set_nonblocking(true).ok()?;
//!         let mut reader = stream.try_clone().ok()?;
//!         Some(Exchange::new(
//!             Box::new(Sock(stream)),
//!             Box::new(move || -> Result<Step<String>, StepError> {
//!                 let mut buf = [0u8; 4096];
//!                 let n = reader.read(&mut buf)?;
//!                 Ok(Step::Done(vec![String::from_utf8_lossy(&buf[..n]).into_owned()]))
//!             }),
//!         ))
//!     }
//!
//!     fn on_ok(&mut self, id: &u32, rows: Vec<String>) {
//!         println!("shard {id}: {rows:?}");
//!     }
//!
//!     fn on_error(&mut self, id: &u32, reason: FailReason) {
//!         eprintln!("shard {id}: {reason}");
//!     }
//! }
//!
//! fn main() -> Result<(), fanline::Error> {
//!     let mut set = PendingSet::new(SetConfig::default())?;
//!     set.add(PendingItem::new(1, RetryPolicy::default(), Box::new(Fetch)))?;
//!     set.work();
//!     Ok(())
//! }
//! ```

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod connection;
pub(crate) mod item;
pub(crate) mod metrics;
pub(crate) mod poll;
pub(crate) mod set;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod error;

// ── Re-exports: capability contract ─────────────────────────────────────

/// Advance-closure type for one exchange.
pub use connection::Advance;
/// Byte-level handle to one server: pollable descriptor plus close.
pub use connection::Connection;
/// Continuation descriptor for one attempt.
pub use connection::Exchange;
/// Final-row transformer type.
pub use connection::Postprocess;
/// Outcome of one advance step.
pub use connection::Step;
/// Close-reason strings handed to [`Connection::close`].
pub use connection::close_reason;

// ── Re-exports: scheduler ───────────────────────────────────────────────

/// Retry/timeout policy for one item.
pub use config::RetryPolicy;
/// Configuration for a [`PendingSet`].
pub use config::SetConfig;
/// Scheduler API errors.
pub use error::Error;
/// Terminal failure reason delivered to `on_error`.
pub use error::FailReason;
/// Recoverable failure raised by an exchange step.
pub use error::StepError;
/// One logical request against one shard.
pub use item::PendingItem;
/// Per-request-kind callback capability.
pub use item::Task;
/// Idle-callback type.
pub use set::IdleFn;
/// Keyed collection of items driven as a group.
pub use set::PendingSet;
/// Outcome of one readiness wait.
pub use set::WaitOutcome;
