//! The connection capability and the continuation descriptor.
//!
//! fanline never opens sockets itself. Callers hand it a [`Connection`]
//! (a pollable descriptor plus an idempotent close) bundled with an
//! advance closure that knows how to move the protocol one step forward.
//! Wire framing and command shaping stay on the caller's side of this
//! seam.

use std::os::fd::AsFd;

use crate::error::StepError;

/// Byte-level handle to one server.
///
/// The `AsFd` supertrait supplies the pollable descriptor; the scheduler
/// re-reads it every cycle because a chunked exchange may swap the
/// connection between legs.
pub trait Connection: AsFd {
    /// Synchronous shutdown. Idempotent: closing an already-closed
    /// connection must do nothing.
    fn close(&mut self, reason: &str);
}

/// Close-reason strings handed to [`Connection::close`].
pub mod close_reason {
    /// The advance closure reported a recoverable failure.
    pub const RECV_ERROR: &str = "error while receiving";
    /// The descriptor reported exceptional readiness.
    pub const RESET: &str = "connection reset";
    /// A per-attempt or set-wide deadline expired.
    pub const TIMEOUT: &str = "timeout";
}

/// Outcome of one advance step.
pub enum Step<T> {
    /// More data expected on a later readiness event. `Some` hands over a
    /// fresh connection for the next leg; the previous one is dropped.
    More(Option<Box<dyn Connection>>),
    /// Final reply rows. The exchange is complete.
    Done(Vec<T>),
}

/// Closure advancing one protocol step.
///
/// Invoked only when the exchange's descriptor is readable. The closure
/// owns its read side (typically a clone of the socket behind the
/// [`Connection`]); returning an error is the recoverable-failure path
/// and sends the item back to sleeping.
pub type Advance<T> = Box<dyn FnMut() -> Result<Step<T>, StepError>>;

/// Transformer applied once to the final rows before `on_ok`.
pub type Postprocess<T> = Box<dyn FnOnce(Vec<T>) -> Vec<T>>;

/// Continuation descriptor for one attempt.
///
/// Built by [`Task::on_retry`](crate::Task::on_retry); owned by the item
/// while the attempt is in flight. The connection is released
/// deterministically on every exit path: success and failure both drop or
/// close it before the terminal callback can run.
pub struct Exchange<T> {
    /// The connection polled for readiness and closed on failure paths.
    pub connection: Box<dyn Connection>,
    /// Advances the exchange by one step.
    pub advance: Advance<T>,
    /// Optional transformer for the final rows.
    pub postprocess: Option<Postprocess<T>>,
}

impl<T> Exchange<T> {
    /// Bundle a connection with its advance closure.
    pub fn new(connection: Box<dyn Connection>, advance: Advance<T>) -> Self {
        Exchange {
            connection,
            advance,
            postprocess: None,
        }
    }

    /// Install a postprocess step for the final rows.
    pub fn with_postprocess(mut self, postprocess: Postprocess<T>) -> Self {
        self.postprocess = Some(postprocess);
        self
    }
}
