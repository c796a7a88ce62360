//! fanline scheduler metrics.
//!
//! Counters for attempt lifecycle, terminal outcomes, and scheduler
//! behavior. Registered globally via metriken.

use metriken::{Counter, Gauge, metric};

// ── Attempt lifecycle ────────────────────────────────────────────

#[metric(
    name = "fanline/attempts/started",
    description = "Attempts started (sleeping to pending)"
)]
pub static ATTEMPTS_STARTED: Counter = Counter::new();

#[metric(
    name = "fanline/attempts/recv_error",
    description = "Attempts closed after a recoverable step failure"
)]
pub static ATTEMPTS_RECV_ERROR: Counter = Counter::new();

#[metric(
    name = "fanline/attempts/reset",
    description = "Attempts closed after exceptional readiness"
)]
pub static ATTEMPTS_RESET: Counter = Counter::new();

#[metric(
    name = "fanline/attempts/timeout",
    description = "Attempts closed after a deadline expired"
)]
pub static ATTEMPTS_TIMEOUT: Counter = Counter::new();

// ── Terminal outcomes ────────────────────────────────────────────

#[metric(
    name = "fanline/items/ok",
    description = "Items finished with a success callback"
)]
pub static ITEMS_OK: Counter = Counter::new();

#[metric(
    name = "fanline/items/error",
    description = "Items finished with an error callback"
)]
pub static ITEMS_ERROR: Counter = Counter::new();

#[metric(
    name = "fanline/items/installed",
    description = "Items currently installed in pending sets"
)]
pub static ITEMS_INSTALLED: Gauge = Gauge::new();

// ── Scheduler ────────────────────────────────────────────────────

#[metric(
    name = "fanline/iter/idle",
    description = "Readiness waits that returned zero events"
)]
pub static IDLE_TICKS: Counter = Counter::new();

#[metric(
    name = "fanline/poll/failures",
    description = "Readiness primitive failures"
)]
pub static POLL_FAILURES: Counter = Counter::new();
