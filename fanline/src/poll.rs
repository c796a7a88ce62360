//! One readiness sweep over a descriptor snapshot.
//!
//! Level-triggered `poll(2)` stands in for the classical three-set
//! select: read readiness maps to `POLLIN`, exceptional readiness to
//! `POLLERR`/`POLLHUP`/`POLLNVAL`/`POLLPRI`. The snapshot is rebuilt
//! from the items every cycle and never carried across cycles.

use std::collections::HashSet;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use rustix::event::{PollFd, PollFlags, poll};

/// Readiness snapshot from one wait.
#[derive(Debug, Default)]
pub(crate) struct Readiness {
    /// Descriptors with data to read.
    pub(crate) readable: HashSet<RawFd>,
    /// Descriptors reporting an exceptional condition.
    pub(crate) errored: HashSet<RawFd>,
}

impl Readiness {
    pub(crate) fn clear(&mut self) {
        self.readable.clear();
        self.errored.clear();
    }
}

/// Poll the given descriptors for read and exceptional readiness.
///
/// Blocks for at most `timeout` even when `fds` is empty: an all-sleeping
/// set still rate-limits its loop on the iteration timeout. Returns the
/// number of descriptors with events alongside the classified snapshot.
pub(crate) fn wait(
    fds: &[BorrowedFd<'_>],
    timeout: Duration,
) -> rustix::io::Result<(usize, Readiness)> {
    let mut pollfds: Vec<PollFd<'_>> = fds
        .iter()
        .map(|fd| PollFd::from_borrowed_fd(*fd, PollFlags::IN | PollFlags::PRI))
        .collect();

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let events = poll(&mut pollfds, timeout_ms)?;

    let mut readiness = Readiness::default();
    if events == 0 {
        return Ok((0, readiness));
    }

    let exceptional = PollFlags::ERR | PollFlags::HUP | PollFlags::NVAL | PollFlags::PRI;
    for (pollfd, fd) in pollfds.iter().zip(fds) {
        let revents = pollfd.revents();
        if revents.contains(PollFlags::IN) {
            readiness.readable.insert(fd.as_raw_fd());
        }
        if revents.intersects(exceptional) {
            readiness.errored.insert(fd.as_raw_fd());
        }
    }
    Ok((events, readiness))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    use super::*;

    #[test]
    fn written_end_reports_readable() {
        let (local, mut far) = UnixStream::pair().unwrap();
        far.write_all(b"x").unwrap();

        let fds = [local.as_fd()];
        let (events, readiness) = wait(&fds, Duration::from_millis(100)).unwrap();
        assert_eq!(events, 1);
        assert!(readiness.readable.contains(&local.as_raw_fd()));
        assert!(readiness.errored.is_empty());
    }

    #[test]
    fn quiet_end_times_out() {
        let (local, _far) = UnixStream::pair().unwrap();

        let start = Instant::now();
        let fds = [local.as_fd()];
        let (events, readiness) = wait(&fds, Duration::from_millis(30)).unwrap();
        assert_eq!(events, 0);
        assert!(readiness.readable.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn empty_snapshot_still_honors_timeout() {
        let start = Instant::now();
        let (events, _) = wait(&[], Duration::from_millis(30)).unwrap();
        assert_eq!(events, 0);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn dropped_peer_shows_up_in_the_snapshot() {
        let (local, far) = UnixStream::pair().unwrap();
        drop(far);

        let fds = [local.as_fd()];
        let (events, readiness) = wait(&fds, Duration::from_millis(100)).unwrap();
        assert_eq!(events, 1);
        // EOF surfaces as readable (possibly with HUP alongside); the
        // scheduler checks the readable set first either way.
        assert!(
            readiness.readable.contains(&local.as_raw_fd())
                || readiness.errored.contains(&local.as_raw_fd())
        );
    }
}
