// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Block / try / timed acquisition of a named semaphore.
// A timed operation computes one deadline at entry and every wait it
// performs is measured against it, so the caller's duration is a total
// budget rather than a per-wait timeout.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Error, Result};
use crate::queue_name::ObjectKind;
use crate::semaphore::IpcSemaphore;

/// How a send or receive behaves when it cannot complete immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Suspend the calling thread until the operation can complete.
    Block,
    /// Fail with [`Error::WouldBlock`] instead of suspending.
    Try,
    /// Suspend for at most this long in total, then fail with
    /// [`Error::TimedOut`]. A zero duration behaves like [`WaitMode::Try`].
    Timeout(Duration),
}

impl WaitMode {
    /// Fix the mode for one operation, computing the deadline once.
    pub(crate) fn start(self) -> Wait {
        match self {
            WaitMode::Block => Wait::Block,
            WaitMode::Try => Wait::Try,
            WaitMode::Timeout(d) if d.is_zero() => Wait::Try,
            WaitMode::Timeout(d) => Wait::Until(Deadline::after(d)),
        }
    }
}

/// A [`WaitMode`] bound to a point in time.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wait {
    Block,
    Try,
    Until(Deadline),
}

/// Absolute end of a timed operation's budget.
///
/// Carries both a monotonic instant (for elapsed/remaining bookkeeping) and
/// the equivalent `CLOCK_REALTIME` timespec `sem_timedwait` expects.
#[derive(Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
    realtime: libc::timespec,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
        Self {
            started,
            // A century stands in for budgets too large to represent.
            at: started
                .checked_add(budget)
                .unwrap_or_else(|| started + Duration::from_secs(100 * 365 * 86_400)),
            realtime: add_to_timespec(now, budget),
        }
    }

    /// Time spent since the deadline was computed.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The deadline as an absolute `CLOCK_REALTIME` timestamp.
    pub fn realtime(&self) -> libc::timespec {
        self.realtime
    }
}

impl std::fmt::Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("elapsed", &self.elapsed())
            .field("remaining", &self.remaining())
            .finish()
    }
}

fn add_to_timespec(ts: libc::timespec, d: Duration) -> libc::timespec {
    const NANOS_PER_SEC: u64 = 1_000_000_000;
    let ns_total = ts.tv_nsec as u64 + d.subsec_nanos() as u64;
    let secs = (ts.tv_sec as u64)
        .saturating_add(d.as_secs())
        .saturating_add(ns_total / NANOS_PER_SEC)
        .min(libc::time_t::MAX as u64);
    let mut out: libc::timespec = unsafe { std::mem::zeroed() };
    out.tv_sec = secs as libc::time_t;
    out.tv_nsec = (ns_total % NANOS_PER_SEC) as libc::c_long;
    out
}

/// Adaptive backoff: busy spin, then CPU pause hint, then yield, then 1ms
/// sleeps. Drives the polled timed wait where `sem_timedwait` is missing.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// Acquire one unit of `sem` according to `wait`.
///
/// Returns `WouldBlock` when a try finds the semaphore at zero, `TimedOut`
/// when the deadline passes first, and `Os` for any other failure.
pub(crate) fn acquire(sem: &IpcSemaphore, kind: ObjectKind, wait: &Wait) -> Result<()> {
    let acquired = match wait {
        Wait::Block => sem.wait().map(|()| true),
        Wait::Try => sem.try_wait(),
        Wait::Until(deadline) => sem.wait_until(deadline),
    }
    .map_err(|source| Error::Os {
        op: "sem_wait",
        kind: Some(kind),
        source,
    })?;

    match (acquired, wait) {
        (true, _) => Ok(()),
        (false, Wait::Until(deadline)) => {
            trace!(%kind, elapsed = ?deadline.elapsed(), "timed wait expired");
            Err(Error::TimedOut)
        }
        (false, _) => {
            trace!(%kind, "try wait found no token");
            Err(Error::WouldBlock)
        }
    }
}
