// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Virtual-time services for the timer-bearing devices.

use std::time::Instant;

/// Monotonic virtual time plus one programmable deadline per timer slot.
///
/// A device holds its service handle exclusively; slot numbers only need to
/// be unique within one handle. Arming a slot replaces its previous
/// deadline. A cancelled slot must deliver no further expiry callbacks.
pub trait TimerService: Send {
    /// Nanoseconds of virtual time elapsed since the machine powered on.
    fn now_ns(&self) -> u64;
    /// Requests an expiry callback for `slot` at absolute time `deadline_ns`.
    fn arm(&mut self, slot: usize, deadline_ns: u64);
    /// Cancels the pending deadline of `slot`, if any.
    fn cancel(&mut self, slot: usize);
}

#[derive(Default)]
struct Deadlines(Vec<Option<u64>>);

impl Deadlines {
    fn arm(&mut self, slot: usize, deadline_ns: u64) {
        if slot >= self.0.len() {
            self.0.resize(slot + 1, None);
        }
        self.0[slot] = Some(deadline_ns);
    }

    fn cancel(&mut self, slot: usize) {
        if let Some(deadline) = self.0.get_mut(slot) {
            *deadline = None;
        }
    }

    fn next(&self) -> Option<(usize, u64)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(slot, deadline)| deadline.map(|d| (slot, d)))
            .min_by_key(|&(_, deadline)| deadline)
    }
}

/// Virtual time backed by the host monotonic clock.
///
/// The embedder drives expiry itself: after handing control back from a
/// device it consults `next_deadline` to learn when the device that owns
/// this handle wants its next callback.
pub struct Clock {
    origin: Instant,
    deadlines: Deadlines,
}

impl Clock {
    pub fn new() -> Clock {
        Clock {
            origin: Instant::now(),
            deadlines: Deadlines::default(),
        }
    }

    /// Earliest armed `(slot, deadline_ns)`, if any slot is armed.
    pub fn next_deadline(&self) -> Option<(usize, u64)> {
        self.deadlines.next()
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new()
    }
}

impl TimerService for Clock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn arm(&mut self, slot: usize, deadline_ns: u64) {
        self.deadlines.arm(slot, deadline_ns);
    }

    fn cancel(&mut self, slot: usize) {
        self.deadlines.cancel(slot);
    }
}

/// A clock that only advances when asked to. Useful for tests.
#[derive(Default)]
pub struct FakeClock {
    now_ns: u64,
    deadlines: Deadlines,
}

impl FakeClock {
    pub fn new() -> FakeClock {
        FakeClock::default()
    }

    /// Advances the clock by `ns` nanoseconds.
    pub fn add_ns(&mut self, ns: u64) {
        self.now_ns += ns;
    }

    /// Earliest armed `(slot, deadline_ns)`, if any slot is armed.
    pub fn next_deadline(&self) -> Option<(usize, u64)> {
        self.deadlines.next()
    }
}

impl TimerService for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now_ns
    }

    fn arm(&mut self, slot: usize, deadline_ns: u64) {
        self.deadlines.arm(slot, deadline_ns);
    }

    fn cancel(&mut self, slot: usize) {
        self.deadlines.cancel(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_manually() {
        let mut clock = FakeClock::new();
        assert_eq!(clock.now_ns(), 0);
        clock.add_ns(100);
        clock.add_ns(25);
        assert_eq!(clock.now_ns(), 125);
    }

    #[test]
    fn deadlines_track_earliest_slot() {
        let mut clock = FakeClock::new();
        assert_eq!(clock.next_deadline(), None);
        clock.arm(1, 5_000);
        clock.arm(0, 7_000);
        assert_eq!(clock.next_deadline(), Some((1, 5_000)));
        clock.arm(1, 9_000);
        assert_eq!(clock.next_deadline(), Some((0, 7_000)));
        clock.cancel(0);
        assert_eq!(clock.next_deadline(), Some((1, 9_000)));
        clock.cancel(1);
        assert_eq!(clock.next_deadline(), None);
    }

    #[test]
    fn host_clock_is_monotonic() {
        let clock = Clock::new();
        let first = clock.now_ns();
        let second = clock.now_ns();
        assert!(second >= first);
    }
}
