// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-CPU R4K count/compare timer.
//!
//! Each CPU carries a free-running 32-bit count register and a compare
//! register that raises one of the CPU's hardware interrupt pins on match.
//! The CPU emulation forwards its coprocessor-0 Count/Compare accesses here;
//! the timer only talks back through the CPU's interrupt pins.

use std::sync::Arc;
use std::sync::Mutex;

use log::debug;

use crate::clock::TimerService;
use crate::CpuPins;

/// 10 ns period for 100 MHz frequency.
const TIMER_PERIOD: u64 = 10;

/// Count/compare timer of one CPU.
pub struct R4kTimer {
    cpu_index: usize,
    /// Hardware interrupt pin asserted on compare match, the IntCtl.IPTI
    /// selection of the CPU.
    timer_pin: usize,
    count_base: u32,
    compare: u32,
    /// Cleared while the count register is frozen (the Cause.DC state of
    /// the CPU).
    running: bool,
    deadline: Option<u64>,
    clock: Arc<Mutex<dyn TimerService>>,
    pins: Arc<Mutex<dyn CpuPins>>,
}

impl R4kTimer {
    /// Constructs the timer for CPU `cpu_index`, asserting `timer_pin` on
    /// compare match. The timer starts running with a compare of zero, so
    /// the first interrupt is a full counter wrap away.
    pub fn new(
        cpu_index: usize,
        timer_pin: usize,
        clock: Arc<Mutex<dyn TimerService>>,
        pins: Arc<Mutex<dyn CpuPins>>,
    ) -> R4kTimer {
        let mut timer = R4kTimer {
            cpu_index,
            timer_pin,
            count_base: 0,
            compare: 0,
            running: true,
            deadline: None,
            clock,
            pins,
        };
        timer.store_count(1);
        timer
    }

    fn now_ns(&self) -> u64 {
        self.clock.lock().unwrap().now_ns()
    }

    fn ticks(now_ns: u64) -> u32 {
        (now_ns / TIMER_PERIOD) as u32
    }

    /// Recomputes the deadline from the compare register and arms it. The
    /// wait is a wrapping 32-bit tick count.
    fn timer_update(&mut self) {
        let now = self.now_ns();
        let wait = self
            .compare
            .wrapping_sub(self.count_base)
            .wrapping_sub(Self::ticks(now));
        let next = now + u64::from(wait) * TIMER_PERIOD;
        self.deadline = Some(next);
        self.clock.lock().unwrap().arm(self.cpu_index, next);
        debug!("r4k: cpu {} timer armed for {} ns (wait {:#x})", self.cpu_index, next, wait);
    }

    fn timer_raise(&mut self) {
        self.timer_update();
        self.pins
            .lock()
            .unwrap()
            .set_pin(self.cpu_index, self.timer_pin, true);
    }

    /// Expiry callback from the host timer service.
    pub fn timer_expired(&mut self) {
        if !self.running || self.deadline.is_none() {
            return;
        }
        // Bias the count by one tick around the expiry so the reschedule
        // lands on the next wrap instead of re-firing at the same instant.
        self.count_base = self.count_base.wrapping_add(1);
        self.timer_raise();
        self.count_base = self.count_base.wrapping_sub(1);
    }

    /// Current value of the count register, expiring a passed deadline
    /// inline first so a guest never observes `count >= compare` without
    /// the timer interrupt having been presented.
    pub fn get_count(&mut self) -> u32 {
        if !self.running {
            return self.count_base;
        }
        let now = self.now_ns();
        if matches!(self.deadline, Some(deadline) if deadline <= now) {
            self.timer_raise();
        }
        self.count_base.wrapping_add(Self::ticks(now))
    }

    /// Stores a new count value. While running this rebases the count so
    /// the next read observes `count`, and pushes the deadline out
    /// accordingly.
    pub fn store_count(&mut self, count: u32) {
        if !self.running {
            self.count_base = count;
        } else {
            self.count_base = count.wrapping_sub(Self::ticks(self.now_ns()));
            self.timer_update();
        }
    }

    /// Stores the compare register, acknowledging and lowering the timer
    /// interrupt.
    pub fn store_compare(&mut self, value: u32) {
        self.compare = value;
        if self.running {
            self.timer_update();
        }
        self.pins
            .lock()
            .unwrap()
            .set_pin(self.cpu_index, self.timer_pin, false);
    }

    /// Current value of the compare register.
    pub fn compare(&self) -> u32 {
        self.compare
    }

    /// Unfreezes the count register.
    pub fn start_count(&mut self) {
        self.running = true;
        self.store_count(self.count_base);
    }

    /// Freezes the count register at its current value. The armed deadline
    /// is left in place; its callback is ignored until the count restarts.
    pub fn stop_count(&mut self) {
        if !self.running {
            return;
        }
        self.count_base = self.count_base.wrapping_add(Self::ticks(self.now_ns()));
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::FakeClock;

    struct TestPins {
        levels: Vec<Vec<bool>>,
    }

    impl TestPins {
        fn new(num_cpu: usize) -> TestPins {
            TestPins {
                levels: vec![vec![false; 16]; num_cpu],
            }
        }
    }

    impl CpuPins for TestPins {
        fn set_pin(&mut self, cpu_index: usize, pin: usize, level: bool) {
            self.levels[cpu_index][pin] = level;
        }
    }

    fn get_timer(cpu_index: usize) -> (R4kTimer, Arc<Mutex<FakeClock>>, Arc<Mutex<TestPins>>) {
        let clock = Arc::new(Mutex::new(FakeClock::new()));
        let pins = Arc::new(Mutex::new(TestPins::new(cpu_index + 1)));
        let timer = R4kTimer::new(cpu_index, 7, clock.clone(), pins.clone());
        (timer, clock, pins)
    }

    #[test]
    fn count_tracks_virtual_time() {
        let (mut timer, clock, _pins) = get_timer(0);
        assert_eq!(timer.get_count(), 1);
        clock.lock().unwrap().add_ns(1_000);
        assert_eq!(timer.get_count(), 101);
    }

    #[test]
    fn compare_write_schedules_and_fires() {
        let (mut timer, clock, pins) = get_timer(0);
        timer.store_compare(500);
        // 499 ticks away from the count of 1.
        assert_eq!(clock.lock().unwrap().next_deadline(), Some((0, 4_990)));

        clock.lock().unwrap().add_ns(4_990);
        assert_eq!(timer.get_count(), 500);
        assert!(pins.lock().unwrap().levels[0][7]);
    }

    #[test]
    fn host_callback_raises_the_pin() {
        let (mut timer, clock, pins) = get_timer(1);
        timer.store_compare(500);
        clock.lock().unwrap().add_ns(5_000);
        timer.timer_expired();
        assert!(pins.lock().unwrap().levels[1][7]);
    }

    #[test]
    fn compare_write_acknowledges_the_interrupt() {
        let (mut timer, clock, pins) = get_timer(0);
        timer.store_compare(500);
        clock.lock().unwrap().add_ns(5_000);
        timer.get_count();
        assert!(pins.lock().unwrap().levels[0][7]);

        timer.store_compare(100_000);
        assert!(!pins.lock().unwrap().levels[0][7]);
        assert_eq!(timer.compare(), 100_000);
    }

    #[test]
    fn stop_count_freezes_the_count() {
        let (mut timer, clock, pins) = get_timer(0);
        clock.lock().unwrap().add_ns(1_000);
        timer.stop_count();
        let frozen = timer.get_count();
        clock.lock().unwrap().add_ns(9_000);
        assert_eq!(timer.get_count(), frozen);

        // A callback landing while frozen must not fire.
        timer.timer_expired();
        assert!(!pins.lock().unwrap().levels[0][7]);

        timer.start_count();
        clock.lock().unwrap().add_ns(1_000);
        assert_eq!(timer.get_count(), frozen + 100);
    }

    #[test]
    fn count_write_rebases_while_running() {
        let (mut timer, clock, _pins) = get_timer(0);
        clock.lock().unwrap().add_ns(500);
        timer.store_count(1_000_000);
        assert_eq!(timer.get_count(), 1_000_000);
        clock.lock().unwrap().add_ns(100);
        assert_eq!(timer.get_count(), 1_000_010);
    }
}
