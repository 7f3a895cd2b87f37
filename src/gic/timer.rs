// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared counter and per-VPE compare timer engine of the GIC.

use log::debug;

use crate::gic::registers::*;
use crate::gic::Gic;

/// 10 ns period for 100 MHz frequency.
pub(crate) const TIMER_PERIOD: u64 = 10;

impl Gic {
    pub(crate) fn now_ns(&self) -> u64 {
        self.clock.lock().unwrap().now_ns()
    }

    fn ticks(now_ns: u64) -> u32 {
        (now_ns / TIMER_PERIOD) as u32
    }

    /// Current value of the shared counter.
    ///
    /// While the counter runs, any VPE deadline that has already passed is
    /// expired inline first, so a guest never observes `counter >= compare`
    /// without the matching interrupt state.
    pub(crate) fn get_count(&mut self) -> u32 {
        if self.config & GIC_SH_CONFIG_COUNTSTOP != 0 {
            return self.counter_base;
        }
        let now = self.now_ns();
        for vpe in 0..self.num_vpe {
            if matches!(self.vpes[vpe].timer_deadline, Some(deadline) if deadline <= now) {
                self.timer_expire(vpe);
            }
        }
        self.counter_base.wrapping_add(Self::ticks(now))
    }

    /// Recomputes VPE `vpe`'s deadline from its compare register and arms it.
    ///
    /// The wait is a wrapping 32-bit tick count: a compare value "behind"
    /// the counter schedules the interrupt for the next counter wrap.
    fn timer_update(&mut self, vpe: usize) -> u32 {
        let now = self.now_ns();
        let wait = self.vpes[vpe]
            .compare_lo
            .wrapping_sub(self.counter_base)
            .wrapping_sub(Self::ticks(now));
        let next = now + u64::from(wait) * TIMER_PERIOD;
        self.vpes[vpe].timer_deadline = Some(next);
        self.clock.lock().unwrap().arm(vpe, next);
        debug!("gic: vpe {} timer armed for {} ns (wait {:#x})", vpe, next, wait);
        wait
    }

    fn timer_expire(&mut self, vpe: usize) {
        self.timer_update(vpe);
        self.vpes[vpe].pend |= GIC_VPE_MASK_CMP;

        let vp = &self.vpes[vpe];
        if vp.pend & vp.mask & GIC_VPE_MASK_CMP == 0 {
            debug!("gic: vpe {} compare interrupt masked off", vpe);
            return;
        }
        if vp.compare_map & GIC_MAP_VALID == 0 {
            debug!("gic: vpe {} compare map not valid", vpe);
            return;
        }
        let pin = vp.compare_map & GIC_MAP_PIN_FIELD;
        self.vpes[vpe].timer_pin_raised = true;
        self.set_cpu_pin(vpe, pin, true);
    }

    /// Expiry callback from the host timer service for VPE `vpe_index`.
    ///
    /// Stale callbacks, from a deadline that was cancelled or from a counter
    /// that has since been stopped, are ignored.
    pub fn timer_expired(&mut self, vpe_index: usize) {
        if vpe_index >= self.num_vpe {
            return;
        }
        if self.config & GIC_SH_CONFIG_COUNTSTOP != 0
            || self.vpes[vpe_index].timer_deadline.is_none()
        {
            return;
        }
        // Bias the counter by one tick around the expiry so the reschedule
        // lands on the next wrap instead of re-firing at the same instant.
        self.counter_base = self.counter_base.wrapping_add(1);
        self.timer_expire(vpe_index);
        self.counter_base = self.counter_base.wrapping_sub(1);
    }

    /// Stores a new counter value. While the counter runs this rebases it so
    /// the next read observes `count`, and pushes every VPE deadline out
    /// accordingly.
    pub(crate) fn store_count(&mut self, count: u32) {
        if self.config & GIC_SH_CONFIG_COUNTSTOP != 0 {
            self.counter_base = count;
        } else {
            self.counter_base = count.wrapping_sub(Self::ticks(self.now_ns()));
            for vpe in 0..self.num_vpe {
                self.timer_update(vpe);
            }
        }
    }

    /// Stores VPE `vpe`'s compare register, acknowledging the compare
    /// interrupt.
    pub(crate) fn store_compare(&mut self, vpe: usize, compare: u32) {
        self.vpes[vpe].compare_lo = compare;
        let wait = self.timer_update(vpe);
        debug!("gic: vpe {} compare set to {:#x}, next interrupt in {:#x} ticks", vpe, compare, wait);

        self.vpes[vpe].pend &= !GIC_VPE_MASK_CMP;
        let vp = &self.vpes[vpe];
        if vp.compare_map & GIC_MAP_VALID != 0 && vp.timer_pin_raised {
            let pin = vp.compare_map & GIC_MAP_PIN_FIELD;
            self.vpes[vpe].timer_pin_raised = false;
            // A peer source presently asserted on the same pin keeps it high.
            let level = self.ored_level(vpe, pin);
            self.set_cpu_pin(vpe, pin, level);
        }
    }

    pub(crate) fn start_count(&mut self) {
        self.store_count(self.counter_base);
    }

    pub(crate) fn stop_count(&mut self) {
        self.counter_base = self.counter_base.wrapping_add(Self::ticks(self.now_ns()));
        let mut clock = self.clock.lock().unwrap();
        for vpe in 0..self.num_vpe {
            self.vpes[vpe].timer_deadline = None;
            clock.cancel(vpe);
        }
    }
}
