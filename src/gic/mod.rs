// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MIPS Global Interrupt Controller.
//!
//! The GIC distributes external interrupt sources across the hardware
//! interrupt pins of the platform's VPEs and carries the platform's
//! free-running 100 MHz counter with one compare register per VPE. Guest
//! software programs it through a single MMIO window split into a shared
//! section, a VPE-local section, and a VPE-other section that aliases
//! another VPE's local registers.
//!
//! The device is passive: everything happens inside an MMIO access, a call
//! to [`Gic::service_irq`], or a call to [`Gic::timer_expired`], all on the
//! emulator's single device thread.

pub mod registers;
mod timer;

use std::sync::Arc;
use std::sync::Mutex;

use log::debug;
use log::warn;
use remain::sorted;
use thiserror::Error;

use crate::bus::BusAccessInfo;
use crate::bus::BusDevice;
use crate::clock::TimerService;
use crate::gic::registers::*;
use crate::CpuPins;

/// Most VPEs the register interface can address.
pub const GIC_MAX_VPES: usize = 64;
/// Most interrupt sources the register interface can address.
pub const GIC_MAX_SOURCES: usize = 256;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GicError {
    #[error("a controller serves between 1 and 256 interrupt sources, not {0}")]
    InvalidSourceCount(usize),
    #[error("a controller serves between 1 and 64 VPEs, not {0}")]
    InvalidVpeCount(usize),
}

/// Per-source programming: polarity, trigger type, enable, the pending
/// latch, and the (pin, VPE) pair the source is steered to.
#[derive(Clone)]
struct InterruptSource {
    enabled: bool,
    pending: bool,
    polarity: bool,
    trigger_level: bool,
    // Reserved by the hardware interface; no register decodes it.
    #[allow(dead_code)]
    dual_edge: bool,
    map_pin: u32,
    map_vpe: Option<u32>,
}

impl Default for InterruptSource {
    fn default() -> InterruptSource {
        InterruptSource {
            enabled: false,
            pending: false,
            polarity: false,
            trigger_level: false,
            dual_edge: false,
            map_pin: GIC_MAP_PIN_RESET,
            map_vpe: Some(0),
        }
    }
}

#[derive(Clone, Default)]
struct VpeState {
    ctl: u32,
    pend: u32,
    mask: u32,
    wd_map: u32,
    compare_map: u32,
    timer_map: u32,
    other_addr: u32,
    compare_lo: u32,
    compare_hi: u32,
    /// Absolute virtual time of the armed compare deadline, if any.
    timer_deadline: Option<u64>,
    /// Whether the last compare edge sent to the CPU raised the pin, so a
    /// compare write can take it back down.
    timer_pin_raised: bool,
}

/// The interrupt controller device.
pub struct Gic {
    num_vpe: usize,
    num_sources: usize,
    config: u32,
    counter_base: u32,
    sources: Vec<InterruptSource>,
    vpes: Vec<VpeState>,
    clock: Arc<Mutex<dyn TimerService>>,
    pins: Arc<Mutex<dyn CpuPins>>,
}

/// Returns true if `offset` addresses a word of the bitmap bank starting at
/// `base`.
fn bitmap_bank(offset: u64, base: u64) -> bool {
    (base..base + GIC_BITMAP_BANK_LEN).contains(&offset) && (offset - base) % 4 == 0
}

/// Source index addressed by a map-to-pin table access, if `offset` is one.
fn map_pin_reg(offset: u64, num_sources: usize) -> Option<usize> {
    let end = GIC_SH_MAP_PIN_BASE + 4 * num_sources as u64;
    if !(GIC_SH_MAP_PIN_BASE..end).contains(&offset) || (offset - GIC_SH_MAP_PIN_BASE) % 4 != 0 {
        return None;
    }
    Some(((offset - GIC_SH_MAP_PIN_BASE) / 4) as usize)
}

/// Source index addressed by a map-to-VPE table access, if `offset` is one.
fn map_vpe_reg(offset: u64, num_sources: usize) -> Option<usize> {
    let end = GIC_SH_MAP_VPE_BASE + GIC_SH_MAP_VPE_STRIDE * num_sources as u64;
    if !(GIC_SH_MAP_VPE_BASE..end).contains(&offset)
        || (offset - GIC_SH_MAP_VPE_BASE) % GIC_SH_MAP_VPE_STRIDE != 0
    {
        return None;
    }
    Some(((offset - GIC_SH_MAP_VPE_BASE) / GIC_SH_MAP_VPE_STRIDE) as usize)
}

impl Gic {
    /// Constructs a controller serving `num_vpe` VPEs and `num_sources`
    /// interrupt sources (the hardware defaults are 1 and 256). `clock`
    /// supplies virtual time and per-VPE deadlines; `pins` receives the
    /// resulting CPU pin levels. The device expects exclusive use of both
    /// handles.
    pub fn new(
        num_vpe: usize,
        num_sources: usize,
        clock: Arc<Mutex<dyn TimerService>>,
        pins: Arc<Mutex<dyn CpuPins>>,
    ) -> Result<Gic, GicError> {
        if num_vpe == 0 || num_vpe > GIC_MAX_VPES {
            return Err(GicError::InvalidVpeCount(num_vpe));
        }
        if num_sources == 0 || num_sources > GIC_MAX_SOURCES {
            return Err(GicError::InvalidSourceCount(num_sources));
        }
        let mut gic = Gic {
            num_vpe,
            num_sources,
            config: 0,
            counter_base: 0,
            sources: vec![InterruptSource::default(); num_sources],
            vpes: vec![VpeState::default(); num_vpe],
            clock,
            pins,
        };
        gic.reset();
        Ok(gic)
    }

    /// Returns the controller to its power-on state: counter at zero and
    /// running, every source disabled and unmapped, all VPE state clear, no
    /// deadlines armed.
    pub fn reset(&mut self) {
        for source in &mut self.sources {
            *source = InterruptSource::default();
        }
        for vpe in &mut self.vpes {
            *vpe = VpeState::default();
        }
        let mut clock = self.clock.lock().unwrap();
        for vpe in 0..self.num_vpe {
            clock.cancel(vpe);
        }
        drop(clock);
        self.counter_base = 0;
        // The counter runs from reset.
        self.config = (GIC_SH_CONFIG_RESET | self.num_vpe as u32) & !GIC_SH_CONFIG_COUNTSTOP;
    }

    /// Presents interrupt source `source` at `level`.
    ///
    /// The pending latch is updated even for disabled sources, but only
    /// enabled sources drive CPU pins. A deassert recomputes the OR across
    /// the peer sources steered to the same (pin, VPE), so a still-pending
    /// peer keeps the pin high.
    pub fn service_irq(&mut self, source: usize, level: bool) {
        if source >= self.num_sources {
            warn!("{}: interrupt source {} out of range", self.debug_label(), source);
            return;
        }
        self.sources[source].pending = level;
        if !self.sources[source].enabled {
            return;
        }

        let pin = self.sources[source].map_pin & GIC_MAP_PIN_FIELD;
        let vpe = match self.sources[source].map_vpe {
            Some(v) if (v as usize) < self.num_vpe => v as usize,
            _ => return,
        };

        let level = level || self.ored_level(vpe, pin);
        self.set_cpu_pin(vpe, pin, level);
    }

    /// Composite level of `(vpe, pin)`: the OR across every enabled pending
    /// source steered there, plus the compare pending bit when the compare
    /// interrupt is unmasked and mapped to the same pin.
    fn ored_level(&self, vpe: usize, pin: u32) -> bool {
        if self.sources.iter().any(|s| {
            s.enabled
                && s.pending
                && s.map_pin & GIC_MAP_PIN_FIELD == pin
                && s.map_vpe == Some(vpe as u32)
        }) {
            return true;
        }
        let vp = &self.vpes[vpe];
        vp.compare_map & GIC_MAP_PIN_FIELD == pin
            && vp.mask & GIC_VPE_MASK_CMP != 0
            && vp.pend & GIC_VPE_MASK_CMP != 0
    }

    fn set_cpu_pin(&self, vpe: usize, pin: u32, level: bool) {
        self.pins
            .lock()
            .unwrap()
            .set_pin(vpe, pin as usize + GIC_CPU_PIN_OFFSET, level);
    }

    fn current_vpe(&self, id: usize) -> usize {
        if self.num_vpe > 1 {
            id
        } else {
            0
        }
    }

    fn read_source_bits(&self, bank_offset: u64, size: usize, field: fn(&InterruptSource) -> bool) -> u64 {
        let base = (bank_offset * 8) as usize;
        let mut ret = 0;
        for i in 0..size * 8 {
            if base + i >= self.num_sources {
                break;
            }
            if field(&self.sources[base + i]) {
                ret |= 1 << i;
            }
        }
        ret
    }

    fn write_source_bits(
        &mut self,
        bank_offset: u64,
        size: usize,
        data: u64,
        apply: fn(&mut InterruptSource, bool),
    ) {
        let base = (bank_offset * 8) as usize;
        for i in 0..size * 8 {
            if base + i >= self.num_sources {
                break;
            }
            apply(&mut self.sources[base + i], (data >> i) & 1 != 0);
        }
    }

    fn read_reg(&mut self, offset: u64, size: usize, vp_index: usize) -> u64 {
        match offset {
            GIC_SH_CONFIG => return u64::from(self.config),
            GIC_SH_CONFIG_HI | GIC_SH_COUNTER_HI => return 0,
            GIC_SH_COUNTER_LO => return u64::from(self.get_count()),
            _ => {}
        }

        if bitmap_bank(offset, GIC_SH_POL_BASE) {
            return self.read_source_bits(offset - GIC_SH_POL_BASE, size, |s| s.polarity);
        }
        if bitmap_bank(offset, GIC_SH_TRIG_BASE) {
            return self.read_source_bits(offset - GIC_SH_TRIG_BASE, size, |s| s.trigger_level);
        }
        if bitmap_bank(offset, GIC_SH_MASK_BASE) {
            return self.read_source_bits(offset - GIC_SH_MASK_BASE, size, |s| s.enabled);
        }
        if bitmap_bank(offset, GIC_SH_PEND_BASE) {
            return self.read_source_bits(offset - GIC_SH_PEND_BASE, size, |s| s.pending);
        }
        if let Some(source) = map_pin_reg(offset, self.num_sources) {
            return u64::from(self.sources[source].map_pin);
        }
        if let Some(source) = map_vpe_reg(offset, self.num_sources) {
            return match self.sources[source].map_vpe {
                Some(vpe) => 1u64 << vpe,
                None => 0,
            };
        }
        if (GIC_VPE_LOCAL_BASE..GIC_VPE_OTHER_BASE).contains(&offset) {
            return self.read_vpe(vp_index, offset - GIC_VPE_LOCAL_BASE);
        }
        if (GIC_VPE_OTHER_BASE..GIC_USERMODE_BASE).contains(&offset) {
            let other = self.vpes[vp_index].other_addr as usize;
            return self.read_vpe(other, offset - GIC_VPE_OTHER_BASE);
        }
        if offset >= GIC_USERMODE_BASE {
            debug!("{}: user-mode register set not implemented, read at {:#x}", self.debug_label(), offset);
            return 0;
        }

        warn!("{}: read of unimplemented register at {:#x}", self.debug_label(), offset);
        0
    }

    fn read_vpe(&mut self, vpe: usize, offset: u64) -> u64 {
        match offset {
            GIC_VPE_CTL => u64::from(self.vpes[vpe].ctl),
            GIC_VPE_PEND => {
                // Expire any passed deadline first so pending reflects it.
                self.get_count();
                u64::from(self.vpes[vpe].pend)
            }
            GIC_VPE_MASK => u64::from(self.vpes[vpe].mask),
            GIC_VPE_WD_MAP => u64::from(self.vpes[vpe].wd_map),
            GIC_VPE_COMPARE_MAP => u64::from(self.vpes[vpe].compare_map),
            GIC_VPE_TIMER_MAP => u64::from(self.vpes[vpe].timer_map),
            GIC_VPE_OTHER_ADDR => u64::from(self.vpes[vpe].other_addr),
            GIC_VPE_IDENT => vpe as u64,
            GIC_VPE_COMPARE_LO => u64::from(self.vpes[vpe].compare_lo),
            GIC_VPE_COMPARE_HI => u64::from(self.vpes[vpe].compare_hi),
            _ => {
                warn!("{}: read of unimplemented VPE register at {:#x}", self.debug_label(), offset);
                0
            }
        }
    }

    fn write_reg(&mut self, offset: u64, size: usize, value: u64, vp_index: usize) {
        match offset {
            GIC_SH_CONFIG => {
                self.write_config(value as u32);
                return;
            }
            GIC_SH_CONFIG_HI | GIC_SH_COUNTER_HI => return,
            GIC_SH_COUNTER_LO => {
                self.store_count(value as u32);
                return;
            }
            GIC_SH_WEDGE => {
                let value = value as u32;
                let source = (value & GIC_SH_WEDGE_SOURCE) as usize;
                self.service_irq(source, value & GIC_SH_WEDGE_ASSERT != 0);
                return;
            }
            _ => {}
        }

        if bitmap_bank(offset, GIC_SH_POL_BASE) {
            self.write_source_bits(offset - GIC_SH_POL_BASE, size, value, |s, bit| {
                s.polarity = bit
            });
            return;
        }
        if bitmap_bank(offset, GIC_SH_TRIG_BASE) {
            self.write_source_bits(offset - GIC_SH_TRIG_BASE, size, value, |s, bit| {
                s.trigger_level = bit
            });
            return;
        }
        if bitmap_bank(offset, GIC_SH_RMASK_BASE) {
            self.write_source_bits(offset - GIC_SH_RMASK_BASE, size, value, |s, bit| {
                s.enabled &= !bit
            });
            return;
        }
        if bitmap_bank(offset, GIC_SH_SMASK_BASE) {
            self.write_source_bits(offset - GIC_SH_SMASK_BASE, size, value, |s, bit| {
                s.enabled |= bit
            });
            return;
        }
        if let Some(source) = map_pin_reg(offset, self.num_sources) {
            self.sources[source].map_pin = value as u32;
            return;
        }
        if let Some(source) = map_vpe_reg(offset, self.num_sources) {
            // On the wire the target VPE is a one-hot mask; only the lowest
            // set bit is honored. Writing zero unmaps the source.
            self.sources[source].map_vpe = if value == 0 {
                None
            } else {
                Some(value.trailing_zeros())
            };
            return;
        }
        if (GIC_VPE_LOCAL_BASE..GIC_VPE_OTHER_BASE).contains(&offset) {
            self.write_vpe(vp_index, offset - GIC_VPE_LOCAL_BASE, value);
            return;
        }
        if (GIC_VPE_OTHER_BASE..GIC_USERMODE_BASE).contains(&offset) {
            let other = self.vpes[vp_index].other_addr as usize;
            self.write_vpe(other, offset - GIC_VPE_OTHER_BASE, value);
            return;
        }
        if offset >= GIC_USERMODE_BASE {
            debug!("{}: user-mode register set not implemented, write at {:#x}", self.debug_label(), offset);
            return;
        }

        warn!("{}: write of {:#x} to unimplemented register at {:#x}", self.debug_label(), value, offset);
    }

    fn write_config(&mut self, value: u32) {
        let previous = self.config;
        self.config = (previous & !GIC_SH_CONFIG_COUNTSTOP) | (value & GIC_SH_CONFIG_COUNTSTOP);
        if previous == self.config {
            return;
        }
        if self.config & GIC_SH_CONFIG_COUNTSTOP != 0 {
            debug!("{}: counter stopped", self.debug_label());
            self.stop_count();
        } else {
            debug!("{}: counter started", self.debug_label());
            self.start_count();
        }
    }

    fn write_vpe(&mut self, vpe: usize, offset: u64, value: u64) {
        let value = value as u32;
        match offset {
            GIC_VPE_CTL => {
                let vp = &mut self.vpes[vpe];
                vp.ctl = (vp.ctl & !1) | (value & 1);
            }
            GIC_VPE_RMASK => {
                let vp = &mut self.vpes[vpe];
                vp.mask &= !(value & GIC_VPE_MASK_FIELD);
            }
            GIC_VPE_SMASK => {
                let vp = &mut self.vpes[vpe];
                vp.mask |= value & GIC_VPE_MASK_FIELD;
            }
            GIC_VPE_WD_MAP => self.vpes[vpe].wd_map = value & GIC_MAP_STORE_MSK,
            GIC_VPE_COMPARE_MAP => self.vpes[vpe].compare_map = value & GIC_MAP_STORE_MSK,
            GIC_VPE_TIMER_MAP => self.vpes[vpe].timer_map = value & GIC_MAP_STORE_MSK,
            GIC_VPE_OTHER_ADDR => {
                if (value as usize) < self.num_vpe {
                    self.vpes[vpe].other_addr = value;
                }
            }
            GIC_VPE_OTHER_ADDR_HI | GIC_VPE_COMPARE_HI => {}
            GIC_VPE_COMPARE_LO => self.store_compare(vpe, value),
            _ => {
                warn!("{}: write of {:#x} to unimplemented VPE register at {:#x}", self.debug_label(), value, offset);
            }
        }
    }
}

impl BusDevice for Gic {
    fn debug_label(&self) -> String {
        "mips-gic".to_owned()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        if !matches!(data.len(), 1 | 2 | 4 | 8) {
            warn!("{}: unsupported {}-byte read, {}", self.debug_label(), data.len(), info);
            return;
        }
        let vp_index = self.current_vpe(info.id);
        if vp_index >= self.num_vpe {
            warn!("{}: access by unknown VPE {} dropped", self.debug_label(), info.id);
            return;
        }
        let value = self.read_reg(info.offset, data.len(), vp_index);
        for (i, b) in data.iter_mut().enumerate() {
            *b = (value >> (8 * i)) as u8;
        }
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if !matches!(data.len(), 1 | 2 | 4 | 8) {
            warn!("{}: unsupported {}-byte write, {}", self.debug_label(), data.len(), info);
            return;
        }
        let vp_index = self.current_vpe(info.id);
        if vp_index >= self.num_vpe {
            warn!("{}: access by unknown VPE {} dropped", self.debug_label(), info.id);
            return;
        }
        let mut value = 0u64;
        for (i, b) in data.iter().enumerate() {
            value |= u64::from(*b) << (8 * i);
        }
        self.write_reg(info.offset, data.len(), value, vp_index);
    }
}
