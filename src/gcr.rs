// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Identification block of the Coherence Manager's Global Configuration
//! Registers.
//!
//! Only the handful of read-only words guest firmware probes to discover the
//! platform topology and locate the GIC are implemented. The GIC base
//! address register accepts writes and reads them back, but relocating the
//! GIC is left to the embedder's memory map.

use log::warn;

use crate::bus::BusAccessInfo;
use crate::bus::BusDevice;

/// Size of the GCR MMIO window.
pub const GCR_ADDRSPACE_SZ: u64 = 0x8000;

// Global control block.
const GCR_CONFIG: u64 = 0x0000;
const GCR_BASE: u64 = 0x0008;
const GCR_REV: u64 = 0x0030;
const GCR_GIC_BASE: u64 = 0x0080;
const GCR_GIC_STATUS: u64 = 0x00d0;
const GCR_CPC_STATUS: u64 = 0x00f0;
const GCR_L2_CONFIG: u64 = 0x0130;

// Core-local and core-other control blocks.
const GCR_CL_BASE: u64 = 0x2000;
const GCR_CO_BASE: u64 = 0x4000;
const GCR_CCB_CONFIG: u64 = 0x0010;
const GCR_CCB_OTHER: u64 = 0x0018;

/// Coherence manager revision reported to the guest.
const GCR_REV_VALUE: u64 = 0x800;
/// GIC-exists bit of the GIC status register.
const GCR_GIC_STATUS_EX: u64 = 1 << 0;
/// L2 bypass bit of the L2 config register.
const GCR_L2_CONFIG_BYPASS: u64 = 1 << 20;

/// The read-only identification device.
pub struct Gcr {
    num_cpu: usize,
    base: u64,
    gic_base: u64,
}

impl Gcr {
    /// Constructs the identification block for a platform with `num_cpu`
    /// cores, reporting itself at `base` and the GIC at `gic_base`.
    pub fn new(num_cpu: usize, base: u64, gic_base: u64) -> Gcr {
        Gcr {
            num_cpu,
            base,
            gic_base,
        }
    }

    fn read_reg(&self, offset: u64) -> u64 {
        match offset {
            // PCORES reads as zero.
            GCR_CONFIG => 0,
            GCR_BASE => self.base,
            GCR_REV => GCR_REV_VALUE,
            GCR_GIC_BASE => self.gic_base,
            GCR_GIC_STATUS => GCR_GIC_STATUS_EX,
            GCR_CPC_STATUS => 0,
            GCR_L2_CONFIG => GCR_L2_CONFIG_BYPASS,
            // PVPE reads as the core count minus one in both the local and
            // the other block.
            o if o == GCR_CL_BASE + GCR_CCB_CONFIG => (self.num_cpu as u64).saturating_sub(1),
            o if o == GCR_CO_BASE + GCR_CCB_CONFIG => (self.num_cpu as u64).saturating_sub(1),
            o if o == GCR_CL_BASE + GCR_CCB_OTHER => 0,
            _ => {
                warn!("{}: read of unimplemented register at {:#x}", self.debug_label(), offset);
                0
            }
        }
    }
}

impl BusDevice for Gcr {
    fn debug_label(&self) -> String {
        "mips-gcr".to_owned()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        if !matches!(data.len(), 1 | 2 | 4 | 8) {
            warn!("{}: unsupported {}-byte read, {}", self.debug_label(), data.len(), info);
            return;
        }
        let value = self.read_reg(info.offset);
        for (i, b) in data.iter_mut().enumerate() {
            *b = (value >> (8 * i)) as u8;
        }
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if !matches!(data.len(), 1 | 2 | 4 | 8) {
            warn!("{}: unsupported {}-byte write, {}", self.debug_label(), data.len(), info);
            return;
        }
        let mut value = 0u64;
        for (i, b) in data.iter().enumerate() {
            value |= u64::from(*b) << (8 * i);
        }
        match info.offset {
            GCR_GIC_BASE => self.gic_base = value,
            _ => {
                warn!("{}: dropped write of {:#x} at {:#x}", self.debug_label(), value, info.offset);
            }
        }
    }
}
