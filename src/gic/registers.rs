// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Register map of the Global Interrupt Controller.
//!
//! Offsets and field masks are fixed by the MIPS GIC hardware specification.
//! The MMIO window is split into four zones: shared registers from the base,
//! a VPE-local zone whose registers apply to the accessing VPE, a VPE-other
//! zone aliasing the local register set of the VPE selected by `OTHER_ADDR`,
//! and an unimplemented user-mode visible zone.

use static_assertions::const_assert;

/// Size of the GIC MMIO window.
pub const GIC_ADDRSPACE_SZ: u64 = 0x2_0000;

pub const GIC_VPE_LOCAL_BASE: u64 = 0x8000;
pub const GIC_VPE_OTHER_BASE: u64 = 0xc000;
pub const GIC_USERMODE_BASE: u64 = 0x1_0000;

// Shared section registers.
pub const GIC_SH_CONFIG: u64 = 0x0000;
pub const GIC_SH_CONFIG_HI: u64 = 0x0004;
pub const GIC_SH_COUNTER_LO: u64 = 0x0010;
pub const GIC_SH_COUNTER_HI: u64 = 0x0014;
pub const GIC_SH_POL_BASE: u64 = 0x0100;
pub const GIC_SH_TRIG_BASE: u64 = 0x0180;
pub const GIC_SH_WEDGE: u64 = 0x0280;
pub const GIC_SH_RMASK_BASE: u64 = 0x0300;
pub const GIC_SH_SMASK_BASE: u64 = 0x0380;
pub const GIC_SH_MASK_BASE: u64 = 0x0400;
pub const GIC_SH_PEND_BASE: u64 = 0x0480;
pub const GIC_SH_MAP_PIN_BASE: u64 = 0x0500;
pub const GIC_SH_MAP_VPE_BASE: u64 = 0x2000;
pub const GIC_SH_MAP_VPE_STRIDE: u64 = 32;

/// Bytes covered by one bank range of the per-source bitmap registers
/// (256 sources, one bit each, in eight 32-bit words).
pub const GIC_BITMAP_BANK_LEN: u64 = 0x20;

// Per-VPE registers, identical in the local and other zones.
pub const GIC_VPE_CTL: u64 = 0x0000;
pub const GIC_VPE_PEND: u64 = 0x0004;
pub const GIC_VPE_MASK: u64 = 0x0008;
pub const GIC_VPE_RMASK: u64 = 0x000c;
pub const GIC_VPE_SMASK: u64 = 0x0010;
pub const GIC_VPE_WD_MAP: u64 = 0x0040;
pub const GIC_VPE_COMPARE_MAP: u64 = 0x0044;
pub const GIC_VPE_TIMER_MAP: u64 = 0x0048;
pub const GIC_VPE_OTHER_ADDR: u64 = 0x0080;
pub const GIC_VPE_OTHER_ADDR_HI: u64 = 0x0084;
pub const GIC_VPE_IDENT: u64 = 0x0088;
pub const GIC_VPE_COMPARE_LO: u64 = 0x00a0;
pub const GIC_VPE_COMPARE_HI: u64 = 0x00a4;

// Field masks.

/// Stopping bit of the shared config register; while set the counter holds
/// its value.
pub const GIC_SH_CONFIG_COUNTSTOP: u32 = 1 << 28;
/// Revision and capability bits of the shared config register; the low bits
/// carry the VPE count. The counter-stop bit is cleared at reset so the
/// counter runs from power-on.
pub const GIC_SH_CONFIG_RESET: u32 = 0x100f_0000;

/// Pin selector field of the per-source and per-VPE map registers.
pub const GIC_MAP_PIN_FIELD: u32 = 0x3f;
/// Map-to-pin flag; also the reset value of the per-source pin map, leaving
/// the pin field clear until the guest programs a mapping.
pub const GIC_MAP_PIN_RESET: u32 = 0x8000_0000;
/// Writable bits of the per-VPE WD/COMPARE/TIMER map registers.
pub const GIC_MAP_STORE_MSK: u32 = 0xe000_003f;
/// Valid bit of the per-VPE map registers.
pub const GIC_MAP_VALID: u32 = 0x8000_0000;

/// Writable bits of the per-VPE interrupt mask.
pub const GIC_VPE_MASK_FIELD: u32 = 0x3f;
/// Count/compare bit of the per-VPE pending and mask registers.
pub const GIC_VPE_MASK_CMP: u32 = 1 << 1;

/// Assert/deassert flag of a WEDGE write.
pub const GIC_SH_WEDGE_ASSERT: u32 = 0x8000_0000;
/// Source number field of a WEDGE write.
pub const GIC_SH_WEDGE_SOURCE: u32 = 0x7fff_ffff;

/// Architectural base of the hardware interrupt inputs; pin numbers driven
/// on a CPU are the mapped value plus this offset.
pub const GIC_CPU_PIN_OFFSET: usize = 2;

const_assert!(GIC_SH_MAP_VPE_BASE + 256 * GIC_SH_MAP_VPE_STRIDE <= GIC_VPE_LOCAL_BASE);
const_assert!(GIC_VPE_LOCAL_BASE < GIC_VPE_OTHER_BASE);
const_assert!(GIC_VPE_OTHER_BASE < GIC_USERMODE_BASE);
const_assert!(GIC_USERMODE_BASE <= GIC_ADDRSPACE_SZ);
