// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Emulates the interrupt-distribution and timer hardware of a multi-core
//! MIPS virtual platform: the Global Interrupt Controller, the read-only
//! identification block of the Coherence Manager's Global Configuration
//! Registers, and the per-CPU R4K count/compare timer.

mod bus;
mod clock;
mod gcr;
mod gic;
mod r4k;

pub use self::bus::Bus;
pub use self::bus::BusAccessInfo;
pub use self::bus::BusDevice;
pub use self::bus::BusRange;
pub use self::bus::Error as BusError;
pub use self::clock::Clock;
pub use self::clock::FakeClock;
pub use self::clock::TimerService;
pub use self::gcr::Gcr;
pub use self::gcr::GCR_ADDRSPACE_SZ;
pub use self::gic::registers;
pub use self::gic::Gic;
pub use self::gic::GicError;
pub use self::gic::GIC_MAX_SOURCES;
pub use self::gic::GIC_MAX_VPES;
pub use self::r4k::R4kTimer;

/// Hardware interrupt inputs of the virtual CPUs.
///
/// Raising and lowering numbered interrupt lines on specific CPUs is the
/// only outbound side effect these devices have; the embedding emulator
/// decides what a level change does to the CPU's coprocessor state.
pub trait CpuPins: Send {
    /// Drives `pin` of CPU `cpu_index` to `level`.
    fn set_pin(&mut self, cpu_index: usize, pin: usize, level: bool);
}
