// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Handles routing to devices in an address space.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use remain::sorted;
use thiserror::Error;

/// Information about how a device was accessed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BusAccessInfo {
    /// Offset from base address that the device was accessed at.
    pub offset: u64,
    /// Absolute address of the device's access in its address space.
    pub address: u64,
    /// ID of the entity requesting a device access, usually the VCPU id.
    pub id: usize,
}

impl fmt::Display for BusAccessInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Trait for devices that respond to reads or writes in an arbitrary address
/// space.
///
/// The device does not care where it exists in address space as each method
/// is only given an offset into its allocated portion of address space.
pub trait BusDevice: Send {
    /// Returns a label suitable for debug output.
    fn debug_label(&self) -> String;
    /// Reads at `offset` from this device.
    fn read(&mut self, _offset: BusAccessInfo, _data: &mut [u8]) {}
    /// Writes at `offset` into this device.
    fn write(&mut self, _offset: BusAccessInfo, _data: &[u8]) {}
}

/// Holds a base and length representing the address space occupied by a
/// `BusDevice`.
#[derive(Debug, Copy, Clone)]
pub struct BusRange {
    pub base: u64,
    pub len: u64,
}

impl BusRange {
    /// Returns true if `addr` is within the range.
    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.base.saturating_add(self.len)
    }

    /// Returns true if there is overlap with the given range.
    pub fn overlaps(&self, base: u64, len: u64) -> bool {
        self.base < base.saturating_add(len) && base < self.base.saturating_add(self.len)
    }
}

impl Eq for BusRange {}

impl PartialEq for BusRange {
    fn eq(&self, other: &BusRange) -> bool {
        self.base == other.base
    }
}

impl Ord for BusRange {
    fn cmp(&self, other: &BusRange) -> Ordering {
        self.base.cmp(&other.base)
    }
}

impl PartialOrd for BusRange {
    fn partial_cmp(&self, other: &BusRange) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("new device range overlaps with an existing device")]
    Overlap,
    #[error("bus device ranges must have nonzero length")]
    ZeroSizedRange,
}

/// A device container for routing reads and writes over some address space.
///
/// This doesn't have any restrictions on what kind of device or address
/// space this applies to. The only restriction is that no two devices can
/// overlap in this address space.
#[derive(Clone)]
pub struct Bus {
    devices: Arc<Mutex<BTreeMap<BusRange, Arc<Mutex<dyn BusDevice>>>>>,
    access_id: usize,
}

impl Bus {
    /// Constructs a bus with an empty address space.
    pub fn new() -> Bus {
        Bus {
            devices: Arc::new(Mutex::new(BTreeMap::new())),
            access_id: 0,
        }
    }

    /// Sets the id that will be used for `BusAccessInfo`, usually the index
    /// of the VCPU performing accesses through this handle.
    pub fn set_access_id(&mut self, id: usize) {
        self.access_id = id;
    }

    fn first_before(&self, addr: u64) -> Option<(BusRange, Arc<Mutex<dyn BusDevice>>)> {
        let devices = self.devices.lock().unwrap();
        let (range, dev) = devices.range(..=BusRange { base: addr, len: 1 }).next_back()?;
        Some((*range, dev.clone()))
    }

    fn get_device(&self, addr: u64) -> Option<(u64, u64, Arc<Mutex<dyn BusDevice>>)> {
        if let Some((range, dev)) = self.first_before(addr) {
            let offset = addr - range.base;
            if offset < range.len {
                return Some((offset, addr, dev));
            }
        }
        None
    }

    /// Puts the given device at the given address space.
    pub fn insert(
        &self,
        device: Arc<Mutex<dyn BusDevice>>,
        base: u64,
        len: u64,
    ) -> Result<(), Error> {
        if len == 0 {
            return Err(Error::ZeroSizedRange);
        }
        let mut devices = self.devices.lock().unwrap();
        if devices.keys().any(|range| range.overlaps(base, len)) {
            return Err(Error::Overlap);
        }
        devices.insert(BusRange { base, len }, device);
        Ok(())
    }

    /// Reads data from the device that owns the range containing `addr` and
    /// puts it into `data`.
    ///
    /// Returns true on success, otherwise `data` is untouched.
    pub fn read(&self, addr: u64, data: &mut [u8]) -> bool {
        if let Some((offset, address, dev)) = self.get_device(addr) {
            dev.lock().unwrap().read(
                BusAccessInfo {
                    offset,
                    address,
                    id: self.access_id,
                },
                data,
            );
            true
        } else {
            false
        }
    }

    /// Writes `data` to the device that owns the range containing `addr`.
    ///
    /// Returns true on success, otherwise `data` is untouched.
    pub fn write(&self, addr: u64, data: &[u8]) -> bool {
        if let Some((offset, address, dev)) = self.get_device(addr) {
            dev.lock().unwrap().write(
                BusAccessInfo {
                    offset,
                    address,
                    id: self.access_id,
                },
                data,
            );
            true
        } else {
            false
        }
    }
}

impl Default for Bus {
    fn default() -> Bus {
        Bus::new()
    }
}
