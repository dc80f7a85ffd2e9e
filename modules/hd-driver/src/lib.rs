// Copyright (C) 2019-2021  Pierre Krieger
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Driver for AT-compatible hard-disk controllers.
//!
//! The driver turns block requests into commands for the controller and drives each command to
//! completion across hardware interrupts. All of its code can run in interrupt context: no
//! function ever sleeps, and every wait is a bounded spin loop.
//!
//! # Overview
//!
//! The controller accepts a single outstanding command at a time. The driver therefore
//! alternates between two phases:
//!
//! - The dispatcher (see [`HdDriver::dispatch`]) looks at the head of the request queue, computes
//! the cylinder/head/sector address of the request, and writes one command to the controller.
//! It then records which operation must run when the controller raises its interrupt, and
//! returns.
//! - When the interrupt fires, [`HdDriver::on_interrupt`] runs the recorded operation. This
//! either continues the same command (multi-sector transfers), or resolves it and calls back
//! into the dispatcher for the next request.
//!
//! Failed commands are retried. After too many failures on the same request the controller is
//! reset and the drive recalibrated, and when the error budget is exhausted the request is
//! abandoned and the driver moves on to the next one.
//!
//! # Boot-time setup
//!
//! Before servicing requests, [`HdDriver::setup`] must be called once with the geometry
//! supplied by the firmware and the disk types stored in the CMOS. It reads the partition table
//! of every drive that is present.
//!
//! # Hardware access
//!
//! The driver never accesses I/O ports directly. Instead, all accesses go through the
//! [`PortAccess`] trait. On x86_64, [`X86Ports`] implements this trait with the `in`/`out`
//! instructions.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub use config::Config;
pub use controller::{ControllerState, PendingOp};
pub use device::HdDevice;
pub use driver::HdDriver;
pub use error::{FatalError, IoError, RequestError, SetupError};
pub use geometry::{Chs, DriveGeometry};
pub use hw::PortAccess;
#[cfg(target_arch = "x86_64")]
pub use hw::X86Ports;
pub use partition::{PartitionDescriptor, PartitionEntry};
pub use request::{Direction, FifoQueue, Finished, Request, RequestQueue};
pub use setup::{
    drives_from_cmos, read_cmos_disk_types, BlockCache, DiskTables, Drive, GeometrySource,
};

pub mod registers;

mod config;
mod controller;
mod device;
mod driver;
mod error;
mod geometry;
mod hw;
mod partition;
mod recovery;
mod request;
mod setup;

#[cfg(test)]
mod sim;

/// Maximum number of drives handled by a single controller.
pub const MAX_DRIVES: usize = 2;

/// Number of minor device numbers per drive. Slot 0 is the whole disk, slots 1 to 4 are the
/// four primary partitions.
pub const SLOTS_PER_DRIVE: usize = 5;

/// Size in bytes of a sector.
pub const SECTOR_SIZE: usize = 512;

/// Number of sectors in a filesystem block. The dispatcher refuses requests that don't leave room
/// for a full block at the end of the partition.
pub const SECTORS_PER_BLOCK: u32 = 2;
