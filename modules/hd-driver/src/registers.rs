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

//! Port numbers, register bits, and command opcodes of the controller.
//!
//! See <https://wiki.osdev.org/ATA_PIO_Mode> for an overview of the register layout.

use bitflags::bitflags;

/// Data port. Transfers are performed 16 bits at a time.
pub const HD_DATA: u16 = 0x1f0;
/// Error register when read.
pub const HD_ERROR: u16 = 0x1f1;
/// Write-precompensation cylinder (divided by 4) when written. Same port as [`HD_ERROR`].
pub const HD_PRECOMP: u16 = HD_ERROR;
pub const HD_NSECTOR: u16 = 0x1f2;
pub const HD_SECTOR: u16 = 0x1f3;
pub const HD_LCYL: u16 = 0x1f4;
pub const HD_HCYL: u16 = 0x1f5;
/// Drive and head selection. Bits 5 and 7 must always be set.
pub const HD_CURRENT: u16 = 0x1f6;
/// Status register when read.
pub const HD_STATUS: u16 = 0x1f7;
/// Command register when written. Same port as [`HD_STATUS`].
pub const HD_COMMAND: u16 = HD_STATUS;
/// Device control register.
pub const HD_CMD: u16 = 0x3f6;

/// CMOS index port. Bit 7 of the written value disables NMIs.
pub const CMOS_INDEX: u16 = 0x70;
pub const CMOS_DATA: u16 = 0x71;
/// CMOS register containing the types of the two AT drives.
pub const CMOS_DISK_TYPES: u8 = 0x12;

/// Interrupt mask register of the master 8259 PIC.
pub const PIC_MASTER_MASK: u16 = 0x21;
/// Interrupt mask register of the slave 8259 PIC.
pub const PIC_SLAVE_MASK: u16 = 0xa1;
/// Bit of the master mask corresponding to the cascade line.
pub const PIC_CASCADE_BIT: u8 = 1 << 2;
/// Bit of the slave mask corresponding to IRQ 14.
pub const PIC_HD_BIT: u8 = 1 << 6;

/// Value written to [`HD_CMD`] to put the controller in reset.
pub const CONTROL_SOFT_RESET: u8 = 4;
/// Value of the error register after a successful reset.
pub const DIAGNOSTIC_OK: u8 = 1;

pub const WIN_RESTORE: u8 = 0x10;
pub const WIN_READ: u8 = 0x20;
pub const WIN_WRITE: u8 = 0x30;
pub const WIN_VERIFY: u8 = 0x40;
pub const WIN_FORMAT: u8 = 0x50;
pub const WIN_INIT: u8 = 0x60;
pub const WIN_SEEK: u8 = 0x70;
pub const WIN_DIAGNOSE: u8 = 0x90;
/// Sets the drive parameters (sectors per track and number of heads).
pub const WIN_SPECIFY: u8 = 0x91;

bitflags! {
    /// Content of the status register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Status: u8 {
        const ERROR = 0x01;
        const INDEX = 0x02;
        const ECC = 0x04;
        /// The controller is ready to transfer a sector through the data port.
        const DATA_REQUEST = 0x08;
        const SEEK_COMPLETE = 0x10;
        const WRITE_FAULT = 0x20;
        const READY = 0x40;
        const BUSY = 0x80;
    }
}

bitflags! {
    /// Content of the error register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ErrorFlags: u8 {
        const ADDRESS_MARK = 0x01;
        const TRACK_ZERO = 0x02;
        const ABORTED = 0x04;
        const ID_NOT_FOUND = 0x10;
        const UNCORRECTABLE = 0x40;
        const BAD_BLOCK = 0x80;
    }
}

impl Status {
    /// Bits that are compared when determining the outcome of a command.
    pub const RESULT_MASK: Status = Status::BUSY
        .union(Status::READY)
        .union(Status::WRITE_FAULT)
        .union(Status::SEEK_COMPLETE)
        .union(Status::ERROR);

    /// Value of the bits in [`Status::RESULT_MASK`] when a command has succeeded.
    pub const RESULT_OK: Status = Status::READY.union(Status::SEEK_COMPLETE);

    /// Returns true if the bits of [`Status::RESULT_MASK`] are exactly [`Status::RESULT_OK`].
    pub fn is_command_success(self) -> bool {
        self.intersection(Status::RESULT_MASK) == Status::RESULT_OK
    }

    /// Returns true if the drive is ready and the controller isn't busy.
    pub fn is_ready(self) -> bool {
        self.intersection(Status::BUSY | Status::READY) == Status::READY
    }

    /// Returns true if the drive is ready, the controller isn't busy, and the last seek has
    /// completed.
    pub fn is_settled(self) -> bool {
        self.intersection(Status::BUSY | Status::READY | Status::SEEK_COMPLETE)
            == Status::READY | Status::SEEK_COMPLETE
    }
}
