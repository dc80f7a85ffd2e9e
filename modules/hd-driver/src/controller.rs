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

//! Low-level communication with the controller.
//!
//! This module contains the only code that writes commands to the controller. Everything here
//! busy-polls with a bounded number of iterations and never sleeps, as it is called from within
//! interrupt handlers.

use crate::{
    config::Config, error::FatalError, geometry::DriveGeometry, hw::PortAccess, registers,
    registers::{ErrorFlags, Status},
    SECTOR_SIZE,
};

use core::{fmt, hint, mem};

/// Operation to perform when the controller raises its next interrupt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PendingOp {
    /// No command is outstanding.
    Idle,
    /// A "specify drive parameters" command, sent after a reset, is in progress.
    AwaitingReset,
    /// A recalibration (seek to cylinder 0) is in progress.
    AwaitingRecalibration,
    /// A read is in progress and the next sector is about to be available.
    AwaitingReadSector { remaining: u32 },
    /// A write is in progress and the controller is writing the last sector that was pushed.
    AwaitingWriteSector { remaining: u32 },
}

/// State shared between the dispatcher and the interrupt handlers.
///
/// There exists only one command outstanding at any given time: `pending` is something else than
/// [`PendingOp::Idle`] if and only if a command has been issued and its interrupt hasn't been
/// processed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    /// If true, the controller must be reset before the next data command.
    pub(crate) reset_pending: bool,
    /// If true, the drive must seek to cylinder 0 before the next data command.
    pub(crate) recalibrate_pending: bool,
    pub(crate) pending: PendingOp,
}

impl ControllerState {
    /// Initial state. The state of the controller left by the firmware is unknown, so a reset
    /// and a recalibration are scheduled before the first data command.
    pub fn new() -> Self {
        ControllerState {
            reset_pending: true,
            recalibrate_pending: true,
            pending: PendingOp::Idle,
        }
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn recalibrate_pending(&self) -> bool {
        self.recalibrate_pending
    }

    pub fn pending(&self) -> PendingOp {
        self.pending
    }

    /// Returns true if no command is outstanding.
    pub fn is_idle(&self) -> bool {
        self.pending == PendingOp::Idle
    }

    /// Returns the pending operation and resets it to [`PendingOp::Idle`].
    pub(crate) fn take_pending(&mut self) -> PendingOp {
        mem::replace(&mut self.pending, PendingOp::Idle)
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::new()
    }
}

/// Parameters of a single command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Command {
    /// Drive number. Either 0 or 1.
    pub drive: u8,
    pub sector_count: u8,
    /// First sector within the track, or command-specific parameter.
    pub sector: u8,
    /// Head number. At most 15.
    pub head: u8,
    pub cylinder: u16,
    pub opcode: u8,
}

/// Outcome of a failed command.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct CommandFailed {
    pub status: Status,
    pub error: ErrorFlags,
}

impl fmt::Debug for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "status = 0x{:02x}, error = {:?}",
            self.status.bits(),
            self.error
        )
    }
}

/// Access to the controller registers.
pub struct Controller<THw> {
    hw: THw,
    config: Config,
}

impl<THw> Controller<THw>
where
    THw: PortAccess,
{
    /// # Safety
    ///
    /// `hw` must give access to an AT-compatible controller, and nothing else must access this
    /// controller while the returned object is alive.
    pub unsafe fn new(hw: THw, config: Config) -> Self {
        Controller { hw, config }
    }

    pub fn hw(&self) -> &THw {
        &self.hw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> Status {
        unsafe { Status::from_bits_retain(self.hw.read_port_u8(registers::HD_STATUS)) }
    }

    fn error_register(&self) -> u8 {
        unsafe { self.hw.read_port_u8(registers::HD_ERROR) }
    }

    /// Polls the status register until the drive is ready and the controller isn't busy.
    ///
    /// Returns the number of polls that remained. A return value of 0 means that the controller
    /// isn't ready.
    pub fn wait_ready(&self) -> u32 {
        let limit = self.config.ready_poll_limit;
        for attempt in 0..limit {
            if self.status().is_ready() {
                return limit - attempt;
            }
        }
        0
    }

    /// Polls the status register until the drive is ready and the controller isn't busy, then
    /// checks that the last seek has completed.
    ///
    /// Returns `false` if the controller is still busy or if the seek isn't complete.
    pub fn wait_settled(&self) -> bool {
        for _ in 0..self.config.ready_poll_limit {
            if self.status().is_ready() {
                break;
            }
        }

        if self.status().is_settled() {
            true
        } else {
            log::warn!("HD controller times out");
            false
        }
    }

    /// Polls the status register until the controller requests data, which it does after
    /// receiving a write command.
    pub fn wait_data_request(&self) -> bool {
        (0..self.config.drq_poll_limit)
            .any(|_| self.status().contains(Status::DATA_REQUEST))
    }

    /// Determines the outcome of the command that has just completed.
    ///
    /// On failure, the error register is read as well, which clears it.
    pub fn read_command_result(&self) -> Result<(), CommandFailed> {
        let status = self.status();
        if status.is_command_success() {
            return Ok(());
        }

        let error = ErrorFlags::from_bits_retain(self.error_register());
        Err(CommandFailed { status, error })
    }

    /// Writes a command to the controller.
    ///
    /// `next` is stored in `state` as the operation to perform on the next interrupt. The last
    /// write of this function starts the execution of the command.
    pub fn issue_command(
        &self,
        state: &mut ControllerState,
        geometry: &DriveGeometry,
        command: Command,
        next: PendingOp,
    ) -> Result<(), FatalError> {
        if command.drive > 1 || command.head > 15 {
            return Err(FatalError::BadAddress {
                drive: command.drive,
                head: command.head,
            });
        }

        if self.wait_ready() == 0 {
            return Err(FatalError::ControllerNotReady);
        }

        log::trace!("Issuing {:?}", command);
        state.pending = next;

        let [cylinder_lo, cylinder_hi] = command.cylinder.to_le_bytes();
        unsafe {
            self.hw.write_port_u8(registers::HD_CMD, geometry.control);
            self.hw
                .write_port_u8(registers::HD_PRECOMP, (geometry.write_precomp >> 2) as u8);
            self.hw
                .write_port_u8(registers::HD_NSECTOR, command.sector_count);
            self.hw.write_port_u8(registers::HD_SECTOR, command.sector);
            self.hw.write_port_u8(registers::HD_LCYL, cylinder_lo);
            self.hw.write_port_u8(registers::HD_HCYL, cylinder_hi);
            self.hw.write_port_u8(
                registers::HD_CURRENT,
                0xa0 | (command.drive << 4) | command.head,
            );
            self.hw.write_port_u8(registers::HD_COMMAND, command.opcode);
        }

        Ok(())
    }

    /// Puts the controller in reset and takes it back out.
    ///
    /// Problems are reported in the logs but otherwise ignored. The command that follows the
    /// reset will fail if the controller is in a bad state.
    pub fn reset_controller(&self, control: u8) {
        unsafe {
            self.hw
                .write_port_u8(registers::HD_CMD, registers::CONTROL_SOFT_RESET);
        }

        for _ in 0..self.config.reset_delay_cycles {
            hint::spin_loop();
        }

        unsafe {
            self.hw.write_port_u8(registers::HD_CMD, control & 0x0f);
        }

        if !self.wait_settled() {
            log::warn!("HD-controller still busy");
        }

        let diagnostic = self.error_register();
        if diagnostic != registers::DIAGNOSTIC_OK {
            log::warn!("HD-controller reset failed: {:02x}", diagnostic);
        }
    }

    /// Resets the controller, then sends the geometry of `drive` to it.
    ///
    /// The interrupt that follows must be handled as [`PendingOp::AwaitingReset`].
    pub fn reset_drive(
        &self,
        state: &mut ControllerState,
        geometry: &DriveGeometry,
        drive: u8,
    ) -> Result<(), FatalError> {
        self.reset_controller(geometry.control);
        let command = Command {
            drive,
            sector_count: geometry.sectors_per_track,
            sector: geometry.sectors_per_track,
            head: geometry.heads.saturating_sub(1),
            cylinder: geometry.cylinders,
            opcode: registers::WIN_SPECIFY,
        };
        self.issue_command(state, geometry, command, PendingOp::AwaitingReset)
    }

    /// Moves the heads of `drive` back to cylinder 0.
    ///
    /// The interrupt that follows must be handled as [`PendingOp::AwaitingRecalibration`].
    pub fn recalibrate(
        &self,
        state: &mut ControllerState,
        geometry: &DriveGeometry,
        drive: u8,
    ) -> Result<(), FatalError> {
        let command = Command {
            drive,
            sector_count: geometry.sectors_per_track,
            sector: 0,
            head: 0,
            cylinder: 0,
            opcode: registers::WIN_RESTORE,
        };
        self.issue_command(state, geometry, command, PendingOp::AwaitingRecalibration)
    }

    /// Reads one sector from the data port into `out`.
    pub fn read_sector(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), SECTOR_SIZE);
        let mut words = [0u16; SECTOR_SIZE / 2];
        unsafe {
            self.hw
                .read_port_u16_repeated(registers::HD_DATA, &mut words);
        }
        for (chunk, word) in out.chunks_exact_mut(2).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Pushes one sector from `data` to the data port.
    pub fn write_sector(&self, data: &[u8]) {
        debug_assert_eq!(data.len(), SECTOR_SIZE);
        let mut words = [0u16; SECTOR_SIZE / 2];
        for (word, chunk) in words.iter_mut().zip(data.chunks_exact(2)) {
            *word = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        unsafe {
            self.hw.write_port_u16_repeated(registers::HD_DATA, &words);
        }
    }
}

impl<THw> fmt::Debug for Controller<THw> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish()
    }
}
