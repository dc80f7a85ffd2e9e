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

//! Request dispatcher and interrupt handlers.

use crate::{
    config::Config,
    controller::{Command, Controller, ControllerState, PendingOp},
    error::{FatalError, SetupError},
    geometry::{Chs, DriveGeometry},
    hw::PortAccess,
    recovery,
    registers,
    request::{Direction, RequestQueue},
    setup::{self, BlockCache, DiskTables, GeometrySource},
    SECTORS_PER_BLOCK,
};

use core::convert::TryFrom as _;

/// Hard-disk driver.
///
/// Owns the controller, the tables built during setup, and the queue of requests.
pub struct HdDriver<THw, TQueue> {
    controller: Controller<THw>,
    state: ControllerState,
    tables: DiskTables,
    /// True if [`HdDriver::setup`] has been called.
    setup_called: bool,
    queue: TQueue,
}

/// Where a request must be sent to.
struct Target {
    drive: u8,
    geometry: DriveGeometry,
    chs: Chs,
    cylinder: u16,
    sector_count: u8,
    direction: Direction,
}

impl<THw, TQueue> HdDriver<THw, TQueue>
where
    THw: PortAccess,
    TQueue: RequestQueue,
{
    /// Initializes a driver with the default configuration.
    ///
    /// No drive is known until [`HdDriver::setup`] has been called.
    ///
    /// # Safety
    ///
    /// `hw` must give access to an AT-compatible controller, and nothing else must access this
    /// controller while the driver is alive.
    pub unsafe fn new(hw: THw, queue: TQueue) -> Self {
        HdDriver::with_config(hw, queue, Config::default())
    }

    /// Same as [`HdDriver::new`], but with a custom configuration.
    ///
    /// # Safety
    ///
    /// See [`HdDriver::new`].
    pub unsafe fn with_config(hw: THw, queue: TQueue, config: Config) -> Self {
        HdDriver {
            controller: Controller::new(hw, config),
            state: ControllerState::new(),
            tables: DiskTables::empty(),
            setup_called: false,
            queue,
        }
    }

    /// Discovers the drives and reads their partition tables.
    ///
    /// Can only be called once. Subsequent calls return [`SetupError::AlreadyInitialized`]
    /// without doing anything. The other errors are fatal.
    pub fn setup<TCache>(
        &mut self,
        source: GeometrySource,
        cmos_disk_types: u8,
        cache: &mut TCache,
    ) -> Result<(), SetupError>
    where
        TCache: BlockCache + ?Sized,
    {
        if self.setup_called {
            return Err(SetupError::AlreadyInitialized);
        }
        self.setup_called = true;

        self.tables = setup::discover(source, cmos_disk_types, cache)?;
        Ok(())
    }

    /// Unmasks the line of the controller on the interrupt controllers.
    pub fn enable_interrupt_line(&self) {
        let hw = self.controller.hw();
        unsafe {
            let master = hw.read_port_u8(registers::PIC_MASTER_MASK);
            hw.write_port_u8(
                registers::PIC_MASTER_MASK,
                master & !registers::PIC_CASCADE_BIT,
            );
            let slave = hw.read_port_u8(registers::PIC_SLAVE_MASK);
            hw.write_port_u8(registers::PIC_SLAVE_MASK, slave & !registers::PIC_HD_BIT);
        }
    }

    pub fn tables(&self) -> &DiskTables {
        &self.tables
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        self.controller.config()
    }

    pub fn queue(&self) -> &TQueue {
        &self.queue
    }

    /// Gives access to the queue.
    ///
    /// Pushing a request on an idle driver doesn't start it. [`HdDriver::dispatch`] must be
    /// called afterwards if [`ControllerState::is_idle`] returns true.
    pub fn queue_mut(&mut self) -> &mut TQueue {
        &mut self.queue
    }

    /// Starts servicing the request at the head of the queue.
    ///
    /// Does nothing if a command is still outstanding, in which case the request at the head of
    /// the queue gets picked up once that command has completed. Returns immediately if the
    /// queue is empty.
    pub fn dispatch(&mut self) -> Result<(), FatalError> {
        if !self.state.is_idle() {
            return Ok(());
        }

        loop {
            let (device, sector, remaining, direction) = match self.queue.current() {
                Some(rq) => (
                    rq.device(),
                    rq.sector(),
                    rq.remaining_sectors(),
                    rq.direction(),
                ),
                None => return Ok(()),
            };

            let target = match locate(&self.tables, device, sector, remaining, direction) {
                Some(t) => t,
                None => {
                    log::debug!(
                        "Rejecting request for dev {:04x}, sector {}",
                        device,
                        sector
                    );
                    self.queue.end_request(false);
                    continue;
                }
            };

            if self.state.reset_pending {
                self.state.reset_pending = false;
                self.state.recalibrate_pending = true;
                return self
                    .controller
                    .reset_drive(&mut self.state, &target.geometry, target.drive);
            }

            if self.state.recalibrate_pending {
                self.state.recalibrate_pending = false;
                return self
                    .controller
                    .recalibrate(&mut self.state, &target.geometry, target.drive);
            }

            let command = Command {
                drive: target.drive,
                sector_count: target.sector_count,
                sector: target.chs.sector,
                head: target.chs.head,
                cylinder: target.cylinder,
                opcode: match target.direction {
                    Direction::Read => registers::WIN_READ,
                    Direction::Write => registers::WIN_WRITE,
                },
            };

            match target.direction {
                Direction::Read => {
                    return self.controller.issue_command(
                        &mut self.state,
                        &target.geometry,
                        command,
                        PendingOp::AwaitingReadSector { remaining },
                    );
                }
                Direction::Write => {
                    self.controller.issue_command(
                        &mut self.state,
                        &target.geometry,
                        command,
                        PendingOp::AwaitingWriteSector { remaining },
                    )?;

                    // The controller only raises an interrupt after it has received the first
                    // sector.
                    if !self.controller.wait_data_request() {
                        self.state.pending = PendingOp::Idle;
                        let outcome = recovery::record_failure(
                            &mut self.queue,
                            &mut self.state,
                            self.controller.config(),
                        );
                        log::debug!("Controller didn't request data for write: {:?}", outcome);
                        continue;
                    }

                    if let Some(rq) = self.queue.current() {
                        self.controller.write_sector(rq.current_sector());
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Must be called when the controller raises an interrupt.
    pub fn on_interrupt(&mut self) -> Result<(), FatalError> {
        match self.state.take_pending() {
            PendingOp::Idle => {
                log::warn!("Unexpected HD interrupt");
                Ok(())
            }
            PendingOp::AwaitingReset | PendingOp::AwaitingRecalibration => {
                self.recalibration_interrupt()
            }
            PendingOp::AwaitingReadSector { .. } => self.read_interrupt(),
            PendingOp::AwaitingWriteSector { .. } => self.write_interrupt(),
        }
    }

    fn read_interrupt(&mut self) -> Result<(), FatalError> {
        if let Err(failure) = self.controller.read_command_result() {
            log::debug!("Read failed: {:?}", failure);
            return self.retry();
        }

        let rq = match self.queue.current() {
            Some(rq) => rq,
            None => return self.dispatch(),
        };

        self.controller.read_sector(rq.current_sector_mut());
        rq.clear_errors();
        let remaining = rq.finish_sector();
        if remaining != 0 {
            self.state.pending = PendingOp::AwaitingReadSector { remaining };
            return Ok(());
        }

        self.queue.end_request(true);
        self.dispatch()
    }

    fn write_interrupt(&mut self) -> Result<(), FatalError> {
        if let Err(failure) = self.controller.read_command_result() {
            log::debug!("Write failed: {:?}", failure);
            return self.retry();
        }

        let rq = match self.queue.current() {
            Some(rq) => rq,
            None => return self.dispatch(),
        };

        rq.clear_errors();
        let remaining = rq.finish_sector();
        if remaining != 0 {
            self.state.pending = PendingOp::AwaitingWriteSector { remaining };
            self.controller.write_sector(rq.current_sector());
            return Ok(());
        }

        self.queue.end_request(true);
        self.dispatch()
    }

    fn recalibration_interrupt(&mut self) -> Result<(), FatalError> {
        if let Err(failure) = self.controller.read_command_result() {
            log::debug!("Reset or recalibration failed: {:?}", failure);
            return self.retry();
        }

        self.dispatch()
    }

    /// Accounts for a failed command and moves on.
    fn retry(&mut self) -> Result<(), FatalError> {
        let outcome =
            recovery::record_failure(&mut self.queue, &mut self.state, self.controller.config());
        log::trace!("Failed command: {:?}", outcome);
        self.dispatch()
    }
}

/// Validates the partition-relative position of a request and translates it into an address on
/// the drive.
///
/// Returns `None` if the request must be rejected.
fn locate(
    tables: &DiskTables,
    device: u16,
    sector: u32,
    remaining: u32,
    direction: Direction,
) -> Option<Target> {
    let (drive, partition) = tables.partition(device)?;

    // Requests always leave room for a full block within the partition.
    if sector.checked_add(SECTORS_PER_BLOCK)? > partition.sector_count {
        return None;
    }

    let geometry = *tables.geometry(drive)?;
    let absolute = partition.start_sector.checked_add(sector)?;
    let chs = geometry.to_chs(absolute)?;

    Some(Target {
        drive,
        geometry,
        chs,
        cylinder: u16::try_from(chs.cylinder).ok()?,
        sector_count: u8::try_from(remaining).ok()?,
        direction,
    })
}
