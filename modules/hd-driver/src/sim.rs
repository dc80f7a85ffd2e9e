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

//! In-memory model of an AT controller with two drives, used by the tests.
//!
//! The model is sequential: commands complete immediately, and the interrupt that the real
//! hardware would raise is recorded as a flag that tests consume with
//! [`SimulatedController::take_interrupt`].

use crate::{
    controller::Command,
    geometry::DriveGeometry,
    hw::PortAccess,
    registers::{self, ErrorFlags, Status},
    SECTOR_SIZE,
};

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
};

/// Byte written on a port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PortWrite(pub u16, pub u8);

pub struct SimulatedController {
    inner: RefCell<Inner>,
}

struct Inner {
    geometries: [DriveGeometry; 2],
    /// Content of the sectors that aren't filled with zeroes, indexed by drive and LBA.
    sectors: BTreeMap<(u8, u32), Vec<u8>>,
    /// Last values written on ports `0x1f1` to `0x1f6`.
    task_file: [u8; 7],
    writes: Vec<PortWrite>,
    commands: Vec<Command>,
    status: Status,
    forced_status: Option<Status>,
    error: u8,
    error_reads: usize,
    diagnostic: u8,
    interrupt: bool,
    failures_to_inject: u32,
    suppress_data_request: bool,
    /// Number of sectors still to be pushed before one gets rejected.
    failing_pushed_sector: Option<usize>,
    transfer: Option<Transfer>,
    read_words: VecDeque<u16>,
    written_words: Vec<u16>,
    pushed_sectors: usize,
    raw_data: Vec<u8>,
    cmos_index: u8,
    cmos_disk_types: u8,
    pic_masks: [u8; 2],
}

struct Transfer {
    drive: u8,
    lba: u32,
    remaining: u32,
    write: bool,
    fail: bool,
}

impl SimulatedController {
    pub fn new(geometries: [DriveGeometry; 2]) -> Self {
        SimulatedController {
            inner: RefCell::new(Inner {
                geometries,
                sectors: BTreeMap::new(),
                task_file: [0; 7],
                writes: Vec::new(),
                commands: Vec::new(),
                status: Status::READY | Status::SEEK_COMPLETE,
                forced_status: None,
                error: 0,
                error_reads: 0,
                diagnostic: registers::DIAGNOSTIC_OK,
                interrupt: false,
                failures_to_inject: 0,
                suppress_data_request: false,
                failing_pushed_sector: None,
                transfer: None,
                read_words: VecDeque::new(),
                written_words: Vec::new(),
                pushed_sectors: 0,
                raw_data: Vec::new(),
                cmos_index: 0,
                cmos_disk_types: 0,
                pic_masks: [0xff, 0xff],
            }),
        }
    }

    pub fn set_sector(&self, drive: u8, lba: u32, data: &[u8]) {
        assert_eq!(data.len(), SECTOR_SIZE);
        self.inner
            .borrow_mut()
            .sectors
            .insert((drive, lba), data.to_vec());
    }

    pub fn sector(&self, drive: u8, lba: u32) -> Vec<u8> {
        self.inner
            .borrow()
            .sectors
            .get(&(drive, lba))
            .cloned()
            .unwrap_or_else(|| vec![0; SECTOR_SIZE])
    }

    /// The next `n` commands complete with an error.
    pub fn fail_next_commands(&self, n: u32) {
        self.inner.borrow_mut().failures_to_inject = n;
    }

    /// If true, write commands never raise the data request bit.
    pub fn suppress_data_request(&self, suppress: bool) {
        self.inner.borrow_mut().suppress_data_request = suppress;
    }

    /// The `n`th sector pushed from now on during a write completes with an error and isn't
    /// stored.
    pub fn fail_pushed_sector(&self, n: usize) {
        assert_ne!(n, 0);
        self.inner.borrow_mut().failing_pushed_sector = Some(n);
    }

    /// Overrides the value returned when reading the status register.
    pub fn force_status(&self, status: Option<Status>) {
        self.inner.borrow_mut().forced_status = status;
    }

    /// Value of the error register after a reset.
    pub fn set_diagnostic(&self, value: u8) {
        self.inner.borrow_mut().diagnostic = value;
    }

    pub fn set_cmos_disk_types(&self, value: u8) {
        self.inner.borrow_mut().cmos_disk_types = value;
    }

    pub fn pic_masks(&self) -> [u8; 2] {
        self.inner.borrow().pic_masks
    }

    /// Returns true if an interrupt has been raised since the last call.
    pub fn take_interrupt(&self) -> bool {
        std::mem::replace(&mut self.inner.borrow_mut().interrupt, false)
    }

    pub fn port_writes(&self) -> Vec<PortWrite> {
        self.inner.borrow().writes.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.inner.borrow().commands.clone()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.inner.borrow().commands.last().cloned()
    }

    pub fn error_register_reads(&self) -> usize {
        self.inner.borrow().error_reads
    }

    /// Number of full sectors pushed through the data port during write commands.
    pub fn pushed_sectors(&self) -> usize {
        self.inner.borrow().pushed_sectors
    }

    /// Bytes written on the data port while no write command was in progress.
    pub fn raw_data_written(&self) -> Vec<u8> {
        self.inner.borrow().raw_data.clone()
    }
}

impl Inner {
    fn execute(&mut self, opcode: u8) {
        let current = self.task_file[6];
        let drive = (current >> 4) & 1;
        let command = Command {
            drive,
            sector_count: self.task_file[2],
            sector: self.task_file[3],
            head: current & 0xf,
            cylinder: u16::from_le_bytes([self.task_file[4], self.task_file[5]]),
            opcode,
        };
        self.commands.push(command);

        let fail = if self.failures_to_inject > 0 {
            self.failures_to_inject -= 1;
            true
        } else {
            false
        };

        self.transfer = None;
        self.read_words.clear();
        self.written_words.clear();

        match opcode {
            registers::WIN_READ if !fail => {
                self.transfer = Some(Transfer {
                    drive,
                    lba: self.lba_of(&command),
                    remaining: u32::from(command.sector_count),
                    write: false,
                    fail,
                });
                self.load_next_sector();
            }
            registers::WIN_WRITE => {
                self.transfer = Some(Transfer {
                    drive,
                    lba: self.lba_of(&command),
                    remaining: u32::from(command.sector_count),
                    write: true,
                    fail,
                });
                self.status = Status::READY | Status::SEEK_COMPLETE;
                if !self.suppress_data_request {
                    self.status |= Status::DATA_REQUEST;
                }
            }
            _ => self.complete(fail),
        }
    }

    fn lba_of(&self, command: &Command) -> u32 {
        let geometry = &self.geometries[usize::from(command.drive)];
        let track = u32::from(command.cylinder) * u32::from(geometry.heads)
            + u32::from(command.head);
        track * u32::from(geometry.sectors_per_track) + u32::from(command.sector) - 1
    }

    fn complete(&mut self, fail: bool) {
        if fail {
            self.status = Status::READY | Status::SEEK_COMPLETE | Status::ERROR;
            self.error = ErrorFlags::ABORTED.bits();
        } else {
            self.status = Status::READY | Status::SEEK_COMPLETE;
            self.error = 0;
        }
        self.interrupt = true;
    }

    fn load_next_sector(&mut self) {
        let transfer = match &self.transfer {
            Some(t) => t,
            None => return,
        };
        let data = self
            .sectors
            .get(&(transfer.drive, transfer.lba))
            .cloned()
            .unwrap_or_else(|| vec![0; SECTOR_SIZE]);
        self.read_words = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        self.status = Status::READY | Status::SEEK_COMPLETE | Status::DATA_REQUEST;
        self.interrupt = true;
    }

    fn read_data(&mut self) -> u16 {
        let word = self.read_words.pop_front().unwrap_or(0);
        if self.read_words.is_empty() {
            if let Some(transfer) = &mut self.transfer {
                if !transfer.write {
                    transfer.remaining -= 1;
                    transfer.lba += 1;
                    if transfer.remaining == 0 {
                        self.transfer = None;
                        self.status = Status::READY | Status::SEEK_COMPLETE;
                    } else {
                        self.load_next_sector();
                    }
                }
            }
        }
        word
    }

    fn write_data(&mut self, word: u16) {
        let transfer = match &mut self.transfer {
            Some(t) if t.write => t,
            _ => {
                self.raw_data.extend_from_slice(&word.to_le_bytes());
                return;
            }
        };

        self.written_words.push(word);
        if self.written_words.len() < SECTOR_SIZE / 2 {
            return;
        }

        let data: Vec<u8> = self
            .written_words
            .drain(..)
            .flat_map(|w| w.to_le_bytes().to_vec())
            .collect();
        self.pushed_sectors += 1;

        let rejected = match &mut self.failing_pushed_sector {
            Some(n) => {
                *n -= 1;
                *n == 0
            }
            None => false,
        };
        if rejected {
            self.failing_pushed_sector = None;
        }

        if transfer.fail || rejected {
            self.transfer = None;
            self.complete(true);
            return;
        }

        self.sectors.insert((transfer.drive, transfer.lba), data);
        transfer.remaining -= 1;
        transfer.lba += 1;
        if transfer.remaining == 0 {
            self.transfer = None;
            self.complete(false);
        } else {
            self.complete(false);
            self.status |= Status::DATA_REQUEST;
        }
    }
}

unsafe impl PortAccess for SimulatedController {
    unsafe fn read_port_u8(&self, port: u16) -> u8 {
        let mut inner = self.inner.borrow_mut();
        match port {
            registers::HD_STATUS => inner.forced_status.unwrap_or(inner.status).bits(),
            registers::HD_ERROR => {
                inner.error_reads += 1;
                inner.error
            }
            registers::CMOS_DATA if inner.cmos_index & 0x7f == registers::CMOS_DISK_TYPES => {
                inner.cmos_disk_types
            }
            registers::PIC_MASTER_MASK => inner.pic_masks[0],
            registers::PIC_SLAVE_MASK => inner.pic_masks[1],
            p if p > registers::HD_ERROR && p < registers::HD_STATUS => {
                inner.task_file[usize::from(p - registers::HD_DATA)]
            }
            _ => 0xff,
        }
    }

    unsafe fn write_port_u8(&self, port: u16, data: u8) {
        let mut inner = self.inner.borrow_mut();
        inner.writes.push(PortWrite(port, data));
        match port {
            registers::HD_CMD => {
                if data & registers::CONTROL_SOFT_RESET != 0 {
                    inner.transfer = None;
                    inner.interrupt = false;
                    inner.status = Status::READY | Status::SEEK_COMPLETE;
                    inner.error = inner.diagnostic;
                }
            }
            registers::HD_COMMAND => inner.execute(data),
            p if p >= registers::HD_PRECOMP && p < registers::HD_COMMAND => {
                inner.task_file[usize::from(p - registers::HD_DATA)] = data;
            }
            registers::CMOS_INDEX => inner.cmos_index = data,
            registers::PIC_MASTER_MASK => inner.pic_masks[0] = data,
            registers::PIC_SLAVE_MASK => inner.pic_masks[1] = data,
            _ => {}
        }
    }

    unsafe fn read_port_u16(&self, port: u16) -> u16 {
        assert_eq!(port, registers::HD_DATA);
        self.inner.borrow_mut().read_data()
    }

    unsafe fn write_port_u16(&self, port: u16, data: u16) {
        assert_eq!(port, registers::HD_DATA);
        self.inner.borrow_mut().write_data(data)
    }
}

/// Builds a first sector with a valid signature and the given `(start, count)` partitions.
pub fn boot_sector(partitions: &[(u32, u32)]) -> Vec<u8> {
    let mut sector = vec![0; SECTOR_SIZE];
    for (n, (start, count)) in partitions.iter().enumerate() {
        let offset = 0x1be + n * 16;
        sector[offset + 4] = 0x81;
        sector[offset + 8..offset + 12].copy_from_slice(&start.to_le_bytes());
        sector[offset + 12..offset + 16].copy_from_slice(&count.to_le_bytes());
    }
    sector[510] = 0x55;
    sector[511] = 0xaa;
    sector
}

/// Converts a geometry into the 16 bytes block that the firmware provides.
pub fn firmware_params(geometry: &DriveGeometry) -> [u8; 16] {
    let mut out = [0; 16];
    out[0..2].copy_from_slice(&geometry.cylinders.to_le_bytes());
    out[2] = geometry.heads;
    out[5..7].copy_from_slice(&geometry.write_precomp.to_le_bytes());
    out[8] = geometry.control;
    out[12..14].copy_from_slice(&geometry.landing_zone.to_le_bytes());
    out[14] = geometry.sectors_per_track;
    out
}
