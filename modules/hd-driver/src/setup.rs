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

//! Boot-time discovery of the drives and of their partitions.
//!
//! The geometry of each drive comes from the firmware (or from a static configuration). The CMOS
//! then tells which drives are actually connected to an AT-compatible controller. Finally, the
//! partition table of each connected drive is read through the buffer cache.
//!
//! The tables built here are never modified afterwards.

use crate::{
    error::SetupError,
    geometry::{DriveGeometry, FIRMWARE_PARAMS_LEN},
    hw::PortAccess,
    partition::{self, PartitionEntry, PRIMARY_PARTITIONS},
    registers, MAX_DRIVES, SLOTS_PER_DRIVE,
};

use arrayvec::ArrayVec;
use core::convert::TryFrom as _;

/// Where the geometry of the drives comes from.
#[derive(Debug, Copy, Clone)]
pub enum GeometrySource<'a> {
    /// Two consecutive 16 bytes parameter blocks, as copied from the BIOS by the boot loader.
    Firmware(&'a [u8; FIRMWARE_PARAMS_LEN * MAX_DRIVES]),
    /// Geometry known in advance. Entries beyond the second one are ignored.
    Static(&'a [DriveGeometry]),
}

/// Buffer cache through which the partition tables are read.
pub trait BlockCache {
    type Buffer: AsRef<[u8]>;

    /// Reads block `block` of the device whose minor number is `device`. Returns `None` if the
    /// read has failed.
    fn fetch_block(&mut self, device: u16, block: u32) -> Option<Self::Buffer>;

    /// Gives back a buffer returned by [`BlockCache::fetch_block`].
    fn release(&mut self, buffer: Self::Buffer) {
        drop(buffer);
    }
}

/// Geometry and partitions of one drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub geometry: DriveGeometry,
    /// Index 0 covers the whole drive. Indices 1 to 4 are the primary partitions.
    pub partitions: [PartitionEntry; SLOTS_PER_DRIVE],
}

/// Geometry and partitions of all the drives that are present.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskTables {
    drives: ArrayVec<[Drive; MAX_DRIVES]>,
}

impl DiskTables {
    /// Tables with no drive. Every request is rejected.
    pub fn empty() -> Self {
        DiskTables::default()
    }

    pub fn drive_count(&self) -> usize {
        self.drives.len()
    }

    pub fn drive(&self, drive: u8) -> Option<&Drive> {
        self.drives.get(usize::from(drive))
    }

    pub fn geometry(&self, drive: u8) -> Option<&DriveGeometry> {
        self.drive(drive).map(|d| &d.geometry)
    }

    /// Resolves a minor device number into a drive number and the region it covers.
    pub fn partition(&self, minor: u16) -> Option<(u8, PartitionEntry)> {
        let drive = u8::try_from(usize::from(minor) / SLOTS_PER_DRIVE).ok()?;
        let slot = usize::from(minor) % SLOTS_PER_DRIVE;
        let entry = self.drive(drive)?.partitions[slot];
        Some((drive, entry))
    }
}

/// Reads the byte of the CMOS that contains the types of the two drives.
///
/// # Safety
///
/// Nothing else must be accessing the CMOS at the same time.
pub unsafe fn read_cmos_disk_types<THw: PortAccess + ?Sized>(hw: &THw) -> u8 {
    hw.write_port_u8(registers::CMOS_INDEX, 0x80 | registers::CMOS_DISK_TYPES);
    hw.read_port_u8(registers::CMOS_DATA)
}

/// Number of drives attached to an AT-compatible controller according to the CMOS.
///
/// The high nibble is the type of the first drive and the low nibble the type of the second
/// one. A type of 0 means that there is no drive. A second drive without a first one isn't
/// possible.
pub fn drives_from_cmos(disk_types: u8) -> usize {
    if disk_types & 0xf0 == 0 {
        0
    } else if disk_types & 0x0f == 0 {
        1
    } else {
        2
    }
}

/// Builds the tables of all the drives.
pub(crate) fn discover<TCache>(
    source: GeometrySource,
    cmos_disk_types: u8,
    cache: &mut TCache,
) -> Result<DiskTables, SetupError>
where
    TCache: BlockCache + ?Sized,
{
    let mut geometries = ArrayVec::<[DriveGeometry; MAX_DRIVES]>::new();
    let reported = match source {
        GeometrySource::Firmware(params) => {
            for chunk in params.chunks_exact(FIRMWARE_PARAMS_LEN) {
                let mut block = [0; FIRMWARE_PARAMS_LEN];
                block.copy_from_slice(chunk);
                geometries.push(DriveGeometry::from_firmware(&block));
            }
            if geometries[1].cylinders != 0 {
                2
            } else {
                1
            }
        }
        GeometrySource::Static(list) => {
            for geometry in list.iter().take(MAX_DRIVES) {
                geometries.push(*geometry);
            }
            geometries.len()
        }
    };

    // Controllers that are BIOS-compatible but not register-compatible appear in the firmware
    // tables but not in the CMOS. The CMOS is authoritative.
    let drive_count = drives_from_cmos(cmos_disk_types).min(geometries.len());
    if drive_count != reported {
        log::debug!(
            "Firmware reports {} drive(s), CMOS reports {}",
            reported,
            drive_count
        );
    }

    let mut tables = DiskTables::empty();
    for geometry in geometries.iter().take(drive_count) {
        let mut partitions = [PartitionEntry::default(); SLOTS_PER_DRIVE];
        partitions[0] = PartitionEntry {
            start_sector: 0,
            sector_count: geometry.total_sectors(),
        };
        tables.drives.push(Drive {
            geometry: *geometry,
            partitions,
        });
    }

    for (index, drive) in tables.drives.iter_mut().enumerate() {
        // `index` is bounded by `MAX_DRIVES`.
        let drive_num = u8::try_from(index).unwrap_or(u8::max_value());
        let minor = u16::from(drive_num) * SLOTS_PER_DRIVE as u16;

        let buffer = match cache.fetch_block(minor, 0) {
            Some(b) => b,
            None => {
                log::error!("Unable to read partition table of drive {}", drive_num);
                return Err(SetupError::PartitionTableUnreadable { drive: drive_num });
            }
        };

        let table = match partition::parse_table(buffer.as_ref()) {
            Some(t) => t,
            None => {
                log::error!("Bad partition table on drive {}", drive_num);
                cache.release(buffer);
                return Err(SetupError::BadPartitionTable { drive: drive_num });
            }
        };

        for (slot, descriptor) in table.iter().enumerate().take(PRIMARY_PARTITIONS) {
            log::debug!(
                "hd{}: partition {}: {:?}",
                drive_num,
                slot + 1,
                descriptor
            );
            drive.partitions[slot + 1] = descriptor.entry();
        }

        cache.release(buffer);
    }

    if drive_count != 0 {
        log::info!(
            "Partition table{} ok.",
            if drive_count > 1 { "s" } else { "" }
        );
    }

    Ok(tables)
}
