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

//! Physical layout of a drive.

use byteorder::{ByteOrder as _, LittleEndian};
use core::convert::TryFrom as _;

/// Size in bytes of the parameter block that the firmware provides for each drive.
pub const FIRMWARE_PARAMS_LEN: usize = 16;

/// Geometry of a drive, as reported by the firmware.
///
/// Never modified after the boot-time setup.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DriveGeometry {
    pub heads: u8,
    pub sectors_per_track: u8,
    pub cylinders: u16,
    /// Cylinder starting from which write precompensation is performed.
    pub write_precomp: u16,
    /// Cylinder where the heads are parked.
    pub landing_zone: u16,
    /// Value written to the device control register before every command.
    pub control: u8,
}

/// Cylinder/head/sector address of a sector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: u32,
    pub head: u8,
    /// Sector within the track. Starts at 1.
    pub sector: u8,
}

impl DriveGeometry {
    /// Decodes the 16 bytes parameter block of a drive.
    ///
    /// The layout is the one of the BIOS fixed-disk parameter table: cylinders at offset 0,
    /// heads at 2, write precompensation at 5, control byte at 8, landing zone at 12, and
    /// sectors per track at 14. Multi-byte fields are little endian.
    pub fn from_firmware(params: &[u8; FIRMWARE_PARAMS_LEN]) -> Self {
        DriveGeometry {
            cylinders: LittleEndian::read_u16(&params[0..2]),
            heads: params[2],
            write_precomp: LittleEndian::read_u16(&params[5..7]),
            control: params[8],
            landing_zone: LittleEndian::read_u16(&params[12..14]),
            sectors_per_track: params[14],
        }
    }

    /// Total number of sectors of the drive.
    pub fn total_sectors(&self) -> u32 {
        u32::from(self.heads) * u32::from(self.sectors_per_track) * u32::from(self.cylinders)
    }

    /// Converts a zero-based absolute sector number into a cylinder/head/sector address.
    ///
    /// Returns `None` if the geometry has no head or no sector per track.
    pub fn to_chs(&self, absolute_sector: u32) -> Option<Chs> {
        if self.heads == 0 || self.sectors_per_track == 0 {
            return None;
        }

        let sectors_per_track = u32::from(self.sectors_per_track);
        let heads = u32::from(self.heads);

        let track = absolute_sector / sectors_per_track;
        let sector = absolute_sector % sectors_per_track + 1;

        // Both values are strictly bounded by `u8` fields.
        Some(Chs {
            cylinder: track / heads,
            head: u8::try_from(track % heads).ok()?,
            sector: u8::try_from(sector).ok()?,
        })
    }
}
