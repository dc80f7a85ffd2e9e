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

//! Partition table found in the first sector of a drive.
//!
//! The first sector ends with the two bytes `0x55, 0xaa`. Four 16 bytes descriptors start at
//! offset `0x1be`. Only the signature is checked; the content of the descriptors is taken as is.

use crate::SECTOR_SIZE;
use byteorder::{ByteOrder as _, LittleEndian};

/// Offset within the first sector of the first partition descriptor.
pub const PARTITION_TABLE_OFFSET: usize = 0x1be;
/// Size in bytes of a partition descriptor.
pub const PARTITION_DESCRIPTOR_LEN: usize = 16;
/// Number of descriptors in the table.
pub const PRIMARY_PARTITIONS: usize = 4;
/// Offset of the two signature bytes within the first sector.
pub const BOOT_SIGNATURE_OFFSET: usize = 510;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xaa];

/// Region of a drive, in sectors.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// First sector of the region, relative to the start of the drive.
    pub start_sector: u32,
    pub sector_count: u32,
}

/// Raw content of one of the four descriptors of the partition table.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// `0x80` if the partition is bootable.
    pub boot_indicator: u8,
    /// Head, sector, and cylinder of the first sector, packed the way the BIOS expects them.
    pub start_chs: [u8; 3],
    pub system_id: u8,
    pub end_chs: [u8; 3],
    pub start_sector: u32,
    pub sector_count: u32,
}

impl PartitionDescriptor {
    /// Decodes a 16 bytes descriptor.
    pub fn parse(bytes: &[u8; PARTITION_DESCRIPTOR_LEN]) -> Self {
        PartitionDescriptor {
            boot_indicator: bytes[0],
            start_chs: [bytes[1], bytes[2], bytes[3]],
            system_id: bytes[4],
            end_chs: [bytes[5], bytes[6], bytes[7]],
            start_sector: LittleEndian::read_u32(&bytes[8..12]),
            sector_count: LittleEndian::read_u32(&bytes[12..16]),
        }
    }

    pub fn entry(&self) -> PartitionEntry {
        PartitionEntry {
            start_sector: self.start_sector,
            sector_count: self.sector_count,
        }
    }
}

/// Returns true if `sector` is at least one sector long and ends with the boot signature.
pub fn has_boot_signature(sector: &[u8]) -> bool {
    sector.len() >= SECTOR_SIZE
        && sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] == BOOT_SIGNATURE
}

/// Parses the partition table of a first sector.
///
/// Returns `None` if the signature is missing.
pub fn parse_table(sector: &[u8]) -> Option<[PartitionDescriptor; PRIMARY_PARTITIONS]> {
    if !has_boot_signature(sector) {
        return None;
    }

    let mut out = [PartitionDescriptor::default(); PRIMARY_PARTITIONS];
    for (n, descriptor) in out.iter_mut().enumerate() {
        let offset = PARTITION_TABLE_OFFSET + n * PARTITION_DESCRIPTOR_LEN;
        let mut raw = [0; PARTITION_DESCRIPTOR_LEN];
        raw.copy_from_slice(&sector[offset..offset + PARTITION_DESCRIPTOR_LEN]);
        *descriptor = PartitionDescriptor::parse(&raw);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_signature() {
        let mut sector = [0u8; 512];
        assert!(parse_table(&sector).is_none());
        sector[510] = 0xaa;
        sector[511] = 0x55;
        assert!(parse_table(&sector).is_none());
        sector[510] = 0x55;
        sector[511] = 0xaa;
        assert!(parse_table(&sector).is_some());
    }

    #[test]
    fn short_buffer() {
        assert!(parse_table(&[0x55, 0xaa]).is_none());
    }

    #[test]
    fn descriptors_decoded() {
        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xaa;
        let first = &mut sector[0x1be..0x1ce];
        first[0] = 0x80;
        first[1..4].copy_from_slice(&[1, 1, 0]);
        first[4] = 0x81;
        first[5..8].copy_from_slice(&[3, 0x91, 0x66]);
        first[8..12].copy_from_slice(&63u32.to_le_bytes());
        first[12..16].copy_from_slice(&41757u32.to_le_bytes());
        sector[0x1ee + 8..0x1ee + 12].copy_from_slice(&0xdead_beefu32.to_le_bytes());

        let table = parse_table(&sector).unwrap();
        assert_eq!(table[0].boot_indicator, 0x80);
        assert_eq!(table[0].system_id, 0x81);
        assert_eq!(table[0].start_chs, [1, 1, 0]);
        assert_eq!(table[0].end_chs, [3, 0x91, 0x66]);
        assert_eq!(
            table[0].entry(),
            PartitionEntry {
                start_sector: 63,
                sector_count: 41757
            }
        );
        assert_eq!(table[1], PartitionDescriptor::default());
        assert_eq!(table[3].start_sector, 0xdead_beef);
    }

    #[test]
    fn arbitrary_descriptor_bytes_accepted() {
        let mut sector = [0xffu8; 512];
        sector[510] = 0x55;
        sector[511] = 0xaa;
        let table = parse_table(&sector).unwrap();
        for descriptor in &table {
            assert_eq!(descriptor.start_sector, u32::max_value());
            assert_eq!(descriptor.sector_count, u32::max_value());
        }
    }
}
