// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Boot Parameter Block reader.

use defat_err::{Error, GeometryError, Result};
use defat_storage::DataStorage;
use zerocopy::{little_endian::U16, little_endian::U32, FromBytes, FromZeros, IntoBytes, KnownLayout};

/// The 512-byte first sector, laid out at the offsets FAT32 defines. Only
/// the fields the engine actually consumes are named; everything else is
/// `_reserved*` padding kept so the struct's size matches the real sector.
#[repr(C)]
#[derive(FromZeros, FromBytes, IntoBytes, KnownLayout)]
struct BootSector {
    _bs_jmpboot: [u8; 3],
    _bs_oemname: [u8; 8],
    bytes_per_sector: U16,
    sectors_per_cluster: u8,
    reserved_sector_count: U16,
    num_fats: u8,
    _reserved_0: [u8; 15],
    total_sectors_32: U32,
    fat_size_32: U32,
    _reserved_1: [u8; 4],
    root_cluster: U32,
    _reserved_2: [u8; 464],
}

const BOOT_SECTOR_SIZE: usize = 512;

/// Immutable FAT32 geometry, decoded once at the start of a run.
#[derive(Debug, Clone, Copy)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub total_sectors: u32,
    pub fat_size_sectors: u32,
    pub root_cluster: u32,
}

impl Bpb {
    /// Reads exactly 512 bytes from offset 0 and decodes the seven geometry
    /// fields the engine needs. Does not validate the signature byte or
    /// sanity-check geometry beyond a short read.
    pub fn read(storage: &dyn DataStorage) -> Result<Self> {
        let mut boot_sector = BootSector::new_zeroed();
        storage
            .read(0, boot_sector.as_mut_bytes())
            .map_err(|_| Error::Geometry(GeometryError::ShortRead { expected: BOOT_SECTOR_SIZE }))?;

        Ok(Bpb {
            bytes_per_sector: boot_sector.bytes_per_sector.get(),
            sectors_per_cluster: boot_sector.sectors_per_cluster,
            reserved_sector_count: boot_sector.reserved_sector_count.get(),
            num_fats: boot_sector.num_fats,
            total_sectors: boot_sector.total_sectors_32.get(),
            fat_size_sectors: boot_sector.fat_size_32.get(),
            root_cluster: boot_sector.root_cluster.get(),
        })
    }

    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    pub fn fat_start(&self) -> u64 {
        self.reserved_sector_count as u64 * self.bytes_per_sector as u64
    }

    pub fn fat_size_bytes(&self) -> u64 {
        self.fat_size_sectors as u64 * self.bytes_per_sector as u64
    }

    pub fn data_region_start(&self) -> u64 {
        (self.reserved_sector_count as u64 + self.num_fats as u64 * self.fat_size_sectors as u64)
            * self.bytes_per_sector as u64
    }

    /// Byte offset of cluster `index` (`index >= 2`) in the data region.
    pub fn cluster_offset(&self, index: u32) -> u64 {
        self.data_region_start() + (index as u64 - 2) * self.cluster_size() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_bpb() -> Vec<u8> {
        let mut raw = vec![0u8; BOOT_SECTOR_SIZE];
        raw[11..13].copy_from_slice(&512u16.to_le_bytes());
        raw[13] = 8; // sectors per cluster
        raw[14..16].copy_from_slice(&32u16.to_le_bytes()); // reserved sectors
        raw[16] = 2; // num fats
        raw[32..36].copy_from_slice(&131072u32.to_le_bytes());
        raw[36..40].copy_from_slice(&1008u32.to_le_bytes()); // fat size sectors
        raw[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
        raw
    }

    struct VecStorage(Vec<u8>);
    impl DataStorage for VecStorage {
        fn read(&self, offset: u64, buffer: &mut [u8]) -> defat_err::Result<()> {
            let offset = offset as usize;
            buffer.copy_from_slice(&self.0[offset..offset + buffer.len()]);
            Ok(())
        }
        fn write(&self, _offset: u64, _buffer: &[u8]) -> defat_err::Result<()> {
            unreachable!("not used in this test")
        }
    }

    #[test]
    fn decodes_the_seven_geometry_fields() {
        let storage = VecStorage(image_with_bpb());
        let bpb = Bpb::read(&storage).unwrap();

        assert_eq!(bpb.bytes_per_sector, 512);
        assert_eq!(bpb.sectors_per_cluster, 8);
        assert_eq!(bpb.reserved_sector_count, 32);
        assert_eq!(bpb.num_fats, 2);
        assert_eq!(bpb.total_sectors, 131072);
        assert_eq!(bpb.fat_size_sectors, 1008);
        assert_eq!(bpb.root_cluster, 2);
    }

    #[test]
    fn derives_offsets_from_geometry() {
        let storage = VecStorage(image_with_bpb());
        let bpb = Bpb::read(&storage).unwrap();

        assert_eq!(bpb.cluster_size(), 512 * 8);
        assert_eq!(bpb.fat_start(), 32 * 512);
        assert_eq!(bpb.fat_size_bytes(), 1008 * 512);
        assert_eq!(
            bpb.data_region_start(),
            (32 + 2 * 1008) * 512
        );
        assert_eq!(bpb.cluster_offset(2), bpb.data_region_start());
        assert_eq!(
            bpb.cluster_offset(3),
            bpb.data_region_start() + bpb.cluster_size() as u64
        );
    }

    #[test]
    fn short_read_is_a_geometry_error() {
        struct TooSmall;
        impl DataStorage for TooSmall {
            fn read(&self, _offset: u64, _buffer: &mut [u8]) -> defat_err::Result<()> {
                Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into())
            }
            fn write(&self, _offset: u64, _buffer: &[u8]) -> defat_err::Result<()> {
                unreachable!()
            }
        }

        let err = Bpb::read(&TooSmall).unwrap_err();
        assert!(matches!(err, Error::Geometry(GeometryError::ShortRead { .. })));
    }
}
