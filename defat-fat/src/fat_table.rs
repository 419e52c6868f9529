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

//! FAT table reader.
//!
//! [`ClusterTable`] is the sole owner of the in-memory FAT mirror. Every
//! other component (the cluster manager, defragmenter, fragmenter) borrows
//! it and calls its methods rather than keeping a second copy.

use log::warn;

use crate::bpb::Bpb;
use crate::cluster::{Cluster, ENTRY_MASK, MIN_VALID_INDEX};
use defat_err::Result;
use defat_storage::DataStorage;

pub struct ClusterTable {
    bpb: Bpb,
    clusters: Vec<Cluster>,
}

impl ClusterTable {
    /// Seeks to `fat_start`, reads `fat_size_bytes`, and parses it as packed
    /// 32-bit little-endian entries. Indices 0 and 1 are constructed (so
    /// indexing is direct by cluster number) but `is_valid()` is false for
    /// them.
    pub fn read(storage: &dyn DataStorage, bpb: Bpb) -> Result<Self> {
        let fat_size_bytes = bpb.fat_size_bytes() as usize;
        let mut raw = vec![0u8; fat_size_bytes];
        storage.read(bpb.fat_start(), &mut raw)?;

        let entry_count = fat_size_bytes / 4;
        let mut clusters = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let word = u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
            clusters.push(Cluster::new(
                i as u32,
                word & ENTRY_MASK,
                (word >> 28) as u8,
            ));
        }

        Ok(Self { bpb, clusters })
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Cluster> {
        self.clusters.get(index as usize)
    }

    /// Walks `next_index` from `start`, terminating at an invalid cluster,
    /// an end marker, or a revisit. A revisit is logged and the chain walked
    /// so far is returned rather than propagated as an error.
    pub fn get_cluster_chain(&self, start: u32) -> Vec<Cluster> {
        let mut chain = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut current = start;

        loop {
            if current < MIN_VALID_INDEX || current as usize >= self.clusters.len() {
                break;
            }
            let cluster = self.clusters[current as usize];
            if !cluster.is_valid() {
                break;
            }
            if !visited.insert(current) {
                warn!(
                    "{}",
                    defat_err::ChainError::Cycle { cluster: current }
                );
                break;
            }
            let is_end = cluster.is_end();
            chain.push(cluster);
            if is_end {
                break;
            }
            current = cluster.next_index;
        }

        chain
    }

    /// Byte offset of cluster `index` in the data region.
    pub fn cluster_offset(&self, index: u32) -> u64 {
        self.bpb.cluster_offset(index)
    }

    /// Reads one cluster's worth of bytes.
    pub fn read_cluster_data(&self, storage: &dyn DataStorage, cluster: &Cluster) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.bpb.cluster_size() as usize];
        storage.read(self.cluster_offset(cluster.index), &mut data)?;
        Ok(data)
    }

    /// Every cluster currently free (`next_index == 0`), ascending. Indices 0
    /// and 1 are reserved and never allocated, so they're excluded even
    /// though their `next_index` is conventionally zero.
    pub fn free_indices(&self) -> Vec<u32> {
        self.clusters
            .iter()
            .filter(|c| c.index >= MIN_VALID_INDEX && c.is_free())
            .map(|c| c.index)
            .collect()
    }

    /// Sets cluster `index`'s successor, preserving its reserved upper nibble.
    pub fn set_next(&mut self, index: u32, next_index: u32) {
        self.clusters[index as usize].next_index = next_index;
    }

    /// Serialises the in-memory table back to every FAT copy on disk
    /// (indices 0..num_fats at offsets `fat_start + k * fat_size_bytes`).
    /// The reserved upper nibble recorded at load time is re-applied rather
    /// than zeroed.
    pub fn write_fat(&self, storage: &dyn DataStorage, num_fats: u8) -> Result<()> {
        let fat_size_bytes = self.bpb.fat_size_bytes() as usize;
        let mut fat_data = Vec::with_capacity(fat_size_bytes);
        for cluster in &self.clusters {
            let word = ((cluster.reserved_bits as u32) << 28) | (cluster.next_index & ENTRY_MASK);
            fat_data.extend_from_slice(&word.to_le_bytes());
        }
        fat_data.resize(fat_size_bytes, 0);

        let writes: Vec<(u64, &[u8])> = (0..num_fats as u64)
            .map(|k| (self.bpb.fat_start() + k * fat_size_bytes as u64, fat_data.as_slice()))
            .collect();
        storage.write_many(&writes)
    }
}
