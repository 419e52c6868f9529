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

//! Shared primitives used by both the defragmenter and the fragmenter: the
//! free-cluster snapshot, the fragmentation predicate, per-cluster copy, FAT
//! chain rewrite, and the FAT flush.

use crate::cluster::{Cluster, END_OF_CHAIN_MARKER};
use crate::dir::{DirectoryParser, FileDescriptor};
use crate::fat_table::ClusterTable;
use defat_err::Result;
use defat_storage::DataStorage;

pub struct FragmentedFile {
    pub descriptor: FileDescriptor,
    pub chain: Vec<Cluster>,
}

/// True iff some non-terminal cluster's `next_index` differs from its own
/// `index + 1`. The terminal cluster's end marker is never checked.
pub fn is_fragmented(chain: &[Cluster]) -> bool {
    chain
        .iter()
        .zip(chain.iter().skip(1))
        .any(|(cluster, _)| !cluster.is_end() && cluster.next_index != cluster.index + 1)
}

pub struct ClusterManager<'a> {
    storage: &'a dyn DataStorage,
    table: &'a mut ClusterTable,
    /// Snapshot taken once at construction. Clusters freed mid-run are never
    /// added back to this list within the same run.
    free: Vec<u32>,
}

impl<'a> ClusterManager<'a> {
    pub fn new(storage: &'a dyn DataStorage, table: &'a mut ClusterTable) -> Self {
        let free = table.free_indices();
        Self { storage, table, free }
    }

    pub fn table(&self) -> &ClusterTable {
        self.table
    }

    /// The free-cluster snapshot, for allocation policies to consume.
    pub fn free_snapshot(&self) -> &[u32] {
        &self.free
    }

    pub fn free_snapshot_mut(&mut self) -> &mut Vec<u32> {
        &mut self.free
    }

    pub fn find_fragmented_files(&self, files: &[FileDescriptor]) -> Vec<FragmentedFile> {
        files
            .iter()
            .filter_map(|descriptor| {
                let chain = self.table.get_cluster_chain(descriptor.starting_cluster);
                is_fragmented(&chain).then(|| FragmentedFile {
                    descriptor: descriptor.clone(),
                    chain,
                })
            })
            .collect()
    }

    /// Copies one cluster's worth of bytes from `src` to `dst`. A no-op if
    /// they're the same cluster.
    pub fn copy_cluster_data(&self, src_index: u32, dst_index: u32) -> Result<()> {
        if src_index == dst_index {
            return Ok(());
        }
        let data = self.table.read_cluster_data(self.storage, &Cluster::new(src_index, 0, 0))?;
        self.storage.write(self.table.cluster_offset(dst_index), &data)
    }

    /// Frees every index in `old_indices`, then links `new_indices` head to
    /// tail, terminating with the end-of-chain marker. The two lists must be
    /// disjoint when the caller needs that invariant; this method does not
    /// enforce it.
    pub fn update_fat(&mut self, old_indices: &[u32], new_indices: &[u32]) {
        for &index in old_indices {
            self.table.set_next(index, 0);
        }
        for window in new_indices.windows(2) {
            self.table.set_next(window[0], window[1]);
        }
        if let Some(&last) = new_indices.last() {
            self.table.set_next(last, END_OF_CHAIN_MARKER);
        }
    }

    pub fn update_directory_entry(
        &self,
        parser: &DirectoryParser,
        root_cluster: u32,
        path: &str,
        new_start: u32,
    ) -> Result<()> {
        parser.update_starting_cluster(root_cluster, path, new_start)
    }

    /// Serialises the in-memory table back to every FAT copy on disk.
    pub fn write_fat(&self) -> Result<()> {
        self.table.write_fat(self.storage, self.table.bpb().num_fats)
    }
}
