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

//! Drives scattering of a named file into randomly chosen free clusters,
//! the inverse of defragmentation, for testing and demonstration.

use log::info;
use rand::{thread_rng, Rng};

use crate::cluster::END_OF_CHAIN_MARKER;
use crate::cluster_manager::ClusterManager;
use crate::dir::DirectoryParser;
use defat_err::{Error, Result};
use defat_storage::DataStorage;

/// Locates `target_path` by exact match, checks it has at least two
/// clusters, scatters its data into randomly chosen free clusters, and
/// rewrites the directory entry and FAT accordingly.
pub fn fragment(storage: &dyn DataStorage, root_cluster: u32, target_path: &str) -> Result<()> {
    let bpb = crate::bpb::Bpb::read(storage)?;
    let mut table = crate::fat_table::ClusterTable::read(storage, bpb)?;

    let parser = DirectoryParser::new(storage, &table);
    let files = parser.get_all_files(root_cluster);
    let descriptor = files
        .iter()
        .find(|f| f.path == target_path)
        .ok_or_else(|| Error::NotFound(target_path.to_string()))?;

    let chain = table.get_cluster_chain(descriptor.starting_cluster);
    if chain.len() < 2 {
        return Err(Error::TooSmall(target_path.to_string()));
    }
    let old_indices: Vec<u32> = chain.iter().map(|c| c.index).collect();

    let mut manager = ClusterManager::new(storage, &mut table);
    let free = manager.free_snapshot_mut();
    let mut rng = thread_rng();
    let mut new_indices = Vec::with_capacity(old_indices.len());
    for _ in &old_indices {
        if free.is_empty() {
            return Err(Error::Allocation(defat_err::AllocationError {
                requested: old_indices.len(),
                largest: 0,
            }));
        }
        let pick_pos = rng.gen_range(0..free.len());
        new_indices.push(free.remove(pick_pos));
    }

    for (&old, &new) in old_indices.iter().zip(&new_indices) {
        manager.copy_cluster_data(old, new)?;
    }

    // Free the old clusters, then link the new chain head-to-tail ending in
    // the end marker. Writing both steps through update_fat keeps this in
    // one place rather than re-deriving the linking logic here.
    manager.update_fat(&old_indices, &new_indices);
    debug_assert_eq!(
        manager.table().get(*new_indices.last().unwrap()).unwrap().next_index,
        END_OF_CHAIN_MARKER
    );

    let parser = DirectoryParser::new(storage, manager.table());
    manager.update_directory_entry(&parser, root_cluster, target_path, new_indices[0])?;

    manager.write_fat()?;
    info!("fragmented {target_path} across {} clusters", new_indices.len());
    Ok(())
}
