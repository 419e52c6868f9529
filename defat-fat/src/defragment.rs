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

//! Drives relocation of every fragmented file using Best-Fit allocation.

use log::info;

use crate::cluster_manager::ClusterManager;
use crate::dir::DirectoryParser;
use defat_err::{AllocationError, Error, Result};

/// Sorts the free-cluster snapshot ascending, partitions it into maximal
/// runs of consecutive indices, and picks the shortest run that still fits
/// `requested` clusters (ties broken by the smallest starting index, which
/// falls out of ascending order naturally). Returns the first `requested`
/// indices of that run and removes them from `free`.
pub fn allocate_clusters(free: &mut Vec<u32>, requested: usize) -> Result<Vec<u32>> {
    let mut sorted = free.clone();
    sorted.sort_unstable();

    let mut runs: Vec<Vec<u32>> = Vec::new();
    for index in sorted {
        match runs.last_mut() {
            Some(run) if *run.last().unwrap() + 1 == index => run.push(index),
            _ => runs.push(vec![index]),
        }
    }

    let largest = runs.iter().map(Vec::len).max().unwrap_or(0);
    let best = runs
        .into_iter()
        .filter(|run| run.len() >= requested)
        .min_by_key(|run| run.len() - requested);

    let Some(run) = best else {
        return Err(Error::Allocation(AllocationError { requested, largest }));
    };

    let chosen: Vec<u32> = run[..requested].to_vec();
    free.retain(|index| !chosen.contains(index));
    Ok(chosen)
}

/// Relocates every fragmented file's data into a contiguous run, in
/// directory-traversal order. Flushes the FAT once at the end.
pub fn defragment(
    storage: &dyn defat_storage::DataStorage,
    root_cluster: u32,
) -> Result<Vec<String>> {
    let bpb = crate::bpb::Bpb::read(storage)?;
    let mut table = crate::fat_table::ClusterTable::read(storage, bpb)?;

    let parser = DirectoryParser::new(storage, &table);
    let files = parser.get_all_files(root_cluster);
    let mut manager = ClusterManager::new(storage, &mut table);
    let fragmented = manager.find_fragmented_files(&files);

    let mut relocated = Vec::new();
    for file in &fragmented {
        let old_indices: Vec<u32> = file.chain.iter().map(|c| c.index).collect();
        let new_indices = allocate_clusters(manager.free_snapshot_mut(), old_indices.len())?;

        for (&old, &new) in old_indices.iter().zip(&new_indices) {
            manager.copy_cluster_data(old, new)?;
        }
        manager.update_fat(&old_indices, &new_indices);

        let parser = DirectoryParser::new(storage, manager.table());
        manager.update_directory_entry(&parser, root_cluster, &file.descriptor.path, new_indices[0])?;

        info!("defragmented {} ({} clusters)", file.descriptor.path, new_indices.len());
        relocated.push(file.descriptor.path.clone());
    }

    manager.write_fat()?;
    Ok(relocated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_fit_picks_the_smallest_sufficient_run() {
        let mut free = vec![
            0, 1, 2, // run of 3
            10, 11, 12, 13, 14, // run of 5
            30, 31, 32, 33, 34, 35, 36, // run of 7
            50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, // run of 12
        ];
        let chosen = allocate_clusters(&mut free, 4).unwrap();
        assert_eq!(chosen, vec![10, 11, 12, 13]);
        assert!(!free.contains(&10));
        assert!(free.contains(&14));
    }

    #[test]
    fn allocation_fails_when_no_run_is_long_enough() {
        let mut free = vec![0, 1, 10, 11];
        let err = allocate_clusters(&mut free, 3).unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
    }

    #[test]
    fn already_contiguous_chain_is_not_fragmented() {
        use crate::cluster::Cluster;
        use crate::cluster_manager::is_fragmented;

        let chain = vec![
            Cluster::new(10, 11, 0),
            Cluster::new(11, 12, 0),
            Cluster::new(12, 0x0FFF_FFFF, 0),
        ];
        assert!(!is_fragmented(&chain));
    }
}
