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

//! Directory parser: per-entry decoding, long-name assembly, whole-tree
//! traversal, and the path-indexed lookup used to rewrite an entry's first
//! cluster in place.

use log::warn;

use crate::cluster::MIN_VALID_INDEX;
use crate::fat_table::ClusterTable;
use defat_err::{ChainError, Error, Result};
use defat_storage::DataStorage;

pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;

const ENTRY_SIZE: usize = 32;
const ENTRY_END: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;

/// A directory-entry projection: what the traversal and lookup functions
/// hand back, not a type persisted anywhere.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: String,
    pub starting_cluster: u32,
    pub size: u32,
    pub attributes: u8,
}

struct RawEntry {
    name: String,
    attributes: u8,
    starting_cluster: u32,
    size: u32,
}

/// Decodes `entry`, folding any pending LFN fragments in `lfn_buffer` into
/// the assembled name. Returns `None` for LFN fragments (which only update
/// `lfn_buffer`) and for `.`/`..`.
fn parse_entry(entry: &[u8], lfn_buffer: &mut Vec<String>) -> Option<RawEntry> {
    let attributes = entry[11];
    if attributes == ATTR_LONG_NAME {
        lfn_buffer.insert(0, decode_lfn_fragment(entry));
        return None;
    }

    let name = if !lfn_buffer.is_empty() {
        let joined: String = lfn_buffer.drain(..).collect();
        joined.chars().filter(|c| is_printable(*c)).collect()
    } else {
        decode_short_name(entry)
    };

    if name == "." || name == ".." {
        return None;
    }

    let high = u16::from_le_bytes([entry[20], entry[21]]) as u32;
    let low = u16::from_le_bytes([entry[26], entry[27]]) as u32;
    let starting_cluster = (high << 16) | low;
    let size = u32::from_le_bytes([entry[28], entry[29], entry[30], entry[31]]);

    Some(RawEntry { name, attributes, starting_cluster, size })
}

fn decode_short_name(entry: &[u8]) -> String {
    let name = String::from_utf8_lossy(&entry[0..8]).trim_end().to_string();
    let extension = String::from_utf8_lossy(&entry[8..11]).trim_end().to_string();
    if extension.is_empty() {
        name
    } else {
        format!("{name}.{extension}")
    }
}

fn decode_lfn_fragment(entry: &[u8]) -> String {
    let units: Vec<u16> = [1..11, 14..26, 28..32]
        .into_iter()
        .flat_map(|range| entry[range].chunks_exact(2))
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&u| u != 0x0000 && u != 0xFFFF)
        .collect();
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Mirrors Python's `str.isprintable()`: false for category Other (control,
/// format, surrogate, private-use, unassigned) and Separator, except the
/// ASCII space. `char::is_control` only covers Cc, so format characters
/// (soft hyphen, zero-width space, bidi marks) and non-ASCII separators
/// (NBSP, line/paragraph separator, ideographic space) are checked by hand.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() {
        return false;
    }
    const NON_PRINTABLE: &[(u32, u32)] = &[
        (0x00AD, 0x00AD),  // soft hyphen (Cf)
        (0x0600, 0x0605),  // Arabic number signs (Cf)
        (0x061C, 0x061C),  // Arabic letter mark (Cf)
        (0x06DD, 0x06DD),  // Arabic end of ayah (Cf)
        (0x070F, 0x070F),  // Syriac abbreviation mark (Cf)
        (0x180E, 0x180E),  // Mongolian vowel separator (Cf)
        (0x200B, 0x200F),  // zero-width space/joiners, LTR/RTL marks (Cf)
        (0x202A, 0x202E),  // bidi embedding/override controls (Cf)
        (0x2060, 0x2064),  // word joiner, invisible operators (Cf)
        (0x2066, 0x206F),  // bidi isolates, deprecated format chars (Cf)
        (0xFEFF, 0xFEFF),  // byte order mark (Cf)
        (0xFFF9, 0xFFFB),  // interlinear annotation marks (Cf)
        (0x00A0, 0x00A0),  // no-break space (Zs)
        (0x1680, 0x1680),  // ogham space mark (Zs)
        (0x2000, 0x200A),  // en/em spaces etc. (Zs)
        (0x2028, 0x2028),  // line separator (Zl)
        (0x2029, 0x2029),  // paragraph separator (Zp)
        (0x202F, 0x202F),  // narrow no-break space (Zs)
        (0x205F, 0x205F),  // medium mathematical space (Zs)
        (0x3000, 0x3000),  // ideographic space (Zs)
    ];
    let code = c as u32;
    !NON_PRINTABLE.iter().any(|&(lo, hi)| code >= lo && code <= hi)
}

/// Scans one directory cluster's worth of bytes, returning the entries found
/// and whether scanning should stop (an `0x00` first byte was hit).
fn entries_in_cluster(cluster_data: &[u8]) -> (Vec<RawEntry>, bool) {
    let mut entries = Vec::new();
    let mut lfn_buffer = Vec::new();

    for chunk in cluster_data.chunks_exact(ENTRY_SIZE) {
        match chunk[0] {
            ENTRY_END => return (entries, true),
            ENTRY_DELETED => {
                lfn_buffer.clear();
                continue;
            }
            _ => {}
        }
        if let Some(entry) = parse_entry(chunk, &mut lfn_buffer) {
            entries.push(entry);
        }
    }
    (entries, false)
}

pub struct DirectoryParser<'a> {
    storage: &'a dyn DataStorage,
    table: &'a ClusterTable,
}

impl<'a> DirectoryParser<'a> {
    pub fn new(storage: &'a dyn DataStorage, table: &'a ClusterTable) -> Self {
        Self { storage, table }
    }

    /// Depth-first traversal producing one descriptor per non-directory
    /// entry with a valid, non-zero starting cluster.
    pub fn get_all_files(&self, root_cluster: u32) -> Vec<FileDescriptor> {
        let mut out = Vec::new();
        self.traverse(root_cluster, String::new(), &mut out);
        out
    }

    fn traverse(&self, dir_cluster: u32, path_prefix: String, out: &mut Vec<FileDescriptor>) {
        for cluster in self.table.get_cluster_chain(dir_cluster) {
            let data = match self.table.read_cluster_data(self.storage, &cluster) {
                Ok(data) => data,
                Err(_) => continue,
            };
            let (entries, stop) = entries_in_cluster(&data);
            for entry in entries {
                if entry.starting_cluster == 0 {
                    continue;
                }
                if entry.starting_cluster < MIN_VALID_INDEX
                    || entry.starting_cluster as usize >= self.table.len()
                {
                    warn!(
                        "{}",
                        ChainError::InvalidStartCluster {
                            cluster: entry.starting_cluster,
                            path: entry.name.clone(),
                        }
                    );
                    continue;
                }

                let file_path = if path_prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{path_prefix}/{}", entry.name)
                };

                if entry.attributes & ATTR_DIRECTORY != 0 {
                    self.traverse(entry.starting_cluster, file_path, out);
                } else {
                    out.push(FileDescriptor {
                        path: file_path,
                        starting_cluster: entry.starting_cluster,
                        size: entry.size,
                        attributes: entry.attributes,
                    });
                }
            }
            if stop {
                break;
            }
        }
    }

    /// Returns the byte offset of `target_name`'s 32-byte record within the
    /// image, and the cluster that holds it, scanning `dir_cluster`'s chain
    /// case-insensitively.
    pub fn find_directory_entry(&self, dir_cluster: u32, target_name: &str) -> Option<(u64, u32)> {
        for cluster in self.table.get_cluster_chain(dir_cluster) {
            let data = match self.table.read_cluster_data(self.storage, &cluster) {
                Ok(data) => data,
                Err(_) => continue,
            };
            let cluster_offset = self.table.cluster_offset(cluster.index);
            let mut lfn_buffer = Vec::new();
            for (i, chunk) in data.chunks_exact(ENTRY_SIZE).enumerate() {
                match chunk[0] {
                    ENTRY_END => break,
                    ENTRY_DELETED => {
                        lfn_buffer.clear();
                        continue;
                    }
                    _ => {}
                }
                if let Some(entry) = parse_entry(chunk, &mut lfn_buffer) {
                    if entry.name.eq_ignore_ascii_case(target_name) {
                        return Some((cluster_offset + (i * ENTRY_SIZE) as u64, cluster.index));
                    }
                }
            }
        }
        None
    }

    fn find_subdirectory_cluster(&self, dir_cluster: u32, subdir_name: &str) -> Option<u32> {
        for cluster in self.table.get_cluster_chain(dir_cluster) {
            let data = self.table.read_cluster_data(self.storage, &cluster).ok()?;
            let (entries, stop) = entries_in_cluster(&data);
            for entry in &entries {
                if entry.attributes & ATTR_DIRECTORY != 0 && entry.name.eq_ignore_ascii_case(subdir_name) {
                    return Some(entry.starting_cluster);
                }
            }
            if stop {
                break;
            }
        }
        None
    }

    /// Resolves every path component but the last, starting from `root_cluster`.
    /// Returns the cluster of the directory containing the final component.
    pub fn navigate_path(&self, root_cluster: u32, parts: &[&str]) -> Option<u32> {
        let mut current = root_cluster;
        for part in &parts[..parts.len().saturating_sub(1)] {
            current = self.find_subdirectory_cluster(current, part)?;
        }
        Some(current)
    }

    /// Navigates to the parent of `path`, locates the entry, and writes the
    /// new first-cluster value as two little-endian 16-bit words at
    /// entry-offset+20 (high) and entry-offset+26 (low), as a single scoped
    /// write. Logs and returns without error if the path does not resolve.
    pub fn update_starting_cluster(&self, root_cluster: u32, path: &str, new_start: u32) -> Result<()> {
        let parts: Vec<&str> = path.split('/').collect();
        let Some(last) = parts.last() else {
            return Err(Error::PathMismatch(path.to_string()));
        };

        let Some(parent_cluster) = self.navigate_path(root_cluster, &parts) else {
            warn!("path '{path}' does not resolve, skipping start-cluster rewrite");
            return Ok(());
        };

        let Some((entry_offset, _)) = self.find_directory_entry(parent_cluster, last) else {
            warn!("entry '{path}' not found, skipping start-cluster rewrite");
            return Ok(());
        };

        let high = ((new_start >> 16) & 0xFFFF) as u16;
        let low = (new_start & 0xFFFF) as u16;
        self.storage.write_many(&[
            (entry_offset + 20, high.to_le_bytes().as_slice()),
            (entry_offset + 26, low.to_le_bytes().as_slice()),
        ])
    }
}
