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

//! File-backed [`DataStorage`].
//!
//! Every call opens its own handle and lets it drop at the end of the call,
//! rather than holding one handle for the lifetime of the storage object.
//! This matches the engine's resource model (see the crate-level docs of
//! `defat_fat`): reads use a read-only handle, writes use a writable handle
//! scoped to a single mutation, and nothing is held across operations.

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use defat_storage::{DataStorage, Result};

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataStorage for FileStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let file = File::open(&self.path)?;
        file.read_exact_at(buffer, offset)?;
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.write_all_at(buffer, offset)?;
        file.sync_all()?;
        Ok(())
    }

    fn write_many(&self, writes: &[(u64, &[u8])]) -> Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        for (offset, buffer) in writes {
            file.write_all_at(buffer, *offset)?;
        }
        file.sync_all()?;
        Ok(())
    }
}
