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

//! Byte-addressable storage abstraction.
//!
//! The engine never assumes its backing store is a `std::fs::File` opened on
//! a real path — it only needs positioned reads and writes. This lets the
//! same cluster-table and directory logic run against a plain file, a
//! `Vec<u8>`-backed fixture in tests, or a block device.

pub use defat_err::Result;

pub trait DataStorage {
    /// Reads `buffer.len()` bytes starting at `offset`. Short reads are an error.
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    /// Writes all of `buffer` starting at `offset`.
    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()>;

    /// Performs every write in `writes` as one logical mutation: a scoped
    /// implementation opens a single writable handle for all of them and
    /// releases it when this call returns, on success or failure.
    ///
    /// The default applies each write independently and is only correct for
    /// backends where a "handle" carries no cost or meaning (e.g. in-memory
    /// fixtures); [`DataStorage`] implementations backed by a real file
    /// should override this.
    fn write_many(&self, writes: &[(u64, &[u8])]) -> Result<()> {
        for (offset, buffer) in writes {
            self.write(*offset, buffer)?;
        }
        Ok(())
    }
}
