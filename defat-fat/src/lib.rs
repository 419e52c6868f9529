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

//! A cluster-allocation, relocation, and FAT-chain rewriting engine for
//! FAT32 filesystem images.
//!
//! The image is mutated in place; this crate has no notion of creating,
//! deleting, or resizing files, and no transactional persistence — a caller
//! that wants a safety net copies the image before calling [`defragment`] or
//! [`fragment`].
//!
//! # Resource model
//!
//! Everything here is single-threaded and synchronous. The engine never
//! assumes it owns a long-lived handle on the backing image: reads go
//! through read-only handles opened and released per call, and writes use a
//! single writable handle scoped to one logical mutation (possibly several
//! positioned writes, via [`defat_storage::DataStorage::write_many`]),
//! closed on return whether that call succeeds or fails. See
//! `defat_storage_std::FileStorage` for the concrete implementation this
//! engine is tested against.
//!
//! # Flow
//!
//! [`bpb::Bpb`] decodes the geometry once, [`fat_table::ClusterTable`] loads
//! the in-memory FAT mirror, [`dir::DirectoryParser`] walks from the root
//! cluster producing [`dir::FileDescriptor`]s, [`cluster_manager`] identifies
//! which are fragmented, and [`defragment`] or [`fragment`] mutate the
//! cluster table and image before a single FAT flush.

pub mod bpb;
pub mod cluster;
pub mod cluster_manager;
pub mod defragment;
pub mod dir;
pub mod fat_table;
pub mod fragment;

pub use bpb::Bpb;
pub use cluster::Cluster;
pub use cluster_manager::{is_fragmented, ClusterManager, FragmentedFile};
pub use defragment::defragment;
pub use dir::{DirectoryParser, FileDescriptor};
pub use fat_table::ClusterTable;
pub use fragment::fragment;
