// Copyright 2022 The Blaze Authors
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

//! Shuffle id allocation and the on-disk / fetch-url path conventions.
//!
//! The path layout is part of the wire contract and must not change
//! independently on the writer and reader sides:
//!
//! ```text
//! <root>/shuffle/<shuffleId>/<mapId>/<outPart>-<blockSeq>
//! <root>/shuffle/<shuffleId>/<mapId>/BLOCKNUM-<outPart>
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonically increasing shuffle id allocator. Ids are never
/// reused even across shuffles that never executed (allocation is the only
/// side effect).
#[derive(Debug, Default)]
pub struct ShuffleIdAllocator {
    next: AtomicU64,
}

impl ShuffleIdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn new_shuffle_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Relative path, under the local shuffle directory, for one block file.
pub fn block_relative_path(shuffle_id: u64, map_id: usize, out_part: usize, block_seq: u64) -> String {
    format!("shuffle/{shuffle_id}/{map_id}/{out_part}-{block_seq}")
}

/// Relative path, under the local shuffle directory, for the block-count sidecar.
pub fn block_count_relative_path(shuffle_id: u64, map_id: usize, out_part: usize) -> String {
    format!("shuffle/{shuffle_id}/{map_id}/BLOCKNUM-{out_part}")
}

/// Absolute on-disk path for one block file.
pub fn block_path(root: &Path, shuffle_id: u64, map_id: usize, out_part: usize, block_seq: u64) -> PathBuf {
    root.join(block_relative_path(shuffle_id, map_id, out_part, block_seq))
}

/// Absolute on-disk path for the block-count sidecar.
pub fn block_count_path(root: &Path, shuffle_id: u64, map_id: usize, out_part: usize) -> PathBuf {
    root.join(block_count_relative_path(shuffle_id, map_id, out_part))
}

/// Directory holding every block and the sidecar for one (shuffleId, mapId).
pub fn map_output_dir(root: &Path, shuffle_id: u64, map_id: usize) -> PathBuf {
    root.join("shuffle").join(shuffle_id.to_string()).join(map_id.to_string())
}

/// Fetch URL for one block file, rooted at a producer's `serverUri`.
pub fn block_url(server_uri: &str, shuffle_id: u64, map_id: usize, out_part: usize, block_seq: u64) -> String {
    format!(
        "{}/{}",
        server_uri.trim_end_matches('/'),
        block_relative_path(shuffle_id, map_id, out_part, block_seq)
    )
}

/// Fetch URL for the block-count sidecar, rooted at a producer's `serverUri`.
pub fn block_count_url(server_uri: &str, shuffle_id: u64, map_id: usize, out_part: usize) -> String {
    format!(
        "{}/{}",
        server_uri.trim_end_matches('/'),
        block_count_relative_path(shuffle_id, map_id, out_part)
    )
}
