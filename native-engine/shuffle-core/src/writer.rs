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

//! Map-side writer: hash-partitions one input partition into buckets,
//! in-memory combines per key, and flushes each bucket as an ordered
//! sequence of size-bounded blocks plus a block-count sidecar.
//!
//! Any I/O failure here is fatal for the map task (no partial advertisement
//! is permitted, because the sidecar would then be inconsistent with the
//! block files actually on disk) — callers should not attempt to publish
//! `(mapId, serverUri)` for a map task whose writer returned `Err`.

use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::hashing::bucket_for_key;
use crate::{codec, id};

/// Writes one map task's output, partitioned into `num_output_splits`
/// buckets, to on-disk blocks plus a sidecar per bucket.
pub fn write_map_output<K, V, C>(
    root: &Path,
    shuffle_id: u64,
    map_id: usize,
    input: impl IntoIterator<Item = (K, V)>,
    num_output_splits: usize,
    block_size_bytes: u64,
    mut create_combiner: impl FnMut(V) -> C,
    mut merge_value: impl FnMut(C, V) -> C,
) -> Result<()>
where
    K: Hash + Eq + Serialize,
    C: Serialize,
{
    let mut buckets: Vec<HashMap<K, C>> = (0..num_output_splits).map(|_| HashMap::new()).collect();

    for (k, v) in input {
        let bucket_id = bucket_for_key(&k, num_output_splits);
        let bucket = &mut buckets[bucket_id];
        if let Some(existing) = bucket.remove(&k) {
            let merged = merge_value(existing, v);
            bucket.insert(k, merged);
        } else {
            let combined = create_combiner(v);
            bucket.insert(k, combined);
        }
    }

    let out_dir = id::map_output_dir(root, shuffle_id, map_id);
    std::fs::create_dir_all(&out_dir)?;

    for (out_part, bucket) in buckets.into_iter().enumerate() {
        let block_count = flush_bucket(root, shuffle_id, map_id, out_part, bucket, block_size_bytes)?;

        let sidecar_path = id::block_count_path(root, shuffle_id, map_id, out_part);
        let mut sidecar = File::create(sidecar_path)?;
        codec::write_record(&mut sidecar, &block_count)?;
    }

    Ok(())
}

/// Streams one bucket's entries to block files in iteration order, opening a
/// new file whenever the previous one crossed `block_size_bytes`, and
/// returns the number of block files written (`B`).
fn flush_bucket<K, C>(
    root: &Path,
    shuffle_id: u64,
    map_id: usize,
    out_part: usize,
    bucket: HashMap<K, C>,
    block_size_bytes: u64,
) -> Result<u64>
where
    K: Serialize,
    C: Serialize,
{
    let mut blocks_closed: u64 = 0;
    let mut current: Option<BufWriter<File>> = None;

    for (k, c) in bucket {
        if current.is_none() {
            let path = id::block_path(root, shuffle_id, map_id, out_part, blocks_closed);
            current = Some(BufWriter::new(File::create(path)?));
        }
        let writer = current.as_mut().expect("just ensured present");
        codec::write_record(writer, &(k, c))?;
        writer.flush()?;

        let len = writer.get_ref().metadata()?.len();
        if len > block_size_bytes {
            current.take();
            blocks_closed += 1;
        }
    }

    if current.take().is_some() {
        blocks_closed += 1;
    }

    Ok(blocks_closed)
}
