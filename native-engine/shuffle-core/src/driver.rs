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

//! Ties the map-side writer and the reduce-side fetcher together for a
//! single shuffle: runs every map task, collects the `(mapId, serverUri)`
//! pairs each one advertises, then drives one fetcher per output partition
//! concurrently.
//!
//! This module has no counterpart of its own in the wire contract — it is
//! the glue a caller would otherwise have to write by hand around
//! [`crate::writer`] and [`crate::fetch::fetcher`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::conf::ShuffleConf;
use crate::fetch::client::MapOutputLocation;
use crate::fetch::fetcher::fetch_output_partition;
use crate::store::LocalShuffleStore;

/// Runs `map_inputs` as independent map tasks against `store`, partitioning
/// each into `num_output_splits` buckets, then fetches and combines every
/// output partition. Returns one combiner map per output partition, indexed
/// by partition number.
///
/// Map tasks run on the blocking thread pool (partitioning and disk I/O are
/// synchronous); fetchers run as ordinary async tasks, one per output
/// partition, concurrently with each other.
#[allow(clippy::too_many_arguments)]
pub async fn run_shuffle<K, V, C>(
    store: Arc<LocalShuffleStore>,
    conf: Arc<ShuffleConf>,
    shuffle_id: u64,
    map_inputs: Vec<Vec<(K, V)>>,
    num_output_splits: usize,
    create_combiner: impl Fn(V) -> C + Send + Sync + Clone + 'static,
    merge_value: impl Fn(C, V) -> C + Send + Sync + Clone + 'static,
    merge_combiners: impl Fn(C, C) -> C + Send + Sync + 'static,
) -> crate::error::Result<Vec<HashMap<K, C>>>
where
    K: Hash + Eq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Send + 'static,
    C: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let block_size_bytes = conf.block_size_bytes();
    let mut map_handles = Vec::with_capacity(map_inputs.len());

    for (map_id, input) in map_inputs.into_iter().enumerate() {
        let root = store.root().to_path_buf();
        let create_combiner = create_combiner.clone();
        let merge_value = merge_value.clone();
        let handle = tokio::task::spawn_blocking(move || {
            crate::writer::write_map_output(
                &root,
                shuffle_id,
                map_id,
                input,
                num_output_splits,
                block_size_bytes,
                create_combiner,
                merge_value,
            )
        });
        map_handles.push((map_id, handle));
    }

    let mut locations = Vec::with_capacity(map_handles.len());
    for (map_id, handle) in map_handles {
        handle
            .await
            .map_err(|e| crate::error::ShuffleError::Other(format!("map task {map_id} panicked: {e}")))??;
        locations.push(MapOutputLocation {
            map_id,
            server_uri: store.server_uri().to_string(),
        });
    }

    let merge_combiners: Arc<dyn Fn(C, C) -> C + Send + Sync> = Arc::new(merge_combiners);

    let mut fetch_futures = Vec::with_capacity(num_output_splits);
    for out_part in 0..num_output_splits {
        let conf = conf.clone();
        let locations = locations.clone();
        let merge_combiners = merge_combiners.clone();
        fetch_futures.push(async move {
            fetch_output_partition(&conf, shuffle_id, out_part, locations, merge_combiners).await
        });
    }

    Ok(futures::future::join_all(fetch_futures).await)
}
