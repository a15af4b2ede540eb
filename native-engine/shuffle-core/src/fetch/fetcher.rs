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

//! The reduce-side admission loop: one instance per output partition, run to
//! completion on a single task. It never fetches anything itself — it only
//! decides, each cycle, how many more producers it can afford to reserve and
//! hands each one off to the bounded pool as a Shuffle Client Task.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use hyper::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::conf::ShuffleConf;
use crate::fetch::bitset::ReducerState;
use crate::fetch::client::{run_client_task, MapOutputLocation};
use crate::pool::BoundedPool;

/// Drives one output partition's fetch to completion and returns its
/// combined key-value map. `locations` must list every producer for this
/// shuffle, indexed by map id.
pub async fn fetch_output_partition<K, C>(
    conf: &ShuffleConf,
    shuffle_id: u64,
    out_part: usize,
    locations: Vec<MapOutputLocation>,
    merge_combiners: Arc<dyn Fn(C, C) -> C + Send + Sync>,
) -> HashMap<K, C>
where
    K: Eq + Hash + DeserializeOwned + Send + Sync + 'static,
    C: DeserializeOwned + Send + Sync + 'static,
{
    let total_splits = locations.len();
    let mut state: Arc<ReducerState<K, C>> = Arc::new(ReducerState::new(total_splits));
    let pool = BoundedPool::new(conf.max_connections());
    let client = Client::new();
    let min_knock_interval = Duration::from_millis(conf.min_knock_interval_ms());

    while !state.is_complete() {
        let room = conf
            .max_connections()
            .saturating_sub(pool.active_count())
            .min(total_splits);

        for _ in 0..room {
            let guard = match state.select_random_split() {
                Some(guard) => guard,
                None => break,
            };
            let location = locations[guard.producer()].clone();
            let client = client.clone();
            let state = state.clone();
            let merge_combiners = merge_combiners.clone();
            pool.submit(run_client_task(
                client,
                shuffle_id,
                out_part,
                location,
                state,
                merge_combiners,
                guard,
            ));
        }

        if state.is_complete() {
            break;
        }
        tokio::time::sleep(min_knock_interval).await;
    }

    // is_complete() can flip true an instant before the client task that
    // flipped it has actually returned (and with it, dropped its clone of
    // `state` and its guard). Drain the pool before reclaiming sole
    // ownership so the Arc below is never contested.
    while pool.active_count() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    loop {
        match Arc::try_unwrap(state) {
            Ok(state) => return state.into_combiners(),
            Err(still_shared) => {
                state = still_shared;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }
}
