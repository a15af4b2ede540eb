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

//! The Shuffle Client Task: a one-shot fetch unit. Each invocation either
//! learns a producer's block count, or pulls exactly one block from it —
//! never both in a way that blocks on more than one round trip, and never
//! more than one block, so that the fetcher's admission loop stays in
//! control of concurrency.
//!
//! Every exit path — the two early-return failure cases and the two success
//! cases — passes through the same `finally`-equivalent: `guard` (an
//! [`InFlightGuard`]) is dropped exactly once, which is the only thing that
//! ever clears the in-flight bit.

use std::hash::Hash;
use std::io::Cursor;
use std::sync::Arc;

use hyper::client::HttpConnector;
use hyper::Client;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::error::{FetchTarget, ShuffleError};
use crate::fetch::bitset::{InFlightGuard, ReducerState};
use crate::id;

/// One producer's advertised fetch endpoint, as collected by the driver.
#[derive(Debug, Clone)]
pub struct MapOutputLocation {
    pub map_id: usize,
    pub server_uri: String,
}

/// Runs one Shuffle Client Task against the producer `guard` reserved.
/// Never returns an `Err`: fetch failures are logged and simply mean this
/// attempt made no progress, per the error-handling disposition table —
/// the fetcher will reselect the same producer on a later admission cycle.
pub async fn run_client_task<K, C>(
    client: Client<HttpConnector>,
    shuffle_id: u64,
    out_part: usize,
    location: MapOutputLocation,
    state: Arc<ReducerState<K, C>>,
    merge_combiners: Arc<dyn Fn(C, C) -> C + Send + Sync>,
    guard: InFlightGuard<K, C>,
) where
    K: Eq + Hash + DeserializeOwned + Send + Sync + 'static,
    C: DeserializeOwned + Send + Sync + 'static,
{
    let producer = guard.producer();
    debug_assert_eq!(producer, location.map_id);
    let _guard = guard; // released on drop at the end of this function

    if state.total_blocks(producer) < 0 {
        match fetch_sidecar(&client, shuffle_id, out_part, &location).await {
            Ok(count) => state.set_total_blocks(producer, count),
            Err(e) => {
                log::warn!(
                    "sidecar fetch failed for producer {producer} ({}): {e}",
                    location.server_uri
                );
                return;
            }
        }
    }

    // A producer that emitted zero blocks for this output partition (the
    // empty-input-partition boundary case) has nothing to fetch: there is no
    // `<outPart>-0` file to request. Mark it done on the same task that
    // learns `totalBlocksInSplit[p] == 0` rather than falling through to a
    // block fetch that can only 404.
    if state.has_blocks(producer) == state.total_blocks(producer) {
        state.mark_done(producer);
        return;
    }

    let block_seq = state.has_blocks(producer) as u64;
    let records = match fetch_block::<K, C>(&client, shuffle_id, out_part, &location, block_seq).await {
        Ok(records) => records,
        Err(e) => {
            log::warn!(
                "block fetch failed for producer {producer} block {block_seq} ({}): {e}",
                location.server_uri
            );
            return;
        }
    };

    for (key, combiner) in records {
        let merge = merge_combiners.clone();
        state.merge_combiner(key, combiner, move |a, b| merge(a, b));
    }

    let consumed = state.advance_has_blocks(producer);
    if consumed == state.total_blocks(producer) {
        state.mark_done(producer);
    }
}

async fn fetch_sidecar(
    client: &Client<HttpConnector>,
    shuffle_id: u64,
    out_part: usize,
    location: &MapOutputLocation,
) -> crate::error::Result<i64> {
    let uri: hyper::Uri = id::block_count_url(&location.server_uri, shuffle_id, location.map_id, out_part).parse()?;
    let resp = client.get(uri.clone()).await?;
    if !resp.status().is_success() {
        return Err(ShuffleError::FetchFailed {
            what: FetchTarget::BlockCount,
            uri: uri.to_string(),
            status: resp.status(),
        });
    }
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let mut cursor = Cursor::new(bytes);
    let count: u64 = codec::read_record(&mut cursor)?.ok_or_else(|| {
        ShuffleError::Other(format!("empty block-count sidecar body from {uri}"))
    })?;
    Ok(count as i64)
}

async fn fetch_block<K, C>(
    client: &Client<HttpConnector>,
    shuffle_id: u64,
    out_part: usize,
    location: &MapOutputLocation,
    block_seq: u64,
) -> crate::error::Result<Vec<(K, C)>>
where
    K: DeserializeOwned,
    C: DeserializeOwned,
{
    let uri: hyper::Uri =
        id::block_url(&location.server_uri, shuffle_id, location.map_id, out_part, block_seq).parse()?;
    let resp = client.get(uri.clone()).await?;
    if !resp.status().is_success() {
        return Err(ShuffleError::FetchFailed {
            what: FetchTarget::Block,
            uri: uri.to_string(),
            status: resp.status(),
        });
    }
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let mut cursor = Cursor::new(bytes);
    let mut records = Vec::new();
    while let Some(record) = codec::read_record::<_, (K, C)>(&mut cursor)? {
        records.push(record);
    }
    Ok(records)
}
