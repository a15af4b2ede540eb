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

//! Full map-write / fetch-reduce round trips driven through the public API,
//! over a real `hyper` server bound to loopback. Mirrors the boundary
//! scenarios called out for the wire contract: a flapping producer, a
//! multi-block producer, and the `MaxConnections` bound.

use std::collections::HashMap;
use std::sync::Arc;

use blaze_shuffle_core::fetch::client::MapOutputLocation;
use blaze_shuffle_core::fetch::fetcher::fetch_output_partition;
use blaze_shuffle_core::{run_shuffle, LocalShuffleStore, ShuffleConf};

fn init() {
    let _ = env_logger::try_init();
}

fn conf_with_local_dir(overrides: &[(&str, &str)]) -> ShuffleConf {
    let mut values = HashMap::new();
    values.insert(
        "spark.local.dir".to_string(),
        std::env::temp_dir().to_string_lossy().to_string(),
    );
    for (k, v) in overrides {
        values.insert(k.to_string(), v.to_string());
    }
    ShuffleConf::from_map(values)
}

#[tokio::test(flavor = "multi_thread")]
async fn three_map_partitions_combine_deterministically_at_every_reducer() {
    init();
    let conf = Arc::new(conf_with_local_dir(&[("spark.shuffle.minKnockInterval", "5")]));
    let store = Arc::new(LocalShuffleStore::init(&conf).await.unwrap());

    let map_inputs = vec![
        vec![("a".to_string(), 1i64), ("b".to_string(), 1i64), ("c".to_string(), 1i64)],
        vec![("a".to_string(), 2i64), ("b".to_string(), 2i64)],
        vec![("a".to_string(), 3i64)],
    ];

    let results = run_shuffle(store, conf, 0, map_inputs, 4, |v| v, |c, v| c + v, |c1, c2| c1 + c2)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    let mut combined: HashMap<String, i64> = HashMap::new();
    for part in results {
        for (k, v) in part {
            *combined.entry(k).or_insert(0) += v;
        }
    }
    assert_eq!(combined.get("a"), Some(&6));
    assert_eq!(combined.get("b"), Some(&3));
    assert_eq!(combined.get("c"), Some(&1));
}

#[tokio::test(flavor = "multi_thread")]
async fn a_producer_with_many_small_blocks_is_fully_drained() {
    init();
    // Small block size forces several block files per bucket per producer,
    // exercising the has-blocks counter across more than one block.
    let conf = Arc::new(conf_with_local_dir(&[
        ("spark.shuffle.minKnockInterval", "5"),
        ("spark.shuffle.blockSize", "0"), // rounds up to 1 byte threshold per record flush
    ]));
    let store = Arc::new(LocalShuffleStore::init(&conf).await.unwrap());

    let map_inputs = vec![(0..20)
        .map(|i| (format!("k{i}"), i as i64))
        .collect::<Vec<_>>()];

    let results = run_shuffle(store, conf, 1, map_inputs, 1, |v| v, |c, v: i64| c + v, |c1, c2| c1 + c2)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 20);
    for i in 0..20 {
        assert_eq!(results[0].get(&format!("k{i}")), Some(&(i as i64)));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_concurrency_never_exceeds_max_connections_and_all_producers_land() {
    init();
    let conf = Arc::new(conf_with_local_dir(&[
        ("spark.shuffle.maxConnections", "2"),
        ("spark.shuffle.minKnockInterval", "5"),
    ]));
    let store = Arc::new(LocalShuffleStore::init(&conf).await.unwrap());

    let map_inputs: Vec<Vec<(String, i64)>> = (0..6)
        .map(|m| vec![(format!("key-{m}"), m as i64)])
        .collect();

    let results = run_shuffle(store, conf, 2, map_inputs, 1, |v| v, |c, v: i64| c + v, |c1, c2| c1 + c2)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 6);
    for m in 0..6 {
        assert_eq!(results[0].get(&format!("key-{m}")), Some(&(m as i64)));
    }
}

/// A length-prefixed record in the same wire format the writer/fetcher use
/// internally (`codec` is crate-private, so the integration test reproduces
/// just enough of it to stand up a fixture).
fn write_fixture_record<T: serde::Serialize>(file: &mut std::fs::File, value: &T) {
    use std::io::Write;
    let payload = bincode::serialize(value).unwrap();
    file.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
    file.write_all(&payload).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn a_flapping_producer_is_retried_until_its_sidecar_appears() {
    init();
    let tmp = tempfile::tempdir().unwrap();
    let (_tx, rx) = tokio::sync::oneshot::channel();
    let addr = blaze_shuffle_core::server::spawn_embedded_server(tmp.path().to_path_buf(), rx)
        .await
        .unwrap();
    let server_uri = format!("http://{addr}");
    let shuffle_id = 9;
    let out_part = 0;

    let write_producer = |map_id: usize, key: &str, value: i64| {
        let dir = tmp.path().join("shuffle").join(shuffle_id.to_string()).join(map_id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let block_path = dir.join(format!("{out_part}-0"));
        let mut file = std::fs::File::create(&block_path).unwrap();
        write_fixture_record(&mut file, &(key.to_string(), value));
    };
    let write_sidecar = |map_id: usize| {
        let dir = tmp.path().join("shuffle").join(shuffle_id.to_string()).join(map_id.to_string());
        let sidecar_path = dir.join(format!("BLOCKNUM-{out_part}"));
        let mut file = std::fs::File::create(&sidecar_path).unwrap();
        write_fixture_record(&mut file, &1u64);
    };

    // Producers 0 and 2 are immediately complete. Producer 1's block file is
    // in place from the start, but its sidecar is withheld for a couple of
    // admission cycles, so the fetcher's first sidecar fetches against it
    // 404 (a `FetchFailed` disposition, recoverable per the error table) and
    // it only becomes eligible for `DONE` once the sidecar is written.
    write_producer(0, "a", 1);
    write_sidecar(0);
    write_producer(1, "a", 2);
    write_producer(2, "b", 5);
    write_sidecar(2);

    let locations = vec![
        MapOutputLocation { map_id: 0, server_uri: server_uri.clone() },
        MapOutputLocation { map_id: 1, server_uri: server_uri.clone() },
        MapOutputLocation { map_id: 2, server_uri: server_uri.clone() },
    ];
    let conf = conf_with_local_dir(&[
        ("spark.shuffle.maxConnections", "2"),
        ("spark.shuffle.minKnockInterval", "10"),
    ]);

    let delayed_sidecar = async {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        write_sidecar(1);
    };
    let merge: Arc<dyn Fn(i64, i64) -> i64 + Send + Sync> = Arc::new(|a, b| a + b);
    let fetch = fetch_output_partition(&conf, shuffle_id, out_part, locations, merge);

    let (combiners, ()): (HashMap<String, i64>, ()) = tokio::join!(fetch, delayed_sidecar);

    assert_eq!(combiners.get("a"), Some(&3));
    assert_eq!(combiners.get("b"), Some(&5));
}

#[tokio::test(flavor = "multi_thread")]
async fn a_producer_with_an_empty_output_partition_still_completes() {
    init();
    let tmp = tempfile::tempdir().unwrap();
    let (_tx, rx) = tokio::sync::oneshot::channel();
    let addr = blaze_shuffle_core::server::spawn_embedded_server(tmp.path().to_path_buf(), rx)
        .await
        .unwrap();
    let server_uri = format!("http://{addr}");
    let shuffle_id = 11;
    let out_part = 0;

    let map_dir = |map_id: usize| {
        tmp.path().join("shuffle").join(shuffle_id.to_string()).join(map_id.to_string())
    };
    let write_sidecar = |map_id: usize, count: u64| {
        let dir = map_dir(map_id);
        std::fs::create_dir_all(&dir).unwrap();
        let sidecar_path = dir.join(format!("BLOCKNUM-{out_part}"));
        let mut file = std::fs::File::create(&sidecar_path).unwrap();
        write_fixture_record(&mut file, &count);
    };

    // Producer 0 has one record; producer 1 hashed nothing into this output
    // partition (the "Empty input partition" boundary scenario — a sidecar
    // of `0` and no block file at all); producer 2 has one record. A
    // reducer fetching this partition must still terminate with all three
    // producers counted in `hasSplits`, not hang waiting on a `<outPart>-0`
    // file producer 1 never wrote.
    write_sidecar(0, 1);
    {
        let dir = map_dir(0);
        let mut file = std::fs::File::create(dir.join(format!("{out_part}-0"))).unwrap();
        write_fixture_record(&mut file, &("a".to_string(), 1i64));
    }
    write_sidecar(1, 0);
    write_sidecar(2, 1);
    {
        let dir = map_dir(2);
        let mut file = std::fs::File::create(dir.join(format!("{out_part}-0"))).unwrap();
        write_fixture_record(&mut file, &("b".to_string(), 5i64));
    }

    let locations = vec![
        MapOutputLocation { map_id: 0, server_uri: server_uri.clone() },
        MapOutputLocation { map_id: 1, server_uri: server_uri.clone() },
        MapOutputLocation { map_id: 2, server_uri: server_uri.clone() },
    ];
    let conf = conf_with_local_dir(&[("spark.shuffle.minKnockInterval", "5")]);
    let merge: Arc<dyn Fn(i64, i64) -> i64 + Send + Sync> = Arc::new(|a, b| a + b);

    let combiners: HashMap<String, i64> = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        fetch_output_partition(&conf, shuffle_id, out_part, locations, merge),
    )
    .await
    .expect("fetch must terminate even though one producer contributed nothing");

    assert_eq!(combiners.get("a"), Some(&1));
    assert_eq!(combiners.get("b"), Some(&5));
    assert_eq!(combiners.len(), 2);
}
