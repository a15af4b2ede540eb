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

//! Per-reducer transient state: the two per-producer bitsets, per-producer
//! block counters, and the shared combiner map.
//!
//! The "done" and "in flight" bitsets are kept under a single `parking_lot`
//! mutex rather than one each. [`ReducerState::select_random_split`] must
//! read both and set a bit in one indivisible step — reading them under two
//! separate locks would reopen exactly the race ("no producer is ever
//! simultaneously requested by two client tasks") the dual-bitset design
//! exists to prevent. See DESIGN.md for this decision. `combiners` keeps its
//! own, independent lock, since it is never read or written together with
//! the bitsets in one critical section.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;

struct SplitBits {
    done: Vec<bool>,
    in_flight: Vec<bool>,
}

pub struct ReducerState<K, C> {
    total_splits: usize,
    has_splits: AtomicUsize,
    bits: Mutex<SplitBits>,
    total_blocks_in_split: Vec<AtomicI64>,
    has_blocks_in_split: Vec<AtomicI64>,
    combiners: Mutex<HashMap<K, C>>,
}

/// Clears a producer's in-flight bit on drop, regardless of how the client
/// task exited (success, early return on error, or cancellation). Owns an
/// `Arc` rather than borrowing so it can be moved into a `'static` spawned
/// task alongside the state it guards.
pub struct InFlightGuard<K, C> {
    state: Arc<ReducerState<K, C>>,
    producer: usize,
}

impl<K, C> Drop for InFlightGuard<K, C> {
    fn drop(&mut self) {
        self.state.release_in_flight(self.producer);
    }
}

impl<K, C> ReducerState<K, C>
where
    K: Eq + Hash,
{
    pub fn new(total_splits: usize) -> Self {
        Self {
            total_splits,
            has_splits: AtomicUsize::new(0),
            bits: Mutex::new(SplitBits {
                done: vec![false; total_splits],
                in_flight: vec![false; total_splits],
            }),
            total_blocks_in_split: (0..total_splits).map(|_| AtomicI64::new(-1)).collect(),
            has_blocks_in_split: (0..total_splits).map(|_| AtomicI64::new(0)).collect(),
            combiners: Mutex::new(HashMap::new()),
        }
    }

    pub fn total_splits(&self) -> usize {
        self.total_splits
    }

    pub fn has_splits(&self) -> usize {
        self.has_splits.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.has_splits() >= self.total_splits
    }

    pub fn total_blocks(&self, producer: usize) -> i64 {
        self.total_blocks_in_split[producer].load(Ordering::SeqCst)
    }

    pub fn set_total_blocks(&self, producer: usize, value: i64) {
        self.total_blocks_in_split[producer].store(value, Ordering::SeqCst);
    }

    pub fn has_blocks(&self, producer: usize) -> i64 {
        self.has_blocks_in_split[producer].load(Ordering::SeqCst)
    }

    pub fn advance_has_blocks(&self, producer: usize) -> i64 {
        self.has_blocks_in_split[producer].fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Collects producers eligible for selection (neither done nor in
    /// flight), reserves a uniformly random one by setting its in-flight
    /// bit, and returns a guard that releases it on drop. `None` if no
    /// producer is currently eligible.
    pub fn select_random_split(self: &Arc<Self>) -> Option<InFlightGuard<K, C>> {
        let mut bits = self.bits.lock();
        let eligible: Vec<usize> = (0..self.total_splits)
            .filter(|&p| !bits.done[p] && !bits.in_flight[p])
            .collect();
        let chosen = *eligible.choose(&mut rand::thread_rng())?;
        bits.in_flight[chosen] = true;
        drop(bits);
        Some(InFlightGuard {
            state: self.clone(),
            producer: chosen,
        })
    }

    fn release_in_flight(&self, producer: usize) {
        let mut bits = self.bits.lock();
        bits.in_flight[producer] = false;
    }

    /// Marks `producer` fully drained; idempotent.
    pub fn mark_done(&self, producer: usize) {
        let mut bits = self.bits.lock();
        if !bits.done[producer] {
            bits.done[producer] = true;
            self.has_splits.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn merge_combiner(&self, key: K, value: C, merge: impl FnOnce(C, C) -> C) {
        let mut combiners = self.combiners.lock();
        match combiners.remove(&key) {
            Some(existing) => {
                combiners.insert(key, merge(existing, value));
            }
            None => {
                combiners.insert(key, value);
            }
        }
    }

    pub fn into_combiners(self) -> HashMap<K, C> {
        self.combiners.into_inner()
    }
}

impl<K, C> InFlightGuard<K, C> {
    pub fn producer(&self) -> usize {
        self.producer
    }
}
