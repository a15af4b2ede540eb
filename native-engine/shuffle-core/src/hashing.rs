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

//! Bucket routing for the map-side writer.
//!
//! Keys are routed with a signed 32-bit hash (mirroring `Object.hashCode`
//! width, not Rust's native 64-bit `std::hash::Hash` output) so that the
//! `Int.MIN_VALUE` boundary scenario is reachable and the double-mod below
//! is doing real work rather than guarding against a hash space that can
//! never actually go negative.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A 32-bit signed hash of `key`, folding the 64-bit `DefaultHasher` output
/// down the way a `long -> int` narrowing cast would.
pub fn hash32<K: Hash>(key: &K) -> i32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let full = hasher.finish();
    (full ^ (full >> 32)) as i32
}

/// Routes a hash to `[0, num_buckets)`, tolerating a negative hash via the
/// double-mod required by the spec: `((hash % n) + n) % n`.
pub fn bucket_for_hash(hash: i32, num_buckets: usize) -> usize {
    assert!(num_buckets > 0, "num_buckets must be positive");
    let n = num_buckets as i64;
    let h = hash as i64;
    (((h % n) + n) % n) as usize
}

pub fn bucket_for_key<K: Hash>(key: &K, num_buckets: usize) -> usize {
    bucket_for_hash(hash32(key), num_buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_hash_never_routes_to_negative_bucket() {
        for n in 1usize..=17 {
            let bucket = bucket_for_hash(i32::MIN, n);
            assert!(bucket < n, "bucket {bucket} out of range for n={n}");
        }
    }

    #[test]
    fn min_value_matches_double_mod_formula() {
        let n = 5i64;
        let expected = (((i32::MIN as i64) % n) + n) % n;
        assert_eq!(bucket_for_hash(i32::MIN, 5), expected as usize);
    }

    #[test]
    fn positive_hash_is_plain_modulo() {
        assert_eq!(bucket_for_hash(17, 5), 2);
        assert_eq!(bucket_for_hash(0, 5), 0);
    }

    #[test]
    fn same_key_always_routes_to_same_bucket() {
        let a = bucket_for_key(&"hello", 16);
        let b = bucket_for_key(&"hello", 16);
        assert_eq!(a, b);
    }
}
