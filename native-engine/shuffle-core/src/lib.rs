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

//! A blocked, pull-based shuffle transport: map tasks hash-partition and
//! combine their output into size-bounded block files plus a block-count
//! sidecar per bucket; reduce tasks pull blocks back over HTTP through a
//! bounded-concurrency fetcher that randomizes producer selection so no
//! single producer is hammered by every reducer at once.

pub mod conf;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod hashing;
pub mod id;
pub mod pool;
pub mod server;
pub mod store;
pub mod writer;

mod codec;

pub use conf::ShuffleConf;
pub use driver::run_shuffle;
pub use error::{FetchTarget, Result, ShuffleError};
pub use fetch::client::MapOutputLocation;
pub use id::ShuffleIdAllocator;
pub use store::LocalShuffleStore;
