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

//! A fixed-size worker pool used only for fetches. Submission never blocks
//! the caller: a unit of work is always spawned as a task immediately, but
//! its body waits on a semaphore permit before it is considered "active",
//! so [`BoundedPool::active_count`] reports how many are genuinely running
//! right now rather than how many are merely queued behind the scheduler.
//!
//! Workers have daemon semantics: nothing here ever `.await`s a `JoinHandle`
//! in a way that would keep the process alive.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

pub struct BoundedPool {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

impl BoundedPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of units of work currently holding a permit (i.e. actually
    /// running, not merely queued).
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawns `work` as a background task. Returns immediately; `work` does
    /// not start running until a permit is available.
    pub fn submit<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("pool semaphore is never closed");
            active.fetch_add(1, Ordering::SeqCst);
            work.await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
}
