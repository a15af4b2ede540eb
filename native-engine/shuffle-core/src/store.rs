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

//! One-time-per-process initialization of the local shuffle directory and
//! the fetch endpoint that serves it.

use std::path::{Path, PathBuf};

use tokio::sync::oneshot;

use crate::conf::ShuffleConf;
use crate::error::{Result, ShuffleError};
use crate::server;

const MAX_DIR_CREATE_RETRIES: u32 = 10;

/// A local, process-unique shuffle directory plus the fetch endpoint that
/// makes it reachable. Created exactly once per process; initialization
/// failure is unrecoverable (see DESIGN.md).
pub struct LocalShuffleStore {
    root: PathBuf,
    server_uri: String,
    // Held only to keep the embedded server alive for the store's lifetime;
    // dropping the store signals it to shut down. `None` when an external
    // server was configured instead.
    _embedded_shutdown: Option<oneshot::Sender<()>>,
}

impl LocalShuffleStore {
    /// Creates the local directory (retrying with a fresh UUID on collision,
    /// up to ten times) and binds the fetch endpoint.
    pub async fn init(conf: &ShuffleConf) -> Result<Self> {
        let root = create_unique_dir(Path::new(&conf.local_dir()))?;
        std::fs::create_dir_all(root.join("shuffle"))?;
        log::info!("initialized local shuffle directory at {}", root.display());

        if let Some(port) = conf.external_server_port() {
            let path = conf.external_server_path();
            let server_uri = format!("http://127.0.0.1:{port}{path}");
            log::info!("using externally managed static server at {server_uri}");
            return Ok(Self {
                root,
                server_uri,
                _embedded_shutdown: None,
            });
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let bound_addr = server::spawn_embedded_server(root.clone(), shutdown_rx).await?;
        let server_uri = format!("http://{bound_addr}");
        log::info!("embedded shuffle server listening on {server_uri}");

        Ok(Self {
            root,
            server_uri,
            _embedded_shutdown: Some(shutdown_tx),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_uri(&self) -> &str {
        &self.server_uri
    }
}

fn create_unique_dir(under: &Path) -> Result<PathBuf> {
    for _ in 0..MAX_DIR_CREATE_RETRIES {
        let candidate = under.join(format!("blaze-shuffle-{}", uuid::Uuid::new_v4()));
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(ShuffleError::Io(e)),
        }
    }
    Err(ShuffleError::LocalDirExhausted(
        MAX_DIR_CREATE_RETRIES,
        under.to_path_buf(),
    ))
}
