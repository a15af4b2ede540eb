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

//! Configuration keys consumed by the shuffle core, read once at first
//! initialization. A real deployment would thread these through from the
//! job's own configuration object; here they are a plain key-value map so
//! the crate is runnable standalone.

use std::collections::HashMap;

const KEY_BLOCK_SIZE_KB: &str = "spark.shuffle.blockSize";
const KEY_MIN_KNOCK_INTERVAL: &str = "spark.shuffle.minKnockInterval";
const KEY_MAX_KNOCK_INTERVAL: &str = "spark.shuffle.maxKnockInterval";
const KEY_MAX_CONNECTIONS: &str = "spark.shuffle.maxConnections";
const KEY_LOCAL_DIR: &str = "spark.local.dir";
const KEY_EXTERNAL_SERVER_PORT: &str = "spark.shuffle.external.server.port";
const KEY_EXTERNAL_SERVER_PATH: &str = "spark.shuffle.external.server.path";

const DEFAULT_BLOCK_SIZE_KB: u64 = 1024;
const DEFAULT_MIN_KNOCK_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_KNOCK_INTERVAL_MS: u64 = 5000;
const DEFAULT_MAX_CONNECTIONS: usize = 4;
const DEFAULT_LOCAL_DIR: &str = "/tmp";
const DEFAULT_EXTERNAL_SERVER_PORT: i64 = -1;

/// Key-value configuration accessor mirroring the upstream job conf.
///
/// Construct with [`ShuffleConf::from_map`] for tests, or [`ShuffleConf::from_env`]
/// to pick values up from process environment variables (the env var name is
/// the config key with `.` replaced by `_` and upper-cased).
#[derive(Debug, Clone, Default)]
pub struct ShuffleConf {
    values: HashMap<String, String>,
}

impl ShuffleConf {
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn from_env() -> Self {
        let keys = [
            KEY_BLOCK_SIZE_KB,
            KEY_MIN_KNOCK_INTERVAL,
            KEY_MAX_KNOCK_INTERVAL,
            KEY_MAX_CONNECTIONS,
            KEY_LOCAL_DIR,
            KEY_EXTERNAL_SERVER_PORT,
            KEY_EXTERNAL_SERVER_PATH,
        ];
        let mut values = HashMap::new();
        for key in keys {
            let env_name = key.replace('.', "_").to_uppercase();
            if let Ok(value) = std::env::var(env_name) {
                values.insert(key.to_string(), value);
            }
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Block size threshold in bytes (config is stored in kilobytes).
    pub fn block_size_bytes(&self) -> u64 {
        self.get(KEY_BLOCK_SIZE_KB)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_BLOCK_SIZE_KB)
            * 1024
    }

    pub fn min_knock_interval_ms(&self) -> u64 {
        self.get(KEY_MIN_KNOCK_INTERVAL)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MIN_KNOCK_INTERVAL_MS)
    }

    /// Reserved: not consulted by the present admission loop (see DESIGN.md).
    pub fn max_knock_interval_ms(&self) -> u64 {
        self.get(KEY_MAX_KNOCK_INTERVAL)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_KNOCK_INTERVAL_MS)
    }

    pub fn max_connections(&self) -> usize {
        self.get(KEY_MAX_CONNECTIONS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn local_dir(&self) -> String {
        self.get(KEY_LOCAL_DIR)
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_LOCAL_DIR.to_string())
    }

    /// `None` means "use the embedded server"; `Some(port)` means an externally
    /// managed static server is already listening on that port.
    pub fn external_server_port(&self) -> Option<u16> {
        let port = self
            .get(KEY_EXTERNAL_SERVER_PORT)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_EXTERNAL_SERVER_PORT);
        if port >= 0 {
            Some(port as u16)
        } else {
            None
        }
    }

    pub fn external_server_path(&self) -> String {
        self.get(KEY_EXTERNAL_SERVER_PATH)
            .map(str::to_string)
            .unwrap_or_default()
    }
}
