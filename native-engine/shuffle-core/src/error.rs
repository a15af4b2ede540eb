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

use std::fmt;

pub type Result<T> = std::result::Result<T, ShuffleError>;

/// Errors produced anywhere in the shuffle transport.
///
/// Dispositions (fatal vs recoverable) are a property of *where* an error
/// surfaces, not of the variant itself: the same `Io` variant is fatal when
/// it comes out of the writer and merely logged when it comes out of a
/// Shuffle Client Task.
#[derive(thiserror::Error, Debug)]
pub enum ShuffleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid uri: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("record encode/decode error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("local shuffle directory creation exhausted {0} retries under {1:?}")]
    LocalDirExhausted(u32, std::path::PathBuf),

    #[error("fetch of {what} from {uri} failed: {status}")]
    FetchFailed {
        what: FetchTarget,
        uri: String,
        status: hyper::StatusCode,
    },

    #[error("{0}")]
    Other(String),
}

/// Which of the two wire shapes a failed fetch was for; used only for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    BlockCount,
    Block,
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::BlockCount => write!(f, "block count sidecar"),
            FetchTarget::Block => write!(f, "block"),
        }
    }
}
