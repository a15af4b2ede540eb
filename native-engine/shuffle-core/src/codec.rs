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

//! The one concrete length-delimited object-stream framing used by both the
//! map-side writer and the reduce-side fetcher: a 4-byte little-endian
//! length prefix followed by that many bytes of `bincode`-encoded payload.
//!
//! Clean end-of-stream is only distinguishable from truncation by attempting
//! to start a new record: [`read_record`] returns `Ok(None)` when zero bytes
//! are available at a record boundary, and an `Err` (treated by callers as a
//! retryable truncation, not a clean terminator) if a length prefix is read
//! but the payload is short.

use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};

use crate::error::{Result, ShuffleError};

/// Writes one length-prefixed record and returns the number of bytes written,
/// including the 4-byte length prefix, so callers can track block size.
pub fn write_record<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<u64> {
    let payload = bincode::serialize(value)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(4 + payload.len() as u64)
}

/// Reads one length-prefixed record. `Ok(None)` is the normal end-of-stream
/// terminator (zero bytes read at a record boundary); an `io::ErrorKind::
/// UnexpectedEof` encountered mid-length-prefix or mid-payload is surfaced
/// as an `Err` because it indicates truncation, not a clean terminator.
pub fn read_record<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let value = bincode::deserialize(&payload)?;
    Ok(Some(value))
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of erroring when
/// zero bytes were available before the first byte of `buf` (a clean
/// boundary), and still errors on a short read that starts mid-buffer (a
/// truncated record).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(ShuffleError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated record",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ShuffleError::Io(e)),
        }
    }
    Ok(true)
}
