// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `entry` module provides the payload-consumption trait shared by every container
//! entry type.

use crate::errors::{decode_error, Result};

/// `ReadPayload` is the single-pass byte sequence of a container entry.
///
/// The sequence is one-shot: chunks are produced in order, each chunk is an owned copy (the
/// pipelines reuse their internal buffers), and `None` marks the end of the payload. Entry
/// types implement [`ReadPayload::next_chunk`] and inherit the convenience accessors.
pub trait ReadPayload {
    /// Gets the next chunk of the payload, or `None` when the payload is fully consumed.
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>>;

    /// Reads the remainder of the payload into one buffer.
    fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        while let Some(chunk) = self.next_chunk()? {
            buf.extend_from_slice(&chunk);
        }

        Ok(buf)
    }

    /// Reads the remainder of the payload and decodes it as UTF-8.
    fn text(&mut self) -> Result<String> {
        match String::from_utf8(self.bytes()?) {
            Ok(text) => Ok(text),
            Err(_) => decode_error("payload is not valid utf-8"),
        }
    }

    /// Reads the remainder of the payload and parses it as JSON.
    fn json(&mut self) -> Result<serde_json::Value> {
        match serde_json::from_slice(&self.bytes()?) {
            Ok(value) => Ok(value),
            Err(_) => decode_error("payload is not valid json"),
        }
    }
}
