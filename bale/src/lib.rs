// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project Bale
//!
//! Bale is a 100% pure Rust streaming codec library for two byte-container formats: POSIX/GNU
//! tar archives and HTTP `multipart/form-data` bodies.
//!
//! Four pipelines are provided: decoding a tar stream into a lazy sequence of entries,
//! encoding entries into a tar stream, decoding a multipart body into a lazy sequence of
//! parts, and encoding parts into a multipart body. Every pipeline runs in memory bounded by
//! its block size, independent of the total payload size or the size of any single entry.
//!
//! # Usage
//!
//! The following steps describe decoding a container:
//!
//! 1.  Wrap the input in a [`ByteSource`][core::io::ByteSource]. Any
//!     [`std::io::Read`] works through [`ReadSource`][core::io::ReadSource]; any iterator of
//!     byte buffers works through [`IterSource`][core::io::IterSource]. Chunk sizes are
//!     arbitrary and do not affect the decoded result.
//! 2.  Call [`untar`] or [`parse_multipart`] to obtain a reader.
//! 3.  Pull entries with `next_entry` / `next_part`. Each entry exposes its metadata by
//!     value and its payload through [`ReadPayload`][core::entry::ReadPayload], either
//!     chunk-by-chunk or via the `bytes`/`text`/`json` accessors.
//! 4.  An entry that is dropped without being consumed is skipped automatically when the
//!     next one is requested.
//!
//! Encoding mirrors this: [`tar::TarWriter`] and [`multipart::MultipartWriter`] append
//! entries to any [`std::io::Write`] sink, streaming payloads through a fixed-size copy
//! buffer.

pub use bale_core as core;
pub use bale_format_multipart as multipart;
pub use bale_format_tar as tar;

use bale_core::errors::Result;
use bale_core::io::ByteSource;

/// Decodes a tar archive from a chunked byte source into a lazy sequence of entries.
pub fn untar<S: ByteSource>(source: S) -> tar::TarReader<S> {
    tar::TarReader::new(source)
}

/// Decodes a `multipart/form-data` body into a lazy sequence of parts. `content_type` is
/// the raw header value carrying the boundary parameter.
pub fn parse_multipart<S: ByteSource>(
    source: S,
    content_type: &str,
) -> Result<multipart::MultipartReader<S>> {
    multipart::MultipartReader::new(source, content_type)
}

/// The `Content-Type` value announcing a body produced by
/// [`MultipartWriter::new`][multipart::MultipartWriter::new], using the per-process
/// boundary identifier.
pub fn multipart_content_type() -> String {
    multipart::multipart_content_type()
}
