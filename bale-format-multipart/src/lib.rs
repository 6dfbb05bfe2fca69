// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming reader and writer for `multipart/form-data` bodies.
//!
//! The reader consumes any chunked byte source, locates parts by boundary search (with a
//! content-length fast path when a part declares its size), and yields them lazily in
//! bounded memory. The writer emits the narrowed RFC 7578 framing used by browsers and
//! HTTP toolkits: CRLF line endings, quoted `name`/`filename` parameters, and a
//! `--boundary--` terminator.

pub mod fields;
pub mod read;
pub mod write;

pub use fields::{ContentDisposition, HeaderMap};
pub use read::{MultipartReader, Part, PartMeta};
pub use write::{boundary_id, multipart_content_type, MultipartWriter};
