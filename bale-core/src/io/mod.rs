// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable block- and chunk-level I/O.
//!
//! The following nomenclature is used to denote where the data being read is sourced from:
//!  * A [`ByteSource`] produces owned chunks of bytes of arbitrary length.
//!  * A [`BlockReader`] consumes a `ByteSource` and re-pages it into fixed-size blocks with
//!    pushback and rewind.
//!  * A [`BoundarySearch`] consumes a `BlockReader` and yields the bytes preceding a literal
//!    byte pattern.

use std::io;

use crate::errors::Result;

mod block_reader;
mod boundary;

pub use block_reader::BlockReader;
pub use boundary::{Boundary, BoundarySearch, Scan};

/// `ByteSource` is the producer side of every decode pipeline: an arbitrary, lazy sequence of
/// owned byte chunks.
///
/// A source is consumed linearly and never rewound; rewinding happens in the [`BlockReader`]
/// layered on top. Producers may emit chunks of any length. A zero-length chunk is legal and is
/// treated as "try again" by consumers. `None` is the end-of-stream marker and is sticky:
/// implementations should keep returning `None` once the stream is exhausted.
///
/// Cancellation is dropping the pipeline, which drops the source.
pub trait ByteSource {
    /// Await the next chunk, returning `None` at the end of the stream.
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        (**self).next_chunk()
    }
}

/// `ReadSource` wraps any reader implementing [`std::io::Read`] in a [`ByteSource`], chunking
/// it into reads of at most `chunk_len` bytes.
pub struct ReadSource<R: io::Read> {
    inner: R,
    chunk_len: usize,
}

impl<R: io::Read> ReadSource<R> {
    const DEFAULT_CHUNK_LEN: usize = 8 * 1024;

    /// Instantiates a new `ReadSource<R>` by taking ownership and wrapping the provided
    /// `Read`er.
    pub fn new(inner: R) -> Self {
        ReadSource { inner, chunk_len: Self::DEFAULT_CHUNK_LEN }
    }

    /// As `new`, but with a caller-chosen maximum chunk length. `chunk_len` must be > 0.
    pub fn with_chunk_len(inner: R, chunk_len: usize) -> Self {
        assert!(chunk_len > 0);
        ReadSource { inner, chunk_len }
    }

    /// Unwraps this `ReadSource<R>`, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> ByteSource for ReadSource<R> {
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        let mut buf = vec![0u8; self.chunk_len];

        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(count) => {
                    buf.truncate(count);
                    return Ok(Some(buf.into_boxed_slice()));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `IterSource` adapts any iterator of byte buffers into a [`ByteSource`].
///
/// This is the natural source for in-memory data, and for exercising a pipeline against every
/// possible chunking of a buffer.
pub struct IterSource<I> {
    inner: I,
    done: bool,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Vec<u8>>,
{
    pub fn new(inner: I) -> Self {
        IterSource { inner, done: false }
    }
}

impl<I> ByteSource for IterSource<I>
where
    I: Iterator<Item = Vec<u8>>,
{
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        if self.done {
            return Ok(None);
        }

        match self.inner.next() {
            Some(chunk) => Ok(Some(chunk.into_boxed_slice())),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

/// Wraps a single in-memory buffer in a [`ByteSource`] that yields it as one chunk.
pub fn slice_source(data: &[u8]) -> IterSource<std::iter::Once<Vec<u8>>> {
    IterSource::new(std::iter::once(data.to_vec()))
}
