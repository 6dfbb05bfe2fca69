// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::errors::Result;

use super::ByteSource;

/// `BlockReader` re-pages an arbitrary [`ByteSource`] into fixed-size blocks.
///
/// The reader maintains three logical byte sources and always drains them in order: the
/// pushback region (bytes re-inserted by [`BlockReader::rewind`]), the most recent source
/// chunk, and then the source itself. A single block-sized buffer is reused for every
/// assembled block, so the slices returned by [`BlockReader::read`] and [`BlockReader::pull`]
/// are only valid until the next call; callers that retain bytes must copy them.
///
/// Wherever the current source chunk alone can satisfy a request, the returned slice is a
/// zero-copy subview of that chunk.
pub struct BlockReader<S: ByteSource> {
    /// The chunk source.
    source: S,
    /// The block buffer. Assembled blocks live at the front, the pushback region at the tail.
    block: Box<[u8]>,
    /// Number of pushed-back bytes stored at the tail of the block buffer.
    pushback: usize,
    /// The most recent source chunk, if not yet exhausted.
    chunk: Option<Box<[u8]>>,
    /// The read position within `chunk`.
    offset: usize,
    /// The source returned end-of-stream.
    eof: bool,
    /// Absolute position: bytes handed to the caller or skipped, minus bytes rewound.
    pos: u64,
    /// Provenance of the slice returned by the last `read`/`pull`, consumed by `rewind`.
    last: Last,
}

#[derive(Copy, Clone)]
enum Last {
    None,
    /// The last slice was a subview of the current chunk of the given length.
    Chunk(usize),
    /// The last slice was assembled at the front of the block buffer with the given length.
    Block(usize),
    /// The last slice was served from the pushback region with the given length.
    Pushback(usize),
}

impl<S: ByteSource> BlockReader<S> {
    /// Instantiates a new `BlockReader` over `source` with the given block size.
    pub fn new(source: S, block_len: usize) -> Self {
        assert!(block_len > 0);

        BlockReader {
            source,
            block: vec![0u8; block_len].into_boxed_slice(),
            pushback: 0,
            chunk: None,
            offset: 0,
            eof: false,
            pos: 0,
            last: Last::None,
        }
    }

    /// The block size this reader was instantiated with.
    pub fn block_len(&self) -> usize {
        self.block.len()
    }

    /// Gets the position of the stream: the count of bytes consumed so far.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Number of unread bytes remaining in the current chunk.
    #[inline]
    fn chunk_remaining(&self) -> usize {
        self.chunk.as_ref().map_or(0, |c| c.len() - self.offset)
    }

    /// Fetch the next non-empty chunk from the source. Returns `false` at end-of-stream.
    fn fetch(&mut self) -> Result<bool> {
        debug_assert_eq!(self.chunk_remaining(), 0);

        if self.eof {
            return Ok(false);
        }

        loop {
            match self.source.next_chunk()? {
                Some(chunk) => {
                    // Zero-length chunks are a legal "try again".
                    if chunk.is_empty() {
                        continue;
                    }
                    self.chunk = Some(chunk);
                    self.offset = 0;
                    return Ok(true);
                }
                None => {
                    self.eof = true;
                    self.chunk = None;
                    self.offset = 0;
                    return Ok(false);
                }
            }
        }
    }

    /// Reads one block.
    ///
    /// Returns exactly `block_len` bytes, or, if `allow_partial` is set, a shorter trailing
    /// slice at the end of the stream. Returns `None` when no bytes remain. When a full block
    /// was required but only a partial block could be assembled, the partial bytes are pushed
    /// back so a subsequent [`BlockReader::pull`] sees them, and `None` is returned.
    pub fn read(&mut self, allow_partial: bool) -> Result<Option<&[u8]>> {
        let block_len = self.block.len();

        // Zero-copy fast path: the current chunk alone satisfies the whole block.
        if self.pushback == 0 && self.chunk_remaining() >= block_len {
            let start = self.offset;
            self.offset += block_len;
            self.pos += block_len as u64;
            self.last = Last::Chunk(block_len);

            let chunk = self.chunk.as_deref().unwrap();
            return Ok(Some(&chunk[start..start + block_len]));
        }

        // Assemble the block in the block buffer: pushback region first, then the current
        // chunk, then fresh chunks from the source.
        let mut filled = 0;

        if self.pushback > 0 {
            let count = self.pushback;
            self.block.copy_within(block_len - count.., 0);
            self.pushback = 0;
            filled = count;
        }

        while filled < block_len {
            let remaining = self.chunk_remaining();

            if remaining > 0 {
                let take = remaining.min(block_len - filled);
                let start = self.offset;
                self.block[filled..filled + take]
                    .copy_from_slice(&self.chunk.as_deref().unwrap()[start..start + take]);
                self.offset += take;
                filled += take;
                continue;
            }

            if !self.fetch()? {
                break;
            }
        }

        if filled == block_len || (allow_partial && filled > 0) {
            self.pos += filled as u64;
            self.last = Last::Block(filled);
            Ok(Some(&self.block[..filled]))
        }
        else if filled > 0 {
            // A full block was required. Park the partial bytes in the pushback region.
            self.block.copy_within(..filled, block_len - filled);
            self.pushback = filled;
            self.last = Last::None;
            Ok(None)
        }
        else {
            self.last = Last::None;
            Ok(None)
        }
    }

    /// Returns up to `max` bytes, without copying when possible. Returns `None` at the end of
    /// the stream, and never returns an empty slice.
    pub fn pull(&mut self, max: usize) -> Result<Option<&[u8]>> {
        assert!(max > 0);

        let block_len = self.block.len();

        if self.pushback > 0 {
            let take = self.pushback.min(max);
            let start = block_len - self.pushback;
            self.pushback -= take;
            self.pos += take as u64;
            self.last = Last::Pushback(take);
            return Ok(Some(&self.block[start..start + take]));
        }

        loop {
            let remaining = self.chunk_remaining();

            if remaining > 0 {
                let take = remaining.min(max);
                let start = self.offset;
                self.offset += take;
                self.pos += take as u64;
                self.last = Last::Chunk(take);

                let chunk = self.chunk.as_deref().unwrap();
                return Ok(Some(&chunk[start..start + take]));
            }

            if !self.fetch()? {
                self.last = Last::None;
                return Ok(None);
            }
        }
    }

    /// Discards up to `count` bytes. Returns how many bytes could **not** be skipped: 0 on
    /// success, more when the stream ended first.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let mut remaining = count;

        while remaining > 0 {
            if self.pushback > 0 {
                let take = (self.pushback as u64).min(remaining) as usize;
                self.pushback -= take;
                self.pos += take as u64;
                remaining -= take as u64;
                continue;
            }

            let chunk_rem = self.chunk_remaining();

            if chunk_rem > 0 {
                let take = (chunk_rem as u64).min(remaining) as usize;
                self.offset += take;
                self.pos += take as u64;
                remaining -= take as u64;
                continue;
            }

            if !self.fetch()? {
                break;
            }
        }

        self.last = Last::None;
        Ok(remaining)
    }

    /// Re-inserts the last `count` bytes of the previously returned slice at the front of the
    /// logical stream.
    ///
    /// When the slice was a zero-copy view into the current chunk this repositions the chunk
    /// cursor; otherwise the bytes are copied into the reserved tail of the block buffer.
    /// Rewinding more bytes than the last `read` or `pull` returned is a programmer error.
    pub fn rewind(&mut self, count: usize) {
        if count == 0 {
            return;
        }

        let block_len = self.block.len();

        match self.last {
            Last::Chunk(len) => {
                assert!(count <= len, "rewind beyond the last returned slice");
                self.offset -= count;
            }
            Last::Block(len) => {
                assert!(count <= len, "rewind beyond the last returned slice");
                debug_assert_eq!(self.pushback, 0);
                self.block.copy_within(len - count..len, block_len - count);
                self.pushback = count;
            }
            Last::Pushback(len) => {
                assert!(count <= len, "rewind beyond the last returned slice");
                // The bytes are still in place immediately before the pushback region.
                self.pushback += count;
            }
            Last::None => panic!("rewind without a preceding read"),
        }

        self.pos -= count as u64;
        self.last = Last::None;
    }
}
