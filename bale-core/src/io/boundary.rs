// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use once_cell::unsync::OnceCell;

use crate::errors::Result;

use super::{BlockReader, ByteSource};

/// A literal byte pattern to scan for, with its lazily-built bad-character skip table.
///
/// The table maps every byte value to the number of positions the search window may safely
/// advance when that byte mismatches the final pattern byte. It is built on first use and
/// attached to the pattern, so one `Boundary` can be reused across many searches.
pub struct Boundary {
    pattern: Box<[u8]>,
    shift: OnceCell<Box<[usize; 256]>>,
}

impl Boundary {
    /// Instantiates a new `Boundary`. The pattern must be non-empty.
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        let pattern: Box<[u8]> = Box::from(pattern.as_ref());
        assert!(!pattern.is_empty());

        Boundary { pattern, shift: OnceCell::new() }
    }

    /// Gets the pattern bytes.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Gets the length of the pattern in bytes.
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    fn shift_table(&self) -> &[usize; 256] {
        self.shift.get_or_init(|| {
            let m = self.pattern.len();

            // Bytes absent from the pattern shift a whole window. A byte occurring in the
            // pattern (final byte excluded) shifts so its last occurrence lines up.
            let mut table = Box::new([m; 256]);

            for (i, &byte) in self.pattern[..m - 1].iter().enumerate() {
                table[byte as usize] = m - 1 - i;
            }

            table
        })
    }
}

/// One step of a boundary search.
pub enum Scan {
    /// A run of bytes strictly preceding the boundary.
    Bytes(Box<[u8]>),
    /// The boundary was found. The reader is positioned immediately past it. Terminal.
    Boundary,
    /// The stream ended before the boundary was found. Terminal.
    End,
}

/// A lazy search for a [`Boundary`] over a [`BlockReader`].
///
/// Each call to [`BoundarySearch::next`] performs one block-sized step and yields the bytes
/// preceding the boundary as owned chunks, followed by a terminal [`Scan::Boundary`] or
/// [`Scan::End`]. The terminal result is sticky. After `Scan::Boundary` the reader's position
/// is exactly past the pattern, so the caller may continue pulling the remainder of the
/// stream.
///
/// The search holds one block-sized scratch buffer used when a partial match must be verified
/// across a block seam.
#[derive(Default)]
pub struct BoundarySearch {
    scratch: Vec<u8>,
    finished: Option<bool>,
}

/// Result of scanning a single block.
enum Step {
    /// The pattern was found wholly within the block.
    Found { data: Box<[u8]>, rewind: usize },
    /// No trace of the pattern; the whole block is pre-boundary data.
    Flush { data: Box<[u8]> },
    /// One or more block suffixes match a pattern prefix; verification needs the next block.
    /// Candidate start offsets are ascending, the block is saved in the scratch buffer.
    Seam { candidates: Vec<usize> },
}

/// Result of verifying seam candidates against the following block.
enum Verdict {
    Found { start: usize, rewind: usize },
    NoMatch { next_len: usize },
    Eof,
}

impl BoundarySearch {
    pub fn new() -> Self {
        Default::default()
    }

    /// Performs one search step. See the type-level documentation.
    pub fn next<S: ByteSource>(
        &mut self,
        reader: &mut BlockReader<S>,
        boundary: &Boundary,
    ) -> Result<Scan> {
        if let Some(found) = self.finished {
            return Ok(if found { Scan::Boundary } else { Scan::End });
        }

        let m = boundary.len();
        assert!(m <= reader.block_len(), "boundary longer than the reader's block size");

        let pattern = boundary.pattern();
        let shift = boundary.shift_table();

        let step = {
            let block = match reader.read(true)? {
                Some(block) => block,
                None => {
                    self.finished = Some(false);
                    return Ok(Scan::End);
                }
            };

            let len = block.len();

            // Scan the block with the bad-character rule, verifying the window byte-by-byte
            // whenever its final byte matches. A failed verification advances by one, not by
            // the window length, because the pattern may overlap itself.
            let mut i = m - 1;
            let mut found = None;

            while i < len {
                let byte = block[i];

                if byte == pattern[m - 1] {
                    let start = i + 1 - m;
                    if &block[start..=i] == pattern {
                        found = Some(start);
                        break;
                    }
                    i += 1;
                }
                else {
                    i += shift[byte as usize];
                }
            }

            if let Some(start) = found {
                Step::Found { data: Box::from(&block[..start]), rewind: len - (start + m) }
            }
            else {
                // No full window matched. Any block suffix equal to a pattern prefix is a
                // candidate that may complete across the seam into the next block.
                let first = if len >= m { len - m + 1 } else { 0 };

                let candidates: Vec<usize> =
                    (first..len).filter(|&start| block[start..] == pattern[..len - start]).collect();

                if candidates.is_empty() {
                    Step::Flush { data: Box::from(block) }
                }
                else {
                    // The block buffer is reused by the next read, so save the block.
                    self.scratch.clear();
                    self.scratch.extend_from_slice(block);
                    Step::Seam { candidates }
                }
            }
        };

        match step {
            Step::Found { data, rewind } => {
                reader.rewind(rewind);
                self.finished = Some(true);

                if data.is_empty() {
                    Ok(Scan::Boundary)
                }
                else {
                    Ok(Scan::Bytes(data))
                }
            }
            Step::Flush { data } => Ok(Scan::Bytes(data)),
            Step::Seam { candidates } => {
                let verdict = {
                    match reader.read(true)? {
                        Some(next) => {
                            let next_len = next.len();
                            let saved_len = self.scratch.len();

                            let mut verdict = Verdict::NoMatch { next_len };

                            for &start in &candidates {
                                let matched = saved_len - start;
                                let need = m - matched;
                                let avail = need.min(next_len);

                                if next[..avail] == pattern[matched..matched + avail] {
                                    verdict = if avail < need {
                                        // A short block means the stream ends while the
                                        // leftmost viable match is still incomplete.
                                        Verdict::Eof
                                    }
                                    else {
                                        Verdict::Found { start, rewind: next_len - need }
                                    };
                                    break;
                                }
                            }

                            verdict
                        }
                        None => Verdict::Eof,
                    }
                };

                match verdict {
                    Verdict::Found { start, rewind } => {
                        reader.rewind(rewind);
                        self.finished = Some(true);

                        if start == 0 {
                            Ok(Scan::Boundary)
                        }
                        else {
                            Ok(Scan::Bytes(Box::from(&self.scratch[..start])))
                        }
                    }
                    Verdict::NoMatch { next_len } => {
                        // No candidate survived. Replay the whole next block and flush the
                        // saved one, tail included.
                        reader.rewind(next_len);
                        Ok(Scan::Bytes(self.scratch.as_slice().into()))
                    }
                    Verdict::Eof => {
                        self.finished = Some(false);
                        Ok(Scan::End)
                    }
                }
            }
        }
    }
}
