// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The streaming multipart decoder.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use bale_core::entry::ReadPayload;
use bale_core::errors::{decode_error, end_of_stream_error, limit_error, Result};
use bale_core::io::{BlockReader, Boundary, BoundarySearch, ByteSource, Scan};

use crate::fields::{self, HeaderMap};

/// The reader's block size.
pub const BLOCK_LEN: usize = 4096;

/// Bytes before the first boundary are discarded, up to this cap.
const PREAMBLE_LIMIT: usize = 16 * 1024;
/// A single header line may not exceed this length.
const HEADER_LINE_LIMIT: usize = 16 * 1024;
/// All headers of one part together may not exceed this length.
const HEADERS_LIMIT: usize = 32 * 1024;

static BOUNDARY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)boundary="?([^=";]+)"?"#).unwrap());

/// Extracts the boundary parameter from a `Content-Type` header value.
fn extract_boundary(content_type: &str) -> Result<String> {
    match BOUNDARY_PARAM.captures(content_type) {
        Some(captures) => Ok(captures[1].to_string()),
        None => decode_error("multipart: content-type has no boundary parameter"),
    }
}

/// The metadata of one decoded part.
#[derive(Clone, Debug)]
pub struct PartMeta {
    /// The part name: the `name` parameter, falling back to `filename`.
    pub name: String,
    /// The `filename` parameter, when present.
    pub filename: Option<String>,
    /// The `Content-Type` header, defaulting to `application/octet-stream`.
    pub content_type: String,
    /// The declared `Content-Length`, when present and parseable.
    pub size: Option<u64>,
    /// Every received header, recognised or not.
    pub headers: HeaderMap,
}

/// Consumption state of the current part's payload.
#[derive(Copy, Clone)]
enum Pending {
    None,
    /// A `Content-Length` part: the remaining byte count, and whether the boundary trailer
    /// still has to be read and verified.
    Sized { remaining: u64, trailer_due: bool },
    /// A boundary-terminated part, streamed through the boundary search.
    Unsized,
}

/// A streaming `multipart/form-data` decoder.
///
/// `MultipartReader` yields parts one at a time. A part's payload must be consumed or
/// abandoned before the next call to [`MultipartReader::next_part`]; the reader finishes the
/// abandoned payload itself, either by skipping the declared byte count and verifying the
/// boundary trailer, or by draining the boundary search.
pub struct MultipartReader<S: ByteSource> {
    reader: BlockReader<S>,
    /// The inter-part trailer `\r\n--<boundary>`.
    trailer: Boundary,
    search: BoundarySearch,
    pending: Pending,
    started: bool,
    finished: bool,
}

impl<S: ByteSource> MultipartReader<S> {
    /// Instantiates a reader from a source and the raw `Content-Type` value that carries
    /// the boundary parameter.
    pub fn new(source: S, content_type: &str) -> Result<Self> {
        let boundary = extract_boundary(content_type)?;

        // The boundary must fit a block together with its CRLF prefix, or the search
        // precondition fails.
        if boundary.len() + 4 > BLOCK_LEN {
            return decode_error("multipart: boundary too long");
        }

        let trailer = Boundary::new(format!("\r\n--{}", boundary).into_bytes());

        Ok(MultipartReader {
            reader: BlockReader::new(source, BLOCK_LEN),
            trailer,
            search: BoundarySearch::new(),
            pending: Pending::None,
            started: false,
            finished: false,
        })
    }

    /// Gets the next part, finishing the payload of the previous one first.
    ///
    /// Returns `None` once the closing `--boundary--` is reached.
    pub fn next_part(&mut self) -> Result<Option<Part<'_, S>>> {
        if !self.started {
            self.discard_preamble()?;
            self.started = true;
        }

        self.drain_payload()?;

        if self.finished {
            return Ok(None);
        }

        // The two bytes after a boundary distinguish a further part (CRLF) from the
        // archive terminator (`--`).
        let mut tag = [0u8; 2];
        self.read_exact(&mut tag)?;

        if &tag == b"--" {
            self.finished = true;
            // Consume the CRLF-ish tail after the closing boundary.
            let _ = self.reader.skip(u64::MAX)?;
            return Ok(None);
        }

        if &tag != b"\r\n" {
            return decode_error("multipart: malformed bytes after boundary");
        }

        let headers = self.read_headers()?;

        let Some(disposition_raw) = headers.get("content-disposition") else {
            return decode_error("multipart: part has no content-disposition");
        };

        let disposition = fields::parse_content_disposition(disposition_raw)?;

        let name = disposition
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| disposition.filename.clone().filter(|n| !n.is_empty()));

        let Some(name) = name else {
            return decode_error("multipart: part has neither name nor filename");
        };

        let content_type = headers
            .get("content-type")
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();

        // An unparseable Content-Length falls back to the boundary-terminated path.
        let size = headers.get("content-length").and_then(|v| v.trim().parse::<u64>().ok());

        self.pending = match size {
            Some(n) => Pending::Sized { remaining: n, trailer_due: true },
            None => {
                self.search = BoundarySearch::new();
                Pending::Unsized
            }
        };

        let meta = PartMeta { name, filename: disposition.filename, content_type, size, headers };

        Ok(Some(Part { meta, fmt: self }))
    }

    /// Scans for the leading `--boundary` and discards everything before it. The leading
    /// CRLF is optional, so the scan targets the bare `--boundary` form.
    fn discard_preamble(&mut self) -> Result<()> {
        let lead = Boundary::new(&self.trailer.pattern()[2..]);

        let mut search = BoundarySearch::new();
        let mut discarded = 0usize;

        loop {
            match search.next(&mut self.reader, &lead)? {
                Scan::Bytes(chunk) => {
                    discarded += chunk.len();
                    if discarded > PREAMBLE_LIMIT {
                        return limit_error("multipart: preamble too long");
                    }
                }
                Scan::Boundary => break,
                Scan::End => return end_of_stream_error(),
            }
        }

        if discarded > 0 {
            debug!("multipart: discarded {} preamble bytes", discarded);
        }

        Ok(())
    }

    /// Finishes the current part's payload so the reader sits just past its trailer.
    fn drain_payload(&mut self) -> Result<()> {
        loop {
            match self.pending {
                Pending::None => return Ok(()),
                Pending::Sized { remaining, trailer_due } => {
                    if remaining > 0 && self.reader.skip(remaining)? > 0 {
                        return end_of_stream_error();
                    }
                    if trailer_due {
                        self.expect_trailer()?;
                    }
                    self.pending = Pending::None;
                }
                Pending::Unsized => {
                    let Self { reader, trailer, search, .. } = self;
                    match search.next(reader, trailer)? {
                        Scan::Bytes(_) => {}
                        Scan::Boundary => self.pending = Pending::None,
                        Scan::End => return end_of_stream_error(),
                    }
                }
            }
        }
    }

    /// One chunk of the current part's payload.
    fn payload_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        match self.pending {
            Pending::None => Ok(None),
            Pending::Sized { remaining, trailer_due } => {
                if remaining == 0 {
                    if trailer_due {
                        self.expect_trailer()?;
                    }
                    self.pending = Pending::None;
                    return Ok(None);
                }

                let want = remaining.min(BLOCK_LEN as u64) as usize;

                // The block buffer is reused, so the chunk is copied before being handed
                // out.
                let chunk: Box<[u8]> = match self.reader.pull(want)? {
                    Some(slice) => Box::from(slice),
                    None => return end_of_stream_error(),
                };

                let remaining = remaining - chunk.len() as u64;

                if remaining == 0 {
                    self.expect_trailer()?;
                    self.pending = Pending::None;
                }
                else {
                    self.pending = Pending::Sized { remaining, trailer_due: true };
                }

                Ok(Some(chunk))
            }
            Pending::Unsized => {
                let Self { reader, trailer, search, .. } = self;
                match search.next(reader, trailer)? {
                    Scan::Bytes(chunk) => Ok(Some(chunk)),
                    Scan::Boundary => {
                        self.pending = Pending::None;
                        Ok(None)
                    }
                    Scan::End => end_of_stream_error(),
                }
            }
        }
    }

    /// After a sized payload, exactly the trailer `\r\n--<boundary>` must follow.
    fn expect_trailer(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.trailer.len()];
        self.read_exact(&mut buf)?;

        if buf != self.trailer.pattern() {
            return decode_error("multipart: bad boundary after sized part");
        }

        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.reader.pull(buf.len() - filled)? {
                Some(piece) => {
                    buf[filled..filled + piece.len()].copy_from_slice(piece);
                    filled += piece.len();
                }
                None => return end_of_stream_error(),
            }
        }

        Ok(())
    }

    /// Reads CRLF-terminated header lines until the empty line, enforcing the line and
    /// total caps.
    fn read_headers(&mut self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut total = 0usize;

        loop {
            let line = self.read_line()?;

            total += line.len() + 2;
            if total > HEADERS_LIMIT {
                return limit_error("multipart: part headers too long");
            }

            if line.is_empty() {
                break;
            }

            let (name, value) = fields::parse_header_line(&line)?;
            headers.push(name, value);
        }

        Ok(headers)
    }

    /// Reads one header line, excluding its CRLF terminator.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let (overshoot, terminated) = {
                match self.reader.pull(1024)? {
                    Some(piece) => match piece.iter().position(|&b| b == b'\n') {
                        Some(at) => {
                            line.extend_from_slice(&piece[..=at]);
                            (piece.len() - (at + 1), true)
                        }
                        None => {
                            line.extend_from_slice(piece);
                            (0, false)
                        }
                    },
                    None => return end_of_stream_error(),
                }
            };

            if overshoot > 0 {
                self.reader.rewind(overshoot);
            }

            if line.len() > HEADER_LINE_LIMIT {
                return limit_error("multipart: header line too long");
            }

            if terminated {
                break;
            }
        }

        if line.len() < 2 || &line[line.len() - 2..] != b"\r\n" {
            return decode_error("multipart: header line not terminated by crlf");
        }

        line.truncate(line.len() - 2);
        Ok(line)
    }
}

/// One decoded part. Holds the reader borrowed, so the next part cannot be produced until
/// this one is dropped.
pub struct Part<'a, S: ByteSource> {
    meta: PartMeta,
    fmt: &'a mut MultipartReader<S>,
}

impl<S: ByteSource> Part<'_, S> {
    pub fn meta(&self) -> &PartMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.meta.filename.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.meta.content_type
    }

    pub fn size(&self) -> Option<u64> {
        self.meta.size
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.meta.headers
    }
}

impl<S: ByteSource> ReadPayload for Part<'_, S> {
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        self.fmt.payload_chunk()
    }
}
