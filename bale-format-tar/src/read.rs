// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The streaming tar decoder.

use log::warn;

use bale_core::entry::ReadPayload;
use bale_core::errors::{decode_error, end_of_stream_error, limit_error, Result};
use bale_core::io::{BlockReader, ByteSource};

use crate::header::{self, EntryType, TarHeader, BLOCK_LEN};
use crate::pax::PaxRecords;

/// PAX and GNU long-name payloads are header-class data and are capped, unlike entry
/// payloads which stream unbounded.
const META_PAYLOAD_LIMIT: u64 = 16 * 1024;

/// The metadata of one decoded entry.
#[derive(Clone, Debug)]
pub struct TarEntryMeta {
    /// The effective name: GNU long name, then PAX `path`, then `prefix/name`.
    pub name: String,
    pub entry_type: EntryType,
    /// The effective payload length in bytes (PAX `size` override applied).
    pub size: u64,
    /// Modification time in milliseconds.
    pub mtime_ms: i64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
    pub devmajor: u64,
    pub devminor: u64,
    /// The effective link target, for link and symlink entries.
    pub linkname: Option<String>,
}

/// A streaming tar decoder.
///
/// `TarReader` drives the header state machine over a [`BlockReader`] with a 512-byte block
/// size and yields entries one at a time. An entry's payload must be consumed or abandoned
/// before the next call to [`TarReader::next_entry`]; the reader skips whatever the caller
/// left behind, including the zero padding that rounds every payload up to a whole block.
pub struct TarReader<S: ByteSource> {
    reader: BlockReader<S>,
    /// Defaults contributed by PAX global (`g`) headers, persisting across entries.
    global: PaxRecords,
    /// Unconsumed payload bytes of the current entry.
    remaining: u64,
    /// Unconsumed padding after the current entry's payload.
    pad: u64,
    finished: bool,
}

impl<S: ByteSource> TarReader<S> {
    pub fn new(source: S) -> Self {
        TarReader {
            reader: BlockReader::new(source, BLOCK_LEN),
            global: PaxRecords::default(),
            remaining: 0,
            pad: 0,
            finished: false,
        }
    }

    /// Gets the next entry, skipping any unconsumed payload of the previous one.
    ///
    /// Returns `None` once the archive terminator (an all-zero block) or a clean end of
    /// stream is reached.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry<'_, S>>> {
        self.drain_payload()?;

        if self.finished {
            return Ok(None);
        }

        let mut local = PaxRecords::default();
        let mut long_name: Option<String> = None;
        let mut long_linkname: Option<String> = None;

        loop {
            let decoded = {
                match self.reader.read(false)? {
                    Some(block) if header::is_zero(block) => None,
                    Some(block) => {
                        if !header::is_magic(block) {
                            return decode_error("tar: unexpected non-header block");
                        }
                        Some((TarHeader::decode(block), header::verify_checksum(block)))
                    }
                    None => {
                        // The source stopped at (or short of) a block boundary. Tolerate
                        // a missing terminator and trailing zero padding; anything else
                        // is garbage.
                        self.finished = true;
                        self.expect_zero_tail()?;
                        return Ok(None);
                    }
                }
            };

            let Some((hdr, chksum_ok)) = decoded else {
                // End-of-archive sentinel.
                self.finished = true;
                return Ok(None);
            };

            // A bad checksum is advisory on recognised typeflags and fatal otherwise.
            if !chksum_ok {
                if is_known_typeflag(hdr.typeflag) {
                    warn!("tar: ignoring bad checksum on entry {:?}", hdr.name);
                }
                else {
                    return decode_error("tar: bad header checksum");
                }
            }

            match hdr.typeflag {
                header::TYPE_PAX_LOCAL => {
                    let payload = self.read_meta_payload(hdr.size)?;
                    local.merge_from(PaxRecords::parse(&payload));
                }
                header::TYPE_PAX_GLOBAL => {
                    let payload = self.read_meta_payload(hdr.size)?;
                    self.global.merge_from(PaxRecords::parse(&payload));
                }
                header::TYPE_GNU_LONG_NAME | header::TYPE_OLD_GNU_LONG_NAME => {
                    long_name = Some(self.read_meta_string(hdr.size)?);
                }
                header::TYPE_GNU_LONG_LINK => {
                    long_linkname = Some(self.read_meta_string(hdr.size)?);
                }
                _ => {
                    let resolved = local.resolved(&self.global);
                    let meta = build_meta(hdr, resolved, long_name, long_linkname);

                    self.remaining = meta.size;
                    self.pad = meta.size.wrapping_neg() % BLOCK_LEN as u64;

                    return Ok(Some(TarEntry { meta, fmt: self }));
                }
            }
        }
    }

    /// Skips the unconsumed payload and padding of the current entry.
    fn drain_payload(&mut self) -> Result<()> {
        let total = self.remaining + self.pad;

        if total > 0 {
            if self.reader.skip(total)? > 0 {
                return end_of_stream_error();
            }
            self.remaining = 0;
            self.pad = 0;
        }

        Ok(())
    }

    /// One chunk of the current entry's payload. Consumes the trailing padding along with
    /// the final chunk.
    fn payload_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        if self.remaining == 0 {
            if self.pad > 0 {
                if self.reader.skip(self.pad)? > 0 {
                    return end_of_stream_error();
                }
                self.pad = 0;
            }
            return Ok(None);
        }

        let want = self.remaining.min(BLOCK_LEN as u64) as usize;

        // The block buffer is reused, so the chunk is copied before being handed out.
        let chunk: Box<[u8]> = match self.reader.pull(want)? {
            Some(slice) => Box::from(slice),
            None => return end_of_stream_error(),
        };

        self.remaining -= chunk.len() as u64;

        Ok(Some(chunk))
    }

    /// Reads the payload of a PAX or GNU long-name header to its full declared size,
    /// consuming the padding.
    fn read_meta_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > META_PAYLOAD_LIMIT {
            return limit_error("tar: extended header too large");
        }

        let mut buf = Vec::with_capacity(size as usize);
        let mut remaining = size as usize;

        while remaining > 0 {
            match self.reader.pull(remaining.min(BLOCK_LEN))? {
                Some(slice) => {
                    buf.extend_from_slice(slice);
                    remaining -= slice.len();
                }
                None => return end_of_stream_error(),
            }
        }

        let pad = size.wrapping_neg() % BLOCK_LEN as u64;
        if self.reader.skip(pad)? > 0 {
            return end_of_stream_error();
        }

        Ok(buf)
    }

    fn read_meta_string(&mut self, size: u64) -> Result<String> {
        let mut buf = self.read_meta_payload(size)?;

        while buf.last() == Some(&0) {
            buf.pop();
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// After a clean end of stream mid-archive, only all-zero trailing padding may remain.
    fn expect_zero_tail(&mut self) -> Result<()> {
        while let Some(tail) = self.reader.pull(BLOCK_LEN)? {
            if tail.iter().any(|&b| b != 0) {
                return decode_error("tar: unexpected trailing bytes");
            }
        }

        Ok(())
    }
}

fn is_known_typeflag(typeflag: u8) -> bool {
    matches!(
        typeflag,
        header::TYPE_OLD_FILE
            | header::TYPE_FILE
            | header::TYPE_LINK
            | header::TYPE_SYMLINK
            | header::TYPE_DIRECTORY
            | header::TYPE_CONTIGUOUS
            | header::TYPE_PAX_LOCAL
            | header::TYPE_PAX_GLOBAL
            | header::TYPE_GNU_LONG_NAME
            | header::TYPE_OLD_GNU_LONG_NAME
            | header::TYPE_GNU_LONG_LINK
    )
}

fn build_meta(
    hdr: TarHeader,
    pax: PaxRecords,
    long_name: Option<String>,
    long_linkname: Option<String>,
) -> TarEntryMeta {
    let name = long_name.or(pax.path).unwrap_or_else(|| {
        if hdr.prefix.is_empty() {
            hdr.name
        }
        else {
            format!("{}/{}", hdr.prefix, hdr.name)
        }
    });

    let linkname = long_linkname
        .or(pax.linkpath)
        .or_else(|| if hdr.linkname.is_empty() { None } else { Some(hdr.linkname) });

    let mut entry_type = match hdr.typeflag {
        header::TYPE_LINK => EntryType::Link,
        header::TYPE_SYMLINK => EntryType::Symlink,
        header::TYPE_DIRECTORY => EntryType::Directory,
        // FILE, OLD_FILE, CONTIGUOUS, and any unrecognised typeflag that passed the
        // checksum surface as the file category.
        _ => EntryType::File,
    };

    // Pre-USTAR archives mark directories as regular files with a trailing slash.
    if matches!(hdr.typeflag, header::TYPE_OLD_FILE | header::TYPE_FILE) && name.ends_with('/') {
        entry_type = EntryType::Directory;
    }

    let mtime_ms = match pax.mtime {
        Some(seconds) => (seconds * 1000.0) as i64,
        None => hdr.mtime.saturating_mul(1000),
    };

    TarEntryMeta {
        name,
        entry_type,
        size: pax.size.unwrap_or(hdr.size),
        mtime_ms,
        mode: pax.mode.unwrap_or(hdr.mode),
        uid: pax.uid.unwrap_or(hdr.uid),
        gid: pax.gid.unwrap_or(hdr.gid),
        uname: pax.uname.unwrap_or(hdr.uname),
        gname: pax.gname.unwrap_or(hdr.gname),
        devmajor: hdr.devmajor,
        devminor: hdr.devminor,
        linkname,
    }
}

/// One decoded entry. Holds the reader borrowed, so the next entry cannot be produced until
/// this one is dropped.
pub struct TarEntry<'a, S: ByteSource> {
    meta: TarEntryMeta,
    fmt: &'a mut TarReader<S>,
}

impl<S: ByteSource> TarEntry<'_, S> {
    pub fn meta(&self) -> &TarEntryMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn entry_type(&self) -> EntryType {
        self.meta.entry_type
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }
}

impl<S: ByteSource> ReadPayload for TarEntry<'_, S> {
    fn next_chunk(&mut self) -> Result<Option<Box<[u8]>>> {
        self.fmt.payload_chunk()
    }
}
