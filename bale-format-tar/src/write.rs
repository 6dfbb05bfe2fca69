// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The streaming tar encoder.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bale_core::errors::{encode_error, Result};

use crate::header::{self, EntryType, TarHeader, BLOCK_LEN};
use crate::pax;

const COPY_BUF_LEN: usize = 8 * 1024;

/// Describes one entry to append to an archive.
#[derive(Clone, Debug)]
pub struct TarEntrySpec {
    pub name: String,
    pub entry_type: EntryType,
    /// Payload length in bytes. The payload stream must produce exactly this many bytes.
    pub size: u64,
    /// Modification time in milliseconds. Defaults to the current time. Truncated to whole
    /// seconds on the wire.
    pub mtime_ms: Option<i64>,
    /// Defaults to 0o755 for directories and 0o644 otherwise.
    pub mode: Option<u32>,
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
    pub devmajor: u64,
    pub devminor: u64,
    /// Link target, for link and symlink entries.
    pub linkname: Option<String>,
}

impl Default for TarEntrySpec {
    fn default() -> Self {
        TarEntrySpec {
            name: String::new(),
            entry_type: EntryType::File,
            size: 0,
            mtime_ms: None,
            mode: None,
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            linkname: None,
        }
    }
}

impl TarEntrySpec {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        TarEntrySpec { name: name.into(), size, ..Default::default() }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        TarEntrySpec { name: name.into(), entry_type: EntryType::Directory, ..Default::default() }
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        TarEntrySpec {
            name: name.into(),
            entry_type: EntryType::Symlink,
            linkname: Some(target.into()),
            ..Default::default()
        }
    }

    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        TarEntrySpec {
            name: name.into(),
            entry_type: EntryType::Link,
            linkname: Some(target.into()),
            ..Default::default()
        }
    }
}

/// A streaming tar encoder over any [`std::io::Write`] sink.
///
/// Entries are appended one at a time with [`TarWriter::append`]; [`TarWriter::finish`]
/// emits the two all-zero terminator blocks. Nothing is buffered beyond one header block, so
/// memory use is independent of payload sizes.
pub struct TarWriter<W: Write> {
    inner: W,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        TarWriter { inner, finished: false }
    }

    /// Appends one entry. For file entries the payload stream must yield exactly
    /// `spec.size` bytes; for directories, links, and symlinks the payload is ignored and
    /// the wire size is 0.
    pub fn append<R: Read>(&mut self, spec: &TarEntrySpec, mut payload: R) -> Result<()> {
        if self.finished {
            return encode_error("tar: writer already finished");
        }

        let mut name = spec.name.clone();

        // Directory names end with a slash on the wire.
        if spec.entry_type == EntryType::Directory && !name.ends_with('/') {
            name.push('/');
        }

        let mut pax_records: Vec<(&str, &str)> = Vec::new();

        let (wire_name, wire_prefix) = match split_name(&name) {
            NameLayout::Plain => (name.clone(), String::new()),
            NameLayout::Split(at) => (name[at + 1..].to_string(), name[..at].to_string()),
            NameLayout::Pax => {
                pax_records.push(("path", &name));
                (pax_placeholder_name(&name), String::new())
            }
        };

        let wire_linkname = match &spec.linkname {
            Some(target) if target.len() > 100 => {
                // A long link target always goes to PAX, never to a split.
                pax_records.push(("linkpath", target));
                String::new()
            }
            Some(target) => target.clone(),
            None => String::new(),
        };

        let mtime = match spec.mtime_ms {
            Some(ms) => ms.div_euclid(1000),
            None => now_seconds(),
        };

        let mode = spec.mode.unwrap_or(match spec.entry_type {
            EntryType::Directory => 0o755,
            _ => 0o644,
        });

        // Symlinks, links, and directories are written with size 0 regardless of any
        // payload the caller supplied.
        let wire_size = match spec.entry_type {
            EntryType::File => spec.size,
            _ => 0,
        };

        if !pax_records.is_empty() {
            self.write_pax_block(&name, mtime, &pax_records)?;
        }

        let header = TarHeader {
            name: wire_name,
            prefix: wire_prefix,
            linkname: wire_linkname,
            mode,
            uid: spec.uid,
            gid: spec.gid,
            size: wire_size,
            mtime,
            typeflag: match spec.entry_type {
                EntryType::File => header::TYPE_FILE,
                EntryType::Link => header::TYPE_LINK,
                EntryType::Symlink => header::TYPE_SYMLINK,
                EntryType::Directory => header::TYPE_DIRECTORY,
            },
            uname: spec.uname.clone(),
            gname: spec.gname.clone(),
            devmajor: spec.devmajor,
            devminor: spec.devminor,
        };

        self.inner.write_all(&header.encode())?;

        if spec.entry_type == EntryType::File {
            let mut written: u64 = 0;
            let mut buf = [0u8; COPY_BUF_LEN];

            loop {
                let count = payload.read(&mut buf)?;
                if count == 0 {
                    break;
                }
                self.inner.write_all(&buf[..count])?;
                written += count as u64;
            }

            if written != wire_size {
                return encode_error("tar: payload length does not match entry size");
            }

            self.write_padding(wire_size)?;
        }

        Ok(())
    }

    /// Writes the archive terminator: two all-zero blocks.
    pub fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.inner.write_all(&[0u8; 2 * BLOCK_LEN])?;
            self.finished = true;
        }

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_pax_block(&mut self, name: &str, mtime: i64, records: &[(&str, &str)]) -> Result<()> {
        let mut payload = Vec::new();

        for (key, value) in records {
            payload.extend(pax::encode_record(key, value));
        }

        let header = TarHeader {
            name: pax_placeholder_name(name),
            mode: 0o644,
            size: payload.len() as u64,
            mtime,
            typeflag: header::TYPE_PAX_LOCAL,
            ..Default::default()
        };

        self.inner.write_all(&header.encode())?;
        self.inner.write_all(&payload)?;
        self.write_padding(payload.len() as u64)?;

        Ok(())
    }

    fn write_padding(&mut self, size: u64) -> Result<()> {
        let pad = (size.wrapping_neg() % BLOCK_LEN as u64) as usize;

        if pad > 0 {
            self.inner.write_all(&[0u8; BLOCK_LEN][..pad])?;
        }

        Ok(())
    }
}

enum NameLayout {
    /// Fits the 100-byte name field.
    Plain,
    /// Split at the given slash: `name[..at]` in the prefix field, `name[at + 1..]` in the
    /// name field.
    Split(usize),
    /// Needs a PAX `path` record.
    Pax,
}

/// Picks the wire layout for a name: the name field alone, a prefix/name split at a slash
/// with the prefix at most 155 bytes and the remainder at most 100, or PAX.
fn split_name(name: &str) -> NameLayout {
    if name.len() <= 100 {
        return NameLayout::Plain;
    }

    for (i, byte) in name.bytes().enumerate() {
        if byte == b'/' && i <= 155 && name.len() - i - 1 <= 100 && name.len() - i - 1 > 0 {
            return NameLayout::Split(i);
        }
    }

    NameLayout::Pax
}

/// The placeholder written to the name field when the real name travels in a PAX record:
/// `PaxHeader/` followed by the last 99 characters of the basename.
fn pax_placeholder_name(name: &str) -> String {
    let basename = name.trim_end_matches('/').rsplit('/').next().unwrap_or(name);

    let chars: Vec<char> = basename.chars().collect();
    let start = chars.len().saturating_sub(99);
    let tail: String = chars[start..].iter().collect();

    format!("PaxHeader/{}", tail)
}

fn now_seconds() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::io::empty;

    use bale_core::entry::ReadPayload;
    use bale_core::errors::Error;
    use bale_core::io::slice_source;

    use super::{TarEntrySpec, TarWriter};
    use crate::header::{self, EntryType, BLOCK_LEN};
    use crate::read::TarReader;

    fn encode(entries: &[(TarEntrySpec, &[u8])]) -> Vec<u8> {
        let mut writer = TarWriter::new(Vec::new());

        for (spec, payload) in entries {
            writer.append(spec, *payload).unwrap();
        }

        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn verify_file_round_trip() {
        let mut spec = TarEntrySpec::file("test-file.txt", 12);
        spec.mtime_ms = Some(1_751_629_979_000);

        let wire = encode(&[(spec, b"hello world!")]);

        // One header block, one payload block, two terminator blocks.
        assert_eq!(wire.len(), 4 * BLOCK_LEN);

        let mut reader = TarReader::new(slice_source(&wire));
        let mut entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), "test-file.txt");
        assert_eq!(entry.size(), 12);
        assert_eq!(entry.meta().mtime_ms, 1_751_629_979_000);
        assert_eq!(entry.meta().mode, 0o644);
        assert_eq!(entry.bytes().unwrap(), b"hello world!");
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn verify_split_name_round_trip() {
        let name = format!("{}/{}{}", "d".repeat(100), "x".repeat(50), ".txt");
        let wire = encode(&[(TarEntrySpec::file(name.clone(), 12), b"hello world!")]);

        // The split layout needs no PAX block.
        assert!(!wire_has_typeflag(&wire, header::TYPE_PAX_LOCAL));

        let mut reader = TarReader::new(slice_source(&wire));
        let mut entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), name);
        assert_eq!(entry.bytes().unwrap(), b"hello world!");
    }

    #[test]
    fn verify_pax_name_round_trip() {
        let name = format!("{}/{}{}", "d".repeat(300), "x".repeat(200), ".txt");
        let wire = encode(&[(TarEntrySpec::file(name.clone(), 12), b"hello world!")]);

        // A name this long travels in a PAX extended header.
        assert!(wire_has_typeflag(&wire, header::TYPE_PAX_LOCAL));

        let mut reader = TarReader::new(slice_source(&wire));
        let mut entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), name);
        assert_eq!(entry.bytes().unwrap(), b"hello world!");
    }

    #[test]
    fn verify_name_length_coverage() {
        // Lengths exercising the plain, split, and PAX paths.
        for len in [100usize, 101, 155, 200, 400, 600] {
            let name = format!("{}/{}", "p".repeat(len / 2), "f".repeat(len - len / 2 - 1));
            assert_eq!(name.len(), len);

            let wire = encode(&[(TarEntrySpec::file(name.clone(), 1), b"x")]);
            let mut reader = TarReader::new(slice_source(&wire));
            let entry = reader.next_entry().unwrap().unwrap();
            assert_eq!(entry.name(), name);
        }
    }

    #[test]
    fn verify_directory_and_symlink() {
        let dir = TarEntrySpec::directory("some/dir");
        let link = TarEntrySpec::symlink("some/link", "target/elsewhere");

        let wire = encode(&[(dir, b""), (link, b"ignored payload")]);

        let mut reader = TarReader::new(slice_source(&wire));

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.entry_type(), EntryType::Directory);
        assert_eq!(entry.name(), "some/dir/");
        assert_eq!(entry.meta().mode, 0o755);
        assert_eq!(entry.size(), 0);

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.entry_type(), EntryType::Symlink);
        assert_eq!(entry.meta().linkname.as_deref(), Some("target/elsewhere"));
        assert_eq!(entry.size(), 0);

        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn verify_long_linkname_goes_to_pax() {
        let target = "t".repeat(150);
        let link = TarEntrySpec::symlink("l", target.clone());

        let wire = encode(&[(link, b"")]);
        assert!(wire_has_typeflag(&wire, header::TYPE_PAX_LOCAL));

        let mut reader = TarReader::new(slice_source(&wire));
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.meta().linkname.as_deref(), Some(target.as_str()));
    }

    #[test]
    fn verify_payload_length_mismatch_fails() {
        let mut writer = TarWriter::new(Vec::new());
        let spec = TarEntrySpec::file("f", 100);

        assert!(matches!(writer.append(&spec, empty()), Err(Error::EncodeError(_))));
    }

    fn wire_has_typeflag(wire: &[u8], typeflag: u8) -> bool {
        wire.chunks(BLOCK_LEN).any(|block| {
            block.len() == BLOCK_LEN && header::is_magic(block) && block[156] == typeflag
        })
    }
}
