// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The streaming multipart encoder.

use std::io::{Read, Write};

use once_cell::sync::Lazy;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use bale_core::errors::{encode_error, Result};

use crate::fields::escape_field_value;

const COPY_BUF_LEN: usize = 8 * 1024;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The per-process boundary identifier: `----formdata-` followed by 16 random base-36
/// characters, generated once on first use.
static BOUNDARY_ID: Lazy<String> = Lazy::new(|| {
    let mut rng = SmallRng::from_entropy();

    let mut id = String::from("----formdata-");
    for _ in 0..16 {
        id.push(BASE36[rng.gen_range(0..36)] as char);
    }

    id
});

/// Gets the per-process boundary identifier.
pub fn boundary_id() -> &'static str {
    &BOUNDARY_ID
}

/// The `Content-Type` value announcing a body produced by [`MultipartWriter::new`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", boundary_id())
}

/// A streaming `multipart/form-data` encoder over any [`std::io::Write`] sink.
///
/// Parts are appended one at a time; [`MultipartWriter::finish`] emits the closing
/// `--boundary--`. Every part carries `Content-Disposition: form-data; name="…"`; file
/// parts add `filename="…"` and their content type, and a nonzero known length is
/// announced as `Content-Length` so decoders can take the non-scanning path.
pub struct MultipartWriter<W: Write> {
    inner: W,
    boundary: String,
    finished: bool,
}

impl<W: Write> MultipartWriter<W> {
    /// Instantiates a writer using the per-process boundary identifier. Announce the body
    /// with [`multipart_content_type`].
    pub fn new(inner: W) -> Self {
        Self::with_boundary(inner, boundary_id())
    }

    /// As `new`, but with a caller-chosen boundary. Tests use this to pin the wire bytes.
    pub fn with_boundary(inner: W, boundary: impl Into<String>) -> Self {
        MultipartWriter { inner, boundary: boundary.into(), finished: false }
    }

    /// The `Content-Type` value announcing this writer's body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Appends a text value part. Text parts carry only their disposition; the value is
    /// streamed without a declared length.
    pub fn write_text(&mut self, name: &str, value: &str) -> Result<()> {
        self.begin_part(name, None, None, None)?;
        self.inner.write_all(value.as_bytes())?;
        self.end_part()
    }

    /// Appends an in-memory file part. The length is known, so it is declared when
    /// nonzero.
    pub fn write_bytes(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<()> {
        self.begin_part(name, filename, content_type, Some(data.len() as u64))?;
        self.inner.write_all(data)?;
        self.end_part()
    }

    /// Appends a streamed part. When `len` is provided the payload must produce exactly
    /// that many bytes; when it is `None` the part is boundary-terminated on the wire.
    pub fn write_stream<R: Read>(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
        len: Option<u64>,
        mut payload: R,
    ) -> Result<()> {
        self.begin_part(name, filename, content_type, len)?;

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

        if let Some(expected) = len {
            if written != expected {
                return encode_error("multipart: payload length does not match content-length");
            }
        }

        self.end_part()
    }

    /// Writes the closing `--boundary--`.
    pub fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.inner.write_all(b"--")?;
            self.inner.write_all(self.boundary.as_bytes())?;
            self.inner.write_all(b"--\r\n\r\n")?;
            self.finished = true;
        }

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn begin_part(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
        len: Option<u64>,
    ) -> Result<()> {
        if self.finished {
            return encode_error("multipart: writer already finished");
        }

        self.inner.write_all(b"--")?;
        self.inner.write_all(self.boundary.as_bytes())?;
        self.inner.write_all(b"\r\n")?;

        let mut disposition =
            format!("Content-Disposition: form-data; name=\"{}\"", escape_field_value(name));
        if let Some(filename) = filename {
            disposition.push_str(&format!("; filename=\"{}\"", escape_field_value(filename)));
        }
        disposition.push_str("\r\n");
        self.inner.write_all(disposition.as_bytes())?;

        if let Some(content_type) = content_type {
            if !content_type.is_empty() {
                self.inner.write_all(format!("Content-Type: {}\r\n", content_type).as_bytes())?;
            }
        }

        // A zero length is omitted: some sources are streamed without a known length, and
        // an absent header already means "scan for the boundary".
        if let Some(len) = len {
            if len > 0 {
                self.inner.write_all(format!("Content-Length: {}\r\n", len).as_bytes())?;
            }
        }

        self.inner.write_all(b"\r\n")?;

        Ok(())
    }

    fn end_part(&mut self) -> Result<()> {
        self.inner.write_all(b"\r\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bale_core::entry::ReadPayload;
    use bale_core::io::slice_source;

    use super::{boundary_id, multipart_content_type, MultipartWriter};
    use crate::read::MultipartReader;

    #[test]
    fn verify_exact_wire_bytes() {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "ID");
        writer.write_text("a", "1").unwrap();
        writer.write_text("b", "2").unwrap();
        writer.finish().unwrap();

        let expected = "--ID\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
                        --ID\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n\
                        --ID--\r\n\r\n";

        assert_eq!(writer.into_inner(), expected.as_bytes());
    }

    #[test]
    fn verify_round_trip() {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "round-trip");
        writer.write_text("a", "first value").unwrap();
        writer.write_bytes("f", Some("file.bin"), Some("application/x-data"), &[7u8; 5000]).unwrap();
        writer.finish().unwrap();

        let content_type = writer.content_type();
        let wire = writer.into_inner();

        let mut reader = MultipartReader::new(slice_source(&wire), &content_type).unwrap();

        let mut part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.name(), "a");
        assert_eq!(part.size(), None);
        assert_eq!(part.text().unwrap(), "first value");

        let mut part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.name(), "f");
        assert_eq!(part.filename(), Some("file.bin"));
        assert_eq!(part.content_type(), "application/x-data");
        assert_eq!(part.size(), Some(5000));
        assert_eq!(part.bytes().unwrap(), vec![7u8; 5000]);

        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn verify_special_filename_escaping() {
        let filename = "newline\nfi+l en\"am\u{1f44d}e.txt";

        let mut writer = MultipartWriter::with_boundary(Vec::new(), "esc");
        writer.write_bytes("file", Some(filename), None, b"content").unwrap();
        writer.finish().unwrap();

        let content_type = writer.content_type();
        let wire = writer.into_inner();

        let rendered = String::from_utf8(wire.clone()).unwrap();
        assert!(rendered.contains("filename=\"newline%0Afi+l en%22am\u{1f44d}e.txt\""));

        let mut reader = MultipartReader::new(slice_source(&wire), &content_type).unwrap();
        let part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.filename(), Some(filename));
    }

    #[test]
    fn verify_boundary_id_shape() {
        let id = boundary_id();
        assert!(id.starts_with("----formdata-"));
        assert_eq!(id.len(), "----formdata-".len() + 16);
        assert!(id["----formdata-".len()..].bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));

        // Stable within the process.
        assert_eq!(boundary_id(), id);
        assert_eq!(multipart_content_type(), format!("multipart/form-data; boundary={}", id));
    }

    #[test]
    fn verify_zero_length_bytes_part_omits_content_length() {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "z");
        writer.write_bytes("empty", None, None, b"").unwrap();
        writer.finish().unwrap();

        let content_type = writer.content_type();
        let wire = writer.into_inner();
        assert!(!String::from_utf8_lossy(&wire).contains("Content-Length"));

        let mut reader = MultipartReader::new(slice_source(&wire), &content_type).unwrap();
        let mut part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.bytes().unwrap(), b"");
    }
}
