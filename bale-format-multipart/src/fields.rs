// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Codec for multipart header fields: header lines, `Content-Disposition` parameters, and
//! the quoted name/filename escape scheme.

use bale_core::errors::{decode_error, Result};

/// Part headers: a case-insensitive multimap preserving the original spelling and order of
/// every received header.
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    /// Case-insensitive lookup, returning the first matching value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in received order, with their original spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The recognised parameters of a `Content-Disposition: form-data` header.
#[derive(Clone, Debug, Default)]
pub struct ContentDisposition {
    pub name: Option<String>,
    pub filename: Option<String>,
}

/// Parses one CRLF-stripped header line into its name and value. The line must contain a
/// colon and be valid UTF-8 (multipart headers are strict, unlike tar's lossy strings).
pub fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let Ok(line) = std::str::from_utf8(line) else {
        return decode_error("multipart: header line is not valid utf-8");
    };

    let Some(colon) = line.find(':') else {
        return decode_error("multipart: header line missing colon");
    };

    let name = line[..colon].trim();
    if name.is_empty() {
        return decode_error("multipart: header line missing name");
    }

    Ok((name.to_string(), line[colon + 1..].trim().to_string()))
}

/// Splits a header value on `;`, honouring quoted sections.
fn split_params(value: &str) -> impl Iterator<Item = &str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    params.push(&value[start..]);
    params.into_iter()
}

/// Parses a `Content-Disposition` value. The disposition must be `form-data`; the `name`
/// and `filename` parameters are unquoted and unescaped.
pub fn parse_content_disposition(value: &str) -> Result<ContentDisposition> {
    let mut params = split_params(value);

    let disposition = params.next().unwrap_or("").trim();
    if !disposition.eq_ignore_ascii_case("form-data") {
        return decode_error("multipart: content-disposition is not form-data");
    }

    let mut out = ContentDisposition::default();

    for param in params {
        let param = param.trim();

        let Some(eq) = param.find('=') else {
            continue;
        };

        let key = param[..eq].trim();
        let mut value = param[eq + 1..].trim();

        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }

        if key.eq_ignore_ascii_case("name") {
            out.name = Some(unescape_field_value(value));
        }
        else if key.eq_ignore_ascii_case("filename") {
            out.filename = Some(unescape_field_value(value));
        }
    }

    Ok(out)
}

/// Escapes a name or filename for a quoted parameter: backslash, double quote, and newline
/// become `\\`, `%22`, and `%0A`; everything else passes through literally.
pub fn escape_field_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());

    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("%22"),
            '\n' => out.push_str("%0A"),
            _ => out.push(ch),
        }
    }

    out
}

fn hex_value(ch: char) -> Option<u8> {
    ch.to_digit(16).map(|d| d as u8)
}

/// Unescapes a quoted parameter value.
///
/// The inverse of [`escape_field_value`], additionally recognising `\uXXXX`, `\xXX`, the
/// single-character escapes `\b \f \n \r \t`, and any `%XX` percent escape. Unrecognised
/// escapes pass through literally.
pub fn unescape_field_value(value: &str) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '%' => {
                let mut lookahead = chars.clone();
                match (lookahead.next().and_then(hex_value), lookahead.next().and_then(hex_value)) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        chars.nth(1);
                    }
                    _ => out.push(b'%'),
                }
            }
            '\\' => match chars.peek().copied() {
                Some('\\') => {
                    out.push(b'\\');
                    chars.next();
                }
                Some('b') => {
                    out.push(0x08);
                    chars.next();
                }
                Some('f') => {
                    out.push(0x0c);
                    chars.next();
                }
                Some('n') => {
                    out.push(b'\n');
                    chars.next();
                }
                Some('r') => {
                    out.push(b'\r');
                    chars.next();
                }
                Some('t') => {
                    out.push(b'\t');
                    chars.next();
                }
                Some('x') => {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    match (lookahead.next().and_then(hex_value), lookahead.next().and_then(hex_value))
                    {
                        (Some(hi), Some(lo)) => {
                            out.push(hi << 4 | lo);
                            chars.nth(2);
                        }
                        _ => out.push(b'\\'),
                    }
                }
                Some('u') => {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let digits: Vec<Option<u8>> =
                        (0..4).map(|_| lookahead.next().and_then(hex_value)).collect();

                    if digits.iter().all(|d| d.is_some()) {
                        let code = digits
                            .into_iter()
                            .fold(0u32, |acc, d| acc << 4 | u32::from(d.unwrap()));

                        match char::from_u32(code) {
                            Some(decoded) => {
                                let mut buf = [0u8; 4];
                                out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                            }
                            None => out.extend_from_slice("\u{fffd}".as_bytes()),
                        }
                        chars.nth(4);
                    }
                    else {
                        out.push(b'\\');
                    }
                }
                _ => out.push(b'\\'),
            },
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
