// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Codec for PAX extended header records.
//!
//! A PAX payload is a sequence of `LEN SPACE key=value LF` records, where `LEN` is the
//! decimal length of the whole record including the digits of `LEN` itself.

/// The overrides carried by a PAX extended header. Local records override the header they
/// precede; global records persist and contribute defaults to all subsequent headers.
#[derive(Clone, Debug, Default)]
pub struct PaxRecords {
    pub path: Option<String>,
    pub linkpath: Option<String>,
    pub size: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<f64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
}

impl PaxRecords {
    /// Parses a PAX payload. A malformed record aborts the loop; everything parsed up to
    /// that point is kept, the remainder of the payload is ignored.
    pub fn parse(payload: &[u8]) -> PaxRecords {
        let mut records = PaxRecords::default();
        let mut rest = payload;

        while !rest.is_empty() {
            let Some(space) = rest.iter().position(|&b| b == b' ') else {
                break;
            };

            let Some(len) = std::str::from_utf8(&rest[..space]).ok().and_then(|s| s.parse::<usize>().ok())
            else {
                break;
            };

            // The length covers the record from its first digit through the trailing LF.
            if len <= space + 1 || len > rest.len() {
                break;
            }

            let record = &rest[..len];
            if record[len - 1] != b'\n' {
                break;
            }

            let Ok(body) = std::str::from_utf8(&record[space + 1..len - 1]) else {
                break;
            };

            let Some(eq) = body.find('=') else {
                break;
            };

            records.apply(&body[..eq], &body[eq + 1..]);
            rest = &rest[len..];
        }

        records
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "path" => self.path = Some(value.to_string()),
            "linkpath" => self.linkpath = Some(value.to_string()),
            "size" => self.size = value.parse().ok(),
            "uid" => self.uid = value.parse().ok(),
            "gid" => self.gid = value.parse().ok(),
            "mode" => self.mode = value.parse().ok(),
            "mtime" => self.mtime = value.parse().ok(),
            "uname" => self.uname = Some(value.to_string()),
            "gname" => self.gname = Some(value.to_string()),
            // Unknown keys are ignored.
            _ => {}
        }
    }

    /// Overwrites fields of `self` with any fields set in `other`.
    pub fn merge_from(&mut self, other: PaxRecords) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }

        take!(path);
        take!(linkpath);
        take!(size);
        take!(uid);
        take!(gid);
        take!(mode);
        take!(mtime);
        take!(uname);
        take!(gname);
    }

    /// Resolves a field against global defaults: the local value wins when set.
    pub fn resolved(&self, global: &PaxRecords) -> PaxRecords {
        let mut out = global.clone();
        out.merge_from(self.clone());
        out
    }
}

fn decimal_len(value: usize) -> usize {
    let mut digits = 1;
    let mut v = value;

    while v >= 10 {
        digits += 1;
        v /= 10;
    }

    digits
}

/// Encodes one `LEN SPACE key=value LF` record. The length prefix counts its own digits, so
/// crossing a power of ten grows the record by an extra byte.
pub fn encode_record(key: &str, value: &str) -> Vec<u8> {
    let base = 1 + key.len() + 1 + value.len() + 1;

    let mut total = base + decimal_len(base + 1);
    loop {
        let next = base + decimal_len(total);
        if next == total {
            break;
        }
        total = next;
    }

    format!("{} {}={}\n", total, key, value).into_bytes()
}
