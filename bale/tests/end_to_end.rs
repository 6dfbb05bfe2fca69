// Bale
// Copyright (c) 2026 The Project Bale Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios exercising the full encode and decode pipelines together.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use bale::core::entry::ReadPayload;
use bale::core::io::{slice_source, IterSource};
use bale::multipart::MultipartWriter;
use bale::tar::{EntryType, TarEntrySpec, TarWriter};
use bale::{multipart, parse_multipart, untar};

fn tar_bytes(entries: &[(TarEntrySpec, Vec<u8>)]) -> Vec<u8> {
    let mut writer = TarWriter::new(Vec::new());

    for (spec, payload) in entries {
        writer.append(spec, payload.as_slice()).unwrap();
    }

    writer.finish().unwrap();
    writer.into_inner()
}

#[test]
fn tar_single_file_round_trip() {
    let mut spec = TarEntrySpec::file("test-file.txt", 12);
    spec.mtime_ms = Some(1_751_629_979_000);

    let wire = tar_bytes(&[(spec, b"hello world!".to_vec())]);

    let mut archive = untar(slice_source(&wire));

    let mut entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.name(), "test-file.txt");
    assert_eq!(entry.entry_type(), EntryType::File);
    assert_eq!(entry.size(), 12);
    assert_eq!(entry.meta().mtime_ms, 1_751_629_979_000);
    assert_eq!(entry.bytes().unwrap(), b"hello world!");

    assert!(archive.next_entry().unwrap().is_none());
}

#[test]
fn tar_split_friendly_long_name() {
    let name = format!("{}/{}{}", "d".repeat(100), "x".repeat(50), ".txt");

    let wire = tar_bytes(&[(TarEntrySpec::file(name.clone(), 12), b"hello world!".to_vec())]);

    let mut archive = untar(slice_source(&wire));
    let mut entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.name(), name);
    assert_eq!(entry.bytes().unwrap(), b"hello world!");
}

#[test]
fn tar_pax_requiring_long_name() {
    let name = format!("{}/{}{}", "d".repeat(300), "x".repeat(200), ".txt");

    let wire = tar_bytes(&[(TarEntrySpec::file(name.clone(), 12), b"hello world!".to_vec())]);

    // A PAX extended header must appear on the wire.
    let has_pax = wire
        .chunks(512)
        .any(|block| block.len() == 512 && bale::tar::header::is_magic(block) && block[156] == b'x');
    assert!(has_pax);

    let mut archive = untar(slice_source(&wire));
    let mut entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.name(), name);
    assert_eq!(entry.bytes().unwrap(), b"hello world!");
}

#[test]
fn tar_round_trip_normalizations() {
    let entries = vec![
        (TarEntrySpec::directory("dir-without-slash"), Vec::new()),
        (TarEntrySpec::file("dir-without-slash/file", 3), b"abc".to_vec()),
        (TarEntrySpec::symlink("dir-without-slash/link", "file"), Vec::new()),
    ];

    let wire = tar_bytes(&entries);
    let mut archive = untar(slice_source(&wire));

    let entry = archive.next_entry().unwrap().unwrap();
    // Directory names are normalized to end with a slash, and get the directory default
    // mode.
    assert_eq!(entry.name(), "dir-without-slash/");
    assert_eq!(entry.entry_type(), EntryType::Directory);
    assert_eq!(entry.meta().mode, 0o755);

    let mut entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.meta().mode, 0o644);
    assert_eq!(entry.bytes().unwrap(), b"abc");

    let entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.entry_type(), EntryType::Symlink);
    assert_eq!(entry.meta().linkname.as_deref(), Some("file"));
    assert_eq!(entry.size(), 0);

    assert!(archive.next_entry().unwrap().is_none());
}

#[test]
fn tar_decode_is_chunking_invariant() {
    let mut spec = TarEntrySpec::file("data.bin", 5000);
    spec.mtime_ms = Some(1_700_000_000_000);

    let payload: Vec<u8> = (0u32..5000).map(|v| (v % 251) as u8).collect();
    let wire = tar_bytes(&[(spec, payload.clone())]);

    for chunk_len in [1usize, 3, 7, 500, 4096, wire.len()] {
        let chunks: Vec<Vec<u8>> = wire.chunks(chunk_len).map(|c| c.to_vec()).collect();
        let mut archive = untar(IterSource::new(chunks.into_iter()));

        let mut entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), "data.bin");
        assert_eq!(entry.bytes().unwrap(), payload);
        assert!(archive.next_entry().unwrap().is_none());
    }
}

#[test]
fn tar_reencoding_decoded_archive_is_lossless() {
    let mut first = TarEntrySpec::file("one.txt", 4);
    first.mtime_ms = Some(1_600_000_000_000);
    let mut second = TarEntrySpec::file("two.txt", 6);
    second.mtime_ms = Some(1_600_000_001_000);

    let wire = tar_bytes(&[(first, b"1111".to_vec()), (second, b"222222".to_vec())]);

    // Decode, re-encode what was decoded, decode again: the logical content is unchanged.
    let mut archive = untar(slice_source(&wire));
    let mut writer = TarWriter::new(Vec::new());

    while let Some(mut entry) = archive.next_entry().unwrap() {
        let spec = TarEntrySpec {
            name: entry.name().to_string(),
            entry_type: entry.entry_type(),
            size: entry.size(),
            mtime_ms: Some(entry.meta().mtime_ms),
            mode: Some(entry.meta().mode),
            ..Default::default()
        };
        let payload = entry.bytes().unwrap();
        writer.append(&spec, payload.as_slice()).unwrap();
    }
    writer.finish().unwrap();

    let rewire = writer.into_inner();
    assert_eq!(rewire, wire);
}

#[test]
fn multipart_exact_wire_and_round_trip() {
    let mut writer = MultipartWriter::with_boundary(Vec::new(), "ID");
    writer.write_text("a", "1").unwrap();
    writer.write_text("b", "2").unwrap();
    writer.finish().unwrap();

    let content_type = writer.content_type();
    let wire = writer.into_inner();

    let expected = "--ID\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
                    --ID\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n\
                    --ID--\r\n\r\n";
    assert_eq!(wire, expected.as_bytes());

    let mut body = parse_multipart(slice_source(&wire), &content_type).unwrap();

    let mut part = body.next_part().unwrap().unwrap();
    assert_eq!(part.name(), "a");
    assert_eq!(part.text().unwrap(), "1");

    let mut part = body.next_part().unwrap().unwrap();
    assert_eq!(part.name(), "b");
    assert_eq!(part.text().unwrap(), "2");

    assert!(body.next_part().unwrap().is_none());
}

#[test]
fn multipart_special_filename() {
    let filename = "newline\nfi+l en\"am\u{1f44d}e.txt";

    let mut writer = MultipartWriter::with_boundary(Vec::new(), "esc");
    writer.write_bytes("file", Some(filename), Some("text/plain"), b"payload").unwrap();
    writer.finish().unwrap();

    let content_type = writer.content_type();
    let wire = writer.into_inner();

    let rendered = String::from_utf8(wire.clone()).unwrap();
    assert!(rendered.contains("filename=\"newline%0Afi+l en%22am\u{1f44d}e.txt\""));

    let mut body = parse_multipart(slice_source(&wire), &content_type).unwrap();
    let mut part = body.next_part().unwrap().unwrap();
    assert_eq!(part.filename(), Some(filename));
    assert_eq!(part.bytes().unwrap(), b"payload");
}

#[test]
fn multipart_skip_every_other_sized() {
    run_skip_every_other(true);
}

#[test]
fn multipart_skip_every_other_unsized() {
    run_skip_every_other(false);
}

/// Encodes six file parts, skips parts 1, 3, and 5 by abandoning their payload streams,
/// and checks parts 0, 2, and 4 arrive intact.
fn run_skip_every_other(sized: bool) {
    let contents: Vec<Vec<u8>> =
        (0..6).map(|i| vec![b'a' + i as u8; 1000 * (i + 1)]).collect();

    let mut writer = MultipartWriter::with_boundary(Vec::new(), "skip-test");
    for (i, content) in contents.iter().enumerate() {
        let name = format!("file-{}", i);
        if sized {
            writer.write_bytes(&name, Some(&name), None, content).unwrap();
        }
        else {
            writer.write_stream(&name, Some(&name), None, None, content.as_slice()).unwrap();
        }
    }
    writer.finish().unwrap();

    let content_type = writer.content_type();
    let wire = writer.into_inner();

    let mut body = parse_multipart(slice_source(&wire), &content_type).unwrap();

    for i in 0..6 {
        let mut part = body.next_part().unwrap().unwrap();
        assert_eq!(part.name(), format!("file-{}", i));

        if i % 2 == 0 {
            assert_eq!(part.bytes().unwrap(), contents[i]);
        }
        // Odd parts are dropped untouched; the reader drains them itself.
    }

    assert!(body.next_part().unwrap().is_none());
}

#[test]
fn multipart_decode_is_chunking_invariant() {
    let mut writer = MultipartWriter::with_boundary(Vec::new(), "chunks");
    writer.write_text("t", "some text value").unwrap();
    writer.write_bytes("f", Some("blob"), None, &vec![0x5au8; 9001]).unwrap();
    writer.finish().unwrap();

    let content_type = writer.content_type();
    let wire = writer.into_inner();

    for chunk_len in [1usize, 3, 7, 500, 4096, wire.len()] {
        let chunks: Vec<Vec<u8>> = wire.chunks(chunk_len).map(|c| c.to_vec()).collect();
        let mut body = parse_multipart(IterSource::new(chunks.into_iter()), &content_type).unwrap();

        let mut part = body.next_part().unwrap().unwrap();
        assert_eq!(part.text().unwrap(), "some text value");

        let mut part = body.next_part().unwrap().unwrap();
        assert_eq!(part.bytes().unwrap(), vec![0x5au8; 9001]);

        assert!(body.next_part().unwrap().is_none());
    }
}

#[test]
fn multipart_random_pairs_round_trip() {
    let mut rng = SmallRng::seed_from_u64(0xba1e);

    for _ in 0..25 {
        let count = rng.gen_range(0..6);
        let pairs: Vec<(String, Vec<u8>)> = (0..count)
            .map(|i| {
                let len = rng.gen_range(0..2000);
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                (format!("pair-{}", i), data)
            })
            .collect();

        let mut writer = MultipartWriter::with_boundary(Vec::new(), "pairs");
        for (name, data) in &pairs {
            writer.write_bytes(name, None, None, data).unwrap();
        }
        writer.finish().unwrap();

        let content_type = writer.content_type();
        let wire = writer.into_inner();

        let mut body = parse_multipart(slice_source(&wire), &content_type).unwrap();
        for (name, data) in &pairs {
            let mut part = body.next_part().unwrap().unwrap();
            assert_eq!(part.name(), name.as_str());
            assert_eq!(&part.bytes().unwrap(), data);
        }
        assert!(body.next_part().unwrap().is_none());
    }
}

#[test]
fn multipart_content_type_announces_process_boundary() {
    let announced = bale::multipart_content_type();
    assert!(announced.starts_with("multipart/form-data; boundary=----formdata-"));
    assert_eq!(
        announced,
        format!("multipart/form-data; boundary={}", multipart::boundary_id())
    );
}
