use std::fs::File;
use std::io::Cursor;
use std::io::Write;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use rw_zip::{
    CompressionMethod, Entry, EntryOptions, FinishOptions, OpenOptions, ReadStreamOptions,
    ZipArchive, ZipWriter,
};

fn open_bytes(bytes: Vec<u8>) -> ZipArchive<Vec<u8>> {
    let size = bytes.len() as u64;
    ZipArchive::from_source(bytes, size, OpenOptions::default()).unwrap()
}

fn collect_entries<S: rw_zip::ReadAt>(archive: &ZipArchive<S>) -> Vec<Entry> {
    archive.entries().collect::<rw_zip::Result<Vec<_>>>().unwrap()
}

#[test]
fn stored_round_trip() {
    let files: Vec<(&str, &[u8])> = vec![
        ("empty.bin", b""),
        ("hello.txt", b"hello world"),
        ("nested/deep/data.bin", &[0u8, 1, 2, 3, 254, 255]),
    ];

    let mut writer = ZipWriter::new(Vec::new());
    let options = EntryOptions {
        compress: Some(false),
        ..Default::default()
    };
    for (name, data) in &files {
        writer.add_buffer(data, name, &options).unwrap();
    }
    let bytes = writer.finish(&FinishOptions::default()).unwrap();

    let archive = open_bytes(bytes);
    assert_eq!(archive.entry_count(), files.len() as u64);
    let entries = collect_entries(&archive);
    for (entry, (name, data)) in entries.iter().zip(&files) {
        assert_eq!(entry.file_name.as_deref(), Some(*name));
        assert_eq!(entry.compression_method, CompressionMethod::Stored);
        assert_eq!(entry.uncompressed_size, data.len() as u64);
        assert_eq!(entry.compressed_size, data.len() as u64);
        assert_eq!(entry.crc32, crc32fast::hash(data));
        assert_eq!(archive.read_entry(entry).unwrap(), *data);
    }
}

#[test]
fn deflate_round_trip() {
    let data = b"the quick brown fox jumps over the lazy dog ".repeat(64);

    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(&data, "fox.txt", &EntryOptions::default())
        .unwrap();
    let bytes = writer.finish(&FinishOptions::default()).unwrap();

    let archive = open_bytes(bytes);
    let entries = collect_entries(&archive);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.compression_method, CompressionMethod::Deflate);
    assert_eq!(entry.is_compressed(), Some(true));
    assert_eq!(entry.uncompressed_size, data.len() as u64);
    assert!(entry.compressed_size < data.len() as u64);
    assert_eq!(archive.read_entry(entry).unwrap(), data);
}

#[test]
fn mixed_sources_and_removal() {
    let dir = tempdir().unwrap();
    let fixture = dir.path().join("test.txt");
    let fixture_data = b"contents read from the filesystem\n";
    File::create(&fixture)
        .unwrap()
        .write_all(fixture_data)
        .unwrap();

    let mtime = Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap();
    let options = EntryOptions {
        mtime: Some(mtime),
        mode: Some(0),
        ..Default::default()
    };

    let mut writer = ZipWriter::new(Vec::new());
    writer.add_buffer(b"foo", "buffer.txt", &options).unwrap();
    writer.add_file(&fixture, "file.txt", &options).unwrap();
    writer
        .add_read_stream(File::open(&fixture).unwrap(), "readstream.txt", &options)
        .unwrap();
    writer
        .add_file_handle(File::open(&fixture).unwrap(), "handle.txt", &options)
        .unwrap();
    writer.add_directory("directory", &options).unwrap();
    let removed = writer.add_directory("removed-directory", &options).unwrap();
    writer.remove_entry(removed).unwrap();
    let bytes = writer.finish(&FinishOptions::default()).unwrap();

    let archive = open_bytes(bytes);
    let entries = collect_entries(&archive);
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e.file_name.as_deref().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "buffer.txt",
            "file.txt",
            "readstream.txt",
            "handle.txt",
            "directory/"
        ]
    );

    assert_eq!(archive.read_entry(&entries[0]).unwrap(), b"foo");
    assert_eq!(archive.read_entry(&entries[1]).unwrap(), fixture_data);
    assert_eq!(archive.read_entry(&entries[2]).unwrap(), fixture_data);
    assert_eq!(archive.read_entry(&entries[3]).unwrap(), fixture_data);
    assert!(entries[4].is_dir());
    assert_eq!(entries[4].uncompressed_size, 0);

    // streamed entries carry the data-descriptor flag, buffered ones do not
    assert!(!entries[0].has_data_descriptor());
    assert!(entries[1].has_data_descriptor());
    assert!(entries[2].has_data_descriptor());

    // the seconds of the stored mtime round down to even
    assert_eq!(
        entries[0].last_modified(),
        Some(Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap())
    );
    assert_eq!(entries[0].mode(), 0);
}

#[test]
fn copy_archive_entry_by_entry() {
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(
            b"stored data",
            "stored.txt",
            &EntryOptions {
                compress: Some(false),
                comment: Some("kept comment".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    writer
        .add_buffer(
            &b"deflated data ".repeat(32),
            "deflated.txt",
            &EntryOptions::default(),
        )
        .unwrap();
    writer
        .add_directory("dir", &EntryOptions::default())
        .unwrap();
    let base = writer.finish(&FinishOptions::default()).unwrap();

    let source = open_bytes(base);
    let mut copier = ZipWriter::new(Vec::new());
    for entry in source.entries() {
        let entry = entry.unwrap();
        let raw = source
            .entry_reader(
                &entry,
                &ReadStreamOptions {
                    decompress: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        copier
            .add_entry_raw(&entry, raw, &EntryOptions::default())
            .unwrap();
    }
    let copied = copier.finish(&FinishOptions::default()).unwrap();

    let copy = open_bytes(copied);
    let originals = collect_entries(&source);
    let copies = collect_entries(&copy);
    assert_eq!(originals.len(), copies.len());
    for (original, copied) in originals.iter().zip(&copies) {
        assert_eq!(original.file_name, copied.file_name);
        assert_eq!(original.comment, copied.comment);
        assert_eq!(original.crc32, copied.crc32);
        assert_eq!(original.compressed_size, copied.compressed_size);
        assert_eq!(original.uncompressed_size, copied.uncompressed_size);
        assert_eq!(original.compression_method, copied.compression_method);
        if !original.is_dir() {
            assert_eq!(
                copy.read_entry(copied).unwrap(),
                source.read_entry(original).unwrap()
            );
        }
    }
}

#[test]
fn modify_in_place_with_seeded_cursor() {
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(
            b"first file",
            "keep.txt",
            &EntryOptions {
                compress: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    writer
        .add_buffer(
            b"second file",
            "drop.txt",
            &EntryOptions {
                compress: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    let base = writer.finish(&FinishOptions::default()).unwrap();

    let source = open_bytes(base.clone());
    let mut rewriter = ZipWriter::with_offset(Vec::new(), base.len() as u64);
    assert_eq!(rewriter.cursor(), base.len() as u64);
    for entry in source.entries() {
        let entry = entry.unwrap();
        if entry.file_name.as_deref() == Some("drop.txt") {
            continue;
        }
        rewriter.add_entry(&entry, &EntryOptions::default()).unwrap();
    }
    rewriter
        .add_directory("directory", &EntryOptions::default())
        .unwrap();
    let tail = rewriter.finish(&FinishOptions::default()).unwrap();

    let mut combined = base;
    combined.extend_from_slice(&tail);
    let archive = open_bytes(combined);
    let entries = collect_entries(&archive);
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e.file_name.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["keep.txt", "directory/"]);
    // the surviving entry still points at its original data
    assert_eq!(archive.read_entry(&entries[0]).unwrap(), b"first file");
}

#[test]
fn archive_comment_round_trip() {
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(b"x", "x.txt", &EntryOptions::default())
        .unwrap();
    let bytes = writer
        .finish(&FinishOptions {
            comment: Some("archive level comment".to_string()),
            ..Default::default()
        })
        .unwrap();

    let archive = open_bytes(bytes);
    assert_eq!(archive.comment(), b"archive level comment");
    assert_eq!(archive.entry_count(), 1);
}

#[test]
fn pre_declared_sizes_skip_the_data_descriptor() {
    let data = b"known ahead of time";
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_read_stream(
            Cursor::new(data),
            "known.txt",
            &EntryOptions {
                compress: Some(false),
                size: Some(data.len() as u64),
                compressed_size: Some(data.len() as u64),
                crc32: Some(crc32fast::hash(data)),
                ..Default::default()
            },
        )
        .unwrap();
    let bytes = writer.finish(&FinishOptions::default()).unwrap();

    let archive = open_bytes(bytes);
    let entries = collect_entries(&archive);
    assert!(!entries[0].has_data_descriptor());
    assert_eq!(archive.read_entry(&entries[0]).unwrap(), data);
}
