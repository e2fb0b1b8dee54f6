use std::io::Cursor;

use rw_zip::{
    EntryOptions, FinishOptions, OpenOptions, ZipArchive, ZipError, ZipWriter,
};

fn open_bytes(bytes: Vec<u8>) -> ZipArchive<Vec<u8>> {
    let size = bytes.len() as u64;
    ZipArchive::from_source(bytes, size, OpenOptions::default()).unwrap()
}

#[test]
fn path_sanitization() {
    let mut writer = ZipWriter::new(Vec::new());
    let options = EntryOptions::default();

    for bad in ["", "/foo", "C:foo", "a/../b", ".."] {
        assert!(
            matches!(
                writer.add_buffer(b"x", bad, &options),
                Err(ZipError::InvalidName(_))
            ),
            "{:?} should be rejected",
            bad
        );
    }
    // a file entry must not look like a directory
    assert!(matches!(
        writer.add_buffer(b"x", "dir/", &options),
        Err(ZipError::InvalidName(_))
    ));

    // backslashes are normalized, directories gain a trailing slash
    writer.add_buffer(b"x", "a\\b\\c", &options).unwrap();
    writer.add_directory("plain", &options).unwrap();
    writer.add_directory("slashed/", &options).unwrap();
    assert_eq!(writer.entry_count(), 3);
    let bytes = writer.finish(&FinishOptions::default()).unwrap();

    let archive = open_bytes(bytes);
    let names: Vec<String> = archive
        .entries()
        .map(|e| e.unwrap().file_name.unwrap())
        .collect();
    assert_eq!(names, vec!["a/b/c", "plain/", "slashed/"]);
}

#[test]
fn invalid_mode_is_rejected() {
    let mut writer = ZipWriter::new(Vec::new());
    let options = EntryOptions {
        mode: Some(0x1_0000),
        ..Default::default()
    };
    assert!(matches!(
        writer.add_buffer(b"x", "x.txt", &options),
        Err(ZipError::InvalidMode(_))
    ));
}

#[test]
fn out_of_range_mtime_is_rejected() {
    use chrono::TimeZone;
    let mut writer = ZipWriter::new(Vec::new());
    let options = EntryOptions {
        mtime: Some(chrono::Utc.with_ymd_and_hms(1979, 12, 31, 23, 59, 59).unwrap()),
        ..Default::default()
    };
    assert!(writer.add_buffer(b"x", "x.txt", &options).is_err());
}

#[test]
fn comment_containing_eocd_signature_is_rejected() {
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(b"x", "x.txt", &EntryOptions::default())
        .unwrap();
    let result = writer.finish(&FinishOptions {
        comment: Some("ends with PK\u{5}\u{6} inside".to_string()),
        ..Default::default()
    });
    assert!(matches!(result, Err(ZipError::CommentContainsSignature)));
}

#[test]
fn validation_errors_do_not_poison_the_writer() {
    let mut writer = ZipWriter::new(Vec::new());
    assert!(writer
        .add_buffer(b"x", "/absolute", &EntryOptions::default())
        .is_err());
    // the writer is still usable after a rejected input
    writer
        .add_buffer(b"x", "fine.txt", &EntryOptions::default())
        .unwrap();
    let bytes = writer.finish(&FinishOptions::default()).unwrap();
    assert_eq!(open_bytes(bytes).entry_count(), 1);
}

#[test]
fn pre_declared_mismatch_poisons_the_writer() {
    let data = b"some bytes";
    let mut writer = ZipWriter::new(Vec::new());
    let result = writer.add_read_stream(
        Cursor::new(data),
        "bad.txt",
        &EntryOptions {
            compress: Some(false),
            size: Some(data.len() as u64),
            compressed_size: Some(data.len() as u64),
            crc32: Some(!crc32fast::hash(data)),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(ZipError::CrcMismatch { .. })));

    // the header and body already hit the output; the writer is done for
    assert!(matches!(
        writer.add_buffer(b"x", "next.txt", &EntryOptions::default()),
        Err(ZipError::Poisoned)
    ));
}

#[test]
fn pre_declared_size_mismatch_fails() {
    let data = b"short";
    let mut writer = ZipWriter::new(Vec::new());
    let result = writer.add_read_stream(
        Cursor::new(data),
        "bad.txt",
        &EntryOptions {
            compress: Some(false),
            size: Some(999),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(ZipError::SizeMismatch { .. })));
}

#[test]
fn remove_entry_twice_fails() {
    let mut writer = ZipWriter::new(Vec::new());
    let id = writer
        .add_buffer(b"x", "x.txt", &EntryOptions::default())
        .unwrap();
    writer.remove_entry(id).unwrap();
    assert!(writer.remove_entry(id).is_err());
}

#[test]
fn directory_entries_take_no_data_options() {
    let mut writer = ZipWriter::new(Vec::new());
    let options = EntryOptions {
        size: Some(4),
        ..Default::default()
    };
    assert!(matches!(
        writer.add_directory("d", &options),
        Err(ZipError::InvalidArgument(_))
    ));
}

#[test]
fn corrupted_data_fails_crc_validation() {
    let data = b"some stored data that will be corrupted";
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(
            data,
            "c.txt",
            &EntryOptions {
                compress: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    let mut bytes = writer.finish(&FinishOptions::default()).unwrap();

    // flip one bit of the stored file data (it begins right after the
    // 30-byte local header and the 5-byte name)
    bytes[35] ^= 0x01;

    let archive = open_bytes(bytes);
    let entry = archive.entries().next().unwrap().unwrap();
    let result = archive.read_entry(&entry);
    assert!(result.is_err(), "corrupted data must fail validation");

    // skipping validation reads the corrupted bytes through
    let mut reader = archive
        .entry_reader(
            &entry,
            &rw_zip::ReadStreamOptions {
                validate_data: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut out).unwrap();
    assert_eq!(out.len(), data.len());
    assert_ne!(out, data);
}

#[test]
fn undersized_directory_claim_fails_early() {
    let data = b"hello";
    let mut writer = ZipWriter::new(Vec::new());
    writer
        .add_buffer(
            data,
            "a.txt",
            &EntryOptions {
                compress: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    let mut bytes = writer.finish(&FinishOptions::default()).unwrap();

    // shrink the uncompressed size recorded in the central directory
    // (offset 24 within the 46-byte header) so the data overruns it
    let cd_offset = 30 + 5 + data.len();
    let size_field = cd_offset + 24;
    bytes[size_field..size_field + 4].copy_from_slice(&2u32.to_le_bytes());

    let archive = open_bytes(bytes);
    let entry = archive.entries().next().unwrap().unwrap();
    assert_eq!(entry.uncompressed_size, 2);
    assert!(archive.read_entry(&entry).is_err());
}
