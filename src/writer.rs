//! Streaming ZIP writer that compresses data on-the-fly without temp files.
//!
//! The writer owns its sink and a monotonically increasing output cursor:
//! every byte pushed advances the cursor by exactly that count, and entry
//! offsets and the central directory offset are taken from it. Entries
//! whose CRC and sizes are known up front are written with complete local
//! headers; streamed entries get the data-descriptor flag, a ZIP64-form
//! header, and a trailing descriptor once the sizes have been observed.
//!
//! Calls are strictly serialized: each `add_*` runs to completion before
//! returning, so entries land in the central directory in call order. A
//! mid-stream error leaves the writer in a failed state and every later
//! operation is refused.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::{debug, trace};
use memchr::memmem;

use crate::error::{Result, ZipError};
use crate::reader;
use crate::spec::{
    self, CentralFileHeader, DataDescriptor, EndOfCentralDirectory, ExtraField, LocalFileHeader,
    Zip64EndOfCentralDirectory, Zip64EocdLocator,
};
use crate::strings;
use crate::timestamp;

const EOCD_SIGNATURE_BYTES: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// Largest buffer accepted by [`ZipWriter::add_buffer`]
const MAX_BUFFER_LENGTH: usize = 0x3fff_ffff;

const DEFAULT_FILE_MODE: u32 = 0o100_664;
const DEFAULT_DIRECTORY_MODE: u32 = 0o40_775;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Per-entry options for the `add_*` methods
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    /// Modification time; defaults to the source file's mtime for
    /// [`ZipWriter::add_file`] and to the current time otherwise
    pub mtime: Option<DateTime<Utc>>,
    /// POSIX mode stored in the high half of the external attributes;
    /// must be in `[0, 0xFFFF]`
    pub mode: Option<u32>,
    /// Deflate the data (default true)
    pub compress: Option<bool>,
    /// Deflate level 0-9 (default 6)
    pub compression_level: Option<u32>,
    /// Write this entry in ZIP64 form regardless of its sizes
    pub force_zip64: bool,
    /// Pre-declared uncompressed size; verified against the data
    pub size: Option<u64>,
    /// Pre-declared compressed size; verified against the data
    pub compressed_size: Option<u64>,
    /// Pre-declared CRC-32; verified against the data
    pub crc32: Option<u32>,
    /// Entry comment
    pub comment: Option<String>,
}

/// Options for [`ZipWriter::finish`]
#[derive(Debug, Clone, Default)]
pub struct FinishOptions {
    /// Archive comment. Must not contain the end of central directory
    /// signature, which would make the archive ambiguous.
    pub comment: Option<String>,
    /// Write the ZIP64 trailer records and sentinel fields regardless of
    /// the archive's dimensions
    pub force_zip64: bool,
}

/// Handle to an entry added to a [`ZipWriter`], usable with
/// [`ZipWriter::remove_entry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryId(u64);

/// Entry state retained for the central directory
struct PendingEntry {
    id: u64,
    file_name: Vec<u8>,
    comment: Vec<u8>,
    last_mod_file_time: u16,
    last_mod_file_date: u16,
    external_file_attributes: u32,
    compression_method: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    force_zip64: bool,
    used_data_descriptor: bool,
}

/// Writer that counts every byte pushed to the sink
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// What the taps observed while an entry body flowed through
struct BodyResult {
    crc32: u32,
    uncompressed_size: u64,
    compressed_size: u64,
}

/// Streaming ZIP archive writer
pub struct ZipWriter<W: Write> {
    sink: CountingWriter<W>,
    entries: Vec<PendingEntry>,
    next_id: u64,
    poisoned: bool,
}

impl ZipWriter<File> {
    /// Creates a ZIP file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> ZipWriter<W> {
    /// Creates a writer emitting to `sink`
    pub fn new(sink: W) -> Self {
        Self::with_offset(sink, 0)
    }

    /// Creates a writer whose output cursor starts at `offset`.
    ///
    /// Used when appending to data already in place, e.g. rewriting the
    /// central directory of an existing archive: seed the cursor with the
    /// source file size, re-register the surviving entries with
    /// [`ZipWriter::add_entry`], and finish.
    pub fn with_offset(sink: W, offset: u64) -> Self {
        Self {
            sink: CountingWriter {
                inner: sink,
                count: offset,
            },
            entries: Vec::new(),
            next_id: 0,
            poisoned: false,
        }
    }

    /// The output cursor: offset of the next byte to be written
    pub fn cursor(&self) -> u64 {
        self.sink.count
    }

    /// Number of entries currently destined for the central directory
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Adds an entry from an in-memory buffer.
    ///
    /// CRC and sizes are computed (and the buffer deflated) before any
    /// bytes are emitted, so the local header is always complete and no
    /// data descriptor is written.
    pub fn add_buffer(&mut self, data: &[u8], name: &str, options: &EntryOptions) -> Result<EntryId> {
        self.check_open()?;
        if data.len() > MAX_BUFFER_LENGTH {
            return Err(ZipError::BufferTooLarge(data.len()));
        }
        let file_name = validate_entry_name(name, false)?;
        let (time, date, external) = resolve_metadata(options, None, DEFAULT_FILE_MODE)?;
        let comment = entry_comment(options)?;

        if let Some(declared) = options.size {
            if declared != data.len() as u64 {
                return Err(ZipError::SizeMismatch {
                    field: "uncompressed size",
                    expected: declared,
                    actual: data.len() as u64,
                });
            }
        }
        let crc32 = crc32fast::hash(data);
        if let Some(declared) = options.crc32 {
            if declared != crc32 {
                return Err(ZipError::CrcMismatch {
                    expected: declared,
                    actual: crc32,
                });
            }
        }

        let compress = options.compress.unwrap_or(true);
        let deflated;
        let (compression_method, body): (u16, &[u8]) = if compress {
            let level = compression_level(options);
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            deflated = encoder.finish()?;
            (8, &deflated)
        } else {
            (0, data)
        };
        if let Some(declared) = options.compressed_size {
            if declared != body.len() as u64 {
                return Err(ZipError::SizeMismatch {
                    field: "compressed size",
                    expected: declared,
                    actual: body.len() as u64,
                });
            }
        }

        let mut entry = PendingEntry {
            id: self.take_id(),
            file_name,
            comment,
            last_mod_file_time: time,
            last_mod_file_date: date,
            external_file_attributes: external,
            compression_method,
            crc32,
            compressed_size: body.len() as u64,
            uncompressed_size: data.len() as u64,
            local_header_offset: 0,
            force_zip64: options.force_zip64,
            used_data_descriptor: false,
        };

        let emitted = self
            .write_local_header(&mut entry, true)
            .and_then(|_| self.sink.write_all(body).map_err(ZipError::from));
        self.poison_on_error(emitted)?;

        Ok(self.push_entry(entry))
    }

    /// Adds an entry streaming a file from disk.
    ///
    /// The file's length is taken from its metadata and verified once the
    /// data has flowed through; the CRC is only known afterwards, so the
    /// entry is streamed with a data descriptor. Modification time and
    /// mode default to the file's own.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        name: &str,
        options: &EntryOptions,
    ) -> Result<EntryId> {
        self.check_open()?;
        let file = File::open(path)?;
        self.add_file_handle(file, name, options)
    }

    /// Like [`ZipWriter::add_file`], over an already-open handle
    pub fn add_file_handle(
        &mut self,
        file: File,
        name: &str,
        options: &EntryOptions,
    ) -> Result<EntryId> {
        self.check_open()?;
        let metadata = file.metadata()?;

        let default_mtime = metadata.modified().ok().map(DateTime::<Utc>::from);
        #[cfg(unix)]
        let default_mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0xffff
        };
        #[cfg(not(unix))]
        let default_mode = DEFAULT_FILE_MODE;

        let mut options = options.clone();
        if options.size.is_none() {
            options.size = Some(metadata.len());
        }
        let file_name = validate_entry_name(name, false)?;
        let (time, date, external) = resolve_metadata(&options, default_mtime, default_mode)?;
        let comment = entry_comment(&options)?;
        self.stream_entry(file, file_name, comment, time, date, external, &options)
    }

    /// Adds an entry streaming from an arbitrary reader.
    ///
    /// When `size`, `compressed_size`, and `crc32` are all pre-declared
    /// the local header is written complete and no data descriptor is
    /// emitted; the observed values must then match the declaration.
    pub fn add_read_stream<R: Read>(
        &mut self,
        reader: R,
        name: &str,
        options: &EntryOptions,
    ) -> Result<EntryId> {
        self.check_open()?;
        let file_name = validate_entry_name(name, false)?;
        let (time, date, external) = resolve_metadata(options, None, DEFAULT_FILE_MODE)?;
        let comment = entry_comment(options)?;
        self.stream_entry(reader, file_name, comment, time, date, external, options)
    }

    /// Adds a directory entry: stored, zero length, name normalized to a
    /// trailing `/`
    pub fn add_directory(&mut self, name: &str, options: &EntryOptions) -> Result<EntryId> {
        self.check_open()?;
        if options.size.is_some() || options.compressed_size.is_some() || options.crc32.is_some() {
            return Err(ZipError::InvalidArgument(
                "directory entries have no data".to_string(),
            ));
        }
        let file_name = validate_entry_name(name, true)?;
        let (time, date, external) = resolve_metadata(options, None, DEFAULT_DIRECTORY_MODE)?;
        let comment = entry_comment(options)?;

        let mut entry = PendingEntry {
            id: self.take_id(),
            file_name,
            comment,
            last_mod_file_time: time,
            last_mod_file_date: date,
            external_file_attributes: external,
            compression_method: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            local_header_offset: 0,
            force_zip64: options.force_zip64,
            used_data_descriptor: false,
        };
        let emitted = self.write_local_header(&mut entry, true);
        self.poison_on_error(emitted)?;
        Ok(self.push_entry(entry))
    }

    /// Re-registers an entry from a source archive without rewriting its
    /// data.
    ///
    /// The entry keeps its original local header offset, so this only
    /// makes sense on a writer whose cursor was seeded past the source
    /// data with [`ZipWriter::with_offset`]. Name and comment are
    /// reclaimed from the source entry, honoring its UTF-8 flag.
    pub fn add_entry(&mut self, entry: &reader::Entry, options: &EntryOptions) -> Result<EntryId> {
        self.check_open()?;
        let pending = self.reclaim_entry(entry, options)?;
        trace!(
            "re-registered entry at original offset {}",
            pending.local_header_offset
        );
        Ok(self.push_entry(pending))
    }

    /// Re-emits an entry from a source archive, streaming its compressed
    /// bytes verbatim.
    ///
    /// `reader` must yield the entry's raw (not decompressed) data, e.g.
    /// from [`crate::ZipArchive::entry_reader`] with
    /// `decompress: Some(false)`. The observed byte count must match the
    /// source central directory, and for stored entries the CRC is
    /// re-checked as well.
    pub fn add_entry_raw<R: Read>(
        &mut self,
        entry: &reader::Entry,
        reader: R,
        options: &EntryOptions,
    ) -> Result<EntryId> {
        self.check_open()?;
        let mut pending = self.reclaim_entry(entry, options)?;

        let emitted = (|| {
            self.write_local_header(&mut pending, true)?;
            let body = self.stream_body(reader, false, Compression::none())?;
            if body.uncompressed_size != entry.compressed_size {
                return Err(ZipError::SizeMismatch {
                    field: "compressed size",
                    expected: entry.compressed_size,
                    actual: body.uncompressed_size,
                });
            }
            if entry.compression_method == reader::CompressionMethod::Stored
                && body.crc32 != entry.crc32
            {
                return Err(ZipError::CrcMismatch {
                    expected: entry.crc32,
                    actual: body.crc32,
                });
            }
            Ok(())
        })();
        self.poison_on_error(emitted)?;
        Ok(self.push_entry(pending))
    }

    /// Removes a previously added entry from the central directory.
    ///
    /// The output is not rewound: bytes already emitted for the entry
    /// stay in the data area as dead weight.
    pub fn remove_entry(&mut self, id: EntryId) -> Result<()> {
        self.check_open()?;
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id.0)
            .ok_or_else(|| {
                ZipError::InvalidArgument("no such entry in this writer".to_string())
            })?;
        self.entries.remove(position);
        Ok(())
    }

    /// Writes the central directory and the trailing records, flushes,
    /// and returns the sink.
    ///
    /// The ZIP64 end of central directory record and its locator precede
    /// the classic record whenever the entry count, directory size, or
    /// directory offset exceed the classic fields, or when
    /// `force_zip64` is set.
    pub fn finish(mut self, options: &FinishOptions) -> Result<W> {
        if self.poisoned {
            return Err(ZipError::Poisoned);
        }
        let comment = match &options.comment {
            Some(text) => {
                let bytes = text.as_bytes().to_vec();
                if bytes.len() > 0xffff {
                    return Err(ZipError::TooLong {
                        field: "archive comment",
                        length: bytes.len(),
                    });
                }
                if memmem::find(&bytes, &EOCD_SIGNATURE_BYTES).is_some() {
                    return Err(ZipError::CommentContainsSignature);
                }
                bytes
            }
            None => Vec::new(),
        };

        let central_directory_offset = self.sink.count;
        for entry in &self.entries {
            let record = central_header_record(entry);
            self.sink.write_all(&record)?;
        }
        let central_directory_size = self.sink.count - central_directory_offset;
        let entry_count = self.entries.len() as u64;
        debug!(
            "central directory: {} entries, {} bytes at offset {}",
            entry_count, central_directory_size, central_directory_offset
        );

        let any_entry_zip64 = self.entries.iter().any(|e| {
            e.force_zip64
                || e.uncompressed_size >= spec::ZIP64_SENTINEL_U32 as u64
                || e.compressed_size >= spec::ZIP64_SENTINEL_U32 as u64
                || e.local_header_offset >= spec::ZIP64_SENTINEL_U32 as u64
        });
        let zip64 = options.force_zip64
            || any_entry_zip64
            || entry_count >= spec::ZIP64_SENTINEL_U16 as u64
            || central_directory_size >= spec::ZIP64_SENTINEL_U32 as u64
            || central_directory_offset >= spec::ZIP64_SENTINEL_U32 as u64;
        if zip64 {
            let zip64_eocd_offset = self.sink.count;
            let record = Zip64EndOfCentralDirectory {
                version_made_by: spec::VERSION_MADE_BY,
                version_needed_to_extract: spec::VERSION_NEEDED_ZIP64,
                disk_number: 0,
                disk_with_central_directory: 0,
                entries_on_this_disk: entry_count,
                entry_count,
                central_directory_size,
                central_directory_offset,
            };
            self.sink.write_all(&record.serialize())?;
            let locator = Zip64EocdLocator {
                disk_with_zip64_eocd: 0,
                zip64_eocd_offset,
                total_disks: 1,
            };
            self.sink.write_all(&locator.serialize())?;
        }

        let entry_count_16 = if options.force_zip64 || entry_count >= spec::ZIP64_SENTINEL_U16 as u64
        {
            spec::ZIP64_SENTINEL_U16
        } else {
            entry_count as u16
        };
        let size_32 = if options.force_zip64
            || central_directory_size >= spec::ZIP64_SENTINEL_U32 as u64
        {
            spec::ZIP64_SENTINEL_U32
        } else {
            central_directory_size as u32
        };
        let offset_32 = if options.force_zip64
            || central_directory_offset >= spec::ZIP64_SENTINEL_U32 as u64
        {
            spec::ZIP64_SENTINEL_U32
        } else {
            central_directory_offset as u32
        };
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entry_count_16,
            entry_count: entry_count_16,
            central_directory_size: size_32,
            central_directory_offset: offset_32,
            comment,
        };
        self.sink.write_all(&eocd.serialize())?;
        self.sink.flush()?;
        Ok(self.sink.inner)
    }

    fn check_open(&self) -> Result<()> {
        if self.poisoned {
            Err(ZipError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_entry(&mut self, entry: PendingEntry) -> EntryId {
        let id = EntryId(entry.id);
        self.entries.push(entry);
        id
    }

    /// The single entry-write protocol for every streaming path: local
    /// header, body through the taps, verification of any pre-declared
    /// values, and a data descriptor when the header was incomplete.
    fn stream_entry<R: Read>(
        &mut self,
        input: R,
        file_name: Vec<u8>,
        comment: Vec<u8>,
        time: u16,
        date: u16,
        external: u32,
        options: &EntryOptions,
    ) -> Result<EntryId> {
        let compress = options.compress.unwrap_or(true);
        let sizes_known =
            options.size.is_some() && options.compressed_size.is_some() && options.crc32.is_some();

        let mut entry = PendingEntry {
            id: self.take_id(),
            file_name,
            comment,
            last_mod_file_time: time,
            last_mod_file_date: date,
            external_file_attributes: external,
            compression_method: if compress { 8 } else { 0 },
            crc32: options.crc32.unwrap_or(0),
            compressed_size: options.compressed_size.unwrap_or(0),
            uncompressed_size: options.size.unwrap_or(0),
            local_header_offset: 0,
            force_zip64: options.force_zip64,
            used_data_descriptor: false,
        };

        let emitted = (|| {
            self.write_local_header(&mut entry, sizes_known)?;
            let body = self.stream_body(input, compress, compression_level(options))?;

            if let Some(declared) = options.size {
                if declared != body.uncompressed_size {
                    return Err(ZipError::SizeMismatch {
                        field: "uncompressed size",
                        expected: declared,
                        actual: body.uncompressed_size,
                    });
                }
            }
            if let Some(declared) = options.compressed_size {
                if declared != body.compressed_size {
                    return Err(ZipError::SizeMismatch {
                        field: "compressed size",
                        expected: declared,
                        actual: body.compressed_size,
                    });
                }
            }
            if let Some(declared) = options.crc32 {
                if declared != body.crc32 {
                    return Err(ZipError::CrcMismatch {
                        expected: declared,
                        actual: body.crc32,
                    });
                }
            }

            entry.crc32 = body.crc32;
            entry.uncompressed_size = body.uncompressed_size;
            entry.compressed_size = body.compressed_size;

            if !sizes_known {
                let descriptor = DataDescriptor {
                    crc32: body.crc32,
                    compressed_size: body.compressed_size,
                    uncompressed_size: body.uncompressed_size,
                };
                self.sink.write_all(&descriptor.serialize(true))?;
            }
            Ok(())
        })();
        self.poison_on_error(emitted)?;
        Ok(self.push_entry(entry))
    }

    /// Emits the local file header, recording the entry's offset from the
    /// output cursor.
    ///
    /// ZIP64 form applies when the entry demands it or when the sizes are
    /// not yet known; its 32-bit size fields then hold the sentinel and
    /// the real (or zeroed) sizes live in a 16-byte extended information
    /// field.
    fn write_local_header(&mut self, entry: &mut PendingEntry, sizes_known: bool) -> Result<()> {
        entry.local_header_offset = self.sink.count;
        entry.used_data_descriptor = !sizes_known;

        let zip64 = entry.force_zip64
            || !sizes_known
            || entry.uncompressed_size >= spec::ZIP64_SENTINEL_U32 as u64
            || entry.compressed_size >= spec::ZIP64_SENTINEL_U32 as u64;

        let mut flags = spec::FLAG_UTF8;
        if !sizes_known {
            flags |= spec::FLAG_DATA_DESCRIPTOR;
        }

        let extra = if zip64 {
            let mut data = Vec::with_capacity(16);
            if sizes_known {
                data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
                data.extend_from_slice(&entry.compressed_size.to_le_bytes());
            } else {
                data.extend_from_slice(&[0u8; 16]);
            }
            spec::serialize_extra_fields(&[ExtraField {
                id: spec::ZIP64_EXTRA_FIELD_ID,
                data,
            }])
        } else {
            Vec::new()
        };

        let (compressed_32, uncompressed_32) = if zip64 {
            (spec::ZIP64_SENTINEL_U32, spec::ZIP64_SENTINEL_U32)
        } else {
            (entry.compressed_size as u32, entry.uncompressed_size as u32)
        };

        let header = LocalFileHeader {
            version_needed_to_extract: if zip64 {
                spec::VERSION_NEEDED_ZIP64
            } else {
                spec::VERSION_NEEDED_DEFAULT
            },
            general_purpose_bit_flag: flags,
            compression_method: entry.compression_method,
            last_mod_file_time: entry.last_mod_file_time,
            last_mod_file_date: entry.last_mod_file_date,
            crc32: if sizes_known { entry.crc32 } else { 0 },
            compressed_size: compressed_32,
            uncompressed_size: uncompressed_32,
            file_name_length: entry.file_name.len() as u16,
            extra_fields_length: extra.len() as u16,
        };
        self.sink.write_all(&header.serialize())?;
        self.sink.write_all(&entry.file_name)?;
        self.sink.write_all(&extra)?;
        trace!(
            "local header at {} ({} bytes of name, zip64: {})",
            entry.local_header_offset,
            entry.file_name.len(),
            zip64
        );
        Ok(())
    }

    /// Pushes an entry body through the CRC and size taps, deflating when
    /// asked, and reports what flowed by.
    fn stream_body<R: Read>(
        &mut self,
        mut input: R,
        deflate: bool,
        level: Compression,
    ) -> Result<BodyResult> {
        let body_start = self.sink.count;
        let mut hasher = Crc32::new();
        let mut uncompressed_size = 0u64;
        let mut buf = [0u8; 32 * 1024];

        if deflate {
            let mut encoder = DeflateEncoder::new(&mut self.sink, level);
            loop {
                let n = input.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                uncompressed_size += n as u64;
                encoder.write_all(&buf[..n])?;
            }
            encoder.finish()?;
        } else {
            loop {
                let n = input.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                uncompressed_size += n as u64;
                self.sink.write_all(&buf[..n])?;
            }
        }

        Ok(BodyResult {
            crc32: hasher.finalize(),
            uncompressed_size,
            compressed_size: self.sink.count - body_start,
        })
    }

    /// Builds a pending entry from a source archive's central directory
    /// entry, keeping its offset, sizes, method, and timestamps.
    fn reclaim_entry(
        &mut self,
        entry: &reader::Entry,
        options: &EntryOptions,
    ) -> Result<PendingEntry> {
        let utf8 = entry.general_purpose_bit_flag & spec::FLAG_UTF8 != 0;
        let name = match &entry.file_name {
            Some(name) => name.clone(),
            None => strings::decode_field(&entry.file_name_raw, utf8)?,
        };
        let file_name = validate_entry_name(&name, entry.is_dir())?;

        let comment = match &options.comment {
            Some(text) => text.as_bytes().to_vec(),
            None => match &entry.comment {
                Some(text) => text.as_bytes().to_vec(),
                None => strings::decode_field(&entry.comment_raw, utf8)?.into_bytes(),
            },
        };
        if comment.len() > 0xffff {
            return Err(ZipError::TooLong {
                field: "entry comment",
                length: comment.len(),
            });
        }

        let (time, date) = match &options.mtime {
            Some(mtime) => {
                let (date, time) = timestamp::to_dos(mtime)?;
                (time, date)
            }
            None => (entry.last_mod_file_time, entry.last_mod_file_date),
        };
        let external = match options.mode {
            Some(mode) => {
                if mode > 0xffff {
                    return Err(ZipError::InvalidMode(mode));
                }
                mode << 16
            }
            None => entry.external_file_attributes,
        };

        Ok(PendingEntry {
            id: self.take_id(),
            file_name,
            comment,
            last_mod_file_time: time,
            last_mod_file_date: date,
            external_file_attributes: external,
            compression_method: entry.compression_method.as_u16(),
            crc32: entry.crc32,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            local_header_offset: entry.relative_offset_of_local_header,
            force_zip64: options.force_zip64,
            // an in-place entry keeps whatever descriptor arrangement its
            // original local header has; re-emission overwrites this
            used_data_descriptor: entry.has_data_descriptor(),
        })
    }
}

/// Serializes one entry's central directory record, tails included
fn central_header_record(entry: &PendingEntry) -> Vec<u8> {
    let zip64 = entry.force_zip64
        || entry.uncompressed_size >= spec::ZIP64_SENTINEL_U32 as u64
        || entry.compressed_size >= spec::ZIP64_SENTINEL_U32 as u64
        || entry.local_header_offset >= spec::ZIP64_SENTINEL_U32 as u64;

    let extra = if zip64 {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
        data.extend_from_slice(&entry.compressed_size.to_le_bytes());
        data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
        spec::serialize_extra_fields(&[ExtraField {
            id: spec::ZIP64_EXTRA_FIELD_ID,
            data,
        }])
    } else {
        Vec::new()
    };

    let mut flags = spec::FLAG_UTF8;
    if entry.used_data_descriptor {
        flags |= spec::FLAG_DATA_DESCRIPTOR;
    }

    let sentinel = spec::ZIP64_SENTINEL_U32;
    let header = CentralFileHeader {
        version_made_by: spec::VERSION_MADE_BY,
        version_needed_to_extract: if zip64 || entry.used_data_descriptor {
            spec::VERSION_NEEDED_ZIP64
        } else {
            spec::VERSION_NEEDED_DEFAULT
        },
        general_purpose_bit_flag: flags,
        compression_method: entry.compression_method,
        last_mod_file_time: entry.last_mod_file_time,
        last_mod_file_date: entry.last_mod_file_date,
        crc32: entry.crc32,
        compressed_size: if zip64 {
            sentinel
        } else {
            entry.compressed_size as u32
        },
        uncompressed_size: if zip64 {
            sentinel
        } else {
            entry.uncompressed_size as u32
        },
        file_name_length: entry.file_name.len() as u16,
        extra_fields_length: extra.len() as u16,
        comment_length: entry.comment.len() as u16,
        disk_number_start: 0,
        internal_file_attributes: 0,
        external_file_attributes: entry.external_file_attributes,
        relative_offset_of_local_header: if zip64 {
            sentinel
        } else {
            entry.local_header_offset as u32
        },
    };

    let mut record = header.serialize();
    record.extend_from_slice(&entry.file_name);
    record.extend_from_slice(&extra);
    record.extend_from_slice(&entry.comment);
    record
}

fn compression_level(options: &EntryOptions) -> Compression {
    Compression::new(
        options
            .compression_level
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
            .min(9),
    )
}

/// Validates and normalizes an entry path.
///
/// Paths must be relative, free of `..` segments, and use `/` separators;
/// backslashes are normalized. Directory entries end in exactly one
/// trailing `/`, file entries in none.
fn validate_entry_name(name: &str, directory: bool) -> Result<Vec<u8>> {
    if name.is_empty() {
        return Err(ZipError::InvalidName("name is empty".to_string()));
    }
    let name = name.replace('\\', "/");
    let bytes = name.as_bytes();
    if name.starts_with('/') || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
    {
        return Err(ZipError::InvalidName(format!(
            "absolute path: {:?}",
            name
        )));
    }
    if name.split('/').any(|segment| segment == "..") {
        return Err(ZipError::InvalidName(format!(
            "path contains \"..\": {:?}",
            name
        )));
    }
    let name = if directory {
        if name.ends_with('/') {
            name
        } else {
            name + "/"
        }
    } else {
        if name.ends_with('/') {
            return Err(ZipError::InvalidName(format!(
                "file name ends in \"/\": {:?}",
                name
            )));
        }
        name
    };
    if name.len() > 0xffff {
        return Err(ZipError::TooLong {
            field: "file name",
            length: name.len(),
        });
    }
    Ok(name.into_bytes())
}

/// Resolves mtime and mode into DOS words and external attributes
fn resolve_metadata(
    options: &EntryOptions,
    default_mtime: Option<DateTime<Utc>>,
    default_mode: u32,
) -> Result<(u16, u16, u32)> {
    let mtime = options.mtime.or(default_mtime).unwrap_or_else(Utc::now);
    let (date, time) = timestamp::to_dos(&mtime)?;
    let mode = options.mode.unwrap_or(default_mode);
    if mode > 0xffff {
        return Err(ZipError::InvalidMode(mode));
    }
    Ok((time, date, mode << 16))
}

fn entry_comment(options: &EntryOptions) -> Result<Vec<u8>> {
    let comment = match &options.comment {
        Some(text) => text.as_bytes().to_vec(),
        None => Vec::new(),
    };
    if comment.len() > 0xffff {
        return Err(ZipError::TooLong {
            field: "entry comment",
            length: comment.len(),
        });
    }
    Ok(comment)
}
