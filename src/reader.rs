//! Reading ZIP archives over a random-access source.
//!
//! Opening an archive locates the end of central directory record with a
//! trailing-window search, promotes to ZIP64 when the record's sentinel
//! fields demand it, and yields a lazy iterator over the central
//! directory. Each entry exposes a stream factory that re-reads the local
//! header, slices the compressed byte range out of the source, and
//! optionally inflates and validates the data.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use crc32fast::Hasher as Crc32;
use flate2::read::DeflateDecoder;
use log::{debug, trace};
use memchr::memmem;

use crate::error::{Result, ZipError};
use crate::source::{read_exact_at, ReadAt};
use crate::spec::{
    self, CentralFileHeader, EndOfCentralDirectory, LocalFileHeader, UnicodePathExtraField,
    Zip64EndOfCentralDirectory, Zip64EocdLocator, Zip64ExtraField,
};
use crate::strings;
use crate::timestamp;

const EOCD_SIGNATURE_BYTES: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// The longest possible distance from the end of an archive to its end of
/// central directory signature: the fixed record plus a maximal comment.
const EOCD_SEARCH_WINDOW: u64 = EndOfCentralDirectory::SIZE as u64 + 0xffff;

/// The compression method of an entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Method 0: the data is stored uncompressed
    Stored,
    /// Method 8: raw DEFLATE
    Deflate,
    /// Any other method; neither decompression nor validation is offered
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unsupported(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(other) => other,
        }
    }
}

/// Options for opening an archive
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Decode names and comments (UTF-8 or CP437 per the entry flags).
    /// When false, only the raw bytes are surfaced.
    pub decode_strings: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            decode_strings: true,
        }
    }
}

/// Options for [`ZipArchive::entry_reader`]
#[derive(Debug, Clone, Default)]
pub struct ReadStreamOptions {
    /// First byte of the compressed range to read (default 0)
    pub start: Option<u64>,
    /// One past the last byte of the compressed range (default: the
    /// entry's compressed size)
    pub end: Option<u64>,
    /// Inflate deflated data (default: true for deflate entries).
    /// `Some(false)` yields the raw stored bytes.
    pub decompress: Option<bool>,
    /// Decryption is unsupported; `Some(false)` acknowledges an encrypted
    /// entry and yields its raw bytes
    pub decrypt: Option<bool>,
    /// Check byte count and CRC-32 against the central directory at end of
    /// stream (default: on whenever the full uncompressed data is produced)
    pub validate_data: Option<bool>,
}

/// One file or directory from the central directory, with every ZIP64
/// sentinel already resolved.
#[derive(Debug, Clone)]
pub struct Entry {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub disk_number_start: u32,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub relative_offset_of_local_header: u64,
    /// File name exactly as stored
    pub file_name_raw: Vec<u8>,
    /// Comment exactly as stored
    pub comment_raw: Vec<u8>,
    /// Decoded file name; `None` when the archive was opened with
    /// `decode_strings: false`
    pub file_name: Option<String>,
    /// Decoded comment; `None` when the archive was opened with
    /// `decode_strings: false`
    pub comment: Option<String>,
}

impl Entry {
    /// General purpose flag bit 0
    pub fn is_encrypted(&self) -> bool {
        self.general_purpose_bit_flag & spec::FLAG_ENCRYPTED != 0
    }

    /// General purpose flag bit 3: the entry was streamed and carries a
    /// data descriptor
    pub fn has_data_descriptor(&self) -> bool {
        self.general_purpose_bit_flag & spec::FLAG_DATA_DESCRIPTOR != 0
    }

    /// True when the stored name ends in `/`
    pub fn is_dir(&self) -> bool {
        self.file_name_raw.last() == Some(&b'/')
    }

    /// Whether the entry data is compressed: deflate entries are, stored
    /// entries are not, anything else is unknown
    pub fn is_compressed(&self) -> Option<bool> {
        match self.compression_method {
            CompressionMethod::Stored => Some(false),
            CompressionMethod::Deflate => Some(true),
            CompressionMethod::Unsupported(_) => None,
        }
    }

    /// Modification time decoded from the DOS date/time words, UTC.
    /// `None` when the stored words are not a real date.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        timestamp::from_dos(self.last_mod_file_date, self.last_mod_file_time)
    }

    /// POSIX mode bits from the high half of the external attributes
    pub fn mode(&self) -> u16 {
        (self.external_file_attributes >> 16) as u16
    }

    fn from_parts(
        header: CentralFileHeader,
        file_name_raw: Vec<u8>,
        extra_fields_raw: Vec<u8>,
        comment_raw: Vec<u8>,
        decode_strings: bool,
    ) -> Result<Self> {
        if header.general_purpose_bit_flag & spec::FLAG_STRONG_ENCRYPTION != 0 {
            return Err(ZipError::UnsupportedFeature(
                "strong encryption".to_string(),
            ));
        }

        let extra_fields = spec::parse_extra_fields(&extra_fields_raw)?;

        let mut uncompressed_size = header.uncompressed_size as u64;
        let mut compressed_size = header.compressed_size as u64;
        let mut local_header_offset = header.relative_offset_of_local_header as u64;
        let mut disk_number_start = header.disk_number_start as u32;

        let need_uncompressed = header.uncompressed_size == spec::ZIP64_SENTINEL_U32;
        let need_compressed = header.compressed_size == spec::ZIP64_SENTINEL_U32;
        let need_offset = header.relative_offset_of_local_header == spec::ZIP64_SENTINEL_U32;
        let need_disk = header.disk_number_start == spec::ZIP64_SENTINEL_U16;

        if need_uncompressed || need_compressed || need_offset || need_disk {
            let field = extra_fields
                .iter()
                .find(|f| f.id == spec::ZIP64_EXTRA_FIELD_ID)
                .ok_or_else(|| {
                    ZipError::InvalidFormat(
                        "expected zip64 extended information extra field".to_string(),
                    )
                })?;
            let resolved = Zip64ExtraField::parse(
                &field.data,
                need_uncompressed,
                need_compressed,
                need_offset,
                need_disk,
            )?;
            if let Some(size) = resolved.uncompressed_size {
                uncompressed_size = size;
            }
            if let Some(size) = resolved.compressed_size {
                compressed_size = size;
            }
            if let Some(offset) = resolved.relative_offset_of_local_header {
                local_header_offset = offset;
            }
            if let Some(disk) = resolved.disk_number_start {
                disk_number_start = disk;
            }
        }

        let utf8 = header.general_purpose_bit_flag & spec::FLAG_UTF8 != 0;
        let (file_name, comment) = if decode_strings {
            let mut name = strings::decode_field(&file_name_raw, utf8)?;
            // An Info-ZIP Unicode Path field replaces the header name, but
            // only when its checksum proves the header name it re-encodes
            // is the one actually stored.
            if let Some(field) = extra_fields
                .iter()
                .find(|f| f.id == spec::UNICODE_PATH_EXTRA_FIELD_ID)
            {
                if let Ok(unicode) = UnicodePathExtraField::parse(&field.data) {
                    if unicode.version == 1
                        && unicode.name_crc32 == crc32fast::hash(&file_name_raw)
                    {
                        if let Ok(utf8_name) = String::from_utf8(unicode.utf8_name) {
                            name = utf8_name;
                        }
                    }
                }
            }
            let comment = strings::decode_field(&comment_raw, utf8)?;
            (Some(name), Some(comment))
        } else {
            (None, None)
        };

        Ok(Entry {
            version_made_by: header.version_made_by,
            version_needed_to_extract: header.version_needed_to_extract,
            general_purpose_bit_flag: header.general_purpose_bit_flag,
            compression_method: CompressionMethod::from_u16(header.compression_method),
            last_mod_file_time: header.last_mod_file_time,
            last_mod_file_date: header.last_mod_file_date,
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_file_attributes: header.internal_file_attributes,
            external_file_attributes: header.external_file_attributes,
            relative_offset_of_local_header: local_header_offset,
            file_name_raw,
            comment_raw,
            file_name,
            comment,
        })
    }
}

/// A ZIP archive open for reading
pub struct ZipArchive<S> {
    source: S,
    size: u64,
    entry_count: u64,
    central_directory_offset: u64,
    comment: Vec<u8>,
    decode_strings: bool,
}

impl ZipArchive<File> {
    /// Opens a ZIP file from a path with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, OpenOptions::default())
    }

    /// Opens a ZIP file from a path
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Self::from_source(file, size, options)
    }
}

impl<S: ReadAt> ZipArchive<S> {
    /// Opens an archive over any random-access source of `size` bytes.
    ///
    /// Locates the end of central directory record by scanning the last
    /// `min(size, 22 + 65535)` bytes backwards for its signature; a
    /// candidate is accepted when the comment length it encodes matches
    /// the bytes that trail it. The trailing comment makes this search
    /// inherently ambiguous, so the last record whose comment length
    /// checks out wins, consistent with common decoders.
    pub fn from_source(source: S, size: u64, options: OpenOptions) -> Result<Self> {
        let window = size.min(EOCD_SEARCH_WINDOW);
        let window_start = size - window;
        let buf = read_exact_at(&source, window_start, window as usize)?;

        let mut eocd = None;
        for candidate in memmem::rfind_iter(&buf, &EOCD_SIGNATURE_BYTES) {
            if candidate + EndOfCentralDirectory::SIZE > buf.len() {
                continue;
            }
            let comment_length =
                u16::from_le_bytes([buf[candidate + 20], buf[candidate + 21]]) as usize;
            if comment_length == buf.len() - candidate - EndOfCentralDirectory::SIZE {
                eocd = Some((
                    window_start + candidate as u64,
                    EndOfCentralDirectory::parse(&buf[candidate..])?,
                ));
                break;
            }
            trace!(
                "end of central directory candidate at {} has a comment \
                 length that does not reach the end of the file; continuing",
                candidate
            );
        }
        let (eocd_offset, eocd) = eocd.ok_or_else(|| {
            ZipError::InvalidFormat("end of central directory record not found".to_string())
        })?;
        debug!(
            "end of central directory record at {}: {} entries, central directory at {}",
            eocd_offset, eocd.entry_count, eocd.central_directory_offset
        );

        if eocd.disk_number != 0 {
            return Err(ZipError::InvalidFormat(
                "multi-disk archives are not supported".to_string(),
            ));
        }

        let mut entry_count = eocd.entry_count as u64;
        let mut central_directory_offset = eocd.central_directory_offset as u64;

        if eocd.entry_count == spec::ZIP64_SENTINEL_U16
            || eocd.central_directory_offset == spec::ZIP64_SENTINEL_U32
        {
            let locator_offset = eocd_offset
                .checked_sub(Zip64EocdLocator::SIZE as u64)
                .ok_or_else(|| {
                    ZipError::InvalidFormat(
                        "no room for a zip64 end of central directory locator".to_string(),
                    )
                })?;
            let locator_buf = read_exact_at(&source, locator_offset, Zip64EocdLocator::SIZE)?;
            let locator = Zip64EocdLocator::parse(&locator_buf)?;
            trace!("zip64 locator points at {}", locator.zip64_eocd_offset);

            let zip64_buf = read_exact_at(
                &source,
                locator.zip64_eocd_offset,
                Zip64EndOfCentralDirectory::SIZE,
            )?;
            let zip64 = Zip64EndOfCentralDirectory::parse(&zip64_buf)?;
            entry_count = zip64.entry_count;
            central_directory_offset = zip64.central_directory_offset;
            debug!(
                "zip64 end of central directory record: {} entries, central directory at {}",
                entry_count, central_directory_offset
            );
        }

        Ok(Self {
            source,
            size,
            entry_count,
            central_directory_offset,
            comment: eocd.comment,
            decode_strings: options.decode_strings,
        })
    }

    /// Total size of the underlying source in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entries in the central directory
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// The archive comment, exactly as stored
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Iterates over the central directory.
    ///
    /// The iterator is lazy and single-pass; each step reads one header
    /// from the source. Entry readers obtained from the yielded entries
    /// are independent of iteration order.
    pub fn entries(&self) -> Entries<'_, S> {
        Entries {
            archive: self,
            cursor: self.central_directory_offset,
            remaining: self.entry_count,
            failed: false,
        }
    }

    /// Opens a stream over one entry's file data.
    ///
    /// Re-reads the local header at the entry's offset to find where the
    /// file data actually begins, then applies the requested range,
    /// decompression, and validation.
    pub fn entry_reader(
        &self,
        entry: &Entry,
        options: &ReadStreamOptions,
    ) -> Result<Box<dyn Read + Send + '_>> {
        let inflate = match entry.compression_method {
            CompressionMethod::Stored => {
                if options.decompress == Some(true) {
                    return Err(ZipError::InvalidArgument(
                        "entry is stored; there is nothing to decompress".to_string(),
                    ));
                }
                false
            }
            CompressionMethod::Deflate => options.decompress.unwrap_or(true),
            CompressionMethod::Unsupported(method) => {
                if options.decompress == Some(false) {
                    false
                } else {
                    return Err(ZipError::UnsupportedCompression(method));
                }
            }
        };

        if entry.is_encrypted() {
            if options.decrypt != Some(false) {
                return Err(ZipError::UnsupportedFeature(
                    "encrypted entries cannot be decrypted; pass decrypt: Some(false) \
                     to read the raw data"
                        .to_string(),
                ));
            }
            if inflate {
                return Err(ZipError::InvalidArgument(
                    "cannot decompress encrypted data; pass decompress: Some(false)".to_string(),
                ));
            }
        } else if options.decrypt.is_some() {
            return Err(ZipError::InvalidArgument(
                "decrypt option given for an entry that is not encrypted".to_string(),
            ));
        }

        let start = options.start.unwrap_or(0);
        let end = options.end.unwrap_or(entry.compressed_size);
        if start > end || end > entry.compressed_size {
            return Err(ZipError::InvalidArgument(format!(
                "range {}..{} is outside the compressed data (0..{})",
                start, end, entry.compressed_size
            )));
        }
        let partial = start != 0 || end != entry.compressed_size;
        if partial && inflate {
            return Err(ZipError::InvalidArgument(
                "start/end address the compressed data and cannot be combined \
                 with decompression"
                    .to_string(),
            ));
        }

        // Validation taps the uncompressed side, so it only applies when
        // the stream produces the entry's full uncompressed content.
        let can_validate = !partial
            && !entry.is_encrypted()
            && (inflate || entry.compression_method == CompressionMethod::Stored);
        let validate = match options.validate_data {
            Some(true) if !can_validate => {
                return Err(ZipError::InvalidArgument(
                    "validate_data requires the full uncompressed data".to_string(),
                ));
            }
            Some(explicit) => explicit,
            None => can_validate,
        };

        let header_buf = read_exact_at(
            &self.source,
            entry.relative_offset_of_local_header,
            LocalFileHeader::SIZE,
        )?;
        let local = LocalFileHeader::parse(&header_buf)?;
        let data_offset = entry.relative_offset_of_local_header
            + LocalFileHeader::SIZE as u64
            + local.file_name_length as u64
            + local.extra_fields_length as u64;
        trace!(
            "entry data at {} ({} compressed bytes)",
            data_offset,
            entry.compressed_size
        );

        let section = SectionReader {
            source: &self.source,
            position: data_offset + start,
            remaining: end - start,
        };
        let reader: Box<dyn Read + Send + '_> = match (inflate, validate) {
            (true, true) => Box::new(ValidatingReader::new(
                DeflateDecoder::new(section),
                entry.uncompressed_size,
                entry.crc32,
            )),
            (true, false) => Box::new(DeflateDecoder::new(section)),
            (false, true) => Box::new(ValidatingReader::new(
                section,
                entry.uncompressed_size,
                entry.crc32,
            )),
            (false, false) => Box::new(section),
        };
        Ok(reader)
    }

    /// Reads one entry's decompressed, validated data into a vector
    pub fn read_entry(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut reader = self.entry_reader(entry, &ReadStreamOptions::default())?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Lazy iterator over the central directory of a [`ZipArchive`]
pub struct Entries<'a, S> {
    archive: &'a ZipArchive<S>,
    cursor: u64,
    remaining: u64,
    failed: bool,
}

impl<'a, S: ReadAt> Iterator for Entries<'a, S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        match self.read_next() {
            Ok(entry) => {
                self.remaining -= 1;
                Some(Ok(entry))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        if self.failed {
            (0, Some(0))
        } else {
            (remaining, Some(remaining))
        }
    }
}

impl<'a, S: ReadAt> Entries<'a, S> {
    fn read_next(&mut self) -> Result<Entry> {
        let source = &self.archive.source;
        let fixed = read_exact_at(source, self.cursor, CentralFileHeader::SIZE)?;
        let header = CentralFileHeader::parse(&fixed)?;

        let name_length = header.file_name_length as usize;
        let extra_length = header.extra_fields_length as usize;
        let comment_length = header.comment_length as usize;
        let tail = read_exact_at(
            source,
            self.cursor + CentralFileHeader::SIZE as u64,
            name_length + extra_length + comment_length,
        )?;
        let file_name_raw = tail[..name_length].to_vec();
        let extra_fields_raw = tail[name_length..name_length + extra_length].to_vec();
        let comment_raw = tail[name_length + extra_length..].to_vec();

        self.cursor += header.record_size();

        let entry = Entry::from_parts(
            header,
            file_name_raw,
            extra_fields_raw,
            comment_raw,
            self.archive.decode_strings,
        )?;
        trace!(
            "central directory entry {:?} at local header offset {}",
            entry.file_name,
            entry.relative_offset_of_local_header
        );
        Ok(entry)
    }
}

/// A window of the source exposed as a sequential reader
struct SectionReader<'a, S: ?Sized> {
    source: &'a S,
    position: u64,
    remaining: u64,
}

impl<'a, S: ReadAt + ?Sized> Read for SectionReader<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.source.read_at(self.position, &mut buf[..want])?;
        if n == 0 {
            return Err(ZipError::UnexpectedEof.into());
        }
        self.position += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Reader that counts bytes and accumulates a CRC-32, checking both
/// against the central directory when the stream ends.
struct ValidatingReader<R> {
    inner: R,
    hasher: Crc32,
    bytes_read: u64,
    expected_size: u64,
    expected_crc32: u32,
}

impl<R> ValidatingReader<R> {
    fn new(inner: R, expected_size: u64, expected_crc32: u32) -> Self {
        Self {
            inner,
            hasher: Crc32::new(),
            bytes_read: 0,
            expected_size,
            expected_crc32,
        }
    }
}

impl<R: Read> Read for ValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(0);
            }
            if self.bytes_read != self.expected_size {
                return Err(ZipError::SizeMismatch {
                    field: "uncompressed size",
                    expected: self.expected_size,
                    actual: self.bytes_read,
                }
                .into());
            }
            let actual = self.hasher.clone().finalize();
            if actual != self.expected_crc32 {
                return Err(ZipError::CrcMismatch {
                    expected: self.expected_crc32,
                    actual,
                }
                .into());
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        if self.bytes_read > self.expected_size {
            return Err(ZipError::SizeMismatch {
                field: "uncompressed size",
                expected: self.expected_size,
                actual: self.bytes_read,
            }
            .into());
        }
        Ok(n)
    }
}
