//! The fixed record structures of the ZIP file format.
//!
//! Every record here carries a 4-byte little-endian signature followed by
//! fixed-size fields and, for some records, a variable tail (file name,
//! extra fields, comment). Parsing validates the signature and field
//! lengths; serializing reproduces the APPNOTE byte layout exactly.
//!
//! Record layouts quote APPNOTE 6.3. Variable tails of the local and
//! central file headers are sliced by the caller from the embedded length
//! words, since their total length is unknown until the fixed part has
//! been read.

use crate::error::{Result, ZipError};

/// Local file header signature, `PK\x03\x04`
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
/// Data descriptor signature, `PK\x07\x08`
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
/// Central directory file header signature, `PK\x01\x02`
pub const CENTRAL_FILE_HEADER_SIGNATURE: u32 = 0x02014b50;
/// End of central directory signature, `PK\x05\x06`
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
/// ZIP64 end of central directory record signature, `PK\x06\x06`
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
/// ZIP64 end of central directory locator signature, `PK\x06\x07`
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Extra field id of the ZIP64 extended information field
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;
/// Extra field id of the Info-ZIP Unicode Path field
pub const UNICODE_PATH_EXTRA_FIELD_ID: u16 = 0x7075;

/// `version made by` written on every central directory header:
/// Unix host, spec 6.3
pub const VERSION_MADE_BY: u16 = (3 << 8) | 63;
/// `version needed to extract` for plain entries
pub const VERSION_NEEDED_DEFAULT: u16 = 20;
/// `version needed to extract` for ZIP64 entries
pub const VERSION_NEEDED_ZIP64: u16 = 45;

/// General purpose flag bit 0: the entry data is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose flag bit 3: CRC and sizes follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag bit 6: strong encryption
pub const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;
/// General purpose flag bit 11: name and comment are UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// 32-bit sentinel demanding ZIP64 resolution
pub const ZIP64_SENTINEL_U32: u32 = 0xffff_ffff;
/// 16-bit sentinel demanding ZIP64 resolution
pub const ZIP64_SENTINEL_U16: u16 = 0xffff;

// Little-endian field readers, straight from the Rust docs: each reads from
// the front of the slice and shrinks it. Callers check the total length up
// front, so the splits cannot fail.

fn read_u64(input: &mut &[u8]) -> u64 {
    let (bytes, rest) = input.split_at(8);
    *input = rest;
    u64::from_le_bytes(bytes.try_into().expect("eight bytes for u64"))
}

fn read_u32(input: &mut &[u8]) -> u32 {
    let (bytes, rest) = input.split_at(4);
    *input = rest;
    u32::from_le_bytes(bytes.try_into().expect("four bytes for u32"))
}

fn read_u16(input: &mut &[u8]) -> u16 {
    let (bytes, rest) = input.split_at(2);
    *input = rest;
    u16::from_le_bytes(bytes.try_into().expect("two bytes for u16"))
}

fn read_u8(input: &mut &[u8]) -> u8 {
    let (bytes, rest) = input.split_at(1);
    *input = rest;
    bytes[0]
}

fn check_signature(input: &mut &[u8], expected: u32, record: &'static str) -> Result<()> {
    let found = read_u32(input);
    if found != expected {
        return Err(ZipError::InvalidFormat(format!(
            "invalid {} signature: 0x{:08x}",
            record, found
        )));
    }
    Ok(())
}

/// The fixed 30-byte part of a local file header.
///
/// The file name and extra fields follow it on disk; their lengths are
/// embedded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_fields_length: u16,
}

impl LocalFileHeader {
    pub const SIZE: usize = 30;

    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(&mut buf, LOCAL_FILE_HEADER_SIGNATURE, "local file header")?;
        Ok(Self {
            version_needed_to_extract: read_u16(&mut buf),
            general_purpose_bit_flag: read_u16(&mut buf),
            compression_method: read_u16(&mut buf),
            last_mod_file_time: read_u16(&mut buf),
            last_mod_file_date: read_u16(&mut buf),
            crc32: read_u32(&mut buf),
            compressed_size: read_u32(&mut buf),
            uncompressed_size: read_u32(&mut buf),
            file_name_length: read_u16(&mut buf),
            extra_fields_length: read_u16(&mut buf),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version_needed_to_extract.to_le_bytes());
        out.extend_from_slice(&self.general_purpose_bit_flag.to_le_bytes());
        out.extend_from_slice(&self.compression_method.to_le_bytes());
        out.extend_from_slice(&self.last_mod_file_time.to_le_bytes());
        out.extend_from_slice(&self.last_mod_file_date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.file_name_length.to_le_bytes());
        out.extend_from_slice(&self.extra_fields_length.to_le_bytes());
        out
    }
}

/// A data descriptor, trailing the file data of entries whose CRC and
/// sizes were unknown when the local header was written.
///
/// The classic form stores 32-bit sizes (16 bytes total); the ZIP64 form
/// stores 64-bit sizes (24 bytes total). Both are written with the
/// signature word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    pub const SIZE_CLASSIC: usize = 16;
    pub const SIZE_ZIP64: usize = 24;

    pub fn parse(mut buf: &[u8], zip64: bool) -> Result<Self> {
        let need = if zip64 {
            Self::SIZE_ZIP64
        } else {
            Self::SIZE_CLASSIC
        };
        if buf.len() < need {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(&mut buf, DATA_DESCRIPTOR_SIGNATURE, "data descriptor")?;
        let crc32 = read_u32(&mut buf);
        let (compressed_size, uncompressed_size) = if zip64 {
            (read_u64(&mut buf), read_u64(&mut buf))
        } else {
            (read_u32(&mut buf) as u64, read_u32(&mut buf) as u64)
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    pub fn serialize(&self, zip64: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE_ZIP64);
        out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if zip64 {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
            out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
        }
        out
    }
}

/// The fixed 46-byte part of a central directory file header.
///
/// The file name, extra fields, and comment follow it on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralFileHeader {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_fields_length: u16,
    pub comment_length: u16,
    pub disk_number_start: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub relative_offset_of_local_header: u32,
}

impl CentralFileHeader {
    pub const SIZE: usize = 46;

    /// Total on-disk size of this record including its variable tail.
    pub fn record_size(&self) -> u64 {
        Self::SIZE as u64
            + self.file_name_length as u64
            + self.extra_fields_length as u64
            + self.comment_length as u64
    }

    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(
            &mut buf,
            CENTRAL_FILE_HEADER_SIGNATURE,
            "central directory file header",
        )?;
        Ok(Self {
            version_made_by: read_u16(&mut buf),
            version_needed_to_extract: read_u16(&mut buf),
            general_purpose_bit_flag: read_u16(&mut buf),
            compression_method: read_u16(&mut buf),
            last_mod_file_time: read_u16(&mut buf),
            last_mod_file_date: read_u16(&mut buf),
            crc32: read_u32(&mut buf),
            compressed_size: read_u32(&mut buf),
            uncompressed_size: read_u32(&mut buf),
            file_name_length: read_u16(&mut buf),
            extra_fields_length: read_u16(&mut buf),
            comment_length: read_u16(&mut buf),
            disk_number_start: read_u16(&mut buf),
            internal_file_attributes: read_u16(&mut buf),
            external_file_attributes: read_u32(&mut buf),
            relative_offset_of_local_header: read_u32(&mut buf),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&CENTRAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed_to_extract.to_le_bytes());
        out.extend_from_slice(&self.general_purpose_bit_flag.to_le_bytes());
        out.extend_from_slice(&self.compression_method.to_le_bytes());
        out.extend_from_slice(&self.last_mod_file_time.to_le_bytes());
        out.extend_from_slice(&self.last_mod_file_date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.file_name_length.to_le_bytes());
        out.extend_from_slice(&self.extra_fields_length.to_le_bytes());
        out.extend_from_slice(&self.comment_length.to_le_bytes());
        out.extend_from_slice(&self.disk_number_start.to_le_bytes());
        out.extend_from_slice(&self.internal_file_attributes.to_le_bytes());
        out.extend_from_slice(&self.external_file_attributes.to_le_bytes());
        out.extend_from_slice(&self.relative_offset_of_local_header.to_le_bytes());
        out
    }
}

/// The end of central directory record, the trailing anchor of every
/// archive. 22 fixed bytes plus the archive comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entry_count: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIZE: usize = 22;

    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(
            &mut buf,
            END_OF_CENTRAL_DIRECTORY_SIGNATURE,
            "end of central directory record",
        )?;
        let disk_number = read_u16(&mut buf);
        let disk_with_central_directory = read_u16(&mut buf);
        let entries_on_this_disk = read_u16(&mut buf);
        let entry_count = read_u16(&mut buf);
        let central_directory_size = read_u32(&mut buf);
        let central_directory_offset = read_u32(&mut buf);
        let comment_length = read_u16(&mut buf) as usize;
        if buf.len() < comment_length {
            return Err(ZipError::UnexpectedEof);
        }
        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entry_count,
            central_directory_size,
            central_directory_offset,
            comment: buf[..comment_length].to_vec(),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE + self.comment.len());
        out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.disk_with_central_directory.to_le_bytes());
        out.extend_from_slice(&self.entries_on_this_disk.to_le_bytes());
        out.extend_from_slice(&self.entry_count.to_le_bytes());
        out.extend_from_slice(&self.central_directory_size.to_le_bytes());
        out.extend_from_slice(&self.central_directory_offset.to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.comment);
        out
    }
}

/// The ZIP64 end of central directory record. 56 fixed bytes; the
/// extensible data sector that may follow is preserved on parse but never
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entry_count: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub const SIZE: usize = 56;

    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(
            &mut buf,
            ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE,
            "zip64 end of central directory record",
        )?;
        // Size of the remainder of the record; everything past the fixed
        // fields is the extensible data sector, which nothing here consumes.
        let _record_size = read_u64(&mut buf);
        Ok(Self {
            version_made_by: read_u16(&mut buf),
            version_needed_to_extract: read_u16(&mut buf),
            disk_number: read_u32(&mut buf),
            disk_with_central_directory: read_u32(&mut buf),
            entries_on_this_disk: read_u64(&mut buf),
            entry_count: read_u64(&mut buf),
            central_directory_size: read_u64(&mut buf),
            central_directory_offset: read_u64(&mut buf),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        // 4.3.14.1: the stored size excludes the signature and this field
        out.extend_from_slice(&(Self::SIZE as u64 - 12).to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed_to_extract.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.disk_with_central_directory.to_le_bytes());
        out.extend_from_slice(&self.entries_on_this_disk.to_le_bytes());
        out.extend_from_slice(&self.entry_count.to_le_bytes());
        out.extend_from_slice(&self.central_directory_size.to_le_bytes());
        out.extend_from_slice(&self.central_directory_offset.to_le_bytes());
        out
    }
}

/// The ZIP64 end of central directory locator, fixed 20 bytes, sitting
/// immediately before the classic end record when ZIP64 is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EocdLocator {
    pub disk_with_zip64_eocd: u32,
    pub zip64_eocd_offset: u64,
    pub total_disks: u32,
}

impl Zip64EocdLocator {
    pub const SIZE: usize = 20;

    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::UnexpectedEof);
        }
        check_signature(
            &mut buf,
            ZIP64_EOCD_LOCATOR_SIGNATURE,
            "zip64 end of central directory locator",
        )?;
        Ok(Self {
            disk_with_zip64_eocd: read_u32(&mut buf),
            zip64_eocd_offset: read_u64(&mut buf),
            total_disks: read_u32(&mut buf),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.disk_with_zip64_eocd.to_le_bytes());
        out.extend_from_slice(&self.zip64_eocd_offset.to_le_bytes());
        out.extend_from_slice(&self.total_disks.to_le_bytes());
        out
    }
}

/// One `{id, size, data}` record from an extra-fields block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub id: u16,
    pub data: Vec<u8>,
}

/// Splits an extra-fields block into its TLV records.
///
/// Fails when a declared length extends past the end of the block.
pub fn parse_extra_fields(mut buf: &[u8]) -> Result<Vec<ExtraField>> {
    let mut fields = Vec::new();
    while !buf.is_empty() {
        if buf.len() < 4 {
            return Err(ZipError::InvalidFormat(
                "truncated extra field header".to_string(),
            ));
        }
        let id = read_u16(&mut buf);
        let length = read_u16(&mut buf) as usize;
        if buf.len() < length {
            return Err(ZipError::InvalidFormat(format!(
                "extra field 0x{:04x} length {} overruns the block",
                id, length
            )));
        }
        let (data, rest) = buf.split_at(length);
        buf = rest;
        fields.push(ExtraField {
            id,
            data: data.to_vec(),
        });
    }
    Ok(fields)
}

/// Concatenates TLV records back into an extra-fields block.
pub fn serialize_extra_fields(fields: &[ExtraField]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        out.extend_from_slice(&field.id.to_le_bytes());
        out.extend_from_slice(&(field.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&field.data);
    }
    out
}

/// The ZIP64 extended information extra field, resolved against the
/// sentinels of the record it annotates.
///
/// The payload holds only the fields whose 32-bit counterparts stored a
/// sentinel, in a fixed order: uncompressed size, compressed size, local
/// header offset (8 bytes each), disk number start (4 bytes). The cursor
/// advances only for fields that are actually present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64ExtraField {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub relative_offset_of_local_header: Option<u64>,
    pub disk_number_start: Option<u32>,
}

impl Zip64ExtraField {
    pub fn parse(
        mut data: &[u8],
        need_uncompressed: bool,
        need_compressed: bool,
        need_offset: bool,
        need_disk: bool,
    ) -> Result<Self> {
        fn check_room(data: &[u8], bytes: usize) -> Result<()> {
            if data.len() < bytes {
                return Err(ZipError::InvalidFormat(
                    "zip64 extended information extra field is too short for the \
                     sentinel fields it must resolve"
                        .to_string(),
                ));
            }
            Ok(())
        }

        let mut resolved = Self::default();
        if need_uncompressed {
            check_room(data, 8)?;
            resolved.uncompressed_size = Some(read_u64(&mut data));
        }
        if need_compressed {
            check_room(data, 8)?;
            resolved.compressed_size = Some(read_u64(&mut data));
        }
        if need_offset {
            check_room(data, 8)?;
            resolved.relative_offset_of_local_header = Some(read_u64(&mut data));
        }
        if need_disk {
            check_room(data, 4)?;
            resolved.disk_number_start = Some(read_u32(&mut data));
        }
        Ok(resolved)
    }
}

/// The Info-ZIP Unicode Path extra field: a UTF-8 rendition of the file
/// name, guarded by a CRC-32 of the raw header name it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePathExtraField {
    pub version: u8,
    pub name_crc32: u32,
    pub utf8_name: Vec<u8>,
}

impl UnicodePathExtraField {
    pub fn parse(mut data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(ZipError::InvalidFormat(
                "truncated Info-ZIP Unicode Path extra field".to_string(),
            ));
        }
        let version = read_u8(&mut data);
        let name_crc32 = read_u32(&mut data);
        Ok(Self {
            version,
            name_crc32,
            utf8_name: data.to_vec(),
        })
    }
}
