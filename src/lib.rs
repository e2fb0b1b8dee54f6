//! # rw-zip: Streaming ZIP Archive Reader/Writer
//!
//! `rw-zip` reads, writes, and modifies ZIP archives per PKWARE APPNOTE
//! 6.3, including the ZIP64 extensions. It is built around two pipelines:
//!
//! - **Reading** works over any random-access source (a file handle, an
//!   in-memory buffer) and never loads more than it needs: the end of
//!   central directory record is found with a trailing-window search, the
//!   central directory is walked lazily, and each entry exposes a stream
//!   that inflates and validates on the fly.
//! - **Writing** produces a contiguous byte stream to any sink. Entry data
//!   flows through CRC and size taps (and optionally deflate); entries
//!   whose sizes are unknown up front are streamed with data descriptors.
//!   ZIP64 records appear exactly when the sizes, offsets, or entry counts
//!   demand them, or when forced.
//!
//! Names and comments are UTF-8 or CP437 per the entry flags, with the
//! Info-ZIP Unicode Path field honored when its checksum matches.
//!
//! ## Reading a ZIP file
//!
//! ```no_run
//! use rw_zip::ZipArchive;
//!
//! let archive = ZipArchive::open("archive.zip")?;
//! for entry in archive.entries() {
//!     let entry = entry?;
//!     println!(
//!         "{}: {} bytes",
//!         entry.file_name.as_deref().unwrap_or("<raw>"),
//!         entry.uncompressed_size
//!     );
//!     let data = archive.read_entry(&entry)?;
//!     assert_eq!(data.len() as u64, entry.uncompressed_size);
//! }
//! # Ok::<(), rw_zip::ZipError>(())
//! ```
//!
//! ## Writing a ZIP file
//!
//! ```no_run
//! use rw_zip::{EntryOptions, FinishOptions, ZipWriter};
//!
//! let mut writer = ZipWriter::create("output.zip")?;
//! writer.add_buffer(b"Hello, World!", "hello.txt", &EntryOptions::default())?;
//! writer.add_directory("docs", &EntryOptions::default())?;
//! writer.add_file("README.md", "docs/README.md", &EntryOptions::default())?;
//! writer.finish(&FinishOptions::default())?;
//! # Ok::<(), rw_zip::ZipError>(())
//! ```

pub mod error;
pub mod reader;
pub mod source;
pub mod spec;
pub mod strings;
pub mod timestamp;
pub mod writer;

pub use error::{Result, ZipError};
pub use reader::{CompressionMethod, Entries, Entry, OpenOptions, ReadStreamOptions, ZipArchive};
pub use source::ReadAt;
pub use writer::{EntryId, EntryOptions, FinishOptions, ZipWriter};
