//! Appending reserved extensions to a FITS file on disk.
//!
//! Reservation writes only the header; the data segment is created by
//! extending the file to its final length without writing the payload.
//! In the default sparse mode that means one seek and a single zero byte
//! at the last position, so reserving a multi-terabyte extension costs
//! O(header) time and memory and, on filesystems with hole support, almost
//! no disk until the data is actually filled.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::block::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::scan::{HduScanner, HduSelector};
use crate::synthesis::{minimal_primary, SynthesizedHeader};

/// How the reserved data segment is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReserveOptions {
    /// Write every data byte as an explicit zero instead of punching a
    /// sparse hole. Slower and allocation-heavy, but guarantees the blocks
    /// are backed by real storage, so later fills cannot hit a full disk.
    pub zero_fill: bool,
}

impl ReserveOptions {
    /// Zero-fill instead of sparse extension.
    pub fn zero_filled() -> Self {
        ReserveOptions { zero_fill: true }
    }
}

/// A successfully reserved extension: where it landed in the file.
#[derive(Debug, Clone)]
pub struct ReservedExtension {
    path: PathBuf,
    /// Zero-based HDU index of the new extension.
    pub index: usize,
    /// Byte offset of the extension's first header block.
    pub header_offset: u64,
    /// Byte offset of the extension's first data byte.
    pub data_offset: u64,
    /// Logical data bytes, before block padding.
    pub data_len: u64,
    /// Data bytes including block padding.
    pub padded_data_len: u64,
}

impl ReservedExtension {
    /// The file this extension lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A selector addressing this extension by position.
    pub fn selector(&self) -> HduSelector {
        HduSelector::Index(self.index)
    }
}

/// Create a new FITS file holding only a minimal primary HDU.
///
/// The primary header is a single block (SIMPLE, BITPIX = 8, NAXIS = 0,
/// EXTEND = T) with an empty data segment, so the first reservation starts
/// at byte 2880. Fails if `path` already exists.
pub fn create_minimal_file(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(&minimal_primary().to_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Append a synthesized extension to an existing FITS file and reserve its
/// data segment.
///
/// The file must currently end exactly at an HDU boundary: every HDU parses
/// and the final one's padded data runs to the last byte. Anything else
/// (truncated data, trailing garbage, an empty file) is [`Error::NotAppendable`].
pub fn reserve_extension(
    path: &Path,
    header: &SynthesizedHeader,
    options: ReserveOptions,
) -> Result<ReservedExtension> {
    let padded_data_len = header.padded_data_len()?;
    let data_len = header.layout().byte_len()?;

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let (index, append_at) = appendable_end(&file)?;

    let mut file = file;
    file.seek(SeekFrom::Start(append_at))?;
    let header_bytes = header.to_bytes();
    file.write_all(&header_bytes).map_err(map_space_error)?;

    let data_offset = append_at + header_bytes.len() as u64;
    if padded_data_len > 0 {
        if options.zero_fill {
            zero_fill(&mut file, padded_data_len)?;
        } else {
            sparse_extend(&mut file, data_offset, padded_data_len)?;
        }
    }
    file.sync_all()?;

    Ok(ReservedExtension {
        path: path.to_path_buf(),
        index,
        header_offset: append_at,
        data_offset,
        data_len,
        padded_data_len,
    })
}

/// Drop everything after the last structurally complete HDU.
///
/// Returns the new file length. A file whose primary HDU is already broken
/// is truncated to zero bytes.
pub fn truncate_to_last_valid(path: &Path) -> Result<u64> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let end = HduScanner::new(&file)?.last_valid_end()?;
    file.set_len(end)?;
    file.sync_all()?;
    Ok(end)
}

/// Verify the file ends on an HDU boundary; return the next HDU index and
/// the append offset.
fn appendable_end(file: &File) -> Result<(usize, u64)> {
    let file_len = file.metadata()?.len();
    if file_len == 0 {
        return Err(Error::NotAppendable("file is empty"));
    }
    if file_len % BLOCK_SIZE != 0 {
        return Err(Error::NotAppendable("length is not a block multiple"));
    }

    let mut scanner = HduScanner::new(file)?;
    let mut count = 0usize;
    let mut end = 0u64;
    loop {
        match scanner.next_entry() {
            Ok(Some(entry)) => {
                count += 1;
                end = entry.end_offset();
            }
            Ok(None) => break,
            Err(Error::UnexpectedEof) => {
                return Err(Error::NotAppendable("final HDU is truncated"));
            }
            Err(Error::Io(e)) => return Err(Error::Io(e)),
            Err(_) => return Err(Error::NotAppendable("malformed header")),
        }
    }
    if end != file_len {
        return Err(Error::NotAppendable("trailing bytes after last HDU"));
    }
    Ok((count, end))
}

/// Extend by seeking to the would-be final byte and writing a single zero.
/// The skipped range reads back as zeros, which is exactly FITS data
/// padding.
fn sparse_extend(file: &mut File, data_offset: u64, padded_data_len: u64) -> Result<()> {
    let last = data_offset + padded_data_len - 1;
    file.seek(SeekFrom::Start(last))?;
    file.write_all(&[0u8]).map_err(map_space_error)?;
    Ok(())
}

/// Stream explicit zeros, a bounded buffer at a time.
fn zero_fill(file: &mut File, total: u64) -> Result<()> {
    const CHUNK_BLOCKS: u64 = 256;
    let buf = vec![0u8; (CHUNK_BLOCKS * BLOCK_SIZE) as usize];
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        file.write_all(&buf[..n]).map_err(map_space_error)?;
        remaining -= n as u64;
    }
    Ok(())
}

fn map_space_error(e: io::Error) -> Error {
    if e.kind() == ErrorKind::StorageFull {
        Error::InsufficientDiskSpace(e)
    } else {
        Error::Io(e)
    }
}
