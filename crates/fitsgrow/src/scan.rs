//! Sequential HDU discovery.
//!
//! FITS files carry no index: the only way to find extension N is to walk
//! from the primary HDU, reading each header and seeking over each padded
//! data segment. The scanner reads one block at a time, so memory stays
//! proportional to the largest header, never to the data.

use std::io::{Read, Seek, SeekFrom};

use crate::block::{padded_len, BLOCK_SIZE};
use crate::card::{card_string, parse_header_blocks, Card};
use crate::error::{Error, Result};
use crate::layout::DataLayout;
use crate::synthesis::{layout_from_cards, segment_byte_len};

/// Generous cap on header length, as blocks. A header this long (4096 blocks,
/// 147,456 cards) is corruption, not metadata.
const MAX_HEADER_BLOCKS: u64 = 4096;

/// One discovered HDU: where its header and data live in the file.
#[derive(Debug, Clone)]
pub struct HduEntry {
    /// Zero-based position in the file (0 = primary HDU).
    pub index: usize,
    /// Byte offset of the first header block.
    pub header_offset: u64,
    /// Byte offset of the first data byte (always block-aligned).
    pub data_offset: u64,
    /// Logical data bytes, before block padding.
    pub data_len: u64,
    /// The parsed header cards, up to and including END.
    pub cards: Vec<Card>,
}

impl HduEntry {
    /// The EXTNAME of this HDU, if present.
    pub fn extname(&self) -> Option<String> {
        card_string(&self.cards, "EXTNAME")
    }

    /// Data bytes including block padding.
    pub fn padded_data_len(&self) -> u64 {
        padded_len(self.data_len)
    }

    /// Byte offset one past this HDU's final data block.
    pub fn end_offset(&self) -> u64 {
        self.data_offset + self.padded_data_len()
    }

    /// Interpret the header as a mappable [`DataLayout`].
    pub fn layout(&self) -> Result<DataLayout> {
        layout_from_cards(&self.cards)
    }
}

/// Which HDU to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HduSelector {
    /// Zero-based HDU index (0 = primary).
    Index(usize),
    /// EXTNAME match, ASCII case-insensitive, trailing spaces ignored.
    Name(String),
}

impl HduSelector {
    /// Select an extension by its EXTNAME.
    pub fn name(name: &str) -> Self {
        HduSelector::Name(String::from(name))
    }

    fn matches(&self, entry: &HduEntry) -> bool {
        match self {
            HduSelector::Index(i) => entry.index == *i,
            HduSelector::Name(wanted) => entry
                .extname()
                .map(|n| n.trim_end().eq_ignore_ascii_case(wanted.trim_end()))
                .unwrap_or(false),
        }
    }
}

/// A streaming walker over the HDUs of an open FITS stream.
pub struct HduScanner<R> {
    reader: R,
    pos: u64,
    index: usize,
    done: bool,
}

impl<R: Read + Seek> HduScanner<R> {
    /// Start scanning from the beginning of the stream.
    pub fn new(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        Ok(HduScanner {
            reader,
            pos: 0,
            index: 0,
            done: false,
        })
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next HDU entry, or `None` at a clean end of file.
    ///
    /// A file ending partway through a header or a data segment is an
    /// [`Error::UnexpectedEof`], not a clean end.
    pub fn next_entry(&mut self) -> Result<Option<HduEntry>> {
        if self.done {
            return Ok(None);
        }

        let header_offset = self.pos;
        let mut header = Vec::new();
        let mut block = [0u8; BLOCK_SIZE as usize];

        loop {
            if header.len() as u64 >= MAX_HEADER_BLOCKS * BLOCK_SIZE {
                return Err(Error::InvalidHeader("runaway header (no END card)"));
            }

            let first_block = header.is_empty();
            match read_block(&mut self.reader, &mut block)? {
                BlockRead::Full => {}
                BlockRead::CleanEof if first_block => {
                    self.done = true;
                    return Ok(None);
                }
                BlockRead::CleanEof | BlockRead::Partial => {
                    return Err(Error::UnexpectedEof);
                }
            }
            header.extend_from_slice(&block);

            if block_has_end_card(&block) {
                break;
            }
        }

        let cards = parse_header_blocks(&header)?;
        let data_offset = header_offset + header.len() as u64;
        let data_len = segment_byte_len(&cards)?;

        let entry = HduEntry {
            index: self.index,
            header_offset,
            data_offset,
            data_len,
            cards,
        };

        // Seek past the padded data. The seek itself cannot tell us whether
        // the bytes exist, so probe by seeking to the end of the stream once.
        let next = entry.end_offset();
        let stream_len = self.reader.seek(SeekFrom::End(0))?;
        if stream_len < next {
            return Err(Error::UnexpectedEof);
        }
        self.reader.seek(SeekFrom::Start(next))?;
        self.pos = next;
        self.index += 1;

        Ok(Some(entry))
    }

    /// Walk the whole stream and collect every HDU.
    pub fn entries(&mut self) -> Result<Vec<HduEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next_entry()? {
            out.push(entry);
        }
        Ok(out)
    }

    /// Find the first HDU matching `selector`.
    ///
    /// Returns [`Error::ExtensionNotFound`] when the stream ends without a
    /// match.
    pub fn find(&mut self, selector: &HduSelector) -> Result<HduEntry> {
        while let Some(entry) = self.next_entry()? {
            if selector.matches(&entry) {
                return Ok(entry);
            }
        }
        Err(Error::ExtensionNotFound)
    }

    /// The end offset of the last structurally complete HDU.
    ///
    /// Walks until a clean end of file (returning the full walked length) or
    /// until the first truncated or malformed HDU (returning the end of the
    /// HDU before it). A stream whose primary HDU is already broken yields 0.
    pub fn last_valid_end(&mut self) -> Result<u64> {
        let mut end = 0u64;
        loop {
            match self.next_entry() {
                Ok(Some(entry)) => end = entry.end_offset(),
                Ok(None) => return Ok(end),
                Err(Error::UnexpectedEof)
                | Err(Error::InvalidHeader(_))
                | Err(Error::InvalidKeyword)
                | Err(Error::InvalidValue)
                | Err(Error::InvalidBitpix(_))
                | Err(Error::MissingKeyword(_)) => return Ok(end),
                Err(e) => return Err(e),
            }
        }
    }
}

enum BlockRead {
    Full,
    CleanEof,
    Partial,
}

fn read_block<R: Read>(reader: &mut R, block: &mut [u8]) -> Result<BlockRead> {
    let mut filled = 0;
    while filled < block.len() {
        let n = reader.read(&mut block[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 {
                BlockRead::CleanEof
            } else {
                BlockRead::Partial
            });
        }
        filled += n;
    }
    Ok(BlockRead::Full)
}

fn block_has_end_card(block: &[u8; BLOCK_SIZE as usize]) -> bool {
    block
        .chunks_exact(crate::block::CARD_SIZE)
        .any(|card| &card[..8] == b"END     ")
}
