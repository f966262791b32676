//! FITS header card parsing and block serialization.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::str;

use crate::block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE, HEADER_PAD_BYTE};
use crate::error::{Error, Result};
use crate::value::{format_value, parse_value, Value};

/// A parsed FITS header card (one 80-byte keyword record).
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The parsed value, if this card has a value indicator (`= ` in bytes 8..10).
    pub value: Option<Value>,
    /// An optional comment string.
    pub comment: Option<String>,
}

impl Card {
    /// Create a card with a value and no comment.
    pub fn new(keyword: &str, value: Value) -> Self {
        Card {
            keyword: kw(keyword.as_bytes()),
            value: Some(value),
            comment: None,
        }
    }

    /// Create a card with a value and a comment.
    pub fn with_comment(keyword: &str, value: Value, comment: &str) -> Self {
        Card {
            keyword: kw(keyword.as_bytes()),
            value: Some(value),
            comment: Some(String::from(comment)),
        }
    }

    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        &self.keyword == b"END     "
    }

    /// Returns `true` if this is a blank card (keyword is all spaces).
    pub fn is_blank(&self) -> bool {
        self.keyword.iter().all(|&b| b == b' ')
    }

    /// Returns `true` for COMMENT, HISTORY, or blank-keyword cards.
    pub fn is_commentary(&self) -> bool {
        let kw = self.keyword_str();
        kw == "COMMENT" || kw == "HISTORY" || self.is_blank()
    }
}

/// Pad a short keyword name to 8 bytes with trailing ASCII spaces.
pub(crate) const fn kw(name: &[u8]) -> [u8; 8] {
    let mut buf = [b' '; 8];
    let mut i = 0;
    while i < name.len() && i < 8 {
        buf[i] = name[i];
        i += 1;
    }
    buf
}

/// Keywords that never carry a value indicator; their bytes 8..80 are free text.
fn is_commentary_keyword(keyword: &[u8; 8]) -> bool {
    keyword == b"COMMENT " || keyword == b"HISTORY " || keyword == b"        "
}

fn free_text_comment(card_bytes: &[u8; CARD_SIZE]) -> Result<Option<String>> {
    let text = str::from_utf8(&card_bytes[8..CARD_SIZE])
        .map_err(|_| Error::InvalidHeader("non-ASCII card text"))?
        .trim_end();
    Ok(if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    })
}

/// Parse a single 80-byte FITS header card.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let mut keyword = [b' '; 8];
    keyword.copy_from_slice(&card_bytes[..8]);

    for &b in &keyword {
        match b {
            b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_' => {}
            _ => return Err(Error::InvalidKeyword),
        }
    }

    if &keyword == b"END     " {
        return Ok(Card {
            keyword,
            value: None,
            comment: None,
        });
    }

    if is_commentary_keyword(&keyword) || !(card_bytes[8] == b'=' && card_bytes[9] == b' ') {
        return Ok(Card {
            keyword,
            value: None,
            comment: free_text_comment(card_bytes)?,
        });
    }

    let value_field = &card_bytes[10..CARD_SIZE];
    match parse_value(value_field) {
        Some((val, comment)) => Ok(Card {
            keyword,
            value: Some(val),
            comment: comment.map(String::from),
        }),
        None => Ok(Card {
            keyword,
            value: None,
            comment: None,
        }),
    }
}

/// Serialize a [`Card`] into an 80-byte FITS card image.
pub fn format_card(card: &Card) -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(&card.keyword);

    if let Some(ref value) = card.value {
        buf[8] = b'=';
        buf[9] = b' ';

        let mut field = format_value(value);
        if let Some(ref comment) = card.comment {
            insert_comment(&mut field, comment);
        }
        buf[10..80].copy_from_slice(&field);
    } else if !card.is_blank() {
        if let Some(ref comment) = card.comment {
            let bytes = comment.as_bytes();
            let len = bytes.len().min(72);
            buf[8..8 + len].copy_from_slice(&bytes[..len]);
        }
    }

    buf
}

/// Insert a ` / comment` string into a 70-byte value field.
fn insert_comment(field: &mut [u8; 70], comment: &str) {
    let content_end = if field[0] == b'\'' {
        let mut i = 1;
        loop {
            if i >= 70 {
                break i;
            }
            if field[i] == b'\'' {
                if i + 1 < 70 && field[i + 1] == b'\'' {
                    i += 2;
                } else {
                    break i + 1;
                }
            } else {
                i += 1;
            }
        }
    } else {
        20
    };

    let sep_start = content_end + 1;
    if sep_start + 3 >= 70 {
        return;
    }

    field[sep_start] = b'/';
    field[sep_start + 1] = b' ';

    let comment_start = sep_start + 2;
    let comment_bytes = comment.as_bytes();
    let len = comment_bytes.len().min(70 - comment_start);
    field[comment_start..comment_start + len].copy_from_slice(&comment_bytes[..len]);
}

/// Create the standard FITS END card.
pub fn format_end_card() -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..3].copy_from_slice(b"END");
    buf
}

/// Serialize a sequence of header cards into complete FITS header blocks.
///
/// Appends the END card and pads the final block with blank cards. The
/// returned length is always a multiple of [`BLOCK_SIZE`].
pub fn serialize_header(cards: &[Card]) -> Vec<u8> {
    let total_cards = cards.len() + 1; // +1 for END
    let total_blocks = total_cards.div_ceil(CARDS_PER_BLOCK);
    let total_bytes = total_blocks * BLOCK_SIZE as usize;

    let mut buf = vec![HEADER_PAD_BYTE; total_bytes];

    for (i, card) in cards.iter().enumerate() {
        let offset = i * CARD_SIZE;
        buf[offset..offset + CARD_SIZE].copy_from_slice(&format_card(card));
    }

    let end_offset = cards.len() * CARD_SIZE;
    buf[end_offset..end_offset + CARD_SIZE].copy_from_slice(&format_end_card());

    buf
}

/// Parse consecutive 2880-byte header blocks until the END card is found.
///
/// Only complete blocks are scanned; trailing bytes shorter than a block are
/// ignored. Returns all cards up to and including END.
pub fn parse_header_blocks(data: &[u8]) -> Result<Vec<Card>> {
    if data.len() < BLOCK_SIZE as usize {
        return Err(Error::UnexpectedEof);
    }

    let mut cards = Vec::new();
    let num_blocks = data.len() / BLOCK_SIZE as usize;

    for block_idx in 0..num_blocks {
        let block_start = block_idx * BLOCK_SIZE as usize;
        for card_idx in 0..CARDS_PER_BLOCK {
            let card_start = block_start + card_idx * CARD_SIZE;
            let card_bytes: &[u8; CARD_SIZE] = data[card_start..card_start + CARD_SIZE]
                .try_into()
                .map_err(|_| Error::InvalidHeader("short card"))?;

            let card = parse_card(card_bytes)?;
            let is_end = card.is_end();
            cards.push(card);

            if is_end {
                return Ok(cards);
            }
        }
    }

    Err(Error::UnexpectedEof)
}

/// Return the number of bytes consumed by the header (always a multiple of
/// [`BLOCK_SIZE`]), found by scanning whole blocks for the END card.
pub fn header_byte_len(data: &[u8]) -> Result<usize> {
    if data.len() < BLOCK_SIZE as usize {
        return Err(Error::UnexpectedEof);
    }

    let num_blocks = data.len() / BLOCK_SIZE as usize;

    for block_idx in 0..num_blocks {
        let block_start = block_idx * BLOCK_SIZE as usize;
        for card_idx in 0..CARDS_PER_BLOCK {
            let card_start = block_start + card_idx * CARD_SIZE;
            if &data[card_start..card_start + 8] == b"END     " {
                return Ok((block_idx + 1) * BLOCK_SIZE as usize);
            }
        }
    }

    Err(Error::UnexpectedEof)
}

/// Find the first card with the given keyword.
pub fn find_card<'a>(cards: &'a [Card], keyword: &str) -> Option<&'a Card> {
    let name = kw(keyword.as_bytes());
    cards.iter().find(|c| c.keyword == name)
}

/// Extract the integer value of the named card, if present.
pub fn card_integer(cards: &[Card], keyword: &str) -> Option<i64> {
    match find_card(cards, keyword)?.value {
        Some(Value::Integer(n)) => Some(n),
        _ => None,
    }
}

/// Extract the trimmed string value of the named card, if present.
pub fn card_string(cards: &[Card], keyword: &str) -> Option<String> {
    match find_card(cards, keyword)?.value {
        Some(Value::Str(ref s)) => Some(String::from(s.trim())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_card(s: &str) -> [u8; CARD_SIZE] {
        let mut buf = [b' '; CARD_SIZE];
        let bytes = s.as_bytes();
        let len = bytes.len().min(CARD_SIZE);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    fn make_header_block(cards: &[[u8; CARD_SIZE]]) -> Vec<u8> {
        assert!(cards.len() <= CARDS_PER_BLOCK);
        let mut block = vec![b' '; BLOCK_SIZE as usize];
        for (i, card) in cards.iter().enumerate() {
            let start = i * CARD_SIZE;
            block[start..start + CARD_SIZE].copy_from_slice(card);
        }
        block
    }

    #[test]
    fn parse_card_string_value() {
        let card = make_card("XTENSION= 'BINTABLE'           / binary table extension");
        let c = parse_card(&card).unwrap();
        assert_eq!(c.keyword_str(), "XTENSION");
        assert_eq!(c.value, Some(Value::Str(String::from("BINTABLE"))));
        assert_eq!(c.comment, Some(String::from("binary table extension")));
    }

    #[test]
    fn parse_card_integer_value() {
        let card = make_card("NAXIS2  =                 4000 / number of rows");
        let c = parse_card(&card).unwrap();
        assert_eq!(c.keyword_str(), "NAXIS2");
        assert_eq!(c.value, Some(Value::Integer(4000)));
        assert_eq!(c.comment, Some(String::from("number of rows")));
    }

    #[test]
    fn parse_card_logical() {
        let card = make_card("SIMPLE  =                    T / standard FITS");
        let c = parse_card(&card).unwrap();
        assert_eq!(c.value, Some(Value::Logical(true)));
    }

    #[test]
    fn parse_card_commentary() {
        let card = make_card("COMMENT reserved by fitsgrow");
        let c = parse_card(&card).unwrap();
        assert!(c.is_commentary());
        assert!(c.value.is_none());
        assert_eq!(c.comment, Some(String::from("reserved by fitsgrow")));
    }

    #[test]
    fn parse_card_end() {
        let card = make_card("END");
        let c = parse_card(&card).unwrap();
        assert!(c.is_end());
    }

    #[test]
    fn parse_card_hyphen_keyword() {
        let card = make_card("DATE-OBS= '2024-01-15'");
        let c = parse_card(&card).unwrap();
        assert_eq!(c.keyword_str(), "DATE-OBS");
    }

    #[test]
    fn parse_card_invalid_keyword_lowercase() {
        let card = make_card("bitpix  =                   16");
        assert!(matches!(parse_card(&card), Err(Error::InvalidKeyword)));
    }

    #[test]
    fn parse_header_simple() {
        let cards = [
            make_card("SIMPLE  =                    T"),
            make_card("BITPIX  =                    8"),
            make_card("NAXIS   =                    0"),
            make_card("END"),
        ];
        let block = make_header_block(&cards);
        let parsed = parse_header_blocks(&block).unwrap();
        assert_eq!(parsed.len(), 4);
        assert!(parsed[3].is_end());
    }

    #[test]
    fn parse_header_no_end_card() {
        let cards = [make_card("SIMPLE  =                    T")];
        let block = make_header_block(&cards);
        assert!(matches!(
            parse_header_blocks(&block),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn parse_header_too_small() {
        let data = vec![b' '; 100];
        assert!(matches!(
            parse_header_blocks(&data),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn parse_header_spanning_two_blocks() {
        let mut data = vec![b' '; 2 * BLOCK_SIZE as usize];
        for i in 0..CARDS_PER_BLOCK {
            let card_str = alloc::format!("KEY{:<5}=                     {}", i, i);
            let card = make_card(&card_str);
            data[i * CARD_SIZE..(i + 1) * CARD_SIZE].copy_from_slice(&card);
        }
        let end = make_card("END");
        data[BLOCK_SIZE as usize..BLOCK_SIZE as usize + CARD_SIZE].copy_from_slice(&end);

        let parsed = parse_header_blocks(&data).unwrap();
        assert_eq!(parsed.len(), CARDS_PER_BLOCK + 1);
        assert!(parsed.last().unwrap().is_end());
    }

    #[test]
    fn header_byte_len_single_block() {
        let cards = [make_card("SIMPLE  =                    T"), make_card("END")];
        let block = make_header_block(&cards);
        assert_eq!(header_byte_len(&block).unwrap(), BLOCK_SIZE as usize);
    }

    #[test]
    fn header_byte_len_no_end() {
        let cards = [make_card("SIMPLE  =                    T")];
        let block = make_header_block(&cards);
        assert!(header_byte_len(&block).is_err());
    }

    // ---- writing ----

    #[test]
    fn format_card_value_indicator() {
        let card = Card::new("EXTNAME", Value::Str(String::from("EVENTS")));
        let buf = format_card(&card);
        assert_eq!(&buf[8..10], b"= ");
    }

    #[test]
    fn format_card_with_comment() {
        let card = Card::with_comment("NAXIS", Value::Integer(2), "number of axes");
        let buf = format_card(&card);
        let s = core::str::from_utf8(&buf).unwrap();
        assert!(s.contains("/ number of axes"));
    }

    #[test]
    fn end_card_format() {
        let buf = format_end_card();
        assert_eq!(&buf[0..3], b"END");
        for &b in &buf[3..] {
            assert_eq!(b, b' ');
        }
    }

    #[test]
    fn serialize_header_block_aligned() {
        let cards = vec![Card::new("SIMPLE", Value::Logical(true))];
        let header = serialize_header(&cards);
        assert_eq!(header.len(), BLOCK_SIZE as usize);
        assert_eq!(&header[80..83], b"END");
    }

    #[test]
    fn serialize_header_padding_is_spaces() {
        let cards = vec![Card::new("SIMPLE", Value::Logical(true))];
        let header = serialize_header(&cards);
        for &b in &header[160..] {
            assert_eq!(b, b' ');
        }
    }

    #[test]
    fn serialize_header_exactly_one_block() {
        let cards: Vec<Card> = (0..35)
            .map(|i| Card::new(&alloc::format!("KEY{:05}", i), Value::Integer(i as i64)))
            .collect();
        assert_eq!(serialize_header(&cards).len(), BLOCK_SIZE as usize);
    }

    #[test]
    fn serialize_header_spills_to_two_blocks() {
        let cards: Vec<Card> = (0..36)
            .map(|i| Card::new(&alloc::format!("KEY{:05}", i), Value::Integer(i as i64)))
            .collect();
        assert_eq!(serialize_header(&cards).len(), 2 * BLOCK_SIZE as usize);
    }

    #[test]
    fn roundtrip_serialize_then_parse() {
        let cards = vec![
            Card::with_comment("SIMPLE", Value::Logical(true), "conforms to FITS"),
            Card::new("BITPIX", Value::Integer(16)),
            Card::new("NAXIS", Value::Integer(0)),
        ];
        let header = serialize_header(&cards);
        let parsed = parse_header_blocks(&header).unwrap();

        assert_eq!(parsed.len(), 4); // 3 cards + END
        assert_eq!(parsed[0].value, Some(Value::Logical(true)));
        assert_eq!(parsed[1].value, Some(Value::Integer(16)));
        assert_eq!(parsed[2].value, Some(Value::Integer(0)));
        assert!(parsed[3].is_end());
    }

    // ---- lookup helpers ----

    #[test]
    fn card_lookup_helpers() {
        let cards = vec![
            Card::new("BITPIX", Value::Integer(-64)),
            Card::new("EXTNAME", Value::Str(String::from("SCI  "))),
        ];
        assert_eq!(card_integer(&cards, "BITPIX"), Some(-64));
        assert_eq!(card_string(&cards, "EXTNAME").unwrap(), "SCI");
        assert!(card_integer(&cards, "NAXIS").is_none());
        assert!(find_card(&cards, "MISSING").is_none());
    }
}
