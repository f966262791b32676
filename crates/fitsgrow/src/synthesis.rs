//! Header synthesis for data that does not exist yet.
//!
//! A [`SynthesizedHeader`] holds the structural description of an HDU
//! (primary or extension) and regenerates its mandatory cards on demand.
//! Because the cards are derived from a [`DataLayout`] rather than edited in
//! place, reshaping an already-built header can never leave NAXISn cards
//! inconsistent with the advertised data size.

use alloc::string::String;
use alloc::vec::Vec;

use crate::block::BLOCK_SIZE;
use crate::card::{card_integer, card_string, find_card, serialize_header, Card};
use crate::error::{Error, Result};
use crate::layout::{format_tform, parse_tform, DataLayout, Field, PixelType, RowLayout};
use crate::value::Value;

/// What kind of HDU a synthesized header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    /// The primary HDU (SIMPLE = T).
    Primary,
    /// An IMAGE extension.
    ImageExtension,
    /// A BINTABLE extension.
    TableExtension,
}

/// A header for an HDU whose data segment has not been written yet.
#[derive(Debug, Clone)]
pub struct SynthesizedHeader {
    kind: HeaderKind,
    layout: DataLayout,
    extname: Option<String>,
    extra: Vec<Card>,
}

impl SynthesizedHeader {
    /// Describe a primary HDU holding an image.
    ///
    /// The size of the described data segment is validated immediately so
    /// that an overflowing shape fails here, not at reservation time.
    pub fn primary(pixel: PixelType, shape: &[u64]) -> Result<Self> {
        let layout = DataLayout::Image {
            pixel,
            shape: shape.to_vec(),
        };
        validate_layout(&layout)?;
        Ok(SynthesizedHeader {
            kind: HeaderKind::Primary,
            layout,
            extname: None,
            extra: Vec::new(),
        })
    }

    /// Describe an IMAGE extension.
    pub fn image(pixel: PixelType, shape: &[u64]) -> Result<Self> {
        let layout = DataLayout::Image {
            pixel,
            shape: shape.to_vec(),
        };
        validate_layout(&layout)?;
        Ok(SynthesizedHeader {
            kind: HeaderKind::ImageExtension,
            layout,
            extname: None,
            extra: Vec::new(),
        })
    }

    /// Describe a BINTABLE extension with the given row layout and row count.
    pub fn table(row: RowLayout, rows: u64) -> Result<Self> {
        let layout = DataLayout::Table { row, rows };
        validate_layout(&layout)?;
        Ok(SynthesizedHeader {
            kind: HeaderKind::TableExtension,
            layout,
            extname: None,
            extra: Vec::new(),
        })
    }

    /// Set the EXTNAME card.
    ///
    /// A card value holds at most 68 characters; a longer name is truncated
    /// at serialization and will no longer match a by-name lookup of the
    /// full string.
    pub fn with_extname(mut self, name: &str) -> Self {
        self.extname = Some(String::from(name));
        self
    }

    /// Append a non-structural card after the mandatory ones.
    pub fn push_card(&mut self, card: Card) {
        self.extra.push(card);
    }

    /// The data layout this header describes.
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// The EXTNAME, if one was set.
    pub fn extname(&self) -> Option<&str> {
        self.extname.as_deref()
    }

    /// Replace the image shape, regenerating the NAXISn cards.
    ///
    /// Fails with [`Error::InvalidValue`] on a table header, or with
    /// [`Error::Overflow`] if the new shape's byte size cannot be
    /// represented.
    pub fn set_image_shape(&mut self, shape: &[u64]) -> Result<()> {
        let pixel = match self.layout {
            DataLayout::Image { pixel, .. } => pixel,
            DataLayout::Table { .. } => return Err(Error::InvalidValue),
        };
        let new_layout = DataLayout::Image {
            pixel,
            shape: shape.to_vec(),
        };
        validate_layout(&new_layout)?;
        self.layout = new_layout;
        Ok(())
    }

    /// Replace the table row count, regenerating the NAXIS2 card.
    pub fn set_table_rows(&mut self, rows: u64) -> Result<()> {
        let row = match self.layout {
            DataLayout::Table { ref row, .. } => row.clone(),
            DataLayout::Image { .. } => return Err(Error::InvalidValue),
        };
        let new_layout = DataLayout::Table { row, rows };
        validate_layout(&new_layout)?;
        self.layout = new_layout;
        Ok(())
    }

    /// Build the full card sequence, mandatory cards first.
    pub fn cards(&self) -> Vec<Card> {
        let mut cards = Vec::new();

        match self.kind {
            HeaderKind::Primary => {
                cards.push(Card::with_comment(
                    "SIMPLE",
                    Value::Logical(true),
                    "conforms to FITS standard",
                ));
            }
            HeaderKind::ImageExtension => {
                cards.push(Card::with_comment(
                    "XTENSION",
                    Value::Str(String::from("IMAGE")),
                    "image extension",
                ));
            }
            HeaderKind::TableExtension => {
                cards.push(Card::with_comment(
                    "XTENSION",
                    Value::Str(String::from("BINTABLE")),
                    "binary table extension",
                ));
            }
        }

        match self.layout {
            DataLayout::Image { pixel, ref shape } => {
                cards.push(Card::new("BITPIX", Value::Integer(pixel.bitpix())));
                cards.push(Card::new("NAXIS", Value::Integer(shape.len() as i64)));
                for (i, &axis) in shape.iter().enumerate() {
                    cards.push(Card::new(
                        &naxis_keyword(i + 1),
                        Value::Integer(axis as i64),
                    ));
                }
            }
            DataLayout::Table { ref row, rows } => {
                // Validated at construction, so the width fits in i64.
                let width = row.row_width().unwrap_or(0);
                cards.push(Card::new("BITPIX", Value::Integer(8)));
                cards.push(Card::new("NAXIS", Value::Integer(2)));
                cards.push(Card::with_comment(
                    "NAXIS1",
                    Value::Integer(width as i64),
                    "bytes per row",
                ));
                cards.push(Card::with_comment(
                    "NAXIS2",
                    Value::Integer(rows as i64),
                    "number of rows",
                ));
            }
        }

        match self.kind {
            HeaderKind::Primary => {
                cards.push(Card::with_comment(
                    "EXTEND",
                    Value::Logical(true),
                    "extensions may follow",
                ));
            }
            HeaderKind::ImageExtension | HeaderKind::TableExtension => {
                cards.push(Card::new("PCOUNT", Value::Integer(0)));
                cards.push(Card::new("GCOUNT", Value::Integer(1)));
            }
        }

        if let DataLayout::Table { ref row, .. } = self.layout {
            cards.push(Card::with_comment(
                "TFIELDS",
                Value::Integer(row.fields.len() as i64),
                "number of columns",
            ));
            for (i, field) in row.fields.iter().enumerate() {
                cards.push(Card::new(
                    &tcol_keyword("TFORM", i + 1),
                    Value::Str(format_tform(field.repeat, field.field_type)),
                ));
                if let Some(ref name) = field.name {
                    cards.push(Card::new(
                        &tcol_keyword("TTYPE", i + 1),
                        Value::Str(name.clone()),
                    ));
                }
            }
        }

        if let Some(ref name) = self.extname {
            cards.push(Card::new("EXTNAME", Value::Str(name.clone())));
        }

        cards.extend(self.extra.iter().cloned());
        cards
    }

    /// Serialize to complete header blocks (END card and space padding
    /// included). The length is always a multiple of [`BLOCK_SIZE`].
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize_header(&self.cards())
    }

    /// The serialized header length in bytes.
    pub fn header_byte_len(&self) -> u64 {
        // cards + END, rounded up to whole blocks of 36 cards
        let total_cards = self.cards().len() as u64 + 1;
        total_cards.div_ceil(36) * BLOCK_SIZE
    }

    /// The block-padded data segment length this header advertises.
    pub fn padded_data_len(&self) -> Result<u64> {
        self.layout.padded_byte_len()
    }
}

/// A minimal primary header: SIMPLE, BITPIX=8, NAXIS=0, EXTEND=T.
///
/// Serializes to exactly one block, with an empty data segment, so
/// extensions can be appended directly after it.
pub fn minimal_primary() -> SynthesizedHeader {
    SynthesizedHeader {
        kind: HeaderKind::Primary,
        layout: DataLayout::Image {
            pixel: PixelType::Uint8,
            shape: Vec::new(),
        },
        extname: None,
        extra: Vec::new(),
    }
}

fn validate_layout(layout: &DataLayout) -> Result<()> {
    layout.padded_byte_len()?;
    match layout {
        DataLayout::Image { shape, .. } => {
            if shape.len() > 999 {
                return Err(Error::UnsupportedLayout("more than 999 axes"));
            }
            for &axis in shape {
                if axis > i64::MAX as u64 {
                    return Err(Error::Overflow("axis length exceeds i64"));
                }
            }
        }
        DataLayout::Table { row, rows } => {
            if row.fields.len() > 999 {
                return Err(Error::UnsupportedLayout("more than 999 columns"));
            }
            if *rows > i64::MAX as u64 || row.row_width()? > i64::MAX as u64 {
                return Err(Error::Overflow("table dimension exceeds i64"));
            }
        }
    }
    Ok(())
}

fn naxis_keyword(axis: usize) -> String {
    alloc::format!("NAXIS{}", axis)
}

fn tcol_keyword(prefix: &str, column: usize) -> String {
    alloc::format!("{}{}", prefix, column)
}

// ---- header interpretation (the reverse direction) ----

/// The generic FITS data-segment size formula, usable for any valid HDU:
/// `|BITPIX|/8 * GCOUNT * (PCOUNT + NAXIS1*...*NAXISn)` bytes, before
/// padding. NAXIS = 0 means no data.
///
/// This intentionally ignores TFORM, so the sequential scanner can step
/// over HDUs whose column layouts this crate cannot map.
pub fn segment_byte_len(cards: &[Card]) -> Result<u64> {
    let bitpix = card_integer(cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
    let naxis = card_integer(cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))?;
    if !(0..=999).contains(&naxis) {
        return Err(Error::InvalidHeader("NAXIS out of range"));
    }
    if bitpix % 8 != 0 || bitpix == 0 {
        return Err(Error::InvalidBitpix(bitpix));
    }

    if naxis == 0 {
        return Ok(0);
    }

    let mut pixels: u64 = 1;
    for axis in 1..=naxis {
        let key = naxis_keyword(axis as usize);
        let len = card_integer(cards, &key).ok_or(Error::MissingKeyword("NAXISn"))?;
        if len < 0 {
            return Err(Error::InvalidHeader("negative NAXISn"));
        }
        pixels = pixels
            .checked_mul(len as u64)
            .ok_or(Error::Overflow("NAXISn product"))?;
    }

    let pcount = card_integer(cards, "PCOUNT").unwrap_or(0);
    let gcount = card_integer(cards, "GCOUNT").unwrap_or(1);
    if pcount < 0 || gcount < 1 {
        return Err(Error::InvalidHeader("negative PCOUNT or GCOUNT"));
    }

    let elements = pixels
        .checked_add(pcount as u64)
        .ok_or(Error::Overflow("PCOUNT sum"))?;
    let per_group = elements
        .checked_mul(bitpix.unsigned_abs() / 8)
        .ok_or(Error::Overflow("segment size"))?;
    per_group
        .checked_mul(gcount as u64)
        .ok_or(Error::Overflow("segment size"))
}

/// Recover a strict [`DataLayout`] from parsed header cards.
///
/// Unlike [`segment_byte_len`], this demands a layout the mapped writer can
/// address: images with a supported BITPIX, or BINTABLEs with fixed-width
/// columns and an empty heap.
pub fn layout_from_cards(cards: &[Card]) -> Result<DataLayout> {
    let is_primary = find_card(cards, "SIMPLE").is_some();
    let xtension = card_string(cards, "XTENSION");

    let is_table = match (is_primary, xtension.as_deref()) {
        (true, _) => false,
        (false, Some("IMAGE")) => false,
        (false, Some("BINTABLE")) => true,
        (false, Some(_)) => {
            return Err(Error::UnsupportedLayout("unknown XTENSION type"));
        }
        (false, None) => return Err(Error::MissingKeyword("XTENSION")),
    };

    let naxis = card_integer(cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))?;
    if !(0..=999).contains(&naxis) {
        return Err(Error::InvalidHeader("NAXIS out of range"));
    }

    let pcount = card_integer(cards, "PCOUNT").unwrap_or(0);
    if pcount != 0 {
        return Err(Error::UnsupportedLayout("non-empty heap (PCOUNT != 0)"));
    }
    if card_integer(cards, "GCOUNT").unwrap_or(1) != 1 {
        return Err(Error::UnsupportedLayout("random groups (GCOUNT != 1)"));
    }

    if is_table {
        if naxis != 2 {
            return Err(Error::InvalidHeader("BINTABLE requires NAXIS = 2"));
        }
        let width = card_integer(cards, "NAXIS1").ok_or(Error::MissingKeyword("NAXIS1"))?;
        let rows = card_integer(cards, "NAXIS2").ok_or(Error::MissingKeyword("NAXIS2"))?;
        let tfields = card_integer(cards, "TFIELDS").ok_or(Error::MissingKeyword("TFIELDS"))?;
        if width < 0 || rows < 0 || !(0..=999).contains(&tfields) {
            return Err(Error::InvalidHeader("negative table dimension"));
        }

        let mut fields = Vec::with_capacity(tfields as usize);
        for i in 1..=tfields as usize {
            let tform = card_string(cards, &tcol_keyword("TFORM", i))
                .ok_or(Error::MissingKeyword("TFORMn"))?;
            let (repeat, field_type) = parse_tform(&tform)?;
            let name = card_string(cards, &tcol_keyword("TTYPE", i));
            fields.push(Field {
                name,
                repeat,
                field_type,
            });
        }

        let row = RowLayout::new(fields);
        if row.row_width()? != width as u64 {
            return Err(Error::InvalidHeader("NAXIS1 disagrees with column widths"));
        }
        Ok(DataLayout::Table {
            row,
            rows: rows as u64,
        })
    } else {
        let bitpix = card_integer(cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
        let pixel = PixelType::from_bitpix(bitpix)?;
        let mut shape = Vec::with_capacity(naxis as usize);
        for axis in 1..=naxis as usize {
            let len =
                card_integer(cards, &naxis_keyword(axis)).ok_or(Error::MissingKeyword("NAXISn"))?;
            if len < 0 {
                return Err(Error::InvalidHeader("negative NAXISn"));
            }
            shape.push(len as u64);
        }
        Ok(DataLayout::Image { pixel, shape })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::padded_len;
    use crate::card::parse_header_blocks;
    use crate::layout::FieldType;
    use alloc::vec;

    #[test]
    fn minimal_primary_is_one_block() {
        let header = minimal_primary();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), BLOCK_SIZE as usize);
        assert_eq!(header.padded_data_len().unwrap(), 0);

        let cards = parse_header_blocks(&bytes).unwrap();
        assert_eq!(cards[0].keyword_str(), "SIMPLE");
        assert_eq!(card_integer(&cards, "BITPIX"), Some(8));
        assert_eq!(card_integer(&cards, "NAXIS"), Some(0));
        assert_eq!(
            find_card(&cards, "EXTEND").unwrap().value,
            Some(Value::Logical(true))
        );
    }

    #[test]
    fn image_extension_cards() {
        let header = SynthesizedHeader::image(PixelType::Float32, &[1024, 768])
            .unwrap()
            .with_extname("SCI");
        let cards = header.cards();

        assert_eq!(card_string(&cards, "XTENSION").unwrap(), "IMAGE");
        assert_eq!(card_integer(&cards, "BITPIX"), Some(-32));
        assert_eq!(card_integer(&cards, "NAXIS"), Some(2));
        assert_eq!(card_integer(&cards, "NAXIS1"), Some(1024));
        assert_eq!(card_integer(&cards, "NAXIS2"), Some(768));
        assert_eq!(card_integer(&cards, "PCOUNT"), Some(0));
        assert_eq!(card_integer(&cards, "GCOUNT"), Some(1));
        assert_eq!(card_string(&cards, "EXTNAME").unwrap(), "SCI");
    }

    #[test]
    fn table_extension_cards() {
        let row = RowLayout::new(vec![
            Field::scalar("TIME", FieldType::Float64),
            Field::array("NAME", 8, FieldType::Ascii),
        ]);
        let header = SynthesizedHeader::table(row, 4000).unwrap().with_extname("EVENTS");
        let cards = header.cards();

        assert_eq!(card_string(&cards, "XTENSION").unwrap(), "BINTABLE");
        assert_eq!(card_integer(&cards, "BITPIX"), Some(8));
        assert_eq!(card_integer(&cards, "NAXIS1"), Some(16));
        assert_eq!(card_integer(&cards, "NAXIS2"), Some(4000));
        assert_eq!(card_integer(&cards, "TFIELDS"), Some(2));
        assert_eq!(card_string(&cards, "TFORM1").unwrap(), "1D");
        assert_eq!(card_string(&cards, "TTYPE2").unwrap(), "NAME");
    }

    #[test]
    fn shape_override_regenerates_axis_cards() {
        let mut header = SynthesizedHeader::image(PixelType::Int16, &[100, 100]).unwrap();
        header.set_image_shape(&[50, 60, 70]).unwrap();
        let cards = header.cards();

        assert_eq!(card_integer(&cards, "NAXIS"), Some(3));
        assert_eq!(card_integer(&cards, "NAXIS1"), Some(50));
        assert_eq!(card_integer(&cards, "NAXIS3"), Some(70));
        assert_eq!(header.padded_data_len().unwrap(), padded_len(50 * 60 * 70 * 2));
    }

    #[test]
    fn shape_override_rejects_overflow() {
        let mut header = SynthesizedHeader::image(PixelType::Float64, &[16]).unwrap();
        assert!(matches!(
            header.set_image_shape(&[u64::MAX, 4]),
            Err(Error::Overflow(_))
        ));
        // The previous shape survives a failed override.
        assert_eq!(header.layout().byte_len().unwrap(), 128);
    }

    #[test]
    fn row_override_on_table() {
        let row = RowLayout::new(vec![Field::scalar("V", FieldType::Int32)]);
        let mut header = SynthesizedHeader::table(row, 10).unwrap();
        header.set_table_rows(1_000_000).unwrap();
        assert_eq!(
            card_integer(&header.cards(), "NAXIS2"),
            Some(1_000_000)
        );
        assert!(header.set_image_shape(&[1]).is_err());
    }

    #[test]
    fn header_len_matches_serialization() {
        let mut header = SynthesizedHeader::image(PixelType::Uint8, &[8]).unwrap();
        for i in 0..40 {
            header.push_card(Card::new(
                &alloc::format!("CUSTOM{:02}", i),
                Value::Integer(i),
            ));
        }
        assert_eq!(header.header_byte_len(), header.to_bytes().len() as u64);
        assert!(header.header_byte_len() > BLOCK_SIZE);
    }

    #[test]
    fn segment_len_generic_formula() {
        let header = SynthesizedHeader::image(PixelType::Int16, &[300, 200]).unwrap();
        let cards = header.cards();
        assert_eq!(segment_byte_len(&cards).unwrap(), 300 * 200 * 2);
    }

    #[test]
    fn segment_len_counts_heap() {
        let cards = vec![
            Card::new("XTENSION", Value::Str(String::from("BINTABLE"))),
            Card::new("BITPIX", Value::Integer(8)),
            Card::new("NAXIS", Value::Integer(2)),
            Card::new("NAXIS1", Value::Integer(12)),
            Card::new("NAXIS2", Value::Integer(100)),
            Card::new("PCOUNT", Value::Integer(512)),
            Card::new("GCOUNT", Value::Integer(1)),
        ];
        assert_eq!(segment_byte_len(&cards).unwrap(), 12 * 100 + 512);
        // But a heap cannot be mapped as a fixed layout.
        assert!(matches!(
            layout_from_cards(&cards),
            Err(Error::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn layout_roundtrip_image() {
        let header = SynthesizedHeader::image(PixelType::Float64, &[32, 64]).unwrap();
        let layout = layout_from_cards(&header.cards()).unwrap();
        assert_eq!(&layout, header.layout());
    }

    #[test]
    fn layout_roundtrip_table() {
        let row = RowLayout::new(vec![
            Field::scalar("A", FieldType::Logical),
            Field::scalar("B", FieldType::Int64),
        ]);
        let header = SynthesizedHeader::table(row, 77).unwrap();
        let layout = layout_from_cards(&header.cards()).unwrap();
        assert_eq!(&layout, header.layout());
    }

    #[test]
    fn layout_rejects_width_mismatch() {
        let cards = vec![
            Card::new("XTENSION", Value::Str(String::from("BINTABLE"))),
            Card::new("BITPIX", Value::Integer(8)),
            Card::new("NAXIS", Value::Integer(2)),
            Card::new("NAXIS1", Value::Integer(99)),
            Card::new("NAXIS2", Value::Integer(10)),
            Card::new("PCOUNT", Value::Integer(0)),
            Card::new("GCOUNT", Value::Integer(1)),
            Card::new("TFIELDS", Value::Integer(1)),
            Card::new("TFORM1", Value::Str(String::from("1J"))),
        ];
        assert!(matches!(
            layout_from_cards(&cards),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn layout_rejects_non_ascii_tform() {
        let cards = vec![
            Card::new("XTENSION", Value::Str(String::from("BINTABLE"))),
            Card::new("BITPIX", Value::Integer(8)),
            Card::new("NAXIS", Value::Integer(2)),
            Card::new("NAXIS1", Value::Integer(4)),
            Card::new("NAXIS2", Value::Integer(10)),
            Card::new("PCOUNT", Value::Integer(0)),
            Card::new("GCOUNT", Value::Integer(1)),
            Card::new("TFIELDS", Value::Integer(1)),
            Card::new("TFORM1", Value::Str(String::from("1\u{e9}"))),
        ];
        assert!(matches!(layout_from_cards(&cards), Err(Error::InvalidValue)));
    }

    #[test]
    fn layout_rejects_unknown_xtension() {
        let cards = vec![
            Card::new("XTENSION", Value::Str(String::from("TABLE"))),
            Card::new("BITPIX", Value::Integer(8)),
            Card::new("NAXIS", Value::Integer(0)),
        ];
        assert!(matches!(
            layout_from_cards(&cards),
            Err(Error::UnsupportedLayout(_))
        ));
    }
}
