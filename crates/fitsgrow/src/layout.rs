//! Data-segment layouts: image pixel grids and binary table rows.
//!
//! A [`DataLayout`] describes the byte-level shape of an HDU data segment
//! before any of that data exists. All size arithmetic is checked `u64` so
//! that multi-terabyte reservations cannot silently wrap.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::block::BLOCK_SIZE;
use crate::error::{Error, Result};

/// The pixel element type of an image data segment, from BITPIX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// BITPIX = 8: unsigned byte.
    Uint8,
    /// BITPIX = 16: 16-bit signed integer.
    Int16,
    /// BITPIX = 32: 32-bit signed integer.
    Int32,
    /// BITPIX = 64: 64-bit signed integer.
    Int64,
    /// BITPIX = -32: 32-bit IEEE float.
    Float32,
    /// BITPIX = -64: 64-bit IEEE float.
    Float64,
}

impl PixelType {
    /// Map a BITPIX card value to a pixel type.
    pub fn from_bitpix(bitpix: i64) -> Result<Self> {
        match bitpix {
            8 => Ok(PixelType::Uint8),
            16 => Ok(PixelType::Int16),
            32 => Ok(PixelType::Int32),
            64 => Ok(PixelType::Int64),
            -32 => Ok(PixelType::Float32),
            -64 => Ok(PixelType::Float64),
            other => Err(Error::InvalidBitpix(other)),
        }
    }

    /// The BITPIX card value for this pixel type.
    pub const fn bitpix(&self) -> i64 {
        match self {
            PixelType::Uint8 => 8,
            PixelType::Int16 => 16,
            PixelType::Int32 => 32,
            PixelType::Int64 => 64,
            PixelType::Float32 => -32,
            PixelType::Float64 => -64,
        }
    }

    /// Bytes per pixel.
    pub const fn byte_size(&self) -> u64 {
        match self {
            PixelType::Uint8 => 1,
            PixelType::Int16 => 2,
            PixelType::Int32 => 4,
            PixelType::Int64 => 8,
            PixelType::Float32 => 4,
            PixelType::Float64 => 8,
        }
    }
}

/// The element type of a binary table column.
///
/// Only fixed-width scalar codes are supported. Bit arrays (X), complex
/// pairs (C/M), and variable-length descriptors (P/Q) are rejected at parse
/// time because their row storage is not a plain stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// L -- logical, one byte.
    Logical,
    /// B -- unsigned byte.
    Byte,
    /// I -- 16-bit signed integer.
    Int16,
    /// J -- 32-bit signed integer.
    Int32,
    /// K -- 64-bit signed integer.
    Int64,
    /// E -- 32-bit IEEE float.
    Float32,
    /// D -- 64-bit IEEE float.
    Float64,
    /// A -- ASCII character.
    Ascii,
}

impl FieldType {
    /// Bytes per single element.
    pub const fn byte_size(&self) -> u64 {
        match self {
            FieldType::Logical | FieldType::Byte | FieldType::Ascii => 1,
            FieldType::Int16 => 2,
            FieldType::Int32 | FieldType::Float32 => 4,
            FieldType::Int64 | FieldType::Float64 => 8,
        }
    }

    /// The single-character TFORM type code.
    pub const fn code(&self) -> char {
        match self {
            FieldType::Logical => 'L',
            FieldType::Byte => 'B',
            FieldType::Int16 => 'I',
            FieldType::Int32 => 'J',
            FieldType::Int64 => 'K',
            FieldType::Float32 => 'E',
            FieldType::Float64 => 'D',
            FieldType::Ascii => 'A',
        }
    }
}

/// Parse a TFORMn value like `1J`, `10E`, `20A`, or `D`.
///
/// Returns the repeat count (default 1) and the element type. Codes whose
/// storage is not a fixed per-row stride are rejected as unsupported.
pub fn parse_tform(s: &str) -> Result<(u64, FieldType)> {
    let s = s.trim();
    // Header values are ASCII by format; a non-ASCII byte would also break
    // the byte-indexed splits below.
    if s.is_empty() || !s.is_ascii() {
        return Err(Error::InvalidValue);
    }

    // Strip the optional (maxlen) suffix carried by variable-length arrays.
    let s = match s.find('(') {
        Some(paren) => &s[..paren],
        None => s,
    };
    if s.is_empty() {
        return Err(Error::InvalidValue);
    }

    let bytes = s.as_bytes();
    if s.len() >= 2 {
        let second_last = bytes[s.len() - 2];
        if second_last == b'P' || second_last == b'Q' {
            return Err(Error::UnsupportedLayout(
                "variable-length array column (TFORM P/Q)",
            ));
        }
    }

    let code = bytes[s.len() - 1];
    let repeat_str = &s[..s.len() - 1];
    let repeat = if repeat_str.is_empty() {
        1
    } else {
        repeat_str.parse::<u64>().map_err(|_| Error::InvalidValue)?
    };

    let field_type = match code {
        b'L' => FieldType::Logical,
        b'B' => FieldType::Byte,
        b'I' => FieldType::Int16,
        b'J' => FieldType::Int32,
        b'K' => FieldType::Int64,
        b'E' => FieldType::Float32,
        b'D' => FieldType::Float64,
        b'A' => FieldType::Ascii,
        b'X' => return Err(Error::UnsupportedLayout("bit-array column (TFORM X)")),
        b'C' | b'M' => return Err(Error::UnsupportedLayout("complex column (TFORM C/M)")),
        b'P' | b'Q' => {
            return Err(Error::UnsupportedLayout(
                "variable-length array column (TFORM P/Q)",
            ))
        }
        _ => return Err(Error::InvalidValue),
    };

    Ok((repeat, field_type))
}

/// Format a repeat count and element type as a TFORM value string.
pub fn format_tform(repeat: u64, field_type: FieldType) -> String {
    format!("{}{}", repeat, field_type.code())
}

/// One column of a binary table row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name (TTYPEn), if present.
    pub name: Option<String>,
    /// Repeat count from TFORMn.
    pub repeat: u64,
    /// The element data type.
    pub field_type: FieldType,
}

impl Field {
    /// Create a named scalar field (repeat count 1).
    pub fn scalar(name: &str, field_type: FieldType) -> Self {
        Field {
            name: Some(String::from(name)),
            repeat: 1,
            field_type,
        }
    }

    /// Create a named array field with the given repeat count.
    pub fn array(name: &str, repeat: u64, field_type: FieldType) -> Self {
        Field {
            name: Some(String::from(name)),
            repeat,
            field_type,
        }
    }

    /// Total bytes this field occupies per row.
    pub fn byte_width(&self) -> Result<u64> {
        self.repeat
            .checked_mul(self.field_type.byte_size())
            .ok_or(Error::Overflow("field byte width"))
    }
}

/// The fixed per-row layout of a binary table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    /// Columns in storage order.
    pub fields: Vec<Field>,
}

impl RowLayout {
    pub fn new(fields: Vec<Field>) -> Self {
        RowLayout { fields }
    }

    /// Total bytes per row (NAXIS1), as a checked sum of field widths.
    pub fn row_width(&self) -> Result<u64> {
        let mut width: u64 = 0;
        for field in &self.fields {
            width = width
                .checked_add(field.byte_width()?)
                .ok_or(Error::Overflow("table row width"))?;
        }
        Ok(width)
    }

    /// Byte offset of the field at `index` within a row.
    pub fn field_offset(&self, index: usize) -> Result<u64> {
        if index >= self.fields.len() {
            return Err(Error::InvalidValue);
        }
        let mut offset: u64 = 0;
        for field in &self.fields[..index] {
            offset = offset
                .checked_add(field.byte_width()?)
                .ok_or(Error::Overflow("table field offset"))?;
        }
        Ok(offset)
    }

    /// Look up a column index by name (trailing spaces ignored).
    pub fn field_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim_end();
        self.fields.iter().position(|f| {
            f.name
                .as_deref()
                .map(|n| n.trim_end() == wanted)
                .unwrap_or(false)
        })
    }
}

/// The byte-level shape of an HDU data segment.
#[derive(Debug, Clone, PartialEq)]
pub enum DataLayout {
    /// An n-dimensional pixel grid. `shape` is in FITS axis order:
    /// `shape[0]` is NAXIS1, the fastest-varying axis.
    Image { pixel: PixelType, shape: Vec<u64> },
    /// A binary table with a fixed row stride and a row count.
    Table { row: RowLayout, rows: u64 },
}

impl DataLayout {
    /// Total logical data bytes before block padding.
    ///
    /// An image with no axes, or with any zero-length axis, has zero bytes.
    /// All multiplication is checked; a product that cannot be represented
    /// in `u64` is an [`Error::Overflow`].
    pub fn byte_len(&self) -> Result<u64> {
        match self {
            DataLayout::Image { pixel, shape } => {
                if shape.is_empty() {
                    return Ok(0);
                }
                let mut total = pixel.byte_size();
                for &axis in shape {
                    total = total
                        .checked_mul(axis)
                        .ok_or(Error::Overflow("image data size"))?;
                }
                Ok(total)
            }
            DataLayout::Table { row, rows } => row
                .row_width()?
                .checked_mul(*rows)
                .ok_or(Error::Overflow("table data size")),
        }
    }

    /// Data bytes rounded up to the next 2880-byte block boundary.
    pub fn padded_byte_len(&self) -> Result<u64> {
        let len = self.byte_len()?;
        len.div_ceil(BLOCK_SIZE)
            .checked_mul(BLOCK_SIZE)
            .ok_or(Error::Overflow("padded data size"))
    }

    /// Total number of pixels for an image layout.
    pub fn pixel_count(&self) -> Result<u64> {
        match self {
            DataLayout::Image { shape, .. } => {
                if shape.is_empty() {
                    return Ok(0);
                }
                let mut count: u64 = 1;
                for &axis in shape {
                    count = count
                        .checked_mul(axis)
                        .ok_or(Error::Overflow("image pixel count"))?;
                }
                Ok(count)
            }
            DataLayout::Table { .. } => Err(Error::InvalidValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn bitpix_mapping() {
        assert_eq!(PixelType::from_bitpix(16).unwrap(), PixelType::Int16);
        assert_eq!(PixelType::from_bitpix(-64).unwrap(), PixelType::Float64);
        assert!(matches!(
            PixelType::from_bitpix(24),
            Err(Error::InvalidBitpix(24))
        ));
        for pt in [
            PixelType::Uint8,
            PixelType::Int16,
            PixelType::Int32,
            PixelType::Int64,
            PixelType::Float32,
            PixelType::Float64,
        ] {
            assert_eq!(PixelType::from_bitpix(pt.bitpix()).unwrap(), pt);
        }
    }

    #[test]
    fn tform_parsing() {
        assert_eq!(parse_tform("1J").unwrap(), (1, FieldType::Int32));
        assert_eq!(parse_tform("10E").unwrap(), (10, FieldType::Float32));
        assert_eq!(parse_tform("20A").unwrap(), (20, FieldType::Ascii));
        assert_eq!(parse_tform("D").unwrap(), (1, FieldType::Float64));
        assert_eq!(parse_tform("  1K ").unwrap(), (1, FieldType::Int64));
    }

    #[test]
    fn tform_unsupported_codes() {
        assert!(matches!(
            parse_tform("16X"),
            Err(Error::UnsupportedLayout(_))
        ));
        assert!(matches!(
            parse_tform("1PB(200)"),
            Err(Error::UnsupportedLayout(_))
        ));
        assert!(matches!(
            parse_tform("1QJ"),
            Err(Error::UnsupportedLayout(_))
        ));
        assert!(matches!(parse_tform("1C"), Err(Error::UnsupportedLayout(_))));
        assert!(matches!(parse_tform(""), Err(Error::InvalidValue)));
        assert!(matches!(parse_tform("1Z"), Err(Error::InvalidValue)));
    }

    #[test]
    fn tform_non_ascii_is_an_error_not_a_panic() {
        // A corrupt header can smuggle bytes >= 0x80 into a quoted value;
        // splitting such a string at a byte index would panic mid-char.
        assert!(matches!(parse_tform("1\u{e9}"), Err(Error::InvalidValue)));
        assert!(matches!(parse_tform("é"), Err(Error::InvalidValue)));
        assert!(matches!(parse_tform("10\u{00c5}J"), Err(Error::InvalidValue)));
    }

    #[test]
    fn tform_format_roundtrip() {
        for (repeat, ft) in [(1, FieldType::Int32), (128, FieldType::Ascii)] {
            let s = format_tform(repeat, ft);
            assert_eq!(parse_tform(&s).unwrap(), (repeat, ft));
        }
    }

    #[test]
    fn row_width_and_offsets() {
        let row = RowLayout::new(vec![
            Field::scalar("TIME", FieldType::Float64),
            Field::scalar("FLUX", FieldType::Float32),
            Field::array("NAME", 16, FieldType::Ascii),
        ]);
        assert_eq!(row.row_width().unwrap(), 8 + 4 + 16);
        assert_eq!(row.field_offset(0).unwrap(), 0);
        assert_eq!(row.field_offset(1).unwrap(), 8);
        assert_eq!(row.field_offset(2).unwrap(), 12);
        assert!(row.field_offset(3).is_err());
        assert_eq!(row.field_index("FLUX"), Some(1));
        assert_eq!(row.field_index("FLUX  "), Some(1));
        assert_eq!(row.field_index("MISSING"), None);
    }

    #[test]
    fn image_byte_len() {
        let layout = DataLayout::Image {
            pixel: PixelType::Int16,
            shape: vec![100, 50],
        };
        assert_eq!(layout.byte_len().unwrap(), 100 * 50 * 2);
        assert_eq!(layout.pixel_count().unwrap(), 5000);
    }

    #[test]
    fn image_empty_shapes() {
        let no_axes = DataLayout::Image {
            pixel: PixelType::Float32,
            shape: vec![],
        };
        assert_eq!(no_axes.byte_len().unwrap(), 0);
        assert_eq!(no_axes.padded_byte_len().unwrap(), 0);

        let zero_axis = DataLayout::Image {
            pixel: PixelType::Float32,
            shape: vec![100, 0],
        };
        assert_eq!(zero_axis.byte_len().unwrap(), 0);
    }

    #[test]
    fn image_multi_terabyte_size() {
        // 2^40 pixels of f64: 8 TiB, well past u32 range.
        let layout = DataLayout::Image {
            pixel: PixelType::Float64,
            shape: vec![1 << 20, 1 << 20],
        };
        assert_eq!(layout.byte_len().unwrap(), 8 << 40);
    }

    #[test]
    fn image_overflow() {
        let layout = DataLayout::Image {
            pixel: PixelType::Float64,
            shape: vec![u64::MAX, 2],
        };
        assert!(matches!(layout.byte_len(), Err(Error::Overflow(_))));
    }

    #[test]
    fn table_byte_len() {
        let layout = DataLayout::Table {
            row: RowLayout::new(vec![
                Field::scalar("A", FieldType::Int32),
                Field::scalar("B", FieldType::Float64),
            ]),
            rows: 1000,
        };
        assert_eq!(layout.byte_len().unwrap(), 12 * 1000);
    }

    #[test]
    fn table_overflow() {
        let layout = DataLayout::Table {
            row: RowLayout::new(vec![Field::array("BIG", u64::MAX / 4, FieldType::Int64)]),
            rows: 2,
        };
        assert!(matches!(layout.byte_len(), Err(Error::Overflow(_))));
    }

    #[test]
    fn padded_len_is_block_multiple() {
        let layout = DataLayout::Image {
            pixel: PixelType::Uint8,
            shape: vec![2881],
        };
        assert_eq!(layout.padded_byte_len().unwrap(), 5760);
    }
}
