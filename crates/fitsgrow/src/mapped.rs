//! Memory-mapped fill of reserved data segments.
//!
//! Opening maps the whole file from offset zero: FITS data offsets are
//! 2880-aligned, which is not page-aligned, so mapping the data region
//! directly would need per-platform offset fixups. Every access is indexed
//! relative to the extension's data offset instead.
//!
//! Values cross the mapping in FITS big-endian order. Typed accessors
//! convert one element at a time; the bulk paths copy native bytes with
//! `bytemuck` and swap endianness in place, the cheaper order of work for
//! large runs.

use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::endian;
use crate::error::{Error, Result};
use crate::layout::{DataLayout, Field, FieldType, PixelType, RowLayout};
use crate::scan::{HduScanner, HduSelector};

/// Whether the mapping allows writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    ReadOnly,
    ReadWrite,
}

/// Options for opening a mapped extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    pub mode: MapMode,
    /// Advise the kernel the fill is front-to-back, so readahead stays
    /// aggressive and used pages are dropped early. Best effort: ignored on
    /// platforms without madvise, and never an error.
    pub sequential: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        MapOptions {
            mode: MapMode::ReadWrite,
            sequential: false,
        }
    }
}

impl MapOptions {
    /// Writable mapping, no access hint.
    pub fn read_write() -> Self {
        MapOptions::default()
    }

    /// Read-only mapping, no access hint.
    pub fn read_only() -> Self {
        MapOptions {
            mode: MapMode::ReadOnly,
            sequential: false,
        }
    }

    /// Add the sequential-access hint.
    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }
}

enum Mapping {
    Read(Mmap),
    Write(MmapMut),
}

/// A single extension's data segment, exposed through a memory mapping.
///
/// Dropping a writable mapping flushes it; calling [`close`](Self::close)
/// first makes flush errors observable. Any access after close is
/// [`Error::UseAfterClose`].
pub struct MappedExtension {
    mapping: Option<Mapping>,
    layout: DataLayout,
    data_start: usize,
    data_len: u64,
    padded_data_len: u64,
    index: usize,
}

impl MappedExtension {
    /// Scan `path` for the HDU matching `selector` and map its data segment.
    pub fn open(path: &Path, selector: &HduSelector, options: MapOptions) -> Result<Self> {
        let file = match options.mode {
            MapMode::ReadOnly => File::open(path)?,
            MapMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path)?,
        };

        let entry = HduScanner::new(&file)?.find(selector)?;
        let layout = entry.layout()?;

        let data_start = usize::try_from(entry.data_offset)
            .map_err(|_| Error::Overflow("data offset exceeds address space"))?;
        usize::try_from(entry.end_offset())
            .map_err(|_| Error::Overflow("file size exceeds address space"))?;

        let mapping = match options.mode {
            MapMode::ReadOnly => {
                let map = unsafe { MmapOptions::new().map(&file) }.map_err(Error::MapFailed)?;
                Mapping::Read(map)
            }
            MapMode::ReadWrite => {
                let map = unsafe { MmapOptions::new().map_mut(&file) }.map_err(Error::MapFailed)?;
                Mapping::Write(map)
            }
        };

        #[cfg(unix)]
        if options.sequential {
            let advice = memmap2::Advice::Sequential;
            let _ = match &mapping {
                Mapping::Read(m) => m.advise(advice),
                Mapping::Write(m) => m.advise(advice),
            };
        }

        Ok(MappedExtension {
            mapping: Some(mapping),
            layout,
            data_start,
            data_len: entry.data_len,
            padded_data_len: entry.padded_data_len(),
            index: entry.index,
        })
    }

    /// The HDU index this mapping was opened on.
    pub fn hdu_index(&self) -> usize {
        self.index
    }

    /// The layout recovered from the extension header.
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Logical data bytes, before block padding.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Data bytes including block padding.
    pub fn padded_data_len(&self) -> u64 {
        self.padded_data_len
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.mapping.is_none()
    }

    /// The logical data bytes (padding excluded).
    pub fn data(&self) -> Result<&[u8]> {
        let range = self.data_start..self.data_start + self.data_len as usize;
        match self.mapping.as_ref().ok_or(Error::UseAfterClose)? {
            Mapping::Read(m) => Ok(&m[range]),
            Mapping::Write(m) => Ok(&m[range]),
        }
    }

    /// Mutable view of the logical data bytes.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let range = self.data_start..self.data_start + self.data_len as usize;
        match self.mapping.as_mut().ok_or(Error::UseAfterClose)? {
            Mapping::Read(_) => Err(Error::ReadOnlyMapping),
            Mapping::Write(m) => Ok(&mut m[range]),
        }
    }

    /// Flush dirty pages to disk. A no-op for read-only mappings.
    pub fn flush(&self) -> Result<()> {
        match &self.mapping {
            None => Err(Error::UseAfterClose),
            Some(Mapping::Read(_)) => Ok(()),
            Some(Mapping::Write(m)) => m.flush().map_err(Error::Io),
        }
    }

    /// Flush and release the mapping. Idempotent: a second close is `Ok`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mapping) = self.mapping.take() {
            if let Mapping::Write(m) = &mapping {
                m.flush().map_err(Error::Io)?;
            }
        }
        Ok(())
    }

    // ---- image access ----

    /// Read one pixel by linear index (row-major over the FITS axes, with
    /// NAXIS1 fastest-varying).
    pub fn read_pixel<T: PixelValue>(&self, index: u64) -> Result<T> {
        let range = self.pixel_range::<T>(index, 1)?;
        Ok(T::read_be(&self.data()?[range]))
    }

    /// Write one pixel by linear index.
    pub fn write_pixel<T: PixelValue>(&mut self, index: u64, value: T) -> Result<()> {
        let range = self.pixel_range::<T>(index, 1)?;
        T::write_be(&mut self.data_mut()?[range], value);
        Ok(())
    }

    /// Write a run of pixels starting at linear index `start`.
    pub fn write_pixels<T: PixelValue>(&mut self, start: u64, values: &[T]) -> Result<()> {
        let range = self.pixel_range::<T>(start, values.len() as u64)?;
        let dst = &mut self.data_mut()?[range];
        dst.copy_from_slice(bytemuck::cast_slice(values));
        T::swap_native_to_be(dst);
        Ok(())
    }

    /// Read a run of pixels starting at linear index `start`.
    pub fn read_pixels<T: PixelValue>(&self, start: u64, count: u64) -> Result<Vec<T>> {
        let range = self.pixel_range::<T>(start, count)?;
        let mut bytes = self.data()?[range].to_vec();
        T::swap_be_to_native(&mut bytes);
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    fn pixel_range<T: PixelValue>(&self, start: u64, count: u64) -> Result<Range<usize>> {
        let pixel = match &self.layout {
            DataLayout::Image { pixel, .. } => *pixel,
            DataLayout::Table { .. } => {
                return Err(Error::UnsupportedLayout("pixel access on a table"))
            }
        };
        if T::PIXEL != pixel {
            return Err(Error::TypeMismatch {
                declared: pixel_name(pixel),
                accessed: T::NAME,
            });
        }
        let size = pixel.byte_size();
        let offset = start
            .checked_mul(size)
            .ok_or(Error::Overflow("pixel offset"))?;
        let len = count
            .checked_mul(size)
            .ok_or(Error::Overflow("pixel run length"))?;
        self.byte_range(offset, len)
    }

    // ---- table access ----

    /// Read a scalar field in the given row by column name.
    pub fn read_field<T: PixelValue>(&self, row: u64, name: &str) -> Result<T> {
        self.read_field_element(row, name, 0)
    }

    /// Write a scalar field in the given row by column name.
    pub fn write_field<T: PixelValue>(&mut self, row: u64, name: &str, value: T) -> Result<()> {
        self.write_field_element(row, name, 0, value)
    }

    /// Read element `elem` of an array-valued field.
    pub fn read_field_element<T: PixelValue>(&self, row: u64, name: &str, elem: u64) -> Result<T> {
        let range = self.field_range::<T>(row, name, elem)?;
        Ok(T::read_be(&self.data()?[range]))
    }

    /// Write element `elem` of an array-valued field.
    pub fn write_field_element<T: PixelValue>(
        &mut self,
        row: u64,
        name: &str,
        elem: u64,
        value: T,
    ) -> Result<()> {
        let range = self.field_range::<T>(row, name, elem)?;
        T::write_be(&mut self.data_mut()?[range], value);
        Ok(())
    }

    /// Write the raw bytes of a field (the whole repeat span). ASCII columns
    /// shorter than the span are space-padded.
    pub fn write_field_bytes(&mut self, row: u64, name: &str, bytes: &[u8]) -> Result<()> {
        let (field, offset) = self.resolve_field(name)?;
        let width = field.byte_width()?;
        if bytes.len() as u64 > width {
            return Err(Error::ShapeMismatch {
                requested: bytes.len() as u64,
                available: width,
            });
        }
        let is_ascii = field.field_type == FieldType::Ascii;
        let row_offset = self.row_offset(row)?;
        let range = self.byte_range(row_offset + offset, width)?;
        let dst = &mut self.data_mut()?[range];
        dst[..bytes.len()].copy_from_slice(bytes);
        let pad = if is_ascii { b' ' } else { 0 };
        for b in &mut dst[bytes.len()..] {
            *b = pad;
        }
        Ok(())
    }

    /// Read a contiguous range of whole rows as raw row-ordered bytes.
    pub fn read_rows(&self, rows: Range<u64>) -> Result<&[u8]> {
        let range = self.rows_byte_range(&rows)?;
        Ok(&self.data()?[range])
    }

    /// Write a contiguous range of whole rows from raw row-ordered bytes.
    ///
    /// `bytes` must be exactly `(rows.end - rows.start) * NAXIS1` long, and
    /// the range must stay within the reserved row count; anything else is
    /// [`Error::ShapeMismatch`].
    pub fn write_rows(&mut self, rows: Range<u64>, bytes: &[u8]) -> Result<()> {
        let range = self.rows_byte_range(&rows)?;
        if bytes.len() != range.len() {
            return Err(Error::ShapeMismatch {
                requested: bytes.len() as u64,
                available: range.len() as u64,
            });
        }
        self.data_mut()?[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Write one value per row of a named scalar field, across a row range.
    ///
    /// `values` must hold exactly one element per row in the range.
    pub fn write_field_range<T: PixelValue>(
        &mut self,
        rows: Range<u64>,
        name: &str,
        values: &[T],
    ) -> Result<()> {
        let count = self.check_row_range(&rows)?;
        if values.len() as u64 != count {
            return Err(Error::ShapeMismatch {
                requested: values.len() as u64,
                available: count,
            });
        }
        for (i, &value) in values.iter().enumerate() {
            self.write_field_element(rows.start + i as u64, name, 0, value)?;
        }
        Ok(())
    }

    /// Validate a row range against the reserved row count; returns its
    /// length.
    fn check_row_range(&self, rows: &Range<u64>) -> Result<u64> {
        let total = match &self.layout {
            DataLayout::Table { rows: total, .. } => *total,
            DataLayout::Image { .. } => {
                return Err(Error::UnsupportedLayout("row access on an image"))
            }
        };
        if rows.start > rows.end {
            return Err(Error::InvalidValue);
        }
        if rows.end > total {
            return Err(Error::ShapeMismatch {
                requested: rows.end,
                available: total,
            });
        }
        Ok(rows.end - rows.start)
    }

    fn rows_byte_range(&self, rows: &Range<u64>) -> Result<Range<usize>> {
        let count = self.check_row_range(rows)?;
        let width = self.row_layout()?.row_width()?;
        let offset = width
            .checked_mul(rows.start)
            .ok_or(Error::Overflow("row offset"))?;
        let len = width
            .checked_mul(count)
            .ok_or(Error::Overflow("row run length"))?;
        self.byte_range(offset, len)
    }

    fn field_range<T: PixelValue>(&self, row: u64, name: &str, elem: u64) -> Result<Range<usize>> {
        let (field, offset) = self.resolve_field(name)?;
        if !T::matches_field(field.field_type) {
            return Err(Error::TypeMismatch {
                declared: field_name(field.field_type),
                accessed: T::NAME,
            });
        }
        if elem >= field.repeat {
            return Err(Error::ShapeMismatch {
                requested: elem + 1,
                available: field.repeat,
            });
        }
        let size = field.field_type.byte_size();
        let row_offset = self.row_offset(row)?;
        self.byte_range(row_offset + offset + elem * size, size)
    }

    fn resolve_field(&self, name: &str) -> Result<(Field, u64)> {
        let row = self.row_layout()?;
        let index = row
            .field_index(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        let offset = row.field_offset(index)?;
        Ok((row.fields[index].clone(), offset))
    }

    fn row_layout(&self) -> Result<&RowLayout> {
        match &self.layout {
            DataLayout::Table { row, .. } => Ok(row),
            DataLayout::Image { .. } => Err(Error::UnsupportedLayout("field access on an image")),
        }
    }

    fn row_offset(&self, row: u64) -> Result<u64> {
        let (layout_row, rows) = match &self.layout {
            DataLayout::Table { row, rows } => (row, *rows),
            DataLayout::Image { .. } => {
                return Err(Error::UnsupportedLayout("field access on an image"))
            }
        };
        if row >= rows {
            return Err(Error::ShapeMismatch {
                requested: row + 1,
                available: rows,
            });
        }
        layout_row
            .row_width()?
            .checked_mul(row)
            .ok_or(Error::Overflow("row offset"))
    }

    /// Bounds-check a byte range against the logical extent; the result is
    /// relative to the data slice returned by [`data`](Self::data).
    fn byte_range(&self, offset: u64, len: u64) -> Result<Range<usize>> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::Overflow("access range"))?;
        if end > self.data_len {
            return Err(Error::ShapeMismatch {
                requested: end,
                available: self.data_len,
            });
        }
        let start = offset as usize;
        Ok(start..start + len as usize)
    }
}

impl Drop for MappedExtension {
    fn drop(&mut self) {
        if let Some(Mapping::Write(m)) = &self.mapping {
            let _ = m.flush();
        }
    }
}

fn pixel_name(pixel: PixelType) -> &'static str {
    match pixel {
        PixelType::Uint8 => "u8",
        PixelType::Int16 => "i16",
        PixelType::Int32 => "i32",
        PixelType::Int64 => "i64",
        PixelType::Float32 => "f32",
        PixelType::Float64 => "f64",
    }
}

fn field_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Logical => "logical (L)",
        FieldType::Byte => "byte (B)",
        FieldType::Int16 => "i16 (I)",
        FieldType::Int32 => "i32 (J)",
        FieldType::Int64 => "i64 (K)",
        FieldType::Float32 => "f32 (E)",
        FieldType::Float64 => "f64 (D)",
        FieldType::Ascii => "ascii (A)",
    }
}

/// An element type that can cross the mapping in FITS big-endian order.
pub trait PixelValue: bytemuck::Pod {
    /// The image pixel type this Rust type corresponds to.
    const PIXEL: PixelType;
    /// Short name used in type-mismatch errors.
    const NAME: &'static str;

    /// Which table column types accept this Rust type.
    fn matches_field(field_type: FieldType) -> bool;

    fn read_be(buf: &[u8]) -> Self;
    fn write_be(buf: &mut [u8], val: Self);

    /// Swap a buffer of native-order elements to big-endian in place.
    fn swap_native_to_be(buf: &mut [u8]);
    /// Swap a buffer of big-endian elements to native order in place.
    fn swap_be_to_native(buf: &mut [u8]);
}

macro_rules! impl_pixel_value {
    ($ty:ty, $pixel:expr, $name:literal, $read:path, $write:path, [$($field:pat),+]) => {
        impl PixelValue for $ty {
            const PIXEL: PixelType = $pixel;
            const NAME: &'static str = $name;

            fn matches_field(field_type: FieldType) -> bool {
                matches!(field_type, $($field)|+)
            }

            fn read_be(buf: &[u8]) -> Self {
                $read(buf)
            }

            fn write_be(buf: &mut [u8], val: Self) {
                $write(buf, val);
            }

            fn swap_native_to_be(buf: &mut [u8]) {
                for chunk in buf.chunks_exact_mut(core::mem::size_of::<$ty>()) {
                    let mut bytes = [0u8; core::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(chunk);
                    chunk.copy_from_slice(&<$ty>::from_ne_bytes(bytes).to_be_bytes());
                }
            }

            fn swap_be_to_native(buf: &mut [u8]) {
                for chunk in buf.chunks_exact_mut(core::mem::size_of::<$ty>()) {
                    let mut bytes = [0u8; core::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(chunk);
                    chunk.copy_from_slice(&<$ty>::from_be_bytes(bytes).to_ne_bytes());
                }
            }
        }
    };
}

impl_pixel_value!(u8, PixelType::Uint8, "u8", endian::read_u8, endian::write_u8, [
    FieldType::Byte,
    FieldType::Ascii,
    FieldType::Logical
]);
impl_pixel_value!(i16, PixelType::Int16, "i16", endian::read_i16_be, endian::write_i16_be, [
    FieldType::Int16
]);
impl_pixel_value!(i32, PixelType::Int32, "i32", endian::read_i32_be, endian::write_i32_be, [
    FieldType::Int32
]);
impl_pixel_value!(i64, PixelType::Int64, "i64", endian::read_i64_be, endian::write_i64_be, [
    FieldType::Int64
]);
impl_pixel_value!(f32, PixelType::Float32, "f32", endian::read_f32_be, endian::write_f32_be, [
    FieldType::Float32
]);
impl_pixel_value!(f64, PixelType::Float64, "f64", endian::read_f64_be, endian::write_f64_be, [
    FieldType::Float64
]);
