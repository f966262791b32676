//! Big-endian byte conversion for FITS data.
//!
//! FITS stores all binary data in big-endian (most-significant byte first)
//! format. These helpers read and write native Rust types from/to the byte
//! slices backing a data segment.

/// Read a `u8` from the first byte of the slice.
#[inline]
pub fn read_u8(buf: &[u8]) -> u8 {
    buf[0]
}

/// Read a big-endian `i16` from the first 2 bytes of the slice.
#[inline]
pub fn read_i16_be(buf: &[u8]) -> i16 {
    i16::from_be_bytes([buf[0], buf[1]])
}

/// Read a big-endian `i32` from the first 4 bytes of the slice.
#[inline]
pub fn read_i32_be(buf: &[u8]) -> i32 {
    i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `i64` from the first 8 bytes of the slice.
#[inline]
pub fn read_i64_be(buf: &[u8]) -> i64 {
    i64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

/// Read a big-endian `f32` (IEEE 754) from the first 4 bytes of the slice.
#[inline]
pub fn read_f32_be(buf: &[u8]) -> f32 {
    f32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `f64` (IEEE 754) from the first 8 bytes of the slice.
#[inline]
pub fn read_f64_be(buf: &[u8]) -> f64 {
    f64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

// --- Single-value writes ---

/// Write a `u8` into the first byte of the slice.
#[inline]
pub fn write_u8(buf: &mut [u8], val: u8) {
    buf[0] = val;
}

/// Write an `i16` in big-endian format into the first 2 bytes of the slice.
#[inline]
pub fn write_i16_be(buf: &mut [u8], val: i16) {
    buf[..2].copy_from_slice(&val.to_be_bytes());
}

/// Write an `i32` in big-endian format into the first 4 bytes of the slice.
#[inline]
pub fn write_i32_be(buf: &mut [u8], val: i32) {
    buf[..4].copy_from_slice(&val.to_be_bytes());
}

/// Write an `i64` in big-endian format into the first 8 bytes of the slice.
#[inline]
pub fn write_i64_be(buf: &mut [u8], val: i64) {
    buf[..8].copy_from_slice(&val.to_be_bytes());
}

/// Write an `f32` in big-endian format into the first 4 bytes of the slice.
#[inline]
pub fn write_f32_be(buf: &mut [u8], val: f32) {
    buf[..4].copy_from_slice(&val.to_be_bytes());
}

/// Write an `f64` in big-endian format into the first 8 bytes of the slice.
#[inline]
pub fn write_f64_be(buf: &mut [u8], val: f64) {
    buf[..8].copy_from_slice(&val.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_i16() {
        let mut buf = [0u8; 2];
        for val in [0_i16, 1, -1, i16::MIN, i16::MAX, 256, -256] {
            write_i16_be(&mut buf, val);
            assert_eq!(read_i16_be(&buf), val);
        }
    }

    #[test]
    fn roundtrip_i32() {
        let mut buf = [0u8; 4];
        for val in [0_i32, 1, -1, i32::MIN, i32::MAX, 0x01020304] {
            write_i32_be(&mut buf, val);
            assert_eq!(read_i32_be(&buf), val);
        }
    }

    #[test]
    fn roundtrip_i64() {
        let mut buf = [0u8; 8];
        for val in [0_i64, 1, -1, i64::MIN, i64::MAX] {
            write_i64_be(&mut buf, val);
            assert_eq!(read_i64_be(&buf), val);
        }
    }

    #[test]
    fn roundtrip_f64_and_nan() {
        let mut buf = [0u8; 8];
        for val in [0.0_f64, -1.0, f64::MAX, f64::MIN_POSITIVE, f64::INFINITY] {
            write_f64_be(&mut buf, val);
            assert_eq!(read_f64_be(&buf), val);
        }
        write_f64_be(&mut buf, f64::NAN);
        assert!(read_f64_be(&buf).is_nan());
    }

    #[test]
    fn known_bytes() {
        assert_eq!(read_i16_be(&[0x01, 0x00]), 256_i16);
        assert_eq!(read_i32_be(&[0xFF, 0xFF, 0xFF, 0xFF]), -1_i32);
        // IEEE 754: 1.0f32 = 0x3F800000
        assert_eq!(read_f32_be(&[0x3F, 0x80, 0x00, 0x00]), 1.0_f32);

        let mut buf = [0u8; 4];
        write_f32_be(&mut buf, 1.0);
        assert_eq!(buf, [0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn read_at_offset() {
        let buf = [0x00, 0x00, 0x00, 0x01, 0x00, 0x02];
        assert_eq!(read_i16_be(&buf[4..]), 2_i16);
        assert_eq!(read_i32_be(&buf[0..]), 1_i32);
        assert_eq!(read_u8(&buf[3..]), 1);
        let mut out = [0u8; 1];
        write_u8(&mut out, 7);
        assert_eq!(out[0], 7);
    }
}
