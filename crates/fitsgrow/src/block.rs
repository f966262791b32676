//! FITS block arithmetic.
//!
//! All byte counts are `u64`: extensions routinely exceed 4 GiB, so a 32-bit
//! intermediate anywhere in the size path is a correctness bug, not a
//! precision loss.

/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: u64 = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE as usize / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// Ceiling division: 0 bytes requires 0 blocks, 1 byte requires 1 block,
/// 2880 bytes requires 1 block, 2881 bytes requires 2 blocks.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    if num_bytes == 0 {
        return 0;
    }
    num_bytes.div_ceil(BLOCK_SIZE)
}

/// Returns the total byte length (in whole blocks) required to hold
/// `num_bytes`, i.e. `blocks_needed(num_bytes) * BLOCK_SIZE`.
pub const fn padded_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE
}

/// Copies `src` into the beginning of `dest` and fills the rest with
/// `pad_byte`.
///
/// # Panics
///
/// Panics if `dest.len() < src.len()`.
fn copy_and_pad(dest: &mut [u8], src: &[u8], pad_byte: u8) {
    let len = src.len();
    dest[..len].copy_from_slice(src);
    for b in &mut dest[len..] {
        *b = pad_byte;
    }
}

/// Writes `src` into `dest`, padding trailing bytes of the final block with
/// ASCII spaces as required for FITS header blocks.
///
/// # Panics
///
/// Panics if `dest.len() != padded_len(src.len())`.
pub fn pad_header_blocks(dest: &mut [u8], src: &[u8]) {
    assert_eq!(
        dest.len() as u64,
        padded_len(src.len() as u64),
        "dest length must equal the padded block length of src"
    );
    copy_and_pad(dest, src, HEADER_PAD_BYTE);
}

/// Writes `src` into `dest`, padding trailing bytes of the final block with
/// zero bytes as required for FITS data blocks.
///
/// # Panics
///
/// Panics if `dest.len() != padded_len(src.len())`.
pub fn pad_data_blocks(dest: &mut [u8], src: &[u8]) {
    assert_eq!(
        dest.len() as u64,
        padded_len(src.len() as u64),
        "dest length must equal the padded block length of src"
    );
    copy_and_pad(dest, src, DATA_PAD_BYTE);
}
