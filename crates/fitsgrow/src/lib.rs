#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block;
pub mod card;
pub mod endian;
pub mod error;
pub mod layout;
pub mod synthesis;
pub mod value;

#[cfg(feature = "std")]
pub mod extend;
#[cfg(feature = "std")]
pub mod mapped;
#[cfg(feature = "std")]
pub mod scan;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use error::{Error, Result};
pub use layout::{DataLayout, Field, FieldType, PixelType, RowLayout};
pub use synthesis::{minimal_primary, SynthesizedHeader};
pub use value::Value;

#[cfg(feature = "std")]
pub use extend::{
    create_minimal_file, reserve_extension, truncate_to_last_valid, ReserveOptions,
    ReservedExtension,
};
#[cfg(feature = "std")]
pub use mapped::{MapMode, MapOptions, MappedExtension, PixelValue};
#[cfg(feature = "std")]
pub use scan::{HduEntry, HduScanner, HduSelector};
