use alloc::string::String;

/// All errors that can occur while reserving and filling FITS extensions.
#[derive(Debug)]
pub enum Error {
    /// Malformed FITS header block.
    InvalidHeader(&'static str),
    /// Malformed keyword name in a header card.
    InvalidKeyword,
    /// A header value could not be parsed correctly.
    InvalidValue,
    /// Unrecognized BITPIX value.
    InvalidBitpix(i64),
    /// A required keyword was not found in the header.
    MissingKeyword(&'static str),
    /// Premature end of data while reading.
    UnexpectedEof,
    /// Data cannot be expressed with a fixed per-row or per-element stride.
    UnsupportedLayout(&'static str),
    /// Size arithmetic exceeded the representable range.
    Overflow(&'static str),
    /// The target file is not a well-formed sequence of complete HDUs.
    NotAppendable(&'static str),
    /// The requested HDU does not exist in the file.
    ExtensionNotFound,
    /// A named table field is not declared by the header.
    UnknownField(String),
    /// A read or write exceeds the reserved logical extent.
    ShapeMismatch {
        /// End of the requested range (bytes or elements, depending on the
        /// access).
        requested: u64,
        /// Size of the valid extent in the same unit.
        available: u64,
    },
    /// A typed access disagrees with the element type the header declares.
    TypeMismatch {
        /// What the header declares for this pixel or field.
        declared: &'static str,
        /// The Rust type the access was made with.
        accessed: &'static str,
    },
    /// The mapping was already closed.
    UseAfterClose,
    /// A write was attempted through a read-only mapping.
    ReadOnlyMapping,
    /// The filesystem refused to extend the file.
    #[cfg(feature = "std")]
    InsufficientDiskSpace(std::io::Error),
    /// The operating system refused to establish the mapping.
    #[cfg(feature = "std")]
    MapFailed(std::io::Error),
    /// An I/O error from the standard library.
    #[cfg(feature = "std")]
    Io(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidHeader(what) => write!(f, "invalid FITS header: {what}"),
            Error::InvalidKeyword => write!(f, "invalid keyword name"),
            Error::InvalidValue => write!(f, "invalid header value"),
            Error::InvalidBitpix(v) => write!(f, "invalid BITPIX value: {v}"),
            Error::MissingKeyword(kw) => write!(f, "missing required keyword: {kw}"),
            Error::UnexpectedEof => write!(f, "unexpected end of file"),
            Error::UnsupportedLayout(what) => write!(f, "unsupported layout: {what}"),
            Error::Overflow(what) => write!(f, "size arithmetic overflow: {what}"),
            Error::NotAppendable(what) => write!(f, "file is not appendable: {what}"),
            Error::ExtensionNotFound => write!(f, "extension not found"),
            Error::UnknownField(name) => write!(f, "unknown table field: {name}"),
            Error::ShapeMismatch {
                requested,
                available,
            } => write!(
                f,
                "shape mismatch: requested {requested} exceeds available {available}"
            ),
            Error::TypeMismatch { declared, accessed } => write!(
                f,
                "type mismatch: header declares {declared}, access used {accessed}"
            ),
            Error::UseAfterClose => write!(f, "mapping already closed"),
            Error::ReadOnlyMapping => write!(f, "mapping is read-only"),
            #[cfg(feature = "std")]
            Error::InsufficientDiskSpace(e) => write!(f, "filesystem refused extend: {e}"),
            #[cfg(feature = "std")]
            Error::MapFailed(e) => write!(f, "memory mapping failed: {e}"),
            #[cfg(feature = "std")]
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InsufficientDiskSpace(e) | Error::MapFailed(e) | Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
