use std::fmt;

/// The error type used when any core decode operation fails.
///
/// Variants follow the seven error kinds named in the format's error handling
/// design: `MalformedHeader`, `SizeConstraint`, `MarkerNotFound`,
/// `ChecksumMismatch`, `DecompressionOverrun`, `UnknownOpcode`, and
/// `UnexpectedEof`. There is no `AllocFailure` variant: Rust's global allocator
/// aborts the process on allocation failure rather than returning a recoverable
/// error, so that kind has no representable counterpart here.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The ".e" type tag did not equal the expected value of `2`.
    MalformedHeader(u32),

    /// A declared or computed size failed one of the format's size invariants
    /// (D2 buffer shape, a Glaze sub-stream length, or a declared-vs-in-stream
    /// output length). The payload names which constraint failed.
    SizeConstraint(&'static str),

    /// D2 scanned backwards through the tail of its buffer without finding the
    /// `0xff` end-of-body marker.
    MarkerNotFound,

    /// D2's computed checksum pair did not match the pair stored in the buffer.
    ChecksumMismatch {
        computed: (u32, u32),
        stored: (u32, u32),
    },

    /// A Glaze cursor ran past the end of its region, or the output buffer
    /// would have been written past its declared length. The payload names
    /// which cursor overran.
    DecompressionOverrun(&'static str),

    /// An opcode byte outside of `{0x01..=0x07}` was read from the code table.
    UnknownOpcode(u8),

    /// A bit- or byte-level reader ran out of input before the value it was
    /// decoding was complete.
    UnexpectedEof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;

        match self {
            MalformedHeader(tag) => write!(f, "invalid \".e\" type tag: {:#x}, expected 2", tag),
            SizeConstraint(what) => write!(f, "size constraint violated: {}", what),
            MarkerNotFound => write!(f, "descrambler 2 end-of-body marker (0xff) was not found"),
            ChecksumMismatch { computed, stored } => write!(
                f,
                "descrambler 2 checksum mismatch: computed {:?}, stored {:?}",
                computed, stored
            ),
            DecompressionOverrun(what) => write!(f, "glaze decompression overrun: {}", what),
            UnknownOpcode(op) => write!(f, "unknown glaze opcode {:#04x}", op),
            UnexpectedEof => write!(f, "unexpected end of input"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
