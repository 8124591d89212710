//! Decoder core for a Gust-style (Koei/Tecmo) PC game PAK archive format and
//! its companion scrambled/compressed ".e" asset format.
//!
//! A PAK archive bundles many files behind an XOR-obfuscated entry table;
//! see [`pak_parse`] and [`pak_decode_entry`]. Individual assets inside a
//! PAK are themselves frequently stored in a second, proprietary format
//! (identified by the `.e` suffix on the unpacked filename) that layers a
//! bit-level scramble on top of an LZ77-family compressor; see
//! [`decode_e_file`] for the combined pipeline, or [`descramble::descramble`]
//! and [`glaze::unglaze`] to drive the two stages independently.
//!
//! This crate only implements decoding. It does not touch the filesystem:
//! callers are expected to supply file contents as byte slices (e.g. after
//! reading a PAK entry's payload from disk) and a [`Seeds`] value looked up
//! out-of-band for the title being unpacked.

mod bitreader;
mod descramble;
mod error;
mod glaze;
mod pak;
mod prng;
mod seeds;

pub use descramble::{bit_swap_pass, d1, d2, descramble};
pub use error::{Error, Result};
pub use glaze::unglaze;
pub use pak::{data_region_start, pak_decode_entry, pak_entry_payload, pak_parse, PakEntry, PakHeader, Stride};
pub use seeds::Seeds;

use byteorder::{BigEndian, ByteOrder};

/// The expected value of the ".e" file's type tag; anything else is a
/// [`Error::MalformedHeader`].
const TYPE_TAG: u32 = 2;

/// Length of the ".e" file header: a 4-byte type tag, a 4-byte declared
/// decompressed size, and 8 reserved bytes.
const E_HEADER_LEN: usize = 16;

/// Decodes a full ".e" asset: validates the type tag, descrambles the body,
/// then decompresses it with [`glaze::unglaze`].
///
/// `bytes` is the entire, still-scrambled file contents (as read from a PAK
/// entry's payload, already XOR-decoded by [`pak_decode_entry`] if needed).
/// `seeds` is the title-specific descrambling configuration.
pub fn decode_e_file(bytes: &[u8], seeds: Seeds) -> Result<Vec<u8>> {
    if bytes.len() < E_HEADER_LEN {
        return Err(Error::UnexpectedEof);
    }

    let type_tag = BigEndian::read_u32(&bytes[0..4]);
    if type_tag != TYPE_TAG {
        return Err(Error::MalformedHeader(type_tag));
    }
    let declared_out_len = BigEndian::read_u32(&bytes[4..8]);
    // bytes[8..16] are reserved and unused by this crate.

    let body = &bytes[E_HEADER_LEN..];
    let descrambled = descramble::descramble(body, seeds)?;
    glaze::unglaze(&descrambled, declared_out_len)
}
