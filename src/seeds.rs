/// Per-title descrambling configuration for ".e" files.
///
/// A title's seven constants are looked up out-of-band (the catalog file that maps
/// a title identifier to its `Seeds` lives outside this crate, see the crate-level
/// docs); this type only models the values themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seeds {
    /// Seeds for the two descrambler passes' bit-swap steps (`main[0]`, `main[2]`)
    /// and D1's word-XOR pass (`main[1]`).
    pub main: [u32; 3],

    /// Rotating initial state for D2's byte-XOR stream.
    pub table: [u32; 3],

    /// Byte counts governing when D2 switches from one `table` seed to the next.
    pub length: [u32; 3],

    /// Modulus governing whether a given 16-bit word in D1 is XORed before subtraction.
    ///
    /// Reportedly derivable from the other six seeds by an unknown formula; this
    /// crate treats it as an independent input rather than guessing at that formula.
    pub fence: u32,
}
