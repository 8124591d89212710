use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::prng::{Prng, DEFAULT_MULTIPLIER};
use crate::seeds::Seeds;

/// The Fisher–Yates-seeded bit-permutation routine shared by both descramblers.
///
/// `chunk` is processed in contiguous windows of `slice_size` bytes. Within each
/// window a scrambling table of bit positions is drawn from `seed`, then adjacent
/// pairs of positions in that table have their bits exchanged. Applying this
/// routine twice with an identical `multiplier`/`seed` restores the original bits,
/// because each pairwise exchange is its own inverse and the same deterministic
/// table is rebuilt both times.
///
/// The scrambling table is always built at the full `slice_size * 8` bits,
/// even for a final window shorter than `slice_size` (only possible when
/// `chunk.len()` is not a multiple of `slice_size`); only the swap loop's
/// iteration count is bounded by the bytes actually remaining in that short
/// window, matching the source's `min(table_size, chunk_size << 3)` bound on
/// the swap loop alone. A drawn position that falls outside the short
/// window's own bytes has nothing to swap against and is skipped, so the
/// routine never reads or writes outside of `chunk`. Every call site in this
/// crate passes chunk sizes that are exact multiples of their slice size in
/// practice (0x800 split into 0x100 or 0x80 byte windows), so the skip only
/// matters for pathologically small inputs, which are out of scope
/// (truncated-input recovery is a non-goal).
pub fn bit_swap_pass(chunk: &mut [u8], multiplier: u32, seed: u32, slice_size: usize) {
    let mut prng = Prng::new(multiplier, seed);
    let table_bit_count = slice_size * 8;
    let mut offset = 0;
    while offset < chunk.len() {
        let slice_len = slice_size.min(chunk.len() - offset);
        let swap_bit_count = slice_len * 8;

        let mut base: Vec<u16> = (0..table_bit_count as u16).collect();
        let mut scrambled = vec![0u16; table_bit_count];
        for i in 0..table_bit_count {
            let x = prng.next_index_seed() as usize % (table_bit_count - i);
            scrambled[i] = base[x];
            base.remove(x);
        }

        let slice = &mut chunk[offset..offset + slice_len];
        let mut i = 0;
        while i + 1 < swap_bit_count {
            let (v0, v1) = (scrambled[i], scrambled[i + 1]);
            let (p0, b0) = ((v0 >> 3) as usize, (v0 & 7) as u8);
            let (p1, b1) = ((v1 >> 3) as usize, (v1 & 7) as u8);

            if p0 < slice.len() && p1 < slice.len() {
                let bit0 = (slice[p0] >> b0) & 1;
                let bit1 = (slice[p1] >> b1) & 1;
                slice[p0] = (slice[p0] & !(1 << b0)) | (bit1 << b0);
                slice[p1] = (slice[p1] & !(1 << b1)) | (bit0 << b1);
            }

            i += 2;
        }

        offset += slice_size;
    }
}

/// First descrambler pass: a tail bit-swap followed by a whole-buffer 16-bit
/// word XOR/subtract gated by `seeds.fence`.
pub fn d1(buf: &mut [u8], seeds: &Seeds) {
    let size = buf.len();
    let tail_size = size.min(0x800);
    bit_swap_pass(&mut buf[size - tail_size..], DEFAULT_MULTIPLIER, seeds.main[0], 0x100);

    let mut prng = Prng::new(DEFAULT_MULTIPLIER, seeds.main[1]);
    let mut i = 0;
    while i + 1 < size {
        let x = prng.next_index_seed();
        let mut w = BigEndian::read_u16(&buf[i..i + 2]);
        if x % seeds.fence >= seeds.fence / 2 {
            w ^= x as u16;
        }
        w = w.wrapping_sub(x as u16);
        BigEndian::write_u16(&mut buf[i..i + 2], w);
        i += 2;
    }
}

/// Second descrambler pass: a rolling multi-seed byte XOR validated by a stored
/// checksum pair, followed by a second (narrower) bit-swap pass.
///
/// `seeds` is taken by value: the rotating `table` state only needs to survive
/// for the duration of this call, matching the "no persistent state survives a
/// decode call" lifecycle invariant.
///
/// Returns the trimmed payload length (the body, with the scrambling tail
/// stripped).
pub fn d2(buf: &mut [u8], mut seeds: Seeds) -> Result<usize> {
    let size = buf.len();
    if size % 4 != 0 || size < 16 {
        return Err(Error::SizeConstraint("descrambler 2 buffer must be a non-zero multiple of 4 bytes, at least 16"));
    }

    let final_seed = BigEndian::read_u32(&buf[size - 4..]);
    let mut prng = Prng::new(final_seed.wrapping_add(DEFAULT_MULTIPLIER), seeds.table[0]);

    let checksum0 = BigEndian::read_u32(&buf[size - 8..size - 4]);
    let checksum1 = BigEndian::read_u32(&buf[size - 12..size - 8]);

    let end = {
        let mut idx = size as isize - 13;
        loop {
            if idx < 0 {
                break None;
            }
            if buf[idx as usize] == 0xFF {
                break Some(idx as usize);
            }
            idx -= 1;
        }
    };
    let end = match end {
        Some(end) if end >= 4 => end,
        _ => return Err(Error::MarkerNotFound),
    };

    let mut seed_index = 0usize;
    let mut fudge = 0u32;
    let mut processed = 0u32;
    for byte in buf.iter_mut().take(end) {
        let x = prng.next_u16();
        *byte ^= x as u8;

        processed += 1;
        if processed >= seeds.length[seed_index] + fudge {
            seeds.table[seed_index] = prng.state();
            seed_index += 1;
            if seed_index >= seeds.table.len() {
                seed_index = 0;
                fudge += 1;
            }
            prng.set_state(seeds.table[seed_index]);
            processed = 0;
        }
    }

    buf[end] = 0;
    let n = end & !3;

    let mut computed0 = 0u32;
    let mut computed1 = 0u32;
    for word in buf[..n].chunks_exact(4) {
        let w = BigEndian::read_u32(word);
        computed0 ^= !w;
        computed1 = computed1.wrapping_sub(w);
    }
    if (computed0, computed1) != (checksum0, checksum1) {
        return Err(Error::ChecksumMismatch {
            computed: (computed0, computed1),
            stored: (checksum0, checksum1),
        });
    }

    let tail_size = n.min(0x800);
    bit_swap_pass(&mut buf[..tail_size], DEFAULT_MULTIPLIER, seeds.main[2], 0x80);

    Ok(n)
}

/// Applies `D1` then `D2` to a freshly-copied buffer and returns the trimmed payload.
pub fn descramble(bytes: &[u8], seeds: Seeds) -> Result<Vec<u8>> {
    let mut buf = bytes.to_vec();
    d1(&mut buf, &seeds);
    let n = d2(&mut buf, seeds)?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_fill(seed: u32, len: usize) -> Vec<u8> {
        let mut prng = Prng::new(0x41C64E6D, seed);
        (0..len).map(|_| prng.next_u16() as u8).collect()
    }

    #[test]
    fn bit_swap_pass_is_self_inverse() {
        let original = lcg_fill(0xC0FFEE, 0x200);
        let mut buf = original.clone();

        bit_swap_pass(&mut buf, DEFAULT_MULTIPLIER, 0x1234_5678, 0x80);
        assert_ne!(buf, original, "a real permutation should move at least one bit");
        bit_swap_pass(&mut buf, DEFAULT_MULTIPLIER, 0x1234_5678, 0x80);
        assert_eq!(buf, original);
    }

    #[test]
    fn bit_swap_pass_handles_partial_final_window() {
        // 10 bytes with an 8-byte slice_size leaves a 2-byte trailing window.
        let original = lcg_fill(1, 10);
        let mut buf = original.clone();
        bit_swap_pass(&mut buf, DEFAULT_MULTIPLIER, 99, 8);
        bit_swap_pass(&mut buf, DEFAULT_MULTIPLIER, 99, 8);
        assert_eq!(buf, original);
    }

    #[test]
    fn d2_rejects_bad_buffer_size() {
        let seeds = Seeds {
            main: [1, 2, 3],
            table: [4, 5, 6],
            length: [7, 8, 9],
            fence: 10,
        };
        let mut too_small = vec![0u8; 8];
        assert!(matches!(d2(&mut too_small, seeds), Err(Error::SizeConstraint(_))));

        let mut not_multiple_of_4 = vec![0u8; 17];
        assert!(matches!(
            d2(&mut not_multiple_of_4, seeds),
            Err(Error::SizeConstraint(_))
        ));
    }

    #[test]
    fn d2_requires_marker() {
        let seeds = Seeds {
            main: [1, 2, 3],
            table: [4, 5, 6],
            length: [100, 100, 100],
            fence: 10,
        };
        // No 0xff anywhere in the last 13 bytes.
        let mut buf = vec![0u8; 32];
        assert_eq!(d2(&mut buf, seeds), Err(Error::MarkerNotFound));
    }
}
