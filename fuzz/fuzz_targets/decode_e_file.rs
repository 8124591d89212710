#![no_main]
use gustpak::{decode_e_file, Seeds};
use libfuzzer_sys::fuzz_target;

// Fixed, arbitrary seed set: the interesting surface for fuzzing is whether
// malformed input can panic or read out of bounds, not whether any
// particular title's seeds are used.
const SEEDS: Seeds = Seeds {
    main: [0x1111_2222, 0x3333_4444, 0x5555_6666],
    table: [0xAAAA_0001, 0xAAAA_0002, 0xAAAA_0003],
    length: [7, 11, 13],
    fence: 16,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_e_file(data, SEEDS);
});
