#![no_main]
use gustpak::pak_parse;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = pak_parse(data);
});
