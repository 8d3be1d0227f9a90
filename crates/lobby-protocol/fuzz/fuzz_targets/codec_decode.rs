#![no_main]

use libfuzzer_sys::fuzz_target;
use lobby_protocol::codec::decode;

fuzz_target!(|data: &[u8]| {
    // Frames arrive as text on both channels; non-UTF-8 input is
    // dropped before the codec ever sees it.
    if let Ok(text) = std::str::from_utf8(data) {
        // Must never panic, only return Err for invalid input.
        let _ = decode(text);
    }
});
