//! Fuzz target: client line framing and JSON parsing
//!
//! Feeds arbitrary socket bytes through the line decoder and tries
//! every resulting line as both a hello frame and an intent.  Nothing
//! may panic and no line may exceed the length cap.
//!
//! cargo fuzz run fuzz_client_lines

#![no_main]

use libfuzzer_sys::fuzz_target;
use roverhub::net::lines::{LineDecoder, MAX_LINE_LEN};
use roverhub::net::protocol::{parse_hello, parse_intent};

fuzz_target!(|data: &[u8]| {
    let mut lines = LineDecoder::new();
    for chunk in data.chunks(97) {
        for line in lines.feed(chunk) {
            assert!(line.chars().count() <= MAX_LINE_LEN);
            let _ = parse_hello(&line);
            let _ = parse_intent(&line);
        }
    }
});
