//! Fuzz target: `StreamDecoder::feed` / `poll`
//!
//! Splits arbitrary serial bytes at a fuzzer-chosen point and checks
//! that the decoder never panics, always drains, and keeps its buffer
//! within the scan window.
//!
//! cargo fuzz run fuzz_stream_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use roverhub::sensor::codec::{MAX_SCAN, StreamDecoder};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let mut decoder = StreamDecoder::new();

    for piece in [&rest[..split], &rest[split..]] {
        decoder.feed(piece);
        let mut polls = 0usize;
        while decoder.poll().is_some() {
            polls += 1;
            assert!(polls <= rest.len() + 1, "decoder failed to make progress");
        }
        assert!(decoder.buffered() <= MAX_SCAN);
    }

    let stats = decoder.stats();
    assert!(stats.bytes_discarded <= rest.len() as u64);

    decoder.reset();
    assert_eq!(decoder.buffered(), 0);
});
