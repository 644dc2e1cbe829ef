//! Fuzz target: `FrameDecoder::feed`
//!
//! Streams arbitrary bytes through the companion-link decoder and checks
//! that it never panics, never yields an oversized payload, and that every
//! message it yields re-encodes to a frame the decoder accepts again.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensekit::link::MAX_PAYLOAD;
use sensekit::link::codec::{FrameDecoder, MAX_FRAME, encode_frame};

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();
    let mut echo = FrameDecoder::new();
    let mut buf = [0u8; MAX_FRAME];

    for &byte in data {
        let Some(msg) = decoder.feed(byte) else {
            continue;
        };
        assert!(msg.payload.len() <= MAX_PAYLOAD, "payload exceeds MAX_PAYLOAD");

        let n = encode_frame(&msg, &mut buf).expect("decoded message must re-encode");
        let again: Vec<_> = buf[..n].iter().filter_map(|b| echo.feed(*b)).collect();
        assert_eq!(again, [msg]);
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    for &byte in data {
        let _ = decoder.feed(byte);
    }
});
