#![no_main]

use bytes::BytesMut;
use h2_handler::{Frame, FrameDecoder, FrameEncoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let decoder = FrameDecoder::new();
    let encoder = FrameEncoder::new();
    let mut buf = BytesMut::from(data);

    // Decode until we run out of data or hit an error
    while let Ok(Some(frame)) = decoder.decode(&mut buf) {
        let _ = frame.stream_id();

        // Anything we accept must survive re-encoding.
        let mut out = BytesMut::new();
        encoder.encode(&frame, &mut out);
        match decoder.decode(&mut out) {
            Ok(Some(Frame::Data(_))) | Ok(Some(Frame::Headers(_))) => {
                // Padding and priority fields are not re-emitted.
            }
            Ok(Some(again)) => assert_eq!(again, frame),
            other => panic!("re-encoded frame failed to decode: {:?}", other),
        }
    }
});
