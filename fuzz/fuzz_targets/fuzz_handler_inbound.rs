#![no_main]

use bytes::Bytes;
use h2_handler::{BufferedTransport, CONNECTION_PREFACE, ConnectionHandler, HandlerConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let config = HandlerConfig::default();
    let mut handler = ConnectionHandler::server(BufferedTransport::new(), &config);
    handler.handler_added();
    handler.on_active();

    // Half the inputs start with a valid preface to get past the handshake.
    let input = if data.first().is_some_and(|b| b & 1 == 0) {
        let mut input = CONNECTION_PREFACE.to_vec();
        input.extend_from_slice(&data[1..]);
        input
    } else {
        data.to_vec()
    };

    // Feed in uneven chunks, draining the transport between reads.
    for chunk in input.chunks(7) {
        handler.on_bytes_received(chunk);
        handler.on_read_complete();

        let pending = handler.transport().pending_send().len();
        handler.transport_mut().advance_send(pending);
        handler.process_completions();
        let _ = handler.poll_events();
    }

    handler.go_away(
        handler.connection().remote().last_stream_created(),
        h2_handler::ErrorCode::NoError,
        Bytes::new(),
    );
    let closed = handler.close();
    handler.transport_mut().fail_pending(h2_handler::Http2Error::Closed);
    handler.on_inactive();

    assert!(closed.is_done());
    assert!(handler.is_closed());
    assert_eq!(handler.connection().num_active_streams(), 0);
});
