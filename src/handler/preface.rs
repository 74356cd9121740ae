//! Connection preface verification.
//!
//! A server first matches the 24-byte client preface, then checks that the
//! next frame is SETTINGS. A client only checks that the server's first frame
//! is SETTINGS. Input may arrive in any split; progress is kept between calls
//! and the first divergent byte fails the handshake.

use bytes::{Buf, BytesMut};

use crate::connection::Role;
use crate::error::Http2Error;
use crate::frame::{CONNECTION_PREFACE, ErrorCode, FrameHeader, FrameType, flags};

/// Bytes of the first frame header needed to tell whether it is SETTINGS.
const SETTINGS_PEEK_LEN: usize = 5;

/// How far the handshake has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefaceState {
    /// Server only. `matched` preface bytes seen so far.
    AwaitingPreface { matched: usize },
    /// Waiting for the header of the peer's first frame.
    AwaitingSettings,
    /// Handshake complete; all further input is frames.
    Valid,
    /// Handshake failed.
    Invalid,
}

/// Result of feeding input to the preface decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handshake {
    /// The client preface finished matching during this call. The first
    /// frame is checked by the next call.
    pub preface_matched: bool,
    /// The handshake is complete and the remaining input is frames.
    pub complete: bool,
}

#[derive(Debug)]
pub struct PrefaceDecoder {
    role: Role,
    state: PrefaceState,
}

impl PrefaceDecoder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: initial_state(role),
        }
    }

    pub fn state(&self) -> PrefaceState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == PrefaceState::Valid
    }

    /// Forget partial progress when detached from the transport. A completed
    /// handshake is kept.
    pub fn on_removed(&mut self) {
        if self.state != PrefaceState::Valid {
            self.state = initial_state(self.role);
        }
    }

    /// Consume preface bytes from the front of `buf`.
    ///
    /// Returns as soon as the client preface has matched, so the caller can
    /// answer it before the first frame is judged.
    ///
    /// Frame bytes are never consumed; once the handshake completes whatever
    /// remains in `buf` belongs to the frame decoder.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Handshake, Http2Error> {
        let mut handshake = Handshake::default();

        if let PrefaceState::AwaitingPreface { matched } = self.state {
            let wanted = &CONNECTION_PREFACE[matched..];
            let n = wanted.len().min(buf.len());

            if buf[..n] != wanted[..n] {
                self.state = PrefaceState::Invalid;
                return Err(Http2Error::connection_error(
                    ErrorCode::ProtocolError,
                    format!(
                        "HTTP/2 client preface string missing or corrupt. Hex dump for received bytes: {}",
                        hex_dump(&buf[..n])
                    ),
                ));
            }

            buf.advance(n);
            if matched + n < CONNECTION_PREFACE.len() {
                self.state = PrefaceState::AwaitingPreface { matched: matched + n };
                return Ok(handshake);
            }
            self.state = PrefaceState::AwaitingSettings;
            handshake.preface_matched = true;
            return Ok(handshake);
        }

        match self.state {
            PrefaceState::AwaitingSettings => {
                let Some((frame_type, frame_flags)) = FrameHeader::peek_type_and_flags(buf) else {
                    return Ok(handshake);
                };
                if frame_type != FrameType::Settings as u8 || frame_flags & flags::ACK != 0 {
                    self.state = PrefaceState::Invalid;
                    return Err(Http2Error::connection_error(
                        ErrorCode::ProtocolError,
                        format!(
                            "first received frame was not SETTINGS. Hex dump for first {} bytes: {}",
                            SETTINGS_PEEK_LEN,
                            hex_dump(&buf[..SETTINGS_PEEK_LEN])
                        ),
                    ));
                }
                self.state = PrefaceState::Valid;
                handshake.complete = true;
                Ok(handshake)
            }
            PrefaceState::Valid => {
                handshake.complete = true;
                Ok(handshake)
            }
            PrefaceState::Invalid => Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                "connection preface already failed",
            )),
            PrefaceState::AwaitingPreface { .. } => Ok(handshake),
        }
    }
}

fn initial_state(role: Role) -> PrefaceState {
    match role {
        Role::Server => PrefaceState::AwaitingPreface { matched: 0 },
        Role::Client => PrefaceState::AwaitingSettings,
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_HEADER: [u8; 9] = [0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];

    fn with_settings(prefix: &[u8]) -> BytesMut {
        let mut buf = BytesMut::from(prefix);
        buf.extend_from_slice(&SETTINGS_HEADER);
        buf
    }

    #[test]
    fn test_server_full_preface_and_settings() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = with_settings(CONNECTION_PREFACE);

        let handshake = decoder.decode(&mut buf).unwrap();
        assert!(handshake.preface_matched);
        assert!(!handshake.complete);

        let handshake = decoder.decode(&mut buf).unwrap();
        assert!(!handshake.preface_matched);
        assert!(handshake.complete);
        assert!(decoder.is_valid());
        assert_eq!(&buf[..], &SETTINGS_HEADER);
    }

    #[test]
    fn test_server_split_preface() {
        let mut decoder = PrefaceDecoder::new(Role::Server);

        let mut buf = BytesMut::from(&CONNECTION_PREFACE[..3]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Handshake::default());
        assert!(buf.is_empty());
        assert_eq!(
            decoder.state(),
            PrefaceState::AwaitingPreface { matched: 3 }
        );

        let mut buf = BytesMut::from(&CONNECTION_PREFACE[3..]);
        let handshake = decoder.decode(&mut buf).unwrap();
        assert!(handshake.preface_matched);
        assert!(!handshake.complete);
        assert_eq!(decoder.state(), PrefaceState::AwaitingSettings);

        // Four bytes are not enough to see the frame type.
        let mut buf = BytesMut::from(&SETTINGS_HEADER[..4]);
        assert!(!decoder.decode(&mut buf).unwrap().complete);

        let mut buf = BytesMut::from(&SETTINGS_HEADER[..]);
        assert!(decoder.decode(&mut buf).unwrap().complete);
    }

    #[test]
    fn test_server_mismatch_fails_fast() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = BytesMut::from(&b"PRI * HTTP/1.1"[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProtocolError);
        assert!(err.is_connection_error());
        assert_eq!(decoder.state(), PrefaceState::Invalid);

        // Every further chunk fails again.
        let mut buf = BytesMut::from(&b"anything"[..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_server_non_settings_after_preface() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = BytesMut::from(CONNECTION_PREFACE);
        // PING header instead of SETTINGS
        buf.extend_from_slice(&[0x00, 0x00, 0x08, 0x06, 0x00]);

        assert!(decoder.decode(&mut buf).unwrap().preface_matched);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProtocolError);
        assert_eq!(decoder.state(), PrefaceState::Invalid);
    }

    #[test]
    fn test_settings_ack_first_is_invalid() {
        let mut decoder = PrefaceDecoder::new(Role::Client);
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x04, 0x01][..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_client_skips_preface() {
        let mut decoder = PrefaceDecoder::new(Role::Client);
        assert_eq!(decoder.state(), PrefaceState::AwaitingSettings);

        let mut buf = BytesMut::from(&SETTINGS_HEADER[..]);
        let handshake = decoder.decode(&mut buf).unwrap();
        assert!(!handshake.preface_matched);
        assert!(handshake.complete);
        assert_eq!(buf.len(), SETTINGS_HEADER.len());
    }

    #[test]
    fn test_removal_resets_partial_progress() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = BytesMut::from(&CONNECTION_PREFACE[..10]);
        decoder.decode(&mut buf).unwrap();

        decoder.on_removed();
        assert_eq!(
            decoder.state(),
            PrefaceState::AwaitingPreface { matched: 0 }
        );

        // Continuing where the old progress left off no longer matches.
        let mut buf = BytesMut::from(&CONNECTION_PREFACE[10..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_removal_keeps_completed_handshake() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = with_settings(CONNECTION_PREFACE);
        decoder.decode(&mut buf).unwrap();
        decoder.decode(&mut buf).unwrap();

        decoder.on_removed();
        assert!(decoder.is_valid());

        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x04, 0x01][..]);
        assert!(decoder.decode(&mut buf).unwrap().complete);
    }

    #[test]
    fn test_removal_resets_invalid() {
        let mut decoder = PrefaceDecoder::new(Role::Server);
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(decoder.decode(&mut buf).is_err());

        decoder.on_removed();
        let mut buf = with_settings(CONNECTION_PREFACE);
        assert!(decoder.decode(&mut buf).unwrap().preface_matched);
        assert!(decoder.decode(&mut buf).unwrap().complete);
    }
}
