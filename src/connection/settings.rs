//! Local SETTINGS values and their application to the connection.

use crate::frame::{self, Setting, SettingId, SettingsFrame};

/// One endpoint's view of the six RFC 9113 settings.
///
/// A connection keeps two copies: the local settings we advertise, and the
/// remote settings the peer has advertised to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Streams the peer may have open at once.
    pub max_concurrent_streams: u32,
    /// Window every new stream starts with.
    pub initial_window_size: u32,
    /// Maximum frame size.
    pub max_frame_size: u32,
    /// Advisory limit on decoded header size.
    pub max_header_list_size: u32,
    /// SETTINGS_HEADER_TABLE_SIZE.
    pub header_table_size: u32,
    /// PUSH_PROMISE permitted.
    pub enable_push: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: frame::DEFAULT_MAX_CONCURRENT_STREAMS,
            initial_window_size: frame::DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: 16384,
            header_table_size: frame::DEFAULT_HEADER_TABLE_SIZE,
            enable_push: false,
        }
    }
}

/// What changed when a SETTINGS frame was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_concurrent_streams: Option<u32>,
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The values assumed for a peer before its first SETTINGS arrives
    /// (RFC 9113 Section 6.5.2). Concurrency is unlimited until announced.
    pub fn protocol_defaults() -> Self {
        Self {
            max_concurrent_streams: u32::MAX,
            max_header_list_size: u32::MAX,
            enable_push: true,
            ..Self::default()
        }
    }

    pub fn max_concurrent_streams(mut self, value: u32) -> Self {
        self.max_concurrent_streams = value;
        self
    }

    pub fn initial_window_size(mut self, value: u32) -> Self {
        self.initial_window_size = value;
        self
    }

    pub fn max_frame_size(mut self, value: u32) -> Self {
        self.max_frame_size = value;
        self
    }

    pub fn max_header_list_size(mut self, value: u32) -> Self {
        self.max_header_list_size = value;
        self
    }

    pub fn header_table_size(mut self, value: u32) -> Self {
        self.header_table_size = value;
        self
    }

    pub fn enable_push(mut self, value: bool) -> Self {
        self.enable_push = value;
        self
    }

    /// The SETTINGS frame advertising these values.
    ///
    /// `is_server` omits ENABLE_PUSH, which only clients may send.
    pub fn to_frame(&self, is_server: bool) -> SettingsFrame {
        let mut settings = vec![
            Setting {
                id: SettingId::HeaderTableSize,
                value: self.header_table_size,
            },
            Setting {
                id: SettingId::MaxConcurrentStreams,
                value: self.max_concurrent_streams,
            },
            Setting {
                id: SettingId::InitialWindowSize,
                value: self.initial_window_size,
            },
            Setting {
                id: SettingId::MaxFrameSize,
                value: self.max_frame_size,
            },
            Setting {
                id: SettingId::MaxHeaderListSize,
                value: self.max_header_list_size,
            },
        ];
        if !is_server {
            settings.insert(
                1,
                Setting {
                    id: SettingId::EnablePush,
                    value: self.enable_push as u32,
                },
            );
        }

        SettingsFrame {
            ack: false,
            settings,
        }
    }

    /// Apply the entries of a received SETTINGS frame.
    ///
    /// Values are assumed validated by the decoder. Unknown ids are ignored.
    pub fn apply(&mut self, settings: &[Setting]) -> SettingsChange {
        let mut change = SettingsChange::default();
        for setting in settings {
            match setting.id {
                SettingId::HeaderTableSize => self.header_table_size = setting.value,
                SettingId::EnablePush => self.enable_push = setting.value == 1,
                SettingId::MaxConcurrentStreams => {
                    self.max_concurrent_streams = setting.value;
                    change.max_concurrent_streams = Some(setting.value);
                }
                SettingId::InitialWindowSize => {
                    self.initial_window_size = setting.value;
                    change.initial_window_size = Some(setting.value);
                }
                SettingId::MaxFrameSize => {
                    self.max_frame_size = setting.value;
                    change.max_frame_size = Some(setting.value);
                }
                SettingId::MaxHeaderListSize => self.max_header_list_size = setting.value,
                SettingId::Unknown(_) => {}
            }
        }
        change
    }
}
