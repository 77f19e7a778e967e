//! HTTP/2 settings and engine configuration
//!
//! [`Settings`] is the RFC 7540 Section 6.5 parameter set as exchanged with
//! the peer. [`EngineConfig`] is the full option surface of one connection
//! engine; it starts from defaults and absorbs a peer's settings.

use super::error::{Error, Result};
use super::hpack::HpackConfig;
use super::{
    DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE,
    MAX_FRAME_SIZE_LIMIT, MAX_WINDOW_SIZE,
};
use std::fmt;
use std::time::Duration;

/// HTTP/2 settings parameters (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1)
    /// Largest HPACK dynamic table the receiver's decoder accepts
    HeaderTableSize = 0x1,

    /// SETTINGS_ENABLE_PUSH (0x2)
    EnablePush = 0x2,

    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    MaxConcurrentStreams = 0x3,

    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    /// Initial window size for stream-level flow control
    InitialWindowSize = 0x4,

    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    MaxFrameSize = 0x5,

    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
    MaxHeaderListSize = 0x6,
}

impl SettingsParameter {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// HTTP/2 settings as carried by one SETTINGS frame
///
/// Absent values leave the receiver's current value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Header table size (default: 4096)
    pub header_table_size: Option<u32>,

    /// Enable server push (default: true)
    pub enable_push: Option<bool>,

    /// Maximum concurrent streams (default: unlimited)
    pub max_concurrent_streams: Option<u32>,

    /// Initial window size (default: 65535)
    pub initial_window_size: Option<u32>,

    /// Maximum frame size (default: 16384, range: 16384-16777215)
    pub max_frame_size: Option<u32>,

    /// Maximum header list size (default: unlimited)
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Settings::default()
    }

    /// Create settings carrying every RFC 7540 default
    pub fn default_settings() -> Self {
        Settings {
            header_table_size: Some(DEFAULT_HEADER_TABLE_SIZE),
            enable_push: Some(true),
            max_concurrent_streams: None,
            initial_window_size: Some(DEFAULT_INITIAL_WINDOW_SIZE),
            max_frame_size: Some(DEFAULT_MAX_FRAME_SIZE),
            max_header_list_size: None,
        }
    }

    /// Get header table size (with default)
    pub fn get_header_table_size(&self) -> u32 {
        self.header_table_size.unwrap_or(DEFAULT_HEADER_TABLE_SIZE)
    }

    /// Get enable push (with default)
    pub fn get_enable_push(&self) -> bool {
        self.enable_push.unwrap_or(true)
    }

    /// Get max concurrent streams (None = unlimited)
    pub fn get_max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get initial window size (with default)
    pub fn get_initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Get max frame size (with default)
    pub fn get_max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Get max header list size (None = unlimited)
    pub fn get_max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Apply one identifier/value pair as it appears on the wire.
    ///
    /// Unknown identifiers are ignored (RFC 7540 Section 6.5.2).
    pub fn set(&mut self, id: u16, value: u32) -> Result<()> {
        let Some(param) = SettingsParameter::from_u16(id) else {
            return Ok(());
        };
        match param {
            SettingsParameter::HeaderTableSize => self.header_table_size = Some(value),
            SettingsParameter::EnablePush => match value {
                0 => self.enable_push = Some(false),
                1 => self.enable_push = Some(true),
                _ => {
                    return Err(Error::InvalidSettings(format!(
                        "{} must be 0 or 1, got {}",
                        param, value
                    )))
                }
            },
            SettingsParameter::MaxConcurrentStreams => self.max_concurrent_streams = Some(value),
            SettingsParameter::InitialWindowSize => self.initial_window_size = Some(value),
            SettingsParameter::MaxFrameSize => self.max_frame_size = Some(value),
            SettingsParameter::MaxHeaderListSize => self.max_header_list_size = Some(value),
        }
        self.validate()
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if let Some(initial_window_size) = self.initial_window_size {
            if initial_window_size > MAX_WINDOW_SIZE {
                return Err(Error::InvalidSettings(format!(
                    "Initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        if let Some(max_frame_size) = self.max_frame_size {
            if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&max_frame_size) {
                return Err(Error::InvalidSettings(format!(
                    "Max frame size {} outside valid range (16384-16777215)",
                    max_frame_size
                )));
            }
        }

        Ok(())
    }

    /// Merge settings from another Settings object
    /// (values in `other` override values in `self`)
    pub fn merge(&mut self, other: &Settings) {
        if other.header_table_size.is_some() {
            self.header_table_size = other.header_table_size;
        }
        if other.enable_push.is_some() {
            self.enable_push = other.enable_push;
        }
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.max_frame_size.is_some() {
            self.max_frame_size = other.max_frame_size;
        }
        if other.max_header_list_size.is_some() {
            self.max_header_list_size = other.max_header_list_size;
        }
    }
}

/// Builder for HTTP/2 settings
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder::default()
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.header_table_size = Some(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings.enable_push = Some(enable);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.max_concurrent_streams = Some(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.initial_window_size = Some(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.max_frame_size = Some(size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.max_header_list_size = Some(size);
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Configuration of one connection engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Server side of the connection (allocates even stream IDs)
    pub is_server: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub header_table_size: u32,
    pub max_header_list_size: Option<u32>,
    pub hpack_huffman_enabled: bool,
    pub hpack_indexing_enabled: bool,
    pub server_push_enabled: bool,
    pub max_push_resources: usize,
    /// Streams whose handlers may run at the same time
    pub max_concurrent_processing: usize,
    /// Receive windows below this get refilled; `None` means half the initial size
    pub window_update_threshold: Option<u32>,
    /// How long a closed stream stays in the registry
    pub stream_drain_delay: Duration,
    /// Window within which the same resource is not pushed twice
    pub push_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            is_server: true,
            max_concurrent_streams: 100,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            max_header_list_size: None,
            hpack_huffman_enabled: true,
            hpack_indexing_enabled: true,
            server_push_enabled: true,
            max_push_resources: 10,
            max_concurrent_processing: 10,
            window_update_threshold: None,
            stream_drain_delay: Duration::from_secs(1),
            push_ttl: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Create a config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Defaults with a peer's SETTINGS applied on top
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut config = EngineConfig::default();
        config.apply_settings(settings)?;
        Ok(config)
    }

    /// Apply a peer's SETTINGS to this config
    pub fn apply_settings(&mut self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if let Some(size) = settings.header_table_size {
            self.header_table_size = size;
        }
        if let Some(push) = settings.enable_push {
            self.server_push_enabled = push;
        }
        if let Some(max) = settings.max_concurrent_streams {
            self.max_concurrent_streams = max;
        }
        if let Some(size) = settings.initial_window_size {
            self.initial_window_size = size;
        }
        if let Some(size) = settings.max_frame_size {
            self.max_frame_size = size;
        }
        if settings.max_header_list_size.is_some() {
            self.max_header_list_size = settings.max_header_list_size;
        }
        Ok(())
    }

    /// Effective low-water mark for receive windows
    pub fn window_update_threshold(&self) -> u32 {
        self.window_update_threshold
            .unwrap_or(self.initial_window_size / 2)
    }

    /// HPACK settings for this connection
    pub fn hpack_config(&self) -> HpackConfig {
        HpackConfig {
            header_table_size: self.header_table_size as usize,
            huffman_enabled: self.hpack_huffman_enabled,
            indexing_enabled: self.hpack_indexing_enabled,
            max_header_list_size: self.max_header_list_size.map(|size| size as usize),
        }
    }

    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if self.initial_window_size > MAX_WINDOW_SIZE {
            return Err(Error::InvalidSettings(format!(
                "Initial window size {} exceeds maximum (2^31-1)",
                self.initial_window_size
            )));
        }
        if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&self.max_frame_size) {
            return Err(Error::InvalidSettings(format!(
                "Max frame size {} outside valid range (16384-16777215)",
                self.max_frame_size
            )));
        }
        if self.max_concurrent_processing == 0 {
            return Err(Error::InvalidSettings(
                "max_concurrent_processing must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Client or server side
    pub fn server(mut self, is_server: bool) -> Self {
        self.config.is_server = is_server;
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = max;
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.config.initial_window_size = size;
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.config.header_table_size = size;
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.config.max_header_list_size = Some(size);
        self
    }

    /// Enable or disable Huffman coding of literals
    pub fn hpack_huffman(mut self, enabled: bool) -> Self {
        self.config.hpack_huffman_enabled = enabled;
        self
    }

    /// Enable or disable dynamic table indexing
    pub fn hpack_indexing(mut self, enabled: bool) -> Self {
        self.config.hpack_indexing_enabled = enabled;
        self
    }

    /// Enable or disable server push
    pub fn server_push(mut self, enabled: bool) -> Self {
        self.config.server_push_enabled = enabled;
        self
    }

    /// Set the cap on resources pushed per response
    pub fn max_push_resources(mut self, max: usize) -> Self {
        self.config.max_push_resources = max;
        self
    }

    /// Set the handler concurrency cap
    pub fn max_concurrent_processing(mut self, max: usize) -> Self {
        self.config.max_concurrent_processing = max;
        self
    }

    /// Set the receive window low-water mark
    pub fn window_update_threshold(mut self, threshold: u32) -> Self {
        self.config.window_update_threshold = Some(threshold);
        self
    }

    /// Set the closed-stream drain delay
    pub fn stream_drain_delay(mut self, delay: Duration) -> Self {
        self.config.stream_drain_delay = delay;
        self
    }

    /// Set the push de-duplication window
    pub fn push_ttl(mut self, ttl: Duration) -> Self {
        self.config.push_ttl = ttl;
        self
    }

    /// Build the config
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
