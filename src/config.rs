//! Tunables for the NFC transports.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::nfc::apdu::MAX_LE;

/// ENVELOPE header plus Lc/Le overhead reserved out of every transceive.
pub const APDU_OVERHEAD: usize = 10;
/// The final ENVELOPE asks for this many response bytes, so it is bounded by the largest Le.
pub const MAX_TRANSCEIVE_LENGTH: usize = MAX_LE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("maxTransceiveLength must be in {min}..={max}, got {value}")]
    InvalidTransceiveLength { value: usize, min: usize, max: usize },
    #[error("maxGetResponseIterations must not be zero")]
    ZeroIterationCap,
    #[error("defaultListenerLe must be in 1..=65536, got {0}")]
    InvalidListenerLe(usize),
    #[error("could not parse transport configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Parse(_) => ErrorKind::MalformedEncoding,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Largest command APDU the reader's link accepts, header included.
    pub max_transceive_length: usize,
    pub writer_poll_interval_ms: u64,
    /// Cap on GET RESPONSE rounds within one exchange.
    pub max_get_response_iterations: usize,
    pub exchange_timeout_ms: u64,
    /// Response chunk size used when the final ENVELOPE carries no Le.
    pub default_listener_le: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_transceive_length: 261,
            writer_poll_interval_ms: 500,
            max_get_response_iterations: 1024,
            exchange_timeout_ms: 30_000,
            default_listener_le: 256,
        }
    }
}

impl TransportConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_transceive_length <= APDU_OVERHEAD
            || self.max_transceive_length > MAX_TRANSCEIVE_LENGTH
        {
            return Err(ConfigError::InvalidTransceiveLength {
                value: self.max_transceive_length,
                min: APDU_OVERHEAD + 1,
                max: MAX_TRANSCEIVE_LENGTH,
            });
        }
        if self.max_get_response_iterations == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        if self.default_listener_le == 0 || self.default_listener_le > 65536 {
            return Err(ConfigError::InvalidListenerLe(self.default_listener_le));
        }
        Ok(())
    }

    /// Payload bytes carried by each outgoing ENVELOPE.
    pub fn chunk_size(&self) -> usize {
        self.max_transceive_length - APDU_OVERHEAD
    }

    pub fn writer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.writer_poll_interval_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}
