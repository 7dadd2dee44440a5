//! NFC data transfer: session messages tunnelled through ENVELOPE / GET RESPONSE once the mdoc
//! AID is selected.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::ErrorKind;
use crate::nfc::apdu::ApduError;
use crate::nfc::tlv::TlvError;

pub mod mdoc;
pub mod reader;
pub mod registry;

pub use mdoc::{ListenerEvent, ListenerSession, ListenerState, ListenerStep, MdocNfcTransport};
pub use reader::{ReaderNfcSession, ReaderNfcTransport};
pub use registry::{SessionHandle, SessionRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("NFC link failure: {0}")]
    Link(String),
    #[error("unexpected status word {0:04X}")]
    UnexpectedStatus(u16),
    #[error("no response after {0} GET RESPONSE commands")]
    TooManyGetResponses(usize),
    #[error("exchange did not finish within {0:?}")]
    Timeout(Duration),
    #[error("transport is closed")]
    Closed,
    #[error("mdoc application is not selected")]
    NotConnected,
    #[error("no command is waiting for a response")]
    NoPendingResponse,
    #[error("cannot send an empty message")]
    EmptyMessage,
    #[error("session {0} is already registered")]
    DuplicateSession(SessionHandle),
    #[error("session {0} is not registered")]
    UnknownSession(SessionHandle),
    #[error("no active session")]
    NoActiveSession,
    #[error("could not start worker thread: {0}")]
    Spawn(String),
    #[error(transparent)]
    Apdu(#[from] ApduError),
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Apdu(e) => e.kind(),
            TransportError::Tlv(e) => e.kind(),
            TransportError::Config(e) => e.kind(),
            TransportError::Link(_)
            | TransportError::Timeout(_)
            | TransportError::Closed
            | TransportError::Spawn(_) => ErrorKind::TransportFailure,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

/// Upward callbacks of a transport. Invoked from the NFC thread or the transport's worker,
/// never while the transport holds its own lock.
pub trait TransportListener: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self);
    fn on_message_received(&self, message: Vec<u8>);
    fn on_error(&self, error: TransportError);
}

/// Channel back to the NFC stack for response APDUs, typically the host card emulation service.
pub trait ApduResponder: Send + Sync {
    fn send_response(&self, response: Vec<u8>);
}

/// Reader hardware: sends one command APDU and blocks for its response.
pub trait Transceiver: Send {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transceive(command)
    }
}
