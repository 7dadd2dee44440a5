//! Reader side of NFC engagement: reads (and for negotiated handover, writes) the NDEF file
//! of the holder's Type 4 Tag.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;
use crate::nfc::apdu::{self, ApduError, FileId, ResponseApdu, ResponseCode};
use crate::nfc::carrier::{CarrierRegistry, ConnectionMethod};
use crate::nfc::engagement::{ndef_write_commands, APDU_AID_NDEF_APPLICATION, CC_FILE_TEMPLATE};
use crate::nfc::handover::{self, HandoverError, HandoverSelect};
use crate::nfc::ndef::{NdefError, NdefMessage, RecordType};
use crate::nfc::tnep::{self, ServiceParameter, ServiceSelect, Status, TnepError};
use crate::nfc::util::KnownOrRaw;

#[derive(Debug, Error)]
pub enum ReaderEngagementError {
    #[error("CC File is of invalid length: {0} instead of {1}")]
    CcFileInvalidLength(usize, usize),
    #[error("CC File has invalid file ID: {0:04X} instead of {1:04X}")]
    CcFileInvalidFileId(u16, u16),
    #[error("NDEF file is read-only, negotiated handover is impossible")]
    NdefFileReadOnly,
    #[error("Handover is done")]
    Done,
    #[error("APDU response indicates a failure: {0:04X}")]
    NegativeResponse(u16),
    #[error("NDEF file is empty")]
    EmptyNdefFile,
    #[error("READ BINARY at offset {0} returned no data")]
    ShortRead(usize),
    #[error("tag offers negotiated handover, but no Handover Request is configured")]
    NegotiationNotConfigured,
    #[error("tag offers service {0:?} instead of connection handover")]
    UnsupportedService(String),
    #[error("tag answered the service select with status {0:#04x}")]
    ServiceRejected(u8),
    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),
    #[error("NDEF message carries no usable Handover Select")]
    NoHandoverSelect,
    #[error(transparent)]
    Apdu(#[from] ApduError),
    #[error(transparent)]
    Ndef(#[from] NdefError),
    #[error(transparent)]
    Tnep(#[from] TnepError),
    #[error(transparent)]
    Handover(#[from] HandoverError),
}

impl ReaderEngagementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderEngagementError::Apdu(e) => e.kind(),
            ReaderEngagementError::Ndef(e) => e.kind(),
            ReaderEngagementError::Tnep(e) => e.kind(),
            ReaderEngagementError::Handover(e) => e.kind(),
            ReaderEngagementError::NegativeResponse(_) | ReaderEngagementError::ShortRead(_) => {
                ErrorKind::TransportFailure
            }
            ReaderEngagementError::CcFileInvalidLength(..)
            | ReaderEngagementError::CcFileInvalidFileId(..)
            | ReaderEngagementError::NoHandoverSelect => ErrorKind::MalformedEncoding,
            ReaderEngagementError::NegotiationNotConfigured
            | ReaderEngagementError::UnsupportedService(_) => ErrorKind::UnsupportedFeature,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

type Result<T, E = ReaderEngagementError> = std::result::Result<T, E>;

/// What the reader puts in its Handover Request when the tag asks for negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderNegotiation {
    /// Encoded ReaderEngagement.
    pub reader_engagement: Vec<u8>,
    pub connection_methods: Vec<ConnectionMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderEngagementResult {
    pub handover_select: HandoverSelect,
    /// The Handover Select as read from the tag.
    pub handover_select_message: Vec<u8>,
    /// The Handover Request written to the tag, for negotiated handover.
    pub handover_request_message: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum ReaderApduProgress {
    InProgress(Vec<u8>),
    Done(Box<ReaderEngagementResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Capabilities {
    /// MLe: largest READ BINARY response.
    max_le: usize,
    /// MLc: largest UPDATE BINARY data field.
    max_lc: usize,
    writable: bool,
}

impl Capabilities {
    fn parse(cc: &[u8]) -> Result<Self> {
        if cc.len() != CC_FILE_TEMPLATE.len() {
            return Err(ReaderEngagementError::CcFileInvalidLength(
                cc.len(),
                CC_FILE_TEMPLATE.len(),
            ));
        }
        let file_id = u16::from_be_bytes([cc[9], cc[10]]);
        if file_id != FileId::NdefFile as u16 {
            return Err(ReaderEngagementError::CcFileInvalidFileId(
                file_id,
                FileId::NdefFile as u16,
            ));
        }
        Ok(Self {
            max_le: (u16::from_be_bytes([cc[3], cc[4]]) as usize).max(1),
            max_lc: (u16::from_be_bytes([cc[5], cc[6]]) as usize).max(1),
            writable: cc[14] == 0x00,
        })
    }
}

#[derive(Debug, Clone)]
enum ReaderHandoverState {
    WaitingForAidResponse,
    WaitingForCapabilitiesFileResponse,
    WaitingForCapabilitiesReadResponse,
    WaitingForNdefFileResponse,
    WaitingForNdefLengthResponse,
    WaitingForNdefReadResponse { expected: usize },
    WaitingForUpdateResponse { remaining: VecDeque<Vec<u8>> },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationPhase {
    Initial,
    ServiceSelected,
    RequestSent,
}

/// Sans-IO reader driver: send the APDU it hands out, feed back the response.
#[derive(Debug)]
pub struct ReaderEngagementDriver {
    state: ReaderHandoverState,
    phase: NegotiationPhase,
    capabilities: Option<Capabilities>,
    ndef_recv: Vec<u8>,
    negotiation: Option<ReaderNegotiation>,
    handover_request: Option<Vec<u8>>,
    registry: CarrierRegistry,
}

impl ReaderEngagementDriver {
    /// Creates the driver and the first command to send.
    ///
    /// * `negotiation`: Handover Request content, used when the tag offers TNEP. `None` limits
    ///   the reader to static handover.
    pub fn new(negotiation: Option<ReaderNegotiation>) -> Result<(Self, Vec<u8>)> {
        let driver = Self {
            state: ReaderHandoverState::WaitingForAidResponse,
            phase: NegotiationPhase::Initial,
            capabilities: None,
            ndef_recv: Vec::new(),
            negotiation,
            handover_request: None,
            registry: CarrierRegistry::default(),
        };
        Ok((driver, apdu::select_aid(APDU_AID_NDEF_APPLICATION)?))
    }

    pub fn with_registry(mut self, registry: CarrierRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn capabilities(&self) -> Result<Capabilities> {
        self.capabilities
            .ok_or(ReaderEngagementError::UnexpectedMessage("NDEF before the CC file"))
    }

    fn next_read(&mut self, expected: usize) -> Result<ReaderApduProgress> {
        let have = self.ndef_recv.len();
        let length = (expected - have).min(self.capabilities()?.max_le);
        self.state = ReaderHandoverState::WaitingForNdefReadResponse { expected };
        Ok(ReaderApduProgress::InProgress(apdu::read_binary(
            2 + have,
            length,
        )?))
    }

    fn write(&mut self, message: &[u8]) -> Result<ReaderApduProgress> {
        let capabilities = self.capabilities()?;
        if !capabilities.writable {
            return Err(ReaderEngagementError::NdefFileReadOnly);
        }
        let mut remaining: VecDeque<_> = ndef_write_commands(message, capabilities.max_lc)?.into();
        let first = remaining
            .pop_front()
            .ok_or(ReaderEngagementError::UnexpectedMessage("empty write"))?;
        self.state = ReaderHandoverState::WaitingForUpdateResponse { remaining };
        Ok(ReaderApduProgress::InProgress(first))
    }

    fn handle_message(&mut self) -> Result<ReaderApduProgress> {
        let bytes = std::mem::take(&mut self.ndef_recv);
        let message = NdefMessage::parse(&bytes)?;

        if let Some(record) = message.find(RecordType::TnepServiceParameter) {
            if self.phase != NegotiationPhase::Initial {
                return Err(ReaderEngagementError::UnexpectedMessage("service parameter"));
            }
            if self.negotiation.is_none() {
                return Err(ReaderEngagementError::NegotiationNotConfigured);
            }
            let parameter = ServiceParameter::from_record(record)?;
            if parameter.service_name != tnep::HANDOVER_SERVICE {
                return Err(ReaderEngagementError::UnsupportedService(
                    parameter.service_name,
                ));
            }
            debug!(
                "tag offers negotiated handover, t_wait {} ms",
                parameter.t_wait_millis()
            );
            let select =
                NdefMessage::new(vec![ServiceSelect::new(tnep::HANDOVER_SERVICE).to_record()?])
                    .encode()?;
            self.phase = NegotiationPhase::ServiceSelected;
            return self.write(&select);
        }

        if let Some(record) = message.find(RecordType::TnepStatus) {
            if self.phase != NegotiationPhase::ServiceSelected {
                return Err(ReaderEngagementError::UnexpectedMessage("TNEP status"));
            }
            let status = Status::from_record(record)?;
            if !status.is_success() {
                return Err(ReaderEngagementError::ServiceRejected(status.status));
            }
            let negotiation = self
                .negotiation
                .as_ref()
                .ok_or(ReaderEngagementError::NegotiationNotConfigured)?;
            let request = handover::generate_handover_request(
                &negotiation.connection_methods,
                &negotiation.reader_engagement,
                &self.registry,
            )?;
            self.phase = NegotiationPhase::RequestSent;
            self.handover_request = Some(request.clone());
            return self.write(&request);
        }

        let handover_select = handover::parse_handover_select(&bytes, &self.registry)
            .ok_or(ReaderEngagementError::NoHandoverSelect)?;
        tracing::info!(
            "handover complete with {} connection method(s)",
            handover_select.connection_methods.len()
        );
        self.state = ReaderHandoverState::Done;
        Ok(ReaderApduProgress::Done(Box::new(ReaderEngagementResult {
            handover_select,
            handover_select_message: bytes,
            handover_request_message: self.handover_request.take(),
        })))
    }

    pub fn process_rapdu(&mut self, rapdu: &[u8]) -> Result<ReaderApduProgress> {
        let rapdu = ResponseApdu::parse(rapdu)?;
        debug!("Received response APDU: {rapdu:?}");
        let end_of_file = rapdu.code() == KnownOrRaw::Known(ResponseCode::EndOfFileReached);
        let is_read = matches!(
            self.state,
            ReaderHandoverState::WaitingForNdefReadResponse { .. }
        );
        if !(rapdu.is_ok() || (is_read && end_of_file)) {
            return Err(ReaderEngagementError::NegativeResponse(rapdu.status_word()));
        }
        match std::mem::replace(&mut self.state, ReaderHandoverState::Done) {
            ReaderHandoverState::WaitingForAidResponse => {
                self.state = ReaderHandoverState::WaitingForCapabilitiesFileResponse;
                Ok(ReaderApduProgress::InProgress(apdu::select_file(
                    FileId::CapabilityContainer as u16,
                )?))
            }
            ReaderHandoverState::WaitingForCapabilitiesFileResponse => {
                self.state = ReaderHandoverState::WaitingForCapabilitiesReadResponse;
                Ok(ReaderApduProgress::InProgress(apdu::read_binary(
                    0,
                    CC_FILE_TEMPLATE.len(),
                )?))
            }
            ReaderHandoverState::WaitingForCapabilitiesReadResponse => {
                self.capabilities = Some(Capabilities::parse(&rapdu.payload)?);
                self.state = ReaderHandoverState::WaitingForNdefFileResponse;
                Ok(ReaderApduProgress::InProgress(apdu::select_file(
                    FileId::NdefFile as u16,
                )?))
            }
            ReaderHandoverState::WaitingForNdefFileResponse => {
                self.state = ReaderHandoverState::WaitingForNdefLengthResponse;
                Ok(ReaderApduProgress::InProgress(apdu::read_binary(0, 2)?))
            }
            ReaderHandoverState::WaitingForNdefLengthResponse => {
                let Ok(nlen) = <[u8; 2]>::try_from(rapdu.payload.as_slice()) else {
                    return Err(ReaderEngagementError::ShortRead(0));
                };
                let expected = u16::from_be_bytes(nlen) as usize;
                if expected == 0 {
                    return Err(ReaderEngagementError::EmptyNdefFile);
                }
                self.ndef_recv.clear();
                self.next_read(expected)
            }
            ReaderHandoverState::WaitingForNdefReadResponse { expected } => {
                if rapdu.payload.is_empty() {
                    return Err(ReaderEngagementError::ShortRead(2 + self.ndef_recv.len()));
                }
                let wanted = expected - self.ndef_recv.len();
                let take = rapdu.payload.len().min(wanted);
                self.ndef_recv.extend_from_slice(&rapdu.payload[..take]);
                if self.ndef_recv.len() < expected {
                    self.next_read(expected)
                } else {
                    self.handle_message()
                }
            }
            ReaderHandoverState::WaitingForUpdateResponse { mut remaining } => {
                match remaining.pop_front() {
                    Some(next) => {
                        self.state = ReaderHandoverState::WaitingForUpdateResponse { remaining };
                        Ok(ReaderApduProgress::InProgress(next))
                    }
                    None => {
                        self.state = ReaderHandoverState::WaitingForNdefLengthResponse;
                        Ok(ReaderApduProgress::InProgress(apdu::read_binary(0, 2)?))
                    }
                }
            }
            ReaderHandoverState::Done => Err(ReaderEngagementError::Done),
        }
    }
}
