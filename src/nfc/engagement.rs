//! Holder side of NFC engagement: a Type 4 Tag that serves the handover NDEF message.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::nfc::apdu::{self, Apdu, FileId, ResponseApdu, ResponseCode};
use crate::nfc::carrier::{CarrierRegistry, ConnectionMethod};
use crate::nfc::handover::{self, HandoverError};
use crate::nfc::ndef::{NdefError, NdefMessage, RecordType};
use crate::nfc::tnep::{self, ServiceParameter, ServiceSelect, Status, TnepError};
use crate::nfc::util::{DisplayBytesAsHex, KnownOrRaw};

pub const APDU_AID_MDOC: &[u8] = &[0xA0, 0x00, 0x00, 0x02, 0x48, 0x04, 0x00];
pub const APDU_AID_NDEF_APPLICATION: &[u8] = &[0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

const NFC_MAX_PAYLOAD_SIZE_BYTES: [u8; 2] = tnep::NFC_MAX_PAYLOAD_SIZE.to_be_bytes();
const APDU_MAX_SIZE: u16 = tnep::NFC_MAX_PAYLOAD_SIZE + 10;
const APDU_MAX_SIZE_BYTES: [u8; 2] = APDU_MAX_SIZE.to_be_bytes();

#[rustfmt::skip]
pub const CC_FILE_TEMPLATE: &[u8] = &[
    0x00, 0x0f, // Length of the CC file
    0x20, // Mapping version
    APDU_MAX_SIZE_BYTES[0], APDU_MAX_SIZE_BYTES[1], // Maximum R-APDU (reader -> app) size
    APDU_MAX_SIZE_BYTES[0], APDU_MAX_SIZE_BYTES[1], // Maximum C-APDU (app -> reader) size
    0x04, // NDEF file control TLV
    0x06, // Length of TLV
    0xe1, 0x04, // File ID: NDEF file (0xe104)
    NFC_MAX_PAYLOAD_SIZE_BYTES[0], NFC_MAX_PAYLOAD_SIZE_BYTES[1],
    0x00, // Read access condition
    0x00, // Write access condition. 00 for negotiated, ff for static
];

pub fn cc_file(negotiated: bool) -> Vec<u8> {
    let mut cc = CC_FILE_TEMPLATE.to_vec();
    cc[14] = if negotiated { 0x00 } else { 0xff };
    cc
}

#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("expected no NDEF message, but received one")]
    UnexpectedNdef,
    #[error("no {0:?} record in the message from the reader")]
    MissingRecord(RecordType),
    #[error("reader selected unsupported service {0:?}")]
    UnsupportedService(String),
    #[error("Handover Request could not be parsed")]
    InvalidHandoverRequest,
    #[error("reader offers no connection method the holder supports")]
    NoCommonCarrier,
    #[error("NDEF message arrived after the handover completed")]
    AlreadyDone,
    #[error("NDEF message of {0} bytes does not fit the NDEF file")]
    MessageTooLong(usize),
    #[error(transparent)]
    Ndef(#[from] NdefError),
    #[error(transparent)]
    Tnep(#[from] TnepError),
    #[error(transparent)]
    Handover(#[from] HandoverError),
}

impl EngagementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngagementError::Ndef(e) => e.kind(),
            EngagementError::Tnep(e) => e.kind(),
            EngagementError::Handover(e) => e.kind(),
            EngagementError::InvalidHandoverRequest => ErrorKind::MalformedEncoding,
            EngagementError::UnsupportedService(_) | EngagementError::NoCommonCarrier => {
                ErrorKind::UnsupportedFeature
            }
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

/// Progress of TNEP negotiated handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Init,
    WaitingForServiceSelect,
    WaitingForHandoverRequest,
    Done,
}

/// What the engagement settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementResult {
    pub device_engagement: Vec<u8>,
    pub connection_methods: Vec<ConnectionMethod>,
    pub handover_select: Vec<u8>,
    /// Only present for negotiated handover.
    pub handover_request: Option<Vec<u8>>,
}

/// Reassembles an NDEF message written with one or more UPDATE BINARY commands.
#[derive(Debug, Clone, Default)]
struct NdefUpdateDriver {
    bytes: Vec<u8>,
}

impl NdefUpdateDriver {
    fn reset(&mut self) {
        self.bytes.clear();
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// `offset` counts from the start of the NDEF file, NLEN included.
    fn handle(&mut self, offset: usize, bytes: &[u8]) -> Result<Option<Vec<u8>>, ResponseCode> {
        if offset == 1 {
            // The file length must be written in one go.
            return Err(ResponseCode::Unspecified);
        }
        let (file_length, bytes) = match bytes {
            [hi, lo, rest @ ..] if offset == 0 => (Some(u16::from_be_bytes([*hi, *lo]) as usize), rest),
            _ => (None, bytes),
        };
        match (offset, file_length, bytes.len()) {
            (0, Some(0), _) => {
                // NLEN cleared before a chunked write.
                self.reset();
                self.bytes.extend_from_slice(bytes);
                Ok(None)
            }
            (0, Some(file_length), 0) => {
                // NLEN written last: the message is complete.
                if self.bytes.len() == file_length {
                    Ok(Some(self.take()))
                } else {
                    self.reset();
                    Err(ResponseCode::ConditionsNotSatisfied)
                }
            }
            (0, Some(file_length), _) => {
                self.reset();
                self.bytes.extend_from_slice(bytes);
                if file_length == self.bytes.len() {
                    Ok(Some(self.take()))
                } else {
                    Ok(None)
                }
            }
            (0, None, _) => {
                self.reset();
                Err(ResponseCode::Unspecified)
            }
            (offset_plus_two, _, _) => {
                let offset = offset_plus_two - 2;
                if offset != self.bytes.len() {
                    // Non-contiguous writes are not supported.
                    self.reset();
                    Err(ResponseCode::ConditionsNotSatisfied)
                } else {
                    self.bytes.extend_from_slice(bytes);
                    Ok(None)
                }
            }
        }
    }
}

fn with_nlen(message: &[u8]) -> Result<Vec<u8>, EngagementError> {
    let len = u16::try_from(message.len()).map_err(|_| EngagementError::MessageTooLong(message.len()))?;
    let mut file = Vec::with_capacity(message.len() + 2);
    file.extend_from_slice(&len.to_be_bytes());
    file.extend_from_slice(message);
    Ok(file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectedFile {
    CapabilityContainer,
    Ndef,
}

/// Sans-IO holder driver: feed it command APDUs, send back what it returns.
#[derive(Debug)]
pub struct MdocEngagementDriver {
    /// Refuse to answer until the mdoc AID has been selected.
    strict: bool,
    negotiated: bool,
    device_engagement: Vec<u8>,
    methods: Vec<ConnectionMethod>,
    registry: CarrierRegistry,
    state: NegotiationState,
    selected_file: Option<SelectedFile>,
    ndef_file: Option<Vec<u8>>,
    ndef_recv: NdefUpdateDriver,
    listen_for_ndef: bool,
    result: Option<EngagementResult>,
}

impl MdocEngagementDriver {
    /// * `device_engagement`: encoded DeviceEngagement placed in the Handover Select.
    /// * `methods`: connection methods the holder offers, in order of preference.
    /// * `negotiated`: true -> TNEP negotiated handover, false -> static handover.
    /// * `strict`: require selecting the mdoc AID before responding to NDEF reads.
    pub fn new(
        device_engagement: Vec<u8>,
        methods: Vec<ConnectionMethod>,
        negotiated: bool,
        strict: bool,
    ) -> Self {
        Self {
            strict,
            negotiated,
            device_engagement,
            methods,
            registry: CarrierRegistry::default(),
            state: NegotiationState::Init,
            selected_file: None,
            ndef_file: None,
            ndef_recv: NdefUpdateDriver::default(),
            listen_for_ndef: false,
            result: None,
        }
    }

    pub fn with_registry(mut self, registry: CarrierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.state
    }

    /// Resets the session, keeping the engagement and methods.
    pub fn reset(&mut self) {
        self.state = NegotiationState::Init;
        self.selected_file = None;
        self.ndef_file = None;
        self.ndef_recv.reset();
        self.listen_for_ndef = false;
    }

    /// Returns the handover outcome once, after the reader has been served the Handover Select.
    pub fn take_result(&mut self) -> Option<EngagementResult> {
        self.result.take()
    }

    fn static_handover(&mut self) -> Result<Vec<u8>, EngagementError> {
        let hs =
            handover::generate_handover_select(&self.methods, &self.device_engagement, &self.registry)?;
        tracing::info!("static handover with {} method(s)", self.methods.len());
        self.state = NegotiationState::Done;
        self.result = Some(EngagementResult {
            device_engagement: self.device_engagement.clone(),
            connection_methods: self.methods.clone(),
            handover_select: hs.clone(),
            handover_request: None,
        });
        Ok(hs)
    }

    /// Produces the next NDEF message of the negotiated exchange from the reader's last one.
    fn negotiate(&mut self, from_reader: Option<&[u8]>) -> Result<Vec<u8>, EngagementError> {
        match (self.state, from_reader) {
            (NegotiationState::Init, None) => {
                self.state = NegotiationState::WaitingForServiceSelect;
                let tp = ServiceParameter::handover().to_record()?;
                Ok(NdefMessage::new(vec![tp]).encode()?)
            }
            (NegotiationState::Init, Some(_)) => Err(EngagementError::UnexpectedNdef),
            (NegotiationState::WaitingForServiceSelect, Some(bytes)) => {
                let message = NdefMessage::parse(bytes)?;
                let record = message
                    .find(RecordType::TnepServiceSelect)
                    .ok_or(EngagementError::MissingRecord(RecordType::TnepServiceSelect))?;
                let ts = ServiceSelect::from_record(record)?;
                if ts.service_name != tnep::HANDOVER_SERVICE {
                    return Err(EngagementError::UnsupportedService(ts.service_name));
                }
                self.state = NegotiationState::WaitingForHandoverRequest;
                Ok(NdefMessage::new(vec![Status::SUCCESS.to_record()]).encode()?)
            }
            (NegotiationState::WaitingForHandoverRequest, Some(bytes)) => {
                let request = handover::parse_handover_request(bytes, &self.registry)
                    .ok_or(EngagementError::InvalidHandoverRequest)?;
                let chosen = request
                    .connection_methods
                    .iter()
                    .find_map(|offered| self.methods.iter().find(|m| m.kind() == offered.kind()))
                    .cloned()
                    .ok_or(EngagementError::NoCommonCarrier)?;
                tracing::info!("negotiated handover chose {}", chosen.kind());
                let methods = vec![chosen];
                let hs =
                    handover::generate_handover_select(&methods, &self.device_engagement, &self.registry)?;
                self.state = NegotiationState::Done;
                self.result = Some(EngagementResult {
                    device_engagement: self.device_engagement.clone(),
                    connection_methods: methods,
                    handover_select: hs.clone(),
                    handover_request: Some(bytes.to_vec()),
                });
                Ok(hs)
            }
            (NegotiationState::Done, _) => Err(EngagementError::AlreadyDone),
            (_, None) => Err(EngagementError::MissingRecord(match self.state {
                NegotiationState::WaitingForServiceSelect => RecordType::TnepServiceSelect,
                _ => RecordType::HandoverRequest,
            })),
        }
    }

    fn select_ndef_file(&mut self) -> Result<(), EngagementError> {
        // Reselecting keeps the current content.
        if self.ndef_file.is_some() {
            return Ok(());
        }
        let message = if self.negotiated {
            self.negotiate(None)?
        } else {
            self.static_handover()?
        };
        self.ndef_file = Some(with_nlen(&message)?);
        Ok(())
    }

    fn process_apdu_inner(&mut self, command: &[u8]) -> ResponseApdu {
        let command = match Apdu::parse(command) {
            Ok(command) => command,
            Err(ret) => return ret,
        };

        tracing::debug!("Received APDU: {:?}", command);

        match command {
            Apdu::SelectFile {
                control_info,
                file_id,
                ..
            } => {
                let response = match control_info.get_payload() {
                    Ok(response) => response,
                    Err(err) => return err,
                };
                match file_id {
                    KnownOrRaw::Known(FileId::CapabilityContainer) => {
                        self.selected_file = Some(SelectedFile::CapabilityContainer);
                        response
                    }
                    KnownOrRaw::Known(FileId::NdefFile) => match self.select_ndef_file() {
                        Ok(()) => {
                            self.selected_file = Some(SelectedFile::Ndef);
                            response
                        }
                        Err(err) => {
                            tracing::error!("Handover error: {err}");
                            self.reset();
                            ResponseCode::Unspecified.into()
                        }
                    },
                    KnownOrRaw::Unknown(_) => ResponseCode::FileOrApplicationNotFound.into(),
                }
            }
            Apdu::SelectAid {
                control_info, aid, ..
            } => match aid {
                APDU_AID_MDOC => match control_info.get_payload() {
                    Ok(response) => {
                        self.listen_for_ndef = true;
                        response
                    }
                    Err(err) => err,
                },
                APDU_AID_NDEF_APPLICATION => match control_info.get_payload() {
                    Ok(response) => response,
                    Err(err) => err,
                },
                _ => ResponseCode::FileOrApplicationNotFound.into(),
            },
            Apdu::ReadBinary { slice } => {
                let file = match self.selected_file {
                    Some(SelectedFile::CapabilityContainer) => cc_file(self.negotiated),
                    Some(SelectedFile::Ndef) => match &self.ndef_file {
                        Some(file) => file.clone(),
                        None => return ResponseCode::ConditionsNotSatisfied.into(),
                    },
                    None => return ResponseCode::ConditionsNotSatisfied.into(),
                };
                if slice.start >= file.len() {
                    return ResponseCode::IncorrectP1OrP2.into();
                }
                if slice.end > file.len() {
                    return ResponseApdu::new(
                        file[slice.start..].to_vec(),
                        ResponseCode::EndOfFileReached,
                    );
                }
                ResponseApdu::new(file[slice].to_vec(), ResponseCode::Ok)
            }
            Apdu::UpdateBinary { offset, data } => {
                if !self.negotiated || self.selected_file != Some(SelectedFile::Ndef) {
                    return ResponseCode::ConditionsNotSatisfied.into();
                }
                match self.ndef_recv.handle(offset, data) {
                    Ok(Some(message)) => {
                        tracing::debug!("recv NDEF: {}", DisplayBytesAsHex::from(&message));
                        match self
                            .negotiate(Some(&message))
                            .and_then(|reply| with_nlen(&reply))
                        {
                            Ok(file) => {
                                tracing::debug!("send NDEF: {}", DisplayBytesAsHex::from(&file));
                                self.ndef_file = Some(file);
                                ResponseCode::Ok.into()
                            }
                            Err(err) => {
                                tracing::error!("Handover error: {err}");
                                self.reset();
                                ResponseCode::Unspecified.into()
                            }
                        }
                    }
                    Ok(None) => ResponseCode::Ok.into(),
                    Err(code) => {
                        self.reset();
                        code.into()
                    }
                }
            }
            Apdu::Envelope { .. } | Apdu::GetResponse { .. } => {
                // Data transfer belongs to the transport once the mdoc AID is selected.
                ResponseCode::InstructionNotSupported.into()
            }
        }
    }

    pub fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        let res = self.process_apdu_inner(command);
        let res = if !self.strict || self.listen_for_ndef {
            res
        } else {
            ResponseApdu::from(ResponseCode::ConditionsNotSatisfied)
        };
        tracing::debug!("Responding: {}", DisplayBytesAsHex::from(&res.to_bytes()));
        res.into()
    }
}

/// Builds the UPDATE BINARY commands that write `message` (NLEN included) to an NDEF file
/// accepting at most `max_data` bytes per command.
pub fn ndef_write_commands(message: &[u8], max_data: usize) -> Result<Vec<Vec<u8>>, apdu::ApduError> {
    let len = u16::try_from(message.len()).map_err(|_| apdu::ApduError::DataTooLong(message.len()))?;
    if message.len() + 2 <= max_data {
        let mut data = Vec::with_capacity(message.len() + 2);
        data.extend_from_slice(&len.to_be_bytes());
        data.extend_from_slice(message);
        return Ok(vec![apdu::update_binary(0, &data)?]);
    }
    // Clear NLEN, write the body, then set NLEN.
    let chunk_size = max_data.max(1);
    let mut commands = vec![apdu::update_binary(0, &[0x00, 0x00])?];
    for (i, chunk) in message.chunks(chunk_size).enumerate() {
        commands.push(apdu::update_binary(2 + i * chunk_size, chunk)?);
    }
    commands.push(apdu::update_binary(0, &len.to_be_bytes())?);
    Ok(commands)
}
