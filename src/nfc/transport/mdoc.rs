//! Holder (listener) side of NFC data transfer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{ApduResponder, TransportError, TransportListener};
use crate::config::TransportConfig;
use crate::nfc::apdu::{Apdu, ResponseApdu, ResponseCode, CLA_CHAINING, CLA_LAST};
use crate::nfc::engagement::APDU_AID_MDOC;
use crate::nfc::tlv;
use crate::nfc::util::DisplayBytesAsHex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ListenerState {
    /// Waiting for the mdoc AID.
    Idle,
    AidSelected,
    /// Collecting chained ENVELOPE chunks.
    Receiving,
    /// A full message went up; the final ENVELOPE awaits its response.
    PendingResponse,
    /// Serving response chunks through GET RESPONSE.
    Responding,
    Disconnected,
}

impl ListenerState {
    fn is_selected(self) -> bool {
        !matches!(self, ListenerState::Idle | ListenerState::Disconnected)
    }
}

/// Things the owner of a [ListenerSession] must pass upward, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Connected,
    Disconnected,
    MessageReceived(Vec<u8>),
    Error(TransportError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStep {
    /// `None` when the response is deferred until [ListenerSession::complete_pending_response].
    pub response: Option<Vec<u8>>,
    pub events: Vec<ListenerEvent>,
}

impl ListenerStep {
    fn respond(response: impl Into<ResponseApdu>) -> Self {
        let response: ResponseApdu = response.into();
        Self {
            response: Some(response.into()),
            events: Vec::new(),
        }
    }

    fn with_event(mut self, event: ListenerEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Sans-IO listener state machine.
#[derive(Debug)]
pub struct ListenerSession {
    state: ListenerState,
    incoming_message: Vec<u8>,
    chunks_received: usize,
    listener_le: usize,
    default_listener_le: usize,
    pending_response_chunks: VecDeque<Vec<u8>>,
    remaining_bytes_available: usize,
}

impl ListenerSession {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            state: ListenerState::Idle,
            incoming_message: Vec::new(),
            chunks_received: 0,
            listener_le: config.default_listener_le,
            default_listener_le: config.default_listener_le,
            pending_response_chunks: VecDeque::new(),
            remaining_bytes_available: 0,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    fn reset_buffers(&mut self) {
        self.incoming_message.clear();
        self.chunks_received = 0;
        self.pending_response_chunks.clear();
        self.remaining_bytes_available = 0;
    }

    pub fn process_apdu(&mut self, command: &[u8]) -> ListenerStep {
        let apdu = match Apdu::parse(command) {
            Ok(apdu) => apdu,
            Err(response) => return ListenerStep::respond(response),
        };

        match apdu {
            Apdu::SelectAid { aid, .. } if aid == APDU_AID_MDOC => {
                let was_selected = self.state.is_selected();
                self.reset_buffers();
                self.state = ListenerState::AidSelected;
                let step = ListenerStep::respond(ResponseCode::Ok);
                if was_selected {
                    tracing::warn!("mdoc AID selected again, dropping partial transfer");
                    step
                } else {
                    tracing::info!("mdoc AID selected");
                    step.with_event(ListenerEvent::Connected)
                }
            }
            Apdu::SelectAid { aid, .. } => {
                tracing::debug!("unknown AID {}", DisplayBytesAsHex::from(aid));
                ListenerStep::respond(ResponseCode::FileOrApplicationNotFound)
            }
            _ if !self.state.is_selected() => {
                ListenerStep::respond(ResponseCode::FileOrApplicationNotFound)
            }
            Apdu::Envelope { cla, data, le } => self.envelope(cla, data, le),
            Apdu::GetResponse { .. } => self.get_response(),
            _ => ListenerStep::respond(ResponseCode::InstructionNotSupported),
        }
    }

    fn envelope(&mut self, cla: u8, data: &[u8], le: usize) -> ListenerStep {
        if cla != CLA_CHAINING && cla != CLA_LAST {
            return ListenerStep::respond(ResponseCode::IncorrectP1OrP2);
        }
        if self.state == ListenerState::PendingResponse {
            tracing::error!("ENVELOPE while the previous response is still pending");
            return ListenerStep::respond(ResponseCode::ConditionsNotSatisfied);
        }
        if self.state == ListenerState::Responding {
            tracing::warn!(
                "new message with {} response bytes unread",
                self.remaining_bytes_available
            );
            self.pending_response_chunks.clear();
            self.remaining_bytes_available = 0;
        }

        if cla == CLA_CHAINING {
            if le != 0 {
                self.incoming_message.clear();
                self.chunks_received = 0;
                self.state = ListenerState::AidSelected;
                return ListenerStep::respond(ResponseCode::IncorrectLength);
            }
            self.incoming_message.extend_from_slice(data);
            self.chunks_received += 1;
            self.state = ListenerState::Receiving;
            return ListenerStep::respond(ResponseCode::Ok);
        }

        self.incoming_message.extend_from_slice(data);
        self.chunks_received += 1;
        self.listener_le = if le == 0 { self.default_listener_le } else { le };
        tracing::debug!(
            "message complete after {} chunk(s), {} bytes, Le {}",
            self.chunks_received,
            self.incoming_message.len(),
            self.listener_le
        );

        let extracted = tlv::extract(&self.incoming_message).map(<[u8]>::to_vec);
        self.incoming_message.clear();
        self.chunks_received = 0;
        match extracted {
            Ok(message) => {
                self.state = ListenerState::PendingResponse;
                ListenerStep {
                    response: None,
                    events: vec![ListenerEvent::MessageReceived(message)],
                }
            }
            Err(err) => {
                tracing::error!("message is not a DO'53 frame: {err}");
                self.state = ListenerState::AidSelected;
                ListenerStep::respond(ResponseCode::Unspecified)
                    .with_event(ListenerEvent::Error(err.into()))
            }
        }
    }

    fn get_response(&mut self) -> ListenerStep {
        let Some(chunk) = self.pending_response_chunks.pop_front() else {
            tracing::error!("GET RESPONSE with nothing to send");
            self.reset_buffers();
            self.state = ListenerState::Disconnected;
            return ListenerStep::respond(ResponseCode::ConditionsNotSatisfied)
                .with_event(ListenerEvent::Error(TransportError::NoPendingResponse));
        };
        self.remaining_bytes_available -= chunk.len();
        ListenerStep::respond(self.chunk_response(chunk))
    }

    fn chunk_response(&mut self, chunk: Vec<u8>) -> ResponseApdu {
        if self.pending_response_chunks.is_empty() {
            self.state = ListenerState::AidSelected;
            ResponseApdu::new(chunk, ResponseCode::Ok)
        } else {
            self.state = ListenerState::Responding;
            ResponseApdu::bytes_remaining(chunk, self.remaining_bytes_available)
        }
    }

    /// Answers the deferred final ENVELOPE with the first chunk of `message`; the rest is left
    /// for GET RESPONSE.
    pub fn complete_pending_response(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.state != ListenerState::PendingResponse {
            return Err(TransportError::NoPendingResponse);
        }
        let frame = tlv::encapsulate(message)?;
        self.pending_response_chunks = frame
            .chunks(self.listener_le)
            .map(<[u8]>::to_vec)
            .collect();
        self.remaining_bytes_available = frame.len();
        let first = self
            .pending_response_chunks
            .pop_front()
            .ok_or(TransportError::NoPendingResponse)?;
        self.remaining_bytes_available -= first.len();
        Ok(self.chunk_response(first).into())
    }

    /// The NFC field went away.
    pub fn deactivate(&mut self) -> ListenerStep {
        let was_selected = self.state.is_selected();
        self.reset_buffers();
        self.state = ListenerState::Disconnected;
        if was_selected {
            ListenerStep::default().with_event(ListenerEvent::Disconnected)
        } else {
            tracing::warn!("deactivated before the mdoc AID was selected");
            ListenerStep::default()
        }
    }
}

struct Shared {
    session: Mutex<ListenerSession>,
    listener: Arc<dyn TransportListener>,
    responder: Arc<dyn ApduResponder>,
    active: AtomicBool,
}

impl Shared {
    fn dispatch(&self, step: ListenerStep) {
        if let Some(response) = step.response {
            tracing::debug!("Responding: {}", DisplayBytesAsHex::from(&response));
            self.responder.send_response(response);
        }
        for event in step.events {
            match event {
                ListenerEvent::Connected => self.listener.on_connected(),
                ListenerEvent::Disconnected => self.listener.on_disconnected(),
                ListenerEvent::MessageReceived(message) => {
                    self.listener.on_message_received(message)
                }
                ListenerEvent::Error(err) => self.listener.on_error(err),
            }
        }
    }
}

/// Listener transport wired to the NFC stack: APDUs come in through [MdocNfcTransport::process_apdu],
/// responses leave through the [ApduResponder], messages go up to the [TransportListener].
pub struct MdocNfcTransport {
    shared: Arc<Shared>,
    outbound: Sender<Vec<u8>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MdocNfcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdocNfcTransport")
            .field("state", &self.state())
            .field("active", &self.shared.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl MdocNfcTransport {
    pub fn new(
        config: TransportConfig,
        listener: Arc<dyn TransportListener>,
        responder: Arc<dyn ApduResponder>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            session: Mutex::new(ListenerSession::new(&config)),
            listener,
            responder,
            active: AtomicBool::new(true),
        });
        let (outbound, rx) = channel::unbounded::<Vec<u8>>();
        let poll_interval = config.writer_poll_interval();

        let worker = Arc::clone(&shared);
        let writer = thread::Builder::new()
            .name("mdoc-nfc-writer".to_string())
            .spawn(move || {
                while worker.active.load(Ordering::Acquire) {
                    let message = match rx.recv_timeout(poll_interval) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    if message.is_empty() {
                        break;
                    }
                    let result = worker.session.lock().complete_pending_response(&message);
                    match result {
                        Ok(response) => worker.dispatch(ListenerStep {
                            response: Some(response),
                            events: Vec::new(),
                        }),
                        Err(err) => {
                            tracing::error!("cannot send message: {err}");
                            worker.listener.on_error(err);
                        }
                    }
                }
                tracing::debug!("writer stopped");
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            shared,
            outbound,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn state(&self) -> ListenerState {
        self.shared.session.lock().state()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Handles one command APDU from the NFC stack.
    pub fn process_apdu(&self, command: &[u8]) {
        let step = self.shared.session.lock().process_apdu(command);
        self.shared.dispatch(step);
    }

    /// The NFC field was lost or the stack deactivated the service.
    pub fn on_deactivated(&self) {
        let step = self.shared.session.lock().deactivate();
        self.shared.dispatch(step);
    }

    /// Queues `message` as the response to the last received message.
    pub fn send_message(&self, message: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::Closed);
        }
        if message.is_empty() {
            return Err(TransportError::EmptyMessage);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    /// Stops the writer; queued messages that were not sent yet are dropped.
    pub fn close(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }
        // Wakes the writer if it is blocked on the channel.
        let _ = self.outbound.send(Vec::new());
        if let Some(writer) = self.writer.lock().take() {
            if writer.join().is_err() {
                tracing::error!("writer thread panicked");
            }
        }
    }
}

impl Drop for MdocNfcTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;
    use crate::nfc::apdu::{self, get_response};

    const SELECT_MDOC: [u8; 13] = hex!("00a4040007a000000248040000");

    fn selected() -> ListenerSession {
        let mut session = ListenerSession::new(&TransportConfig::default());
        let step = session.process_apdu(&SELECT_MDOC);
        assert_eq!(step.response.as_deref(), Some(&hex!("9000")[..]));
        assert_eq!(step.events, vec![ListenerEvent::Connected]);
        session
    }

    fn status(step: &ListenerStep) -> [u8; 2] {
        let response = step.response.as_ref().unwrap();
        [response[response.len() - 2], response[response.len() - 1]]
    }

    #[test]
    fn commands_before_selection_are_not_found() {
        let mut session = ListenerSession::new(&TransportConfig::default());
        let step = session.process_apdu(&apdu::envelope(false, &[0x53, 0x00], 0).unwrap());
        assert_eq!(status(&step), hex!("6a82"));
        let step = session.process_apdu(&apdu::select_aid(&hex!("a0000002480401")).unwrap());
        assert_eq!(status(&step), hex!("6a82"));
        assert_eq!(session.state(), ListenerState::Idle);
    }

    #[test]
    fn only_envelope_and_get_response_after_selection() {
        let mut session = selected();
        let step = session.process_apdu(&apdu::read_binary(0, 2).unwrap());
        assert_eq!(status(&step), hex!("6d00"));
        let step = session.process_apdu(&hex!("20c3000002530000"));
        assert_eq!(status(&step), hex!("6b00"));
    }

    #[test]
    fn chained_envelope_with_le_resets() {
        let mut session = selected();
        session.process_apdu(&apdu::envelope(true, &[0x53, 0x02], 0).unwrap());
        assert_eq!(session.state(), ListenerState::Receiving);
        let step = session.process_apdu(&apdu::envelope(true, &[0x01], 16).unwrap());
        assert_eq!(status(&step), hex!("6700"));
        assert_eq!(session.chunks_received(), 0);
        assert_eq!(session.state(), ListenerState::AidSelected);
    }

    #[test]
    fn deferred_response_then_get_response() {
        let mut session = selected();
        let step = session.process_apdu(&apdu::envelope(false, &hex!("5303010203"), 4).unwrap());
        assert_eq!(step.response, None);
        assert_eq!(
            step.events,
            vec![ListenerEvent::MessageReceived(vec![1, 2, 3])]
        );
        assert_eq!(session.state(), ListenerState::PendingResponse);

        let first = session.complete_pending_response(&[9, 8, 7, 6]).unwrap();
        assert_eq!(first, hex!("530409086102"));
        assert_eq!(session.state(), ListenerState::Responding);
        let step = session.process_apdu(&get_response(4).unwrap());
        assert_eq!(step.response.as_deref(), Some(&hex!("07069000")[..]));
        assert_eq!(session.state(), ListenerState::AidSelected);

        assert_eq!(
            session.complete_pending_response(&[1]),
            Err(TransportError::NoPendingResponse)
        );
    }

    #[test]
    fn get_response_without_pending_data_kills_the_session() {
        let mut session = selected();
        let step = session.process_apdu(&get_response(256).unwrap());
        assert_eq!(status(&step), hex!("6985"));
        assert_eq!(
            step.events,
            vec![ListenerEvent::Error(TransportError::NoPendingResponse)]
        );
        assert_eq!(session.state(), ListenerState::Disconnected);
        let step = session.process_apdu(&get_response(256).unwrap());
        assert_eq!(status(&step), hex!("6a82"));
    }

    #[test]
    fn malformed_frame_is_reported() {
        let mut session = selected();
        let step = session.process_apdu(&apdu::envelope(false, &hex!("540100"), 0).unwrap());
        assert_eq!(status(&step), hex!("6f00"));
        assert!(matches!(
            step.events.as_slice(),
            [ListenerEvent::Error(TransportError::Tlv(_))]
        ));
        assert_eq!(session.state(), ListenerState::AidSelected);
    }

    #[test]
    fn deactivation_signals_only_after_selection() {
        let mut session = ListenerSession::new(&TransportConfig::default());
        assert!(session.deactivate().events.is_empty());
        let mut session = selected();
        assert_eq!(session.deactivate().events, vec![ListenerEvent::Disconnected]);
        assert_eq!(session.state(), ListenerState::Disconnected);
    }
}
