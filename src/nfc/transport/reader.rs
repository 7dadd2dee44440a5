//! Reader side of NFC data transfer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::{Transceiver, TransportError, TransportListener};
use crate::config::TransportConfig;
use crate::nfc::apdu::{self, ResponseApdu};
use crate::nfc::engagement::APDU_AID_MDOC;
use crate::nfc::tlv;
use crate::nfc::util::DisplayBytesAsHex;

/// Blocking reader transport over a [Transceiver].
#[derive(Debug)]
pub struct ReaderNfcTransport<T: Transceiver> {
    transceiver: T,
    config: TransportConfig,
    connected: bool,
}

impl<T: Transceiver> ReaderNfcTransport<T> {
    pub fn new(transceiver: T, config: TransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            transceiver,
            config,
            connected: false,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn transceive(&mut self, command: &[u8]) -> Result<ResponseApdu, TransportError> {
        tracing::debug!("send APDU: {}", DisplayBytesAsHex::from(command));
        let response = self.transceiver.transceive(command)?;
        tracing::debug!("recv APDU: {}", DisplayBytesAsHex::from(&response));
        Ok(ResponseApdu::parse(&response)?)
    }

    /// Selects the mdoc application.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        let response = self.transceive(&apdu::select_aid(APDU_AID_MDOC)?)?;
        if !response.is_ok() {
            return Err(TransportError::UnexpectedStatus(response.status_word()));
        }
        tracing::info!("mdoc application selected");
        self.connected = true;
        Ok(())
    }

    /// Sends `message` and returns the holder's answer.
    pub fn exchange(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let timeout = self.config.exchange_timeout();
        let deadline = Instant::now() + timeout;
        let max_transceive_length = self.config.max_transceive_length;

        let frame = tlv::encapsulate(message)?;
        let chunks: Vec<&[u8]> = frame.chunks(self.config.chunk_size()).collect();
        let Some((last, chained)) = chunks.split_last() else {
            return Err(TransportError::EmptyMessage);
        };
        for chunk in chained {
            let response = self.transceive(&apdu::envelope(true, chunk, 0)?)?;
            if !response.is_ok() {
                return Err(TransportError::UnexpectedStatus(response.status_word()));
            }
            if Instant::now() > deadline {
                return Err(TransportError::Timeout(timeout));
            }
        }

        let mut response = self.transceive(&apdu::envelope(false, last, max_transceive_length)?)?;
        let mut received = Vec::new();
        let mut iterations = 0;
        loop {
            received.extend_from_slice(&response.payload);
            if response.is_ok() {
                break;
            }
            let Some(remaining) = response.remaining() else {
                return Err(TransportError::UnexpectedStatus(response.status_word()));
            };
            iterations += 1;
            if iterations > self.config.max_get_response_iterations {
                return Err(TransportError::TooManyGetResponses(iterations - 1));
            }
            if Instant::now() > deadline {
                return Err(TransportError::Timeout(timeout));
            }
            let le = match remaining {
                0 => max_transceive_length,
                n => n as usize,
            };
            response = self.transceive(&apdu::get_response(le)?)?;
        }
        tracing::debug!(
            "response of {} bytes after {iterations} GET RESPONSE",
            received.len()
        );
        Ok(tlv::extract(&received)?.to_vec())
    }
}

/// A [ReaderNfcTransport] driven by its own thread. Messages are sent in the order queued;
/// answers and failures go to the [TransportListener].
#[derive(Debug)]
pub struct ReaderNfcSession {
    outbound: Sender<Vec<u8>>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReaderNfcSession {
    /// Spawns the worker, which connects first and reports the outcome through `listener`.
    pub fn start<T: Transceiver + 'static>(
        mut transport: ReaderNfcTransport<T>,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Self, TransportError> {
        let (outbound, rx) = channel::unbounded::<Vec<u8>>();
        let active = Arc::new(AtomicBool::new(true));
        let poll_interval = transport.config().writer_poll_interval();

        let running = Arc::clone(&active);
        let worker = thread::Builder::new()
            .name("reader-nfc-session".to_string())
            .spawn(move || {
                if let Err(err) = transport.connect() {
                    tracing::error!("connect failed: {err}");
                    running.store(false, Ordering::Release);
                    listener.on_error(err);
                    return;
                }
                listener.on_connected();
                while running.load(Ordering::Acquire) {
                    let message = match rx.recv_timeout(poll_interval) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    if message.is_empty() {
                        break;
                    }
                    match transport.exchange(&message) {
                        Ok(response) => listener.on_message_received(response),
                        Err(err) => {
                            tracing::error!("exchange failed: {err}");
                            running.store(false, Ordering::Release);
                            listener.on_error(err);
                            return;
                        }
                    }
                }
                listener.on_disconnected();
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            outbound,
            active,
            worker: Some(worker),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

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

    /// Stops the worker after the exchange in progress, if any.
    pub fn close(&mut self) {
        self.active.store(false, Ordering::Release);
        let _ = self.outbound.send(Vec::new());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("reader worker panicked");
            }
        }
    }
}

impl Drop for ReaderNfcSession {
    fn drop(&mut self) {
        self.close();
    }
}
