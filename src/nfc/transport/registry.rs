//! Routes APDUs from the NFC stack to the one listener session that owns the link.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MdocNfcTransport, TransportError};

/// Caller-chosen key of a listener session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle(pub Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Sessions {
    transports: HashMap<SessionHandle, Arc<MdocNfcTransport>>,
    active: Option<SessionHandle>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and makes it the active one. The previously active session loses the link.
    pub fn register(
        &self,
        handle: SessionHandle,
        transport: Arc<MdocNfcTransport>,
    ) -> Result<(), TransportError> {
        let previous = {
            let mut sessions = self.sessions.lock();
            if sessions.transports.contains_key(&handle) {
                return Err(TransportError::DuplicateSession(handle));
            }
            sessions.transports.insert(handle, transport);
            sessions
                .active
                .replace(handle)
                .and_then(|previous| sessions.transports.get(&previous).cloned())
        };
        if let Some(previous) = previous {
            previous.on_deactivated();
        }
        tracing::debug!("session {handle} registered and active");
        Ok(())
    }

    /// Makes an already registered session the active one.
    pub fn activate(&self, handle: SessionHandle) -> Result<(), TransportError> {
        let previous = {
            let mut sessions = self.sessions.lock();
            if !sessions.transports.contains_key(&handle) {
                return Err(TransportError::UnknownSession(handle));
            }
            match sessions.active.replace(handle) {
                Some(previous) if previous != handle => sessions.transports.get(&previous).cloned(),
                _ => None,
            }
        };
        if let Some(previous) = previous {
            previous.on_deactivated();
        }
        Ok(())
    }

    pub fn active(&self) -> Option<(SessionHandle, Arc<MdocNfcTransport>)> {
        let sessions = self.sessions.lock();
        let handle = sessions.active?;
        sessions
            .transports
            .get(&handle)
            .map(|transport| (handle, Arc::clone(transport)))
    }

    pub fn get(&self, handle: SessionHandle) -> Option<Arc<MdocNfcTransport>> {
        self.sessions.lock().transports.get(&handle).cloned()
    }

    /// Hands a command APDU to the active session.
    pub fn route_apdu(&self, command: &[u8]) -> Result<(), TransportError> {
        let (_, transport) = self.active().ok_or(TransportError::NoActiveSession)?;
        transport.process_apdu(command);
        Ok(())
    }

    /// The NFC field went away.
    pub fn deactivate_link(&self) {
        match self.active() {
            Some((_, transport)) => transport.on_deactivated(),
            None => tracing::warn!("link deactivated without an active session"),
        }
    }

    /// Removes and closes a session.
    pub fn remove(&self, handle: SessionHandle) -> Result<Arc<MdocNfcTransport>, TransportError> {
        let transport = {
            let mut sessions = self.sessions.lock();
            if sessions.active == Some(handle) {
                sessions.active = None;
            }
            sessions.transports.remove(&handle)
        }
        .ok_or(TransportError::UnknownSession(handle))?;
        transport.close();
        Ok(transport)
    }
}
