//! ISO/IEC 18013-5 proximity plumbing: the CBOR data model every mdoc structure is built on, and
//! the NFC handover and APDU transport used to engage and exchange session messages.
pub mod bytes;
pub mod cbor;
pub mod config;
pub mod error;
pub mod nfc;

pub use config::TransportConfig;
pub use error::{Error, ErrorKind, Result};
