//! NFC engagement and data transfer for ISO 18013-5 proximity presentations.

pub mod apdu;
pub mod carrier;
pub mod engagement;
pub mod engagement_reader;
pub mod handover;
pub mod ndef;
pub mod tlv;
pub mod tnep;
pub mod transport;
mod util;

pub use util::{DisplayBytesAsHex, IntoRaw, KnownOrRaw};

pub use engagement::{EngagementResult, MdocEngagementDriver, APDU_AID_MDOC, APDU_AID_NDEF_APPLICATION};
pub use engagement_reader::{
    ReaderApduProgress, ReaderEngagementDriver, ReaderEngagementResult, ReaderNegotiation,
};
pub use handover::{HandoverRequest, HandoverSelect};
