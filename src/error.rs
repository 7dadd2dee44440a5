use crate::bytes::BytesError;
use crate::cbor::CborError;
use crate::config::ConfigError;
use crate::nfc::apdu::ApduError;
use crate::nfc::carrier::CarrierError;
use crate::nfc::engagement::EngagementError;
use crate::nfc::engagement_reader::ReaderEngagementError;
use crate::nfc::handover::HandoverError;
use crate::nfc::ndef::NdefError;
use crate::nfc::tlv::TlvError;
use crate::nfc::tnep::TnepError;
use crate::nfc::transport::TransportError;

/// Broad classification shared by every error in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ErrorKind {
    /// Bytes that do not follow the wire format.
    MalformedEncoding,
    /// Well-formed input that breaks the protocol sequence or constraints.
    ProtocolViolation,
    /// The link or the peer failed to deliver.
    TransportFailure,
    /// Valid input asking for something this crate does not implement.
    UnsupportedFeature,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bytes(#[from] BytesError),
    #[error(transparent)]
    Cbor(#[from] CborError),
    #[error(transparent)]
    Apdu(#[from] ApduError),
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Ndef(#[from] NdefError),
    #[error(transparent)]
    Tnep(#[from] TnepError),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error(transparent)]
    Handover(#[from] HandoverError),
    #[error(transparent)]
    Engagement(#[from] EngagementError),
    #[error(transparent)]
    ReaderEngagement(#[from] ReaderEngagementError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Bytes(_) => ErrorKind::MalformedEncoding,
            Error::Cbor(e) => e.kind(),
            Error::Apdu(e) => e.kind(),
            Error::Tlv(e) => e.kind(),
            Error::Ndef(e) => e.kind(),
            Error::Tnep(e) => e.kind(),
            Error::Carrier(e) => e.kind(),
            Error::Handover(e) => e.kind(),
            Error::Engagement(e) => e.kind(),
            Error::ReaderEngagement(e) => e.kind(),
            Error::Transport(e) => e.kind(),
            Error::Config(e) => e.kind(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::nfc::tlv;

    #[test]
    fn kinds_flow_through_the_crate_error() {
        let err: Error = crate::cbor::decode(&[0xff]).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::MalformedEncoding);

        let err: Error = tlv::extract(&[0x54, 0x00]).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::MalformedEncoding);
        assert_eq!(ErrorKind::ProtocolViolation.to_string(), "ProtocolViolation");
    }
}
