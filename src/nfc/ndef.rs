//! NDEF records and messages (NFC Forum NDEF 1.0).

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::bytes::{ByteCursor, ByteWriter, BytesError};
use crate::error::ErrorKind;
use crate::nfc::util::DisplayBytesAsHex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("NDEF message ends inside a record: {0}")]
    Truncated(#[from] BytesError),
    #[error("Unknown or invalid TNF: {0:x}")]
    UnknownOrInvalidTnf(u8),
    #[error("chunked records are not supported")]
    ChunkedRecord,
    #[error("{0} bytes follow the record flagged as message end")]
    TrailingBytes(usize),
    #[error("record type of {0} bytes does not fit a one-byte length")]
    TypeTooLong(usize),
    #[error("record id of {0} bytes does not fit a one-byte length")]
    IdTooLong(usize),
    #[error("payload of {0} bytes does not fit a four-byte length")]
    PayloadTooLong(usize),
}

impl NdefError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NdefError::ChunkedRecord => ErrorKind::UnsupportedFeature,
            NdefError::TypeTooLong(_) | NdefError::IdTooLong(_) | NdefError::PayloadTooLong(_) => {
                ErrorKind::ProtocolViolation
            }
            _ => ErrorKind::MalformedEncoding,
        }
    }
}

const FLAG_MB: u8 = 0b1000_0000;
const FLAG_ME: u8 = 0b0100_0000;
const FLAG_CF: u8 = 0b0010_0000;
const FLAG_SR: u8 = 0b0001_0000;
const FLAG_IL: u8 = 0b0000_1000;
const TNF_MASK: u8 = 0b0000_0111;

#[derive(Debug, Clone, Copy, strum_macros::FromRepr, PartialEq, Eq, Hash)]
#[repr(u8)]
// NDEF §3.2.6
pub enum Tnf {
    Empty = 0x00,
    WellKnown = 0x01,
    Media = 0x02,
    AbsoluteUri = 0x03,
    External = 0x04,
    Unknown = 0x05,
    Unchanged = 0x06,
}

/// Well-known record types used by connection handover and TNEP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter)]
pub enum RecordType {
    /// From Wallet
    TnepServiceParameter,
    /// From Reader
    TnepServiceSelect,
    /// From Wallet
    TnepStatus,
    /// From Reader
    HandoverRequest,
    /// From Wallet
    HandoverSelect,
    AlternativeCarrier,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::TnepServiceParameter => "Tp",
            RecordType::TnepServiceSelect => "Ts",
            RecordType::TnepStatus => "Te",
            RecordType::HandoverRequest => "Hr",
            RecordType::HandoverSelect => "Hs",
            RecordType::AlternativeCarrier => "ac",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        RecordType::iter().find(|&record_type| record_type.as_bytes() == bytes)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl std::fmt::Debug for NdefRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ret = f.debug_struct("NdefRecord");
        ret.field("tnf", &self.tnf);
        match std::str::from_utf8(&self.record_type) {
            Ok(type_str) => ret.field("record_type", &type_str),
            Err(_) => ret.field("record_type", &DisplayBytesAsHex::from(&self.record_type)),
        };
        match self.id.as_deref().map(std::str::from_utf8) {
            Some(Ok(id_str)) => ret.field("id", &Some(id_str)),
            _ => ret.field("id", &self.id.as_deref().map(DisplayBytesAsHex::from)),
        };
        ret.field("payload", &DisplayBytesAsHex::from(&self.payload))
            .finish()
    }
}

impl NdefRecord {
    pub fn new(tnf: Tnf, record_type: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tnf,
            record_type: record_type.into(),
            id: None,
            payload: payload.into(),
        }
    }

    pub fn well_known(record_type: RecordType, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Tnf::WellKnown, record_type.as_bytes(), payload)
    }

    pub fn with_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether this is a well-known record of the given type.
    pub fn is(&self, record_type: RecordType) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == record_type.as_bytes()
    }

    pub fn matches(&self, tnf: Tnf, record_type: &[u8]) -> bool {
        self.tnf == tnf && self.record_type == record_type
    }

    fn write(&self, writer: &mut ByteWriter, first: bool, last: bool) -> Result<(), NdefError> {
        let type_len =
            u8::try_from(self.record_type.len()).map_err(|_| NdefError::TypeTooLong(self.record_type.len()))?;
        let id_len = match &self.id {
            Some(id) => Some(u8::try_from(id.len()).map_err(|_| NdefError::IdTooLong(id.len()))?),
            None => None,
        };
        let short = self.payload.len() < 256;

        let mut flags = self.tnf as u8;
        if first {
            flags |= FLAG_MB;
        }
        if last {
            flags |= FLAG_ME;
        }
        if short {
            flags |= FLAG_SR;
        }
        if id_len.is_some() {
            flags |= FLAG_IL;
        }

        writer.write_u8(flags).write_u8(type_len);
        if short {
            writer.write_u8(self.payload.len() as u8);
        } else {
            let len = u32::try_from(self.payload.len())
                .map_err(|_| NdefError::PayloadTooLong(self.payload.len()))?;
            writer.write_u32_be(len);
        }
        if let Some(id_len) = id_len {
            writer.write_u8(id_len);
        }
        writer.write_slice(&self.record_type);
        if let Some(id) = &self.id {
            writer.write_slice(id);
        }
        writer.write_slice(&self.payload);
        Ok(())
    }

    fn read(cursor: &mut ByteCursor<'_>) -> Result<(u8, Self), NdefError> {
        // 7  6  5  4  3  2  1  0
        // MB ME CF SR IL TNF----
        let flags = cursor.read_u8()?;
        if flags & FLAG_CF != 0 {
            return Err(NdefError::ChunkedRecord);
        }
        let tnf = Tnf::from_repr(flags & TNF_MASK)
            .ok_or(NdefError::UnknownOrInvalidTnf(flags & TNF_MASK))?;
        let type_len = cursor.read_u8()? as usize;
        // NDEF §3.2.4
        let payload_len = if flags & FLAG_SR != 0 {
            cursor.read_u8()? as usize
        } else {
            cursor.read_u32_be()? as usize
        };
        let id_len = if flags & FLAG_IL != 0 {
            Some(cursor.read_u8()? as usize)
        } else {
            None
        };
        let record_type = cursor.read_slice(type_len)?.to_vec();
        let id = match id_len {
            Some(len) => Some(cursor.read_slice(len)?.to_vec()),
            None => None,
        };
        let payload = cursor.read_slice(payload_len)?.to_vec();
        Ok((
            flags,
            Self {
                tnf,
                record_type,
                id,
                payload,
            },
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    /// Encodes the records with MB on the first and ME on the last.
    pub fn encode(&self) -> Result<Vec<u8>, NdefError> {
        let mut writer = ByteWriter::new();
        let last = self.records.len().saturating_sub(1);
        for (i, record) in self.records.iter().enumerate() {
            record.write(&mut writer, i == 0, i == last)?;
        }
        Ok(writer.into_bytes())
    }

    /// Parses records up to the one flagged ME, or to the end of the buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, NdefError> {
        let mut cursor = ByteCursor::new(bytes);
        let mut records = Vec::new();
        while !cursor.is_empty() {
            let (flags, record) = NdefRecord::read(&mut cursor)?;
            records.push(record);
            if flags & FLAG_ME != 0 {
                break;
            }
        }
        if !cursor.is_empty() {
            return Err(NdefError::TrailingBytes(cursor.remaining()));
        }
        Ok(Self { records })
    }

    pub fn find(&self, record_type: RecordType) -> Option<&NdefRecord> {
        self.records.iter().find(|r| r.is(record_type))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NdefRecord> {
        self.records.iter()
    }
}

impl From<Vec<NdefRecord>> for NdefMessage {
    fn from(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn service_select_record_from_multipaz() {
        let bytes = hex!("d1021454731375726e3a6e66633a736e3a68616e646f766572");
        let message = NdefMessage::parse(&bytes).unwrap();
        assert_eq!(message.records.len(), 1);
        let record = &message.records[0];
        assert!(record.is(RecordType::TnepServiceSelect));
        assert_eq!(record.id, None);
        assert_eq!(record.payload[0], 0x13);
        assert_eq!(&record.payload[1..], b"urn:nfc:sn:handover");
        assert_eq!(message.encode().unwrap(), bytes);
    }

    #[test]
    fn flags_follow_record_position() {
        let message = NdefMessage::new(vec![
            NdefRecord::well_known(RecordType::HandoverSelect, vec![0x15]),
            NdefRecord::new(Tnf::External, "iso.org:18013:nfc", vec![1, 2]).with_id("nfc"),
            NdefRecord::new(Tnf::Media, "text/plain", vec![0x61; 300]),
        ]);
        let bytes = message.encode().unwrap();
        assert_eq!(bytes[0], 0x91);
        assert_eq!(&bytes[1..6], &[0x02, 0x01, b'H', b's', 0x15]);
        assert_eq!(bytes[6], 0x1c);
        let third = 6 + 4 + 17 + 3 + 2;
        assert_eq!(bytes[third], 0x42);
        assert_eq!(&bytes[third + 2..third + 6], &300u32.to_be_bytes());
        assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    #[test]
    fn single_record_sets_both_ends() {
        let message = NdefMessage::new(vec![NdefRecord::well_known(
            RecordType::TnepStatus,
            vec![0x00],
        )]);
        assert_eq!(message.encode().unwrap(), hex!("d10201546500")[..]);
        assert!(NdefMessage::default().encode().unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_messages() {
        assert_eq!(
            NdefMessage::parse(&hex!("b10201547300")),
            Err(NdefError::ChunkedRecord)
        );
        assert_eq!(
            NdefMessage::parse(&hex!("d7000000")),
            Err(NdefError::UnknownOrInvalidTnf(7))
        );
        assert!(matches!(
            NdefMessage::parse(&hex!("d10205547300")),
            Err(NdefError::Truncated(_))
        ));
        assert_eq!(
            NdefMessage::parse(&hex!("d1020154650000")),
            Err(NdefError::TrailingBytes(1))
        );
        let long_type = NdefRecord::new(Tnf::External, vec![b'x'; 256], vec![]);
        assert_eq!(
            NdefMessage::new(vec![long_type]).encode(),
            Err(NdefError::TypeTooLong(256))
        );
    }
}
