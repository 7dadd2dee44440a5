//! NFC data transfer carrier record (`iso.org:18013:nfc`).

use super::{AlternativeCarrier, CarrierEncoder, CarrierError, ConnectionMethod, MethodKind, NfcMethod};
use crate::bytes::{ByteCursor, ByteWriter};
use crate::nfc::ndef::{NdefRecord, Tnf};

pub const NFC_CARRIER_TYPE: &[u8] = b"iso.org:18013:nfc";
pub const NFC_RECORD_ID: &[u8] = b"nfc";

const NFC_CARRIER_VERSION: u8 = 0x01;
const MAX_COMMAND_DATA_FIELD: u8 = 0x01;
const MAX_RESPONSE_DATA_FIELD: u8 = 0x02;

#[derive(Debug, Clone, Copy, Default)]
pub struct NfcCarrierEncoder;

impl CarrierEncoder for NfcCarrierEncoder {
    fn method_kind(&self) -> MethodKind {
        MethodKind::Nfc
    }

    fn to_ndef_record(
        &self,
        method: &ConnectionMethod,
        auxiliary_references: &[Vec<u8>],
        _for_select: bool,
    ) -> Result<(NdefRecord, Vec<u8>), CarrierError> {
        let ConnectionMethod::Nfc(nfc) = method else {
            return Err(CarrierError::InvalidRecord("not an NFC connection method"));
        };
        if nfc.response_data_field_max_length > 0xFF_FFFF {
            return Err(CarrierError::InvalidRecord(
                "maximum response data field length exceeds three bytes",
            ));
        }
        // version, [len, type, value] for the command then the response limit
        let mut payload = ByteWriter::with_capacity(10);
        payload
            .write_u8(NFC_CARRIER_VERSION)
            .write_u8(0x03)
            .write_u8(MAX_COMMAND_DATA_FIELD)
            .write_u16_be(nfc.command_data_field_max_length)
            .write_u8(0x04)
            .write_u8(MAX_RESPONSE_DATA_FIELD)
            .write_u24_be(nfc.response_data_field_max_length);

        let record = NdefRecord::new(Tnf::External, NFC_CARRIER_TYPE, payload.into_bytes())
            .with_id(NFC_RECORD_ID);
        let ac = AlternativeCarrier::active(NFC_RECORD_ID, auxiliary_references).to_payload()?;
        Ok((record, ac))
    }

    fn from_ndef_record(&self, record: &NdefRecord) -> Option<ConnectionMethod> {
        if !record.matches(Tnf::External, NFC_CARRIER_TYPE) {
            return None;
        }
        let parsed = parse_payload(&record.payload);
        if parsed.is_none() {
            tracing::warn!("malformed NFC carrier record: {record:?}");
        }
        parsed.map(ConnectionMethod::Nfc)
    }
}

fn parse_payload(payload: &[u8]) -> Option<NfcMethod> {
    let mut cursor = ByteCursor::new(payload);
    let version = cursor.read_u8().ok()?;
    let header = cursor.read_array::<2>().ok()?;
    let command = cursor.read_u16_be().ok()?;
    let response_header = cursor.read_array::<2>().ok()?;
    let response = cursor.read_u24_be().ok()?;
    let well_formed = version == NFC_CARRIER_VERSION
        && header == [0x03, MAX_COMMAND_DATA_FIELD]
        && response_header == [0x04, MAX_RESPONSE_DATA_FIELD]
        && cursor.is_empty();
    well_formed.then_some(NfcMethod {
        command_data_field_max_length: command,
        response_data_field_max_length: response,
    })
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn nfc_carrier_record() {
        let method = ConnectionMethod::Nfc(NfcMethod {
            command_data_field_max_length: 0xFFFF,
            response_data_field_max_length: 0x10000,
        });
        let (record, ac) = NfcCarrierEncoder
            .to_ndef_record(&method, &[b"mdoc".to_vec()], true)
            .unwrap();
        assert_eq!(record.payload, hex!("010301ffff0402010000"));
        assert_eq!(record.id.as_deref(), Some(b"nfc".as_slice()));
        assert_eq!(ac, hex!("01036e666301046d646f63"));
        assert_eq!(NfcCarrierEncoder.from_ndef_record(&record), Some(method));
    }

    #[test]
    fn rejects_malformed_payloads() {
        let truncated = NdefRecord::new(Tnf::External, NFC_CARRIER_TYPE, hex!("010301ffff04020100"));
        assert_eq!(NfcCarrierEncoder.from_ndef_record(&truncated), None);
        let wrong_version =
            NdefRecord::new(Tnf::External, NFC_CARRIER_TYPE, hex!("020301ffff0402010000"));
        assert_eq!(NfcCarrierEncoder.from_ndef_record(&wrong_version), None);
        let other = NdefRecord::new(Tnf::External, b"iso.org:18013:other".as_slice(), vec![]);
        assert_eq!(NfcCarrierEncoder.from_ndef_record(&other), None);
    }
}
