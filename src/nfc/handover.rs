//! NFC Forum Connection Handover messages carrying ISO 18013-5 engagement structures.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::nfc::carrier::{CarrierError, CarrierRegistry, ConnectionMethod, MethodKind};
use crate::nfc::ndef::{NdefError, NdefMessage, NdefRecord, RecordType, Tnf};
use crate::nfc::util::DisplayBytesAsHex;

/// Connection Handover 1.5.
pub const HANDOVER_VERSION: u8 = 0x15;

pub const DEVICE_ENGAGEMENT_TYPE: &[u8] = b"iso.org:18013:deviceengagement";
pub const DEVICE_ENGAGEMENT_ID: &[u8] = b"mdoc";
pub const READER_ENGAGEMENT_TYPE: &[u8] = b"iso.org:18013:readerengagement";
pub const READER_ENGAGEMENT_ID: &[u8] = b"mdocreader";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoverError {
    #[error("invalid handover arguments: {0}")]
    InvalidArguments(&'static str),
    #[error("no carrier encoder registered for {0}")]
    UnsupportedCarrier(MethodKind),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error(transparent)]
    Ndef(#[from] NdefError),
}

impl HandoverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandoverError::InvalidArguments(_) => ErrorKind::ProtocolViolation,
            HandoverError::UnsupportedCarrier(_) => ErrorKind::UnsupportedFeature,
            HandoverError::Carrier(e) => e.kind(),
            HandoverError::Ndef(e) => e.kind(),
        }
    }
}

/// Records collected while one handover message is being built.
#[derive(Debug, Default)]
struct HandoverState {
    alternative_carrier_records: Vec<Vec<u8>>,
    carrier_configuration_records: Vec<NdefRecord>,
}

/// Builds a Handover Select (given a DeviceEngagement) or a Handover Request (given a
/// ReaderEngagement). Exactly one of the two engagements must be present.
pub fn generate_handover_message(
    methods: &[ConnectionMethod],
    device_engagement: Option<&[u8]>,
    reader_engagement: Option<&[u8]>,
    registry: &CarrierRegistry,
) -> Result<Vec<u8>, HandoverError> {
    let (for_select, engagement_record, auxiliary_references) =
        match (device_engagement, reader_engagement) {
            (Some(de), None) => (
                true,
                NdefRecord::new(Tnf::External, DEVICE_ENGAGEMENT_TYPE, de)
                    .with_id(DEVICE_ENGAGEMENT_ID),
                vec![DEVICE_ENGAGEMENT_ID.to_vec()],
            ),
            (None, Some(re)) => (
                false,
                NdefRecord::new(Tnf::External, READER_ENGAGEMENT_TYPE, re)
                    .with_id(READER_ENGAGEMENT_ID),
                Vec::new(),
            ),
            (Some(_), Some(_)) => {
                return Err(HandoverError::InvalidArguments(
                    "both device and reader engagement given",
                ))
            }
            (None, None) => {
                return Err(HandoverError::InvalidArguments(
                    "neither device nor reader engagement given",
                ))
            }
        };

    let mut state = HandoverState::default();
    for method in methods {
        let encoder = registry
            .encoder_for(method.kind())
            .ok_or(HandoverError::UnsupportedCarrier(method.kind()))?;
        let (record, ac) = encoder.to_ndef_record(method, &auxiliary_references, for_select)?;
        state.alternative_carrier_records.push(ac);
        state.carrier_configuration_records.push(record);
    }

    let ac_message: NdefMessage = state
        .alternative_carrier_records
        .into_iter()
        .map(|ac| NdefRecord::well_known(RecordType::AlternativeCarrier, ac))
        .collect::<Vec<_>>()
        .into();
    let mut handover_payload = vec![HANDOVER_VERSION];
    handover_payload.extend(ac_message.encode()?);

    let handover_type = if for_select {
        RecordType::HandoverSelect
    } else {
        RecordType::HandoverRequest
    };
    let mut records = Vec::with_capacity(state.carrier_configuration_records.len() + 2);
    records.push(NdefRecord::well_known(handover_type, handover_payload));
    records.push(engagement_record);
    records.extend(state.carrier_configuration_records);

    tracing::info!(
        "built {} with {} carrier(s)",
        handover_type.as_str(),
        methods.len()
    );
    Ok(NdefMessage::new(records).encode()?)
}

pub fn generate_handover_select(
    methods: &[ConnectionMethod],
    device_engagement: &[u8],
    registry: &CarrierRegistry,
) -> Result<Vec<u8>, HandoverError> {
    generate_handover_message(methods, Some(device_engagement), None, registry)
}

pub fn generate_handover_request(
    methods: &[ConnectionMethod],
    reader_engagement: &[u8],
    registry: &CarrierRegistry,
) -> Result<Vec<u8>, HandoverError> {
    generate_handover_message(methods, None, Some(reader_engagement), registry)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverSelect {
    /// Encoded DeviceEngagement.
    pub device_engagement: Vec<u8>,
    pub connection_methods: Vec<ConnectionMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverRequest {
    /// Encoded ReaderEngagement, when the reader sent one.
    pub reader_engagement: Option<Vec<u8>>,
    pub connection_methods: Vec<ConnectionMethod>,
}

fn parse_message(bytes: &[u8]) -> Option<NdefMessage> {
    match NdefMessage::parse(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(
                "not a handover message ({e}): {}",
                DisplayBytesAsHex::from(bytes)
            );
            None
        }
    }
}

fn has_handover_record(message: &NdefMessage, record_type: RecordType) -> bool {
    match message.find(record_type) {
        Some(record) if record.payload.first() == Some(&HANDOVER_VERSION) => true,
        Some(record) => {
            tracing::warn!(
                "unsupported {} version: {}",
                record_type.as_str(),
                DisplayBytesAsHex::from(&record.payload)
            );
            false
        }
        None => false,
    }
}

fn engagement(message: &NdefMessage, record_type: &[u8]) -> Option<Vec<u8>> {
    message
        .iter()
        .find(|r| r.matches(Tnf::External, record_type))
        .map(|r| r.payload.clone())
}

fn connection_methods(message: &NdefMessage, registry: &CarrierRegistry) -> Vec<ConnectionMethod> {
    message
        .iter()
        .filter(|r| matches!(r.tnf, Tnf::Media | Tnf::External))
        .flat_map(|r| registry.encoders().filter_map(move |e| e.from_ndef_record(r)))
        .collect()
}

/// Parses a Handover Select. `None` means the bytes carry no usable handover: the message is
/// malformed, or has no `Hs` record or no DeviceEngagement.
pub fn parse_handover_select(bytes: &[u8], registry: &CarrierRegistry) -> Option<HandoverSelect> {
    let message = parse_message(bytes)?;
    if !has_handover_record(&message, RecordType::HandoverSelect) {
        tracing::info!("no Handover Select record");
        return None;
    }
    let Some(device_engagement) = engagement(&message, DEVICE_ENGAGEMENT_TYPE) else {
        tracing::info!("Handover Select without DeviceEngagement");
        return None;
    };
    Some(HandoverSelect {
        device_engagement,
        connection_methods: connection_methods(&message, registry),
    })
}

/// Parses a Handover Request; the ReaderEngagement is optional.
pub fn parse_handover_request(
    bytes: &[u8],
    registry: &CarrierRegistry,
) -> Option<HandoverRequest> {
    let message = parse_message(bytes)?;
    if !has_handover_record(&message, RecordType::HandoverRequest) {
        tracing::info!("no Handover Request record");
        return None;
    }
    Some(HandoverRequest {
        reader_engagement: engagement(&message, READER_ENGAGEMENT_TYPE),
        connection_methods: connection_methods(&message, registry),
    })
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use uuid::Uuid;

    use super::*;
    use crate::nfc::carrier::{BleMethod, NfcMethod};

    /// Static Handover Select read from multipaz.
    const MULTIPAZ_HS: [u8; 204] = hex!("91020f487315d10209616301013001046d646f631c1e580469736f2e6f72673a31383031333a646576696365656e676167656d656e746d646f63a20063312e30018201d818584ba401022001215820812e9efe35395a9f669a743f1b26d13fc4dfd7a5becc848fb6ea0b6ee8dc6cc722582020912755a436b0acc44defb07c0676b9274f6df7246d1627f91e8adfaa435acb5a2015016170706c69636174696f6e2f766e642e626c7565746f6f74682e6c652e6f6f6230021c01110743bc2a67bf797ab0404da09e0e2e81e0");

    /// Handover Request written by the multipaz reader.
    const MULTIPAZ_HR: [u8; 168] = hex!("910215487215910204616301013000510206616301036e6663001c1e060a69736f2e6f72673a31383031333a726561646572656e676167656d656e746d646f63726561646572a10063312e301a2015016170706c69636174696f6e2f766e642e626c7565746f6f74682e6c652e6f6f6230021c031107b66eef55ee782ea2514bb6a1c42ad5b35c110a0369736f2e6f72673a31383031333a6e66636e6663010301ffff0402010000");

    fn hs_engagement() -> Vec<u8> {
        MULTIPAZ_HS[58..146].to_vec()
    }

    #[test]
    fn parse_static_select() {
        let registry = CarrierRegistry::default();
        let hs = parse_handover_select(&MULTIPAZ_HS, &registry).unwrap();
        assert_eq!(hs.device_engagement, hs_engagement());
        assert_eq!(hs.device_engagement[..6], hex!("a20063312e30"));
        assert_eq!(
            hs.connection_methods,
            vec![ConnectionMethod::Ble(BleMethod::central_client(
                Uuid::from_u128(0xe0812e0e_9ea0_4d40_b07a_79bf672abc43)
            ))]
        );
    }

    #[test]
    fn generate_static_select() {
        let methods = [ConnectionMethod::Ble(BleMethod::central_client(
            Uuid::from_u128(0xe0812e0e_9ea0_4d40_b07a_79bf672abc43),
        ))];
        let hs = generate_handover_select(&methods, &hs_engagement(), &CarrierRegistry::default())
            .unwrap();
        assert_eq!(hs, MULTIPAZ_HS);
    }

    #[test]
    fn request_round_trip() {
        let uuid = Uuid::from_u128(0xb3d52ac4_a1b6_4b51_a22e_78ee55ef6eb6);
        let methods = [
            ConnectionMethod::Ble(BleMethod {
                supports_central_client_mode: true,
                central_client_mode_uuid: Some(uuid),
                ..BleMethod::peripheral_server(uuid)
            }),
            ConnectionMethod::Nfc(NfcMethod {
                command_data_field_max_length: 0xFFFF,
                response_data_field_max_length: 0x10000,
            }),
        ];
        let registry = CarrierRegistry::default();
        let hr = generate_handover_request(&methods, &hex!("a10063312e30"), &registry).unwrap();
        assert_eq!(hr, MULTIPAZ_HR);

        let request = parse_handover_request(&MULTIPAZ_HR, &registry).unwrap();
        assert_eq!(request.reader_engagement, Some(hex!("a10063312e30").to_vec()));
        assert_eq!(request.connection_methods, methods);
        assert_eq!(parse_handover_select(&MULTIPAZ_HR, &registry), None);
    }

    #[test]
    fn exactly_one_engagement() {
        let registry = CarrierRegistry::default();
        assert_eq!(
            generate_handover_message(&[], None, None, &registry),
            Err(HandoverError::InvalidArguments(
                "neither device nor reader engagement given"
            ))
        );
        assert!(matches!(
            generate_handover_message(&[], Some(&[0xA0][..]), Some(&[0xA0][..]), &registry),
            Err(HandoverError::InvalidArguments(_))
        ));
    }

    #[test]
    fn carriers_without_encoder_are_rejected() {
        let err = generate_handover_select(
            &[ConnectionMethod::Tcp {
                address: "192.168.1.2".into(),
                port: 4000,
            }],
            &[0xA0],
            &CarrierRegistry::default(),
        )
        .unwrap_err();
        assert_eq!(err, HandoverError::UnsupportedCarrier(MethodKind::Tcp));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn select_requires_version_and_engagement() {
        let registry = CarrierRegistry::default();
        let mut wrong_version = MULTIPAZ_HS;
        wrong_version[5] = 0x12;
        assert_eq!(parse_handover_select(&wrong_version, &registry), None);

        let no_engagement = NdefMessage::new(vec![NdefRecord::well_known(
            RecordType::HandoverSelect,
            vec![HANDOVER_VERSION],
        )])
        .encode()
        .unwrap();
        assert_eq!(parse_handover_select(&no_engagement, &registry), None);
        assert_eq!(parse_handover_select(&[0xD1, 0x02], &registry), None);
    }
}
