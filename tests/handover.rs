use hex_literal::hex;
use isomdl_proximity::nfc::carrier::{BleMethod, CarrierRegistry, ConnectionMethod, NfcMethod};
use isomdl_proximity::nfc::handover::{self, HandoverError};
use isomdl_proximity::nfc::ndef::{NdefMessage, NdefRecord, RecordType, Tnf};
use uuid::Uuid;

const ENGAGEMENT: [u8; 10] = hex!("a20063312e3001820100");

fn ble_record() -> NdefRecord {
    NdefRecord::new(
        Tnf::Media,
        b"application/vnd.bluetooth.le.oob".as_slice(),
        hex!("021C01110743BC2A67BF797AB0404DA09E0E2E81E0"),
    )
    .with_id(b"0".as_slice())
}

fn engagement_record() -> NdefRecord {
    NdefRecord::new(Tnf::External, b"iso.org:18013:deviceengagement".as_slice(), ENGAGEMENT)
        .with_id(b"mdoc".as_slice())
}

fn select_record() -> NdefRecord {
    let ac = NdefMessage::new(vec![NdefRecord::well_known(
        RecordType::AlternativeCarrier,
        hex!("01013001046d646f63"),
    )])
    .encode()
    .unwrap();
    NdefRecord::well_known(RecordType::HandoverSelect, [&[0x15u8][..], ac.as_slice()].concat())
}

#[test]
fn parses_engagement_and_ble_carrier() {
    let message = NdefMessage::new(vec![select_record(), engagement_record(), ble_record()])
        .encode()
        .unwrap();
    let hs = handover::parse_handover_select(&message, &CarrierRegistry::default()).unwrap();
    assert_eq!(hs.device_engagement, ENGAGEMENT);
    assert_eq!(
        hs.connection_methods,
        vec![ConnectionMethod::Ble(BleMethod::central_client(Uuid::from_u128(
            0xe0812e0e_9ea0_4d40_b07a_79bf672abc43
        )))]
    );
}

#[test]
fn no_handover_select_record() {
    let message = NdefMessage::new(vec![engagement_record(), ble_record()])
        .encode()
        .unwrap();
    assert!(handover::parse_handover_select(&message, &CarrierRegistry::default()).is_none());
}

#[test]
fn unknown_carriers_are_skipped() {
    let other = NdefRecord::new(Tnf::Media, b"application/vnd.wfa.nan".as_slice(), vec![1, 2]);
    let message =
        NdefMessage::new(vec![select_record(), engagement_record(), other, ble_record()])
            .encode()
            .unwrap();
    let hs = handover::parse_handover_select(&message, &CarrierRegistry::default()).unwrap();
    assert_eq!(hs.connection_methods.len(), 1);

    let empty = CarrierRegistry::empty();
    let hs = handover::parse_handover_select(&message, &empty).unwrap();
    assert!(hs.connection_methods.is_empty());
}

#[test]
fn generated_select_parses_back() {
    let registry = CarrierRegistry::default();
    let methods = vec![
        ConnectionMethod::Ble(BleMethod::peripheral_server(Uuid::from_u128(7))),
        ConnectionMethod::Nfc(NfcMethod {
            command_data_field_max_length: 255,
            response_data_field_max_length: 256,
        }),
    ];
    let hs = handover::generate_handover_select(&methods, &ENGAGEMENT, &registry).unwrap();
    let parsed = handover::parse_handover_select(&hs, &registry).unwrap();
    assert_eq!(parsed.device_engagement, ENGAGEMENT);
    assert_eq!(parsed.connection_methods, methods);

    assert!(matches!(
        handover::generate_handover_select(&[], &ENGAGEMENT, &CarrierRegistry::empty()),
        Ok(_)
    ));
    assert!(matches!(
        handover::generate_handover_select(&methods, &ENGAGEMENT, &CarrierRegistry::empty()),
        Err(HandoverError::UnsupportedCarrier(_))
    ));
}
