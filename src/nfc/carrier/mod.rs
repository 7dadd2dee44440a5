//! Connection methods and the carrier encoders that map them to NDEF records.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::bytes::{ByteCursor, ByteWriter};
use crate::cbor::{CborMap, DataItem};
use crate::error::ErrorKind;
use crate::nfc::ndef::NdefRecord;

pub mod ble;
pub mod nfc;

pub use ble::BleCarrierEncoder;
pub use nfc::NfcCarrierEncoder;

/// Retrieval method type in a DeviceEngagement `[type, version, options]` array.
pub const RETRIEVAL_TYPE_NFC: u64 = 1;
pub const RETRIEVAL_TYPE_BLE: u64 = 2;
pub const RETRIEVAL_TYPE_WIFI_AWARE: u64 = 3;
pub const RETRIEVAL_METHOD_VERSION: u64 = 1;

/// Carrier power state "active" in an `ac` record.
pub const CPS_ACTIVE: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarrierError {
    #[error("malformed carrier configuration record: {0}")]
    InvalidRecord(&'static str),
    #[error("malformed alternative carrier record")]
    InvalidAlternativeCarrier,
    #[error("reference of {0} bytes does not fit a one-byte length")]
    ReferenceTooLong(usize),
    #[error("too many auxiliary data references: {0}")]
    TooManyAuxiliaryReferences(usize),
    #[error("BLE method advertises neither central client nor peripheral server mode")]
    NoBleMode,
    #[error("BLE central client and peripheral server UUIDs differ")]
    BleUuidMismatch,
    #[error("BLE method carries no service UUID")]
    MissingBleUuid,
    #[error("malformed DeviceRetrievalMethod: {0}")]
    InvalidRetrievalMethod(&'static str),
    #[error("DeviceRetrievalMethod type {0} is not supported")]
    UnsupportedRetrievalMethod(u64),
    #[error("{0} has no DeviceEngagement representation")]
    NoRetrievalMethod(MethodKind),
}

impl CarrierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CarrierError::InvalidRecord(_)
            | CarrierError::InvalidAlternativeCarrier
            | CarrierError::InvalidRetrievalMethod(_) => ErrorKind::MalformedEncoding,
            CarrierError::UnsupportedRetrievalMethod(_) | CarrierError::NoRetrievalMethod(_) => {
                ErrorKind::UnsupportedFeature
            }
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum MethodKind {
    Ble,
    Nfc,
    WifiAware,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BleMethod {
    pub supports_central_client_mode: bool,
    pub supports_peripheral_server_mode: bool,
    pub central_client_mode_uuid: Option<Uuid>,
    pub peripheral_server_mode_uuid: Option<Uuid>,
    /// L2CAP PSM offered in peripheral server mode.
    pub peripheral_server_mode_psm: Option<u32>,
    pub peripheral_server_mode_mac_address: Option<[u8; 6]>,
}

impl BleMethod {
    pub fn central_client(uuid: Uuid) -> Self {
        Self {
            supports_central_client_mode: true,
            central_client_mode_uuid: Some(uuid),
            ..Default::default()
        }
    }

    pub fn peripheral_server(uuid: Uuid) -> Self {
        Self {
            supports_peripheral_server_mode: true,
            peripheral_server_mode_uuid: Some(uuid),
            ..Default::default()
        }
    }

    /// The single service UUID carried in an OOB record; both modes must agree on it.
    pub fn service_uuid(&self) -> Result<Uuid, CarrierError> {
        let central = self
            .central_client_mode_uuid
            .filter(|_| self.supports_central_client_mode);
        let peripheral = self
            .peripheral_server_mode_uuid
            .filter(|_| self.supports_peripheral_server_mode);
        match (central, peripheral) {
            (Some(c), Some(p)) if c != p => Err(CarrierError::BleUuidMismatch),
            (Some(uuid), _) | (_, Some(uuid)) => Ok(uuid),
            (None, None) => Err(CarrierError::MissingBleUuid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfcMethod {
    pub command_data_field_max_length: u16,
    pub response_data_field_max_length: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiAwareMethod {
    pub pass_phrase: Option<String>,
    pub channel_info_operating_class: Option<u64>,
    pub channel_info_channel_number: Option<u64>,
    pub band_info: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionMethod {
    Ble(BleMethod),
    Nfc(NfcMethod),
    WifiAware(WifiAwareMethod),
    Tcp { address: String, port: u16 },
    Udp { address: String, port: u16 },
}

impl ConnectionMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            ConnectionMethod::Ble(_) => MethodKind::Ble,
            ConnectionMethod::Nfc(_) => MethodKind::Nfc,
            ConnectionMethod::WifiAware(_) => MethodKind::WifiAware,
            ConnectionMethod::Tcp { .. } => MethodKind::Tcp,
            ConnectionMethod::Udp { .. } => MethodKind::Udp,
        }
    }

    /// Encodes the method as a DeviceRetrievalMethod `[type, version, options]`.
    pub fn to_data_item(&self) -> Result<DataItem, CarrierError> {
        let (retrieval_type, options) = match self {
            ConnectionMethod::Nfc(nfc) => (
                RETRIEVAL_TYPE_NFC,
                DataItem::map()
                    .put(0, nfc.command_data_field_max_length)
                    .put(1, nfc.response_data_field_max_length)
                    .end(),
            ),
            ConnectionMethod::Ble(ble) => (RETRIEVAL_TYPE_BLE, ble_options(ble)),
            ConnectionMethod::WifiAware(wifi) => {
                let mut options = DataItem::map();
                if let Some(pass_phrase) = &wifi.pass_phrase {
                    options = options.put(0, pass_phrase.as_str());
                }
                if let Some(class) = wifi.channel_info_operating_class {
                    options = options.put(1, class);
                }
                if let Some(channel) = wifi.channel_info_channel_number {
                    options = options.put(2, channel);
                }
                if let Some(band) = &wifi.band_info {
                    options = options.put(3, band.as_slice());
                }
                (RETRIEVAL_TYPE_WIFI_AWARE, options.end())
            }
            other => return Err(CarrierError::NoRetrievalMethod(other.kind())),
        };
        Ok(DataItem::array()
            .add(retrieval_type)
            .add(RETRIEVAL_METHOD_VERSION)
            .add(options)
            .end())
    }

    pub fn from_data_item(item: &DataItem) -> Result<Self, CarrierError> {
        let [retrieval_type, version, options] = item
            .as_array()
            .ok_or(CarrierError::InvalidRetrievalMethod("not an array"))?
        else {
            return Err(CarrierError::InvalidRetrievalMethod(
                "expected three elements",
            ));
        };
        let retrieval_type = retrieval_type
            .as_u64()
            .ok_or(CarrierError::InvalidRetrievalMethod("type is not an integer"))?;
        if version.as_u64() != Some(RETRIEVAL_METHOD_VERSION) {
            return Err(CarrierError::InvalidRetrievalMethod("unknown version"));
        }
        let options = options
            .as_map()
            .ok_or(CarrierError::InvalidRetrievalMethod("options are not a map"))?;

        match retrieval_type {
            RETRIEVAL_TYPE_NFC => {
                let command = options
                    .get(0)
                    .and_then(DataItem::as_u64)
                    .and_then(|v| u16::try_from(v).ok());
                let response = options
                    .get(1)
                    .and_then(DataItem::as_u64)
                    .and_then(|v| u32::try_from(v).ok());
                match (command, response) {
                    (Some(command), Some(response)) => Ok(ConnectionMethod::Nfc(NfcMethod {
                        command_data_field_max_length: command,
                        response_data_field_max_length: response,
                    })),
                    _ => Err(CarrierError::InvalidRetrievalMethod("NFC options")),
                }
            }
            RETRIEVAL_TYPE_BLE => parse_ble_options(options).map(ConnectionMethod::Ble),
            RETRIEVAL_TYPE_WIFI_AWARE => {
                let invalid = || CarrierError::InvalidRetrievalMethod("Wi-Fi Aware options");
                let text = |key: u64| match options.get(key) {
                    None => Ok(None),
                    Some(v) => v.as_text().map(|s| Some(s.to_string())).ok_or_else(invalid),
                };
                let uint = |key: u64| match options.get(key) {
                    None => Ok(None),
                    Some(v) => v.as_u64().map(Some).ok_or_else(invalid),
                };
                Ok(ConnectionMethod::WifiAware(WifiAwareMethod {
                    pass_phrase: text(0)?,
                    channel_info_operating_class: uint(1)?,
                    channel_info_channel_number: uint(2)?,
                    band_info: match options.get(3) {
                        None => None,
                        Some(v) => Some(v.as_bytes().ok_or_else(invalid)?.to_vec()),
                    },
                }))
            }
            other => Err(CarrierError::UnsupportedRetrievalMethod(other)),
        }
    }
}

fn ble_options(ble: &BleMethod) -> DataItem {
    let mut options = DataItem::map()
        .put(0, ble.supports_peripheral_server_mode)
        .put(1, ble.supports_central_client_mode);
    if let Some(uuid) = ble.peripheral_server_mode_uuid {
        options = options.put(10, uuid.as_bytes().as_slice());
    }
    if let Some(uuid) = ble.central_client_mode_uuid {
        options = options.put(11, uuid.as_bytes().as_slice());
    }
    if let Some(mac) = ble.peripheral_server_mode_mac_address {
        options = options.put(20, mac.as_slice());
    }
    options.end()
}

fn parse_ble_options(options: &CborMap) -> Result<BleMethod, CarrierError> {
    let invalid = || CarrierError::InvalidRetrievalMethod("BLE options");
    let flag = |key: u64| match options.get(key) {
        None => Ok(false),
        Some(v) => v.as_bool().ok_or_else(invalid),
    };
    let uuid = |key: u64| match options.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_bytes()
            .and_then(|b| Uuid::from_slice(b).ok())
            .map(Some)
            .ok_or_else(invalid),
    };
    let mac = match options.get(20) {
        None => None,
        Some(v) => Some(
            v.as_bytes()
                .and_then(|b| <[u8; 6]>::try_from(b).ok())
                .ok_or_else(invalid)?,
        ),
    };
    Ok(BleMethod {
        supports_peripheral_server_mode: flag(0)?,
        supports_central_client_mode: flag(1)?,
        peripheral_server_mode_uuid: uuid(10)?,
        central_client_mode_uuid: uuid(11)?,
        peripheral_server_mode_psm: None,
        peripheral_server_mode_mac_address: mac,
    })
}

/// Reads the DeviceRetrievalMethods (key 2) of a DeviceEngagement.
///
/// Methods of an unknown type are skipped; an engagement without key 2 yields no methods.
pub fn connection_methods_from_engagement(
    engagement: &DataItem,
) -> Result<Vec<ConnectionMethod>, CarrierError> {
    let map = engagement
        .as_map()
        .ok_or(CarrierError::InvalidRetrievalMethod("engagement is not a map"))?;
    let Some(methods) = map.get(2) else {
        return Ok(Vec::new());
    };
    let methods = methods
        .as_array()
        .ok_or(CarrierError::InvalidRetrievalMethod("key 2 is not an array"))?;
    let mut out = Vec::with_capacity(methods.len());
    for method in methods {
        match ConnectionMethod::from_data_item(method) {
            Ok(method) => out.push(method),
            Err(CarrierError::UnsupportedRetrievalMethod(t)) => {
                tracing::debug!("skipping DeviceRetrievalMethod of unsupported type {t}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Payload of an Alternative Carrier (`ac`) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeCarrier {
    pub power_state: u8,
    pub carrier_data_reference: Vec<u8>,
    pub auxiliary_data_references: Vec<Vec<u8>>,
}

impl AlternativeCarrier {
    pub fn active(carrier_data_reference: &[u8], auxiliary_data_references: &[Vec<u8>]) -> Self {
        Self {
            power_state: CPS_ACTIVE,
            carrier_data_reference: carrier_data_reference.to_vec(),
            auxiliary_data_references: auxiliary_data_references.to_vec(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CarrierError> {
        fn len_of(reference: &[u8]) -> Result<u8, CarrierError> {
            u8::try_from(reference.len()).map_err(|_| CarrierError::ReferenceTooLong(reference.len()))
        }
        let aux_count = u8::try_from(self.auxiliary_data_references.len()).map_err(|_| {
            CarrierError::TooManyAuxiliaryReferences(self.auxiliary_data_references.len())
        })?;

        let mut writer = ByteWriter::new();
        writer
            .write_u8(self.power_state)
            .write_u8(len_of(&self.carrier_data_reference)?)
            .write_slice(&self.carrier_data_reference)
            .write_u8(aux_count);
        for aux in &self.auxiliary_data_references {
            writer.write_u8(len_of(aux)?).write_slice(aux);
        }
        Ok(writer.into_bytes())
    }

    pub fn parse(payload: &[u8]) -> Result<Self, CarrierError> {
        let mut cursor = ByteCursor::new(payload);
        let mut read = || -> Result<Self, crate::bytes::BytesError> {
            let power_state = cursor.read_u8()?;
            let len = cursor.read_u8()? as usize;
            let carrier_data_reference = cursor.read_slice(len)?.to_vec();
            let aux_count = cursor.read_u8()?;
            let mut auxiliary_data_references = Vec::with_capacity(aux_count as usize);
            for _ in 0..aux_count {
                let len = cursor.read_u8()? as usize;
                auxiliary_data_references.push(cursor.read_slice(len)?.to_vec());
            }
            Ok(Self {
                power_state,
                carrier_data_reference,
                auxiliary_data_references,
            })
        };
        read().map_err(|_| CarrierError::InvalidAlternativeCarrier)
    }
}

/// Maps one kind of connection method to and from its NDEF carrier configuration record.
pub trait CarrierEncoder: Send + Sync {
    fn method_kind(&self) -> MethodKind;

    /// Builds the carrier configuration record and the payload of the `ac` record pointing at
    /// it. `for_select` is true when building a Handover Select, where the record describes the
    /// holder's side of the link rather than the reader's.
    fn to_ndef_record(
        &self,
        method: &ConnectionMethod,
        auxiliary_references: &[Vec<u8>],
        for_select: bool,
    ) -> Result<(NdefRecord, Vec<u8>), CarrierError>;

    /// Recognises a carrier configuration record; `None` when the record is not this carrier's.
    fn from_ndef_record(&self, record: &NdefRecord) -> Option<ConnectionMethod>;
}

/// Ordered set of carrier encoders, one per method kind.
pub struct CarrierRegistry {
    encoders: Vec<Box<dyn CarrierEncoder>>,
}

impl CarrierRegistry {
    pub fn empty() -> Self {
        Self {
            encoders: Vec::new(),
        }
    }

    /// Adds an encoder, replacing any registered for the same method kind.
    pub fn register(&mut self, encoder: Box<dyn CarrierEncoder>) {
        let kind = encoder.method_kind();
        self.encoders.retain(|e| e.method_kind() != kind);
        self.encoders.push(encoder);
    }

    pub fn encoder_for(&self, kind: MethodKind) -> Option<&dyn CarrierEncoder> {
        self.encoders
            .iter()
            .find(|e| e.method_kind() == kind)
            .map(|e| e.as_ref())
    }

    pub fn encoders(&self) -> impl Iterator<Item = &dyn CarrierEncoder> {
        self.encoders.iter().map(|e| e.as_ref())
    }

    /// Offers the record to every encoder and returns the first method recognised.
    pub fn decode(&self, record: &NdefRecord) -> Option<ConnectionMethod> {
        self.encoders().find_map(|e| e.from_ndef_record(record))
    }
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(BleCarrierEncoder));
        registry.register(Box::new(NfcCarrierEncoder));
        registry
    }
}

impl std::fmt::Debug for CarrierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.encoders.iter().map(|e| e.method_kind()))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;
    use crate::cbor;

    #[test]
    fn alternative_carrier_payload() {
        let ac = AlternativeCarrier::active(b"0", &[b"mdoc".to_vec()]);
        let payload = ac.to_payload().unwrap();
        assert_eq!(payload, hex!("01013001046d646f63"));
        assert_eq!(AlternativeCarrier::parse(&payload).unwrap(), ac);
        assert_eq!(
            AlternativeCarrier::parse(&payload[..5]),
            Err(CarrierError::InvalidAlternativeCarrier)
        );
    }

    #[test]
    fn ble_retrieval_method() {
        let uuid = Uuid::from_u128(0x45efef74_2b2c_4837_a9a3_b0e1d05a6917);
        let method = ConnectionMethod::Ble(BleMethod::central_client(uuid));
        let item = method.to_data_item().unwrap();
        assert_eq!(
            item.encode(),
            [
                hex!("830201a300f401f50b50").as_slice(),
                uuid.as_bytes().as_slice()
            ]
            .concat()
        );
        assert_eq!(ConnectionMethod::from_data_item(&item).unwrap(), method);
    }

    #[test]
    fn nfc_and_wifi_retrieval_methods() {
        let nfc = ConnectionMethod::Nfc(NfcMethod {
            command_data_field_max_length: 0xFFFF,
            response_data_field_max_length: 0x10000,
        });
        assert_eq!(
            nfc.to_data_item().unwrap().encode(),
            hex!("830101a20019ffff011a00010000")
        );

        let wifi = ConnectionMethod::WifiAware(WifiAwareMethod {
            pass_phrase: Some("secret".into()),
            channel_info_channel_number: Some(6),
            ..Default::default()
        });
        let item = wifi.to_data_item().unwrap();
        assert_eq!(ConnectionMethod::from_data_item(&item).unwrap(), wifi);

        let tcp = ConnectionMethod::Tcp {
            address: "10.0.0.1".into(),
            port: 8080,
        };
        assert_eq!(
            tcp.to_data_item(),
            Err(CarrierError::NoRetrievalMethod(MethodKind::Tcp))
        );
    }

    #[test]
    fn engagement_methods() {
        let uuid = Uuid::new_v4();
        let engagement = DataItem::map()
            .put(0, "1.0")
            .put_array(2, |a| {
                a.add(
                    ConnectionMethod::Ble(BleMethod::peripheral_server(uuid))
                        .to_data_item()
                        .unwrap(),
                )
                .add_array(|a| a.add(9).add(1).add(DataItem::map().end()))
            })
            .end();
        let bytes = engagement.encode();
        let decoded = cbor::decode(&bytes).unwrap();
        let methods = connection_methods_from_engagement(&decoded).unwrap();
        assert_eq!(
            methods,
            vec![ConnectionMethod::Ble(BleMethod::peripheral_server(uuid))]
        );

        let bare = DataItem::map().put(0, "1.0").end();
        assert!(connection_methods_from_engagement(&bare).unwrap().is_empty());
    }

    #[test]
    fn malformed_retrieval_methods() {
        let short = DataItem::array().add(2).add(1).end();
        assert!(matches!(
            ConnectionMethod::from_data_item(&short),
            Err(CarrierError::InvalidRetrievalMethod(_))
        ));
        let bad_uuid = DataItem::array()
            .add(2)
            .add(1)
            .add_map(|m| m.put(1, true).put(11, [1u8, 2, 3].as_slice()))
            .end();
        assert!(ConnectionMethod::from_data_item(&bad_uuid).is_err());
    }

    #[test]
    fn registry_lookup() {
        let registry = CarrierRegistry::default();
        assert!(registry.encoder_for(MethodKind::Ble).is_some());
        assert!(registry.encoder_for(MethodKind::Nfc).is_some());
        assert!(registry.encoder_for(MethodKind::WifiAware).is_none());
        assert_eq!(format!("{registry:?}"), "[Ble, Nfc]");
    }
}
