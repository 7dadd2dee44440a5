//! Bluetooth LE carrier configuration records (`application/vnd.bluetooth.le.oob`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AlternativeCarrier, BleMethod, CarrierEncoder, CarrierError, ConnectionMethod, MethodKind};
use crate::bytes::ByteWriter;
use crate::nfc::ndef::{NdefRecord, Tnf};
use crate::nfc::util::{DisplayBytesAsHex, KnownOrRaw};

pub const BLE_OOB_MIME_TYPE: &[u8] = b"application/vnd.bluetooth.le.oob";
pub const OOB_RECORD_ID: &[u8] = b"0";

pub mod ad_packet {
    use crate::nfc::util::impl_partial_enum;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter)]
    #[repr(u8)]
    pub enum KnownType {
        LeRole = 0x1c,
        CompleteList128BitServiceUuids = 0x07,
        MacAddress = 0x1b,
        PeripheralServerModePsm = 0x77,
    }

    impl_partial_enum!(KnownType, u8);
}

use ad_packet::KnownType as AdType;

#[repr(u8)]
#[rustfmt::skip]
#[derive(strum_macros::FromRepr, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// The LE Role data type defines the LE role capabilities of the device.
pub enum LeRole {
    /// Only Peripheral Role supported
    PeripheralOnly = 0x00,
    /// Only Central Role supported
    CentralOnly = 0x01,
    /// Peripheral and Central Role supported, Peripheral Role preferred for connection establishment
    PeripheralPreferred = 0x02,
    /// Peripheral and Central Role supported, Central Role preferred for connection establishment
    CentralPreferred = 0x03,
}

pub struct AdPacket<'a> {
    pub kind: KnownOrRaw<u8, ad_packet::KnownType>,
    pub data: &'a [u8],
}

impl<'a> AdPacket<'a> {
    /// Iterates the `[len][type][data]` structures of an OOB payload, stopping at the first
    /// one that is empty or overruns the buffer.
    pub fn parse_buffer(buffer: &'a [u8]) -> impl Iterator<Item = Self> {
        let mut cursor = 0;
        std::iter::from_fn(move || {
            if cursor >= buffer.len() {
                return None;
            }
            let len = buffer[cursor] as usize;
            cursor += 1;
            if len == 0 || cursor + len > buffer.len() {
                return None;
            }
            let ad_type = buffer[cursor];
            let ad_data = &buffer[cursor + 1..cursor + len];
            cursor += len;

            Some(Self {
                kind: ad_type.into(),
                data: ad_data,
            })
        })
    }
}

fn write_ad(writer: &mut ByteWriter, kind: AdType, data: &[u8]) {
    writer
        .write_u8(data.len() as u8 + 1)
        .write_u8(kind as u8)
        .write_slice(data);
}

/// The role written into the OOB record. In a Handover Select the record describes the holder,
/// in a Handover Request the reader, which takes the opposite role.
fn le_role(ble: &BleMethod, for_select: bool) -> Result<LeRole, CarrierError> {
    match (
        ble.supports_central_client_mode,
        ble.supports_peripheral_server_mode,
    ) {
        (true, true) if for_select => Ok(LeRole::PeripheralPreferred),
        (true, true) => Ok(LeRole::CentralPreferred),
        (true, false) if for_select => Ok(LeRole::CentralOnly),
        (true, false) => Ok(LeRole::PeripheralOnly),
        (false, true) if for_select => Ok(LeRole::PeripheralOnly),
        (false, true) => Ok(LeRole::CentralOnly),
        (false, false) => Err(CarrierError::NoBleMode),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BleCarrierEncoder;

impl CarrierEncoder for BleCarrierEncoder {
    fn method_kind(&self) -> MethodKind {
        MethodKind::Ble
    }

    fn to_ndef_record(
        &self,
        method: &ConnectionMethod,
        auxiliary_references: &[Vec<u8>],
        for_select: bool,
    ) -> Result<(NdefRecord, Vec<u8>), CarrierError> {
        let ConnectionMethod::Ble(ble) = method else {
            return Err(CarrierError::InvalidRecord("not a BLE connection method"));
        };
        let role = le_role(ble, for_select)?;
        let mut uuid_bytes = *ble.service_uuid()?.as_bytes();
        uuid_bytes.reverse();

        let mut oob = ByteWriter::new();
        write_ad(&mut oob, AdType::LeRole, &[role as u8]);
        write_ad(&mut oob, AdType::CompleteList128BitServiceUuids, &uuid_bytes);
        if let Some(psm) = ble.peripheral_server_mode_psm {
            write_ad(&mut oob, AdType::PeripheralServerModePsm, &psm.to_le_bytes());
        }
        if let Some(mac) = ble.peripheral_server_mode_mac_address {
            write_ad(&mut oob, AdType::MacAddress, &mac);
        }

        let record =
            NdefRecord::new(Tnf::Media, BLE_OOB_MIME_TYPE, oob.into_bytes()).with_id(OOB_RECORD_ID);
        let ac = AlternativeCarrier::active(OOB_RECORD_ID, auxiliary_references).to_payload()?;
        Ok((record, ac))
    }

    fn from_ndef_record(&self, record: &NdefRecord) -> Option<ConnectionMethod> {
        if !record.matches(Tnf::Media, BLE_OOB_MIME_TYPE) {
            return None;
        }
        let mut role = None;
        let mut uuid = None;
        let mut psm = None;
        let mut mac = None;
        for packet in AdPacket::parse_buffer(&record.payload) {
            match packet.kind {
                KnownOrRaw::Known(AdType::LeRole) => {
                    role = packet.data.first().copied().and_then(LeRole::from_repr);
                }
                KnownOrRaw::Known(AdType::CompleteList128BitServiceUuids) => {
                    // Only the first UUID of the list is used.
                    if let Some(bytes) = packet.data.first_chunk::<16>() {
                        let mut bytes = *bytes;
                        bytes.reverse();
                        uuid = Some(Uuid::from_bytes(bytes));
                    }
                }
                KnownOrRaw::Known(AdType::PeripheralServerModePsm) => {
                    if let Ok(bytes) = <[u8; 4]>::try_from(packet.data) {
                        psm = Some(u32::from_le_bytes(bytes));
                    }
                }
                KnownOrRaw::Known(AdType::MacAddress) => {
                    // A trailing address-type byte may follow the six address bytes.
                    mac = packet.data.first_chunk::<6>().copied();
                }
                KnownOrRaw::Unknown(kind) => {
                    tracing::debug!(
                        "ignoring AD structure 0x{kind:02x}: {}",
                        DisplayBytesAsHex::from(packet.data)
                    );
                }
            }
        }

        let Some(role) = role else {
            tracing::warn!("BLE OOB record without LE role");
            return None;
        };
        let (central, peripheral) = match role {
            LeRole::CentralOnly => (true, false),
            LeRole::PeripheralOnly => (false, true),
            LeRole::PeripheralPreferred | LeRole::CentralPreferred => (true, true),
        };
        Some(ConnectionMethod::Ble(BleMethod {
            supports_central_client_mode: central,
            supports_peripheral_server_mode: peripheral,
            central_client_mode_uuid: uuid.filter(|_| central),
            peripheral_server_mode_uuid: uuid.filter(|_| peripheral),
            peripheral_server_mode_psm: psm,
            peripheral_server_mode_mac_address: mac,
        }))
    }
}
