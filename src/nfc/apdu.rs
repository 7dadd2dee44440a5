use strum_macros::EnumIter;
use tracing::warn;

// Written against ISO 7816-4 (2005), covering the commands used by NFC engagement and the
// ISO 18013-5 NFC data transfer.

use crate::bytes::ByteWriter;
use crate::error::ErrorKind;
use crate::nfc::util::{impl_partial_enum, DisplayBytesAsHex, IntoRaw, KnownOrRaw};

pub const INS_SELECT: u8 = 0xA4;
pub const INS_READ_BINARY: u8 = 0xB0;
pub const INS_UPDATE_BINARY: u8 = 0xD6;
pub const INS_ENVELOPE: u8 = 0xC3;
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// CLA of an ENVELOPE that more chunks will follow.
pub const CLA_CHAINING: u8 = 0x10;
pub const CLA_LAST: u8 = 0x00;

/// Largest Le a command can express.
pub const MAX_LE: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApduError {
    #[error("command data of {0} bytes does not fit an extended Lc")]
    DataTooLong(usize),
    #[error("Le of {0} is above {MAX_LE}")]
    LeOutOfRange(usize),
    #[error("READ BINARY of zero bytes")]
    ZeroLengthRead,
    #[error("offset {0} does not fit in 15 bits")]
    OffsetOutOfRange(usize),
    #[error("response APDU of {0} bytes has no status word")]
    ResponseTooShort(usize),
}

impl ApduError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApduError::ResponseTooShort(_) => ErrorKind::MalformedEncoding,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

type Result<T, E = ApduError> = std::result::Result<T, E>;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ResponseCode {
    Ok = 0x9000,
    EndOfFileReached = 0x6282,
    IncorrectLength = 0x6700,
    IncorrectP1OrP2 = 0x6B00,
    ConditionsNotSatisfied = 0x6985,
    FileOrApplicationNotFound = 0x6A82,
    InstructionNotSupported = 0x6D00,
    Unspecified = 0x6F00,
}
impl_partial_enum!(ResponseCode, u16);

impl ResponseCode {
    pub fn to_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// SW1 announcing that `SW2` more bytes (or 256+ when `SW2` is zero) wait for GET RESPONSE.
pub const SW1_BYTES_REMAINING: u8 = 0x61;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    pub payload: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ResponseApdu {
    pub fn new(payload: Vec<u8>, code: ResponseCode) -> Self {
        let [sw1, sw2] = code.to_bytes();
        Self { payload, sw1, sw2 }
    }

    /// A `61XX` response: `XX` is the remaining count when it fits in a byte, `00` otherwise.
    pub fn bytes_remaining(payload: Vec<u8>, remaining: usize) -> Self {
        Self {
            payload,
            sw1: SW1_BYTES_REMAINING,
            sw2: u8::try_from(remaining).unwrap_or(0),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes.split_last_chunk::<2>() {
            Some((payload, [sw1, sw2])) => Ok(Self {
                payload: payload.to_vec(),
                sw1: *sw1,
                sw2: *sw2,
            }),
            None => Err(ApduError::ResponseTooShort(bytes.len())),
        }
    }

    pub fn status_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    pub fn code(&self) -> KnownOrRaw<u16, ResponseCode> {
        self.status_word().into()
    }

    pub fn is_ok(&self) -> bool {
        self.status_word() == ResponseCode::Ok.into_raw()
    }

    /// `Some(XX)` for a `61XX` status.
    pub fn remaining(&self) -> Option<u8> {
        (self.sw1 == SW1_BYTES_REMAINING).then_some(self.sw2)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.payload.len() + 2);
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.sw1);
        bytes.push(self.sw2);
        bytes
    }
}

impl From<ResponseCode> for ResponseApdu {
    fn from(code: ResponseCode) -> Self {
        ResponseApdu::new(Vec::new(), code)
    }
}

impl From<ResponseApdu> for Vec<u8> {
    fn from(response: ResponseApdu) -> Self {
        response.to_bytes()
    }
}

impl TryFrom<&[u8]> for ResponseApdu {
    type Error = ApduError;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        ResponseApdu::parse(bytes)
    }
}

#[repr(u16)]
#[derive(Debug, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum FileId {
    CapabilityContainer = 0xE103,
    NdefFile = 0xE104,
}
impl_partial_enum!(FileId, u16);

/// The command a raw APDU carries, as far as INS (and P1 for SELECT) tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    SelectByAid,
    SelectFile,
    ReadBinary,
    UpdateBinary,
    Envelope,
    Response,
    Other,
}

pub fn command_type(apdu: &[u8]) -> CommandType {
    match (apdu.get(1), apdu.get(2)) {
        (Some(&INS_SELECT), Some(0x04)) => CommandType::SelectByAid,
        (Some(&INS_SELECT), Some(0x00)) => CommandType::SelectFile,
        (Some(&INS_READ_BINARY), _) => CommandType::ReadBinary,
        (Some(&INS_UPDATE_BINARY), _) => CommandType::UpdateBinary,
        (Some(&INS_ENVELOPE), _) => CommandType::Envelope,
        (Some(&INS_GET_RESPONSE), _) => CommandType::Response,
        _ => CommandType::Other,
    }
}

/// Case 2 commands have no data field: everything after the header is Le.
fn is_case_2(apdu: &[u8]) -> bool {
    apdu.len() == 5 || (apdu.len() == 7 && apdu[4] == 0)
}

/// Offset and length of the data field.
fn body(apdu: &[u8]) -> Option<(usize, usize)> {
    if apdu.len() < 4 {
        return None;
    }
    if apdu.len() == 4 || is_case_2(apdu) {
        return Some((4, 0));
    }
    if apdu[4] != 0 {
        Some((5, apdu[4] as usize))
    } else if apdu.len() >= 7 {
        Some((7, u16::from_be_bytes([apdu[5], apdu[6]]) as usize))
    } else {
        None
    }
}

pub fn data_length(apdu: &[u8]) -> usize {
    body(apdu).map(|(_, len)| len).unwrap_or(0)
}

/// The data field, or `None` if the APDU is shorter than its Lc claims.
pub fn data(apdu: &[u8]) -> Option<&[u8]> {
    let (offset, len) = body(apdu)?;
    apdu.get(offset..offset + len)
}

/// The expected response length; 0 when absent.
pub fn le(apdu: &[u8]) -> usize {
    let Some(trailing) = body(apdu).and_then(|(offset, len)| apdu.get(offset + len..)) else {
        return 0;
    };
    le_from_trailing(trailing).unwrap_or_else(|| {
        warn!(
            "unsupported Le encoding: {}",
            DisplayBytesAsHex::from(trailing)
        );
        0
    })
}

fn le_from_trailing(trailing: &[u8]) -> Option<usize> {
    let wide = |hi: u8, lo: u8| match u16::from_be_bytes([hi, lo]) {
        0 => MAX_LE,
        n => n as usize,
    };
    match trailing {
        [] => Some(0),
        [0] => Some(256),
        [n] => Some(*n as usize),
        [hi, lo] => Some(wide(*hi, *lo)),
        [0, hi, lo] => Some(wide(*hi, *lo)),
        _ => None,
    }
}

/// Serialises a command APDU.
///
/// `data == None` omits Lc altogether, so commands without a body (GET RESPONSE, and any case 1
/// or case 2 APDU) are written in the ISO 7816-4 form without a Lc byte. Callers that need the
/// legacy `Lc = 0x00` byte pass `Some(&[])` instead. An Le of 0 is omitted. When Lc is extended,
/// Le is always written in its two-byte form.
pub fn build_command_apdu(
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<&[u8]>,
    le: usize,
) -> Result<Vec<u8>> {
    if le > MAX_LE {
        return Err(ApduError::LeOutOfRange(le));
    }
    let mut writer = ByteWriter::with_capacity(4 + 3 + data.map_or(0, <[u8]>::len) + 3);
    writer.write_u8(cla).write_u8(ins).write_u8(p1).write_u8(p2);

    let mut extended_lc = false;
    if let Some(data) = data {
        if data.len() < 256 {
            writer.write_u8(data.len() as u8);
        } else {
            let len = u16::try_from(data.len()).map_err(|_| ApduError::DataTooLong(data.len()))?;
            extended_lc = true;
            writer.write_u8(0x00).write_u16_be(len);
        }
        writer.write_slice(data);
    }

    // 65536 wraps to 0x0000 in every extended form.
    let wide = (le % MAX_LE) as u16;
    match le {
        0 => {}
        _ if extended_lc => {
            writer.write_u16_be(wide);
        }
        256 => {
            writer.write_u8(0x00);
        }
        1..=255 => {
            writer.write_u8(le as u8);
        }
        _ => {
            writer.write_u8(0x00).write_u16_be(wide);
        }
    }
    Ok(writer.into_bytes())
}

pub fn select_aid(aid: &[u8]) -> Result<Vec<u8>> {
    build_command_apdu(CLA_LAST, INS_SELECT, 0x04, 0x00, Some(aid), 256)
}

pub fn select_file(file_id: u16) -> Result<Vec<u8>> {
    let p2 = select::ControlInfo::NoResponse as u8 | select::Occurrence::FirstOrOnly as u8;
    build_command_apdu(CLA_LAST, INS_SELECT, 0x00, p2, Some(&file_id.to_be_bytes()), 0)
}

/// READ BINARY of `length` bytes at `offset`.
///
/// Lengths below 256 use a one-byte Le, longer ones the extended `00 hi lo` form.
pub fn read_binary(offset: usize, length: usize) -> Result<Vec<u8>> {
    if length == 0 {
        return Err(ApduError::ZeroLengthRead);
    }
    if length > MAX_LE {
        return Err(ApduError::LeOutOfRange(length));
    }
    let [p1, p2] = offset_to_p1_p2(offset)?;
    let mut writer = ByteWriter::with_capacity(7);
    writer
        .write_u8(CLA_LAST)
        .write_u8(INS_READ_BINARY)
        .write_u8(p1)
        .write_u8(p2);
    if length < 256 {
        writer.write_u8(length as u8);
    } else {
        writer.write_u8(0x00).write_u16_be((length % MAX_LE) as u16);
    }
    Ok(writer.into_bytes())
}

pub fn update_binary(offset: usize, data: &[u8]) -> Result<Vec<u8>> {
    let [p1, p2] = offset_to_p1_p2(offset)?;
    build_command_apdu(CLA_LAST, INS_UPDATE_BINARY, p1, p2, Some(data), 0)
}

/// ENVELOPE carrying one chunk; `chained` marks that more chunks follow.
pub fn envelope(chained: bool, data: &[u8], le: usize) -> Result<Vec<u8>> {
    let cla = if chained { CLA_CHAINING } else { CLA_LAST };
    build_command_apdu(cla, INS_ENVELOPE, 0x00, 0x00, Some(data), le)
}

pub fn get_response(le: usize) -> Result<Vec<u8>> {
    build_command_apdu(CLA_LAST, INS_GET_RESPONSE, 0x00, 0x00, None, le)
}

/// b8 of P1 must stay clear, otherwise P1 names a short EF identifier (ISO 7816-4 §7.2.2).
fn offset_to_p1_p2(offset: usize) -> Result<[u8; 2]> {
    if offset > 0x7FFF {
        return Err(ApduError::OffsetOutOfRange(offset));
    }
    Ok((offset as u16).to_be_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apdu<'a> {
    SelectFile {
        occurrence: select::Occurrence,
        control_info: select::ControlInfo,
        file_id: KnownOrRaw<u16, FileId>,
    },
    SelectAid {
        occurrence: select::Occurrence,
        control_info: select::ControlInfo,
        aid: &'a [u8],
    },
    ReadBinary {
        slice: std::ops::Range<usize>,
    },
    UpdateBinary {
        offset: usize,
        data: &'a [u8],
    },
    Envelope {
        cla: u8,
        data: &'a [u8],
        le: usize,
    },
    GetResponse {
        le: usize,
    },
}

macro_rules! apdu_fail {
    ($code:expr) => {
        return Err(ResponseApdu::from($code))
    };
}


pub mod select {
    use super::{ResponseApdu, ResponseCode};

    #[repr(u8)]
    #[rustfmt::skip]
    #[derive(strum_macros::FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Occurrence {
        FirstOrOnly = 0b0000,
        Last        = 0b0001,
        Next        = 0b0010,
        Prev        = 0b0011,
    }

    #[repr(u8)]
    #[rustfmt::skip]
    #[derive(strum_macros::FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ControlInfo {
        FciTemplate = 0b0000,
        FcpTemplate = 0b0100,
        FmdTemplate = 0b1000,
        NoResponse  = 0b1100,
    }

    pub fn get_request_info(p2: u8) -> (Occurrence, ControlInfo) {
        let occurrence = match p2 & 0b0011 {
            0b0001 => Occurrence::Last,
            0b0010 => Occurrence::Next,
            0b0011 => Occurrence::Prev,
            _ => Occurrence::FirstOrOnly,
        };
        let control_info = match p2 & 0b1100 {
            0b0100 => ControlInfo::FcpTemplate,
            0b1000 => ControlInfo::FmdTemplate,
            0b1100 => ControlInfo::NoResponse,
            _ => ControlInfo::FciTemplate,
        };
        (occurrence, control_info)
    }

    impl ControlInfo {
        pub fn get_payload(&self) -> Result<ResponseApdu, ResponseApdu> {
            match *self {
                // Selection is by full name, so the whole FCI template may be left out.
                ControlInfo::NoResponse | ControlInfo::FciTemplate => Ok(ResponseCode::Ok.into()),
                _ => apdu_fail!(ResponseCode::InstructionNotSupported),
            }
        }
    }
}

impl<'a> Apdu<'a> {
    /// Parses a command, answering unsupported or malformed ones with the status to send back.
    pub fn parse(command_bytes: &'a [u8]) -> Result<Self, ResponseApdu> {
        tracing::debug!("APDU: {}", DisplayBytesAsHex::from(command_bytes));
        if command_bytes.len() < 4 {
            apdu_fail!(ResponseCode::IncorrectLength);
        }
        let (cla, ins, p1, p2) = (
            command_bytes[0],
            command_bytes[1],
            command_bytes[2],
            command_bytes[3],
        );
        let Some((offset, len)) = body(command_bytes) else {
            apdu_fail!(ResponseCode::IncorrectLength);
        };
        let Some(payload) = command_bytes.get(offset..offset + len) else {
            apdu_fail!(ResponseCode::IncorrectLength);
        };
        let trailing = &command_bytes[offset + len..];
        let Some(response_len) = le_from_trailing(trailing) else {
            tracing::error!(
                "unexpected {} bytes after the data field",
                trailing.len()
            );
            apdu_fail!(ResponseCode::Unspecified);
        };

        tracing::debug!("Processing APDU command: CLA: {cla:02X}, INS: {ins:02X}, P1: {p1:02X}, P2: {p2:02X}, Payload Length: {}, Resp len: {response_len}", payload.len());

        let p1_bit8 = (p1 & 0b1000_0000) != 0;

        Ok(match command_type(command_bytes) {
            CommandType::SelectByAid => {
                let (occurrence, control_info) = select::get_request_info(p2);
                Apdu::SelectAid {
                    occurrence,
                    control_info,
                    aid: payload,
                }
            }
            CommandType::SelectFile => {
                let (occurrence, control_info) = select::get_request_info(p2);
                let Ok(file_id) = <[u8; 2]>::try_from(payload) else {
                    apdu_fail!(ResponseCode::IncorrectLength);
                };
                Apdu::SelectFile {
                    occurrence,
                    control_info,
                    file_id: u16::from_be_bytes(file_id).into(),
                }
            }
            CommandType::ReadBinary => {
                if p1_bit8 {
                    // P1 naming a short EF identifier is not supported.
                    apdu_fail!(ResponseCode::Unspecified)
                }
                let offset = u16::from_be_bytes([p1, p2]) as usize;
                Apdu::ReadBinary {
                    slice: offset..offset + response_len,
                }
            }
            CommandType::UpdateBinary => {
                if p1_bit8 {
                    apdu_fail!(ResponseCode::Unspecified)
                }
                Apdu::UpdateBinary {
                    offset: u16::from_be_bytes([p1, p2]) as usize,
                    data: payload,
                }
            }
            CommandType::Envelope => Apdu::Envelope {
                cla,
                data: payload,
                le: response_len,
            },
            CommandType::Response => Apdu::GetResponse { le: response_len },
            CommandType::Other => apdu_fail!(ResponseCode::InstructionNotSupported),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Apdu::SelectFile {
                occurrence,
                control_info,
                file_id,
            } => build_command_apdu(
                CLA_LAST,
                INS_SELECT,
                0x00,
                *control_info as u8 | *occurrence as u8,
                Some(&file_id.into_raw().to_be_bytes()),
                0,
            ),
            Apdu::SelectAid {
                occurrence,
                control_info,
                aid,
            } => build_command_apdu(
                CLA_LAST,
                INS_SELECT,
                0x04,
                *control_info as u8 | *occurrence as u8,
                Some(*aid),
                256,
            ),
            Apdu::ReadBinary { slice } if slice.is_empty() => {
                let [p1, p2] = offset_to_p1_p2(slice.start)?;
                build_command_apdu(CLA_LAST, INS_READ_BINARY, p1, p2, None, 0)
            }
            Apdu::ReadBinary { slice } => read_binary(slice.start, slice.len()),
            Apdu::UpdateBinary { offset, data } => update_binary(*offset, data),
            Apdu::Envelope { cla, data, le } => {
                build_command_apdu(*cla, INS_ENVELOPE, 0x00, 0x00, Some(*data), *le)
            }
            Apdu::GetResponse { le } => get_response(*le),
        }
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    fn test_apdus(apdus: Vec<Vec<u8>>) {
        for apdu in apdus {
            let parsed_apdu = Apdu::parse(&apdu).expect("Failed to parse APDU");
            println!("APDU: {parsed_apdu:?}");
            assert_eq!(apdu, parsed_apdu.to_bytes().unwrap());
        }
    }

    #[test]
    /// real APDUs from the GET verifier app
    fn get_apdus() {
        let apdus = vec![
            hex!("00A4040007A000000248040000").to_vec(),
            hex!("00A4040007D276000085010100").to_vec(),
            hex!("00A4000C02E103").to_vec(),
            hex!("00B000000F").to_vec(),
            hex!("00A4000C02E104").to_vec(),
            hex!("00B0000002").to_vec(),
            hex!("00B00002CC").to_vec(),
        ];
        test_apdus(apdus);
    }

    #[test]
    /// test APDUs from multipaz
    /// https://github.com/openwallet-foundation/multipaz/blob/96b82c9ff7a34d18a67f09473e51200a202bee48/multipaz/src/commonTest/kotlin/org/multipaz/mdoc/nfc/MdocNfcEngagementHelperTest.kt#L10
    fn multipaz_tests_apdus() {
        let apdus = vec![
            // multipaz does not append Le when it's 0, the trailing 00 was added manually
            hex::decode("00a4040007d276000085010100").unwrap(),
            hex::decode("00a4000c02e103").unwrap(),
            hex::decode("00b000000f").unwrap(),
            hex::decode("00a4000c02e104").unwrap(),
            hex::decode("00b0000002").unwrap(),
            hex::decode("00b00002fe").unwrap(),
            hex::decode("00b000021f").unwrap(),
            hex::decode("00d600001b0019d1021454731375726e3a6e66633a736e3a68616e646f766572").unwrap(),
            hex::decode("00b0000206").unwrap(),
            hex::decode("00d60000aa00a8910215487215910204616301013000510206616301036e6663001c1e060a69736f2e6f72673a31383031333a726561646572656e676167656d656e746d646f63726561646572a10063312e301a2015016170706c69636174696f6e2f766e642e626c7565746f6f74682e6c652e6f6f6230021c031107b66eef55ee782ea2514bb6a1c42ad5b35c110a0369736f2e6f72673a31383031333a6e66636e6663010301ffff0402010000").unwrap(),
            hex::decode("00b00002ba").unwrap(),
        ];
        test_apdus(apdus);
    }

    #[test]
    fn read_binary_le_forms() {
        assert_eq!(read_binary(0, 255).unwrap(), hex!("00B00000FF"));
        assert_eq!(read_binary(0, 256).unwrap(), hex!("00B00000000100"));
        assert_eq!(read_binary(2, 65536).unwrap(), hex!("00B00002000000"));
        assert_eq!(read_binary(0, 0), Err(ApduError::ZeroLengthRead));
        assert_eq!(read_binary(0x8000, 1), Err(ApduError::OffsetOutOfRange(0x8000)));
        assert_eq!(le(&read_binary(0, 256).unwrap()), 256);
    }

    #[test]
    fn lc_and_le_forms() {
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, None, 0).unwrap(),
            hex!("00C30000")
        );
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, Some(&[]), 0).unwrap(),
            hex!("00C3000000")
        );
        assert_eq!(get_response(256).unwrap(), hex!("00C0000000"));
        assert_eq!(
            build_command_apdu(0, 0xC0, 0, 0, Some(&[]), 256).unwrap(),
            hex!("00C000000000")
        );
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, Some(&[0xAA]), 256).unwrap(),
            hex!("00C3000001AA00")
        );
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, Some(&[0xAA]), 257).unwrap(),
            hex!("00C3000001AA000101")
        );
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, Some(&[0xAA]), 65536).unwrap(),
            hex!("00C3000001AA000000")
        );

        let data = vec![0x11; 300];
        let apdu = build_command_apdu(0, 0xC3, 0, 0, Some(&data), 256).unwrap();
        assert_eq!(apdu[4..7], [0x00, 0x01, 0x2C]);
        assert_eq!(apdu[apdu.len() - 2..], [0x01, 0x00]);
        assert_eq!(data_length(&apdu), 300);
        assert_eq!(self::data(&apdu), Some(&data[..]));
        assert_eq!(le(&apdu), 256);

        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, Some(&vec![0; 65536]), 0),
            Err(ApduError::DataTooLong(65536))
        );
        assert_eq!(
            build_command_apdu(0, 0xC3, 0, 0, None, 65537),
            Err(ApduError::LeOutOfRange(65537))
        );
    }

    #[test]
    fn field_extraction() {
        let select = hex!("00A4040007A000000248040000");
        assert_eq!(command_type(&select), CommandType::SelectByAid);
        assert_eq!(data(&select), Some(&hex!("A0000002480400")[..]));
        assert_eq!(le(&select), 256);

        let case_2 = hex!("00C000000F");
        assert_eq!(command_type(&case_2), CommandType::Response);
        assert_eq!(data_length(&case_2), 0);
        assert_eq!(data(&case_2), Some(&[][..]));
        assert_eq!(le(&case_2), 15);

        let truncated = hex!("00C3000005AABB");
        assert_eq!(data(&truncated), None);
        assert_eq!(le(&hex!("00C3000001AA01020304")), 0);
        assert_eq!(command_type(&hex!("00CA0000")), CommandType::Other);
    }

    #[test]
    fn response_status_words() {
        let response = ResponseApdu::parse(&hex!("CAFE9000")).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.payload, hex!("CAFE"));
        assert_eq!(response.code(), KnownOrRaw::Known(ResponseCode::Ok));

        let more = ResponseApdu::parse(&hex!("61EC")).unwrap();
        assert_eq!(more.remaining(), Some(0xEC));
        assert_eq!(more.code(), KnownOrRaw::Unknown(0x61EC));
        assert_eq!(ResponseApdu::bytes_remaining(vec![], 300).to_bytes(), hex!("6100"));

        assert_eq!(
            ResponseApdu::parse(&[0x90]),
            Err(ApduError::ResponseTooShort(1))
        );
        assert_eq!(ResponseApdu::from(ResponseCode::EndOfFileReached).to_bytes(), hex!("6282"));
    }

    #[test]
    fn parse_rejections() {
        assert_eq!(
            Apdu::parse(&hex!("00A4")).unwrap_err(),
            ResponseApdu::from(ResponseCode::IncorrectLength)
        );
        assert_eq!(
            Apdu::parse(&hex!("00CA0000")).unwrap_err(),
            ResponseApdu::from(ResponseCode::InstructionNotSupported)
        );
        assert_eq!(
            Apdu::parse(&hex!("00A4000C03E10300")).unwrap_err(),
            ResponseApdu::from(ResponseCode::IncorrectLength)
        );
        assert_eq!(
            Apdu::parse(&hex!("00C3000002AABB00")).unwrap(),
            Apdu::Envelope {
                cla: 0,
                data: &hex!("AABB"),
                le: 256
            }
        );
    }
}
