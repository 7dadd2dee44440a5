//! TNEP 1.0 records: Service Parameter (`Tp`), Service Select (`Ts`) and Status (`Te`).

use thiserror::Error;

use crate::error::ErrorKind;
use crate::nfc::ndef::{NdefRecord, RecordType};

/// Service name of negotiated connection handover.
pub const HANDOVER_SERVICE: &str = "urn:nfc:sn:handover";

pub const TNEP_VERSION_1_0: u8 = 0x10;

/// Largest NDEF message the holder accepts: the NDEF file holds up to 255 bytes, two of them
/// being the length prefix.
pub const NFC_MAX_PAYLOAD_SIZE: u16 = 255 - 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TnepError {
    #[error("expected a {0:?} record")]
    WrongRecordType(RecordType),
    #[error("{record:?} payload is {actual} bytes, expected {expected}")]
    InvalidLength {
        record: RecordType,
        expected: usize,
        actual: usize,
    },
    #[error("service name is not valid UTF-8")]
    InvalidServiceName,
    #[error("service name of {0} bytes does not fit a one-byte length")]
    ServiceNameTooLong(usize),
}

impl TnepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TnepError::ServiceNameTooLong(_) => ErrorKind::ProtocolViolation,
            _ => ErrorKind::MalformedEncoding,
        }
    }
}

fn expect_type(record: &NdefRecord, record_type: RecordType) -> Result<(), TnepError> {
    if !record.is(record_type) {
        return Err(TnepError::WrongRecordType(record_type));
    }
    Ok(())
}

fn name_len(name: &str) -> Result<u8, TnepError> {
    u8::try_from(name.len()).map_err(|_| TnepError::ServiceNameTooLong(name.len()))
}

fn name_from(bytes: &[u8]) -> Result<String, TnepError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| TnepError::InvalidServiceName)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParameter {
    pub version: u8,
    pub service_name: String,
    /// 0 for single response communication.
    pub communication_mode: u8,
    /// Encoded minimum waiting time, see [ServiceParameter::t_wait_millis].
    pub t_wait: u8,
    /// Maximum number of waiting time extensions, 0-15.
    pub n_wait: u8,
    pub max_ndef_size: u16,
}

impl ServiceParameter {
    /// The parameters a holder announces for negotiated handover.
    pub fn handover() -> Self {
        Self {
            version: TNEP_VERSION_1_0,
            service_name: HANDOVER_SERVICE.to_string(),
            communication_mode: 0x00,
            t_wait: 0x10,
            n_wait: 0x0F,
            max_ndef_size: NFC_MAX_PAYLOAD_SIZE,
        }
    }

    /// Minimum waiting time in milliseconds: `2^(t_wait / 4 - 1)` (TNEP 1.0 §4.1.6).
    pub fn t_wait_millis(&self) -> f64 {
        2f64.powf((self.t_wait / 4) as f64 - 1.0)
    }

    pub fn to_record(&self) -> Result<NdefRecord, TnepError> {
        let mut payload = Vec::with_capacity(self.service_name.len() + 7);
        payload.push(self.version);
        payload.push(name_len(&self.service_name)?);
        payload.extend_from_slice(self.service_name.as_bytes());
        payload.push(self.communication_mode);
        payload.push(self.t_wait);
        payload.push(self.n_wait);
        payload.extend_from_slice(&self.max_ndef_size.to_be_bytes());
        Ok(NdefRecord::well_known(
            RecordType::TnepServiceParameter,
            payload,
        ))
    }

    pub fn from_record(record: &NdefRecord) -> Result<Self, TnepError> {
        expect_type(record, RecordType::TnepServiceParameter)?;
        let p = &record.payload;
        let invalid = |expected| TnepError::InvalidLength {
            record: RecordType::TnepServiceParameter,
            expected,
            actual: p.len(),
        };
        if p.len() < 2 {
            return Err(invalid(7));
        }
        let name_len = p[1] as usize;
        if p.len() != name_len + 7 {
            return Err(invalid(name_len + 7));
        }
        let rest = &p[2 + name_len..];
        Ok(Self {
            version: p[0],
            service_name: name_from(&p[2..2 + name_len])?,
            communication_mode: rest[0],
            t_wait: rest[1],
            n_wait: rest[2],
            max_ndef_size: u16::from_be_bytes([rest[3], rest[4]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelect {
    pub service_name: String,
}

impl ServiceSelect {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn to_record(&self) -> Result<NdefRecord, TnepError> {
        let mut payload = Vec::with_capacity(self.service_name.len() + 1);
        payload.push(name_len(&self.service_name)?);
        payload.extend_from_slice(self.service_name.as_bytes());
        Ok(NdefRecord::well_known(RecordType::TnepServiceSelect, payload))
    }

    pub fn from_record(record: &NdefRecord) -> Result<Self, TnepError> {
        expect_type(record, RecordType::TnepServiceSelect)?;
        let Some((&len, name)) = record.payload.split_first() else {
            return Err(TnepError::InvalidLength {
                record: RecordType::TnepServiceSelect,
                expected: 1,
                actual: 0,
            });
        };
        if name.len() != len as usize {
            return Err(TnepError::InvalidLength {
                record: RecordType::TnepServiceSelect,
                expected: len as usize + 1,
                actual: record.payload.len(),
            });
        }
        Ok(Self {
            service_name: name_from(name)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub status: u8,
}

impl Status {
    pub const SUCCESS: Status = Status { status: 0x00 };

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS.status
    }

    pub fn to_record(&self) -> NdefRecord {
        NdefRecord::well_known(RecordType::TnepStatus, vec![self.status])
    }

    pub fn from_record(record: &NdefRecord) -> Result<Self, TnepError> {
        expect_type(record, RecordType::TnepStatus)?;
        match record.payload.as_slice() {
            [status] => Ok(Self { status: *status }),
            other => Err(TnepError::InvalidLength {
                record: RecordType::TnepStatus,
                expected: 1,
                actual: other.len(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;
    use crate::nfc::ndef::NdefMessage;

    #[test]
    fn service_parameter_from_multipaz() {
        let message = NdefMessage::parse(&hex!(
            "D1021A5470101375726E3A6E66633A736E3A68616E646F76657200000FFFFF"
        ))
        .unwrap();
        let tp = ServiceParameter::from_record(&message.records[0]).unwrap();
        assert_eq!(tp.version, TNEP_VERSION_1_0);
        assert_eq!(tp.service_name, HANDOVER_SERVICE);
        assert_eq!(tp.t_wait, 0);
        assert_eq!(tp.n_wait, 0x0F);
        assert_eq!(tp.max_ndef_size, 0xFFFF);
        assert_eq!(tp.to_record().unwrap(), message.records[0]);
    }

    #[test]
    fn waiting_time() {
        let mut tp = ServiceParameter::handover();
        assert_eq!(tp.t_wait_millis(), 8.0);
        tp.t_wait = 0;
        assert_eq!(tp.t_wait_millis(), 0.5);
        tp.t_wait = 7;
        assert_eq!(tp.t_wait_millis(), 1.0);
        tp.t_wait = 63;
        assert_eq!(tp.t_wait_millis(), 16384.0);
    }

    #[test]
    fn service_parameter_length_must_match_name() {
        let mut record = ServiceParameter::handover().to_record().unwrap();
        record.payload.push(0);
        assert_eq!(
            ServiceParameter::from_record(&record),
            Err(TnepError::InvalidLength {
                record: RecordType::TnepServiceParameter,
                expected: 26,
                actual: 27
            })
        );
    }

    #[test]
    fn service_select_and_status() {
        let ts = ServiceSelect::new(HANDOVER_SERVICE).to_record().unwrap();
        assert_eq!(
            NdefMessage::new(vec![ts.clone()]).encode().unwrap(),
            hex!("d1021454731375726e3a6e66633a736e3a68616e646f766572")
        );
        assert_eq!(
            ServiceSelect::from_record(&ts).unwrap().service_name,
            HANDOVER_SERVICE
        );
        assert_eq!(
            ServiceSelect::from_record(&Status::SUCCESS.to_record()),
            Err(TnepError::WrongRecordType(RecordType::TnepServiceSelect))
        );

        let te = Status::from_record(&Status::SUCCESS.to_record()).unwrap();
        assert!(te.is_success());
        let mut bad = Status::SUCCESS.to_record();
        bad.payload.clear();
        assert!(Status::from_record(&bad).is_err());
    }
}
