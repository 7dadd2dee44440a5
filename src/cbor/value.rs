//! Bridge between [DataItem] and serde types, through [ciborium].

use std::io::Cursor;

use ciborium::value::Integer;
use serde::{de, Serialize};

use super::{decode, encode, simple, CborError, CborMap, DataItem};

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, CborError>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CborError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

pub fn from_slice<T>(slice: &[u8]) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(slice)).map_err(|e| CborError::DecodeFailed(e.to_string()))
}

/// Converts a serde type into a [DataItem].
pub fn to_data_item<T>(value: &T) -> Result<DataItem, CborError>
where
    T: Serialize,
{
    decode(&to_vec(value)?)
}

/// Converts a [DataItem] into a serde type.
pub fn from_data_item<T>(item: &DataItem) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    from_slice(&encode(item))
}

impl TryFrom<ciborium::Value> for DataItem {
    type Error = CborError;

    fn try_from(value: ciborium::Value) -> Result<Self, Self::Error> {
        use ciborium::Value;
        Ok(match value {
            Value::Integer(i) => {
                let v = i128::from(i);
                if v >= 0 {
                    DataItem::UnsignedInt(v as u64)
                } else {
                    DataItem::NegativeInt((-1 - v) as u64)
                }
            }
            Value::Bytes(bytes) => DataItem::ByteString(bytes),
            Value::Float(f) => DataItem::Float64(f),
            Value::Text(text) => DataItem::TextString(text),
            Value::Bool(b) => DataItem::from(b),
            Value::Null => DataItem::NULL,
            Value::Tag(tag, inner) => DataItem::Tagged(tag, Box::new((*inner).try_into()?)),
            Value::Array(items) => DataItem::from(
                items
                    .into_iter()
                    .map(DataItem::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Map(entries) => {
                let mut map = CborMap::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert_unique(k.try_into()?, v.try_into()?)
                        .map_err(|_| CborError::UnexpectedItem("duplicate key", "unique map keys"))?;
                }
                DataItem::from(map)
            }
            _ => return Err(CborError::UnexpectedItem("unknown value", "CBOR value")),
        })
    }
}

impl TryFrom<DataItem> for ciborium::Value {
    type Error = CborError;

    fn try_from(item: DataItem) -> Result<Self, Self::Error> {
        use ciborium::Value;
        Ok(match item {
            DataItem::UnsignedInt(v) => Value::Integer(v.into()),
            DataItem::NegativeInt(n) => Value::Integer(
                Integer::try_from(-1 - n as i128).map_err(|_| CborError::OutOfRangeIntegerValue)?,
            ),
            DataItem::ByteString(bytes) => Value::Bytes(bytes),
            DataItem::IndefiniteByteString(chunks) => Value::Bytes(chunks.concat()),
            DataItem::TextString(text) => Value::Text(text),
            DataItem::IndefiniteTextString(chunks) => Value::Text(chunks.concat()),
            DataItem::Array { items, .. } => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            DataItem::Map { entries, .. } => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k.try_into()?, v.try_into()?)))
                    .collect::<Result<_, CborError>>()?,
            ),
            DataItem::Tagged(tag, inner) => Value::Tag(tag, Box::new((*inner).try_into()?)),
            DataItem::Simple(simple::FALSE) => Value::Bool(false),
            DataItem::Simple(simple::TRUE) => Value::Bool(true),
            DataItem::Simple(simple::NULL) => Value::Null,
            DataItem::Simple(_) => return Err(CborError::UnexpectedItem("simple", "bool or null")),
            DataItem::Float32(f) => Value::Float(f as f64),
            DataItem::Float64(f) => Value::Float(f),
            DataItem::RawBytes(bytes) => decode(&bytes)?.try_into()?,
        })
    }
}
