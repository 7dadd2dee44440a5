use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::{decode, encode, CborError};

/// Simple values with a name in RFC 8949 §3.3.
pub mod simple {
    pub const FALSE: u8 = 20;
    pub const TRUE: u8 = 21;
    pub const NULL: u8 = 22;
    pub const UNDEFINED: u8 = 23;
}

/// Tag numbers this crate gives special treatment.
pub mod tag {
    /// RFC 3339 date/time string.
    pub const DATE_TIME: u64 = 0;
    /// Seconds since the epoch.
    pub const EPOCH_TIME: u64 = 1;
    pub const POSITIVE_BIGNUM: u64 = 2;
    pub const NEGATIVE_BIGNUM: u64 = 3;
    /// Embedded CBOR data item, always wrapping a byte string.
    pub const ENCODED_CBOR: u64 = 24;
    /// RFC 8943 full-date string.
    pub const FULL_DATE: u64 = 1004;
}

/// A CBOR data item.
///
/// Equality and hashing are structural. Floats compare by bit pattern, so `NaN == NaN` and
/// `0.0 != -0.0`, which keeps [Eq] and [Hash] consistent for map keys.
#[derive(Debug, Clone)]
pub enum DataItem {
    UnsignedInt(u64),
    /// Holds `n` for the value `-1 - n`.
    NegativeInt(u64),
    ByteString(Vec<u8>),
    IndefiniteByteString(Vec<Vec<u8>>),
    TextString(String),
    IndefiniteTextString(Vec<String>),
    Array {
        items: Vec<DataItem>,
        indefinite: bool,
    },
    Map {
        entries: CborMap,
        indefinite: bool,
    },
    Tagged(u64, Box<DataItem>),
    Simple(u8),
    Float32(f32),
    Float64(f64),
    /// Already-encoded CBOR, written out verbatim by the encoder.
    RawBytes(Vec<u8>),
}

impl DataItem {
    pub const FALSE: DataItem = DataItem::Simple(simple::FALSE);
    pub const TRUE: DataItem = DataItem::Simple(simple::TRUE);
    pub const NULL: DataItem = DataItem::Simple(simple::NULL);
    pub const UNDEFINED: DataItem = DataItem::Simple(simple::UNDEFINED);

    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn major_type(&self) -> Option<u8> {
        Some(match self {
            DataItem::UnsignedInt(_) => 0,
            DataItem::NegativeInt(_) => 1,
            DataItem::ByteString(_) | DataItem::IndefiniteByteString(_) => 2,
            DataItem::TextString(_) | DataItem::IndefiniteTextString(_) => 3,
            DataItem::Array { .. } => 4,
            DataItem::Map { .. } => 5,
            DataItem::Tagged(..) => 6,
            DataItem::Simple(_) | DataItem::Float32(_) | DataItem::Float64(_) => 7,
            DataItem::RawBytes(bytes) => return bytes.first().map(|b| b >> 5),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DataItem::UnsignedInt(_) => "uint",
            DataItem::NegativeInt(_) => "nint",
            DataItem::ByteString(_) | DataItem::IndefiniteByteString(_) => "bstr",
            DataItem::TextString(_) | DataItem::IndefiniteTextString(_) => "tstr",
            DataItem::Array { .. } => "array",
            DataItem::Map { .. } => "map",
            DataItem::Tagged(..) => "tag",
            DataItem::Simple(simple::FALSE | simple::TRUE) => "bool",
            DataItem::Simple(simple::NULL) => "null",
            DataItem::Simple(simple::UNDEFINED) => "undefined",
            DataItem::Simple(_) => "simple",
            DataItem::Float32(_) | DataItem::Float64(_) => "float",
            DataItem::RawBytes(_) => "raw",
        }
    }

    /// Arrays and maps, and tags wrapping them.
    pub fn is_compound(&self) -> bool {
        match self {
            DataItem::Array { .. } | DataItem::Map { .. } => true,
            DataItem::Tagged(_, inner) => inner.is_compound(),
            _ => false,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataItem::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            DataItem::UnsignedInt(v) => Some(*v as i128),
            DataItem::NegativeInt(n) => Some(-1 - *n as i128),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataItem::Float32(v) => Some(*v as f64),
            DataItem::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataItem::Simple(simple::TRUE) => Some(true),
            DataItem::Simple(simple::FALSE) => Some(false),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataItem::Simple(simple::NULL))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, DataItem::Simple(simple::UNDEFINED))
    }

    /// The content of a definite-length byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DataItem::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The content of a byte string, joining the chunks of an indefinite-length one.
    pub fn byte_content(&self) -> Option<Vec<u8>> {
        match self {
            DataItem::ByteString(bytes) => Some(bytes.clone()),
            DataItem::IndefiniteByteString(chunks) => Some(chunks.concat()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataItem::TextString(text) => Some(text),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<String> {
        match self {
            DataItem::TextString(text) => Some(text.clone()),
            DataItem::IndefiniteTextString(chunks) => Some(chunks.concat()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DataItem]> {
        match self {
            DataItem::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&CborMap> {
        match self {
            DataItem::Map { entries, .. } => Some(entries),
            _ => None,
        }
    }

    pub fn as_tagged(&self) -> Option<(u64, &DataItem)> {
        match self {
            DataItem::Tagged(tag, inner) => Some((*tag, inner)),
            _ => None,
        }
    }

    /// Wraps the encoding of `item` as embedded CBOR (tag 24).
    pub fn embed(item: &DataItem) -> DataItem {
        DataItem::Tagged(
            tag::ENCODED_CBOR,
            Box::new(DataItem::ByteString(encode(item))),
        )
    }

    /// Decodes the content of an embedded CBOR item.
    ///
    /// Returns `None` if this is not a tag 24 wrapping a byte string. Decoding happens on every
    /// call; nothing is cached.
    pub fn decode_embedded(&self) -> Option<Result<DataItem, CborError>> {
        match self {
            DataItem::Tagged(tag::ENCODED_CBOR, inner) => match inner.as_ref() {
                DataItem::ByteString(bytes) => Some(decode(bytes)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn tdate(date_time: impl Into<String>) -> DataItem {
        DataItem::Tagged(
            tag::DATE_TIME,
            Box::new(DataItem::TextString(date_time.into())),
        )
    }

    pub fn epoch_time(seconds: i64) -> DataItem {
        DataItem::Tagged(tag::EPOCH_TIME, Box::new(DataItem::from(seconds)))
    }

    pub fn full_date(date: impl Into<String>) -> DataItem {
        DataItem::Tagged(
            tag::FULL_DATE,
            Box::new(DataItem::TextString(date.into())),
        )
    }

    /// A bignum from its big-endian magnitude. For negative bignums `magnitude` is `n` in
    /// `-1 - n`, as on the wire.
    pub fn bignum(negative: bool, magnitude: Vec<u8>) -> DataItem {
        let tag = if negative {
            tag::NEGATIVE_BIGNUM
        } else {
            tag::POSITIVE_BIGNUM
        };
        DataItem::Tagged(tag, Box::new(DataItem::ByteString(magnitude)))
    }

    pub fn as_bignum(&self) -> Option<(bool, &[u8])> {
        match self {
            DataItem::Tagged(tag @ (tag::POSITIVE_BIGNUM | tag::NEGATIVE_BIGNUM), inner) => inner
                .as_bytes()
                .map(|bytes| (*tag == tag::NEGATIVE_BIGNUM, bytes)),
            _ => None,
        }
    }
}

impl PartialEq for DataItem {
    fn eq(&self, other: &Self) -> bool {
        use DataItem::*;
        match (self, other) {
            (UnsignedInt(a), UnsignedInt(b)) => a == b,
            (NegativeInt(a), NegativeInt(b)) => a == b,
            (ByteString(a), ByteString(b)) => a == b,
            (IndefiniteByteString(a), IndefiniteByteString(b)) => a == b,
            (TextString(a), TextString(b)) => a == b,
            (IndefiniteTextString(a), IndefiniteTextString(b)) => a == b,
            (
                Array {
                    items: a,
                    indefinite: ai,
                },
                Array {
                    items: b,
                    indefinite: bi,
                },
            ) => ai == bi && a == b,
            (
                Map {
                    entries: a,
                    indefinite: ai,
                },
                Map {
                    entries: b,
                    indefinite: bi,
                },
            ) => ai == bi && a == b,
            (Tagged(ta, a), Tagged(tb, b)) => ta == tb && a == b,
            (Simple(a), Simple(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (RawBytes(a), RawBytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DataItem {}

impl Hash for DataItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            DataItem::UnsignedInt(v) | DataItem::NegativeInt(v) => v.hash(state),
            DataItem::ByteString(b) | DataItem::RawBytes(b) => b.hash(state),
            DataItem::IndefiniteByteString(chunks) => chunks.hash(state),
            DataItem::TextString(t) => t.hash(state),
            DataItem::IndefiniteTextString(chunks) => chunks.hash(state),
            DataItem::Array { items, indefinite } => {
                indefinite.hash(state);
                items.hash(state);
            }
            DataItem::Map {
                entries,
                indefinite,
            } => {
                indefinite.hash(state);
                entries.hash(state);
            }
            DataItem::Tagged(tag, inner) => {
                tag.hash(state);
                inner.hash(state);
            }
            DataItem::Simple(v) => v.hash(state),
            DataItem::Float32(v) => v.to_bits().hash(state),
            DataItem::Float64(v) => v.to_bits().hash(state),
        }
    }
}

/// Map entries in insertion order, unique by key. Keys are indexed so lookups and duplicate
/// checks do not scan the entries.
#[derive(Clone, Default)]
pub struct CborMap {
    entries: Vec<(DataItem, DataItem)>,
    index: HashMap<DataItem, usize>,
}

impl CborMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn push(&mut self, key: DataItem, value: DataItem) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }

    /// Inserts a pair. An existing key keeps its position and has its value replaced, the old
    /// value being returned.
    pub fn insert(
        &mut self,
        key: impl Into<DataItem>,
        value: impl Into<DataItem>,
    ) -> Option<DataItem> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.push(key, value);
                None
            }
        }
    }

    /// Inserts a pair only if the key is absent, handing the pair back otherwise.
    pub(crate) fn insert_unique(
        &mut self,
        key: DataItem,
        value: DataItem,
    ) -> Result<(), (DataItem, DataItem)> {
        if self.contains_key(&key) {
            return Err((key, value));
        }
        self.push(key, value);
        Ok(())
    }

    pub fn get(&self, key: impl Into<DataItem>) -> Option<&DataItem> {
        self.get_item(&key.into())
    }

    pub fn get_item(&self, key: &DataItem) -> Option<&DataItem> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &DataItem) -> bool {
        self.index.contains_key(key)
    }

    pub fn remove(&mut self, key: impl Into<DataItem>) -> Option<DataItem> {
        let index = self.index.remove(&key.into())?;
        let (_, value) = self.entries.remove(index);
        for position in self.index.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (DataItem, DataItem)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DataItem> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &DataItem> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl fmt::Debug for CborMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CborMap")
            .field("entries", &self.entries)
            .finish()
    }
}

/// Order matters: two maps are equal when they hold the same pairs in the same order.
impl PartialEq for CborMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for CborMap {}

impl Hash for CborMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entries.hash(state);
    }
}

impl IntoIterator for CborMap {
    type Item = (DataItem, DataItem);
    type IntoIter = std::vec::IntoIter<(DataItem, DataItem)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a CborMap {
    type Item = &'a (DataItem, DataItem);
    type IntoIter = std::slice::Iter<'a, (DataItem, DataItem)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Later duplicates replace earlier values.
impl<K: Into<DataItem>, V: Into<DataItem>> FromIterator<(K, V)> for CborMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = CborMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),+) => {
        $(
            impl From<$t> for DataItem {
                fn from(v: $t) -> DataItem {
                    DataItem::UnsignedInt(v as u64)
                }
            }
        )+
    };
}

macro_rules! impl_from_signed {
    ($($t:ty),+) => {
        $(
            impl From<$t> for DataItem {
                fn from(v: $t) -> DataItem {
                    let v = v as i64;
                    if v >= 0 {
                        DataItem::UnsignedInt(v as u64)
                    } else {
                        DataItem::NegativeInt(!(v as u64))
                    }
                }
            }
        )+
    };
}

impl_from_unsigned!(u8, u16, u32, u64, usize);
impl_from_signed!(i8, i16, i32, i64, isize);

impl From<bool> for DataItem {
    fn from(v: bool) -> DataItem {
        if v {
            DataItem::TRUE
        } else {
            DataItem::FALSE
        }
    }
}

impl From<f32> for DataItem {
    fn from(v: f32) -> DataItem {
        DataItem::Float32(v)
    }
}

impl From<f64> for DataItem {
    fn from(v: f64) -> DataItem {
        DataItem::Float64(v)
    }
}

impl From<&str> for DataItem {
    fn from(v: &str) -> DataItem {
        DataItem::TextString(v.to_string())
    }
}

impl From<String> for DataItem {
    fn from(v: String) -> DataItem {
        DataItem::TextString(v)
    }
}

impl From<Vec<u8>> for DataItem {
    fn from(v: Vec<u8>) -> DataItem {
        DataItem::ByteString(v)
    }
}

impl From<&[u8]> for DataItem {
    fn from(v: &[u8]) -> DataItem {
        DataItem::ByteString(v.to_vec())
    }
}

impl From<Vec<DataItem>> for DataItem {
    fn from(items: Vec<DataItem>) -> DataItem {
        DataItem::Array {
            items,
            indefinite: false,
        }
    }
}

impl From<CborMap> for DataItem {
    fn from(entries: CborMap) -> DataItem {
        DataItem::Map {
            entries,
            indefinite: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn negative_integers_store_the_offset() {
        assert_eq!(DataItem::from(-1), DataItem::NegativeInt(0));
        assert_eq!(DataItem::from(-500i64), DataItem::NegativeInt(499));
        assert_eq!(
            DataItem::from(i64::MIN),
            DataItem::NegativeInt(i64::MAX as u64)
        );
        assert_eq!(DataItem::NegativeInt(u64::MAX).as_i128(), Some(-(1i128 << 64)));
        assert_eq!(DataItem::NegativeInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn map_insert_keeps_keys_unique_and_ordered() {
        let mut map = CborMap::new();
        assert_eq!(map.insert("b", 1), None);
        assert_eq!(map.insert("a", 2), None);
        assert_eq!(map.insert("b", 3), Some(DataItem::from(1)));
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec![DataItem::from("b"), DataItem::from("a")]);
        assert_eq!(map.get("b"), Some(&DataItem::from(3)));
        assert_eq!(map.remove("b"), Some(DataItem::from(3)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some(&DataItem::from(2)));
        assert_eq!(map.get("b"), None);
    }

    #[test]
    fn remove_keeps_lookups_in_step_with_order() {
        let mut map: CborMap = (0..5u64).map(|k| (k, k * 10)).collect();
        assert_eq!(map.remove(1u64), Some(DataItem::from(10)));
        map.insert(1u64, 11);
        let keys: Vec<_> = map.keys().filter_map(DataItem::as_u64).collect();
        assert_eq!(keys, vec![0, 2, 3, 4, 1]);
        for (key, value) in [(0u64, 0u64), (2, 20), (3, 30), (4, 40), (1, 11)] {
            assert_eq!(map.get(key), Some(&DataItem::from(value)));
        }
        let rebuilt: CborMap = map.clone().into_iter().collect();
        assert_eq!(rebuilt, map);
    }

    #[test]
    fn floats_hash_and_compare_by_bits() {
        let mut set = HashSet::new();
        set.insert(DataItem::Float64(f64::NAN));
        assert!(set.contains(&DataItem::Float64(f64::NAN)));
        assert_ne!(DataItem::Float64(0.0), DataItem::Float64(-0.0));
        assert_ne!(DataItem::Float32(1.0), DataItem::Float64(1.0));
    }

    #[test]
    fn embedded_cbor_is_decoded_on_demand() {
        let inner = DataItem::from(vec![DataItem::from(1), DataItem::from("x")]);
        let embedded = DataItem::embed(&inner);
        assert_eq!(embedded.as_tagged().map(|(t, _)| t), Some(tag::ENCODED_CBOR));
        assert_eq!(embedded.decode_embedded().unwrap().unwrap(), inner);

        let broken = DataItem::Tagged(tag::ENCODED_CBOR, Box::new(DataItem::from(vec![0xffu8])));
        assert!(broken.decode_embedded().unwrap().is_err());
        assert!(DataItem::from(1).decode_embedded().is_none());
    }

    #[test]
    fn content_accessors_join_chunks() {
        let bstr = DataItem::IndefiniteByteString(vec![vec![1, 2], vec![], vec![3]]);
        assert_eq!(bstr.byte_content(), Some(vec![1, 2, 3]));
        assert_eq!(bstr.as_bytes(), None);
        let tstr = DataItem::IndefiniteTextString(vec!["ab".into(), "c".into()]);
        assert_eq!(tstr.text_content().as_deref(), Some("abc"));
    }
}
