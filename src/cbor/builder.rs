//! Fluent construction of nested maps and arrays.
//!
//! ```
//! use isomdl_proximity::cbor::DataItem;
//!
//! let engagement = DataItem::map()
//!     .put(0, "1.0")
//!     .put_array(2, |methods| methods.add_array(|m| m.add(2).add(1)))
//!     .end();
//! assert_eq!(engagement.to_string(), r#"{0: "1.0", 2: [[2, 1]]}"#);
//! ```

use super::{CborMap, DataItem};

impl DataItem {
    pub fn map() -> MapBuilder {
        MapBuilder::default()
    }

    pub fn array() -> ArrayBuilder {
        ArrayBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapBuilder {
    entries: CborMap,
    indefinite: bool,
}

impl MapBuilder {
    pub fn put(mut self, key: impl Into<DataItem>, value: impl Into<DataItem>) -> Self {
        self.entries.insert(key, value);
        self
    }

    pub fn put_map(
        self,
        key: impl Into<DataItem>,
        build: impl FnOnce(MapBuilder) -> MapBuilder,
    ) -> Self {
        let value = build(MapBuilder::default()).end();
        self.put(key, value)
    }

    pub fn put_array(
        self,
        key: impl Into<DataItem>,
        build: impl FnOnce(ArrayBuilder) -> ArrayBuilder,
    ) -> Self {
        let value = build(ArrayBuilder::default()).end();
        self.put(key, value)
    }

    pub fn put_tagged(self, key: impl Into<DataItem>, tag: u64, value: impl Into<DataItem>) -> Self {
        self.put(key, DataItem::Tagged(tag, Box::new(value.into())))
    }

    /// Puts `value` as embedded CBOR (tag 24).
    pub fn put_embedded(self, key: impl Into<DataItem>, value: &DataItem) -> Self {
        self.put(key, DataItem::embed(value))
    }

    /// Encodes the map with an indefinite length.
    pub fn indefinite(mut self) -> Self {
        self.indefinite = true;
        self
    }

    pub fn end(self) -> DataItem {
        DataItem::Map {
            entries: self.entries,
            indefinite: self.indefinite,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayBuilder {
    items: Vec<DataItem>,
    indefinite: bool,
}

impl ArrayBuilder {
    pub fn add(mut self, value: impl Into<DataItem>) -> Self {
        self.items.push(value.into());
        self
    }

    pub fn add_map(self, build: impl FnOnce(MapBuilder) -> MapBuilder) -> Self {
        let value = build(MapBuilder::default()).end();
        self.add(value)
    }

    pub fn add_array(self, build: impl FnOnce(ArrayBuilder) -> ArrayBuilder) -> Self {
        let value = build(ArrayBuilder::default()).end();
        self.add(value)
    }

    pub fn add_tagged(self, tag: u64, value: impl Into<DataItem>) -> Self {
        self.add(DataItem::Tagged(tag, Box::new(value.into())))
    }

    pub fn add_embedded(self, value: &DataItem) -> Self {
        self.add(DataItem::embed(value))
    }

    pub fn indefinite(mut self) -> Self {
        self.indefinite = true;
        self
    }

    pub fn end(self) -> DataItem {
        DataItem::Array {
            items: self.items,
            indefinite: self.indefinite,
        }
    }
}

impl From<MapBuilder> for DataItem {
    fn from(builder: MapBuilder) -> DataItem {
        builder.end()
    }
}

impl From<ArrayBuilder> for DataItem {
    fn from(builder: ArrayBuilder) -> DataItem {
        builder.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor::{encode, tag};

    #[test]
    fn builds_nested_indefinite_containers() {
        let item = DataItem::array()
            .indefinite()
            .add(1)
            .add_map(|m| m.indefinite().put("k", "v"))
            .end();
        assert_eq!(hex::encode(encode(&item)), "9f01bf616b6176ffff");
    }

    #[test]
    fn tags_and_embedding() {
        let inner = DataItem::map().put(1, 2).end();
        let item = DataItem::map()
            .put_tagged("date", tag::FULL_DATE, "2024-02-29")
            .put_embedded("e", &inner)
            .end();
        let map = item.as_map().unwrap();
        assert_eq!(map.get("date"), Some(&DataItem::full_date("2024-02-29")));
        assert_eq!(map.get("e").unwrap().decode_embedded().unwrap().unwrap(), inner);
    }

    #[test]
    fn later_puts_replace_earlier_ones() {
        let item = DataItem::map().put("a", 1).put("b", 2).put("a", 3).end();
        assert_eq!(item.to_string(), r#"{"a": 3, "b": 2}"#);
    }
}
