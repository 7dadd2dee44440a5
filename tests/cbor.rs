use hex_literal::hex;
use isomdl_proximity::cbor::{self, DataItem};
use serde::{Deserialize, Serialize};

fn device_engagement() -> DataItem {
    DataItem::map()
        .put(0, "1.0")
        .put_array(1, |a| {
            a.add(1)
                .add(DataItem::embed(
                    &DataItem::map()
                        .put(1, 2)
                        .put(-1, 1)
                        .put(-2, vec![0xAB; 32])
                        .put(-3, vec![0xCD; 32])
                        .end(),
                ))
        })
        .put_array(2, |a| {
            a.add_array(|m| {
                m.add(2).add(1).add_map(|o| {
                    o.put(0, false)
                        .put(1, true)
                        .put(11, vec![0x11; 16])
                })
            })
        })
        .end()
}

#[test]
fn definite_tree_round_trips_byte_exact() {
    let item = device_engagement();
    let bytes = item.encode();
    let decoded = cbor::decode(&bytes).unwrap();
    assert_eq!(decoded, item);
    assert_eq!(decoded.encode(), bytes);

    let (used, again) = cbor::decode_at(&[&bytes[..], &[0xff, 0xff]].concat(), 0).unwrap();
    assert_eq!(used, bytes.len());
    assert_eq!(again, item);
}

#[test]
fn argument_thresholds() {
    let cases: [(u64, Vec<u8>); 8] = [
        (23, hex!("17").to_vec()),
        (24, hex!("1818").to_vec()),
        (255, hex!("18ff").to_vec()),
        (256, hex!("190100").to_vec()),
        (65535, hex!("19ffff").to_vec()),
        (65536, hex!("1a00010000").to_vec()),
        (u32::MAX as u64, hex!("1affffffff").to_vec()),
        (1 << 32, hex!("1b0000000100000000").to_vec()),
    ];
    for (value, expected) in cases {
        let encoded = DataItem::from(value).encode();
        assert_eq!(encoded, expected, "value {value}");
        assert_eq!(cbor::decode(&encoded).unwrap(), DataItem::from(value));
    }
}

#[test]
fn indefinite_chunks_are_preserved() {
    let chunks = vec![vec![0x01; 5], vec![], vec![0x02; 10]];
    let item = DataItem::IndefiniteByteString(chunks.clone());
    let bytes = item.encode();
    assert_eq!(bytes[0], 0x5f);
    assert_eq!(*bytes.last().unwrap(), 0xff);

    let decoded = cbor::decode(&bytes).unwrap();
    assert_eq!(decoded, DataItem::IndefiniteByteString(chunks));
    assert_eq!(decoded.encode(), bytes);
    assert_eq!(decoded.byte_content().unwrap().len(), 15);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Retrieval {
    version: String,
    methods: Vec<u32>,
}

#[test]
fn serde_values_bridge_through_data_items() {
    let value = Retrieval {
        version: "1.0".to_string(),
        methods: vec![1, 2],
    };
    let bytes = cbor::to_vec(&value).unwrap();
    let item = cbor::decode(&bytes).unwrap();
    assert_eq!(item.as_map().unwrap().get("version").unwrap().as_text(), Some("1.0"));
    assert_eq!(cbor::from_data_item::<Retrieval>(&item).unwrap(), value);
    assert_eq!(cbor::from_slice::<Retrieval>(&bytes).unwrap(), value);
}

#[test]
fn nested_builders_and_typed_accessors() {
    let inner = DataItem::map().put("k", 1).end();
    let item = DataItem::map()
        .put_map("status", |m| m.put("code", 0).put("ratio", 1.5f64))
        .put_array("extra", |a| {
            a.add_tagged(cbor::tag::POSITIVE_BIGNUM, vec![0x01, 0x00])
                .add_embedded(&inner)
        })
        .end();
    let decoded = cbor::decode(&cbor::encode(&item)).unwrap();
    assert_eq!(decoded, item);
    assert_eq!(decoded.major_type(), Some(5));
    assert_eq!(decoded.type_name(), "map");

    let entries = decoded.as_map().unwrap();
    let status = entries.get("status").unwrap();
    let ratio = status.as_map().unwrap().get("ratio").unwrap();
    assert_eq!(ratio.as_f64(), Some(1.5));
    assert_eq!(ratio.type_name(), "float");

    let extra = entries.get("extra").unwrap().as_array().unwrap();
    assert_eq!(extra[0].as_bignum(), Some((false, &[0x01, 0x00][..])));
    assert_eq!(extra[0].major_type(), Some(6));
    assert_eq!(extra[1].decode_embedded().unwrap().unwrap(), inner);
    assert_eq!(DataItem::NULL.type_name(), "null");
}
