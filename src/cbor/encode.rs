use crate::bytes::ByteWriter;

use super::DataItem;

const BREAK: u8 = 0xff;
const INDEFINITE: u8 = 31;

/// Encodes a data item.
///
/// Arguments always use the shortest header form. Floats keep their stored width and
/// [DataItem::RawBytes] is copied as is.
pub fn encode(item: &DataItem) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    write_item(&mut writer, item);
    writer.into_bytes()
}

fn write_header(writer: &mut ByteWriter, major: u8, argument: u64) {
    let major = major << 5;
    if argument < 24 {
        writer.write_u8(major | argument as u8);
    } else if argument < 1 << 8 {
        writer.write_u8(major | 24).write_u8(argument as u8);
    } else if argument < 1 << 16 {
        writer.write_u8(major | 25).write_u16_be(argument as u16);
    } else if argument < 1 << 32 {
        writer.write_u8(major | 26).write_u32_be(argument as u32);
    } else {
        writer.write_u8(major | 27).write_u64_be(argument);
    }
}

fn write_item(writer: &mut ByteWriter, item: &DataItem) {
    match item {
        DataItem::UnsignedInt(v) => write_header(writer, 0, *v),
        DataItem::NegativeInt(n) => write_header(writer, 1, *n),
        DataItem::ByteString(bytes) => {
            write_header(writer, 2, bytes.len() as u64);
            writer.write_slice(bytes);
        }
        DataItem::IndefiniteByteString(chunks) => {
            writer.write_u8(2 << 5 | INDEFINITE);
            for chunk in chunks {
                write_header(writer, 2, chunk.len() as u64);
                writer.write_slice(chunk);
            }
            writer.write_u8(BREAK);
        }
        DataItem::TextString(text) => {
            write_header(writer, 3, text.len() as u64);
            writer.write_slice(text.as_bytes());
        }
        DataItem::IndefiniteTextString(chunks) => {
            writer.write_u8(3 << 5 | INDEFINITE);
            for chunk in chunks {
                write_header(writer, 3, chunk.len() as u64);
                writer.write_slice(chunk.as_bytes());
            }
            writer.write_u8(BREAK);
        }
        DataItem::Array { items, indefinite } => {
            if *indefinite {
                writer.write_u8(4 << 5 | INDEFINITE);
            } else {
                write_header(writer, 4, items.len() as u64);
            }
            for item in items {
                write_item(writer, item);
            }
            if *indefinite {
                writer.write_u8(BREAK);
            }
        }
        DataItem::Map {
            entries,
            indefinite,
        } => {
            if *indefinite {
                writer.write_u8(5 << 5 | INDEFINITE);
            } else {
                write_header(writer, 5, entries.len() as u64);
            }
            for (key, value) in entries {
                write_item(writer, key);
                write_item(writer, value);
            }
            if *indefinite {
                writer.write_u8(BREAK);
            }
        }
        DataItem::Tagged(tag, inner) => {
            write_header(writer, 6, *tag);
            write_item(writer, inner);
        }
        DataItem::Simple(v) if *v < 24 => {
            writer.write_u8(7 << 5 | v);
        }
        DataItem::Simple(v) => {
            writer.write_u8(7 << 5 | 24).write_u8(*v);
        }
        DataItem::Float32(v) => {
            writer.write_u8(7 << 5 | 26).write_u32_be(v.to_bits());
        }
        DataItem::Float64(v) => {
            writer.write_u8(7 << 5 | 27).write_u64_be(v.to_bits());
        }
        DataItem::RawBytes(bytes) => {
            writer.write_slice(bytes);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor::{decode, CborMap};

    #[test]
    fn header_thresholds() {
        let cases: &[(u64, &str)] = &[
            (0, "00"),
            (23, "17"),
            (24, "1818"),
            (255, "18ff"),
            (256, "190100"),
            (65535, "19ffff"),
            (65536, "1a00010000"),
            ((1 << 32) - 1, "1affffffff"),
            (1 << 32, "1b0000000100000000"),
            (u64::MAX, "1bffffffffffffffff"),
        ];
        for (value, expected) in cases {
            assert_eq!(hex::encode(encode(&DataItem::UnsignedInt(*value))), *expected);
        }
    }

    #[test]
    fn lengths_and_tags_use_the_same_thresholds() {
        assert_eq!(encode(&DataItem::from(vec![0u8; 24]))[..2], [0x58, 24]);
        assert_eq!(encode(&DataItem::from("x".repeat(256)))[..3], [0x79, 0x01, 0x00]);
        assert_eq!(
            encode(&DataItem::Tagged(1004, Box::new(DataItem::from("2024-01-01"))))[..3],
            [0xd9, 0x03, 0xec]
        );
        let items = vec![DataItem::NULL; 24];
        assert_eq!(encode(&DataItem::from(items))[..2], [0x98, 24]);
    }

    #[test]
    fn indefinite_forms_end_with_break() {
        let item = DataItem::IndefiniteByteString(vec![vec![0xaa; 5], vec![], vec![0xbb; 10]]);
        let bytes = encode(&item);
        assert_eq!(bytes[0], 0x5f);
        assert_eq!(bytes[1], 0x45);
        assert_eq!(bytes[7], 0x40);
        assert_eq!(bytes[8], 0x4a);
        assert_eq!(*bytes.last().unwrap(), 0xff);
        assert_eq!(bytes.len(), 1 + 6 + 1 + 11 + 1);
        assert_eq!(decode(&bytes).unwrap(), item);

        let mut entries = CborMap::new();
        entries.insert("a", DataItem::Array { items: vec![DataItem::from(1)], indefinite: true });
        let map = DataItem::Map { entries, indefinite: true };
        assert_eq!(hex::encode(encode(&map)), "bf61619f01ffff");
    }

    #[test]
    fn scalars() {
        assert_eq!(hex::encode(encode(&DataItem::from(-1))), "20");
        assert_eq!(hex::encode(encode(&DataItem::from(-500))), "3901f3");
        assert_eq!(hex::encode(encode(&DataItem::TRUE)), "f5");
        assert_eq!(hex::encode(encode(&DataItem::Simple(255))), "f8ff");
        assert_eq!(hex::encode(encode(&DataItem::Float32(1.5))), "fa3fc00000");
        assert_eq!(hex::encode(encode(&DataItem::Float64(1.1))), "fb3ff199999999999a");
        assert_eq!(
            encode(&DataItem::from(vec![DataItem::RawBytes(vec![0x18, 0x2a])])),
            vec![0x81, 0x18, 0x2a]
        );
    }
}
