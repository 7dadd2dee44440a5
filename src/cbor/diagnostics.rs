//! RFC 8949 §8 diagnostic notation.

use std::fmt;

use super::decode::decode_nested;
use super::{tag, DataItem};

/// Compound values with fewer children than this may stay on one line in pretty mode.
const MAX_INLINE_CHILDREN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticOptions {
    /// Spread compound values over several lines with two-space indentation.
    pub pretty: bool,
    /// Print byte strings as `<N bytes>` instead of their content.
    pub bstr_length_only: bool,
    /// Print embedded CBOR (tag 24) as the item it contains.
    pub embedded_cbor: bool,
}

impl DataItem {
    pub fn to_diagnostics(&self, options: DiagnosticOptions) -> String {
        let mut printer = Printer {
            options,
            out: String::new(),
            depth: 0,
        };
        printer.item(self, 0);
        printer.out
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_diagnostics(DiagnosticOptions::default()))
    }
}

struct Printer {
    options: DiagnosticOptions,
    out: String,
    /// Items entered so far, embedded layers included. Bounds decoding of embedded CBOR.
    depth: usize,
}

impl Printer {
    fn item(&mut self, item: &DataItem, indent: usize) {
        self.depth += 1;
        self.render(item, indent);
        self.depth -= 1;
    }

    fn render(&mut self, item: &DataItem, indent: usize) {
        match item {
            DataItem::UnsignedInt(v) => self.out.push_str(&v.to_string()),
            DataItem::NegativeInt(n) => self.out.push_str(&(-1 - *n as i128).to_string()),
            DataItem::ByteString(bytes) => self.bstr(bytes),
            DataItem::IndefiniteByteString(chunks) => {
                self.out.push_str("(_ ");
                for (i, chunk) in chunks.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.bstr(chunk);
                }
                self.out.push(')');
            }
            DataItem::TextString(text) => self.tstr(text),
            DataItem::IndefiniteTextString(chunks) => {
                self.out.push_str("(_ ");
                for (i, chunk) in chunks.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.tstr(chunk);
                }
                self.out.push(')');
            }
            DataItem::Array { items, indefinite } => {
                let inline = self.fits_inline(items.len(), items.iter());
                self.container('[', ']', *indefinite, inline, indent, items, |p, item, indent| {
                    p.item(item, indent)
                });
            }
            DataItem::Map {
                entries,
                indefinite,
            } => {
                let inline = self.fits_inline(
                    entries.len(),
                    entries.iter().flat_map(|(k, v)| [k, v]),
                );
                let entries: Vec<_> = entries.iter().collect();
                self.container('{', '}', *indefinite, inline, indent, &entries, |p, (k, v), indent| {
                    p.item(k, indent);
                    p.out.push_str(": ");
                    p.item(v, indent);
                });
            }
            DataItem::Tagged(tag::ENCODED_CBOR, inner) if self.options.embedded_cbor => {
                match inner.as_ref() {
                    DataItem::ByteString(bytes) => {
                        self.out.push_str("24(<< ");
                        match decode_nested(bytes, self.depth) {
                            Ok(embedded) => self.item(&embedded, indent),
                            Err(e) => self.out.push_str(&format!("Error decoding CBOR: {e}")),
                        }
                        self.out.push_str(" >>)");
                    }
                    other => self.tagged(tag::ENCODED_CBOR, other, indent),
                }
            }
            DataItem::Tagged(tag, inner) => self.tagged(*tag, inner, indent),
            DataItem::Simple(v) => match item.as_bool() {
                Some(b) => self.out.push_str(&b.to_string()),
                None if item.is_null() => self.out.push_str("null"),
                None if item.is_undefined() => self.out.push_str("undefined"),
                None => self.out.push_str(&format!("simple({v})")),
            },
            DataItem::Float32(v) => self.float(*v as f64, v.is_nan(), v.to_string()),
            DataItem::Float64(v) => self.float(*v, v.is_nan(), v.to_string()),
            DataItem::RawBytes(bytes) => match decode_nested(bytes, self.depth - 1) {
                Ok(decoded) => self.item(&decoded, indent),
                Err(_) => self.out.push_str(&format!("h'{}'", hex::encode(bytes))),
            },
        }
    }

    fn tagged(&mut self, tag: u64, inner: &DataItem, indent: usize) {
        self.out.push_str(&format!("{tag}("));
        self.item(inner, indent);
        self.out.push(')');
    }

    fn bstr(&mut self, bytes: &[u8]) {
        if self.options.bstr_length_only {
            self.out.push_str(&format!("<{} bytes>", bytes.len()));
        } else {
            self.out.push_str(&format!("h'{}'", hex::encode(bytes)));
        }
    }

    fn tstr(&mut self, text: &str) {
        self.out.push('"');
        for c in text.chars() {
            match c {
                '\\' => self.out.push_str("\\\\"),
                '"' => self.out.push_str("\\\""),
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn float(&mut self, value: f64, is_nan: bool, rendered: String) {
        if is_nan {
            self.out.push_str("NaN");
        } else if value.is_infinite() {
            self.out
                .push_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
        } else {
            self.out.push_str(&rendered);
            if !rendered.contains('.') {
                self.out.push_str(".0");
            }
        }
    }

    fn fits_inline<'a>(&self, count: usize, mut children: impl Iterator<Item = &'a DataItem>) -> bool {
        !self.options.pretty
            || (count < MAX_INLINE_CHILDREN && children.all(|child| !child.is_compound()))
    }

    #[allow(clippy::too_many_arguments)]
    fn container<T>(
        &mut self,
        open: char,
        close: char,
        indefinite: bool,
        inline: bool,
        indent: usize,
        children: &[T],
        mut child: impl FnMut(&mut Self, &T, usize),
    ) {
        self.out.push(open);
        if indefinite {
            self.out.push_str("_ ");
        }
        if inline || children.is_empty() {
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                child(self, c, indent);
            }
        } else {
            let inner = indent + 2;
            for (i, c) in children.iter().enumerate() {
                self.out.push_str(if i > 0 { ",\n" } else { "\n" });
                self.out.push_str(&" ".repeat(inner));
                child(self, c, inner);
            }
            self.out.push('\n');
            self.out.push_str(&" ".repeat(indent));
        }
        self.out.push(close);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor::{CborMap, MAX_NESTING_DEPTH};

    fn pretty() -> DiagnosticOptions {
        DiagnosticOptions {
            pretty: true,
            ..Default::default()
        }
    }

    #[test]
    fn scalars() {
        assert_eq!(DataItem::from(42).to_string(), "42");
        assert_eq!(DataItem::NegativeInt(u64::MAX).to_string(), "-18446744073709551616");
        assert_eq!(DataItem::from(vec![1u8, 0xab]).to_string(), "h'01ab'");
        assert_eq!(DataItem::from("a\"b\\c").to_string(), r#""a\"b\\c""#);
        assert_eq!(DataItem::Float64(1.0).to_string(), "1.0");
        assert_eq!(DataItem::Float32(-2.5).to_string(), "-2.5");
        assert_eq!(DataItem::Float32(f32::NAN).to_string(), "NaN");
        assert_eq!(DataItem::Float64(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(DataItem::Float32(f32::INFINITY).to_string(), "Infinity");
        assert_eq!(DataItem::UNDEFINED.to_string(), "undefined");
        assert_eq!(DataItem::FALSE.to_string(), "false");
        assert_eq!(DataItem::Simple(99).to_string(), "simple(99)");
    }

    #[test]
    fn indefinite_forms() {
        let bstr = DataItem::IndefiniteByteString(vec![vec![1], vec![2, 3]]);
        assert_eq!(bstr.to_string(), "(_ h'01', h'0203')");
        let tstr = DataItem::IndefiniteTextString(vec!["ab".into(), "c".into()]);
        assert_eq!(tstr.to_string(), r#"(_ "ab", "c")"#);
        let array = DataItem::Array {
            items: vec![DataItem::from(1), DataItem::from(2)],
            indefinite: true,
        };
        assert_eq!(array.to_string(), "[_ 1, 2]");
    }

    #[test]
    fn compact_nesting() {
        let item = DataItem::map()
            .put("a", 1)
            .put_array("b", |a| a.add(true).add(DataItem::NULL))
            .end();
        assert_eq!(item.to_string(), r#"{"a": 1, "b": [true, null]}"#);
        assert_eq!(DataItem::tdate("2024-01-01T00:00:00Z").to_string(), r#"0("2024-01-01T00:00:00Z")"#);
    }

    #[test]
    fn pretty_breaks_compound_children() {
        let item = DataItem::map()
            .put("a", 1)
            .put_array("b", |a| a.add(1).add(2))
            .end();
        assert_eq!(
            item.to_diagnostics(pretty()),
            "{\n  \"a\": 1,\n  \"b\": [1, 2]\n}"
        );

        let long: Vec<DataItem> = (0..8).map(DataItem::from).collect();
        assert_eq!(
            DataItem::from(long).to_diagnostics(pretty()),
            "[\n  0,\n  1,\n  2,\n  3,\n  4,\n  5,\n  6,\n  7\n]"
        );
        let short: Vec<DataItem> = (0..7).map(DataItem::from).collect();
        assert_eq!(
            DataItem::from(short).to_diagnostics(pretty()),
            "[0, 1, 2, 3, 4, 5, 6]"
        );
        assert_eq!(DataItem::from(CborMap::new()).to_diagnostics(pretty()), "{}");
    }

    #[test]
    fn byte_lengths_only() {
        let options = DiagnosticOptions {
            bstr_length_only: true,
            ..Default::default()
        };
        assert_eq!(DataItem::from(vec![0u8; 32]).to_diagnostics(options), "<32 bytes>");
    }

    #[test]
    fn embedded_cbor() {
        let options = DiagnosticOptions {
            embedded_cbor: true,
            ..Default::default()
        };
        let embedded = DataItem::embed(&DataItem::from(vec![DataItem::from(1)]));
        assert_eq!(embedded.to_diagnostics(options), "24(<< [1] >>)");
        assert_eq!(embedded.to_string(), "24(h'8101')");

        let broken = DataItem::Tagged(24, Box::new(DataItem::from(vec![0x82u8, 0x01])));
        let rendered = broken.to_diagnostics(options);
        assert!(rendered.starts_with("24(<< Error decoding CBOR: "), "{rendered}");
        assert!(rendered.ends_with(" >>)"));
    }

    #[test]
    fn embedded_layers_count_towards_the_nesting_limit() {
        let options = DiagnosticOptions {
            embedded_cbor: true,
            ..Default::default()
        };
        let mut item = DataItem::from(0);
        for _ in 0..MAX_NESTING_DEPTH + 50 {
            item = DataItem::embed(&item);
        }
        let rendered = item.to_diagnostics(options);
        assert_eq!(rendered.matches("24(<< ").count(), MAX_NESTING_DEPTH + 1);
        assert_eq!(rendered.matches("Error decoding CBOR").count(), 1);
        assert!(rendered.ends_with(&" >>)".repeat(MAX_NESTING_DEPTH + 1)));

        let mut shallow = DataItem::from(0);
        for _ in 0..10 {
            shallow = DataItem::embed(&shallow);
        }
        let rendered = shallow.to_diagnostics(options);
        assert_eq!(rendered, format!("{}0{}", "24(<< ".repeat(10), " >>)".repeat(10)));
    }

    #[test]
    fn raw_bytes_render_decoded() {
        assert_eq!(DataItem::RawBytes(vec![0x82, 0x01, 0x02]).to_string(), "[1, 2]");
        assert_eq!(DataItem::RawBytes(vec![0x82, 0x01]).to_string(), "h'8201'");
    }
}
