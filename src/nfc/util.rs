use std::fmt;

pub trait IntoRaw<T: Clone> {
    fn into_raw(self) -> T;
}

/// A wire value that is either one this crate names or a raw value it passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownOrRaw<TU: Clone, TK: IntoRaw<TU>> {
    Known(TK),
    Unknown(TU),
}

impl<TU: Clone, TK: IntoRaw<TU>> KnownOrRaw<TU, TK> {
    pub fn known(&self) -> Option<&TK> {
        match self {
            KnownOrRaw::Known(known) => Some(known),
            KnownOrRaw::Unknown(_) => None,
        }
    }
}

impl<TU: Clone, TK: IntoRaw<TU>> IntoRaw<TU> for KnownOrRaw<TU, TK> {
    fn into_raw(self) -> TU {
        match self {
            KnownOrRaw::Known(known) => known.into_raw(),
            KnownOrRaw::Unknown(raw) => raw,
        }
    }
}

impl<TU: Clone, TK: IntoRaw<TU> + TryFrom<TU>> From<TU> for KnownOrRaw<TU, TK> {
    fn from(raw: TU) -> Self {
        match TK::try_from(raw.clone()) {
            Ok(known) => KnownOrRaw::Known(known),
            Err(_) => KnownOrRaw::Unknown(raw),
        }
    }
}

/// Implements [IntoRaw] and `TryFrom<$backing>` for a fieldless enum with explicit
/// discriminants. The enum must derive [strum_macros::EnumIter].
macro_rules! impl_partial_enum {
    ($enum_name:ty, $backing:ty) => {
        impl $crate::nfc::util::IntoRaw<$backing> for $enum_name {
            fn into_raw(self) -> $backing {
                self as $backing
            }
        }
        impl TryFrom<$backing> for $enum_name {
            type Error = ();
            fn try_from(raw: $backing) -> Result<Self, Self::Error> {
                use ::strum::IntoEnumIterator;
                use $crate::nfc::util::IntoRaw;
                Self::iter().find(|&v| v.into_raw() == raw).ok_or(())
            }
        }
    };
}

pub(crate) use impl_partial_enum;

/// Formats a byte slice as upper-case hex, for log lines.
pub struct DisplayBytesAsHex<'a>(&'a [u8]);

impl fmt::Debug for DisplayBytesAsHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Display for DisplayBytesAsHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<'a> From<&'a [u8]> for DisplayBytesAsHex<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        DisplayBytesAsHex(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for DisplayBytesAsHex<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        DisplayBytesAsHex(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter)]
    #[repr(u8)]
    enum Color {
        Red = 1,
        Blue = 7,
    }
    impl_partial_enum!(Color, u8);

    #[test]
    fn known_or_raw_keeps_unknown_values() {
        let known: KnownOrRaw<u8, Color> = 7u8.into();
        assert_eq!(known, KnownOrRaw::Known(Color::Blue));
        assert_eq!(known.into_raw(), 7);

        let unknown: KnownOrRaw<u8, Color> = 3u8.into();
        assert_eq!(unknown, KnownOrRaw::Unknown(3));
        assert_eq!(unknown.known(), None);
        assert_eq!(Color::try_from(1u8), Ok(Color::Red));
    }

    #[test]
    fn hex_display() {
        assert_eq!(DisplayBytesAsHex::from(&[0x0a, 0xff][..]).to_string(), "0AFF");
    }
}
