//! Shadow values and elements.

use core::fmt;

use heapless::String;
use serde::de::{self, DeserializeSeed, Deserializer, Visitor};
use serde::{Serialize, Serializer};

use crate::error::ShadowError;

/// Maximum length of a shadow element key.
pub const SHADOW_KEY_LEN: usize = 16;

/// Maximum length of a text shadow value.
pub const SHADOW_TEXT_LEN: usize = 24;

/// A typed shadow value.
#[derive(Debug, Clone, PartialEq)]
pub enum ShadowValue {
    Integer(i32),
    Float(f32),
    Text(String<SHADOW_TEXT_LEN>),
}

/// The declared type of a [`ShadowValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueKind {
    Integer,
    Float,
    Text,
}

impl ShadowValue {
    /// Builds a text value, failing if `text` does not fit.
    pub fn text(text: &str) -> Result<Self, ShadowError> {
        let mut owned = String::new();
        owned
            .push_str(text)
            .map_err(|_| ShadowError::ValueTooLong)?;
        Ok(ShadowValue::Text(owned))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ShadowValue::Integer(_) => ValueKind::Integer,
            ShadowValue::Float(_) => ValueKind::Float,
            ShadowValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            ShadowValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ShadowValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ShadowValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl Serialize for ShadowValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ShadowValue::Integer(v) => serializer.serialize_i32(*v),
            ShadowValue::Float(v) if v.is_finite() => serializer.serialize_f32(*v),
            ShadowValue::Float(_) => serializer.serialize_none(),
            ShadowValue::Text(v) => serializer.serialize_str(v),
        }
    }
}

/// Reads one cloud-supplied value as the declared `kind`.
///
/// `null` yields `None`. Integers are accepted for float elements; anything
/// else that does not match the kind is a type error.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValueSeed(pub ValueKind);

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = Option<ShadowValue>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_option(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = Option<ShadowValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {:?} shadow value or null", self.0)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        let typed = Typed(self.0);
        let value = match self.0 {
            ValueKind::Integer => deserializer.deserialize_i32(typed)?,
            ValueKind::Float => deserializer.deserialize_f32(typed)?,
            ValueKind::Text => deserializer.deserialize_str(typed)?,
        };
        Ok(Some(value))
    }
}

struct Typed(ValueKind);

impl<'de> Visitor<'de> for Typed {
    type Value = ShadowValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {:?} shadow value", self.0)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        match self.0 {
            ValueKind::Integer => i32::try_from(v)
                .map(ShadowValue::Integer)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self)),
            ValueKind::Float => Ok(ShadowValue::Float(v as f32)),
            ValueKind::Text => Err(E::invalid_type(de::Unexpected::Signed(v), &self)),
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        match self.0 {
            ValueKind::Integer => i32::try_from(v)
                .map(ShadowValue::Integer)
                .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            ValueKind::Float => Ok(ShadowValue::Float(v as f32)),
            ValueKind::Text => Err(E::invalid_type(de::Unexpected::Unsigned(v), &self)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        match self.0 {
            ValueKind::Float => Ok(ShadowValue::Float(v as f32)),
            _ => Err(E::invalid_type(de::Unexpected::Float(v), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match self.0 {
            ValueKind::Text => String::try_from(v)
                .map(ShadowValue::Text)
                .map_err(|_| E::invalid_length(v.len(), &self)),
            _ => Err(E::invalid_type(de::Unexpected::Str(v), &self)),
        }
    }
}

impl From<i32> for ShadowValue {
    fn from(v: i32) -> Self {
        ShadowValue::Integer(v)
    }
}

impl From<f32> for ShadowValue {
    fn from(v: f32) -> Self {
        ShadowValue::Float(v)
    }
}

/// Which section(s) of the shadow document an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateKind {
    Desired,
    #[default]
    Reported,
    Both,
}

impl UpdateKind {
    pub fn includes_desired(self) -> bool {
        matches!(self, UpdateKind::Desired | UpdateKind::Both)
    }

    pub fn includes_reported(self) -> bool {
        matches!(self, UpdateKind::Reported | UpdateKind::Both)
    }
}

/// One key of a shadow table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowElement {
    key: String<SHADOW_KEY_LEN>,
    value: ShadowValue,
    needs_publish: bool,
    update_kind: UpdateKind,
    pending: bool,
}

impl ShadowElement {
    /// Declares an element. Its type is fixed by the initial `value`.
    pub fn new(key: &str, value: ShadowValue) -> Result<Self, ShadowError> {
        if key.is_empty() {
            return Err(ShadowError::KeyTooLong);
        }
        let mut owned = String::new();
        owned.push_str(key).map_err(|_| ShadowError::KeyTooLong)?;
        Ok(Self {
            key: owned,
            value,
            needs_publish: false,
            update_kind: UpdateKind::Reported,
            pending: false,
        })
    }

    /// Publishes the initial value on the first connection, into the
    /// section(s) selected by `kind`.
    pub fn publish_on_connect(mut self, kind: UpdateKind) -> Self {
        self.needs_publish = true;
        self.update_kind = kind;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &ShadowValue {
        &self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// `true` while the element waits to be serialized into an update.
    pub fn needs_publish(&self) -> bool {
        self.needs_publish
    }

    pub fn update_kind(&self) -> UpdateKind {
        self.update_kind
    }

    /// `true` after a delta changed the value and before the device reported
    /// it back.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn set_from_delta(&mut self, value: ShadowValue) {
        self.value = value;
        self.pending = true;
    }

    pub(crate) fn set_from_device(&mut self, value: ShadowValue, kind: UpdateKind) {
        self.value = value;
        self.needs_publish = true;
        self.update_kind = kind;
        if kind.includes_reported() {
            self.pending = false;
        }
    }

    pub(crate) fn clear_publish(&mut self) {
        self.needs_publish = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(kind: ValueKind, json: &str) -> Option<Option<ShadowValue>> {
        let mut scratch = [0u8; 64];
        let mut de = serde_json_core::de::Deserializer::new(json.as_bytes(), Some(&mut scratch[..]));
        ValueSeed(kind).deserialize(&mut de).ok()
    }

    #[test]
    fn json_values_coerce_to_declared_kind() {
        assert_eq!(read(ValueKind::Integer, "42"), Some(Some(ShadowValue::Integer(42))));
        assert_eq!(read(ValueKind::Integer, "-3"), Some(Some(ShadowValue::Integer(-3))));
        assert_eq!(read(ValueKind::Float, "2"), Some(Some(ShadowValue::Float(2.0))));
        assert_eq!(read(ValueKind::Float, "0.75"), Some(Some(ShadowValue::Float(0.75))));
        assert_eq!(read(ValueKind::Text, r#""BLUE""#), Some(Some(ShadowValue::text("BLUE").unwrap())));
        assert_eq!(read(ValueKind::Text, r#""R\"D""#), Some(Some(ShadowValue::text("R\"D").unwrap())));
        assert_eq!(read(ValueKind::Integer, "null"), Some(None));

        assert_eq!(read(ValueKind::Integer, r#""1""#), None);
        assert_eq!(read(ValueKind::Integer, "true"), None);
        assert_eq!(read(ValueKind::Integer, "4294967296"), None);
        assert_eq!(read(ValueKind::Text, "7"), None);
        assert_eq!(read(ValueKind::Text, r#""a string that is far too long""#), None);
    }

    #[test]
    fn values_render_as_json() {
        let mut out = [0u8; 64];
        let values = [
            ShadowValue::Integer(-7),
            ShadowValue::Float(1.5),
            ShadowValue::Float(f32::NAN),
            ShadowValue::text("R\"D").unwrap(),
        ];
        let n = serde_json_core::to_slice(&values.as_slice(), &mut out).unwrap();
        assert_eq!(&out[..n], br#"[-7,1.5,null,"R\"D"]"#);
    }

    #[test]
    fn reported_update_clears_pending_marker() {
        let mut led = ShadowElement::new("LED", ShadowValue::Integer(0)).unwrap();
        led.set_from_delta(ShadowValue::Integer(1));
        assert!(led.is_pending());

        led.set_from_device(ShadowValue::Integer(1), UpdateKind::Desired);
        assert!(led.is_pending());
        assert!(led.needs_publish());

        led.set_from_device(ShadowValue::Integer(1), UpdateKind::Reported);
        assert!(!led.is_pending());
        assert_eq!(led.update_kind(), UpdateKind::Reported);
    }

    #[test]
    fn element_keys_are_bounded() {
        assert_eq!(
            ShadowElement::new("a_key_longer_than_16", ShadowValue::Integer(0)).unwrap_err(),
            ShadowError::KeyTooLong
        );
        let el = ShadowElement::new("fw_ver", ShadowValue::text("1.0.0").unwrap())
            .unwrap()
            .publish_on_connect(UpdateKind::Both);
        assert!(el.needs_publish());
        assert_eq!(el.kind(), ValueKind::Text);
    }
}
