//! Pluggable conversion between a value's external and native forms.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as External;

use crate::typecast::{self, ConversionError, Primitive};

/// Converts values of type `V` to and from the provider representation.
pub trait Marshaler<V>: Send + Sync {
    fn unmarshal(&self, external: &External) -> Result<V, ConversionError>;

    fn marshal(&self, value: &V) -> Result<External, ConversionError>;
}

/// Marshaler for scalar types; writes use the textual form.
pub struct PrimitiveMarshaler<V> {
    _target: PhantomData<fn() -> V>,
}

impl<V> PrimitiveMarshaler<V> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<V> Default for PrimitiveMarshaler<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Primitive> fmt::Debug for PrimitiveMarshaler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimitiveMarshaler<{}>", V::TYPE_NAME)
    }
}

impl<V: Primitive> Marshaler<V> for PrimitiveMarshaler<V> {
    fn unmarshal(&self, external: &External) -> Result<V, ConversionError> {
        typecast::convert(external)
    }

    fn marshal(&self, value: &V) -> Result<External, ConversionError> {
        Ok(External::String(value.to_text()))
    }
}

/// Marshaler for structured values stored as JSON documents.
///
/// Key/value stores usually hold strings, so a string payload is parsed
/// as JSON text; any other payload is decoded directly. Writes always
/// produce JSON text.
pub struct JsonMarshaler<V> {
    _target: PhantomData<fn() -> V>,
}

impl<V> JsonMarshaler<V> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<V> Default for JsonMarshaler<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for JsonMarshaler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonMarshaler")
    }
}

impl<V> Marshaler<V> for JsonMarshaler<V>
where
    V: Serialize + DeserializeOwned,
{
    fn unmarshal(&self, external: &External) -> Result<V, ConversionError> {
        let decoded = match external {
            External::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        decoded.map_err(|err| ConversionError::Json(err.to_string()))
    }

    fn marshal(&self, value: &V) -> Result<External, ConversionError> {
        serde_json::to_string(value)
            .map(External::String)
            .map_err(|err| ConversionError::Json(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Limits {
        burst: u32,
        rate: f64,
    }

    #[test]
    fn primitive_marshaler_writes_text() {
        let marshaler = PrimitiveMarshaler::<i32>::new();
        assert_eq!(marshaler.marshal(&5000).unwrap(), json!("5000"));
        assert_eq!(marshaler.unmarshal(&json!("5000")).unwrap(), 5000);
        assert_eq!(format!("{marshaler:?}"), "PrimitiveMarshaler<i32>");
    }

    #[test]
    fn json_marshaler_reads_text_and_native_payloads() {
        let marshaler = JsonMarshaler::<Limits>::new();
        let expected = Limits {
            burst: 10,
            rate: 2.5,
        };
        assert_eq!(
            marshaler
                .unmarshal(&json!(r#"{"burst":10,"rate":2.5}"#))
                .unwrap(),
            expected
        );
        assert_eq!(
            marshaler
                .unmarshal(&json!({"burst": 10, "rate": 2.5}))
                .unwrap(),
            expected
        );
        assert_eq!(
            marshaler.marshal(&expected).unwrap(),
            json!(r#"{"burst":10,"rate":2.5}"#)
        );
    }

    #[test]
    fn json_marshaler_reports_malformed_documents() {
        let marshaler = JsonMarshaler::<Limits>::new();
        assert!(matches!(
            marshaler.unmarshal(&json!("{not json")),
            Err(ConversionError::Json(_))
        ));
    }
}
