//! Conversions between external JSON scalars and native primitives.
//!
//! Rules: numbers convert to other numeric types with `as` semantics,
//! strings use the target's `FromStr` grammar, booleans map to `1`/`0`,
//! and strings become `true` only for a case-insensitive `"true"` or `"t"`.

use serde_json::{Number, Value as External};
use thiserror::Error;

/// Marshaling failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// No conversion exists between the two types.
    #[error("cannot convert {from} to {to}")]
    Unsupported { from: &'static str, to: &'static str },
    /// The textual form could not be parsed as the target type.
    #[error("cannot parse {input:?} as {to}: {reason}")]
    Parse {
        input: String,
        to: &'static str,
        reason: String,
    },
    /// JSON encoding or decoding failed.
    #[error("json conversion failed: {0}")]
    Json(String),
}

impl ConversionError {
    fn parse(input: &str, to: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            input: input.to_string(),
            to,
            reason: reason.to_string(),
        }
    }
}

/// Native types that can be read from and written to an external scalar.
pub trait Primitive: Sized + Clone + Send + Sync + 'static {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    fn from_number(number: &Number) -> Result<Self, ConversionError>;

    fn from_text(text: &str) -> Result<Self, ConversionError>;

    fn from_bool(value: bool) -> Result<Self, ConversionError>;

    /// Textual wire form.
    fn to_text(&self) -> String;
}

/// Converts an external value to `T`.
pub fn convert<T: Primitive>(external: &External) -> Result<T, ConversionError> {
    match external {
        External::String(text) => T::from_text(text),
        External::Number(number) => T::from_number(number),
        External::Bool(value) => T::from_bool(*value),
        other => Err(ConversionError::Unsupported {
            from: external_kind(other),
            to: T::TYPE_NAME,
        }),
    }
}

/// Short name of an external value's JSON kind.
pub(crate) fn external_kind(external: &External) -> &'static str {
    match external {
        External::Null => "null",
        External::Bool(_) => "boolean",
        External::Number(_) => "number",
        External::String(_) => "string",
        External::Array(_) => "array",
        External::Object(_) => "object",
    }
}

macro_rules! numeric_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_number(number: &Number) -> Result<Self, ConversionError> {
                    if let Some(value) = number.as_i64() {
                        Ok(value as $ty)
                    } else if let Some(value) = number.as_u64() {
                        Ok(value as $ty)
                    } else if let Some(value) = number.as_f64() {
                        Ok(value as $ty)
                    } else {
                        Err(ConversionError::Unsupported { from: "number", to: Self::TYPE_NAME })
                    }
                }

                fn from_text(text: &str) -> Result<Self, ConversionError> {
                    text.parse::<$ty>()
                        .map_err(|err| ConversionError::parse(text, Self::TYPE_NAME, err))
                }

                fn from_bool(value: bool) -> Result<Self, ConversionError> {
                    Ok(if value { 1 as $ty } else { 0 as $ty })
                }

                fn to_text(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

numeric_primitive!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Primitive for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_number(number: &Number) -> Result<Self, ConversionError> {
        number
            .as_f64()
            .map(|value| value != 0.0)
            .ok_or(ConversionError::Unsupported {
                from: "number",
                to: Self::TYPE_NAME,
            })
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        Ok(text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("t"))
    }

    fn from_bool(value: bool) -> Result<Self, ConversionError> {
        Ok(value)
    }

    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl Primitive for String {
    const TYPE_NAME: &'static str = "String";

    fn from_number(number: &Number) -> Result<Self, ConversionError> {
        Ok(number.to_string())
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        Ok(text.to_string())
    }

    fn from_bool(value: bool) -> Result<Self, ConversionError> {
        Ok(value.to_string())
    }

    fn to_text(&self) -> String {
        self.clone()
    }
}
