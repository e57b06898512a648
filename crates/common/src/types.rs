//! Logical and native value types
//!
//! The staging layer reasons about cells in terms of a small set of logical
//! types. The store persists them as native types; a column may carry an
//! explicit [`StoreTypeOverride`] choosing the native type, byte order,
//! string length and how doubles are narrowed to integers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Boolean,
    Int,
    Long,
    Double,
    String,
}

impl LogicalType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Double)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// Types the store can persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
}

impl NativeType {
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Whether values of `logical` can be stored as this native type
    pub fn accepts(&self, logical: LogicalType) -> bool {
        match logical {
            LogicalType::String => matches!(self, Self::String),
            LogicalType::Boolean => self.is_integer(),
            LogicalType::Int | LogicalType::Long | LogicalType::Double => {
                self.is_integer() || self.is_float() || matches!(self, Self::String)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringLength {
    #[default]
    Variable,
    Fixed(usize),
}

/// How doubles are narrowed when written to an integer native type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    HalfAwayFromZero,
    Floor,
    Ceil,
    Truncate,
}

impl RoundingMode {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::HalfAwayFromZero => value.round(),
            Self::Floor => value.floor(),
            Self::Ceil => value.ceil(),
            Self::Truncate => value.trunc(),
        }
    }
}

/// Explicit native representation of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreTypeOverride {
    pub native: NativeType,
    #[serde(default)]
    pub endianness: Endianness,
    #[serde(default)]
    pub length: StringLength,
    #[serde(default)]
    pub rounding: RoundingMode,
}

impl StoreTypeOverride {
    pub fn new(native: NativeType) -> Self {
        Self {
            native,
            endianness: Endianness::default(),
            length: StringLength::default(),
            rounding: RoundingMode::default(),
        }
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_length(mut self, length: StringLength) -> Self {
        self.length = length;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Default representation for a logical type
    pub fn default_for(logical: LogicalType) -> Self {
        Self::new(default_native(logical))
    }
}

/// Logical type a native type reads back as
pub fn map_type(native: NativeType) -> LogicalType {
    match native {
        NativeType::Int8 | NativeType::Int16 | NativeType::Int32 => LogicalType::Int,
        NativeType::Int64 => LogicalType::Long,
        NativeType::Float32 | NativeType::Float64 => LogicalType::Double,
        NativeType::String => LogicalType::String,
    }
}

/// Native type used when no override is given
pub fn default_native(logical: LogicalType) -> NativeType {
    match logical {
        LogicalType::Boolean => NativeType::Int8,
        LogicalType::Int => NativeType::Int32,
        LogicalType::Long => NativeType::Int64,
        LogicalType::Double => NativeType::Float64,
        LogicalType::String => NativeType::String,
    }
}

/// A single cell or attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

impl Value {
    /// Best guess of the logical type of a literal
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Self::Missing => None,
            Self::Bool(_) => Some(LogicalType::Boolean),
            Self::Int(v) if i32::try_from(*v).is_ok() => Some(LogicalType::Int),
            Self::Int(_) => Some(LogicalType::Long),
            Self::Double(_) => Some(LogicalType::Double),
            Self::Str(_) => Some(LogicalType::String),
        }
    }

    /// Rough in-memory size, used for progress accounting of large values
    pub fn size_hint(&self) -> usize {
        match self {
            Self::Str(s) => s.len(),
            _ => 8,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("?"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("value {value} does not fit into {native:?}")]
    OutOfRange { value: String, native: NativeType },
    #[error("value {value} cannot be stored as {native:?}")]
    Incompatible { value: String, native: NativeType },
}

/// Convert a value into the representation the store keeps for `ty`
pub fn coerce(value: &Value, ty: &StoreTypeOverride) -> Result<Value, CoercionError> {
    let out_of_range = || CoercionError::OutOfRange {
        value: value.to_string(),
        native: ty.native,
    };
    let incompatible = || CoercionError::Incompatible {
        value: value.to_string(),
        native: ty.native,
    };

    match (value, ty.native) {
        (Value::Missing, _) => Ok(Value::Missing),
        (Value::Bool(b), native) if native.is_integer() => Ok(Value::Int(i64::from(*b))),
        (Value::Int(v), native) if native.is_integer() => {
            check_int_range(*v, native).map(Value::Int).ok_or_else(out_of_range)
        }
        (Value::Int(v), NativeType::Float32) => Ok(Value::Double(f64::from(*v as f32))),
        (Value::Int(v), NativeType::Float64) => Ok(Value::Double(*v as f64)),
        (Value::Double(v), native) if native.is_integer() => {
            let rounded = ty.rounding.apply(*v);
            if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
                return Err(out_of_range());
            }
            check_int_range(rounded as i64, native)
                .map(Value::Int)
                .ok_or_else(out_of_range)
        }
        (Value::Double(v), NativeType::Float32) => Ok(Value::Double(f64::from(*v as f32))),
        (Value::Double(v), NativeType::Float64) => Ok(Value::Double(*v)),
        (Value::Str(s), NativeType::String) => Ok(Value::Str(fit_length(s, ty.length))),
        (Value::Int(_) | Value::Double(_), NativeType::String) => {
            Ok(Value::Str(fit_length(&value.to_string(), ty.length)))
        }
        _ => Err(incompatible()),
    }
}

fn check_int_range(value: i64, native: NativeType) -> Option<i64> {
    let fits = match native {
        NativeType::Int8 => i8::try_from(value).is_ok(),
        NativeType::Int16 => i16::try_from(value).is_ok(),
        NativeType::Int32 => i32::try_from(value).is_ok(),
        _ => true,
    };
    fits.then_some(value)
}

fn fit_length(s: &str, length: StringLength) -> String {
    match length {
        StringLength::Variable => s.to_string(),
        StringLength::Fixed(max) => {
            let mut end = max.min(s.len());
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            s[..end].to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_type_round_trips_defaults() {
        for logical in [
            LogicalType::Int,
            LogicalType::Long,
            LogicalType::Double,
            LogicalType::String,
        ] {
            assert_eq!(map_type(default_native(logical)), logical);
        }
        // booleans are stored as small integers
        assert_eq!(map_type(default_native(LogicalType::Boolean)), LogicalType::Int);
    }

    #[test]
    fn test_accepts() {
        assert!(NativeType::String.accepts(LogicalType::String));
        assert!(!NativeType::Int32.accepts(LogicalType::String));
        assert!(NativeType::Int8.accepts(LogicalType::Boolean));
        assert!(!NativeType::Float64.accepts(LogicalType::Boolean));
        assert!(NativeType::Int16.accepts(LogicalType::Double));
    }

    #[test]
    fn test_coerce_rounding() {
        let ty = StoreTypeOverride::new(NativeType::Int32);
        assert_eq!(coerce(&Value::Double(2.5), &ty).unwrap(), Value::Int(3));
        let floor = ty.with_rounding(RoundingMode::Floor);
        assert_eq!(coerce(&Value::Double(2.5), &floor).unwrap(), Value::Int(2));
        let ceil = ty.with_rounding(RoundingMode::Ceil);
        assert_eq!(coerce(&Value::Double(-2.5), &ceil).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_coerce_out_of_range() {
        let ty = StoreTypeOverride::new(NativeType::Int8);
        assert!(coerce(&Value::Int(127), &ty).is_ok());
        assert!(matches!(
            coerce(&Value::Int(128), &ty),
            Err(CoercionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_coerce_fixed_length_string() {
        let ty = StoreTypeOverride::new(NativeType::String).with_length(StringLength::Fixed(3));
        assert_eq!(
            coerce(&Value::Str("abcdef".into()), &ty).unwrap(),
            Value::Str("abc".into())
        );
        // never split a multi-byte character
        assert_eq!(
            coerce(&Value::Str("aé".into()), &StoreTypeOverride::new(NativeType::String).with_length(StringLength::Fixed(2))).unwrap(),
            Value::Str("a".into())
        );
    }

    #[test]
    fn test_coerce_incompatible() {
        let ty = StoreTypeOverride::new(NativeType::Int32);
        assert!(matches!(
            coerce(&Value::Str("x".into()), &ty),
            Err(CoercionError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_value_json_shape() {
        let values = vec![Value::Int(5), Value::Double(1.5), Value::Str("x".into()), Value::Missing];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[5,1.5,"x",null]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
