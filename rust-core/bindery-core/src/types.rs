//! # Field Kinds
//!
//! The closed set of kinds a bindable field may have, and the text-to-value
//! conversion for each scalar kind.
//!
//! Kinds are never inferred at runtime: the Rust type behind a field's
//! accessor picks its kind through [`Scalar`] (or the file/time impls in
//! [`crate::setter`]), so an unsupported field type is a compile error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// `bool`
    Bool,
    /// `isize`
    Int,
    /// `i32`
    Int32,
    /// `i64`
    Int64,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
    /// `String`
    String,
    /// [`crate::FileHandler`]
    File,
    /// `Option<chrono::NaiveDateTime>`
    Time,
    /// `Vec<String>`
    #[serde(rename = "[]string")]
    SliceString,
    /// `Vec<isize>`
    #[serde(rename = "[]int")]
    SliceInt,
    /// `Vec<i32>`
    #[serde(rename = "[]int32")]
    SliceInt32,
    /// `Vec<i64>`
    #[serde(rename = "[]int64")]
    SliceInt64,
    /// `Vec<f32>`
    #[serde(rename = "[]float32")]
    SliceFloat32,
    /// `Vec<f64>`
    #[serde(rename = "[]float64")]
    SliceFloat64,
    /// `Vec<bool>`
    #[serde(rename = "[]bool")]
    SliceBool,
}

impl Kind {
    /// Get the kind name used in docs and error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::File => "file",
            Self::Time => "time",
            Self::SliceString => "[]string",
            Self::SliceInt => "[]int",
            Self::SliceInt32 => "[]int32",
            Self::SliceInt64 => "[]int64",
            Self::SliceFloat32 => "[]float32",
            Self::SliceFloat64 => "[]float64",
            Self::SliceBool => "[]bool",
        }
    }

    /// Whether values of this kind come from uploaded files
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// A scalar kind that can be decoded from one request value
///
/// Implemented for `String`, `bool`, `isize`, `i32`, `i64`, `f32` and `f64`.
/// `Vec<S>` of any scalar is bindable as the matching slice kind.
pub trait Scalar: Clone + Default + Send + Sync + 'static {
    /// Kind of a single value
    const KIND: Kind;
    /// Kind of `Vec<Self>`
    const SLICE_KIND: Kind;

    /// Decode one non-empty raw value
    ///
    /// # Errors
    ///
    /// Returns a short reason if the text is not a valid `Self`.
    fn decode(raw: &str) -> Result<Self, String>;

    /// Numeric view used by range conditions
    fn as_f64(&self) -> Option<f64> {
        None
    }

    /// Text view used by length and regex conditions
    fn as_text(&self) -> Option<&str> {
        None
    }

    /// JSON form of a default value for schema docs
    fn to_json(&self) -> serde_json::Value;
}

impl Scalar for String {
    const KIND: Kind = Kind::String;
    const SLICE_KIND: Kind = Kind::SliceString;

    fn decode(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn as_text(&self) -> Option<&str> {
        Some(self)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.clone())
    }
}

impl Scalar for bool {
    const KIND: Kind = Kind::Bool;
    const SLICE_KIND: Kind = Kind::SliceBool;

    fn decode(raw: &str) -> Result<Self, String> {
        parse_bool(raw).ok_or_else(|| format!("Cannot convert '{raw}' to boolean"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Bool(*self)
    }
}

macro_rules! int_scalar {
    ($ty:ty, $kind:ident, $slice:ident) => {
        impl Scalar for $ty {
            const KIND: Kind = Kind::$kind;
            const SLICE_KIND: Kind = Kind::$slice;

            fn decode(raw: &str) -> Result<Self, String> {
                raw.trim()
                    .parse::<$ty>()
                    .map_err(|e| format!("Cannot convert '{raw}' to {}: {e}", Kind::$kind))
            }

            #[allow(clippy::cast_precision_loss)]
            fn as_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::Value::from(*self)
            }
        }
    };
}

int_scalar!(isize, Int, SliceInt);
int_scalar!(i32, Int32, SliceInt32);
int_scalar!(i64, Int64, SliceInt64);

macro_rules! float_scalar {
    ($ty:ty, $kind:ident, $slice:ident) => {
        impl Scalar for $ty {
            const KIND: Kind = Kind::$kind;
            const SLICE_KIND: Kind = Kind::$slice;

            fn decode(raw: &str) -> Result<Self, String> {
                raw.trim()
                    .parse::<$ty>()
                    .map_err(|e| format!("Cannot convert '{raw}' to {}: {e}", Kind::$kind))
            }

            fn as_f64(&self) -> Option<f64> {
                Some(f64::from(*self))
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::Number::from_f64(f64::from(*self))
                    .map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
        }
    };
}

float_scalar!(f32, Float32, SliceFloat32);
float_scalar!(f64, Float64, SliceFloat64);

/// Boolean spellings accepted from clients
///
/// `1 t T TRUE true True` and `0 f F FALSE false False`.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
