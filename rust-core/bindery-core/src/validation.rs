//! # Validation Module
//!
//! Per-request binding outcomes.
//!
//! - [`ValidationError`]: a well-formed value broke a field's condition
//! - [`BindError`]: every way a single bind call can fail
//!
//! Binding reports the first failing field only, so there is no error
//! collection type here.

use crate::multipart::MultipartError;
use crate::types::Kind;
use serde::Serialize;
use thiserror::Error;

/// Which rule of a condition rejected the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionKind {
    /// Value absent or empty on a required field
    Required,
    /// String length (in chars) out of range
    StringLength,
    /// String did not match the pattern
    StringRegexp,
    /// Number outside the allowed range
    Number,
    /// Slice or upload count out of range
    Item,
    /// Raw value not in the allow-list
    Enums,
    /// An uploaded file is too small or too large
    FileSize,
    /// An uploaded file's extension is not allowed
    FileExtensions,
    /// An uploaded file's content type is not allowed
    FileMimeTypes,
}

impl ConditionKind {
    /// Stable machine-readable name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::StringLength => "string-length",
            Self::StringRegexp => "string-regexp",
            Self::Number => "number",
            Self::Item => "item-length",
            Self::Enums => "enums",
            Self::FileSize => "file-size",
            Self::FileExtensions => "file-extensions",
            Self::FileMimeTypes => "file-mime-types",
        }
    }
}

/// A field-scoped condition failure, ready to show to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// External field name
    pub field: String,
    /// The rule that failed
    pub kind: ConditionKind,
    /// Human-readable message (from the tag or the default)
    pub message: String,
    /// Lower bound of the violated range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound of the violated range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Whether `min` itself is allowed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub min_inclusive: bool,
    /// Whether `max` itself is allowed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub max_inclusive: bool,
    /// Allowed values for enum, extension and mime rules
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<String>,
}

impl ValidationError {
    /// Create an error with no bounds attached
    pub fn new(field: impl Into<String>, kind: ConditionKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
            min: None,
            max: None,
            min_inclusive: false,
            max_inclusive: false,
            enums: Vec::new(),
        }
    }

    /// Create a "required" error
    pub fn required(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, ConditionKind::Required, message)
    }

    /// Attach an inclusive `min..=max` range
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.min_inclusive = true;
        self.max_inclusive = true;
        self
    }

    /// Attach the lower bound of a numeric range
    #[must_use]
    pub fn with_min(mut self, min: f64, inclusive: bool) -> Self {
        self.min = Some(min);
        self.min_inclusive = inclusive;
        self
    }

    /// Attach the upper bound of a numeric range
    #[must_use]
    pub fn with_max(mut self, max: f64, inclusive: bool) -> Self {
        self.max = Some(max);
        self.max_inclusive = inclusive;
        self
    }

    /// Attach the allow-list that was violated
    #[must_use]
    pub fn with_enums(mut self, enums: &[String]) -> Self {
        self.enums = enums.to_vec();
        self
    }

    /// Convert to JSON response body
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"field":"{}"}}"#, self.field))
    }
}

/// Everything that can go wrong while binding one target
#[derive(Debug, Error)]
pub enum BindError {
    /// A decoded value broke the field's condition
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A present value could not be decoded into the field's kind
    #[error("{field}: cannot parse '{value}' as {kind}")]
    Malformed {
        /// External field name
        field: String,
        /// The raw text received
        value: String,
        /// The kind it should have decoded to
        kind: Kind,
    },

    /// The file handler rejected an upload
    #[error("{field}: {source}")]
    File {
        /// External field name
        field: String,
        /// Error returned by the handler
        source: anyhow::Error,
    },

    /// The active handler did not declare a parameter of this type
    #[error("parameter type is not registered for this handler")]
    NotRegistered,

    /// The context was aborted before binding
    #[error("request already aborted")]
    Aborted,

    /// The request body could not be read as form or multipart data
    #[error(transparent)]
    Request(#[from] crate::Error),
}

impl From<MultipartError> for BindError {
    fn from(err: MultipartError) -> Self {
        match err {
            MultipartError::InvalidText { field, value } => Self::Malformed {
                field,
                value,
                kind: Kind::String,
            },
            other => Self::Request(crate::Error::BadRequest {
                reason: other.to_string(),
            }),
        }
    }
}

impl BindError {
    /// The field this error belongs to, if any
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation(e) => Some(&e.field),
            Self::Malformed { field, .. } | Self::File { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether the client is at fault (4xx) rather than the server
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Malformed { .. }
                | Self::Request(
                    crate::Error::BadRequest { .. } | crate::Error::PayloadTooLarge { .. }
                )
        )
    }

    /// HTTP status to answer with
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_error() {
        let error = ValidationError::required("email", "email is required");
        assert_eq!(error.field, "email");
        assert_eq!(error.kind, ConditionKind::Required);
        assert_eq!(error.to_string(), "email: email is required");
    }

    #[test]
    fn test_range_json() {
        let error = ValidationError::new("age", ConditionKind::Number, "2<=x<4")
            .with_min(2.0, true)
            .with_max(4.0, false);
        let json = error.to_json();
        assert!(json.contains(r#""kind":"NUMBER""#));
        assert!(json.contains(r#""min":2.0"#));
        assert!(json.contains(r#""min_inclusive":true"#));
        assert!(!json.contains("max_inclusive"));
        assert!(!json.contains("enums"));
    }

    #[test]
    fn test_enum_json() {
        let allowed = vec!["1".to_string(), "2".to_string()];
        let error = ValidationError::new("level", ConditionKind::Enums, "one of [1 2]")
            .with_enums(&allowed);
        let json = error.to_json();
        assert!(json.contains(r#""enums":["1","2"]"#));
    }

    #[test]
    fn test_bind_error_field_and_status() {
        let e = BindError::Malformed {
            field: "age".to_string(),
            value: "abc".to_string(),
            kind: Kind::Int,
        };
        assert_eq!(e.field(), Some("age"));
        assert_eq!(e.status_code(), 400);
        assert_eq!(e.to_string(), "age: cannot parse 'abc' as int");

        assert_eq!(BindError::Aborted.field(), None);
        assert_eq!(BindError::NotRegistered.status_code(), 500);

        let bad_body = BindError::from(crate::Error::BadRequest {
            reason: "multipart: missing boundary".to_string(),
        });
        assert_eq!(bad_body.status_code(), 400);
    }

    #[test]
    fn test_multipart_errors() {
        let e = BindError::from(MultipartError::InvalidText {
            field: "title".to_string(),
            value: "\u{fffd}a".to_string(),
        });
        assert!(matches!(&e, BindError::Malformed { kind: Kind::String, .. }));
        assert_eq!(e.field(), Some("title"));
        assert_eq!(e.status_code(), 400);

        let e = BindError::from(MultipartError::NotMultipart);
        assert!(matches!(e, BindError::Request(crate::Error::BadRequest { .. })));
        assert!(e.is_client_error());
    }

    #[test]
    fn test_file_error_keeps_source() {
        let e = BindError::File {
            field: "avatar".to_string(),
            source: anyhow::anyhow!("disk full"),
        };
        assert_eq!(e.to_string(), "avatar: disk full");
        assert!(!e.is_client_error());
    }

    #[test]
    fn test_condition_kind_names() {
        assert_eq!(ConditionKind::Item.as_str(), "item-length");
        assert_eq!(ConditionKind::FileMimeTypes.as_str(), "file-mime-types");
    }
}
