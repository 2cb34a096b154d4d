//! # Error Handling
//!
//! Centralized error types for Bindery core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Everything here is a *build-time* or *host* failure: a bad route template,
//! a schema whose tags don't parse, a socket that won't bind. Per-request
//! binding outcomes live in [`crate::validation`].

use thiserror::Error;

/// Result type alias for Bindery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Bindery runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    Listen {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route template provided at registration
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A data-holder type could not be turned into a schema
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A parameter schema was registered at a location or on a method it cannot be read from
    #[error("parameter {type_name} is illegal: ContentType [{encode_type}], Location [{location}], Method [{method}]")]
    IllegalParameter {
        /// Rust type name of the schema
        type_name: String,
        /// Encode type the schema requires
        encode_type: String,
        /// Where the handler declared it
        location: String,
        /// Method of the route
        method: String,
    },

    /// Malformed request body (form or multipart)
    #[error("Bad request: {reason}")]
    BadRequest {
        /// What was wrong with the body
        reason: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

/// Schema construction failures
///
/// These are programming mistakes in a data-holder definition and surface
/// when the schema is first built, never while a request is being bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A field's tag string could not be parsed into a condition
    #[error("{type_name}.{field} error: {reason}")]
    InvalidTag {
        /// Rust type name of the data holder
        type_name: &'static str,
        /// Field identifier
        field: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Two fields resolve to the same external name
    #[error("{type_name}: duplicate parameter name '{name}'")]
    DuplicateField {
        /// Rust type name of the data holder
        type_name: &'static str,
        /// The clashing external name
        name: String,
    },

    /// A validator or filter refers to a field the type doesn't have
    #[error("{type_name}: unknown field '{field}'")]
    UnknownField {
        /// Rust type name of the data holder
        type_name: &'static str,
        /// The identifier that was not found
        field: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_route_pattern_error() {
        let err = Error::InvalidRoutePattern {
            pattern: "/{id}/{id}".to_string(),
            reason: "duplicate capture group name".to_string(),
        };
        assert!(err.to_string().contains("/{id}/{id}"));
    }

    #[test]
    fn test_listen_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::Listen {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }

    #[test]
    fn test_schema_error_names_field() {
        let err: Error = SchemaError::InvalidTag {
            type_name: "Login",
            field: "password".to_string(),
            reason: "bad range".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Login.password error: bad range");
    }
}
