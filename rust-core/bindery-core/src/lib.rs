//! # Bindery Core
//!
//! Core runtime library for Bindery, a declarative request binding engine.
//! Handlers describe the structs they read; requests are matched, bound
//! and validated against schemas compiled once at registration.
//!
//! ## Architecture
//!
//! An [`Engine`] owns the router, the schema cache and a pool of reusable
//! [`Context`]s. Each registered action runs behind its middleware chain;
//! any step may abort the chain.
//!
//! ## Modules
//!
//! - `route` - Route templates compiled to anchored patterns
//! - `router` - Per-method route table ordered by specificity
//! - `tag` - Struct tag strings (`param:"q" len:"2-4"`)
//! - `condition` - Validation rules parsed from tags or built in code
//! - `types` - Field kinds and scalar decoding
//! - `values` - Multi-valued request maps and uploaded files
//! - `setter` - Typed per-field setters
//! - `schema` - Bindable types, schemas and the schema cache
//! - `request` - HTTP request wrapper with lazy parsing
//! - `multipart` - `multipart/form-data` decoding
//! - `context` - Per-request context and response helpers
//! - `middleware` - Handlers, docs, CORS, JWT and logging middleware
//! - `engine` - Registration, groups and dispatch
//! - `server` - HTTP server built on Hyper
//! - `state` - Per-request side channel
//! - `validation` - Validation and binding errors
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

extern crate self as bindery_core;

pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod multipart;
pub mod request;
pub mod route;
pub mod router;
pub mod schema;
pub mod server;
pub mod setter;
pub mod state;
pub mod tag;
pub mod types;
pub mod validation;
pub mod values;

pub use bindery_macros::Bind;
pub use condition::Condition;
pub use context::{Context, Message, MsgType, StatusData};
pub use engine::{ApiAction, Engine, EngineConfig, Group};
pub use error::{Error, Result, SchemaError};
pub use middleware::{Cors, Doc, Handler, Location};
pub use request::Request;
pub use route::RoutePattern;
pub use router::{Method, Router};
pub use schema::{Bind, EncodeType, FieldInfo, Fields, Filter, Schema, SchemaCache, Validator};
pub use server::{init_tracing, Response, Server, ServerConfig};
pub use setter::FileHandler;
pub use state::Extensions;
pub use types::Kind;
pub use validation::{BindError, ConditionKind, ValidationError};
pub use values::{UploadedFile, Values};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[derive(Default, Bind)]
    struct Login {
        #[bind(r#"param:"user" required:"user is required""#)]
        r#type: String,
        #[bind(skip)]
        attempts: u32,
    }

    #[test]
    fn test_derive_uses_unraw_ident() {
        let schema = Schema::<Login>::new().unwrap();
        let infos = schema.infos();
        let names: Vec<_> = infos.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["user"]);
        assert_eq!(schema.fields()[0].info().ident, "type");
        let _ = Login::default().attempts;
    }
}
