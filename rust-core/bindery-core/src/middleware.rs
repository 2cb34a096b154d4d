//! # Handlers & Middleware
//!
//! A [`Handler`] is a documented step of a route's chain: some middleware
//! followed by the action. Every step is the same shape, a function of the
//! [`Context`], so a middleware can bind parameters, fill the side channel,
//! respond or abort exactly like an action.
//!
//! The [`Doc`] of a handler names the parameter types it binds and where
//! each is read from; binding an undeclared type fails with
//! `BindError::NotRegistered`.
//!
//! Built in: [`logging`], [`Cors`], [`jwt`].

use crate::context::{Context, MsgType};
use crate::error::SchemaError;
use crate::schema::{Bind, EncodeType, FieldInfo, Fields, SchemaCache};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{info, warn};

/// A step of the handler chain
pub type Action = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Where a parameter type is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// URL query string
    Query,
    /// Route template captures
    Path,
    /// Urlencoded or multipart body
    Form,
    /// Request headers, under canonical names
    Header,
}

impl Location {
    /// Lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Form => "form",
            Self::Header => "header",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter type declared by a handler
#[derive(Clone)]
pub struct Param {
    location: Location,
    type_id: TypeId,
    type_name: &'static str,
    describe: fn(&SchemaCache, Location) -> Result<ApiParam, SchemaError>,
}

impl Param {
    /// Declare that `T` is read from `location`
    #[must_use]
    pub fn new<T: Bind>(location: Location) -> Self {
        Self {
            location,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            describe: describe::<T>,
        }
    }

    /// Where the type is read from
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Rust type name
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Build (or fetch) the schema and describe it
    ///
    /// # Errors
    ///
    /// Returns the schema build error.
    pub fn describe(&self, schemas: &SchemaCache) -> Result<ApiParam, SchemaError> {
        (self.describe)(schemas, self.location)
    }
}

fn describe<T: Bind>(schemas: &SchemaCache, location: Location) -> Result<ApiParam, SchemaError> {
    let schema = schemas.get::<T>()?;
    Ok(ApiParam {
        location,
        type_name: schema.type_name(),
        encode_type: schema.encode_type(),
        fields: schema.infos(),
    })
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("location", &self.location)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A described parameter, as listed by the API description
#[derive(Debug, Clone, Serialize)]
pub struct ApiParam {
    /// Where it is read from
    pub location: Location,
    /// Rust type name
    pub type_name: &'static str,
    /// Body encoding the fields need
    pub encode_type: EncodeType,
    /// Field descriptions
    pub fields: Vec<FieldInfo>,
}

/// Documentation and parameter declarations of a handler
#[derive(Debug, Clone, Default)]
pub struct Doc {
    title: String,
    desc: String,
    params: Vec<Param>,
}

impl Doc {
    /// Create a doc with a title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description
    #[must_use]
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Declare a parameter type
    #[must_use]
    pub fn param<T: Bind>(mut self, location: Location) -> Self {
        self.params.push(Param::new::<T>(location));
        self
    }

    /// Title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Declared parameters
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Where `T` is read from, if declared
    #[must_use]
    pub fn location_of<T: 'static>(&self) -> Option<Location> {
        let id = TypeId::of::<T>();
        self.params
            .iter()
            .find(|p| p.type_id == id)
            .map(|p| p.location)
    }
}

/// A documented step of a route's chain
#[derive(Clone)]
pub struct Handler {
    doc: Doc,
    action: Action,
}

impl Handler {
    /// Create a handler
    pub fn new<F>(doc: Doc, action: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            doc,
            action: Arc::new(action),
        }
    }

    /// Create an undocumented handler
    pub fn from_fn<F>(action: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self::new(Doc::default(), action)
    }

    /// The handler's doc
    #[must_use]
    pub const fn doc(&self) -> &Doc {
        &self.doc
    }

    pub(crate) fn call(&self, ctx: &mut Context) {
        (self.action)(ctx);
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("doc", &self.doc).finish()
    }
}

/// Request logging middleware
#[must_use]
pub fn logging() -> Handler {
    Handler::new(
        Doc::new("Request Logging").desc("logs every request entering the chain"),
        |ctx| {
            let request = ctx.request();
            info!(
                method = %request.method(),
                path = request.path(),
                request_id = request.header("x-request-id").unwrap_or("-"),
                remote = ?request.remote_addr(),
                "Request received"
            );
        },
    )
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// Preflight (`OPTIONS`) requests get back the origin, headers and method
/// they asked for. Other requests get their `Origin` (or `*`), the
/// configured headers and their own method.
#[derive(Debug, Clone)]
pub struct Cors {
    allow_headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allow_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            expose_headers: Vec::new(),
            allow_credentials: false,
        }
    }
}

impl Cors {
    /// Create a CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the headers allowed on non-preflight requests
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the response headers the browser may read
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Allow cookies; browsers then require a concrete origin
    #[must_use]
    pub const fn allow_credentials(mut self) -> Self {
        self.allow_credentials = true;
        self
    }

    fn apply(&self, ctx: &mut Context) {
        let request = ctx.request();
        let (origin, headers, method) = if request.method() == crate::router::Method::Options {
            (
                request.header("origin").unwrap_or("").to_string(),
                request
                    .header("access-control-request-headers")
                    .unwrap_or("")
                    .to_string(),
                request
                    .header("access-control-request-method")
                    .unwrap_or("")
                    .to_string(),
            )
        } else {
            (
                request.header("origin").unwrap_or("*").to_string(),
                self.allow_headers.join(", "),
                request.method().to_string(),
            )
        };

        let response = ctx.response_mut();
        response.set_header("Access-Control-Allow-Origin", &origin);
        response.set_header("Access-Control-Allow-Headers", &headers);
        response.set_header("Access-Control-Allow-Methods", &method);
        if !self.expose_headers.is_empty() {
            response.set_header("Access-Control-Expose-Headers", &self.expose_headers.join(", "));
        }
        if self.allow_credentials {
            response.set_header("Access-Control-Allow-Credentials", "true");
        }
    }
}

impl From<Cors> for Handler {
    fn from(cors: Cors) -> Self {
        Self::new(
            Doc::new("Cross Site Access").desc("adds CORS headers to every response"),
            move |ctx| cors.apply(ctx),
        )
    }
}

impl From<Cors> for Arc<Handler> {
    fn from(cors: Cors) -> Self {
        Self::new(cors.into())
    }
}

/// Prefix of the `Authorization` header value
pub const AUTH_SCHEME: &str = "Bearer ";

/// Side-channel key holding the authenticated user id (`i64`)
pub const USER_ID_KEY: &str = "user-id";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

#[derive(Default)]
struct AuthHeader {
    authorization: String,
}

impl Bind for AuthHeader {
    fn describe(fields: &mut Fields<Self>) {
        fields.field(
            "authorization",
            r#"param:"Authorization" desc:"obtained from the login endpoint""#,
            |h: &mut Self| &mut h.authorization,
        );
    }
}

/// JWT bearer authentication middleware
///
/// Reads `Authorization: Bearer <token>` (HS256), and on success stores the
/// token subject as an `i64` under [`USER_ID_KEY`]. Missing, invalid and
/// expired tokens are answered with 401 and a warning message.
#[must_use]
pub fn jwt(secret: &[u8]) -> Handler {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    Handler::new(
        Doc::new("JWT Authentication").param::<AuthHeader>(Location::Header),
        move |ctx| {
            let mut auth = AuthHeader::default();
            if let Err(e) = ctx.bind(&mut auth) {
                ctx.fail(e);
                return;
            }
            let token = auth.authorization.trim();
            if token.is_empty() {
                unauthorized(ctx, "not logged in");
                return;
            }
            let token = token.strip_prefix(AUTH_SCHEME).unwrap_or(token);
            match decode::<Claims>(token, &key, &validation) {
                Ok(data) => match data.claims.sub.parse::<i64>() {
                    Ok(id) => ctx.set(USER_ID_KEY, id),
                    Err(e) => ctx.error(anyhow::anyhow!("token subject is not an id: {e}")),
                },
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                    unauthorized(ctx, "authorization expired");
                }
                Err(e) => {
                    warn!(error = %e, "JWT validation failed");
                    unauthorized(ctx, "authorization failed");
                }
            }
        },
    )
}

fn unauthorized(ctx: &mut Context, content: &str) {
    ctx.set_status(401);
    ctx.message(MsgType::Warning, content);
}

/// Sign a token for `user_id` valid for `ttl`
///
/// # Errors
///
/// Returns the signing error.
pub fn issue_token(
    secret: &[u8],
    user_id: i64,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp(),
    };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))?;
    Ok(format!("{AUTH_SCHEME}{token}"))
}

/// The user id stored by [`jwt`], if the request passed it
#[must_use]
pub fn user_id(ctx: &Context) -> Option<i64> {
    ctx.get::<i64>(USER_ID_KEY).copied()
}
