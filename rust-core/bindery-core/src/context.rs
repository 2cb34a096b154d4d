//! # Request Context
//!
//! Per-request state threaded through a route's handler chain: the request,
//! its lazily extracted path captures, the response being built, a side
//! channel, and the chain position.
//!
//! The chain is an index loop. After every step the abort flag is checked;
//! once set, nothing else in the chain runs. Every response helper aborts.
//!
//! Contexts are pooled per engine and reset before they go back.

use crate::engine::Endpoint;
use crate::middleware::{Handler, Location};
use crate::request::Request;
use crate::router::Method;
use crate::schema::{Bind, EncodeType, SchemaCache};
use crate::server::Response;
use crate::state::Extensions;
use crate::validation::BindError;
use crate::values::{Source, Values};
use once_cell::unsync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Kind of a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    /// Operation succeeded
    Success,
    /// Neutral information
    Info,
    /// Recoverable problem, e.g. invalid input
    Warning,
    /// Failure
    Error,
}

/// JSON body of [`Context::message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MsgType,
    /// Text shown to the user
    pub content: String,
}

/// JSON body of [`Context::status_json`]
#[derive(Debug, Clone, Serialize)]
pub struct StatusData<T> {
    /// Application status code
    pub code: u32,
    /// Payload
    pub data: T,
}

/// State of one request moving through its handler chain
pub struct Context {
    request: Request,
    endpoint: Option<Arc<Endpoint>>,
    schemas: Arc<SchemaCache>,
    path_values: OnceCell<Values>,
    response: Response,
    extensions: Extensions,
    index: usize,
    aborted: bool,
}

impl Context {
    /// A context outside any route, with its own schema cache
    ///
    /// Only [`Context::bind_from`] can bind here, since no handler declares
    /// parameters.
    #[must_use]
    pub fn new(request: Request) -> Self {
        let mut ctx = Self::pooled(Arc::new(SchemaCache::new()));
        ctx.request = request;
        ctx
    }

    fn pooled(schemas: Arc<SchemaCache>) -> Self {
        Self {
            request: Request::new(Method::Get, "/"),
            endpoint: None,
            schemas,
            path_values: OnceCell::new(),
            response: Response::default(),
            extensions: Extensions::new(),
            index: 0,
            aborted: false,
        }
    }

    pub(crate) fn init(&mut self, request: Request, endpoint: Arc<Endpoint>) {
        self.request = request;
        self.endpoint = Some(endpoint);
    }

    fn reset(&mut self) {
        self.request = Request::new(Method::Get, "/");
        self.endpoint = None;
        self.path_values = OnceCell::new();
        self.response = Response::default();
        self.extensions.clear();
        self.index = 0;
        self.aborted = false;
    }

    /// Run the chain from the current index until it ends or aborts
    pub(crate) fn run(&mut self) {
        while !self.aborted {
            let Some(handler) = self.current() else {
                break;
            };
            handler.call(self);
            self.index += 1;
        }
    }

    fn current(&self) -> Option<Arc<Handler>> {
        self.endpoint
            .as_ref()
            .and_then(|e| e.chain.get(self.index))
            .cloned()
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    /// The request
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Template of the matched route, if any
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.pattern.template())
    }

    /// Named captures of the matched route, extracted on first use
    pub fn path_values(&self) -> &Values {
        self.path_values.get_or_init(|| {
            self.endpoint
                .as_ref()
                .map(|e| e.pattern.captures(self.request.path()))
                .unwrap_or_default()
        })
    }

    /// Position of the running step in the chain
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Stop the chain after the running step
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Whether the chain was stopped
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Store a side-channel value
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.extensions.set(key, value);
    }

    /// Read a side-channel value
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.extensions.get(key)
    }

    /// The whole side channel
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Bind `target` from the location the running handler declared for `T`
    ///
    /// # Errors
    ///
    /// Returns `Aborted` after an abort, `NotRegistered` if the running
    /// handler's doc does not declare `T`, and otherwise the binding error.
    pub fn bind<T: Bind>(&self, target: &mut T) -> Result<(), BindError> {
        if self.aborted {
            return Err(BindError::Aborted);
        }
        let location = self
            .current()
            .and_then(|h| h.doc().location_of::<T>())
            .ok_or(BindError::NotRegistered)?;
        self.bind_from(location, target)
    }

    /// Bind `target` from an explicit location
    ///
    /// # Errors
    ///
    /// Returns `Aborted` after an abort, `Request` if the body cannot be
    /// parsed or the schema does not build, and otherwise the first field
    /// error.
    pub fn bind_from<T: Bind>(&self, location: Location, target: &mut T) -> Result<(), BindError> {
        if self.aborted {
            return Err(BindError::Aborted);
        }
        let schema = self
            .schemas
            .get::<T>()
            .map_err(|e| BindError::Request(e.into()))?;
        let result = match location {
            Location::Query => schema.parse(target, &Source::new(self.request.query())),
            Location::Path => schema.parse(target, &Source::new(self.path_values())),
            Location::Header => schema.parse(target, &Source::new(self.request.header_values())),
            Location::Form => match schema.encode_type() {
                EncodeType::UrlEncoded => schema.parse(target, &Source::new(self.request.form()?)),
                EncodeType::Multipart => {
                    let (values, files) = self.request.multipart().map_err(BindError::from)?;
                    schema.parse(target, &Source::with_files(values, files))
                }
            },
        };
        if let Err(e) = &result {
            debug!(
                type_name = schema.type_name(),
                %location,
                field = e.field().unwrap_or("-"),
                error = %e,
                "binding failed"
            );
        }
        result
    }

    /// The response being built; does not abort
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Set the status used by the next response helper; does not abort
    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    /// Respond with plain text
    pub fn text(&mut self, body: impl Into<String>) {
        self.response.set_body("text/plain; charset=utf-8", body.into());
        self.abort();
    }

    /// Respond with a JSON document; a serialization failure becomes a 500
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.response.set_body("application/json; charset=utf-8", body);
                self.abort();
            }
            Err(e) => self.error(e),
        }
    }

    /// Respond with `{"code": .., "data": ..}`
    pub fn status_json<T: Serialize>(&mut self, code: u32, data: T) {
        self.json(&StatusData { code, data });
    }

    /// Respond with `{"type": .., "content": ..}`
    pub fn message(&mut self, kind: MsgType, content: impl Into<String>) {
        self.json(&Message {
            kind,
            content: content.into(),
        });
    }

    /// Redirect to `location` with a 3xx `status`
    pub fn redirect(&mut self, location: &str, status: u16) {
        self.response.status = status;
        self.response.set_header("Location", location);
        self.abort();
    }

    /// Respond 404
    pub fn not_found(&mut self) {
        self.response = Response::not_found();
        self.abort();
    }

    /// Log `err` and respond 500
    pub fn error(&mut self, err: impl Into<anyhow::Error>) {
        let err = err.into();
        error!(
            method = %self.request.method(),
            path = self.request.path(),
            error = %err,
            "request failed"
        );
        self.response = Response::internal_error();
        self.abort();
    }

    /// Answer a binding failure
    ///
    /// Client faults get 400 and a warning message carrying the condition's
    /// message; anything else goes through [`Context::error`].
    pub fn fail(&mut self, err: BindError) {
        if err.is_client_error() {
            warn!(
                path = self.request.path(),
                field = err.field().unwrap_or("-"),
                error = %err,
                "rejected request parameters"
            );
            let content = match &err {
                BindError::Validation(v) => v.message.clone(),
                other => other.to_string(),
            };
            self.set_status(err.status_code());
            self.message(MsgType::Warning, content);
        } else {
            self.error(err);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method())
            .field("path", &self.request.path())
            .field("template", &self.template())
            .field("index", &self.index)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

/// Reusable contexts of one engine
pub(crate) struct ContextPool {
    contexts: Mutex<Vec<Context>>,
    capacity: usize,
    schemas: Arc<SchemaCache>,
}

impl ContextPool {
    pub(crate) fn new(schemas: Arc<SchemaCache>, capacity: usize) -> Self {
        Self {
            contexts: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            schemas,
        }
    }

    pub(crate) fn take(&self) -> Context {
        self.contexts
            .lock()
            .pop()
            .unwrap_or_else(|| Context::pooled(Arc::clone(&self.schemas)))
    }

    /// Reset `ctx` and keep it if there is room
    pub(crate) fn put(&self, mut ctx: Context) {
        ctx.reset();
        let mut contexts = self.contexts.lock();
        if contexts.len() < self.capacity {
            contexts.push(ctx);
        }
    }

    pub(crate) fn idle(&self) -> usize {
        self.contexts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Fields;

    #[derive(Default)]
    struct Page {
        page: i32,
        tags: Vec<String>,
    }

    impl Bind for Page {
        fn describe(fields: &mut Fields<Self>) {
            fields
                .field("page", r#"num:"x>=1""#, |p: &mut Self| &mut p.page)
                .field("tags", "", |p: &mut Self| &mut p.tags);
        }
    }

    #[test]
    fn test_bind_from_query() {
        let ctx = Context::new(Request::new(Method::Get, "/?page=2&tags[]=a&tags[]=b"));
        let mut page = Page::default();
        ctx.bind_from(Location::Query, &mut page).unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.tags, ["a", "b"]);
    }

    #[test]
    fn test_bind_needs_declaration() {
        let ctx = Context::new(Request::new(Method::Get, "/?page=2"));
        let err = ctx.bind(&mut Page::default()).unwrap_err();
        assert!(matches!(err, BindError::NotRegistered));
    }

    #[test]
    fn test_bind_after_abort() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.text("done");
        assert!(ctx.is_aborted());
        let err = ctx.bind_from(Location::Query, &mut Page::default()).unwrap_err();
        assert!(matches!(err, BindError::Aborted));
    }

    #[test]
    fn test_fail_validation_is_400_warning() {
        let mut ctx = Context::new(Request::new(Method::Get, "/?page=0"));
        let err = ctx.bind_from(Location::Query, &mut Page::default()).unwrap_err();
        ctx.fail(err);
        let response = ctx.take_response();
        assert_eq!(response.status, 400);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["type"], "warning");
        assert_eq!(body["content"], "1<=x");
    }

    #[test]
    fn test_response_helpers_abort() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.status_json(2000, vec![1, 2]);
        assert!(ctx.is_aborted());
        let response = ctx.take_response();
        assert_eq!(&response.body[..], br#"{"code":2000,"data":[1,2]}"#);

        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.redirect("/login", 302);
        assert_eq!(ctx.response_mut().header("Location"), Some("/login"));
        assert_eq!(ctx.take_response().status, 302);
    }

    #[test]
    fn test_side_channel() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.set("user-id", 7i64);
        assert_eq!(ctx.get::<i64>("user-id"), Some(&7));
        assert_eq!(ctx.get::<i32>("user-id"), None);
    }

    #[test]
    fn test_pool_resets_contexts() {
        let pool = ContextPool::new(Arc::new(SchemaCache::new()), 1);
        let mut ctx = pool.take();
        ctx.set("k", 1u8);
        ctx.abort();
        pool.put(ctx);
        assert_eq!(pool.idle(), 1);

        let ctx = pool.take();
        assert!(!ctx.is_aborted());
        assert!(ctx.get::<u8>("k").is_none());
        pool.put(ctx);
        pool.put(Context::new(Request::new(Method::Get, "/")));
        assert_eq!(pool.idle(), 1);
    }
}
