//! # Engine
//!
//! Owns everything a running application shares: the router, the schema
//! cache, the context pool and the API description.
//!
//! Routes are registered up front, then the engine is wrapped in an `Arc`
//! and only read. Registration builds every declared parameter schema, so
//! tag mistakes and illegal parameter locations stop startup instead of
//! failing requests.
//!
//! ```ignore
//! let mut engine = Engine::new();
//! let mut api = engine.group().with(Cors::new());
//! api.handle(Method::Post, "/login", Doc::new("login").param::<Login>(Location::Form), login)?;
//! let mut admin = api.group().with(jwt(SECRET));
//! admin.handle(Method::Get, "/admins/{id}", doc, show_admin)?;
//! ```

use crate::context::{Context, ContextPool};
use crate::error::{Error, Result, SchemaError};
use crate::middleware::{ApiParam, Doc, Handler, Location};
use crate::request::Request;
use crate::route::RoutePattern;
use crate::router::{Method, Router};
use crate::schema::{Bind, EncodeType, Schema, SchemaCache};
use crate::server::Response;
use crate::setter::DEFAULT_TIME_LAYOUT;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle contexts kept for reuse
    pub pool_size: usize,
    /// Layout of timestamp fields without a `time-layout` tag
    pub time_layout: String,
    /// Log every request at `info`
    pub log_requests: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 256,
            time_layout: DEFAULT_TIME_LAYOUT.to_string(),
            log_requests: true,
        }
    }
}

impl EngineConfig {
    /// Set the number of idle contexts kept
    #[must_use]
    pub const fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the default timestamp layout
    #[must_use]
    pub fn with_time_layout(mut self, layout: impl Into<String>) -> Self {
        self.time_layout = layout.into();
        self
    }

    /// Toggle per-request logging
    #[must_use]
    pub const fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }
}

/// What a matched route runs: its middleware, then its action
pub struct Endpoint {
    pub(crate) pattern: RoutePattern,
    pub(crate) chain: Vec<Arc<Handler>>,
}

impl Endpoint {
    /// The route template
    #[must_use]
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    /// Middleware and action, in run order
    #[must_use]
    pub fn chain(&self) -> &[Arc<Handler>] {
        &self.chain
    }
}

/// One registered action, as listed by [`Engine::api_doc`]
#[derive(Debug, Clone, Serialize)]
pub struct ApiAction {
    /// Doc title
    pub title: String,
    /// Doc description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub desc: String,
    /// HTTP method
    pub method: Method,
    /// Route template
    pub route: String,
    /// Body encoding the action's parameters need
    pub content_type: EncodeType,
    /// Titles of the middleware running before the action
    pub middleware: Vec<String>,
    /// Parameters of the action, ordered by location
    pub params: Vec<ApiParam>,
}

/// The routing and binding engine
pub struct Engine {
    router: Router<Arc<Endpoint>>,
    schemas: Arc<SchemaCache>,
    pool: ContextPool,
    config: EngineConfig,
    actions: Vec<ApiAction>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let schemas = Arc::new(SchemaCache::with_time_layout(config.time_layout.clone()));
        Self {
            router: Router::new(),
            pool: ContextPool::new(Arc::clone(&schemas), config.pool_size),
            schemas,
            config,
            actions: Vec::new(),
        }
    }

    /// Settings
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The route table
    #[must_use]
    pub const fn router(&self) -> &Router<Arc<Endpoint>> {
        &self.router
    }

    /// The cached schema of `T`
    ///
    /// # Errors
    ///
    /// Returns the build error.
    pub fn schema<T: Bind>(&self) -> std::result::Result<Arc<Schema<T>>, SchemaError> {
        self.schemas.get::<T>()
    }

    /// Registered actions, in registration order
    #[must_use]
    pub fn api_doc(&self) -> &[ApiAction] {
        &self.actions
    }

    /// Contexts waiting in the pool
    #[must_use]
    pub fn idle_contexts(&self) -> usize {
        self.pool.idle()
    }

    /// A route group without middleware
    pub fn group(&mut self) -> Group<'_> {
        Group {
            engine: self,
            middleware: Vec::new(),
        }
    }

    /// Register an action without middleware
    ///
    /// # Errors
    ///
    /// See [`Group::handle`].
    pub fn handle<F>(&mut self, method: Method, template: &str, doc: Doc, action: F) -> Result<()>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.register(method, template, &[], Handler::new(doc, action))
    }

    fn register(
        &mut self,
        method: Method,
        template: &str,
        middleware: &[Arc<Handler>],
        handler: Handler,
    ) -> Result<()> {
        for mw in middleware {
            for param in mw.doc().params() {
                let info = param.describe(&self.schemas)?;
                check_location(method, &info)?;
            }
        }
        let mut params = Vec::with_capacity(handler.doc().params().len());
        for param in handler.doc().params() {
            let info = param.describe(&self.schemas)?;
            check_location(method, &info)?;
            params.push(info);
        }
        params.sort_by_key(|p| p.location);

        let pattern = RoutePattern::compile(template)?;
        let content_type = if params.iter().any(|p| p.encode_type == EncodeType::Multipart) {
            EncodeType::Multipart
        } else {
            EncodeType::UrlEncoded
        };
        self.actions.push(ApiAction {
            title: handler.doc().title().to_string(),
            desc: handler.doc().description().to_string(),
            method,
            route: template.to_string(),
            content_type,
            middleware: middleware.iter().map(|m| m.doc().title().to_string()).collect(),
            params,
        });

        let mut chain = middleware.to_vec();
        chain.push(Arc::new(handler));
        self.router.insert(
            method,
            pattern.clone(),
            Arc::new(Endpoint { pattern, chain }),
        );
        Ok(())
    }

    /// Run the matching route's chain and return its response
    ///
    /// Unknown routes get 404. A panic anywhere in the chain is logged and
    /// answered with 500; the context still goes back to the pool.
    pub fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method();
        let path = request.path().to_string();

        let endpoint = self
            .router
            .match_route(method, &path)
            .map(|m| Arc::clone(m.handler()));
        let response = match endpoint {
            None => {
                debug!(%method, path = %path, "no route");
                Response::not_found()
            }
            Some(endpoint) => {
                let mut ctx = self.pool.take();
                ctx.init(request, endpoint);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.run()));
                let response = match outcome {
                    Ok(()) => ctx.take_response(),
                    Err(payload) => {
                        error!(
                            %method,
                            path = %path,
                            panic = panic_message(payload.as_ref()),
                            "handler panicked"
                        );
                        Response::internal_error()
                    }
                };
                self.pool.put(ctx);
                response
            }
        };

        if self.config.log_requests {
            info!(
                %method,
                path = %path,
                status = response.status,
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                "request"
            );
        }
        response
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("routes", &self.router.len())
            .field("schemas", &self.schemas.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("template", &self.pattern.template())
            .field("chain", &self.chain.len())
            .finish()
    }
}

/// Uploads can only come from a POST or PUT form body
fn check_location(method: Method, param: &ApiParam) -> Result<()> {
    let legal = param.encode_type != EncodeType::Multipart
        || (param.location == Location::Form && matches!(method, Method::Post | Method::Put));
    if legal {
        Ok(())
    } else {
        Err(Error::IllegalParameter {
            type_name: param.type_name.to_string(),
            encode_type: param.encode_type.to_string(),
            location: param.location.to_string(),
            method: method.to_string(),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Routes sharing a middleware prefix
///
/// A child group copies its parent's middleware and appends its own; the
/// parent is unaffected.
pub struct Group<'e> {
    engine: &'e mut Engine,
    middleware: Vec<Arc<Handler>>,
}

impl Group<'_> {
    /// Append a middleware for routes registered through this group
    #[must_use]
    pub fn with(mut self, middleware: impl Into<Arc<Handler>>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    /// A child group inheriting this group's middleware
    pub fn group(&mut self) -> Group<'_> {
        Group {
            engine: &mut *self.engine,
            middleware: self.middleware.clone(),
        }
    }

    /// Middleware titles, in run order
    #[must_use]
    pub fn middleware(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.doc().title()).collect()
    }

    /// Register an action behind this group's middleware
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for a bad template,
    /// `Error::Schema` when a declared parameter type does not build, and
    /// `Error::IllegalParameter` when an upload schema is declared outside
    /// the form body or on a method other than POST or PUT.
    pub fn handle<F>(&mut self, method: Method, template: &str, doc: Doc, action: F) -> Result<()>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.engine
            .register(method, template, &self.middleware, Handler::new(doc, action))
    }
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("middleware", &self.middleware())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Fields;
    use crate::setter::FileHandler;

    #[derive(Default)]
    struct Id {
        id: i64,
    }

    impl Bind for Id {
        fn describe(fields: &mut Fields<Self>) {
            fields.field("id", r#"required:"id is required""#, |p: &mut Self| &mut p.id);
        }
    }

    #[derive(Default)]
    struct Upload {
        avatar: FileHandler,
    }

    impl Bind for Upload {
        fn describe(fields: &mut Fields<Self>) {
            fields.field("avatar", "", |u: &mut Self| &mut u.avatar);
        }
    }

    fn body(response: &Response) -> &str {
        std::str::from_utf8(&response.body).unwrap()
    }

    #[test]
    fn test_dispatch_binds_path() {
        let mut engine = Engine::new();
        engine
            .handle(Method::Get, "/users/{id}", Doc::new("show").param::<Id>(Location::Path), |ctx| {
                let mut p = Id::default();
                match ctx.bind(&mut p) {
                    Ok(()) => ctx.text(format!("user {}", p.id)),
                    Err(e) => ctx.fail(e),
                }
            })
            .unwrap();

        let response = engine.dispatch(Request::new(Method::Get, "/users/42"));
        assert_eq!(response.status, 200);
        assert_eq!(body(&response), "user 42");

        let response = engine.dispatch(Request::new(Method::Get, "/users/x"));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_not_found() {
        let engine = Engine::new();
        assert_eq!(engine.dispatch(Request::new(Method::Get, "/nope")).status, 404);
    }

    #[test]
    fn test_middleware_abort_stops_chain() {
        let mut engine = Engine::new();
        let mut group = engine
            .group()
            .with(Handler::from_fn(|ctx| ctx.set("seen", true)))
            .with(Handler::from_fn(|ctx| {
                if ctx.request().header("x-block").is_some() {
                    ctx.set_status(403);
                    ctx.text("blocked");
                }
            }));
        group
            .handle(Method::Get, "/", Doc::new("home"), |ctx| {
                let seen = ctx.get::<bool>("seen").copied().unwrap_or(false);
                ctx.text(format!("home {seen}"));
            })
            .unwrap();

        let ok = engine.dispatch(Request::new(Method::Get, "/"));
        assert_eq!(body(&ok), "home true");

        let blocked = engine.dispatch(Request::new(Method::Get, "/").with_header("x-block", "1"));
        assert_eq!(blocked.status, 403);
        assert_eq!(body(&blocked), "blocked");
    }

    #[test]
    fn test_child_group_inherits_middleware() {
        let mut engine = Engine::new();
        let mut parent = engine.group().with(Handler::new(Doc::new("a"), |_| {}));
        {
            let mut child = parent.group().with(Handler::new(Doc::new("b"), |_| {}));
            assert_eq!(child.middleware(), ["a", "b"]);
            child.handle(Method::Get, "/child", Doc::new("child"), |_| {}).unwrap();
        }
        assert_eq!(parent.middleware(), ["a"]);
        parent.handle(Method::Get, "/parent", Doc::new("parent"), |_| {}).unwrap();

        let doc = engine.api_doc();
        assert_eq!(doc[0].middleware, ["a", "b"]);
        assert_eq!(doc[1].middleware, ["a"]);
    }

    #[test]
    fn test_panic_becomes_500_and_context_returns() {
        let mut engine = Engine::with_config(EngineConfig::default().with_pool_size(4));
        engine
            .handle(Method::Get, "/boom", Doc::new("boom"), |_| panic!("boom"))
            .unwrap();
        let response = engine.dispatch(Request::new(Method::Get, "/boom"));
        assert_eq!(response.status, 500);
        assert_eq!(engine.idle_contexts(), 1);
    }

    #[test]
    fn test_illegal_upload_parameter() {
        let mut engine = Engine::new();
        let err = engine
            .handle(Method::Get, "/upload", Doc::new("up").param::<Upload>(Location::Form), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::IllegalParameter { .. }));

        let err = engine
            .handle(Method::Post, "/upload", Doc::new("up").param::<Upload>(Location::Query), |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("Location [query]"));

        engine
            .handle(Method::Post, "/upload", Doc::new("up").param::<Upload>(Location::Form), |_| {})
            .unwrap();
        assert_eq!(engine.api_doc()[0].content_type, EncodeType::Multipart);
        assert_eq!(engine.router().len(), 1);
    }
}
