//! # Router
//!
//! Per-method route lists ordered by specificity, scanned linearly.
//!
//! ## Ordering
//!
//! - more `/` in the literal prefix first
//! - then the longer literal prefix
//! - then registration order (the sort is stable)
//!
//! So `/foo/bar` is tried before `/foo/{id}`, which is tried before `/`.

use crate::error::{Error, Result};
use crate::route::RoutePattern;
use crate::values::Values;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::str::FromStr;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Convert from the hyper method type
    #[must_use]
    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(Error::BadRequest {
                reason: format!("unsupported method '{s}'"),
            }),
        }
    }
}

/// A registered route
#[derive(Debug, Clone)]
pub struct Route<H> {
    method: Method,
    pattern: RoutePattern,
    handler: H,
}

impl<H> Route<H> {
    /// The route's method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The compiled template
    #[must_use]
    pub const fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// The registered handler
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }
}

/// A successful lookup
///
/// Path captures are only extracted when [`Match::captures`] is called.
#[derive(Debug)]
pub struct Match<'r, 'p, H> {
    route: &'r Route<H>,
    path: &'p str,
}

impl<'r, 'p, H> Match<'r, 'p, H> {
    /// The matched route's handler
    #[must_use]
    pub const fn handler(&self) -> &'r H {
        &self.route.handler
    }

    /// The matched route
    #[must_use]
    pub const fn route(&self) -> &'r Route<H> {
        self.route
    }

    /// The matched route's template
    #[must_use]
    pub fn template(&self) -> &'r str {
        self.route.pattern.template()
    }

    /// The request path that matched
    #[must_use]
    pub const fn path(&self) -> &'p str {
        self.path
    }

    /// Extract named path captures
    #[must_use]
    pub fn captures(&self) -> Values {
        self.route.pattern.captures(self.path)
    }
}

/// Route table keyed by method
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: HashMap<Method, Vec<Route<H>>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register a handler for `method` + `template`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn add(&mut self, method: Method, template: &str, handler: H) -> Result<()> {
        self.insert(method, RoutePattern::compile(template)?, handler);
        Ok(())
    }

    /// Register a handler for an already compiled pattern
    pub fn insert(&mut self, method: Method, pattern: RoutePattern, handler: H) {
        tracing::debug!(%method, template = pattern.template(), prefix = pattern.prefix(), "route added");

        let routes = self.routes.entry(method).or_default();
        routes.push(Route {
            method,
            pattern,
            handler,
        });
        routes.sort_by_key(|r| Reverse(r.pattern.specificity()));
    }

    /// Find the most specific route matching `path`
    #[must_use]
    pub fn match_route<'r, 'p>(&'r self, method: Method, path: &'p str) -> Option<Match<'r, 'p, H>> {
        self.routes
            .get(&method)?
            .iter()
            .find(|r| r.pattern.is_match(path))
            .map(|route| Match { route, path })
    }

    /// Routes registered for `method`, in match order
    #[must_use]
    pub fn routes(&self, method: Method) -> &[Route<H>] {
        self.routes.get(&method).map_or(&[][..], Vec::as_slice)
    }

    /// Total number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
