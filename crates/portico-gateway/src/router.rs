//! Route table.
//!
//! Patterns are split on `/`; a `{name}` segment captures one path segment.
//! Routes are checked in registration order and the first match wins.
//!
//! # Example
//!
//! ```rust
//! use portico_gateway::router::Router;
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add(Method::GET, "/v1/users/{username}/items", "list-items");
//!
//! let found = router.match_route(&Method::GET, "/v1/users/ann/items").unwrap();
//! assert_eq!(*found.handler(), "list-items");
//! assert_eq!(found.pattern(), "/v1/users/{username}/items");
//! assert_eq!(found.param("username"), Some("ann"));
//! ```

use std::collections::HashMap;

use http::Method;

/// A matched route with its captured path parameters.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    handler: &'a H,
    pattern: &'a str,
    params: HashMap<String, String>,
}

impl<'a, H> RouteMatch<'a, H> {
    /// Handler registered for the route.
    pub fn handler(&self) -> &'a H {
        self.handler
    }

    /// Pattern the route was registered with.
    pub fn pattern(&self) -> &'a str {
        self.pattern
    }

    /// Captured path parameters.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// One captured path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Takes the captured parameters.
    pub fn into_params(self) -> HashMap<String, String> {
        self.params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route<H> {
    method: Method,
    segments: Vec<PathSegment>,
    pattern: String,
    handler: H,
}

impl<H> Route<H> {
    fn new(method: Method, pattern: &str, handler: H) -> Self {
        Self {
            method,
            segments: parse_segments(pattern),
            pattern: pattern.to_string(),
            handler,
        }
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(actual) {
            match segment {
                PathSegment::Literal(expected) if expected == actual => {}
                PathSegment::Literal(_) => return None,
                PathSegment::Param(name) => {
                    params.insert(name.clone(), percent_decode(actual));
                }
            }
        }
        Some(params)
    }
}

fn parse_segments(pattern: &str) -> Vec<PathSegment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => PathSegment::Param(name.to_string()),
            None => PathSegment::Literal(s.to_string()),
        })
        .collect()
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// HTTP route table.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route.
    pub fn add(&mut self, method: Method, pattern: impl AsRef<str>, handler: H) {
        self.routes.push(Route::new(method, pattern.as_ref(), handler));
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` when no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the first route matching `method` and `path`.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, H>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(path).map(|params| RouteMatch {
                    handler: &route.handler,
                    pattern: &route.pattern,
                    params,
                })
            })
    }

    /// Registered `(method, pattern)` pairs in match order.
    pub fn patterns(&self) -> impl Iterator<Item = (&Method, &str)> + '_ {
        self.routes
            .iter()
            .map(|route| (&route.method, route.pattern.as_str()))
    }
}
