//! # Route Patterns
//!
//! Compiles a route template into a literal prefix and an anchored regex.
//!
//! - `/users/{id}` -> prefix `/users`, regex `^/users/(?P<id>[^/.]+)$`
//! - `/{mp}.txt` -> prefix `/`, regex `^/(?P<mp>[^/.]+)\.txt$`
//! - `/static/` -> prefix `/static`, regex `^/static/` (matches sub-paths)
//!
//! The prefix is a cheap pre-filter; the regex decides.

use crate::error::{Error, Result};
use crate::values::Values;
use regex::Regex;

const CAPTURE: &str = "[^/.]+";

/// A compiled route template
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    prefix: String,
    regex: Regex,
    names: Vec<String>,
}

impl RoutePattern {
    /// Compile a template
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for templates not starting with
    /// `/`, unbalanced braces, empty or invalid placeholder names, and
    /// duplicate placeholder names.
    pub fn compile(template: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRoutePattern {
            pattern: template.to_string(),
            reason,
        };

        if template.is_empty() || template == "/" {
            return Ok(Self {
                template: template.to_string(),
                prefix: "/".to_string(),
                regex: Regex::new("^/$").map_err(|e| invalid(e.to_string()))?,
                names: Vec::new(),
            });
        }
        if !template.starts_with('/') {
            return Err(invalid("template must start with '/'".to_string()));
        }

        let mut source = String::from("^");
        let mut names: Vec<String> = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                None => {
                    source.push_str(&regex::escape(rest));
                    rest = "";
                }
                Some(i) if rest[i..].starts_with('}') => {
                    return Err(invalid(format!("unexpected '}}' at byte {}", template.len() - rest.len() + i)));
                }
                Some(i) => {
                    source.push_str(&regex::escape(&rest[..i]));
                    let after = &rest[i + 1..];
                    let end = after
                        .find(['{', '}'])
                        .filter(|&j| after[j..].starts_with('}'))
                        .ok_or_else(|| invalid("unbalanced '{'".to_string()))?;
                    let name = &after[..end];
                    if !is_capture_name(name) {
                        return Err(invalid(format!("invalid placeholder name '{name}'")));
                    }
                    if names.iter().any(|n| n == name) {
                        return Err(invalid(format!("duplicate placeholder name '{name}'")));
                    }
                    source.push_str(&format!("(?P<{name}>{CAPTURE})"));
                    names.push(name.to_string());
                    rest = &after[end + 1..];
                }
            }
        }
        if !template.ends_with('/') {
            source.push('$');
        }

        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            template: template.to_string(),
            prefix: literal_prefix(template),
            regex,
            names,
        })
    }

    /// The template as registered
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Literal text before the first placeholder
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The compiled expression
    #[must_use]
    pub const fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Placeholder names in template order
    #[must_use]
    pub fn capture_names(&self) -> &[String] {
        &self.names
    }

    /// Whether the template ends with `/` and so matches deeper paths
    #[must_use]
    pub fn is_prefix_route(&self) -> bool {
        self.template.len() > 1 && self.template.ends_with('/')
    }

    /// Test a request path
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        path.starts_with(&self.prefix) && self.regex.is_match(path)
    }

    /// Extract named captures from a path this pattern matches
    #[must_use]
    pub fn captures(&self, path: &str) -> Values {
        let mut values = Values::new();
        if let Some(caps) = self.regex.captures(path) {
            for name in &self.names {
                if let Some(m) = caps.name(name) {
                    values.add(name.as_str(), m.as_str());
                }
            }
        }
        values
    }

    /// Ordering key: more `/` in the prefix first, then the longer prefix
    pub(crate) fn specificity(&self) -> (usize, usize) {
        (self.prefix.matches('/').count(), self.prefix.len())
    }
}

fn is_capture_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn literal_prefix(template: &str) -> String {
    let end = template
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.')))
        .unwrap_or(template.len());
    let prefix = &template[..end];
    if prefix.len() > 1 {
        prefix.trim_end_matches('/').to_string()
    } else {
        prefix.to_string()
    }
}
