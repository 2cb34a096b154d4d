//! # Schemas
//!
//! A [`Schema`] is the compiled description of a bindable type: for every
//! field its external name, kind, default, condition and setter.
//!
//! Types describe themselves through [`Bind`], usually derived:
//!
//! ```ignore
//! #[derive(Default, Bind)]
//! struct Login {
//!     #[bind(r#"required:"" len:"2-16""#)]
//!     name: String,
//!     #[bind(r#"num:"0<=x<150""#)]
//!     age: i32,
//! }
//! ```
//!
//! Schemas are built once per type and cached in a [`SchemaCache`] owned by
//! the engine.

use crate::condition::Condition;
use crate::error::SchemaError;
use crate::setter::{accessor, Accessor, FieldType, Nested, Setter, SetterSpec, DEFAULT_TIME_LAYOUT};
use crate::tag::{Tag, TAG_DESC, TAG_PARAM, TAG_TIME_LAYOUT};
use crate::types::Kind;
use crate::validation::BindError;
use crate::values::Source;
use dashmap::DashMap;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

/// A type whose fields can be bound from a request
pub trait Bind: Default + Send + 'static {
    /// List every bindable field of `Self`
    fn describe(fields: &mut Fields<Self>);
}

type MakeSetter<T> =
    Box<dyn Fn(&mut T, SetterSpec) -> (serde_json::Value, Arc<dyn Setter<T>>) + Send + Sync>;

struct FieldDecl<T> {
    ident: &'static str,
    path: String,
    tag: &'static str,
    kind: Kind,
    make: MakeSetter<T>,
}

/// Field declarations collected from [`Bind::describe`]
pub struct Fields<T> {
    decls: Vec<FieldDecl<T>>,
}

impl<T: 'static> Fields<T> {
    fn new() -> Self {
        Self { decls: Vec::new() }
    }

    /// Declare a field with its tag and accessor
    pub fn field<V, F>(&mut self, ident: &'static str, tag: &'static str, access: F) -> &mut Self
    where
        V: FieldType,
        F: for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync + 'static,
    {
        let access: Accessor<T, V> = accessor(access);
        let make: MakeSetter<T> = Box::new(move |default: &mut T, spec: SetterSpec| {
            let value = access(default).clone();
            let json = value.default_json(&spec.time_layout);
            (json, V::setter(spec, Arc::clone(&access), value))
        });
        self.decls.push(FieldDecl {
            ident,
            path: ident.to_string(),
            tag,
            kind: V::KIND,
            make,
        });
        self
    }

    /// Declare an embedded bindable struct whose fields are flattened
    pub fn flatten<U, F>(&mut self, ident: &'static str, access: F) -> &mut Self
    where
        U: Bind,
        F: for<'a> Fn(&'a mut T) -> &'a mut U + Send + Sync + 'static,
    {
        let outer: Accessor<T, U> = accessor(access);
        let mut inner = Fields::<U>::new();
        U::describe(&mut inner);
        for decl in inner.decls {
            let outer = Arc::clone(&outer);
            let make_inner = decl.make;
            let make: MakeSetter<T> = Box::new(move |default: &mut T, spec: SetterSpec| {
                let (json, inner) = make_inner(outer(default), spec);
                let nested: Arc<dyn Setter<T>> = Arc::new(Nested {
                    outer: Arc::clone(&outer),
                    inner,
                });
                (json, nested)
            });
            self.decls.push(FieldDecl {
                ident: decl.ident,
                path: format!("{ident}.{}", decl.path),
                tag: decl.tag,
                kind: decl.kind,
                make,
            });
        }
        self
    }
}

/// Programmatic conditions, keyed by field path (`name`, `embed.name`)
///
/// A field listed here ignores the condition keys of its tag.
pub struct Validator<T> {
    conditions: HashMap<String, Condition>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Bind> Default for Validator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Bind> Validator<T> {
    /// Create an empty validator
    #[must_use]
    pub fn new() -> Self {
        Self {
            conditions: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// The condition for `path`, created empty on first use
    pub fn field(&mut self, path: &str) -> &mut Condition {
        self.conditions.entry(path.to_string()).or_default()
    }
}

/// Restricts which fields an explicitly built schema includes
#[derive(Debug, Clone, Default)]
pub struct Filter {
    only: HashSet<String>,
    except: HashSet<String>,
}

impl Filter {
    /// Create a filter that keeps everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only these field paths
    #[must_use]
    pub fn only<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Drop these field paths
    #[must_use]
    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except.extend(paths.into_iter().map(Into::into));
        self
    }

    fn keeps(&self, path: &str) -> bool {
        !self.except.contains(path) && (self.only.is_empty() || self.only.contains(path))
    }

    fn paths(&self) -> impl Iterator<Item = &String> {
        self.only.iter().chain(self.except.iter())
    }
}

/// How a form carrying a schema must be encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncodeType {
    /// `application/x-www-form-urlencoded`
    #[serde(rename = "application/x-www-form-urlencoded")]
    UrlEncoded,
    /// `multipart/form-data`
    #[serde(rename = "multipart/form-data")]
    Multipart,
}

impl EncodeType {
    /// MIME type string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UrlEncoded => "application/x-www-form-urlencoded",
            Self::Multipart => "multipart/form-data",
        }
    }
}

impl std::fmt::Display for EncodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public description of one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    /// External name read from the request
    pub name: String,
    /// Field path in the Rust type (`embed.name`)
    pub ident: String,
    /// Human description from the `desc` tag
    #[serde(skip_serializing_if = "String::is_empty")]
    pub desc: String,
    /// Declared kind
    pub kind: Kind,
    /// Value used when the request has none
    pub default: serde_json::Value,
    /// Validation rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

/// A compiled field
pub struct Field<T> {
    info: FieldInfo,
    setter: Arc<dyn Setter<T>>,
}

impl<T> Field<T> {
    /// The field's description
    #[must_use]
    pub const fn info(&self) -> &FieldInfo {
        &self.info
    }
}

/// The compiled, reusable description of a bindable type
pub struct Schema<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
}

impl<T: Bind> Schema<T> {
    /// Build from tags alone
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for malformed tags and duplicate names.
    pub fn new() -> Result<Self, SchemaError> {
        Self::build(None, None)
    }

    /// Build with optional programmatic conditions and a field filter
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for malformed tags, invalid validator rules,
    /// duplicate names, and validator or filter paths the type lacks.
    pub fn build(validator: Option<&Validator<T>>, filter: Option<&Filter>) -> Result<Self, SchemaError> {
        Self::compile(validator, filter, DEFAULT_TIME_LAYOUT)
    }

    fn compile(
        validator: Option<&Validator<T>>,
        filter: Option<&Filter>,
        default_layout: &str,
    ) -> Result<Self, SchemaError> {
        let type_name = std::any::type_name::<T>();
        let mut fields = Fields::<T>::new();
        T::describe(&mut fields);

        let known: HashSet<&str> = fields.decls.iter().map(|d| d.path.as_str()).collect();
        let referenced = validator
            .into_iter()
            .flat_map(|v| v.conditions.keys())
            .chain(filter.into_iter().flat_map(Filter::paths));
        for path in referenced {
            if !known.contains(path.as_str()) {
                return Err(SchemaError::UnknownField {
                    type_name,
                    field: path.clone(),
                });
            }
        }

        let mut default = T::default();
        let mut names = HashSet::new();
        let mut compiled = Vec::with_capacity(fields.decls.len());
        for decl in &fields.decls {
            let tag = Tag::new(decl.tag);
            let invalid = |reason: String| SchemaError::InvalidTag {
                type_name,
                field: decl.path.clone(),
                reason,
            };
            tag.check().map_err(invalid)?;

            let param = tag.get(TAG_PARAM);
            if param == "-" || filter.is_some_and(|f| !f.keeps(&decl.path)) {
                continue;
            }
            let name = if param.is_empty() { decl.ident.to_string() } else { param };
            if !names.insert(name.clone()) {
                return Err(SchemaError::DuplicateField { type_name, name });
            }

            let condition = match validator.and_then(|v| v.conditions.get(&decl.path)) {
                Some(c) => {
                    c.validate().map_err(invalid)?;
                    Some(c.clone())
                }
                None => Condition::from_tag(&tag).map_err(invalid)?,
            };
            let time_layout = tag
                .lookup(TAG_TIME_LAYOUT)
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| default_layout.to_string());

            let spec = SetterSpec {
                name: name.clone(),
                condition: condition.clone(),
                time_layout,
            };
            let (default_json, setter) = (decl.make)(&mut default, spec);
            compiled.push(Field {
                info: FieldInfo {
                    name,
                    ident: decl.path.clone(),
                    desc: tag.get(TAG_DESC),
                    kind: decl.kind,
                    default: default_json,
                    condition,
                },
                setter,
            });
        }

        tracing::debug!(type_name, fields = compiled.len(), "schema built");
        Ok(Self {
            type_name,
            fields: compiled,
        })
    }
}

impl<T> Schema<T> {
    /// Decode and validate `source` into `target`
    ///
    /// Non-file fields go first, then file fields; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first field's `BindError`.
    pub fn parse(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        let (files, values): (Vec<_>, Vec<_>) =
            self.fields.iter().partition(|f| f.info.kind.is_file());
        for field in values.into_iter().chain(files) {
            field.setter.set(target, source)?;
        }
        Ok(())
    }

    /// Rust type name of the described type
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Compiled fields in declaration order
    #[must_use]
    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// Field descriptions in declaration order
    #[must_use]
    pub fn infos(&self) -> Vec<FieldInfo> {
        self.fields.iter().map(|f| f.info.clone()).collect()
    }

    /// Look up a field by external name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().map(|f| &f.info).find(|i| i.name == name)
    }

    /// Multipart when any field takes uploads
    #[must_use]
    pub fn encode_type(&self) -> EncodeType {
        if self.fields.iter().any(|f| f.info.kind.is_file()) {
            EncodeType::Multipart
        } else {
            EncodeType::UrlEncoded
        }
    }
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields.iter().map(|f| &f.info).collect::<Vec<_>>())
            .finish()
    }
}

/// Schemas by type, built on first use
///
/// Concurrent first builds race; the first insert wins and the others are
/// dropped.
pub struct SchemaCache {
    schemas: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    time_layout: String,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_layout(DEFAULT_TIME_LAYOUT)
    }

    /// Create an empty cache whose timestamp fields default to `layout`
    #[must_use]
    pub fn with_time_layout(layout: impl Into<String>) -> Self {
        Self {
            schemas: DashMap::new(),
            time_layout: layout.into(),
        }
    }

    /// Layout used by timestamp fields without a `time-layout` tag
    #[must_use]
    pub fn time_layout(&self) -> &str {
        &self.time_layout
    }

    /// The cached schema of `T`, building it if needed
    ///
    /// # Errors
    ///
    /// Returns the build error; nothing is cached in that case.
    pub fn get<T: Bind>(&self) -> Result<Arc<Schema<T>>, SchemaError> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.lookup::<T>(id) {
            return Ok(found);
        }
        let built: Arc<dyn Any + Send + Sync> = Arc::new(Schema::<T>::compile(None, None, &self.time_layout)?);
        let stored = Arc::clone(self.schemas.entry(id).or_insert(built).value());
        Ok(downcast(stored))
    }

    fn lookup<T: Bind>(&self, id: TypeId) -> Option<Arc<Schema<T>>> {
        self.schemas
            .get(&id)
            .map(|entry| downcast(Arc::clone(entry.value())))
    }

    /// Number of cached schemas
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn downcast<T: Bind>(any: Arc<dyn Any + Send + Sync>) -> Arc<Schema<T>> {
    match any.downcast::<Schema<T>>() {
        Ok(schema) => schema,
        // entries are keyed by the TypeId of their own T
        Err(_) => unreachable!("schema cache entry has the wrong type"),
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("len", &self.schemas.len())
            .field("time_layout", &self.time_layout)
            .finish()
    }
}
