//! # Setters
//!
//! One typed setter per field: look the field up in the source, decode it,
//! write it through the field's accessor, then run its condition.
//!
//! The Rust type behind the accessor picks the setter through
//! [`FieldType`]; types outside the closed set do not compile.

use crate::condition::Condition;
use crate::types::{Kind, Scalar};
use crate::validation::BindError;
use crate::values::{Source, UploadedFile};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

/// Default chrono format for timestamp fields
pub const DEFAULT_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";

/// Write access to one field of `T`
pub type Accessor<T, V> = Arc<dyn for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync>;

/// Box a closure such as `|t: &mut Login| &mut t.name` as an [`Accessor`]
pub fn accessor<T, V, F>(f: F) -> Accessor<T, V>
where
    F: for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Decodes and validates one field of `T`
pub trait Setter<T>: Send + Sync {
    /// Read the field from `source` into `target`
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for undecodable input, `Validation` when the
    /// condition fails, and `File` when an upload handler fails.
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError>;
}

/// What a setter needs besides the accessor
#[derive(Debug, Clone)]
pub struct SetterSpec {
    /// External field name
    pub name: String,
    /// Rule set, if any
    pub condition: Option<Condition>,
    /// chrono format for timestamp fields
    pub time_layout: String,
}

/// A Rust type that can back a bindable field
pub trait FieldType: Clone + Send + Sync + 'static {
    /// Declared kind
    const KIND: Kind;

    /// JSON form of the captured default, for docs
    fn default_json(&self, time_layout: &str) -> serde_json::Value;

    /// Build the setter for a field of this type
    fn setter<T: 'static>(spec: SetterSpec, access: Accessor<T, Self>, default: Self)
        -> Arc<dyn Setter<T>>;
}

type HandlerFn = dyn Fn(&str, &UploadedFile) -> anyhow::Result<()> + Send + Sync;

/// Receives each uploaded file of a field
///
/// Set one on the target (or on its `Default`) to decide where uploads go.
#[derive(Clone, Default)]
pub struct FileHandler(Option<Arc<HandlerFn>>);

impl FileHandler {
    /// Wrap a handler function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &UploadedFile) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    /// Whether a handler is set
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Hand one upload to the handler
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or an error if no handler is set.
    pub fn call(&self, field: &str, file: &UploadedFile) -> anyhow::Result<()> {
        match &self.0 {
            Some(f) => f(field, file),
            None => Err(anyhow::anyhow!("file handler is nil")),
        }
    }
}

impl fmt::Debug for FileHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileHandler")
            .field(&if self.is_set() { "set" } else { "unset" })
            .finish()
    }
}

struct ScalarSetter<T, S> {
    name: String,
    condition: Option<Condition>,
    access: Accessor<T, S>,
    default: S,
}

impl<T, S: Scalar> Setter<T> for ScalarSetter<T, S> {
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        let values = source.values();
        let raw = values.get(&self.name);
        let value = if raw.is_empty() {
            self.default.clone()
        } else {
            S::decode(raw).map_err(|_| BindError::Malformed {
                field: self.name.clone(),
                value: raw.to_string(),
                kind: S::KIND,
            })?
        };
        let slot = (self.access)(target);
        *slot = value;
        if let Some(c) = &self.condition {
            if let Some(text) = slot.as_text() {
                c.check_str(&self.name, text)?;
            } else if let Some(n) = slot.as_f64() {
                c.check_num(&self.name, raw, n)?;
            }
            c.check_enum(&self.name, values.get_all(&self.name))?;
        }
        Ok(())
    }
}

struct SliceSetter<T, S> {
    name: String,
    condition: Option<Condition>,
    access: Accessor<T, Vec<S>>,
    default: Vec<S>,
}

impl<T, S: Scalar> SliceSetter<T, S> {
    /// `name[]` first, then `name`; a lone comma-separated value is split
    fn raw_values(&self, source: &Source<'_>) -> Vec<String> {
        let values = source.values();
        let mut raw = values.get_all(&format!("{}[]", self.name));
        if raw.is_empty() {
            raw = values.get_all(&self.name);
        }
        match raw {
            [single] if single.contains(',') => single.split(',').map(str::to_string).collect(),
            _ => raw.to_vec(),
        }
    }
}

impl<T, S: Scalar> Setter<T> for SliceSetter<T, S> {
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        let raw = self.raw_values(source);
        let items = if raw.is_empty() {
            self.default.clone()
        } else {
            raw.iter()
                .map(|r| {
                    S::decode(r).map_err(|_| BindError::Malformed {
                        field: self.name.clone(),
                        value: r.clone(),
                        kind: S::SLICE_KIND,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        *(self.access)(target) = items;
        if let Some(c) = &self.condition {
            c.check_items(&self.name, raw.len())?;
            c.check_enum(&self.name, &raw)?;
        }
        Ok(())
    }
}

struct TimeSetter<T> {
    name: String,
    layout: String,
    condition: Option<Condition>,
    access: Accessor<T, Option<NaiveDateTime>>,
    default: Option<NaiveDateTime>,
}

impl<T> Setter<T> for TimeSetter<T> {
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        let values = source.values();
        if let Some(c) = &self.condition {
            c.check_time(&self.name, values.get_all(&self.name).len())?;
        }
        let text = values.get(&self.name);
        let value = if text.is_empty() {
            self.default
        } else {
            Some(parse_time(text, &self.layout).ok_or_else(|| BindError::Malformed {
                field: self.name.clone(),
                value: text.to_string(),
                kind: Kind::Time,
            })?)
        };
        *(self.access)(target) = value;
        Ok(())
    }
}

/// Parse with a date-time layout, falling back to a date-only layout
fn parse_time(text: &str, layout: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, layout)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, layout)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

struct FileSetter<T> {
    name: String,
    condition: Option<Condition>,
    access: Accessor<T, FileHandler>,
    default: FileHandler,
}

impl<T> Setter<T> for FileSetter<T> {
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        let files = source.files(&self.name);
        if let Some(c) = &self.condition {
            c.check_files(&self.name, files)?;
        }
        let own = (self.access)(target);
        let handler = if own.is_set() { own.clone() } else { self.default.clone() };
        for file in files {
            handler
                .call(&self.name, file)
                .map_err(|source| BindError::File {
                    field: self.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Lifts a setter of an embedded struct to its parent
pub(crate) struct Nested<T, U> {
    pub(crate) outer: Accessor<T, U>,
    pub(crate) inner: Arc<dyn Setter<U>>,
}

impl<T, U> Setter<T> for Nested<T, U> {
    fn set(&self, target: &mut T, source: &Source<'_>) -> Result<(), BindError> {
        self.inner.set((self.outer)(target), source)
    }
}

macro_rules! scalar_field {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            const KIND: Kind = <$ty as Scalar>::KIND;

            fn default_json(&self, _: &str) -> serde_json::Value {
                Scalar::to_json(self)
            }

            fn setter<T: 'static>(
                spec: SetterSpec,
                access: Accessor<T, Self>,
                default: Self,
            ) -> Arc<dyn Setter<T>> {
                Arc::new(ScalarSetter {
                    name: spec.name,
                    condition: spec.condition,
                    access,
                    default,
                })
            }
        }

        impl FieldType for Vec<$ty> {
            const KIND: Kind = <$ty as Scalar>::SLICE_KIND;

            fn default_json(&self, _: &str) -> serde_json::Value {
                serde_json::Value::Array(self.iter().map(Scalar::to_json).collect())
            }

            fn setter<T: 'static>(
                spec: SetterSpec,
                access: Accessor<T, Self>,
                default: Self,
            ) -> Arc<dyn Setter<T>> {
                Arc::new(SliceSetter {
                    name: spec.name,
                    condition: spec.condition,
                    access,
                    default,
                })
            }
        }
    )*};
}

scalar_field!(String, bool, isize, i32, i64, f32, f64);

impl FieldType for Option<NaiveDateTime> {
    const KIND: Kind = Kind::Time;

    fn default_json(&self, time_layout: &str) -> serde_json::Value {
        self.map_or(serde_json::Value::Null, |t| {
            serde_json::Value::String(t.format(time_layout).to_string())
        })
    }

    fn setter<T: 'static>(
        spec: SetterSpec,
        access: Accessor<T, Self>,
        default: Self,
    ) -> Arc<dyn Setter<T>> {
        Arc::new(TimeSetter {
            name: spec.name,
            layout: spec.time_layout,
            condition: spec.condition,
            access,
            default,
        })
    }
}

impl FieldType for FileHandler {
    const KIND: Kind = Kind::File;

    fn default_json(&self, _: &str) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn setter<T: 'static>(
        spec: SetterSpec,
        access: Accessor<T, Self>,
        default: Self,
    ) -> Arc<dyn Setter<T>> {
        Arc::new(FileSetter {
            name: spec.name,
            condition: spec.condition,
            access,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use crate::validation::ConditionKind;
    use crate::values::{Files, Values};
    use hyper::body::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Form {
        name: String,
        age: i32,
        ids: Vec<i64>,
        born: Option<NaiveDateTime>,
        avatar: FileHandler,
    }

    fn spec(name: &str, tag: &str) -> SetterSpec {
        SetterSpec {
            name: name.to_string(),
            condition: Condition::from_tag(&Tag::new(tag)).unwrap(),
            time_layout: DEFAULT_TIME_LAYOUT.to_string(),
        }
    }

    fn values(pairs: &[(&str, &str)]) -> Values {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_string_default_and_condition() {
        let setter = String::setter(
            spec("name", r#"len:"2-4""#),
            accessor(|f: &mut Form| &mut f.name),
            "bob".to_string(),
        );
        let mut form = Form::default();
        setter.set(&mut form, &Source::new(&Values::new())).unwrap();
        assert_eq!(form.name, "bob");

        let v = values(&[("name", "x")]);
        let err = setter.set(&mut form, &Source::new(&v)).unwrap_err();
        assert!(matches!(err, BindError::Validation(e) if e.kind == ConditionKind::StringLength));
    }

    #[test]
    fn test_int_malformed() {
        let setter = i32::setter(spec("age", ""), accessor(|f: &mut Form| &mut f.age), 0);
        let mut form = Form::default();
        let v = values(&[("age", "abc")]);
        let err = setter.set(&mut form, &Source::new(&v)).unwrap_err();
        assert!(matches!(
            err,
            BindError::Malformed { ref field, ref value, kind: Kind::Int32 } if field == "age" && value == "abc"
        ));

        let v = values(&[("age", "41")]);
        setter.set(&mut form, &Source::new(&v)).unwrap();
        assert_eq!(form.age, 41);
    }

    #[test]
    fn test_slice_lookup_order() {
        let setter = Vec::<i64>::setter(
            spec("ids", r#"item:"1-3""#),
            accessor(|f: &mut Form| &mut f.ids),
            Vec::new(),
        );
        let mut form = Form::default();

        let v = values(&[("ids[]", "1"), ("ids[]", "2"), ("ids", "9")]);
        setter.set(&mut form, &Source::new(&v)).unwrap();
        assert_eq!(form.ids, vec![1, 2]);

        let v = values(&[("ids", "4,5,6")]);
        setter.set(&mut form, &Source::new(&v)).unwrap();
        assert_eq!(form.ids, vec![4, 5, 6]);

        let v = values(&[("ids", "1,2,3,4")]);
        let err = setter.set(&mut form, &Source::new(&v)).unwrap_err();
        assert!(matches!(err, BindError::Validation(e) if e.kind == ConditionKind::Item));

        let v = values(&[("ids", "1,x")]);
        assert!(matches!(
            setter.set(&mut form, &Source::new(&v)),
            Err(BindError::Malformed { kind: Kind::SliceInt64, .. })
        ));
    }

    #[test]
    fn test_time_layout() {
        let mut s = spec("born", "");
        s.time_layout = "%Y-%m-%d".to_string();
        let setter =
            Option::<NaiveDateTime>::setter(s, accessor(|f: &mut Form| &mut f.born), None);
        let mut form = Form::default();
        let v = values(&[("born", "2019-03-04")]);
        setter.set(&mut form, &Source::new(&v)).unwrap();
        assert_eq!(form.born.unwrap().to_string(), "2019-03-04 00:00:00");

        let v = values(&[("born", "yesterday")]);
        assert!(matches!(
            setter.set(&mut form, &Source::new(&v)),
            Err(BindError::Malformed { kind: Kind::Time, .. })
        ));
    }

    #[test]
    fn test_file_handler_called_after_condition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = FileHandler::new(move |field, file| {
            sink.lock().push(format!("{field}:{}", file.filename));
            Ok(())
        });
        let setter = FileHandler::setter(
            spec("avatar", r#"size-KB:"1-3""#),
            accessor(|f: &mut Form| &mut f.avatar),
            handler,
        );

        let values = Values::new();
        let mut files = Files::new();
        files.add("avatar", UploadedFile::new("a.png", "image/png", Bytes::from(vec![0; 2048])));
        let mut form = Form::default();
        setter.set(&mut form, &Source::with_files(&values, &files)).unwrap();
        assert_eq!(*seen.lock(), vec!["avatar:a.png"]);

        let mut files = Files::new();
        files.add("avatar", UploadedFile::new("b.png", "image/png", Bytes::from(vec![0; 4096])));
        let err = setter
            .set(&mut form, &Source::with_files(&values, &files))
            .unwrap_err();
        assert!(matches!(err, BindError::Validation(e) if e.kind == ConditionKind::FileSize));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_missing_file_handler() {
        let setter = FileHandler::setter(
            spec("avatar", ""),
            accessor(|f: &mut Form| &mut f.avatar),
            FileHandler::default(),
        );
        let values = Values::new();
        let mut form = Form::default();
        setter.set(&mut form, &Source::new(&values)).unwrap();

        let mut files = Files::new();
        files.add("avatar", UploadedFile::new("a.png", "image/png", Bytes::new()));
        let err = setter
            .set(&mut form, &Source::with_files(&values, &files))
            .unwrap_err();
        assert_eq!(err.to_string(), "avatar: file handler is nil");
    }
}
