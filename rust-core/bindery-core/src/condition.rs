//! # Conditions
//!
//! A field's validation rule set, built either from its tag or through the
//! builder methods a [`crate::Validator`] hands out.
//!
//! ## Tag keys
//!
//! - `required`: value must be present; the tag value is the message
//! - `len`, `item`: `min-max` or `N` (meaning `1-N`)
//! - `num`: inequality such as `2<=x<4`, `x>10` or `4>=x`
//! - `reg`, `email`: pattern match
//! - `enum`: space separated allow-list
//! - `size`, `size-Byte`, `size-KB`, `size-MB`: upload size range
//! - `exts`, `mime`: upload allow-lists
//!
//! Every key except `required` and `email` accepts a `<key>-msg` override.

use crate::tag::{msg_key, Tag};
use crate::validation::{ConditionKind, ValidationError};
use crate::values::UploadedFile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// `required:"message"`
pub const TAG_REQUIRED: &str = "required";
/// `len:"min-max"`
pub const TAG_LEN: &str = "len";
/// `num:"2<=x<4"`
pub const TAG_NUM: &str = "num";
/// `item:"min-max"`
pub const TAG_ITEM: &str = "item";
/// `email:"message"`
pub const TAG_EMAIL: &str = "email";
/// `enum:"a b c"`
pub const TAG_ENUM: &str = "enum";
/// `reg:"pattern"`
pub const TAG_REGEXP: &str = "reg";
/// `size:"min-max"` in bytes
pub const TAG_SIZE: &str = "size";
/// `size-Byte:"min-max"`
pub const TAG_SIZE_BYTE: &str = "size-Byte";
/// `size-KB:"min-max"`
pub const TAG_SIZE_KB: &str = "size-KB";
/// `size-MB:"min-max"`
pub const TAG_SIZE_MB: &str = "size-MB";
/// `exts:".jpg .png"`
pub const TAG_EXTS: &str = "exts";
/// `mime:"image text/plain"`
pub const TAG_MIME: &str = "mime";

const CONDITION_TAGS: [&str; 13] = [
    TAG_REQUIRED,
    TAG_LEN,
    TAG_NUM,
    TAG_ITEM,
    TAG_EMAIL,
    TAG_ENUM,
    TAG_REGEXP,
    TAG_SIZE,
    TAG_SIZE_BYTE,
    TAG_SIZE_KB,
    TAG_SIZE_MB,
    TAG_EXTS,
    TAG_MIME,
];

const EMAIL_PATTERN: &str = r"[\w!#$%&'*+/=?^_`{|}~-]+(?:\.[\w!#$%&'*+/=?^_`{|}~-]+)*@(?:[\w](?:[\w-]*[\w])?\.)+[a-zA-Z0-9](?:[\w-]*[\w])?";

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(EMAIL_PATTERN).unwrap());

const NUMBER: &str = r"(-?\d+\.?\d*)";

// 2<=x
static RIGHT_GT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("{NUMBER}(<=?)[a-zA-Z]+")).unwrap());
// x>=2
static LEFT_GT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("[a-zA-Z]+(>=?){NUMBER}")).unwrap());
// 4>=x
static RIGHT_LT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("{NUMBER}(>=?)[a-zA-Z]+")).unwrap());
// x<4
static LEFT_LT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("[a-zA-Z]+(<=?){NUMBER}")).unwrap());

static BETWEEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-(\d+)$").unwrap());

/// An inclusive `min..=max` range with its failure message
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Between {
    /// Lower bound
    pub min: u64,
    /// Upper bound
    pub max: u64,
    /// Failure message
    pub message: String,
}

impl Between {
    const fn contains(&self, n: u64) -> bool {
        self.min <= n && n <= self.max
    }

    #[allow(clippy::cast_precision_loss)]
    fn error(&self, field: &str, kind: ConditionKind) -> ValidationError {
        ValidationError::new(field, kind, &self.message)
            .with_range(self.min as f64, self.max as f64)
    }
}

/// Independent numeric bounds
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NumRange {
    /// Lower bound, if any
    pub min: Option<f64>,
    /// Upper bound, if any
    pub max: Option<f64>,
    /// Whether `min` is allowed
    pub min_inclusive: bool,
    /// Whether `max` is allowed
    pub max_inclusive: bool,
    /// Failure message
    pub message: String,
    #[serde(skip)]
    custom_message: bool,
}

impl NumRange {
    const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
            min_inclusive: false,
            max_inclusive: false,
            message: String::new(),
            custom_message: false,
        }
    }

    fn set_message(&mut self, msg: &str) {
        if !msg.is_empty() {
            self.message = msg.to_string();
            self.custom_message = true;
        } else if !self.custom_message {
            self.message = self.expression();
        }
    }

    /// The bounds written as an inequality, e.g. `2<=x<4`
    #[must_use]
    pub fn expression(&self) -> String {
        let mut out = String::new();
        if let Some(min) = self.min {
            out.push_str(&min.to_string());
            out.push_str(if self.min_inclusive { "<=" } else { "<" });
        }
        out.push('x');
        if let Some(max) = self.max {
            out.push_str(if self.max_inclusive { "<=" } else { "<" });
            out.push_str(&max.to_string());
        }
        out
    }

    fn accepts(&self, value: f64) -> bool {
        let above = self.min.map_or(true, |min| {
            if self.min_inclusive {
                value >= min
            } else {
                value > min
            }
        });
        let below = self.max.map_or(true, |max| {
            if self.max_inclusive {
                value <= max
            } else {
                value < max
            }
        });
        above && below
    }
}

/// A compiled pattern with its failure message
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Compiled expression
    pub regex: Regex,
    /// Failure message
    pub message: String,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str() && self.message == other.message
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pattern", 2)?;
        s.serialize_field("pattern", self.regex.as_str())?;
        s.serialize_field("message", &self.message)?;
        s.end()
    }
}

/// An allow-list with its failure message
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AllowList {
    /// Allowed entries
    pub values: Vec<String>,
    /// Failure message
    pub message: String,
}

/// The validation rules attached to one field
///
/// At most one rule of each kind; setting a rule twice replaces it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Condition {
    /// Message when the value is absent; `None` means optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    /// String length in chars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<Between>,
    /// Numeric bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num: Option<NumRange>,
    /// Slice or upload count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Between>,
    /// Allowed raw values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enums: Option<AllowList>,
    /// Pattern the string must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regexp: Option<Pattern>,
    /// Upload size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<Between>,
    /// Allowed upload extensions, with the leading dot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_exts: Option<AllowList>,
    /// Allowed upload content types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_mime_types: Option<AllowList>,
    #[serde(skip)]
    invalid: Option<String>,
}

impl Condition {
    /// Create an empty condition (accepts everything)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tag carries any condition key
    #[must_use]
    pub fn is_condition(tag: &Tag<'_>) -> bool {
        CONDITION_TAGS.iter().any(|key| tag.contains(key))
    }

    /// Parse a field tag
    ///
    /// Returns `Ok(None)` when the tag has no condition keys.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic for malformed tag syntax, bad ranges, `num`
    /// expressions without a bound, invalid patterns, or more than one size key.
    pub fn from_tag(tag: &Tag<'_>) -> Result<Option<Self>, String> {
        tag.check()?;
        if !Self::is_condition(tag) {
            return Ok(None);
        }

        let mut c = Self::new();
        if let Some(msg) = tag.lookup(TAG_REQUIRED) {
            c.required(&msg);
        }
        if let Some(syntax) = tag.lookup(TAG_LEN) {
            let (min, max) = between(&syntax)?;
            c.len(min, max, &tag.get(&msg_key(TAG_LEN)));
        }
        if let Some(pattern) = tag.lookup(TAG_REGEXP) {
            c.regexp(&pattern, &tag.get(&msg_key(TAG_REGEXP)));
        }
        if let Some(msg) = tag.lookup(TAG_EMAIL) {
            c.email(&msg);
        }

        let sizes = [TAG_SIZE, TAG_SIZE_BYTE, TAG_SIZE_KB, TAG_SIZE_MB];
        let mut found = sizes
            .iter()
            .filter_map(|key| tag.lookup(key).map(|syntax| (*key, syntax)));
        if let Some((key, syntax)) = found.next() {
            if let Some((other, _)) = found.next() {
                return Err(format!("only one of `{key}` and `{other}` may be set"));
            }
            let (min, max) = between(&syntax)?;
            let msg = tag
                .lookup(&msg_key(key))
                .or_else(|| tag.lookup(&msg_key(TAG_SIZE)))
                .unwrap_or_default();
            match key {
                TAG_SIZE_KB => c.file_size_kb(min, max, &msg),
                TAG_SIZE_MB => c.file_size_mb(min, max, &msg),
                _ => c.file_size_byte(min, max, &msg),
            };
        }

        if let Some(syntax) = tag.lookup(TAG_MIME) {
            c.file_mime_types(&split_list(&syntax), &tag.get(&msg_key(TAG_MIME)));
        }
        if let Some(syntax) = tag.lookup(TAG_EXTS) {
            c.file_exts(&split_list(&syntax), &tag.get(&msg_key(TAG_EXTS)));
        }
        if let Some(syntax) = tag.lookup(TAG_NUM) {
            let range = read_area(&syntax)?;
            let msg = tag.get(&msg_key(TAG_NUM));
            if let Some(min) = range.min {
                c.num_min(min, range.min_inclusive, &msg);
            }
            if let Some(max) = range.max {
                c.num_max(max, range.max_inclusive, &msg);
            }
        }
        if let Some(syntax) = tag.lookup(TAG_ITEM) {
            let (min, max) = between(&syntax)?;
            c.item(min, max, &tag.get(&msg_key(TAG_ITEM)));
        }
        if let Some(syntax) = tag.lookup(TAG_ENUM) {
            c.enums(&split_list(&syntax), &tag.get(&msg_key(TAG_ENUM)));
        }

        c.validate()?;
        Ok(Some(c))
    }

    /// Report a rule that failed to build (an invalid pattern)
    ///
    /// # Errors
    ///
    /// Returns the stored diagnostic.
    pub fn validate(&self) -> Result<(), String> {
        self.invalid.clone().map_or(Ok(()), Err)
    }

    /// Mark the field required
    pub fn required(&mut self, msg: &str) -> &mut Self {
        self.required = Some(or_default(msg, "required"));
        self
    }

    /// Limit string length, counted in chars
    pub fn len(&mut self, min: u64, max: u64, msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("string length {min}-{max}"));
        self.len = Some(Between { min, max, message });
        self
    }

    /// Require a valid email address
    pub fn email(&mut self, msg: &str) -> &mut Self {
        self.regexp = Some(Pattern {
            regex: EMAIL.clone(),
            message: or_default(msg, "email address format incorrect"),
        });
        self
    }

    /// Require the string to match `pattern`
    ///
    /// An invalid pattern is reported when the schema is built.
    pub fn regexp(&mut self, pattern: &str, msg: &str) -> &mut Self {
        match Regex::new(pattern) {
            Ok(regex) => {
                self.regexp = Some(Pattern {
                    regex,
                    message: or_default(msg, "string format incorrect"),
                });
            }
            Err(e) => self.invalid = Some(format!("invalid pattern `{pattern}`: {e}")),
        }
        self
    }

    /// Limit the number of slice items or uploaded files
    pub fn item(&mut self, min: u64, max: u64, msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("{min}-{max} items"));
        self.item = Some(Between { min, max, message });
        self
    }

    /// Restrict raw values to an allow-list
    pub fn enums(&mut self, values: &[String], msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("one of [{}]", values.join(" ")));
        self.enums = Some(AllowList {
            values: values.to_vec(),
            message,
        });
        self
    }

    /// Set the numeric lower bound
    pub fn num_min(&mut self, min: f64, inclusive: bool, msg: &str) -> &mut Self {
        let range = self.num.get_or_insert_with(NumRange::unbounded);
        range.min = Some(min);
        range.min_inclusive = inclusive;
        range.set_message(msg);
        self
    }

    /// Set the numeric upper bound
    pub fn num_max(&mut self, max: f64, inclusive: bool, msg: &str) -> &mut Self {
        let range = self.num.get_or_insert_with(NumRange::unbounded);
        range.max = Some(max);
        range.max_inclusive = inclusive;
        range.set_message(msg);
        self
    }

    /// Limit each uploaded file's size, in bytes
    pub fn file_size_byte(&mut self, min: u64, max: u64, msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("{min}-{max}Byte"));
        self.file_size = Some(Between { min, max, message });
        self
    }

    /// Limit each uploaded file's size, in KiB
    ///
    /// Bounds that overflow `u64` bytes are reported when the schema is built.
    pub fn file_size_kb(&mut self, min: u64, max: u64, msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("{min}-{max}KB"));
        self.file_size_scaled(min, max, 1 << 10, "KB", &message)
    }

    /// Limit each uploaded file's size, in MiB
    ///
    /// Bounds that overflow `u64` bytes are reported when the schema is built.
    pub fn file_size_mb(&mut self, min: u64, max: u64, msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("{min}-{max}MB"));
        self.file_size_scaled(min, max, 1 << 20, "MB", &message)
    }

    fn file_size_scaled(&mut self, min: u64, max: u64, unit: u64, label: &str, message: &str) -> &mut Self {
        match (min.checked_mul(unit), max.checked_mul(unit)) {
            (Some(min), Some(max)) => self.file_size_byte(min, max, message),
            _ => {
                self.invalid = Some(format!("file size {min}-{max}{label} overflows u64 bytes"));
                self
            }
        }
    }

    /// Restrict upload extensions (`.jpg`)
    pub fn file_exts(&mut self, exts: &[String], msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("file extensions [{}]", exts.join(" ")));
        self.file_exts = Some(AllowList {
            values: exts.to_vec(),
            message,
        });
        self
    }

    /// Restrict upload content types (`image/png`, or just `image`)
    pub fn file_mime_types(&mut self, types: &[String], msg: &str) -> &mut Self {
        let message = or_default(msg, &format!("file types [{}]", types.join(" ")));
        self.file_mime_types = Some(AllowList {
            values: types.to_vec(),
            message,
        });
        self
    }

    /// Required check shared by every kind. `Ok(true)` means keep checking.
    fn present(&self, field: &str, present: bool) -> Result<bool, ValidationError> {
        match (&self.required, present) {
            (_, true) => Ok(true),
            (None, false) => Ok(false),
            (Some(msg), false) => Err(ValidationError::required(field, msg)),
        }
    }

    /// Check a string value (after the default was applied)
    ///
    /// # Errors
    ///
    /// Returns the first failing rule among required, pattern and length.
    pub fn check_str(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        if !self.present(field, !value.is_empty())? {
            return Ok(());
        }
        if let Some(p) = &self.regexp {
            if !p.regex.is_match(value) {
                return Err(ValidationError::new(
                    field,
                    ConditionKind::StringRegexp,
                    &p.message,
                ));
            }
        }
        if let Some(len) = &self.len {
            let n = value.chars().count() as u64;
            if !len.contains(n) {
                return Err(len.error(field, ConditionKind::StringLength));
            }
        }
        Ok(())
    }

    /// Check a decoded number; `raw` is the text it came from
    ///
    /// # Errors
    ///
    /// Returns a required or range failure.
    pub fn check_num(&self, field: &str, raw: &str, value: f64) -> Result<(), ValidationError> {
        if !self.present(field, !raw.is_empty())? {
            return Ok(());
        }
        if let Some(range) = &self.num {
            if !range.accepts(value) {
                let mut e = ValidationError::new(field, ConditionKind::Number, &range.message);
                if let Some(min) = range.min {
                    e = e.with_min(min, range.min_inclusive);
                }
                if let Some(max) = range.max {
                    e = e.with_max(max, range.max_inclusive);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Check the number of values bound into a slice
    ///
    /// # Errors
    ///
    /// Returns a required or item-count failure.
    pub fn check_items(&self, field: &str, count: usize) -> Result<(), ValidationError> {
        if !self.present(field, count > 0)? {
            return Ok(());
        }
        if let Some(item) = &self.item {
            if !item.contains(count as u64) {
                return Err(item.error(field, ConditionKind::Item));
            }
        }
        Ok(())
    }

    /// Check that a timestamp was supplied when required
    ///
    /// # Errors
    ///
    /// Returns a required failure.
    pub fn check_time(&self, field: &str, count: usize) -> Result<(), ValidationError> {
        self.present(field, count > 0).map(|_| ())
    }

    /// Check raw values against the allow-list
    ///
    /// # Errors
    ///
    /// Returns a required or enum failure.
    pub fn check_enum(&self, field: &str, values: &[String]) -> Result<(), ValidationError> {
        if !self.present(field, !values.is_empty())? {
            return Ok(());
        }
        if let Some(allowed) = &self.enums {
            if values.iter().any(|v| !allowed.values.contains(v)) {
                return Err(
                    ValidationError::new(field, ConditionKind::Enums, &allowed.message)
                        .with_enums(&allowed.values),
                );
            }
        }
        Ok(())
    }

    /// Check uploads: required, count, size, extension, content type
    ///
    /// # Errors
    ///
    /// Returns the first failing rule.
    pub fn check_files(&self, field: &str, files: &[UploadedFile]) -> Result<(), ValidationError> {
        if !self.present(field, !files.is_empty())? {
            return Ok(());
        }
        if let Some(item) = &self.item {
            if !item.contains(files.len() as u64) {
                return Err(item.error(field, ConditionKind::Item));
            }
        }
        if let Some(size) = &self.file_size {
            if files.iter().any(|f| !size.contains(f.size)) {
                return Err(size.error(field, ConditionKind::FileSize));
            }
        }
        if let Some(exts) = &self.file_exts {
            if files
                .iter()
                .any(|f| !exts.values.iter().any(|e| e == file_ext(&f.filename)))
            {
                return Err(
                    ValidationError::new(field, ConditionKind::FileExtensions, &exts.message)
                        .with_enums(&exts.values),
                );
            }
        }
        if let Some(types) = &self.file_mime_types {
            if files
                .iter()
                .any(|f| !types.values.iter().any(|t| mime_matches(t, &f.content_type)))
            {
                return Err(
                    ValidationError::new(field, ConditionKind::FileMimeTypes, &types.message)
                        .with_enums(&types.values),
                );
            }
        }
        Ok(())
    }
}

fn or_default(msg: &str, default: &str) -> String {
    if msg.is_empty() {
        default.to_string()
    } else {
        msg.to_string()
    }
}

fn split_list(syntax: &str) -> Vec<String> {
    syntax.split_whitespace().map(str::to_string).collect()
}

/// Extension of the last path element, including the dot
fn file_ext(filename: &str) -> &str {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    name.rfind('.').map_or("", |i| &name[i..])
}

/// `image` matches any `image/*`; anything with a slash must match exactly
fn mime_matches(allowed: &str, got: &str) -> bool {
    if allowed == got {
        return true;
    }
    if allowed.contains('/') {
        return false;
    }
    got.split_once('/').map_or(got, |(primary, _)| primary) == allowed
}

/// Parse `"6-12"` or `"12"` (meaning `1-12`); reversed bounds are swapped
fn between(syntax: &str) -> Result<(u64, u64), String> {
    let s: String = syntax.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || format!(r#"range `{syntax}` should be like "1-18" or just "18""#);
    if let Some(caps) = BETWEEN.captures(&s) {
        let min: u64 = caps[1].parse().map_err(|_| invalid())?;
        let max: u64 = caps[2].parse().map_err(|_| invalid())?;
        return Ok(if min > max { (max, min) } else { (min, max) });
    }
    match s.parse::<u64>() {
        Ok(max) if max > 0 => Ok((1, max)),
        _ => Err(invalid()),
    }
}

/// Parse a `num` expression into independent bounds
fn read_area(syntax: &str) -> Result<NumRange, String> {
    let s: String = syntax.chars().filter(|c| !c.is_whitespace()).collect();
    let bound = |re: &Regex, num: usize, op: usize, inclusive: &str| -> Result<Option<(f64, bool)>, String> {
        re.captures(&s).map_or(Ok(None), |caps| {
            caps[num]
                .parse::<f64>()
                .map(|n| Some((n, &caps[op] == inclusive)))
                .map_err(|e| format!("invalid number in `{syntax}`: {e}"))
        })
    };

    let mut range = NumRange::unbounded();
    let lower = match bound(&RIGHT_GT, 1, 2, "<=")? {
        Some(b) => Some(b),
        None => bound(&LEFT_GT, 2, 1, ">=")?,
    };
    let upper = match bound(&RIGHT_LT, 1, 2, ">=")? {
        Some(b) => Some(b),
        None => bound(&LEFT_LT, 2, 1, "<=")?,
    };
    if let Some((min, inclusive)) = lower {
        range.min = Some(min);
        range.min_inclusive = inclusive;
    }
    if let Some((max, inclusive)) = upper {
        range.max = Some(max);
        range.max_inclusive = inclusive;
    }
    if range.min.is_none() && range.max.is_none() {
        return Err(format!("num expression `{syntax}` has no bound"));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Bytes;

    fn parse(tag: &str) -> Condition {
        Condition::from_tag(&Tag::new(tag)).unwrap().unwrap()
    }

    fn upload(name: &str, size: usize, content_type: &str) -> UploadedFile {
        UploadedFile::new(name, content_type, Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn test_no_condition_keys() {
        assert!(Condition::from_tag(&Tag::new(r#"param:"name" desc:"x""#))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_num_inclusive_lower() {
        let c = parse(r#"num:"2<=x<4""#);
        assert!(c.check_num("n", "2", 2.0).is_ok());
        assert!(c.check_num("n", "3", 3.0).is_ok());
        assert!(c.check_num("n", "1", 1.0).is_err());
        assert!(c.check_num("n", "4", 4.0).is_err());
        assert_eq!(c.num.unwrap().message, "2<=x<4");
    }

    #[test]
    fn test_num_inclusive_upper() {
        let c = parse(r#"num:"2<x<=4""#);
        assert!(c.check_num("n", "3", 3.0).is_ok());
        assert!(c.check_num("n", "4", 4.0).is_ok());
        assert!(c.check_num("n", "2", 2.0).is_err());
        assert!(c.check_num("n", "5", 5.0).is_err());
    }

    #[test]
    fn test_num_variable_first() {
        let c = parse(r#"num:"x >= -1.5""#);
        let range = c.num.clone().unwrap();
        assert_eq!(range.min, Some(-1.5));
        assert!(range.min_inclusive);
        assert_eq!(range.max, None);

        let c = parse(r#"num:"4>x""#);
        let range = c.num.unwrap();
        assert_eq!(range.max, Some(4.0));
        assert!(!range.max_inclusive);
    }

    #[test]
    fn test_num_error_bounds() {
        let c = parse(r#"num:"2<=x<4" num-msg:"pick 2 or 3""#);
        let err = c.check_num("n", "9", 9.0).unwrap_err();
        assert_eq!(err.kind, ConditionKind::Number);
        assert_eq!(err.message, "pick 2 or 3");
        assert_eq!(err.min, Some(2.0));
        assert!(err.min_inclusive);
        assert_eq!(err.max, Some(4.0));
        assert!(!err.max_inclusive);
    }

    #[test]
    fn test_num_without_bound_is_error() {
        assert!(Condition::from_tag(&Tag::new(r#"num:"x""#)).is_err());
        assert!(Condition::from_tag(&Tag::new(r#"num:"between two and four""#)).is_err());
    }

    #[test]
    fn test_len_counts_chars() {
        let c = parse(r#"len:"2-4""#);
        assert!(c.check_str("s", "一二").is_ok());
        assert!(c.check_str("s", "一").is_err());
        assert!(c.check_str("s", "一二三四五").is_err());
        assert!(c.check_str("s", "").is_ok());
    }

    #[test]
    fn test_required_then_len() {
        let c = parse(r#"required:"x" len:"6-12""#);
        let err = c.check_str("pwd", "abc").unwrap_err();
        assert_eq!(err.kind, ConditionKind::StringLength);
        assert_eq!(err.message, "string length 6-12");
        let err = c.check_str("pwd", "").unwrap_err();
        assert_eq!(err.kind, ConditionKind::Required);
        assert_eq!(err.message, "x");
    }

    #[test]
    fn test_between_forms() {
        assert_eq!(between("6-12"), Ok((6, 12)));
        assert_eq!(between("12 - 6"), Ok((6, 12)));
        assert_eq!(between("5"), Ok((1, 5)));
        assert!(between("0").is_err());
        assert!(between("a-b").is_err());
        assert!(Condition::from_tag(&Tag::new(r#"len:"x""#)).is_err());
    }

    #[test]
    fn test_enum() {
        let c = parse(r#"required:"" enum:"1 2 3""#);
        assert!(c.check_enum("e", &["2".to_string()]).is_ok());
        let err = c.check_enum("e", &["5".to_string()]).unwrap_err();
        assert_eq!(err.kind, ConditionKind::Enums);
        assert_eq!(err.message, "one of [1 2 3]");
        assert_eq!(err.enums, vec!["1", "2", "3"]);
        let err = c.check_enum("e", &[]).unwrap_err();
        assert_eq!(err.kind, ConditionKind::Required);
        assert_eq!(err.message, "required");
    }

    #[test]
    fn test_regexp_and_email() {
        let c = parse(r#"reg:"^\\d+$" reg-msg:"digits only""#);
        assert!(c.check_str("s", "123").is_ok());
        assert_eq!(c.check_str("s", "12a").unwrap_err().message, "digits only");

        let c = parse(r#"email:"""#);
        assert!(c.check_str("m", "author@example.com").is_ok());
        let err = c.check_str("m", "author@examplecom").unwrap_err();
        assert_eq!(err.message, "email address format incorrect");
    }

    #[test]
    fn test_invalid_regexp_is_error() {
        assert!(Condition::from_tag(&Tag::new(r#"reg:"([""#)).is_err());
        let mut c = Condition::new();
        c.regexp("(", "");
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_file_size_overflow_is_error() {
        let err = Condition::from_tag(&Tag::new(r#"size-MB:"1-18014398509481984""#)).unwrap_err();
        assert!(err.contains("overflows"));
        let mut c = Condition::new();
        c.file_size_kb(1, u64::MAX, "");
        assert!(c.validate().is_err());
        assert!(c.file_size.is_none());
    }

    #[test]
    fn test_items() {
        let c = parse(r#"item:"2-3""#);
        assert!(c.check_items("s", 0).is_ok());
        assert!(c.check_items("s", 2).is_ok());
        let err = c.check_items("s", 4).unwrap_err();
        assert_eq!(err.message, "2-3 items");
        assert_eq!(err.max, Some(3.0));
    }

    #[test]
    fn test_file_size_kb() {
        let c = parse(r#"size-KB:"1-3""#);
        let size = c.file_size.clone().unwrap();
        assert_eq!((size.min, size.max), (1024, 3072));
        assert_eq!(size.message, "1-3KB");
        assert!(c.check_files("f", &[upload("a.txt", 2048, "text/plain")]).is_ok());
        let err = c
            .check_files("f", &[upload("a.txt", 4096, "text/plain")])
            .unwrap_err();
        assert_eq!(err.kind, ConditionKind::FileSize);
    }

    #[test]
    fn test_size_msg_fallback() {
        let c = parse(r#"size-MB:"1-2" size-msg:"too big""#);
        let size = c.file_size.unwrap();
        assert_eq!(size.max, 2 << 20);
        assert_eq!(size.message, "too big");
        assert!(Condition::from_tag(&Tag::new(r#"size:"1-2" size-KB:"1-2""#)).is_err());
    }

    #[test]
    fn test_file_exts_and_mime() {
        let c = parse(r#"exts:".jpg .png" mime:"image text/plain""#);
        assert!(c.check_files("f", &[upload("a.png", 1, "image/png")]).is_ok());
        assert!(c.check_files("f", &[upload("dir/a.jpg", 1, "text/plain")]).is_ok());
        let err = c.check_files("f", &[upload("a.gif", 1, "image/gif")]).unwrap_err();
        assert_eq!(err.kind, ConditionKind::FileExtensions);
        let err = c
            .check_files("f", &[upload("a.png", 1, "text/html")])
            .unwrap_err();
        assert_eq!(err.kind, ConditionKind::FileMimeTypes);
        assert_eq!(err.message, "file types [image text/plain]");
    }

    #[test]
    fn test_required_file() {
        let c = parse(r#"required:"upload one""#);
        let err = c.check_files("f", &[]).unwrap_err();
        assert_eq!(err.message, "upload one");
        assert!(c.check_time("t", 0).is_err());
        assert!(c.check_time("t", 1).is_ok());
    }

    #[test]
    fn test_builder_messages() {
        let mut c = Condition::new();
        c.num_min(1.0, true, "").num_max(10.0, false, "");
        assert_eq!(c.num.clone().unwrap().message, "1<=x<10");
        c.num_max(5.0, true, "at most five");
        assert_eq!(c.num.unwrap().message, "at most five");
    }

    #[test]
    fn test_mime_helpers() {
        assert!(mime_matches("image", "image/png"));
        assert!(!mime_matches("image/jpeg", "image/png"));
        assert!(mime_matches("text", "text"));
        assert_eq!(file_ext("a.tar.gz"), ".gz");
        assert_eq!(file_ext("noext"), "");
    }
}
