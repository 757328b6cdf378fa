//! Typed query expressions over course documents.
//!
//! A [`Filter`] is built from [`Field`] constructors and combined with
//! [`Filter::and`] / [`Filter::or`]:
//!
//! ```rust,ignore
//! use course_store::filter::{Field, Filter};
//!
//! let filter = Field::IsPublished
//!     .eq(true)
//!     .and(Field::Name.contains("by").ignore_case().or(Field::Price.gte(15.0)));
//! ```

pub(crate) mod sql;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Map;

use crate::error::StoreError;
use crate::models::{Category, CourseId};

/// A projected course: `_id` plus the selected keys.
pub type CourseDocument = Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Category,
    Author,
    Tags,
    Date,
    IsPublished,
    Price,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Id,
        Field::Name,
        Field::Category,
        Field::Author,
        Field::Tags,
        Field::Date,
        Field::IsPublished,
        Field::Price,
    ];

    /// The key this field is stored under.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Id => "_id",
            Field::Name => "name",
            Field::Category => "category",
            Field::Author => "author",
            Field::Tags => "tags",
            Field::Date => "date",
            Field::IsPublished => "isPublished",
            Field::Price => "price",
        }
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(self, Field::Tags)
    }

    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Eq(self, value.into())
    }

    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Ne(self, value.into())
    }

    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Cmp(self, CmpOp::Gt, value.into())
    }

    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Cmp(self, CmpOp::Gte, value.into())
    }

    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Cmp(self, CmpOp::Lt, value.into())
    }

    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Cmp(self, CmpOp::Lte, value.into())
    }

    /// Inclusive range.
    pub fn between<V: Into<Value>>(self, low: V, high: V) -> Filter {
        Filter::And(vec![self.gte(low), self.lte(high)])
    }

    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(self, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Nin(self, values.into_iter().map(Into::into).collect())
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> Filter {
        Filter::Matches(self, Pattern::new(TextPattern::StartsWith(prefix.into())))
    }

    pub fn ends_with(self, suffix: impl Into<String>) -> Filter {
        Filter::Matches(self, Pattern::new(TextPattern::EndsWith(suffix.into())))
    }

    pub fn contains(self, needle: impl Into<String>) -> Filter {
        Filter::Matches(self, Pattern::new(TextPattern::Contains(needle.into())))
    }

    pub fn matches(self, regex: impl Into<String>) -> Filter {
        Filter::Matches(self, Pattern::new(TextPattern::Regex(regex.into())))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "_id" | "id" => Ok(Field::Id),
            "isPublished" | "is_published" => Ok(Field::IsPublished),
            other => Field::ALL
                .iter()
                .copied()
                .find(|f| f.key() == other)
                .ok_or_else(|| StoreError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<Value>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Category> for Value {
    fn from(v: Category) -> Self {
        Value::Str(v.as_str().to_string())
    }
}

impl From<CourseId> for Value {
    fn from(v: CourseId) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&CourseId> for Value {
    fn from(v: &CourseId) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextPattern {
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Regex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub text: TextPattern,
    pub case_insensitive: bool,
}

impl Pattern {
    pub fn new(text: TextPattern) -> Self {
        Self {
            text,
            case_insensitive: false,
        }
    }

    /// The regular expression this pattern is evaluated with.
    pub fn to_regex(&self) -> String {
        let body = match &self.text {
            TextPattern::StartsWith(s) => format!("^{}", regex::escape(s)),
            TextPattern::EndsWith(s) => format!("{}$", regex::escape(s)),
            TextPattern::Contains(s) => regex::escape(s),
            TextPattern::Regex(r) => r.clone(),
        };
        if self.case_insensitive {
            format!("(?i){}", body)
        } else {
            body
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    #[default]
    All,
    Eq(Field, Value),
    Ne(Field, Value),
    Cmp(Field, CmpOp, Value),
    In(Field, Vec<Value>),
    Nin(Field, Vec<Value>),
    Matches(Field, Pattern),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn by_id(id: &CourseId) -> Self {
        Field::Id.eq(id)
    }

    pub fn all_of(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn any_of(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut fs), Filter::And(more)) => {
                fs.extend(more);
                Filter::And(fs)
            }
            (Filter::And(mut fs), f) => {
                fs.push(f);
                Filter::And(fs)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::Or(mut fs), Filter::Or(more)) => {
                fs.extend(more);
                Filter::Or(fs)
            }
            (Filter::Or(mut fs), f) => {
                fs.push(f);
                Filter::Or(fs)
            }
            (a, b) => Filter::Or(vec![a, b]),
        }
    }

    /// Makes text patterns in this filter case-insensitive.
    pub fn ignore_case(self) -> Self {
        match self {
            Filter::Matches(field, mut pattern) => {
                pattern.case_insensitive = true;
                Filter::Matches(field, pattern)
            }
            Filter::And(fs) => Filter::And(fs.into_iter().map(Filter::ignore_case).collect()),
            Filter::Or(fs) => Filter::Or(fs.into_iter().map(Filter::ignore_case).collect()),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort(Vec<(Field, SortOrder)>);

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(field: Field, order: SortOrder) -> Self {
        Self(vec![(field, order)])
    }

    pub fn then(mut self, field: Field, order: SortOrder) -> Self {
        self.0.push((field, order));
        self
    }

    /// Parses `"name -date"`: space separated keys, `-` for descending.
    pub fn parse(keys: &str) -> Result<Self, StoreError> {
        keys.split_whitespace()
            .map(|token| match token.strip_prefix('-') {
                Some(key) => key.parse::<Field>().map(|f| (f, SortOrder::Descending)),
                None => token.parse::<Field>().map(|f| (f, SortOrder::Ascending)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Sort)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> &[(Field, SortOrder)] {
        &self.0
    }
}

/// The set of fields a query returns. `_id` is always included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection(Vec<Field>);

impl Projection {
    pub fn new<I: IntoIterator<Item = Field>>(fields: I) -> Self {
        let mut out: Vec<Field> = Vec::new();
        for f in fields {
            if !out.contains(&f) {
                out.push(f);
            }
        }
        Self(out)
    }

    /// Parses `"name author"`.
    pub fn parse(keys: &str) -> Result<Self, StoreError> {
        keys.split_whitespace()
            .map(str::parse::<Field>)
            .collect::<Result<Vec<Field>, _>>()
            .map(Self::new)
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub(crate) fn apply(&self, mut document: CourseDocument) -> CourseDocument {
        document.retain(|key, _| {
            key.as_str() == Field::Id.key() || self.0.iter().any(|f| f.key() == key.as_str())
        });
        document
    }
}
