use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(Uuid);

impl CourseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CourseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CourseId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Web,
    Mobile,
    Network,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Web, Category::Mobile, Category::Network];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Web => "web",
            Category::Mobile => "mobile",
            Category::Network => "network",
        }
    }
}

/// A stored course document. Serializes to the wire shape used in the
/// `courses` collection, with the identifier under `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: CourseId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    pub is_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Course {
    /// Merges every field present in `patch` into this record.
    pub fn set(&mut self, patch: CoursePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(category) = patch.category {
            self.category = Some(category);
        }
        if let Some(author) = patch.author {
            self.author = author;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(date) = patch.date {
            self.date = timestamp::truncate(date);
        }
        if let Some(is_published) = patch.is_published {
            self.is_published = is_published;
        }
        if let Some(price) = patch.price {
            self.price = Some(price);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub name: String,
    #[serde(default)]
    pub category: Option<Category>,
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "timestamp::option")]
    pub date: Option<DateTime<Utc>>,
    pub is_published: bool,
    #[serde(default)]
    pub price: Option<f64>,
}

impl NewCourse {
    pub fn new(name: impl Into<String>, author: impl Into<String>, is_published: bool) -> Self {
        Self {
            name: name.into(),
            category: None,
            author: author.into(),
            tags: Vec::new(),
            date: None,
            is_published,
            price: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Assigns a fresh identifier and fills `date` with the current time when unset.
    pub fn into_course(self) -> Course {
        Course {
            id: CourseId::new(),
            name: self.name,
            category: self.category,
            author: self.author,
            tags: self.tags,
            date: self.date.map(timestamp::truncate).unwrap_or_else(timestamp::now),
            is_published: self.is_published,
            price: self.price,
        }
    }
}

/// A partial update. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub date: Option<DateTime<Utc>>,
    pub is_published: Option<bool>,
    pub price: Option<f64>,
}

impl CoursePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.author.is_none()
            && self.tags.is_none()
            && self.date.is_none()
            && self.is_published.is_none()
            && self.price.is_none()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn published(mut self, is_published: bool) -> Self {
        self.is_published = Some(is_published);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// `(json path, json value)` pairs in a stable order, for `json_set`.
    pub(crate) fn assignments(&self) -> Vec<(&'static str, serde_json::Value)> {
        use serde_json::Value;

        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(("$.name", Value::from(name.as_str())));
        }
        if let Some(category) = &self.category {
            out.push(("$.category", Value::from(category.as_str())));
        }
        if let Some(author) = &self.author {
            out.push(("$.author", Value::from(author.as_str())));
        }
        if let Some(tags) = &self.tags {
            out.push(("$.tags", Value::from(tags.clone())));
        }
        if let Some(date) = &self.date {
            out.push(("$.date", Value::from(timestamp::format(date))));
        }
        if let Some(is_published) = self.is_published {
            out.push(("$.isPublished", Value::from(is_published)));
        }
        if let Some(price) = self.price {
            out.push(("$.price", Value::from(price)));
        }
        out
    }
}

/// Fixed-width RFC 3339 timestamps (UTC, microseconds) so that stored dates
/// compare lexically in time order.
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn now() -> DateTime<Utc> {
        truncate(Utc::now())
    }

    pub fn truncate(dt: DateTime<Utc>) -> DateTime<Utc> {
        dt.trunc_subsecs(6)
    }

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
