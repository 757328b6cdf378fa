use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::filter::sql::{self, Bind, SqlFragment};
use crate::filter::{CourseDocument, Field, Filter, Projection, Sort, SortOrder};
use crate::models::{Course, CourseId, CoursePatch, NewCourse, ValidationMode};

/// Store-reported outcome of a direct update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Which state `find_one_and_update` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

#[derive(Clone, Debug)]
pub struct CourseRepository {
    db: SqlitePool,
    validation: ValidationMode,
}

fn decode(row: &SqliteRow) -> Result<Course, StoreError> {
    let body: String = row.try_get("body")?;
    Ok(serde_json::from_str(&body)?)
}

fn decode_document(row: &SqliteRow) -> Result<CourseDocument, StoreError> {
    let body: String = row.try_get("body")?;
    Ok(serde_json::from_str(&body)?)
}

impl CourseRepository {
    pub(crate) fn new(db: SqlitePool, validation: ValidationMode) -> Self {
        Self { db, validation }
    }

    pub async fn create(&self, req: NewCourse) -> Result<Course, StoreError> {
        let course = req.into_course();
        if let Err(e) = course.validate(self.validation) {
            warn!("rejected new course: {}", e);
            return Err(e.into());
        }

        let body = serde_json::to_string(&course)?;
        sqlx::query("INSERT INTO courses (id, body) VALUES (?1, ?2)")
            .bind(course.id.to_string())
            .bind(body)
            .execute(&self.db)
            .await?;

        debug!("created course {}", course.id);
        Ok(course)
    }

    pub async fn find_by_id(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        let row = sqlx::query("SELECT id, body FROM courses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    /// Starts a lazy query; nothing runs until the query is awaited.
    pub fn find(&self, filter: Filter) -> CourseQuery {
        CourseQuery {
            db: self.db.clone(),
            filter,
            sort: Sort::new(),
            skip: 0,
            limit: None,
        }
    }

    /// Fetches the course, merges `patch`, validates the whole record and
    /// writes it back. `None` when no course has this id.
    pub async fn update_by_fetch(
        &self,
        id: &CourseId,
        patch: CoursePatch,
    ) -> Result<Option<Course>, StoreError> {
        let mut course = match self.find_by_id(id).await? {
            Some(c) => c,
            None => {
                debug!("update_by_fetch: course {} not found", id);
                return Ok(None);
            }
        };

        course.set(patch);
        if let Err(e) = course.validate(self.validation) {
            warn!("rejected update of course {}: {}", id, e);
            return Err(e.into());
        }

        if !self.replace(&course).await? {
            debug!("update_by_fetch: course {} removed before save", id);
            return Ok(None);
        }
        Ok(Some(course))
    }

    async fn replace(&self, course: &Course) -> Result<bool, StoreError> {
        let body = serde_json::to_string(course)?;
        let affected = sqlx::query("UPDATE courses SET body = ?1 WHERE id = ?2")
            .bind(body)
            .bind(course.id.to_string())
            .execute(&self.db)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }

    /// Applies `patch` to every course matching `filter` inside the store,
    /// without loading them. Only the values carried by the patch are checked,
    /// so separate patches to `isPublished` and `tags` can leave a record that
    /// a later `update_by_fetch` rejects until both fields are fixed together.
    pub async fn update_direct(
        &self,
        filter: Filter,
        patch: CoursePatch,
    ) -> Result<UpdateResult, StoreError> {
        if let Err(e) = patch.validate(self.validation) {
            warn!("rejected direct update: {}", e);
            return Err(e.into());
        }

        let condition = sql::compile(&filter)?;
        let mut count = SqlFragment::new("SELECT COUNT(*) FROM courses WHERE ");
        count.append(condition.clone());

        let mut tx = self.db.begin().await?;
        let matched: i64 = count.query().fetch_one(&mut *tx).await?.try_get(0usize)?;

        let modified = if matched == 0 || patch.is_empty() {
            0
        } else {
            let set = sql::json_set(&patch.assignments())?;
            let mut update = SqlFragment::new("UPDATE courses SET body = ");
            update
                .append(set.clone())
                .push(" WHERE ")
                .append(condition)
                .push(" AND body IS NOT ")
                .append(set);
            update.query().execute(&mut *tx).await?.rows_affected()
        };
        tx.commit().await?;

        let result = UpdateResult {
            matched: matched as u64,
            modified,
        };
        debug!("update_direct: {:?}", result);
        Ok(result)
    }

    /// Patches the first course matching `filter` (storage order) and returns
    /// it as it was before or after the write.
    pub async fn find_one_and_update(
        &self,
        filter: Filter,
        patch: CoursePatch,
        returning: ReturnDocument,
    ) -> Result<Option<Course>, StoreError> {
        if let Err(e) = patch.validate(self.validation) {
            warn!("rejected direct update: {}", e);
            return Err(e.into());
        }

        let select = sql::select_courses(&filter, &Sort::new(), 0, Some(1))?;
        let mut tx = self.db.begin().await?;

        let before = match select.query().fetch_optional(&mut *tx).await? {
            Some(row) => decode(&row)?,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };
        if patch.is_empty() {
            tx.commit().await?;
            return Ok(Some(before));
        }

        let mut update = SqlFragment::new("UPDATE courses SET body = ");
        update
            .append(sql::json_set(&patch.assignments())?)
            .push(" WHERE id = ")
            .bind(Bind::Text(before.id.to_string()))
            .push(" RETURNING body");
        let after = decode(&update.query().fetch_one(&mut *tx).await?)?;
        tx.commit().await?;

        debug!("find_one_and_update: course {}", before.id);
        Ok(Some(match returning {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        }))
    }

    /// Deletes the course and returns its last state, or `None` if absent.
    pub async fn remove(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        let row = sqlx::query("DELETE FROM courses WHERE id = ? RETURNING id, body")
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;

        debug!("remove: course {} {}", id, if row.is_some() { "deleted" } else { "not found" });
        row.as_ref().map(decode).transpose()
    }

    pub async fn delete_many(&self, filter: Filter) -> Result<DeleteResult, StoreError> {
        let mut delete = SqlFragment::new("DELETE FROM courses WHERE ");
        delete.append(sql::compile(&filter)?);
        let deleted = delete.query().execute(&self.db).await?.rows_affected();

        debug!("delete_many: {} deleted", deleted);
        Ok(DeleteResult { deleted })
    }
}

/// A lazily evaluated `find`. Builders mirror `sort`, `skip`, `limit` and
/// `select`; `all`, `first`, `count` and `cursor` execute it.
#[derive(Clone, Debug)]
pub struct CourseQuery {
    db: SqlitePool,
    filter: Filter,
    sort: Sort,
    skip: u64,
    limit: Option<u64>,
}

impl CourseQuery {
    /// Adds `filter` to the conditions already on this query.
    pub fn and(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    /// Requires at least one of `filters` in addition to the current conditions.
    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(Filter::Or(filters));
        self
    }

    pub fn sort(mut self, field: Field, order: SortOrder) -> Self {
        self.sort = std::mem::take(&mut self.sort).then(field, order);
        self
    }

    pub fn sort_by(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// `"name -date"` style sort.
    pub fn sort_str(self, keys: &str) -> Result<Self, StoreError> {
        Ok(self.sort_by(Sort::parse(keys)?))
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Caps the number of results. `limit(0)` means no limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Offset pagination; page numbers start at 1.
    pub fn page(self, number: u64, size: u64) -> Self {
        let number = number.max(1);
        self.skip((number - 1).saturating_mul(size)).limit(size)
    }

    pub fn select<I: IntoIterator<Item = Field>>(self, fields: I) -> ProjectedQuery {
        ProjectedQuery {
            query: self,
            projection: Projection::new(fields),
        }
    }

    /// `"name author"` style projection.
    pub fn select_str(self, keys: &str) -> Result<ProjectedQuery, StoreError> {
        Ok(ProjectedQuery {
            query: self,
            projection: Projection::parse(keys)?,
        })
    }

    fn fragment(&self) -> Result<SqlFragment, StoreError> {
        sql::select_courses(&self.filter, &self.sort, self.skip, self.limit)
    }

    pub async fn all(&self) -> Result<Vec<Course>, StoreError> {
        let fragment = self.fragment()?;
        let rows = fragment.query().fetch_all(&self.db).await?;
        debug!("find: {} rows", rows.len());
        rows.iter().map(decode).collect()
    }

    pub async fn first(&self) -> Result<Option<Course>, StoreError> {
        let limit = self.limit.map_or(1, |l| l.min(1));
        let fragment = sql::select_courses(&self.filter, &self.sort, self.skip, Some(limit))?;
        let row = fragment.query().fetch_optional(&self.db).await?;
        row.as_ref().map(decode).transpose()
    }

    /// Number of matching courses after `skip` and `limit` are applied.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let fragment = sql::count_courses(&self.filter, self.skip, self.limit)?;
        let count: i64 = fragment.query().fetch_one(&self.db).await?.try_get(0usize)?;
        Ok(count as u64)
    }

    /// Compiles the query into a cursor that can be streamed.
    pub fn cursor(&self) -> Result<Cursor, StoreError> {
        Ok(Cursor {
            db: self.db.clone(),
            fragment: self.fragment()?,
        })
    }
}

/// A compiled query whose rows are pulled from the store one at a time.
#[derive(Debug)]
pub struct Cursor {
    db: SqlitePool,
    fragment: SqlFragment,
}

impl Cursor {
    pub fn stream(&self) -> BoxStream<'_, Result<Course, StoreError>> {
        self.fragment
            .query()
            .fetch(&self.db)
            .map(|row| row.map_err(StoreError::from).and_then(|row| decode(&row)))
            .boxed()
    }
}

/// A query restricted to a set of fields. Results are plain documents.
#[derive(Clone, Debug)]
pub struct ProjectedQuery {
    query: CourseQuery,
    projection: Projection,
}

impl ProjectedQuery {
    pub fn sort(mut self, field: Field, order: SortOrder) -> Self {
        self.query = self.query.sort(field, order);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query = self.query.skip(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub fn page(mut self, number: u64, size: u64) -> Self {
        self.query = self.query.page(number, size);
        self
    }

    pub async fn all(&self) -> Result<Vec<CourseDocument>, StoreError> {
        let fragment = self.query.fragment()?;
        let rows = fragment.query().fetch_all(&self.query.db).await?;
        rows.iter()
            .map(|row| decode_document(row).map(|doc| self.projection.apply(doc)))
            .collect()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.query.count().await
    }
}
