use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

use crate::error::StoreError;
use crate::filter::{Field, Filter, Pattern, Sort, SortOrder, Value};
use crate::models::course::timestamp;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bind {
    Text(String),
    Real(f64),
    Int(i64),
}

/// A piece of SQL with its positional parameters, in order.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn bind(&mut self, bind: Bind) -> &mut Self {
        self.sql.push('?');
        self.binds.push(bind);
        self
    }

    pub fn append(&mut self, other: SqlFragment) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.binds.extend(other.binds);
        self
    }

    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                Bind::Text(s) => query.bind(s.clone()),
                Bind::Real(n) => query.bind(*n),
                Bind::Int(i) => query.bind(*i),
            };
        }
        query
    }
}

fn field_expr(field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::Name => "json_extract(body, '$.name')",
        Field::Category => "json_extract(body, '$.category')",
        Field::Author => "json_extract(body, '$.author')",
        Field::Tags => "json_extract(body, '$.tags')",
        Field::Date => "json_extract(body, '$.date')",
        Field::IsPublished => "json_extract(body, '$.isPublished')",
        Field::Price => "json_extract(body, '$.price')",
    }
}

const ELEMENT_SCAN: &str = "SELECT 1 FROM json_each(courses.body, '$.tags') AS t WHERE t.value ";

fn scalar_bind(value: &Value) -> Result<Bind, StoreError> {
    Ok(match value {
        Value::Str(s) => Bind::Text(s.clone()),
        Value::Number(n) => Bind::Real(*n),
        // json_extract yields 1/0 for true/false
        Value::Bool(b) => Bind::Int(i64::from(*b)),
        Value::Date(d) => Bind::Text(timestamp::format(d)),
        Value::List(_) => Bind::Text(json_text(value)?),
    })
}

fn json_text(value: &Value) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&to_json(value))?)
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Str(s) => serde_json::Value::from(s.as_str()),
        Value::Number(n) => serde_json::Value::from(*n),
        Value::Bool(b) => serde_json::Value::from(*b),
        Value::Date(d) => serde_json::Value::from(timestamp::format(d)),
        Value::List(vs) => serde_json::Value::Array(vs.iter().map(to_json).collect()),
    }
}

fn bind_list(out: &mut SqlFragment, values: &[Value]) -> Result<(), StoreError> {
    out.push("(");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.bind(scalar_bind(v)?);
    }
    out.push(")");
    Ok(())
}

/// Compiles `filter` into a boolean SQL expression over the `courses` table.
pub(crate) fn compile(filter: &Filter) -> Result<SqlFragment, StoreError> {
    let mut out = SqlFragment::default();
    write_filter(filter, &mut out)?;
    Ok(out)
}

fn write_filter(filter: &Filter, out: &mut SqlFragment) -> Result<(), StoreError> {
    match filter {
        Filter::All => {
            out.push("1");
        }
        Filter::Eq(field, value @ Value::List(_)) if field.is_array() => {
            out.push(field_expr(*field))
                .push(" IS json(")
                .bind(Bind::Text(json_text(value)?))
                .push(")");
        }
        Filter::Ne(field, value @ Value::List(_)) if field.is_array() => {
            out.push(field_expr(*field))
                .push(" IS NOT json(")
                .bind(Bind::Text(json_text(value)?))
                .push(")");
        }
        Filter::Eq(field, value) if field.is_array() => {
            out.push("EXISTS (").push(ELEMENT_SCAN).push("= ").bind(scalar_bind(value)?).push(")");
        }
        Filter::Ne(field, value) if field.is_array() => {
            out.push("NOT EXISTS (")
                .push(ELEMENT_SCAN)
                .push("= ")
                .bind(scalar_bind(value)?)
                .push(")");
        }
        Filter::Eq(field, value) => {
            out.push(field_expr(*field)).push(" = ").bind(scalar_bind(value)?);
        }
        Filter::Ne(field, value) => {
            out.push(field_expr(*field)).push(" IS NOT ").bind(scalar_bind(value)?);
        }
        Filter::Cmp(field, op, value) if field.is_array() => {
            out.push("EXISTS (")
                .push(ELEMENT_SCAN)
                .push(op.as_sql())
                .push(" ")
                .bind(scalar_bind(value)?)
                .push(")");
        }
        Filter::Cmp(field, op, value) => {
            out.push(field_expr(*field))
                .push(" ")
                .push(op.as_sql())
                .push(" ")
                .bind(scalar_bind(value)?);
        }
        Filter::In(_, values) if values.is_empty() => {
            out.push("0");
        }
        Filter::Nin(_, values) if values.is_empty() => {
            out.push("1");
        }
        Filter::In(field, values) if field.is_array() => {
            out.push("EXISTS (").push(ELEMENT_SCAN).push("IN ");
            bind_list(out, values)?;
            out.push(")");
        }
        Filter::Nin(field, values) if field.is_array() => {
            out.push("NOT EXISTS (").push(ELEMENT_SCAN).push("IN ");
            bind_list(out, values)?;
            out.push(")");
        }
        Filter::In(field, values) => {
            out.push(field_expr(*field)).push(" IN ");
            bind_list(out, values)?;
        }
        Filter::Nin(field, values) => {
            let expr = field_expr(*field);
            out.push("(").push(expr).push(" IS NULL OR ").push(expr).push(" NOT IN ");
            bind_list(out, values)?;
            out.push(")");
        }
        Filter::Matches(field, pattern) => {
            let regex = checked_regex(pattern)?;
            if field.is_array() {
                out.push("EXISTS (").push(ELEMENT_SCAN).push("REGEXP ").bind(Bind::Text(regex)).push(")");
            } else {
                out.push(field_expr(*field)).push(" REGEXP ").bind(Bind::Text(regex));
            }
        }
        Filter::And(filters) => write_group(filters, " AND ", "1", out)?,
        Filter::Or(filters) => write_group(filters, " OR ", "0", out)?,
    }
    Ok(())
}

fn write_group(
    filters: &[Filter],
    joiner: &str,
    empty: &str,
    out: &mut SqlFragment,
) -> Result<(), StoreError> {
    if filters.is_empty() {
        out.push(empty);
        return Ok(());
    }
    out.push("(");
    for (i, f) in filters.iter().enumerate() {
        if i > 0 {
            out.push(joiner);
        }
        write_filter(f, out)?;
    }
    out.push(")");
    Ok(())
}

fn checked_regex(pattern: &Pattern) -> Result<String, StoreError> {
    let regex = pattern.to_regex();
    regex::Regex::new(&regex)?;
    Ok(regex)
}

pub(crate) fn order_by(sort: &Sort) -> String {
    let mut terms: Vec<String> = sort
        .keys()
        .iter()
        .map(|(field, order)| {
            let dir = match order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            format!("{} {}", field_expr(*field), dir)
        })
        .collect();
    terms.push("rowid ASC".to_string());
    terms.join(", ")
}

fn page_clause(out: &mut SqlFragment, skip: u64, limit: Option<u64>) {
    // SQLite needs a LIMIT before OFFSET; -1 means no limit, and so does 0.
    let limit = limit
        .filter(|&l| l > 0)
        .map(|l| l.min(i64::MAX as u64) as i64)
        .unwrap_or(-1);
    let skip = skip.min(i64::MAX as u64) as i64;
    out.push(" LIMIT ").bind(Bind::Int(limit)).push(" OFFSET ").bind(Bind::Int(skip));
}

pub(crate) fn select_courses(
    filter: &Filter,
    sort: &Sort,
    skip: u64,
    limit: Option<u64>,
) -> Result<SqlFragment, StoreError> {
    let mut out = SqlFragment::new("SELECT id, body FROM courses WHERE ");
    out.append(compile(filter)?);
    out.push(" ORDER BY ").push(&order_by(sort));
    page_clause(&mut out, skip, limit);
    Ok(out)
}

pub(crate) fn count_courses(
    filter: &Filter,
    skip: u64,
    limit: Option<u64>,
) -> Result<SqlFragment, StoreError> {
    let mut out = SqlFragment::new("SELECT COUNT(*) FROM (SELECT 1 FROM courses WHERE ");
    out.append(compile(filter)?);
    out.push(" ORDER BY rowid");
    page_clause(&mut out, skip, limit);
    out.push(")");
    Ok(out)
}

/// `json_set(body, path, json(?), ...)` for every assignment.
pub(crate) fn json_set(assignments: &[(&'static str, serde_json::Value)]) -> Result<SqlFragment, StoreError> {
    let mut out = SqlFragment::new("json_set(body");
    for (path, value) in assignments {
        out.push(", '")
            .push(path)
            .push("', json(")
            .bind(Bind::Text(serde_json::to_string(value)?))
            .push(")");
    }
    out.push(")");
    Ok(out)
}
