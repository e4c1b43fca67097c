//! Database repository layer
//!
//! One generic [`Repository`] serves every table. Each entity describes its
//! table through [`Entity`]; the repository builds the SQL from that
//! descriptor, so adding a table means adding a descriptor, not a new
//! repository type.

use crate::error::{Error, Result};
use crate::format::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::fmt::Display;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Static description of a table.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    /// Table name, used for writes
    pub name: &'static str,
    /// Table or view rows are read from; a view may add derived columns
    pub source: &'static str,
    /// Primary key column
    pub id_column: &'static str,
    /// Non-key columns, in the order [`Entity::column_values`] returns them
    pub columns: &'static [&'static str],
    /// Whether the store assigns ids (ids `<= 0` are left to SQLite)
    pub generated_id: bool,
}

impl TableDescriptor {
    fn has_column(&self, column: &str) -> bool {
        column == self.id_column || self.columns.contains(&column)
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(Error::Query(format!(
                "unknown column {} on {}",
                column, self.name
            )))
        }
    }
}

/// A row type stored in one table.
pub trait Entity: Sized {
    /// Primary key type as passed to [`Repository::get`] and friends
    type Id: ToSql + Display + ?Sized;

    /// Table this entity lives in
    const TABLE: TableDescriptor;

    /// Primary key value of this row
    fn id_value(&self) -> Value;

    /// Decode a row selected with `SELECT *`
    fn from_row(row: &Row) -> rusqlite::Result<Self>;

    /// Values for [`TableDescriptor::columns`], same order
    fn column_values(&self) -> Vec<Value>;
}

/// Equality filter on one column.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

/// Sort order for [`ListOptions`].
#[derive(Debug, Clone)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filtering, sorting and pagination for [`Repository::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generic repository for one entity type.
    pub fn repo<E: Entity>(&self) -> Repository<'_, E> {
        Repository {
            db: self,
            _entity: PhantomData,
        }
    }
}

/// CRUD access to the table of `E`.
pub struct Repository<'db, E> {
    db: &'db Database,
    _entity: PhantomData<fn() -> E>,
}

impl<'db, E: Entity> Repository<'db, E> {
    /// Table name backing this repository
    pub fn table_name(&self) -> &'static str {
        E::TABLE.name
    }

    /// List rows with optional filtering, sorting and pagination
    pub fn list(&self, options: &ListOptions) -> Result<Vec<E>> {
        let table = E::TABLE;
        let mut sql = format!("SELECT * FROM {}", table.source);
        let (where_clause, params) = where_clause::<E>(&options.filters)?;
        sql.push_str(&where_clause);

        if let Some(order) = &options.order {
            table.check_column(&order.column)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                order.column,
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }

        match (options.limit, options.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        let conn = self.db.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), E::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Get a single row by id
    pub fn get(&self, id: &E::Id) -> Result<Option<E>> {
        let table = E::TABLE;
        let conn = self.db.connection();
        conn.query_row(
            &format!(
                "SELECT * FROM {} WHERE {} = ?1",
                table.source, table.id_column
            ),
            [id],
            E::from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Insert a new row and return it as stored.
    ///
    /// For tables with generated ids, an id `<= 0` lets the store assign one.
    pub fn create(&self, entity: &E) -> Result<E> {
        let table = E::TABLE;
        let conn = self.db.connection();

        let (columns, values) = insert_columns(entity);
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name,
                columns.join(", "),
                placeholders
            ),
            params_from_iter(values.iter()),
        )?;

        let rowid = conn.last_insert_rowid();
        let stored = conn.query_row(
            &format!(
                "SELECT * FROM {src} WHERE {id} = (SELECT {id} FROM {name} WHERE rowid = ?1)",
                src = table.source,
                id = table.id_column,
                name = table.name
            ),
            [rowid],
            E::from_row,
        )?;
        Ok(stored)
    }

    /// Insert, or overwrite every column of the row with the same id
    pub fn upsert(&self, entity: &E) -> Result<E> {
        let table = E::TABLE;
        if table.generated_id && !has_assigned_id(&entity.id_value()) {
            return self.create(entity);
        }

        let (columns, values) = insert_columns(entity);
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = table
            .columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.db.connection();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
                table.name,
                columns.join(", "),
                placeholders,
                table.id_column,
                updates
            ),
            params_from_iter(values.iter()),
        )?;

        let stored = conn.query_row(
            &format!(
                "SELECT * FROM {} WHERE {} = ?1",
                table.source, table.id_column
            ),
            [entity.id_value()],
            E::from_row,
        )?;
        Ok(stored)
    }

    /// Overwrite the row with the same id. Fails with `NotFound` if absent.
    pub fn update(&self, entity: &E) -> Result<E> {
        let table = E::TABLE;
        let id = entity.id_value();
        let sets = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let mut values = entity.column_values();
        values.push(id.clone());

        let conn = self.db.connection();
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?{}",
                table.name,
                sets,
                table.id_column,
                values.len()
            ),
            params_from_iter(values.iter()),
        )?;

        if changed == 0 {
            return Err(Error::NotFound {
                table: table.name,
                id: value_to_string(&id),
            });
        }

        let stored = conn.query_row(
            &format!(
                "SELECT * FROM {} WHERE {} = ?1",
                table.source, table.id_column
            ),
            [id],
            E::from_row,
        )?;
        Ok(stored)
    }

    /// Delete a row by id. Fails with `NotFound` if absent.
    pub fn delete(&self, id: &E::Id) -> Result<()> {
        let table = E::TABLE;
        let conn = self.db.connection();
        let changed = conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", table.name, table.id_column),
            [id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound {
                table: table.name,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Count rows matching all filters
    pub fn count(&self, filters: &[Filter]) -> Result<i64> {
        let (where_clause, params) = where_clause::<E>(filters)?;
        let conn = self.db.connection();
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{}", E::TABLE.source, where_clause),
            params_from_iter(params.iter()),
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Check if a row exists by id
    pub fn exists(&self, id: &E::Id) -> Result<bool> {
        let table = E::TABLE;
        let conn = self.db.connection();
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE {} = ?1", table.name, table.id_column),
                [id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn where_clause<E: Entity>(filters: &[Filter]) -> Result<(String, Vec<Value>)> {
    if filters.is_empty() {
        return Ok((String::new(), vec![]));
    }
    let mut parts = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for filter in filters {
        E::TABLE.check_column(&filter.column)?;
        if filter.value == Value::Null {
            parts.push(format!("{} IS NULL", filter.column));
        } else {
            params.push(filter.value.clone());
            parts.push(format!("{} = ?{}", filter.column, params.len()));
        }
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

fn insert_columns<E: Entity>(entity: &E) -> (Vec<&'static str>, Vec<Value>) {
    let table = E::TABLE;
    let id = entity.id_value();
    let mut columns = Vec::with_capacity(table.columns.len() + 1);
    let mut values = Vec::with_capacity(table.columns.len() + 1);
    if !table.generated_id || has_assigned_id(&id) {
        columns.push(table.id_column);
        values.push(id);
    }
    columns.extend_from_slice(table.columns);
    values.extend(entity.column_values());
    (columns, values)
}

fn has_assigned_id(id: &Value) -> bool {
    !matches!(id, Value::Null) && !matches!(id, Value::Integer(n) if *n <= 0)
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

// ============================================
// Column codecs shared by entity impls
// ============================================

/// Store a timestamp as fixed-width RFC 3339 text.
pub(crate) fn ts_value(ts: DateTime<Utc>) -> Value {
    Value::Text(format_timestamp(ts))
}

pub(crate) fn opt_ts_value(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(ts_value).unwrap_or(Value::Null)
}

pub(crate) fn opt_text_value(s: Option<&str>) -> Value {
    s.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}

pub(crate) fn json_value(v: Option<&serde_json::Value>) -> Value {
    v.map(|v| Value::Text(v.to_string())).unwrap_or(Value::Null)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn column_index(row: &Row, column: &str) -> usize {
    row.as_ref().column_index(column).unwrap_or(0)
}

pub(crate) fn get_ts(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(&raw).ok_or_else(|| {
        conversion_error(
            column_index(row, column),
            format!("invalid timestamp in {}: {}", column, raw),
        )
    })
}

pub(crate) fn get_opt_ts(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| {
            conversion_error(
                column_index(row, column),
                format!("invalid timestamp in {}: {}", column, raw),
            )
        }),
    }
}

pub(crate) fn get_json(row: &Row, column: &str) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| conversion_error(column_index(row, column), e.to_string())),
    }
}

pub(crate) fn get_parsed<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|e: String| conversion_error(column_index(row, column), e))
}
