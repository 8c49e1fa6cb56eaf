use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::{self, format_timestamp, parse_timestamp};
use crate::error::StoreError;
use crate::filter::Predicate;
use crate::merge::{Delta, FieldChange};
use crate::model::{NewTodo, Todo};

/// Persistence port the operations in [`ops`](crate::ops) run against.
///
/// Soft-deleted rows are invisible to every method: they are never found,
/// scanned, counted, updated or deleted again.
pub trait TodoStore {
    fn find_by_id(&self, id: i64) -> Result<Option<Todo>, StoreError>;

    /// Matching todos, newest first (ties broken by id, highest first).
    fn scan(&self, predicate: &Predicate) -> Result<Vec<Todo>, StoreError>;

    fn count(&self, predicate: &Predicate) -> Result<i64, StoreError>;

    /// Insert and return the assigned id. Both timestamps are set to the
    /// insertion instant.
    fn insert(&self, todo: &NewTodo) -> Result<i64, StoreError>;

    /// Write the delta and refresh `updated_at` in one step. Fails with
    /// [`StoreError::NotFound`] when there is no live row.
    fn update_fields(&self, id: i64, delta: &Delta) -> Result<(), StoreError>;

    /// Returns whether a live row was marked deleted.
    fn soft_delete(&self, id: i64) -> Result<bool, StoreError>;
}

const TODO_COLUMNS: &str = "id, title, description, completed, created_at, updated_at";

const INSERT_TODO: &str = "
INSERT INTO todos (title, description, completed, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?4)
";

const SOFT_DELETE: &str = "
UPDATE todos
SET deleted_at = ?1
WHERE id = ?2 AND deleted_at IS NULL
";

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_todo_row(row: &rusqlite::Row) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

/// Current time at storage precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `updated_at` must strictly advance on every write, even when the clock
/// has not moved past the stored value.
fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Escape `%`, `_` and `\` so the search text matches literally under
/// `LIKE ... ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a predicate as a WHERE clause over live rows. User input only
/// travels as bound values.
fn where_clause(predicate: &Predicate) -> (String, Vec<Value>) {
    let mut sql = String::from("deleted_at IS NULL");
    let mut values = Vec::new();
    if let Some(completed) = predicate.completed {
        sql.push_str(" AND completed = ?");
        values.push(Value::Integer(i64::from(completed)));
    }
    if let Some(search) = &predicate.search {
        sql.push_str(" AND (title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')");
        let pattern = format!("%{}%", escape_like(search));
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }
    (sql, values)
}

fn change_value(change: &FieldChange) -> Value {
    match change {
        FieldChange::Title(title) => Value::Text(title.clone()),
        FieldChange::Description(description) => Value::Text(description.clone()),
        FieldChange::Completed(completed) => Value::Integer(i64::from(*completed)),
    }
}

/// [`TodoStore`] over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open a file-backed database and make sure the schema exists.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        db::init(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn open_memory() -> Result<Self, StoreError> {
        Ok(Self::new(db::open_memory()?))
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TodoStore for SqliteStore {
    fn find_by_id(&self, id: i64) -> Result<Option<Todo>, StoreError> {
        let todo = self
            .conn
            .query_row(
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND deleted_at IS NULL"),
                [id],
                read_todo_row,
            )
            .optional()?;
        Ok(todo)
    }

    fn scan(&self, predicate: &Predicate) -> Result<Vec<Todo>, StoreError> {
        let (clause, values) = where_clause(predicate);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE {clause} ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params_from_iter(values), read_todo_row)?;
        let todos = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }

    fn count(&self, predicate: &Predicate) -> Result<i64, StoreError> {
        let (clause, values) = where_clause(predicate);
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM todos WHERE {clause}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn insert(&self, todo: &NewTodo) -> Result<i64, StoreError> {
        let ts = format_timestamp(&now());
        self.conn.execute(
            INSERT_TODO,
            params![todo.title, todo.description, todo.completed, ts],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_fields(&self, id: i64, delta: &Delta) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let previous = tx
            .query_row(
                "SELECT updated_at FROM todos WHERE id = ?1 AND deleted_at IS NULL",
                [id],
                |row| timestamp_column(row, 0),
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))?;

        let mut sql = String::from("UPDATE todos SET ");
        let mut values = Vec::with_capacity(delta.len() + 2);
        for change in delta.changes() {
            sql.push_str(change.column());
            sql.push_str(" = ?, ");
            values.push(change_value(change));
        }
        sql.push_str("updated_at = ? WHERE id = ? AND deleted_at IS NULL");
        values.push(Value::Text(format_timestamp(&next_updated_at(previous))));
        values.push(Value::Integer(id));

        tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        Ok(())
    }

    fn soft_delete(&self, id: i64) -> Result<bool, StoreError> {
        let rows = self
            .conn
            .execute(SOFT_DELETE, params![format_timestamp(&now()), id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_todo(title: &str, description: &str) -> NewTodo {
        NewTodo {
            title: title.to_string(),
            description: description.to_string(),
            completed: false,
        }
    }

    fn search(s: &str) -> Predicate {
        Predicate {
            completed: None,
            search: Some(s.to_string()),
        }
    }

    #[test]
    fn insert_and_find() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(&new_todo("write tests", "soon")).unwrap();
        let todo = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(todo.id, id);
        assert_eq!(todo.title, "write tests");
        assert_eq!(todo.description, "soon");
        assert!(!todo.completed);
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[test]
    fn find_missing_is_none() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.find_by_id(99).unwrap().is_none());
    }

    #[test]
    fn scan_orders_newest_first() {
        let store = SqliteStore::open_memory().unwrap();
        let a = store.insert(&new_todo("a", "")).unwrap();
        let b = store.insert(&new_todo("b", "")).unwrap();
        let c = store.insert(&new_todo("c", "")).unwrap();
        let ids: Vec<i64> = store
            .scan(&Predicate::default())
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn scan_breaks_timestamp_ties_by_id() {
        let store = SqliteStore::open_memory().unwrap();
        let ts = "2025-01-01T00:00:00.000000Z";
        for title in ["first", "second"] {
            store
                .connection()
                .execute(
                    "INSERT INTO todos (title, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![title, ts],
                )
                .unwrap();
        }
        let titles: Vec<String> = store
            .scan(&Predicate::default())
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert(&new_todo("Buy MILK", "")).unwrap();
        store.insert(&new_todo("errands", "milk and bread")).unwrap();
        store.insert(&new_todo("laundry", "")).unwrap();
        assert_eq!(store.scan(&search("milk")).unwrap().len(), 2);
        assert_eq!(store.count(&search("milk")).unwrap(), 2);
    }

    #[test]
    fn search_wildcards_match_literally() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert(&new_todo("100% done", "")).unwrap();
        store.insert(&new_todo("1000 things", "")).unwrap();
        store.insert(&new_todo("snake_case", "")).unwrap();
        store.insert(&new_todo("snakeXcase", "")).unwrap();
        store.insert(&new_todo(r"C:\temp", "")).unwrap();
        assert_eq!(store.count(&search("0%")).unwrap(), 1);
        assert_eq!(store.count(&search("e_c")).unwrap(), 1);
        assert_eq!(store.count(&search(r"\t")).unwrap(), 1);
    }

    #[test]
    fn completed_predicate() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(&new_todo("a", "")).unwrap();
        store.insert(&new_todo("b", "")).unwrap();
        store
            .update_fields(id, &Delta::new(vec![FieldChange::Completed(true)]))
            .unwrap();
        let done = Predicate {
            completed: Some(true),
            search: None,
        };
        let todos = store.scan(&done).unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, id);
    }

    #[test]
    fn update_fields_writes_only_delta_and_bumps_updated_at() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(&new_todo("old", "keep")).unwrap();
        let before = store.find_by_id(id).unwrap().unwrap();
        store
            .update_fields(id, &Delta::new(vec![FieldChange::Title("new".into())]))
            .unwrap();
        let after = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(after.title, "new");
        assert_eq!(after.description, "keep");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn updated_at_advances_even_if_clock_lags() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(&new_todo("a", "")).unwrap();
        let future = "2999-01-01T00:00:00.000000Z";
        store
            .connection()
            .execute("UPDATE todos SET updated_at = ?1 WHERE id = ?2", params![future, id])
            .unwrap();
        store.update_fields(id, &Delta::default()).unwrap();
        let todo = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(format_timestamp(&todo.updated_at), "2999-01-01T00:00:00.000001Z");
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store
            .update_fields(7, &Delta::new(vec![FieldChange::Completed(true)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(7)));
    }

    #[test]
    fn soft_delete_hides_row_but_keeps_it() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(&new_todo("a", "")).unwrap();
        assert!(store.soft_delete(id).unwrap());
        assert!(store.find_by_id(id).unwrap().is_none());
        assert!(store.scan(&Predicate::default()).unwrap().is_empty());
        assert_eq!(store.count(&Predicate::default()).unwrap(), 0);
        assert!(matches!(
            store.update_fields(id, &Delta::default()),
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.soft_delete(id).unwrap());

        let raw: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM todos WHERE id = ?1 AND deleted_at IS NOT NULL",
                [id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, 1);
    }

    #[test]
    fn corrupt_timestamp_is_backend_error() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO todos (id, title, created_at, updated_at) VALUES (5, 'x', 'yesterday', 'yesterday')",
                [],
            )
            .unwrap();
        assert!(matches!(store.find_by_id(5), Err(StoreError::Backend(_))));
    }
}
