use log::debug;

use crate::error::{Error, Result, StoreError};
use crate::filter;
use crate::id;
use crate::merge::{self, Delta, FieldChange};
use crate::model::{CreateTodo, NewTodo, Todo, TodoFilter, TodoResponse, UpdateTodo};
use crate::store::TodoStore;

fn not_found(id: &str) -> Error {
    Error::NotFound(id.to_string())
}

fn require_todo<S: TodoStore>(store: &S, key: i64, id: &str) -> Result<Todo> {
    store.find_by_id(key)?.ok_or_else(|| not_found(id))
}

/// Apply `delta` and read the row back so callers never see a stale copy.
fn write_delta<S: TodoStore>(store: &S, key: i64, id: &str, delta: &Delta) -> Result<TodoResponse> {
    store.update_fields(key, delta).map_err(|e| match e {
        StoreError::NotFound(_) => not_found(id),
        other => Error::Storage(other),
    })?;
    // A concurrent delete between the write and this read also ends here.
    let todo = require_todo(store, key, id)?;
    Ok(todo.into())
}

pub fn list<S: TodoStore>(store: &S, filter: Option<&TodoFilter>) -> Result<Vec<TodoResponse>> {
    let predicate = filter::compile(filter);
    let todos = store.scan(&predicate)?;
    debug!("list {predicate:?}: {} todos", todos.len());
    Ok(todos.into_iter().map(TodoResponse::from).collect())
}

pub fn get<S: TodoStore>(store: &S, id: &str) -> Result<TodoResponse> {
    let key = id::decode(id)?;
    let todo = require_todo(store, key, id)?;
    Ok(todo.into())
}

pub fn count<S: TodoStore>(store: &S, filter: Option<&TodoFilter>) -> Result<i64> {
    let predicate = filter::compile(filter);
    Ok(store.count(&predicate)?)
}

/// Titles are not validated; an empty title is stored as given.
pub fn create<S: TodoStore>(store: &S, input: CreateTodo) -> Result<TodoResponse> {
    let new = NewTodo {
        title: input.title,
        description: input.description.unwrap_or_default(),
        completed: false,
    };
    let key = store.insert(&new)?;
    debug!("created todo {key}");
    let todo = require_todo(store, key, &id::encode(key))?;
    Ok(todo.into())
}

pub fn update<S: TodoStore>(store: &S, id: &str, input: &UpdateTodo) -> Result<TodoResponse> {
    let key = id::decode(id)?;
    require_todo(store, key, id)?;
    let delta = merge::delta(input);
    if delta.is_empty() {
        return Err(Error::InvalidArgument("no fields to update".to_string()));
    }
    debug!("update todo {key}: {} field(s)", delta.len());
    write_delta(store, key, id, &delta)
}

/// Returns `false` rather than failing when no live todo has this id.
pub fn delete<S: TodoStore>(store: &S, id: &str) -> Result<bool> {
    let key = id::decode(id)?;
    let deleted = store.soft_delete(key)?;
    debug!("delete todo {key}: {deleted}");
    Ok(deleted)
}

pub fn toggle<S: TodoStore>(store: &S, id: &str) -> Result<TodoResponse> {
    let key = id::decode(id)?;
    let todo = require_todo(store, key, id)?;
    let delta = Delta::new(vec![FieldChange::Completed(!todo.completed)]);
    debug!("toggle todo {key} -> {}", !todo.completed);
    write_delta(store, key, id, &delta)
}
