// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of agora.
//
// agora is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// agora is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with agora.  If not, see
// <http://www.gnu.org/licenses/>.

//! # The agora Integration-Test Store
//!
//! An in-memory [Backend] for exercising the domain layer end-to-end without a network. Beyond
//! holding tables, it records every call it sees (verb & target, in order) so tests can assert
//! *how* the layers above talked to it, and it can be scripted to fail: the n-th through m-th
//! calls of a given verb against a given table error out, which is how the retry & degradation
//! paths get exercised. The two stored procedures the real service provides are modeled here
//! with their actual semantics.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use snafu::Snafu;

use agora::{
    agora::Agora,
    authn::Session,
    entities::{ReplyId, ThreadId, UserEmail, UserId},
    retry::RetryParameters,
    store::{self, Backend, Filter, Select},
};

#[derive(Debug, Snafu)]
#[snafu(display("Scripted failure for {verb} on {target}"))]
pub struct ScriptedFailure {
    verb: &'static str,
    target: String,
}

/// In-memory [Backend]
///
/// Tables are keyed by name; rows are JSON objects, exactly as they'd come back from the wire.
#[derive(Default)]
pub struct Memory {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// Every call made against this store, oldest first
    journal: Mutex<Vec<(&'static str, String)>>,
    /// (verb, target) -> how many more times to refuse it
    failures: Mutex<HashMap<(&'static str, String), usize>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_owned()).or_default().extend(rows);
    }
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap();
        tables.get(table).cloned().unwrap_or_default()
    }
    /// Refuse the next `times` calls of `verb` against `target`
    pub fn fail(&self, verb: &'static str, target: &str, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        failures.insert((verb, target.to_owned()), times);
    }
    pub fn calls(&self, verb: &'static str, target: &str) -> usize {
        let journal = self.journal.lock().unwrap();
        journal
            .iter()
            .filter(|(v, t)| *v == verb && t == target)
            .count()
    }
    pub fn journal(&self) -> Vec<(&'static str, String)> {
        self.journal.lock().unwrap().clone()
    }
    /// Log the call; fail it if so scripted
    fn note(&self, verb: &'static str, target: &str) -> Result<(), store::Error> {
        let mut journal = self.journal.lock().unwrap();
        journal.push((verb, target.to_owned()));
        drop(journal);
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&(verb, target.to_owned())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(store::Error::new(ScriptedFailure {
                    verb,
                    target: target.to_owned(),
                }));
            }
        }
        Ok(())
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => row.get(column) == Some(value),
        Filter::In(column, values) => row
            .get(column)
            .map(|value| values.contains(value))
            .unwrap_or(false),
    })
}

/// The named column's value as text, for ordering
fn text_of(row: &Value, column: &str) -> String {
    row.get(column)
        .map(|value| {
            value
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| value.to_string())
        })
        .unwrap_or_default()
}

#[async_trait]
impl Backend for Memory {
    async fn select(&self, query: Select) -> Result<Vec<Value>, store::Error> {
        self.note("select", &query.from)?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(&query.from)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let left = text_of(a, &order.column);
                let right = text_of(b, &order.column);
                if order.descending {
                    right.cmp(&left)
                } else {
                    left.cmp(&right)
                }
            });
        }
        if let Some(columns) = &query.columns {
            rows = rows
                .into_iter()
                .map(|row| {
                    let mut projected = serde_json::Map::new();
                    for column in columns {
                        if let Some(value) = row.get(column) {
                            projected.insert(column.clone(), value.clone());
                        }
                    }
                    Value::Object(projected)
                })
                .collect();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
    async fn insert(&self, table: &str, row: Value) -> Result<(), store::Error> {
        self.note("insert", table)?;
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_owned()).or_default().push(row);
        Ok(())
    }
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<(), store::Error> {
        self.note("update", table)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches(row, filters)) {
                if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
                    for (key, value) in patch {
                        row.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), store::Error> {
        self.note("delete", table)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !matches(row, filters));
        }
        Ok(())
    }
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, store::Error> {
        self.note("count", table)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches(row, filters)).count())
            .unwrap_or_default())
    }
    async fn rpc(&self, procedure: &str, args: Value) -> Result<Value, store::Error> {
        self.note("rpc", procedure)?;
        let mut tables = self.tables.lock().unwrap();
        match procedure {
            "toggle_like" => {
                let user = args["p_user_id"].clone();
                let thread = args["p_thread_id"].clone();
                let likes = tables.entry(store::LIKES.to_owned()).or_default();
                let existing = likes
                    .iter()
                    .position(|row| row["user_id"] == user && row["thread_id"] == thread);
                let liked = match existing {
                    Some(index) => {
                        likes.remove(index);
                        false
                    }
                    None => {
                        likes.push(json!({"user_id": user, "thread_id": thread}));
                        true
                    }
                };
                let count = likes.iter().filter(|row| row["thread_id"] == thread).count();
                Ok(json!([{"liked": liked, "likes_count": count}]))
            }
            "set_user_admin" => {
                let user = args["user_id"].clone();
                let admin = args["admin_status"].clone();
                if let Some(rows) = tables.get_mut(store::PROFILES) {
                    for row in rows.iter_mut().filter(|row| row["id"] == user) {
                        row["is_admin"] = admin.clone();
                    }
                }
                Ok(Value::Null)
            }
            _ => Err(store::Error::new(ScriptedFailure {
                verb: "rpc",
                target: procedure.to_owned(),
            })),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         test fixtures                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An [Agora] over the given store, with fast (but real) backoff
pub fn forum_over(backend: Arc<Memory>) -> Agora {
    Agora::new(
        backend,
        RetryParameters::new(3, Duration::from_millis(1)).unwrap(),
    )
}

pub fn session_for(user: UserId, email: &str) -> Session {
    Session::new(user, UserEmail::new(email).unwrap())
}

pub fn thread_row(
    id: ThreadId,
    user: UserId,
    title: &str,
    status: &str,
    created_at: &str,
) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": format!("{} (description)", title),
        "tags": ["rust"],
        "status": status,
        "created_at": created_at,
        "user_id": user,
    })
}

pub fn reply_row(id: ReplyId, thread: ThreadId, user: UserId, content: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "created_at": created_at,
        "user_id": user,
        "thread_id": thread,
    })
}

pub fn like_row(user: UserId, thread: ThreadId) -> Value {
    json!({"user_id": user, "thread_id": thread})
}

pub fn profile_row(id: UserId, username: &str, is_admin: bool) -> Value {
    json!({
        "id": id,
        "username": username,
        "is_admin": is_admin,
        "email": format!("{}@example.com", username),
    })
}
