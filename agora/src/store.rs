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

//! # agora storage
//!
//! ## Introduction
//!
//! This module defines the interface to agora's backing store. The store is a hosted relational
//! service reached over the network, and I'd like to keep the domain logic honest about that
//! without marrying it to any one vendor's client library. To that end, the abstraction here is a
//! small, *generic* table interface rather than a de-normalized per-entity API: filtered &
//! ordered selects, inserts, updates, deletes, exact counts, and named-procedure invocation.
//! That's everything the layers above actually consume, and an in-memory implementation for test
//! purposes fits in a page or two.
//!
//! Rows move across this seam as JSON values; [decode] lifts them into typed entities on the
//! caller's side. I went back & forth on this (a trait method per entity would let each backend
//! hand back typed rows directly), but the aggregation layer composes arbitrary projections &
//! batches, and I'd rather have one decoding convention than a dozen bespoke methods.
//!
//! Errors at this seam are deliberately opaque: by the time a storage operation has failed,
//! callers can do nothing finer-grained than retry, degrade or report, so [Error] just boxes
//! whatever the backend produced.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The `threads` relation
pub const THREADS: &str = "threads";
/// The `replies` relation
pub const REPLIES: &str = "replies";
/// The `likes` relation
pub const LIKES: &str = "likes";
/// The `profiles` relation
pub const PROFILES: &str = "profiles";

#[derive(Debug)]
pub struct Error {
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error {
            source: Box::new(err),
        }
    }
}

/// A row-level predicate; conjoined when more than one is given
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// The named column equals the given value
    Eq(String, Value),
    /// The named column takes one of the given values
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Filter {
        Filter::Eq(column.to_owned(), value.into())
    }
    pub fn one_of(column: &str, values: Vec<Value>) -> Filter {
        Filter::In(column.to_owned(), values)
    }
}

/// Sort order for a select
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Order {
        Order {
            column: column.to_owned(),
            descending: false,
        }
    }
    pub fn desc(column: &str) -> Order {
        Order {
            column: column.to_owned(),
            descending: true,
        }
    }
}

/// A filtered, optionally ordered, optionally projected read
///
/// ```ignore
/// let query = Select::from(store::THREADS)
///     .filter(Filter::eq("user_id", json!(user)))
///     .order_by(Order::desc("created_at"));
/// ```
#[derive(Clone, Debug)]
pub struct Select {
    /// Project these columns; `None` means all
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub from: String,
    pub limit: Option<usize>,
    pub order: Option<Order>,
}

impl Select {
    pub fn from(table: &str) -> Select {
        Select {
            columns: None,
            filters: Vec::new(),
            from: table.to_owned(),
            limit: None,
            order: None,
        }
    }
    pub fn columns(mut self, columns: &[&str]) -> Select {
        self.columns = Some(columns.iter().map(|s| s.to_string()).collect());
        self
    }
    pub fn filter(mut self, filter: Filter) -> Select {
        self.filters.push(filter);
        self
    }
    pub fn limit(mut self, limit: usize) -> Select {
        self.limit = Some(limit);
        self
    }
    pub fn order_by(mut self, order: Order) -> Select {
        self.order = Some(order);
        self
    }
}

/// The interface which any backing store for agora must implement
///
/// All methods are fallible in the transient, network-y way; resilience (backoff & retry) is
/// layered *above* this seam so that implementations stay dumb pipes.
#[async_trait]
pub trait Backend {
    /// Execute `query`, returning raw rows
    ///
    /// It may seem appealing to make this generic over the row type & have each backend hand back
    /// typed entities, but trait objects & generic methods don't mix; decode on the calling side
    /// with [decode] instead.
    async fn select(&self, query: Select) -> Result<Vec<Value>, Error>;
    /// Insert one complete row; ids & timestamps are assigned by the caller
    async fn insert(&self, table: &str, row: Value) -> Result<(), Error>;
    /// Apply `patch` (a partial row) to every row matching `filters`
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<(), Error>;
    /// Delete every row matching `filters`
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), Error>;
    /// Exact count of rows matching `filters`, without transferring them
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, Error>;
    /// Invoke a named procedure on the store
    ///
    /// This is the one non-tabular operation; it exists for the store-side transactions (the like
    /// toggle, the admin-flag flip) that can't be expressed race-free as client-side
    /// read-modify-write.
    async fn rpc(&self, procedure: &str, args: Value) -> Result<Value, Error>;
}

/// Lift raw rows into typed entities
pub fn decode<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, Error> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Error::new))
        .collect()
}
