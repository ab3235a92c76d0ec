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

//! # the PostgREST backend
//!
//! ## Introduction
//!
//! The [store::Backend] implementation agora actually ships: a thin client for a
//! [PostgREST]-style HTTP facade over Postgres (hosted Supabase projects expose exactly this
//! under `/rest/v1`). The mapping is mechanical:
//!
//! [PostgREST]: https://docs.postgrest.org/en/stable/
//!
//! - selects become `GET /{table}` with `col=eq.value` / `col=in.(...)` filters, `order=` &
//!   `select=` parameters;
//! - inserts become `POST /{table}` (rows are complete client-side, so we ask for
//!   `return=minimal`);
//! - updates & deletes become `PATCH`/`DELETE /{table}` with the same filter rendering;
//! - counts become `HEAD /{table}` with `Prefer: count=exact`, reading the total off the
//!   `Content-Range` header;
//! - named procedures become `POST /rpc/{name}`.
//!
//! The service key rides on every request, twice: in the `apikey` header & as a bearer token.
//! It lives in a [SecretString] so a stray `{:?}` can't leak it into a log.
//!
//! Per the contract on [store::Backend], this type is a dumb pipe: no retries (that's
//! [crate::retry]), no interpretation of rows (that's the caller's [store::decode]).

use async_trait::async_trait;
use itertools::Itertools;
use reqwest::{header::CONTENT_RANGE, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use snafu::{prelude::*, Backtrace};
use tap::Pipe;
use url::Url;

use crate::store;
use crate::store::{Filter, Select};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Couldn't make sense of the Content-Range header \"{text}\""))]
    BadCount { text: String, backtrace: Backtrace },
    #[snafu(display("Failed to build an HTTP client: {source}"))]
    BuildClient {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The store's answer wouldn't parse as JSON: {source}"))]
    Deserialize {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The store answered {status}: {body}"))]
    Http {
        status: StatusCode,
        body: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Couldn't build the URL for {endpoint}: {source}"))]
    Join {
        endpoint: String,
        source: url::ParseError,
        backtrace: Backtrace,
    },
    #[snafu(display("The store's answer carried no usable Content-Range header"))]
    NoCount { backtrace: Backtrace },
    #[snafu(display("Request failed: {source}"))]
    Request {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

impl From<Error> for store::Error {
    fn from(value: Error) -> Self {
        store::Error::new(value)
    }
}

/// Render a JSON value as it appears to the right of `eq.`
fn bare(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a JSON value as one element of an `in.(...)` list; strings are double-quoted so commas
/// & parentheses in the data can't splice the list
fn quoted(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", bare(value))),
        Filter::In(column, values) => (
            column.clone(),
            format!("in.({})", values.iter().map(quoted).join(",")),
        ),
    }
}

fn select_params(query: &Select) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(columns) = &query.columns {
        params.push(("select".to_string(), columns.join(",")));
    }
    for filter in &query.filters {
        params.push(filter_param(filter));
    }
    if let Some(order) = &query.order {
        params.push((
            "order".to_string(),
            format!(
                "{}.{}",
                order.column,
                if order.descending { "desc" } else { "asc" }
            ),
        ));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Pass 2xx through; turn anything else into [Error::Http] with whatever body came along
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        HttpSnafu { status, body }.fail()
    }
}

/// A [store::Backend] speaking the PostgREST dialect
#[derive(Debug)]
pub struct PostgRest {
    base: Url,
    client: Client,
    key: SecretString,
}

impl PostgRest {
    /// `base` is the service's REST root (`https://{project}.supabase.co/rest/v1/` for a hosted
    /// Supabase project); `key` is the service key
    pub fn new(base: Url, key: SecretString) -> Result<PostgRest> {
        let client = Client::builder()
            .user_agent(format!(
                "agora/{} ( sp1ff@pobox.com )",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context(BuildClientSnafu)?;
        Ok(PostgRest {
            base: with_trailing_slash(base),
            client,
            key,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base.join(name).context(JoinSnafu { endpoint: name })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.key.expose_secret())
            .bearer_auth(self.key.expose_secret())
    }

    async fn do_select(&self, query: Select) -> Result<Vec<Value>> {
        let url = self.endpoint(&query.from)?;
        let response = self
            .authed(self.client.get(url))
            .query(&select_params(&query))
            .send()
            .await
            .context(RequestSnafu)?;
        let text = checked(response).await?.text().await.context(RequestSnafu)?;
        serde_json::from_str(&text).context(DeserializeSnafu)
    }

    async fn do_insert(&self, table: &str, row: Value) -> Result<()> {
        let url = self.endpoint(table)?;
        let response = self
            .authed(self.client.post(url))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .context(RequestSnafu)?;
        checked(response).await?;
        Ok(())
    }

    async fn do_update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<()> {
        let url = self.endpoint(table)?;
        let params = filters.iter().map(filter_param).collect::<Vec<_>>();
        let response = self
            .authed(self.client.patch(url))
            .query(&params)
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await
            .context(RequestSnafu)?;
        checked(response).await?;
        Ok(())
    }

    async fn do_delete(&self, table: &str, filters: &[Filter]) -> Result<()> {
        let url = self.endpoint(table)?;
        let params = filters.iter().map(filter_param).collect::<Vec<_>>();
        let response = self
            .authed(self.client.delete(url))
            .query(&params)
            .send()
            .await
            .context(RequestSnafu)?;
        checked(response).await?;
        Ok(())
    }

    async fn do_count(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let url = self.endpoint(table)?;
        let params = filters.iter().map(filter_param).collect::<Vec<_>>();
        let response = self
            .authed(self.client.head(url))
            .query(&params)
            .header("Prefer", "count=exact")
            .send()
            .await
            .context(RequestSnafu)?;
        let response = checked(response).await?;
        let text = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .context(NoCountSnafu)?
            .to_owned();
        // "0-24/3573", or "*/0" when nothing matched
        text.rsplit('/')
            .next()
            .and_then(|total| total.parse::<usize>().ok())
            .context(BadCountSnafu { text: text.clone() })
    }

    async fn do_rpc(&self, procedure: &str, args: Value) -> Result<Value> {
        let url = self.endpoint(&format!("rpc/{}", procedure))?;
        let response = self
            .authed(self.client.post(url))
            .json(&args)
            .send()
            .await
            .context(RequestSnafu)?;
        let response = checked(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await.context(RequestSnafu)?;
        if text.trim().is_empty() {
            // a `returns void` procedure
            Value::Null.pipe(Ok)
        } else {
            serde_json::from_str(&text).context(DeserializeSnafu)
        }
    }
}

fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base
}

#[async_trait]
impl store::Backend for PostgRest {
    async fn select(&self, query: Select) -> StdResult<Vec<Value>, store::Error> {
        Ok(self.do_select(query).await?)
    }
    async fn insert(&self, table: &str, row: Value) -> StdResult<(), store::Error> {
        Ok(self.do_insert(table, row).await?)
    }
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> StdResult<(), store::Error> {
        Ok(self.do_update(table, filters, patch).await?)
    }
    async fn delete(&self, table: &str, filters: &[Filter]) -> StdResult<(), store::Error> {
        Ok(self.do_delete(table, filters).await?)
    }
    async fn count(&self, table: &str, filters: &[Filter]) -> StdResult<usize, store::Error> {
        Ok(self.do_count(table, filters).await?)
    }
    async fn rpc(&self, procedure: &str, args: Value) -> StdResult<Value, store::Error> {
        Ok(self.do_rpc(procedure, args).await?)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::store::Order;

    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Match, Mock, MockServer, Request, ResponseTemplate,
    };

    fn store_for(server: &MockServer) -> PostgRest {
        PostgRest::new(
            Url::parse(&server.uri()).unwrap(),
            SecretString::from("sekrit".to_string()),
        )
        .unwrap()
    }

    /// Checks that the service key rides along as a bearer token
    struct BearerChecker;

    impl Match for BearerChecker {
        fn matches(&self, request: &Request) -> bool {
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(|value| value == "Bearer sekrit")
                .unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn selects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .and(query_param("status", "eq.open"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "sekrit"))
            .and(BearerChecker)
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
            )
            .mount(&server)
            .await;
        let rows = store_for(&server)
            .do_select(
                Select::from("threads")
                    .filter(Filter::eq("status", json!("open")))
                    .order_by(Order::desc("created_at")),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn selects_in_lists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profiles"))
            .and(query_param("id", "in.(\"a\",\"b\")"))
            .and(query_param("select", "id,username"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let rows = store_for(&server)
            .do_select(
                Select::from("profiles")
                    .columns(&["id", "username"])
                    .filter(Filter::one_of("id", vec![json!("a"), json!("b")])),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn inserts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/replies"))
            .and(header("prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        store_for(&server)
            .do_insert("replies", json!({"id": "r1", "content": "hi"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn counts() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/likes"))
            .and(query_param("thread_id", "eq.t1"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-5/6"))
            .mount(&server)
            .await;
        let total = store_for(&server)
            .do_count("likes", &[Filter::eq("thread_id", json!("t1"))])
            .await
            .unwrap();
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn rpcs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/toggle_like"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"liked": true, "likes_count": 3}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc/set_user_admin"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let store = store_for(&server);
        let value = store
            .do_rpc("toggle_like", json!({"p_user_id": "u1", "p_thread_id": "t1"}))
            .await
            .unwrap();
        assert_eq!(value[0]["likes_count"], json!(3));
        let value = store
            .do_rpc("set_user_admin", json!({"user_id": "u1", "admin_status": true}))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let err = store_for(&server)
            .do_delete("threads", &[Filter::eq("id", json!("t1"))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { .. }));
    }
}
