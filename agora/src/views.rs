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

//! # views
//!
//! ## Introduction
//!
//! The store keeps threads, replies, profiles & likes in separate relations; anything a reader
//! actually looks at is a composition of several of them. This module is that composition: the
//! front page (every thread, newest first, each with its author's username & like count), a
//! single thread's detail, and a thread's replies.
//!
//! Two policies govern the merging, and they're deliberately asymmetric:
//!
//! 1. The *primary* record set is load-bearing: if the threads (or replies) can't be fetched,
//!    the view fails.
//! 2. The decorations degrade: a user with no profile row renders as "Unknown", and if the like
//!    rows can't be fetched the front page renders with zero counts & a warning in the log
//!    rather than no page at all.
//!
//! On query shape: for a front page of `T` threads by `U` distinct authors, this module issues
//! exactly *three* remote calls-- one for the threads, one batched select for the `U` profiles,
//! and one batched select for the like rows, folded into per-thread counts in memory. Issuing a
//! count query per thread reads naturally & works fine at ten threads, but it's `O(T)` round
//! trips to a remote service and the front page is the hottest path in the system; the batched
//! shape is the one that survives growth.

use std::collections::HashMap;

use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;
use snafu::{prelude::*, Backtrace};
use tracing::warn;

use crate::{
    agora::Agora,
    counter_add,
    entities::{Reply, Thread, ThreadId, UserId, Username},
    gauge_setu, metrics,
    metrics::Sort,
    retry::with_retry,
    store,
    store::{Filter, Order, Select},
};

/// What a reader sees when the author's profile is missing
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to decode a row from the store: {source}"))]
    Decode {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to fetch profiles: {source}"))]
    Profiles {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to fetch replies: {source}"))]
    Replies {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("No thread with id {id}"))]
    ThreadNotFound { id: ThreadId, backtrace: Backtrace },
    #[snafu(display("Failed to fetch threads: {source}"))]
    Threads {
        source: store::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A thread dressed for display
#[derive(Clone, Debug)]
pub struct ThreadView {
    pub author: String,
    pub likes: usize,
    pub thread: Thread,
}

/// A reply dressed for display
#[derive(Clone, Debug)]
pub struct ReplyView {
    pub author: String,
    pub reply: Reply,
}

fn author_for(usernames: &HashMap<UserId, Username>, user: UserId) -> String {
    usernames
        .get(&user)
        .map(|name| name.to_string())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned())
}

/// One batched select for the usernames of `users` (de-duplicated); misses simply aren't in the
/// returned map
async fn usernames_for(
    state: &Agora,
    users: impl Iterator<Item = UserId>,
) -> Result<HashMap<UserId, Username>> {
    let users = users.unique().map(|id| json!(id)).collect::<Vec<_>>();
    if users.is_empty() {
        return Ok(HashMap::new());
    }
    let query = Select::from(store::PROFILES)
        .columns(&["id", "username"])
        .filter(Filter::one_of("id", users));
    let rows = with_retry(&state.retry, "fetching profiles", || {
        state.storage.select(query.clone())
    })
    .await
    .context(ProfilesSnafu)?;

    #[derive(Deserialize)]
    struct NameRow {
        id: UserId,
        username: Username,
    }

    Ok(store::decode::<NameRow>(rows)
        .context(DecodeSnafu)?
        .into_iter()
        .map(|row| (row.id, row.username))
        .collect())
}

/// One batched select for the like rows of `threads`, folded into per-thread counts; on failure,
/// warn & pretend nobody liked anything
async fn like_counts(
    state: &Agora,
    threads: impl Iterator<Item = ThreadId>,
) -> HashMap<ThreadId, usize> {
    let ids = threads.map(|id| json!(id)).collect::<Vec<_>>();
    if ids.is_empty() {
        return HashMap::new();
    }

    #[derive(Deserialize)]
    struct LikeRow {
        thread_id: ThreadId,
    }

    let query = Select::from(store::LIKES)
        .columns(&["thread_id"])
        .filter(Filter::one_of("thread_id", ids));
    let outcome = with_retry(&state.retry, "fetching like counts", || {
        state.storage.select(query.clone())
    })
    .await
    .and_then(store::decode::<LikeRow>);
    match outcome {
        Ok(rows) => rows.into_iter().map(|row| row.thread_id).counts(),
        Err(err) => {
            warn!("Couldn't fetch like counts; rendering zeros: {}", err);
            HashMap::new()
        }
    }
}

inventory::submit! { metrics::Registration::new("views.front-page", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("views.front-page.threads", Sort::IntegralGauge) }

/// Build the front page: all threads, newest first, decorated with author & like count
///
/// `search`, if given, narrows the page to threads whose title or description contains the text
/// (case-insensitively). The filter is applied before the batched decoration fetches, so a
/// narrowed page costs less, not more.
pub async fn front_page(state: &Agora, search: Option<&str>) -> Result<Vec<ThreadView>> {
    let query = Select::from(store::THREADS).order_by(Order::desc("created_at"));
    let rows = with_retry(&state.retry, "fetching threads", || {
        state.storage.select(query.clone())
    })
    .await
    .context(ThreadsSnafu)?;
    let mut threads = store::decode::<Thread>(rows).context(DecodeSnafu)?;
    if let Some(needle) = search {
        let needle = needle.to_lowercase();
        threads.retain(|thread| {
            thread.title.as_ref().to_lowercase().contains(&needle)
                || thread.description.to_lowercase().contains(&needle)
        });
    }

    let usernames = usernames_for(state, threads.iter().map(|thread| thread.user_id)).await?;
    let likes = like_counts(state, threads.iter().map(|thread| thread.id)).await;

    let views = threads
        .into_iter()
        .map(|thread| ThreadView {
            author: author_for(&usernames, thread.user_id),
            likes: likes.get(&thread.id).copied().unwrap_or(0),
            thread,
        })
        .collect::<Vec<_>>();
    counter_add!(state.instruments, "views.front-page", 1, &[]);
    gauge_setu!(
        state.instruments,
        "views.front-page.threads",
        views.len() as u64,
        &[]
    );
    Ok(views)
}

inventory::submit! { metrics::Registration::new("views.thread", Sort::IntegralCounter) }

/// One thread, decorated with author & like count
pub async fn thread_detail(state: &Agora, id: ThreadId) -> Result<ThreadView> {
    let query = Select::from(store::THREADS).filter(Filter::eq("id", json!(id)));
    let rows = with_retry(&state.retry, "fetching a thread", || {
        state.storage.select(query.clone())
    })
    .await
    .context(ThreadsSnafu)?;
    let thread = store::decode::<Thread>(rows)
        .context(DecodeSnafu)?
        .into_iter()
        .next()
        .context(ThreadNotFoundSnafu { id })?;

    let usernames = usernames_for(state, std::iter::once(thread.user_id)).await?;

    let filters = [Filter::eq("thread_id", json!(id))];
    let likes = match with_retry(&state.retry, "counting likes", || {
        state.storage.count(store::LIKES, &filters)
    })
    .await
    {
        Ok(count) => count,
        Err(err) => {
            warn!("Couldn't count likes for {}; rendering zero: {}", id, err);
            0
        }
    };

    counter_add!(state.instruments, "views.thread", 1, &[]);
    Ok(ThreadView {
        author: author_for(&usernames, thread.user_id),
        likes,
        thread,
    })
}

/// A thread's replies, oldest first, each decorated with its author
pub async fn replies_for(state: &Agora, thread: ThreadId) -> Result<Vec<ReplyView>> {
    let query = Select::from(store::REPLIES)
        .filter(Filter::eq("thread_id", json!(thread)))
        .order_by(Order::asc("created_at"));
    let rows = with_retry(&state.retry, "fetching replies", || {
        state.storage.select(query.clone())
    })
    .await
    .context(RepliesSnafu)?;
    let replies = store::decode::<Reply>(rows).context(DecodeSnafu)?;
    let usernames = usernames_for(state, replies.iter().map(|reply| reply.user_id)).await?;
    Ok(replies
        .into_iter()
        .map(|reply| ReplyView {
            author: author_for(&usernames, reply.user_id),
            reply,
        })
        .collect())
}
