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

//! # likes
//!
//! A like is one row keyed by (user, thread), and toggling it is the one write in the system
//! that's genuinely racy if done client-side: probe-then-insert-or-delete from two browsers at
//! once & the pair can double-insert or double-delete. So the toggle is a single named procedure
//! on the store, transactional there, returning both the caller's new liked state & the
//! authoritative post-toggle count. The cardinal rule for callers: *replace* your displayed
//! count with the returned one; never increment or decrement what you were already showing.

use serde::Deserialize;
use serde_json::json;
use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    agora::Agora,
    authn::Session,
    counter_add,
    entities::ThreadId,
    metrics,
    metrics::Sort,
    retry::with_retry,
    store,
    store::{Filter, Select},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The like toggle returned something unexpected: {source}"))]
    BadOutcome {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The like toggle returned no rows"))]
    EmptyOutcome { backtrace: Backtrace },
    #[snafu(display("Failed to probe the like state for thread {thread}: {source}"))]
    Probe {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to toggle a like on thread {thread}: {source}"))]
    Toggle {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the store says after a toggle: the caller's new state & the authoritative count
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    #[serde(rename = "likes_count")]
    pub likes: usize,
}

inventory::submit! { metrics::Registration::new("likes.toggles", Sort::IntegralCounter) }

/// Toggle the caller's like on `thread`
///
/// Toggling twice restores the original state. The returned [LikeState::likes] supersedes any
/// count the caller was displaying.
pub async fn toggle(state: &Agora, session: &Session, thread: ThreadId) -> Result<LikeState> {
    let args = json!({
        "p_user_id": session.user(),
        "p_thread_id": thread,
    });
    let value = with_retry(&state.retry, "toggling a like", || {
        state.storage.rpc("toggle_like", args.clone())
    })
    .await
    .context(ToggleSnafu { thread })?;
    // the procedure returns a one-row result set
    let outcome: Vec<LikeState> = serde_json::from_value(value).context(BadOutcomeSnafu)?;
    let like = outcome.into_iter().next().context(EmptyOutcomeSnafu)?;
    debug!(
        "{} now {} thread {} ({} likes in all)",
        session.user(),
        if like.liked { "likes" } else { "doesn't like" },
        thread,
        like.likes
    );
    counter_add!(state.instruments, "likes.toggles", 1, &[]);
    Ok(like)
}

/// Whether the caller currently likes `thread`
pub async fn liked_by(state: &Agora, session: &Session, thread: ThreadId) -> Result<bool> {
    let query = Select::from(store::LIKES)
        .columns(&["thread_id"])
        .filter(Filter::eq("user_id", json!(session.user())))
        .filter(Filter::eq("thread_id", json!(thread)))
        .limit(1);
    let rows = with_retry(&state.retry, "probing a like", || {
        state.storage.select(query.clone())
    })
    .await
    .context(ProbeSnafu { thread })?;
    Ok(!rows.is_empty())
}
