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

//! # forum lifecycle
//!
//! ## Introduction
//!
//! The write side of the forum: opening threads, replying, moving a thread through its lifecycle.
//! Two wrinkles deserve mention.
//!
//! First, replying re-checks. A reader can sit on a thread page for an hour before typing their
//! reply, and the owner may have closed the thread in the meantime; the cached record in the
//! caller's hands proves nothing. [submit_reply] therefore re-fetches the thread's *current*
//! status & refuses with [Error::NotOpen] (carrying the fresh status, so the caller can repaint)
//! before inserting. There remains a window between the check & the insert in which the thread
//! can close; closing a thread is housekeeping, not access control, so a reply slipping through
//! that window is harmless & we accept it rather than buy a store-side transaction.
//!
//! Second, transitions are unconstrained. Open, closed & solved form no ladder: the owner may
//! re-open a solved thread, mark a closed one solved, & so on. Threads are conversations, not
//! tickets.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    agora::Agora,
    authn::Session,
    counter_add, entities,
    entities::{
        parse_tags, Reply, ReplyBody, ReplyId, Thread, ThreadId, ThreadStatus, ThreadTitle,
    },
    metrics,
    metrics::Sort,
    retry::with_retry,
    store,
    store::{Filter, Select},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to re-check the status of thread {thread}: {source}"))]
    CheckStatus {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create a thread: {source}"))]
    CreateThread {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to decode a row from the store: {source}"))]
    Decode {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to add a reply to thread {thread}: {source}"))]
    InsertReply {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Thread {thread} is {status} and no longer accepts replies"))]
    NotOpen {
        thread: ThreadId,
        status: ThreadStatus,
        backtrace: Backtrace,
    },
    #[snafu(display("Only the owner of thread {thread} may change its status"))]
    NotYours { thread: ThreadId, backtrace: Backtrace },
    #[snafu(display("Thread {thread} no longer exists"))]
    ThreadVanished { thread: ThreadId, backtrace: Backtrace },
    #[snafu(display("Failed to update the status of thread {thread}: {source}"))]
    UpdateStatus {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    Validation {
        source: entities::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

inventory::submit! { metrics::Registration::new("threads.created", Sort::IntegralCounter) }

/// Open a new thread
///
/// `tags` is the composer's comma-separated text; it's parsed with [parse_tags]. The id & the
/// `created_at` stamp are assigned here, the status is always `open`, & the complete row goes to
/// the store in one insert.
pub async fn create_thread(
    state: &Agora,
    session: &Session,
    title: &str,
    description: &str,
    tags: &str,
) -> Result<Thread> {
    let title = ThreadTitle::new(title).context(ValidationSnafu)?;
    let thread = Thread {
        id: ThreadId::new(),
        title,
        description: description.to_owned(),
        tags: parse_tags(tags),
        status: ThreadStatus::Open,
        created_at: Utc::now(),
        user_id: session.user(),
    };
    let row = json!({
        "id": thread.id,
        "title": &thread.title,
        "description": &thread.description,
        "tags": &thread.tags,
        "status": thread.status,
        "created_at": thread.created_at,
        "user_id": thread.user_id,
    });
    with_retry(&state.retry, "creating a thread", || {
        state.storage.insert(store::THREADS, row.clone())
    })
    .await
    .context(CreateThreadSnafu)?;
    debug!("{} opened thread {}", thread.user_id, thread.id);
    counter_add!(state.instruments, "threads.created", 1, &[]);
    Ok(thread)
}

/// The thread's status as the store has it *right now*
async fn current_status(state: &Agora, thread: ThreadId) -> Result<ThreadStatus> {
    let query = Select::from(store::THREADS)
        .columns(&["status"])
        .filter(Filter::eq("id", json!(thread)));
    let rows = with_retry(&state.retry, "re-checking a thread's status", || {
        state.storage.select(query.clone())
    })
    .await
    .context(CheckStatusSnafu { thread })?;

    #[derive(Deserialize)]
    struct StatusRow {
        status: ThreadStatus,
    }

    store::decode::<StatusRow>(rows)
        .context(DecodeSnafu)?
        .into_iter()
        .next()
        .map(|row| row.status)
        .context(ThreadVanishedSnafu { thread })
}

inventory::submit! { metrics::Registration::new("replies.created", Sort::IntegralCounter) }

/// Add a reply to an open thread
///
/// In order:
///
/// 1. validate the content locally;
/// 2. re-fetch the thread's current status (the caller's copy is presumed stale);
/// 3. refuse if it isn't `open`;
/// 4. insert.
pub async fn submit_reply(
    state: &Agora,
    session: &Session,
    thread: ThreadId,
    content: &str,
) -> Result<Reply> {
    let content = ReplyBody::new(content).context(ValidationSnafu)?;

    let status = current_status(state, thread).await?;
    ensure!(status == ThreadStatus::Open, NotOpenSnafu { thread, status });

    let reply = Reply {
        id: ReplyId::new(),
        content,
        created_at: Utc::now(),
        user_id: session.user(),
        thread_id: thread,
    };
    let row = json!({
        "id": reply.id,
        "content": &reply.content,
        "created_at": reply.created_at,
        "user_id": reply.user_id,
        "thread_id": reply.thread_id,
    });
    with_retry(&state.retry, "submitting a reply", || {
        state.storage.insert(store::REPLIES, row.clone())
    })
    .await
    .context(InsertReplySnafu { thread })?;
    counter_add!(state.instruments, "replies.created", 1, &[]);
    Ok(reply)
}

inventory::submit! { metrics::Registration::new("threads.status-changes", Sort::IntegralCounter) }

/// Set the status of the caller's own thread
///
/// Ownership is checked against the record in hand, before anything goes over the wire; an
/// admin moving someone *else's* thread goes through [crate::moderation::override_status]
/// instead.
pub async fn set_status(
    state: &Agora,
    session: &Session,
    thread: &Thread,
    status: ThreadStatus,
) -> Result<()> {
    ensure!(
        thread.user_id == session.user(),
        NotYoursSnafu { thread: thread.id }
    );
    let filters = [Filter::eq("id", json!(thread.id))];
    with_retry(&state.retry, "updating a thread's status", || {
        state
            .storage
            .update(store::THREADS, &filters, json!({"status": status}))
    })
    .await
    .context(UpdateStatusSnafu { thread: thread.id })?;
    debug!("{} moved thread {} to {}", session.user(), thread.id, status);
    counter_add!(state.instruments, "threads.status-changes", 1, &[]);
    Ok(())
}
