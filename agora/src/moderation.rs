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

//! # moderation
//!
//! ## Introduction
//!
//! The operations in this module are for administrators only, & every one of them begins by
//! re-reading the caller's own profile to check the admin flag: a cached "I'm an admin" from
//! sign-in time would outlive revocation, and these are precisely the calls where that matters.
//! A caller who fails the gate learns nothing beyond [Error::Forbidden].
//!
//! Thread deletion is a client-driven cascade-- replies, then likes, then the thread row--
//! because the store interface has no transaction spanning three relations. The ordering is
//! chosen so that a failure partway through never leaves invisible garbage: if a dependent
//! delete fails we stop *before* touching the thread row, so the thread (and whatever survived)
//! remains on the front page, visibly incomplete & re-deletable. The converse failure (the
//! dependents gone, the thread row refusing to die) leaves a childless thread; that's reported
//! to the caller rather than rolled back, & re-running the deletion clears it.

use serde::Deserialize;
use serde_json::json;
use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    agora::Agora,
    authn::Session,
    counter_add,
    entities::{Profile, ThreadId, ThreadStatus, UserId},
    metrics,
    metrics::Sort,
    retry::with_retry,
    store,
    store::{Filter, Order, Select},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to decode a row from the store: {source}"))]
    Decode {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "Failed to delete the likes of thread {thread}: {source}; the thread row was not touched"
    ))]
    DeleteLikes {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "Failed to delete the replies of thread {thread}: {source}; the thread row was not touched"
    ))]
    DeleteReplies {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "Failed to delete thread {thread} after its replies & likes were removed: {source}; re-run the deletion"
    ))]
    DeleteThread {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("This operation requires an administrator"))]
    Forbidden { backtrace: Backtrace },
    #[snafu(display("Failed to verify administrator rights: {source}"))]
    Gate {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to list users: {source}"))]
    ListUsers {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to override the status of thread {thread}: {source}"))]
    OverrideStatus {
        thread: ThreadId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to set the admin flag for {user}: {source}"))]
    SetAdmin {
        user: UserId,
        source: store::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject the caller unless their profile carries the admin flag, before any destructive call
/// goes out
async fn require_admin(state: &Agora, session: &Session) -> Result<()> {
    let query = Select::from(store::PROFILES)
        .columns(&["is_admin"])
        .filter(Filter::eq("id", json!(session.user())));
    let rows = with_retry(&state.retry, "checking administrator rights", || {
        state.storage.select(query.clone())
    })
    .await
    .context(GateSnafu)?;

    #[derive(Deserialize)]
    struct AdminRow {
        is_admin: bool,
    }

    let is_admin = store::decode::<AdminRow>(rows)
        .context(DecodeSnafu)?
        .into_iter()
        .next()
        .map(|row| row.is_admin)
        // no profile row yet: certainly not an administrator
        .unwrap_or(false);
    ensure!(is_admin, ForbiddenSnafu);
    Ok(())
}

inventory::submit! { metrics::Registration::new("threads.deleted", Sort::IntegralCounter) }

/// Delete a thread & everything hanging off it
///
/// Replies first, then likes, then the thread row; see the module doc for what each failure
/// mode leaves behind.
pub async fn delete_thread(state: &Agora, session: &Session, thread: ThreadId) -> Result<()> {
    require_admin(state, session).await?;
    let by_thread = [Filter::eq("thread_id", json!(thread))];
    with_retry(&state.retry, "deleting a thread's replies", || {
        state.storage.delete(store::REPLIES, &by_thread)
    })
    .await
    .context(DeleteRepliesSnafu { thread })?;
    with_retry(&state.retry, "deleting a thread's likes", || {
        state.storage.delete(store::LIKES, &by_thread)
    })
    .await
    .context(DeleteLikesSnafu { thread })?;
    let by_id = [Filter::eq("id", json!(thread))];
    with_retry(&state.retry, "deleting a thread", || {
        state.storage.delete(store::THREADS, &by_id)
    })
    .await
    .context(DeleteThreadSnafu { thread })?;
    debug!("{} deleted thread {}", session.user(), thread);
    counter_add!(state.instruments, "threads.deleted", 1, &[]);
    Ok(())
}

/// Set any thread's status directly
///
/// No ownership check, no status re-fetch; the admin is presumed to be looking at the thread
/// they're moderating.
pub async fn override_status(
    state: &Agora,
    session: &Session,
    thread: ThreadId,
    status: ThreadStatus,
) -> Result<()> {
    require_admin(state, session).await?;
    let filters = [Filter::eq("id", json!(thread))];
    with_retry(&state.retry, "overriding a thread's status", || {
        state
            .storage
            .update(store::THREADS, &filters, json!({"status": status}))
    })
    .await
    .context(OverrideStatusSnafu { thread })?;
    debug!(
        "admin {} moved thread {} to {}",
        session.user(),
        thread,
        status
    );
    Ok(())
}

/// Every profile, ordered by username, for the moderation console
pub async fn list_users(state: &Agora, session: &Session) -> Result<Vec<Profile>> {
    require_admin(state, session).await?;
    let query = Select::from(store::PROFILES).order_by(Order::asc("username"));
    let rows = with_retry(&state.retry, "listing users", || {
        state.storage.select(query.clone())
    })
    .await
    .context(ListUsersSnafu)?;
    store::decode::<Profile>(rows).context(DecodeSnafu)
}

inventory::submit! { metrics::Registration::new("moderation.admin-flips", Sort::IntegralCounter) }

/// Grant or revoke another user's admin flag
///
/// Like the like toggle, this is a named procedure: a profile row is writable by its owner, but
/// `is_admin` must not be, so the flip happens store-side under the store's own authority.
pub async fn set_admin(state: &Agora, session: &Session, user: UserId, admin: bool) -> Result<()> {
    require_admin(state, session).await?;
    let args = json!({"user_id": user, "admin_status": admin});
    with_retry(&state.retry, "setting the admin flag", || {
        state.storage.rpc("set_user_admin", args.clone())
    })
    .await
    .context(SetAdminSnafu { user })?;
    debug!("{} set is_admin={} for {}", session.user(), admin, user);
    counter_add!(state.instruments, "moderation.admin-flips", 1, &[]);
    Ok(())
}
