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

//! # profiles
//!
//! A profile is the forum-visible face of an identity-provider user: a display username & the
//! admin flag, keyed by the provider's opaque id. Profiles are created *lazily*, on first access,
//! with the username defaulted to the e-mail's local part; nothing in the system requires that a
//! profile exist before its user shows up in a view (see the `"Unknown"` fallback in
//! [crate::views]).

use serde_json::json;
use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    agora::Agora,
    authn::Session,
    counter_add, entities,
    entities::{Profile, UserId, Username},
    metrics,
    metrics::Sort,
    retry::with_retry,
    store,
    store::{Filter, Select},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create a profile for {user}: {source}"))]
    Create {
        user: UserId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to decode a profile row: {source}"))]
    Decode {
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to fetch the profile for {user}: {source}"))]
    Fetch {
        user: UserId,
        source: store::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to update the profile for {user}: {source}"))]
    Update {
        user: UserId,
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

inventory::submit! { metrics::Registration::new("profiles.created", Sort::IntegralCounter) }

/// Fetch the caller's profile, creating it on first access
///
/// The freshly-created profile's username is the e-mail's local part; the owner can change it
/// with [update_username] afterwards.
pub async fn ensure_profile(state: &Agora, session: &Session) -> Result<Profile> {
    let user = session.user();
    let query = Select::from(store::PROFILES).filter(Filter::eq("id", json!(user)));
    let rows = with_retry(&state.retry, "fetching a profile", || {
        state.storage.select(query.clone())
    })
    .await
    .context(FetchSnafu { user })?;
    if let Some(profile) = store::decode::<Profile>(rows)
        .context(DecodeSnafu)?
        .into_iter()
        .next()
    {
        return Ok(profile);
    }
    // First access-- derive a username & insert.
    let username = Username::new(session.email().local_part()).context(ValidationSnafu)?;
    let row = json!({
        "id": user,
        "username": &username,
        "is_admin": false,
        "email": session.email(),
    });
    with_retry(&state.retry, "creating a profile", || {
        state.storage.insert(store::PROFILES, row.clone())
    })
    .await
    .context(CreateSnafu { user })?;
    debug!("Created a profile for {} ({})", username, user);
    counter_add!(state.instruments, "profiles.created", 1, &[]);
    Ok(Profile {
        id: user,
        username,
        is_admin: false,
        email: session.email().clone(),
    })
}

/// Change the caller's own display username
///
/// Validation is local & happens before anything goes over the wire.
pub async fn update_username(state: &Agora, session: &Session, username: &str) -> Result<Username> {
    let username = Username::new(username).context(ValidationSnafu)?;
    let user = session.user();
    let filters = [Filter::eq("id", json!(user))];
    with_retry(&state.retry, "updating a username", || {
        state
            .storage
            .update(store::PROFILES, &filters, json!({"username": &username}))
    })
    .await
    .context(UpdateSnafu { user })?;
    Ok(username)
}
