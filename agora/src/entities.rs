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

//! # agora entities
//!
//! ## Introduction
//!
//! I've never cared for "catch-all" modules named "models" or "entities", but the types herein
//! really are foundational: identifiers, the thread status, and the refined string types that keep
//! garbage out of the store. Everything else in this crate is written in terms of them.

use std::{fmt::Display, ops::Deref, str::FromStr};

use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace};
use uuid::Uuid;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{email} is not a valid e-mail address"))]
    BadEmail { email: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a thread status (expected open, closed or solved)"))]
    BadStatus { text: String, backtrace: Backtrace },
    #[snafu(display("Thread titles may not be empty, nor begin or end with whitespace"))]
    BadTitle { backtrace: Backtrace },
    #[snafu(display("{name} is not a valid username"))]
    BadUsername { name: String },
    #[snafu(display("Reply content may not be empty, nor begin or end with whitespace"))]
    EmptyReply { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

fn mk_serde_de_err<'de, D: serde::Deserializer<'de>>(err: impl std::error::Error) -> D::Error {
    <D::Error as serde::de::Error>::custom(format!("{:?}", err))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// identifier!
///
/// Declare a newtype struct over [Uuid] intended to serve as an opaque identifier for some other
/// sort of entity. The store hands ids back as text and takes them the same way, so each such type
/// serializes transparently (in the hyphenated format). I could have used [Uuid] directly, but I
/// couldn't bring myself to use the same type to identify users, threads and replies all at the
/// same time; mixing up "which uuid is this?" is exactly the sort of bug the compiler should be
/// catching for me.
macro_rules! define_id {
    ($type_name:ident) => {
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $type_name(Uuid);
        impl $type_name {
            pub fn new() -> $type_name {
                $type_name(Uuid::new_v4())
            }
            pub fn from_raw_string(s: &str) -> StdResult<$type_name, uuid::Error> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
            pub fn to_raw_string(&self) -> String {
                format!("{}", self.0.as_simple())
            }
        }
        impl Default for $type_name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
    };
}

define_id!(ThreadId);
define_id!(ReplyId);
define_id!(UserId);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          ThreadStatus                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Where a thread is in its lifecycle
///
/// Threads open `Open`; their owner (or an admin) may move them to any of the three states at any
/// time, including back to `Open` from `Solved`. Only `Open` threads accept replies.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Open,
    Closed,
    Solved,
}

impl Default for ThreadStatus {
    fn default() -> Self {
        ThreadStatus::Open
    }
}

impl Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ThreadStatus::Open => "open",
                ThreadStatus::Closed => "closed",
                ThreadStatus::Solved => "solved",
            }
        )
    }
}

impl FromStr for ThreadStatus {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(ThreadStatus::Open),
            "closed" => Ok(ThreadStatus::Closed),
            "solved" => Ok(ThreadStatus::Solved),
            _ => BadStatusSnafu { text: s.to_owned() }.fail(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Username                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

// Display usernames may not be empty, may not begin or end with whitespace, and are capped at
// sixty-four bytes. There's no character-class restriction; they're display text, not routable
// names.
const MAX_USERNAME_LENGTH: usize = 64;

fn check_username(s: &str) -> bool {
    !s.is_empty() && s.trim().len() == s.len() && s.len() <= MAX_USERNAME_LENGTH
}

/// A refined type representing a display username
// Boy... writing refined types in Rust involves a *lot* of boilerplate. I have to wonder if there
// isn't a better way...
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Username(String);

impl Username {
    /// Construct a [Username] from a `&str`
    ///
    /// Use this constructor to create a [Username] instance by copying from a reference to [str].
    /// To *move* a [String] into a [Username] (with validity checking) use [TryFrom::try_from()].
    pub fn new(name: &str) -> Result<Username> {
        check_username(name)
            .then_some(Username(name.to_owned()))
            .ok_or(
                BadUsernameSnafu {
                    name: name.to_owned(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Username {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Username`
impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Username::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        Username::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(name: String) -> StdResult<Self, Self::Error> {
        if check_username(&name) {
            Ok(Username(name))
        } else {
            BadUsernameSnafu { name }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           UserEmail                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A refined type representing a syntactically valid e-mail address
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn new(email: &str) -> Result<UserEmail> {
        EmailAddress::is_valid(email)
            .then_some(UserEmail(email.to_string()))
            .context(BadEmailSnafu {
                email: email.to_string(),
            })
    }
    /// The text before the `@`; the default username for a freshly-created profile
    pub fn local_part(&self) -> &str {
        // validation guarantees an `@` is present
        self.0.split('@').next().unwrap(/* known good */)
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for UserEmail {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `UserEmail`
impl<'de> Deserialize<'de> for UserEmail {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        UserEmail::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for UserEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserEmail {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        UserEmail::new(s)
    }
}

impl TryFrom<String> for UserEmail {
    type Error = Error;

    fn try_from(email: String) -> StdResult<Self, Self::Error> {
        if EmailAddress::is_valid(&email) {
            Ok(UserEmail(email))
        } else {
            BadEmailSnafu { email }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    ThreadTitle & ReplyBody                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn check_user_text(s: &str) -> bool {
    !s.is_empty() && s.trim().len() == s.len()
}

/// A refined type representing a thread's title: non-empty, no flanking whitespace
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ThreadTitle(String);

impl ThreadTitle {
    pub fn new(title: &str) -> Result<ThreadTitle> {
        check_user_text(title)
            .then_some(ThreadTitle(title.to_owned()))
            .context(BadTitleSnafu)
    }
}

impl AsRef<str> for ThreadTitle {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for ThreadTitle {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ThreadTitle {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        ThreadTitle::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for ThreadTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThreadTitle {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        ThreadTitle::new(s)
    }
}

impl TryFrom<String> for ThreadTitle {
    type Error = Error;

    fn try_from(title: String) -> StdResult<Self, Self::Error> {
        if check_user_text(&title) {
            Ok(ThreadTitle(title))
        } else {
            BadTitleSnafu.fail()
        }
    }
}

/// A refined type representing a reply's content: non-empty, no flanking whitespace
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ReplyBody(String);

impl ReplyBody {
    pub fn new(content: &str) -> Result<ReplyBody> {
        check_user_text(content)
            .then_some(ReplyBody(content.to_owned()))
            .context(EmptyReplySnafu)
    }
}

impl AsRef<str> for ReplyBody {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for ReplyBody {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ReplyBody {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        ReplyBody::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for ReplyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReplyBody {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        ReplyBody::new(s)
    }
}

impl TryFrom<String> for ReplyBody {
    type Error = Error;

    fn try_from(content: String) -> StdResult<Self, Self::Error> {
        if check_user_text(&content) {
            Ok(ReplyBody(content))
        } else {
            EmptyReplySnafu.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Tags                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Parse a comma-separated tag list the way the composer offers it: split on commas, trim each
/// piece, drop the empties. Order is preserved; duplicates are the author's problem.
pub fn parse_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          row structs                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One row in `threads`
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: ThreadTitle,
    pub description: String,
    pub tags: Vec<String>,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
}

/// One row in `replies`
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Reply {
    pub id: ReplyId,
    pub content: ReplyBody,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub thread_id: ThreadId,
}

/// One row in `likes`; the pair is unique server-side
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Like {
    pub user_id: UserId,
    pub thread_id: ThreadId,
}

/// One row in `profiles`; `id` is the identity provider's id for the user
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Profile {
    pub id: UserId,
    pub username: Username,
    pub is_admin: bool,
    pub email: UserEmail,
}
