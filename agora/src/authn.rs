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

//! # identity
//!
//! ## Introduction
//!
//! agora treats identity as an injected capability rather than ambient state: an operation that
//! requires a signed-in caller takes a [Session], and holding one *is* the proof of sign-in. The
//! domain layer consumes nothing from identity but the opaque user id & the e-mail address (the
//! latter only to default a fresh profile's username), so that's all a [Session] carries.
//!
//! Actually producing sessions is the job of an [IdentityProvider]. Token exchange against a real
//! identity service is beyond this crate's remit; the implementation shipped here,
//! [Preconfigured], holds an identity fixed at construction, which suits the command-line client
//! and makes tests trivial. Anything that can mint a [Session] plugs in by implementing the
//! trait.

use async_trait::async_trait;
use secrecy::SecretString;
use snafu::{prelude::*, Backtrace};
use tokio::sync::Mutex;

use crate::entities::{UserEmail, UserId};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("This operation requires a signed-in user"))]
    NotSignedIn { backtrace: Backtrace },
    #[snafu(display("The identity provider rejected the request: {source}"))]
    Provider {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[snafu(display("The preconfigured identity provider cannot register new users"))]
    Unsupported { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Proof of sign-in: an opaque user id & an e-mail address
#[derive(Clone, Debug)]
pub struct Session {
    email: UserEmail,
    user: UserId,
}

impl Session {
    pub fn new(user: UserId, email: UserEmail) -> Session {
        Session { email, user }
    }
    pub fn email(&self) -> &UserEmail {
        &self.email
    }
    pub fn user(&self) -> UserId {
        self.user
    }
}

/// Turn "maybe signed-in" into "signed-in or an error", *before* any remote call goes out
pub fn require(session: Option<&Session>) -> Result<&Session> {
    session.context(NotSignedInSnafu)
}

/// The interface which any source of sessions must implement
#[async_trait]
pub trait IdentityProvider {
    /// Register a new user & sign them in
    async fn sign_up(&self, email: &UserEmail, password: &SecretString) -> Result<Session>;
    /// Exchange credentials for a [Session]
    async fn sign_in(&self, email: &UserEmail, password: &SecretString) -> Result<Session>;
    /// Invalidate the current session, if any
    async fn sign_out(&self) -> Result<()>;
    /// The current session, if any
    async fn current(&self) -> Result<Option<Session>>;
}

/// An [IdentityProvider] whose one identity is fixed at construction
///
/// Sign-in ignores the offered credentials & re-establishes the configured identity; sign-up is
/// refused.
pub struct Preconfigured {
    identity: Session,
    signed_in: Mutex<Option<Session>>,
}

impl Preconfigured {
    pub fn new(identity: Session) -> Preconfigured {
        let signed_in = Mutex::new(Some(identity.clone()));
        Preconfigured {
            identity,
            signed_in,
        }
    }
}

#[async_trait]
impl IdentityProvider for Preconfigured {
    async fn sign_up(&self, _email: &UserEmail, _password: &SecretString) -> Result<Session> {
        UnsupportedSnafu.fail()
    }
    async fn sign_in(&self, _email: &UserEmail, _password: &SecretString) -> Result<Session> {
        let mut guard = self.signed_in.lock().await;
        *guard = Some(self.identity.clone());
        Ok(self.identity.clone())
    }
    async fn sign_out(&self) -> Result<()> {
        let mut guard = self.signed_in.lock().await;
        *guard = None;
        Ok(())
    }
    async fn current(&self) -> Result<Option<Session>> {
        Ok(self.signed_in.lock().await.clone())
    }
}
