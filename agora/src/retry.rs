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

//! # retrying remote operations
//!
//! ## Introduction
//!
//! Every call agora makes against the store crosses the network to a hosted service, and hosted
//! services flake: connections reset, gateways time out, the service hiccoughs during a deploy.
//! The policy here is plain exponential backoff: try the operation, and on failure try again up
//! to a configured maximum number of attempts, sleeping `unit * 2^n` in between (with the
//! one-second default, that's two seconds after the first failure, four after the second).
//! There's no jitter; a forum client isn't going to produce a thundering herd.
//!
//! Since a [Future] is consumed when it's awaited, the caller can't hand us *the* operation;
//! [with_retry] instead takes a factory producing a fresh future per attempt. The signature came
//! out a bit prolix, but call sites read fine:
//!
//! ```ignore
//! let rows = with_retry(&state.retry, "fetching threads", || {
//!     state.storage.select(query.clone())
//! })
//! .await?;
//! ```
//!
//! Every layer issuing remote calls is expected to route them through [with_retry]; a direct,
//! unwrapped call is a bug, not an optimization.

use std::{future::Future, time::Duration};

use serde::Deserialize;
use snafu::{prelude::*, Backtrace};
use tokio::time::sleep;
use tracing::{debug, error};

use crate::store;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The number of attempts must be positive"))]
    ZeroAttempts { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

/// Backoff & retry settings for remote operations
///
/// Deserializes from configuration with kebab-case keys; both fields are optional & default to
/// three attempts with a one-second unit.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryParameters {
    #[serde(rename = "num-attempts")]
    num_attempts: usize,
    unit: Duration,
}

impl Default for RetryParameters {
    fn default() -> Self {
        RetryParameters {
            num_attempts: 3,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryParameters {
    pub fn new(num_attempts: usize, unit: Duration) -> Result<RetryParameters> {
        ensure!(num_attempts > 0, ZeroAttemptsSnafu);
        Ok(RetryParameters { num_attempts, unit })
    }
    pub fn num_attempts(&self) -> usize {
        self.num_attempts
    }
    pub fn unit(&self) -> Duration {
        self.unit
    }
    /// How long to sleep after the n-th failed attempt (1-based)
    fn delay(&self, attempts: u32) -> Duration {
        self.unit * 2_u32.saturating_pow(attempts)
    }
}

/// Invoke `make_call` until it succeeds or `params` says to give up
///
/// `label` names the operation for the log ("fetching threads", say). Success returns
/// immediately; failure is retried on the exponential schedule above, and the *final* error is
/// the one propagated.
pub async fn with_retry<F, Fut, T>(
    params: &RetryParameters,
    label: &str,
    make_call: F,
) -> StdResult<T, store::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StdResult<T, store::Error>>,
{
    let mut attempts = 0;
    loop {
        match make_call().await {
            Ok(val) => {
                if attempts > 0 {
                    debug!("{} succeeded after {} failed attempts", label, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= params.num_attempts() {
                    error!(
                        "{} failed; giving up after {} attempts: {}",
                        label, attempts, err
                    );
                    return Err(err);
                }
                debug!(
                    "{} failed (attempt {}/{}): {}; retrying",
                    label,
                    attempts,
                    params.num_attempts(),
                    err
                );
                sleep(params.delay(attempts as u32)).await;
            }
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    // produce a call that fails its first `fail_first` invocations, then succeeds
    fn flaky(
        fail_first: usize,
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = StdResult<usize, store::Error>>>> + '_
    {
        move || {
            let calls = calls.clone();
            let fut: std::pin::Pin<Box<dyn Future<Output = StdResult<usize, store::Error>>>> =
                Box::pin(async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < fail_first {
                        Err(store::Error::new(std::io::Error::other("flake")))
                    } else {
                        Ok(n)
                    }
                });
            fut
        }
    }

    #[test]
    fn parameters() {
        let params = RetryParameters::default();
        assert_eq!(params.num_attempts(), 3);
        assert_eq!(params.unit(), Duration::from_secs(1));
        assert!(RetryParameters::new(0, Duration::from_secs(1)).is_err());
        // first retry waits 2s, second 4s-- strictly increasing
        assert_eq!(params.delay(1), Duration::from_secs(2));
        assert_eq!(params.delay(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn success_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();
        let got = with_retry(
            &RetryParameters::default(),
            "no-op",
            flaky(0, &calls),
        )
        .await
        .unwrap();
        assert_eq!(got, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();
        let got = with_retry(
            &RetryParameters::default(),
            "flaky-op",
            flaky(2, &calls),
        )
        .await
        .unwrap();
        assert_eq!(got, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();
        let got = with_retry(
            &RetryParameters::default(),
            "doomed-op",
            flaky(usize::MAX, &calls),
        )
        .await;
        assert!(got.is_err());
        // no more than the configured number of attempts & no sleep after the last failure
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }
}
