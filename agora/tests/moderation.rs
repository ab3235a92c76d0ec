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

//! # moderation integration tests
//!
//! The admin gate, the cascade delete & the places it can stall, and the user-management
//! operations.

use std::sync::Arc;

use agora::{
    entities::{ReplyId, ThreadId, ThreadStatus, UserId},
    moderation, store,
};

mod common;

use common::{forum_over, like_row, profile_row, reply_row, session_for, thread_row, Memory};

/// Without the admin bit (or without a profile at all), nothing destructive even starts
#[tokio::test]
async fn the_gate_holds() {
    let alice = UserId::new();
    let bob = UserId::new();
    let t1 = ThreadId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::THREADS,
        vec![thread_row(t1, alice, "Precious", "open", "2025-05-01T09:00:00Z")],
    );
    backend.seed(store::PROFILES, vec![profile_row(bob, "bob", false)]);

    let state = forum_over(backend.clone());
    let bob_session = session_for(bob, "bob@example.com");
    assert!(matches!(
        moderation::delete_thread(&state, &bob_session, t1).await,
        Err(moderation::Error::Forbidden { .. })
    ));
    assert!(matches!(
        moderation::list_users(&state, &bob_session).await,
        Err(moderation::Error::Forbidden { .. })
    ));
    assert!(matches!(
        moderation::set_admin(&state, &bob_session, bob, true).await,
        Err(moderation::Error::Forbidden { .. })
    ));
    assert!(matches!(
        moderation::override_status(&state, &bob_session, t1, ThreadStatus::Closed).await,
        Err(moderation::Error::Forbidden { .. })
    ));

    // No profile row at all reads as non-admin, not as an error
    let nobody = session_for(UserId::new(), "nobody@example.com");
    assert!(matches!(
        moderation::delete_thread(&state, &nobody, t1).await,
        Err(moderation::Error::Forbidden { .. })
    ));

    // the journal holds gate reads & nothing else
    assert!(backend
        .journal()
        .iter()
        .all(|(verb, target)| *verb == "select" && target == store::PROFILES));
    assert_eq!(backend.rows(store::THREADS).len(), 1);
}

/// Dependents go first: replies, then likes, then the thread itself
#[tokio::test]
async fn cascade_in_order() {
    let admin = UserId::new();
    let alice = UserId::new();
    let t1 = ThreadId::new();
    let t2 = ThreadId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::THREADS,
        vec![
            thread_row(t1, alice, "Doomed", "open", "2025-05-01T09:00:00Z"),
            thread_row(t2, alice, "Spared", "open", "2025-05-02T09:00:00Z"),
        ],
    );
    backend.seed(
        store::REPLIES,
        vec![
            reply_row(ReplyId::new(), t1, alice, "first", "2025-05-01T10:00:00Z"),
            reply_row(ReplyId::new(), t2, alice, "other thread", "2025-05-02T10:00:00Z"),
        ],
    );
    backend.seed(store::LIKES, vec![like_row(alice, t1), like_row(admin, t2)]);
    backend.seed(store::PROFILES, vec![profile_row(admin, "admin", true)]);

    let state = forum_over(backend.clone());
    moderation::delete_thread(&state, &session_for(admin, "admin@example.com"), t1)
        .await
        .unwrap();

    let journal = backend.journal();
    let deletes = journal
        .iter()
        .filter(|(verb, _)| *verb == "delete")
        .map(|(_, target)| target.as_str())
        .collect::<Vec<_>>();
    assert_eq!(deletes, vec!["replies", "likes", "threads"]);

    // t1 & its dependents are gone; t2's are untouched
    assert_eq!(backend.rows(store::THREADS).len(), 1);
    assert_eq!(backend.rows(store::REPLIES).len(), 1);
    assert_eq!(backend.rows(store::LIKES).len(), 1);
}

/// If a dependent delete exhausts its retries, the thread row is never touched
#[tokio::test]
async fn cascade_stalls_before_the_thread() {
    let admin = UserId::new();
    let t1 = ThreadId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::THREADS,
        vec![thread_row(t1, admin, "Sticky", "open", "2025-05-01T09:00:00Z")],
    );
    backend.seed(store::PROFILES, vec![profile_row(admin, "admin", true)]);
    backend.fail("delete", store::LIKES, usize::MAX);

    let state = forum_over(backend.clone());
    let err = moderation::delete_thread(&state, &session_for(admin, "admin@example.com"), t1)
        .await
        .unwrap_err();
    assert!(matches!(err, moderation::Error::DeleteLikes { .. }));
    assert_eq!(backend.calls("delete", store::LIKES), 3);
    assert_eq!(backend.calls("delete", store::THREADS), 0);
    assert_eq!(backend.rows(store::THREADS).len(), 1);
}

/// If it's the *last* step that fails, the orphaned-dependents state is reported, not hidden
#[tokio::test]
async fn cascade_reports_a_failed_final_step() {
    let admin = UserId::new();
    let t1 = ThreadId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::THREADS,
        vec![thread_row(t1, admin, "Stubborn", "open", "2025-05-01T09:00:00Z")],
    );
    backend.seed(
        store::REPLIES,
        vec![reply_row(ReplyId::new(), t1, admin, "reply", "2025-05-01T10:00:00Z")],
    );
    backend.seed(store::PROFILES, vec![profile_row(admin, "admin", true)]);
    backend.fail("delete", store::THREADS, usize::MAX);

    let state = forum_over(backend.clone());
    let err = moderation::delete_thread(&state, &session_for(admin, "admin@example.com"), t1)
        .await
        .unwrap_err();
    assert!(matches!(err, moderation::Error::DeleteThread { .. }));
    assert!(backend.rows(store::REPLIES).is_empty());
    assert_eq!(backend.rows(store::THREADS).len(), 1);
}

#[tokio::test]
async fn admins_override_status() {
    let admin = UserId::new();
    let alice = UserId::new();
    let t1 = ThreadId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::THREADS,
        vec![thread_row(t1, alice, "Heated", "open", "2025-05-01T09:00:00Z")],
    );
    backend.seed(store::PROFILES, vec![profile_row(admin, "admin", true)]);

    let state = forum_over(backend.clone());
    moderation::override_status(
        &state,
        &session_for(admin, "admin@example.com"),
        t1,
        ThreadStatus::Closed,
    )
    .await
    .unwrap();
    assert_eq!(
        backend.rows(store::THREADS)[0]["status"],
        serde_json::json!("closed")
    );
}

/// Users come back sorted by username; the admin flip goes through the stored procedure and is
/// visible to the next gate check
#[tokio::test]
async fn user_management() {
    let admin = UserId::new();
    let alice = UserId::new();
    let bob = UserId::new();
    let backend = Arc::new(Memory::new());
    backend.seed(
        store::PROFILES,
        vec![
            profile_row(bob, "bob", false),
            profile_row(admin, "zelda", true),
            profile_row(alice, "alice", false),
        ],
    );

    let state = forum_over(backend.clone());
    let zelda = session_for(admin, "zelda@example.com");
    let users = moderation::list_users(&state, &zelda).await.unwrap();
    assert_eq!(
        users
            .iter()
            .map(|profile| profile.username.as_ref())
            .collect::<Vec<_>>(),
        vec!["alice", "bob", "zelda"]
    );

    moderation::set_admin(&state, &zelda, alice, true).await.unwrap();
    assert_eq!(backend.calls("rpc", "set_user_admin"), 1);
    let users = moderation::list_users(&state, &zelda).await.unwrap();
    assert!(users
        .iter()
        .find(|profile| profile.id == alice)
        .map(|profile| profile.is_admin)
        .unwrap());

    // The gate is re-read on every call: zelda's *self*-demotion takes effect immediately
    moderation::set_admin(&state, &zelda, admin, false).await.unwrap();
    assert!(matches!(
        moderation::list_users(&state, &zelda).await,
        Err(moderation::Error::Forbidden { .. })
    ));
}
