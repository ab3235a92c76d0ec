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

//! # agora
//!
//! General (i.e. not documenting a particular struct or a method) documentation goes here. It's
//! really just a grab bag at this point; I'll polish it after collecting some content.
//!
//! ## The Data Store
//!
//! agora keeps its rows in Postgres, but never speaks SQL: everything goes through a hosted
//! PostgREST facade (in practice, a Supabase project's `/rest/v1` endpoint). That made the store
//! boundary easy to draw; [crate::store::Backend] is just the handful of verbs that facade
//! offers (filtered selects, inserts, patches, deletes, counts & named procedures), and
//! [crate::postgrest] is the one adapter. The domain modules are written against the trait, so
//! the test suites swap in an in-memory implementation and the interesting logic gets exercised
//! without a network in sight.
//!
//! Two mutations don't fit the row-verb model: toggling a like and flipping a user's admin bit.
//! Both are races or privilege escalations if the client does read-modify-write, so both live in
//! the database as stored procedures (`toggle_like`, `set_user_admin`) and agora just invokes
//! them. See [crate::likes] for the gory details on the former.
//!
//! ## Unreliability
//!
//! The whole design assumes the store is far away and flaky. Every remote call in this crate is
//! made through [crate::retry::with_retry]; nothing calls [crate::store::Backend] naked. On top
//! of that, the read-side aggregation in [crate::views] distinguishes data we can't do without
//! (the threads themselves) from decoration (author names, like counts) and degrades the latter
//! instead of failing the page. Those two mechanisms are deliberately separate layers; retry
//! handles the transient, degradation handles the persistent.
