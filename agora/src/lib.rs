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
//! The agora library crate: a discussion forum's domain layer (thread lifecycle, replies, likes,
//! moderation) over a remote row store it treats as unreliable. The `agorac` binary is a thin
//! shell over this.
pub mod _docs;
pub mod agora;
pub mod authn;
pub mod entities;
pub mod forum;
pub mod likes;
pub mod metrics;
pub mod moderation;
pub mod postgrest;
pub mod profiles;
pub mod retry;
pub mod store;
pub mod views;
