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

//! # agora application state
//!
//! One bundle of everything an operation needs: the storage backend, the retry policy applied to
//! every remote call against it, and the metrics instruments. Consumers build one [Agora] at
//! startup, wrap it in an [Arc] & hand references to the operation functions in [forum],
//! [likes], [moderation], [profiles] & [views].
//!
//! [forum]: crate::forum
//! [likes]: crate::likes
//! [moderation]: crate::moderation
//! [profiles]: crate::profiles
//! [views]: crate::views

use std::sync::Arc;

use crate::{
    metrics::{check_metric_registrations, Instruments},
    retry::RetryParameters,
    store,
};

/// agora application state
pub struct Agora {
    pub instruments: Instruments,
    pub retry: RetryParameters,
    pub storage: Arc<dyn store::Backend + Send + Sync>,
}

impl Agora {
    pub fn new(storage: Arc<dyn store::Backend + Send + Sync>, retry: RetryParameters) -> Agora {
        check_metric_registrations();
        Agora {
            instruments: Instruments::new("agora"),
            retry,
            storage,
        }
    }
}
