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

//! # agora metrics
//!
//! ## Introduction
//!
//! agora counts things with [OpenTelemetry]. The OTel API wants its instruments ("counters",
//! "gauges" & so forth) created once & re-used, which raises the question of where to *keep* them
//! all; I'd rather not grow a state struct with one field of type `Counter<u64>` per metric, and a
//! stringly-typed map brings both an `unwrap()` at every collection site and the risk of two call
//! sites colliding on one name.
//!
//! [OpenTelemetry]: https://docs.rs/opentelemetry/latest/opentelemetry/index.html
//!
//! The arrangement here uses David Tolnay's [inventory] crate to avoid a centralized list: each
//! collection site registers its metric name & sort at link time,
//!
//! ```ignore
//! inventory::submit! { metrics::Registration::new("threads.created", Sort::IntegralCounter) }
//! ```
//!
//! and [Instruments::new] walks the inventory once, pre-building every registered instrument &
//! panicking on a duplicate name. At the collection site, [counter_add!] handles the lookup. A
//! mis-typed name, or naming a gauge where a counter was registered, panics at runtime; these are
//! logic errors, though I remain a little uneasy about a bad name lurking in a rarely-trodden
//! path.
//!
//! This crate registers instruments against the global meter only; embedding applications that
//! want the numbers exported install their own SDK pipeline (provider, reader, exporter) before
//! constructing [Instruments]. Absent that, everything here is a well-behaved no-op.

use std::collections::{hash_map::Entry, HashMap, HashSet};

use opentelemetry::{
    global,
    metrics::{Counter, Gauge},
    KeyValue,
};

/// Instrument type
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sort {
    /// Corresponds to `Counter<u64>`
    IntegralCounter,
    /// Corresponds to `Gauge<f64>`
    FloatGauge,
    /// `Gauge<u64>`
    IntegralGauge,
    // more later?
}

/// The type of thing being inventoried
///
/// Register a metric by name & type using
///
/// ```ignore
/// inventory::submit! { metrics::Registration::new("threads.created", Sort::IntegralCounter) }
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Registration {
    name: &'static str,
    sort: Sort,
}

impl Registration {
    pub const fn new(name: &'static str, sort: Sort) -> Registration {
        Registration { name, sort }
    }
    pub fn name(&self) -> String {
        self.name.to_string()
    }
    pub fn sort(&self) -> Sort {
        self.sort
    }
}

inventory::collect!(Registration);

pub fn check_metric_registrations() {
    let mut names: HashSet<String> = HashSet::new();
    IntoIterator::into_iter(inventory::iter::<Registration>).for_each(|reg| {
        if names.contains(&reg.name()) {
            panic!("The metric name {} was used twice", reg.name());
        }
        names.insert(reg.name());
    });
}

enum Instrument {
    CounterU64(Counter<u64>),
    GaugeF64(Gauge<f64>),
    GaugeU64(Gauge<u64>),
}

/// Container for OTel instruments
pub struct Instruments {
    meter: opentelemetry::metrics::Meter,
    map: HashMap<String, Instrument>,
}

impl Instruments {
    pub fn new(prefix: &'static str) -> Instruments {
        let mut m: HashMap<String, Instrument> = HashMap::new();
        let meter = global::meter(prefix);
        // Pre-building every registered instrument may build some that are never exercised, but
        // it buys `add` and the `record`s `&self` receivers, so an instance can live in an `Arc`.
        IntoIterator::into_iter(inventory::iter::<Registration>).for_each(|reg| {
            let name = reg.name();
            match m.entry(reg.name()) {
                Entry::Occupied(_occupied_entry) => {
                    panic!("The metric name {} was used twice", name)
                }
                Entry::Vacant(vacant_entry) => {
                    vacant_entry.insert(match reg.sort() {
                        Sort::IntegralCounter => {
                            Instrument::CounterU64(meter.u64_counter(name).build())
                        }
                        Sort::FloatGauge => Instrument::GaugeF64(meter.f64_gauge(name).build()),
                        Sort::IntegralGauge => Instrument::GaugeU64(meter.u64_gauge(name).build()),
                    });
                }
            }
        });

        Instruments { meter, map: m }
    }
    pub fn meter(&self) -> &opentelemetry::metrics::Meter {
        &self.meter
    }
    // panics if `name` doesn't name a counter
    pub fn add(&self, name: &str, count: u64, attributes: &[KeyValue]) {
        if let Some(Instrument::CounterU64(c)) = self.map.get(name) {
            c.add(count, attributes);
        } else {
            panic!("{} does not name a counter", name);
        }
    }
    pub fn recordf(&self, name: &str, value: f64, attributes: &[KeyValue]) {
        if let Some(Instrument::GaugeF64(g)) = self.map.get(name) {
            g.record(value, attributes);
        } else {
            panic!("{} does not name a gauge", name);
        }
    }
    pub fn recordu(&self, name: &str, value: u64, attributes: &[KeyValue]) {
        if let Some(Instrument::GaugeU64(g)) = self.map.get(name) {
            g.record(value, attributes);
        } else {
            panic!("{} does not name a gauge", name);
        }
    }
}

#[macro_export]
macro_rules! counter_add {
    ($instr:expr, $name:expr, $count:expr, $attrs:expr) => {
        $instr.add($name, $count, $attrs);
    };
}

#[macro_export]
macro_rules! gauge_setu {
    ($instr:expr, $name:expr, $value:expr, $attrs:expr) => {
        $instr.recordu($name, $value, $attrs);
    };
}
