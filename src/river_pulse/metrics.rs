// river_pulse - Water level and flow collector for hydrological station pages
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::store::Observation;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

/// How a single collection attempt ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    Stored,
    Transport,
    Incomplete,
    Storage,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Transport => "transport",
            Self::Incomplete => "incomplete",
            Self::Storage => "storage",
        }
    }
}

impl EncodeLabelValue for Outcome {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        EncodeLabelValue::encode(&self.as_str(), encoder)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

/// Holder for metrics updated by the collector.
///
/// All metrics are created and registered upon call to `CollectorMetrics::new()`. With
/// the registry prefix used by `river_pulse` they are exposed as:
///
/// * `river_pulse_collections_total{outcome}` - Collection attempts by outcome.
/// * `river_pulse_water_level_meters` - Most recently stored water level.
/// * `river_pulse_flow` - Most recently stored flow.
///
/// An `incomplete` outcome means the page was fetched but its markup no longer matched.
#[derive(Clone, Debug, Default)]
pub struct CollectorMetrics {
    collections: Family<OutcomeLabels, Counter>,
    water_level: Gauge<f64, AtomicU64>,
    flow: Gauge<f64, AtomicU64>,
}

impl CollectorMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "collections",
            "Collection attempts by outcome",
            metrics.collections.clone(),
        );
        reg.register(
            "water_level_meters",
            "Most recently stored water level in meters above sea level",
            metrics.water_level.clone(),
        );
        reg.register("flow", "Most recently stored flow", metrics.flow.clone());

        metrics
    }

    pub fn outcome(&self, outcome: Outcome) {
        self.collections.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    /// Record a successfully stored observation.
    pub fn stored(&self, obs: &Observation) {
        self.outcome(Outcome::Stored);
        self.water_level.set(obs.water_level);
        self.flow.set(obs.flow);
    }

    #[cfg(test)]
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.collections.get_or_create(&OutcomeLabels { outcome }).get()
    }
}
