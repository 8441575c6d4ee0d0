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

use crate::client::{FetchError, StationSource};
use crate::metrics::{CollectorMetrics, Outcome};
use crate::page::IncompleteExtraction;
use crate::store::{self, Observation, Store, StoreError};
use std::error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level};

/// Time to wait after one collection attempt finishes before starting the next.
pub const COLLECTION_INTERVAL: Duration = Duration::from_secs(900);

#[derive(Debug)]
pub enum CollectError {
    Fetch(FetchError),
    Incomplete(IncompleteExtraction),
    Store(StoreError),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {}", e),
            Self::Incomplete(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "store failed: {}", e),
        }
    }
}

impl error::Error for CollectError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Incomplete(e) => Some(e),
            Self::Store(e) => Some(e),
        }
    }
}

/// Periodically fetches station values and appends them to the store.
///
/// Failures of any kind only end the current attempt. The next attempt happens after
/// the fixed interval regardless, there's no other retry.
#[derive(Debug)]
pub struct Collector<S> {
    source: S,
    store: Arc<Store>,
    metrics: CollectorMetrics,
    interval: Duration,
}

impl<S> Collector<S>
where
    S: StationSource + 'static,
{
    pub fn new(source: S, store: Arc<Store>, metrics: CollectorMetrics) -> Self {
        Self::with_interval(source, store, metrics, COLLECTION_INTERVAL)
    }

    pub fn with_interval(source: S, store: Arc<Store>, metrics: CollectorMetrics, interval: Duration) -> Self {
        Collector {
            source,
            store,
            metrics,
            interval,
        }
    }

    /// Make a single collection attempt: fetch, require every field, then append.
    ///
    /// Nothing is written unless all three fields were extracted.
    pub async fn collect(&self) -> Result<Observation, CollectError> {
        let extraction = self.source.fetch().await.map_err(|e| {
            self.metrics.outcome(Outcome::Transport);
            CollectError::Fetch(e)
        })?;

        let reading = extraction.complete().map_err(|e| {
            self.metrics.outcome(Outcome::Incomplete);
            CollectError::Incomplete(e)
        })?;

        let obs = store::blocking(&self.store, move |s| s.append(&reading))
            .await
            .map_err(|e| {
                self.metrics.outcome(Outcome::Storage);
                CollectError::Store(e)
            })?;

        self.metrics.stored(&obs);
        Ok(obs)
    }

    /// Start collecting on a background task, the first attempt is made immediately.
    pub fn spawn(self) -> CollectorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        CollectorHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        tracing::info!(
            message = "collection started",
            url = %self.source.url(),
            interval_secs = self.interval.as_secs(),
        );

        loop {
            match self
                .collect()
                .instrument(tracing::span!(Level::DEBUG, "collection_attempt"))
                .await
            {
                Ok(obs) => {
                    tracing::info!(
                        message = "stored observation",
                        id = obs.id,
                        water_level = obs.water_level,
                        flow = obs.flow,
                        station_updated_at = %obs.station_updated_at,
                    );
                }
                Err(CollectError::Incomplete(e)) => {
                    for (field, problem) in e.extraction.problems() {
                        tracing::warn!(message = "incomplete extraction", field = field, problem = %problem);
                    }
                }
                Err(e) => {
                    tracing::error!(message = "collection attempt failed", error = %e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop_rx.changed() => {
                    break;
                }
            }
        }

        tracing::info!(message = "collection stopped", url = %self.source.url());
    }
}

/// Handle to a running collector task. Dropping it stops the collector at its next wait.
#[derive(Debug)]
pub struct CollectorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    /// Stop the collector and wait for it to exit.
    ///
    /// An attempt that is already in flight is allowed to finish, the loop exits
    /// instead of waiting for the next one.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(message = "collector task failed", error = %e);
        }
    }
}
