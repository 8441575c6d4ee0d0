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

//! SQLite backed, append-only log of observations.

use crate::page::Reading;
use chrono::{Local, NaiveDateTime, Timelike};
use rusqlite::{params, Connection};
use std::error;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinError;

/// Format used for `captured_at` both on disk and in the read API.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS water_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        water_level REAL NOT NULL,
        flow REAL NOT NULL,
        latest_update TEXT NOT NULL
    )";

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Poisoned,
    Task(JoinError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite error: {}", e),
            Self::Poisoned => write!(f, "store connection lock poisoned"),
            Self::Task(e) => write!(f, "store task failed: {}", e),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::Task(e) => Some(e),
            Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// One persisted water level and flow record.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: i64,
    /// Local clock of the collector when the row was written, not the station's own time.
    pub captured_at: NaiveDateTime,
    pub water_level: f64,
    pub flow: f64,
    /// Free text copied from the station page, not normalized.
    pub station_updated_at: String,
}

/// Durable store for `Observation`s.
///
/// A single connection is shared behind a mutex so concurrent readers and the
/// collector writing new rows are serialized by the store itself. Every method
/// blocks; async callers should go through `blocking()`.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and make sure the table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn: Mutex::new(conn) };
        store.initialize()?;
        Ok(store)
    }

    /// Create the observation table if it does not exist yet. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(())
    }

    /// Persist a reading stamped with the current local time and return the stored row.
    ///
    /// The row is written by a single `INSERT` so it either exists in full or not at all.
    pub fn append(&self, reading: &Reading) -> Result<Observation, StoreError> {
        let now = Local::now().naive_local();
        let captured_at = now.with_nanosecond(0).unwrap_or(now);

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO water_data (timestamp, water_level, flow, latest_update) VALUES (?1, ?2, ?3, ?4)",
            params![
                captured_at.format(TIMESTAMP_FORMAT).to_string(),
                reading.water_level,
                reading.flow,
                reading.station_updated_at,
            ],
        )?;

        Ok(Observation {
            id: conn.last_insert_rowid(),
            captured_at,
            water_level: reading.water_level,
            flow: reading.flow,
            station_updated_at: reading.station_updated_at.clone(),
        })
    }

    /// Every stored observation in insertion (ascending id) order.
    pub fn list_all(&self) -> Result<Vec<Observation>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT id, timestamp, water_level, flow, latest_update FROM water_data ORDER BY id ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok(Observation {
                id: row.get(0)?,
                captured_at: row.get(1)?,
                water_level: row.get(2)?,
                flow: row.get(3)?,
                station_updated_at: row.get(4)?,
            })
        })?;

        let observations = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM water_data", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Run a blocking store operation on the tokio blocking pool.
pub async fn blocking<T, F>(store: &Arc<Store>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(StoreError::Task)?
}

#[cfg(test)]
mod tests {
    use super::{blocking, Store};
    use crate::page::Reading;
    use chrono::Timelike;
    use std::sync::Arc;

    fn reading(water_level: f64, flow: f64, updated: &str) -> Reading {
        Reading {
            water_level,
            flow,
            station_updated_at: updated.to_owned(),
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.append(&reading(1.0, 2.0, "2024-03-03 10:00")).unwrap();

        store.initialize().unwrap();
        store.initialize().unwrap();

        assert_eq!(1, store.count().unwrap());
    }

    #[test]
    fn test_append_then_list_contains_values() {
        let store = Store::open_in_memory().unwrap();
        let first = store.append(&reading(12.34, 56.78, "3 March 2024 10:00")).unwrap();
        let second = store.append(&reading(12.5, 60.0, "3 March 2024 10:15")).unwrap();

        assert!(second.id > first.id);

        let all = store.list_all().unwrap();
        assert_eq!(vec![first, second.clone()], all);
        assert_eq!(12.5, second.water_level);
        assert_eq!(60.0, second.flow);
        assert_eq!("3 March 2024 10:15", second.station_updated_at);
    }

    #[test]
    fn test_list_all_ascending_ids() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..10 {
            // Same station timestamp on purpose, duplicates are allowed.
            store.append(&reading(i as f64, i as f64 * 2.0, "unchanged")).unwrap();
        }

        let ids: Vec<i64> = store.list_all().unwrap().iter().map(|o| o.id).collect();
        assert_eq!(10, ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_list_all_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert_eq!(0, store.count().unwrap());
    }

    #[test]
    fn test_captured_at_second_precision() {
        let store = Store::open_in_memory().unwrap();
        let stored = store.append(&reading(1.0, 1.0, "x")).unwrap();
        let listed = store.list_all().unwrap();

        assert_eq!(0, stored.captured_at.nanosecond());
        assert_eq!(stored.captured_at, listed[0].captured_at);
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");

        let id = {
            let store = Store::open(&path).unwrap();
            store.append(&reading(3.5, 7.25, "2024-03-03 10:00")).unwrap().id
        };

        let store = Store::open(&path).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(1, all.len());
        assert_eq!(id, all[0].id);
        assert_eq!(3.5, all[0].water_level);

        let next = store.append(&reading(3.6, 7.5, "2024-03-03 10:15")).unwrap();
        assert!(next.id > id);
    }

    #[tokio::test]
    async fn test_blocking_runs_store_operation() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let obs = blocking(&store, |s| s.append(&reading(1.5, 2.5, "now"))).await.unwrap();
        let count = blocking(&store, |s| s.count()).await.unwrap();

        assert_eq!(1, count);
        assert_eq!(1.5, obs.water_level);
    }
}
