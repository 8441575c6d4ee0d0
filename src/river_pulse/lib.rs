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

//! Water level and flow collector for hydrological station pages
//!
//! ## Features
//!
//! `river_pulse` scrapes the public [station page] of a hydro power plant every 15 minutes,
//! extracts the downstream water level, the flow and the time the station says its values
//! were last updated, and appends them to a local SQLite database. The history is available
//! over HTTP along with a couple of static pages that chart and list it.
//!
//! * `GET /` - Chart of water level and flow over time.
//! * `GET /list` - Table of every stored observation, newest first.
//! * `GET /data` - JSON array of `[timestamp, water_level, flow, latest_update]` entries in
//!   the order they were collected.
//! * `GET /metrics` - Prometheus metrics about collection attempts.
//! * `GET /dummy` - Copy of the station page markup, useful as `--source-url` when developing.
//!
//! [station page]: https://www.vkr.se/SlaHist/sla.htm
//!
//! ## Limitations
//!
//! Values are found by the structure of the station page (a table cell label, a set of CSS
//! classes, a paragraph style). If the page changes, every collection attempt will fail as
//! an *incomplete extraction*. These show up as warnings in the logs and in the
//! `river_pulse_collections_total{outcome="incomplete"}` counter. Nothing else alerts on it.
//!
//! ## Build
//!
//! `river_pulse` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! Run from a directory containing the `static/` pages. The database is created on first
//! start if it doesn't exist.
//!
//! ```text
//! ./river_pulse --database /var/lib/river_pulse/data.db --bind 0.0.0.0:5000
//! ```
//!
//! To develop against the bundled copy of the station page instead of the real one:
//!
//! ```text
//! ./river_pulse --source-url http://127.0.0.1:5000/dummy
//! ```
//!

pub mod client;
pub mod collector;
pub mod http;
pub mod metrics;
pub mod page;
pub mod store;
