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

use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use river_pulse::client::StationClient;
use river_pulse::collector::Collector;
use river_pulse::http::RequestContext;
use river_pulse::metrics::CollectorMetrics;
use river_pulse::store::Store;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 5000);
const DEFAULT_SOURCE_URL: &str = "https://www.vkr.se/SlaHist/sla.htm";
const DEFAULT_DATABASE: &str = "data.db";
const DEFAULT_STATIC_DIR: &str = "static";
const METRICS_PREFIX: &str = "river_pulse";

#[derive(Debug, Parser)]
#[clap(name = "river_pulse", version = clap::crate_version!())]
struct RiverPulseApplication {
    /// URL of the station page to scrape water level and flow from
    #[clap(long, default_value_t = DEFAULT_SOURCE_URL.into())]
    source_url: String,

    /// Path to the SQLite database observations are stored in. Created if it doesn't exist.
    #[clap(long, default_value_t = DEFAULT_DATABASE.into())]
    database: String,

    /// Directory containing the static viewer pages (index.html, list.html, dummy.html)
    #[clap(long, default_value_t = DEFAULT_STATIC_DIR.into())]
    static_dir: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. By default, river_pulse only binds to the loopback address.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = RiverPulseApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let source_url = Url::parse(&opts.source_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid source URL", url = %opts.source_url, error = %e);
        process::exit(1)
    });

    let http_client = Client::builder().build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let store = Store::open(&opts.database).map(Arc::new).unwrap_or_else(|e| {
        tracing::error!(message = "unable to open database", path = %opts.database, error = %e);
        process::exit(1)
    });

    match store.count() {
        Ok(rows) => tracing::info!(message = "opened database", path = %opts.database, rows = rows),
        Err(e) => tracing::warn!(message = "unable to count stored observations", error = %e),
    }

    let mut registry = Registry::with_prefix(METRICS_PREFIX);
    let metrics = CollectorMetrics::new(&mut registry);
    let client = StationClient::new(http_client, source_url);
    let collector = Collector::new(client, store.clone(), metrics).spawn();

    let context = Arc::new(RequestContext::new(store, registry));
    let static_dir = PathBuf::from(&opts.static_dir);
    if !static_dir.is_dir() {
        tracing::warn!(message = "static directory not found, viewer pages will 404", path = %static_dir.display());
    }

    let app = river_pulse::http::router(context, &static_dir);
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);

    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    collector.shutdown().await;
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
