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

use crate::store::{self, Store, TIMESTAMP_FORMAT};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// One `/data` entry: timestamp, water level, flow, station update time.
pub type DataRow = (String, f64, f64, String);

/// State shared by every request handler.
#[derive(Debug)]
pub struct RequestContext {
    store: Arc<Store>,
    registry: Registry,
}

impl RequestContext {
    pub fn new(store: Arc<Store>, registry: Registry) -> Self {
        Self { store, registry }
    }
}

/// Build the full HTTP surface: read API, metrics and the static viewer pages.
pub fn router(context: Arc<RequestContext>, static_dir: &Path) -> Router {
    Router::new()
        .route("/data", get(observations))
        .route("/metrics", get(text_metrics))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/list", ServeFile::new(static_dir.join("list.html")))
        .route_service("/dummy", ServeFile::new(static_dir.join("dummy.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn observations(State(context): State<Arc<RequestContext>>) -> Result<Json<Vec<DataRow>>, StatusCode> {
    match store::blocking(&context.store, |s| s.list_all()).await {
        Ok(all) => {
            tracing::debug!(message = "loaded observations", num_rows = all.len());

            Ok(Json(
                all.into_iter()
                    .map(|o| {
                        (
                            o.captured_at.format(TIMESTAMP_FORMAT).to_string(),
                            o.water_level,
                            o.flow,
                            o.station_updated_at,
                        )
                    })
                    .collect(),
            ))
        }
        Err(e) => {
            tracing::error!(message = "error loading observations", error = %e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
