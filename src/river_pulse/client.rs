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

use crate::page::{self, Extraction};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Transport(reqwest::Error),
    Status(StatusCode, Url),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Status(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Something that can produce an `Extraction` of the current station values.
#[async_trait]
pub trait StationSource: Send + Sync {
    /// Location the values are fetched from, used for logging.
    fn url(&self) -> &Url;

    /// Make a single attempt to fetch and extract the current values.
    ///
    /// Transport problems and non-200 responses are errors. A page that was retrieved but
    /// is missing fields is *not* an error, it's an `Extraction` with failed fields.
    async fn fetch(&self) -> Result<Extraction, FetchError>;
}

/// Fetches the station HTML page over HTTP.
///
/// Each call makes exactly one request. There are no retries and no timeout beyond
/// whatever the provided `Client` was built with.
#[derive(Debug, Clone)]
pub struct StationClient {
    client: Client,
    url: Url,
}

impl StationClient {
    const USER_AGENT: &'static str = concat!("river_pulse/", env!("CARGO_PKG_VERSION"));
    const HTML_RESPONSE: &'static str = "text/html";

    pub fn new(client: Client, url: Url) -> Self {
        StationClient { client, url }
    }
}

#[async_trait]
impl StationSource for StationClient {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Extraction, FetchError> {
        tracing::debug!(message = "making station page request", url = %self.url);

        let res = self
            .client
            .get(self.url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::HTML_RESPONSE)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status, self.url.clone()));
        }

        // The page is UTF-8 whatever charset the response header claims
        let bytes = res.bytes().await.map_err(FetchError::Transport)?;
        tracing::debug!(message = "fetched station page", url = %self.url, num_bytes = bytes.len());
        Ok(page::extract(&String::from_utf8_lossy(&bytes)))
    }
}
