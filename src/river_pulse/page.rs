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

//! Extraction of water level, flow and update time from the station page.
//!
//! Everything here depends on the exact markup of the station's HTML page. The page is
//! not versioned and has no schema, so any upstream layout change makes extraction report
//! missing fields. Nothing tries to detect or recover from that beyond reporting which
//! fields could not be found.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::error;
use std::fmt;
use std::sync::OnceLock;

/// Text of the table cell immediately preceding the water level value.
pub const WATER_LEVEL_LABEL: &str = "Vattennivå nedströms kraftverket, m.ö.h.";

/// Bordered numeric cells. The second one holds the flow.
const FLOW_CELL_SELECTOR: &str = "td.tblborder.pad.w60.right.bottom";
const FLOW_CELL_INDEX: usize = 1;

const UPDATE_PARAGRAPH_SELECTOR: &str = "p.gray";
const UPDATE_PATTERN: &str = r"\d.*";

static CELL: OnceLock<Selector> = OnceLock::new();
static FLOW_CELL: OnceLock<Selector> = OnceLock::new();
static UPDATE_PARAGRAPH: OnceLock<Selector> = OnceLock::new();
static UPDATE: OnceLock<Regex> = OnceLock::new();

/// A complete set of values pulled from the station page.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub water_level: f64,
    pub flow: f64,
    pub station_updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Missing,
    Invalid(String),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "not found"),
            Self::Invalid(v) => write!(f, "invalid value {:?}", v),
        }
    }
}

/// Result of extracting each field from a page, possibly with some fields missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub water_level: Result<f64, FieldError>,
    pub flow: Result<f64, FieldError>,
    pub station_updated_at: Result<String, FieldError>,
}

impl Extraction {
    /// Convert to a `Reading` if every field was found and parsed.
    pub fn complete(self) -> Result<Reading, IncompleteExtraction> {
        match (&self.water_level, &self.flow, &self.station_updated_at) {
            (Ok(water_level), Ok(flow), Ok(station_updated_at)) => Ok(Reading {
                water_level: *water_level,
                flow: *flow,
                station_updated_at: station_updated_at.clone(),
            }),
            _ => Err(IncompleteExtraction { extraction: self }),
        }
    }

    /// Name and problem of each field that could not be extracted.
    pub fn problems(&self) -> Vec<(&'static str, &FieldError)> {
        let mut out = Vec::new();
        if let Err(e) = &self.water_level {
            out.push(("water_level", e));
        }
        if let Err(e) = &self.flow {
            out.push(("flow", e));
        }
        if let Err(e) = &self.station_updated_at {
            out.push(("station_updated_at", e));
        }
        out
    }
}

/// The page was retrieved but at least one field could not be located or parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct IncompleteExtraction {
    pub extraction: Extraction,
}

impl fmt::Display for IncompleteExtraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incomplete extraction:")?;
        for (i, (field, problem)) in self.extraction.problems().into_iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{} {}", sep, field, problem)?;
        }
        Ok(())
    }
}

impl error::Error for IncompleteExtraction {}

/// Pull water level, flow and the station update time out of the page HTML.
pub fn extract(html: &str) -> Extraction {
    let doc = Html::parse_document(html);
    Extraction {
        water_level: water_level(&doc),
        flow: flow(&doc),
        station_updated_at: station_updated_at(&doc),
    }
}

/// Parse a decimal that uses a comma as the decimal separator.
///
/// Commas are replaced with dots before parsing, so input that already uses a dot
/// ("1.5") parses to the same value as "1,5". Input with both a thousands separator
/// and a decimal separator ("1.234,5") is rejected, as are non-finite values.
pub fn parse_decimal(text: &str) -> Result<f64, FieldError> {
    let trimmed = text.trim();
    match trimmed.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FieldError::Invalid(trimmed.to_owned())),
    }
}

fn water_level(doc: &Html) -> Result<f64, FieldError> {
    let mut cells = doc.select(selector(&CELL, "td"));
    cells
        .find(|c| text_of(c).trim() == WATER_LEVEL_LABEL)
        .ok_or(FieldError::Missing)?;

    let value = cells.next().ok_or(FieldError::Missing)?;
    parse_decimal(&text_of(&value))
}

fn flow(doc: &Html) -> Result<f64, FieldError> {
    let cell = doc
        .select(selector(&FLOW_CELL, FLOW_CELL_SELECTOR))
        .nth(FLOW_CELL_INDEX)
        .ok_or(FieldError::Missing)?;
    parse_decimal(&text_of(&cell))
}

fn station_updated_at(doc: &Html) -> Result<String, FieldError> {
    let paragraph = doc
        .select(selector(&UPDATE_PARAGRAPH, UPDATE_PARAGRAPH_SELECTOR))
        .next()
        .ok_or(FieldError::Missing)?;
    let text = text_of(&paragraph);

    let pattern = UPDATE.get_or_init(|| Regex::new(UPDATE_PATTERN).expect("update pattern must be a valid regex"));
    pattern
        .find(text.trim())
        .map(|m| m.as_str().to_owned())
        .ok_or(FieldError::Missing)
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("extraction selectors must be valid CSS"))
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect()
}

#[cfg(test)]
mod tests {
    use super::{extract, parse_decimal, FieldError, Reading};

    fn page(label: &str, flow_cells: &[&str], update: &str) -> String {
        let cells: String = flow_cells
            .iter()
            .map(|v| format!(r#"<td class="tblborder pad w60 right bottom">{}</td>"#, v))
            .collect();

        format!(
            r#"<html><body>
            <table>
              <tr><td>{}</td><td> 12,34 </td></tr>
              <tr>{}</tr>
            </table>
            <p class="gray">{}</p>
            </body></html>"#,
            label, cells, update
        )
    }

    #[test]
    fn test_extract_known_values() {
        let html = page(
            "Vattennivå nedströms kraftverket, m.ö.h.",
            &["1,00", "56,78"],
            "Senast uppdaterad: 3 March 2024 10:00",
        );

        let reading = extract(&html).complete().unwrap();
        assert_eq!(
            Reading {
                water_level: 12.34,
                flow: 56.78,
                station_updated_at: "3 March 2024 10:00".to_owned(),
            },
            reading
        );
    }

    #[test]
    fn test_extract_dummy_page() {
        let html = include_str!("../../static/dummy.html");
        let reading = extract(html).complete().unwrap();

        assert_eq!(12.34, reading.water_level);
        assert_eq!(56.78, reading.flow);
        assert_eq!("2024-03-03 10:00", reading.station_updated_at);
    }

    #[test]
    fn test_extract_missing_label() {
        let html = page("Vattennivå uppströms", &["1,00", "56,78"], "3 March 2024 10:00");
        let extraction = extract(&html);

        assert_eq!(Err(FieldError::Missing), extraction.water_level);
        assert_eq!(Ok(56.78), extraction.flow);

        let incomplete = extraction.complete().unwrap_err();
        assert_eq!(1, incomplete.extraction.problems().len());
        assert_eq!("incomplete extraction: water_level not found", incomplete.to_string());
    }

    #[test]
    fn test_extract_single_bordered_cell() {
        let html = page("Vattennivå nedströms kraftverket, m.ö.h.", &["56,78"], "3 March 2024 10:00");
        let extraction = extract(&html);

        assert_eq!(Err(FieldError::Missing), extraction.flow);
        assert!(extraction.complete().is_err());
    }

    #[test]
    fn test_extract_unparsable_flow() {
        let html = page("Vattennivå nedströms kraftverket, m.ö.h.", &["1,00", "n/a"], "3 March 2024 10:00");
        let extraction = extract(&html);

        assert_eq!(Err(FieldError::Invalid("n/a".to_owned())), extraction.flow);
    }

    #[test]
    fn test_extract_update_without_digits() {
        let html = page("Vattennivå nedströms kraftverket, m.ö.h.", &["1,00", "56,78"], "Uppdateras snart");
        let extraction = extract(&html);

        assert_eq!(Err(FieldError::Missing), extraction.station_updated_at);
        assert_eq!(Ok(12.34), extraction.water_level);
    }

    #[test]
    fn test_extract_update_stops_at_line_end() {
        let html = page(
            "Vattennivå nedströms kraftverket, m.ö.h.",
            &["1,00", "56,78"],
            "Senast uppdaterad 2024-03-03 10:00\nnästa uppdatering 10:15",
        );

        assert_eq!(Ok("2024-03-03 10:00".to_owned()), extract(&html).station_updated_at);
    }

    #[test]
    fn test_extract_empty_document() {
        let extraction = extract("");
        let incomplete = extraction.complete().unwrap_err();

        assert_eq!(3, incomplete.extraction.problems().len());
        assert_eq!(
            "incomplete extraction: water_level not found, flow not found, station_updated_at not found",
            incomplete.to_string()
        );
    }

    #[test]
    fn test_extract_repeated_documents() {
        let first = page("Vattennivå nedströms kraftverket, m.ö.h.", &["1,00", "56,78"], "2024-03-03 10:00");
        let second = page("Vattennivå nedströms kraftverket, m.ö.h.", &["1,00", "60,5"], "2024-03-03 10:15");

        let a = extract(&first).complete().unwrap();
        let b = extract(&second).complete().unwrap();
        let c = extract(&first).complete().unwrap();

        assert_eq!(56.78, a.flow);
        assert_eq!(60.5, b.flow);
        assert_eq!("2024-03-03 10:15", b.station_updated_at);
        assert_eq!(a, c);
    }

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(Ok(1.5), parse_decimal("1,5"));
        assert_eq!(Ok(12.34), parse_decimal(" 12,34\n"));
        assert_eq!(Ok(-0.25), parse_decimal("-0,25"));
        assert_eq!(Ok(42.0), parse_decimal("42"));
    }

    #[test]
    fn test_parse_decimal_dot_accepted() {
        assert_eq!(Ok(1.5), parse_decimal("1.5"));
        assert_eq!(parse_decimal("1,5"), parse_decimal("1.5"));
    }

    #[test]
    fn test_parse_decimal_rejected() {
        assert_eq!(Err(FieldError::Invalid("1.234,5".to_owned())), parse_decimal("1.234,5"));
        assert_eq!(Err(FieldError::Invalid("".to_owned())), parse_decimal("   "));
        assert_eq!(Err(FieldError::Invalid("NaN".to_owned())), parse_decimal("NaN"));
        assert_eq!(Err(FieldError::Invalid("inf".to_owned())), parse_decimal("inf"));
        assert_eq!(Err(FieldError::Invalid("12 m".to_owned())), parse_decimal("12 m"));
    }
}
