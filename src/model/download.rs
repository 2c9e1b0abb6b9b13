//! This takes care of fetching the raw world data. Every collection is one
//! sheet of a published spreadsheet document, exported as CSV rows of text.
//! The rest of the crate only ever talks to the `DataSource` trait.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

use crate::error::DataError;

pub const WORLD_DOCUMENT: &str = "1rbuFTzvioNza7yXpczy4q836x5WHhcy7XHBPdMo3qIE";
pub const TABLE_DOCUMENT: &str = "18J-v9okQdfKxaBDloRa1KIxzr39WewsgtRb0XM6Eb-0";

pub const SHEET_ISLANDS: &str = "Islands";
pub const SHEET_ALLIANCES: &str = "Alliances";
pub const SHEET_PLAYERS: &str = "Players";
pub const SHEET_TOWNS: &str = "Towns";
pub const SHEET_TOWN_INFO: &str = "Grepotags";
pub const SHEET_ISLAND_TYPES: &str = "Islandtypes";
pub const SHEET_UNIT_SPEED: &str = "Einheitenspeed";
pub const SHEET_BASE_TIMES: &str = "Grundzeiten";
pub const SHEET_SENATE: &str = "Baukostenreduktion_Senat";
pub const SHEET_GOLD_COST: &str = "Goldkosten";

/// Where raw records come from. One record per row, fields as text, in
/// sheet order.
pub trait DataSource {
    fn fetch_rows(&self, sheet: &str, document: &str) -> Result<Vec<Vec<String>>>;
}

/// Fetches the gviz CSV export of a published Google spreadsheet.
pub struct SheetSource {
    client: reqwest::blocking::Client,
}

impl SheetSource {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Rust Grepolis Planner")
            .gzip(true)
            .deflate(true)
            .build()
            .expect("Failed to build http client");
        Self { client }
    }

    fn build_url(sheet: &str, document: &str) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{document}/gviz/tq?tqx=out:csv&sheet={sheet}"
        )
    }
}

impl Default for SheetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SheetSource {
    fn fetch_rows(&self, sheet: &str, document: &str) -> Result<Vec<Vec<String>>> {
        let url = Self::build_url(sheet, document);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Failed to request sheet {sheet}"))?;
        log::info!("Got status {} for sheet {sheet}", response.status());
        let text = response
            .error_for_status()
            .with_context(|| format!("Request for sheet {sheet} was rejected"))?
            .text()
            .with_context(|| format!("Failed to read body for sheet {sheet}"))?;
        Ok(rows_from_csv(&text))
    }
}

/// Canned data, one CSV text per sheet. This is the offline counterpart to
/// `SheetSource` and the way fixtures enter tests.
#[derive(Default)]
pub struct StaticSource {
    sheets: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: &str, csv: &str) {
        self.sheets.insert(sheet.to_owned(), csv.to_owned());
    }
}

impl DataSource for StaticSource {
    fn fetch_rows(&self, sheet: &str, _document: &str) -> Result<Vec<Vec<String>>> {
        let Some(text) = self.sheets.get(sheet) else {
            bail!("No canned data for sheet {sheet}");
        };
        Ok(rows_from_csv(text))
    }
}

fn rows_from_csv(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(split_csv_line)
        .collect()
}

/// The gviz export quotes every field, so commas inside quotes stay part
/// of the field and `""` is a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Position of a named column in a sheet's header row.
pub(crate) fn column_index(header: &[String], name: &'static str) -> Result<usize, DataError> {
    header
        .iter()
        .position(|cell| cell.trim() == name)
        .ok_or(DataError::Malformed {
            field: "column header",
            value: name.to_owned(),
        })
}

/// Field of a row by position, as text.
pub(crate) fn field<'a>(
    row: &'a [String],
    index: usize,
    name: &'static str,
) -> Result<&'a str, DataError> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| DataError::Malformed {
            field: name,
            value: row.join(","),
        })
}

/// Field of a row by position, parsed as a number. Failure to parse is
/// fatal for the load.
pub(crate) fn number<T>(row: &[String], index: usize, name: &'static str) -> Result<T, DataError>
where
    T: std::str::FromStr,
{
    let text = field(row, index, name)?;
    text.trim().parse().map_err(|_| DataError::Malformed {
        field: name,
        value: text.to_owned(),
    })
}
