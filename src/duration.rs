//! Construction time engine: clock-string handling, the static base-time
//! and Senate discount tables, and the gold cost brackets.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::error::DataError;
use crate::model::download::{self, column_index, field, number, DataSource};

/// Total seconds of a `:`-separated clock string. Parts pair with the
/// hour/minute/second weights from the left, so "2:00:00" is two hours
/// and "5:30" is five hours thirty minutes.
pub fn time_in_seconds(duration: &str) -> Result<u32, DataError> {
    let malformed = || DataError::Malformed {
        field: "duration",
        value: duration.to_owned(),
    };
    let parts: Vec<&str> = duration.trim().split(':').collect();
    if parts.len() > 3 {
        return Err(malformed());
    }
    let mut seconds = 0;
    for (weight, part) in [3600u32, 60, 1].iter().zip(&parts) {
        let value: u32 = part.trim().parse().map_err(|_| malformed())?;
        seconds += weight * value;
    }
    Ok(seconds)
}

pub fn seconds_in_time(duration: u32) -> String {
    let hours = duration / 3600;
    let minutes = duration % 3600 / 60;
    let seconds = duration % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// "90%", "87,5%" or "87.5%" to a fraction in [0, 1].
pub fn parse_percent(text: &str) -> Result<f64, DataError> {
    let cleaned = text.trim().trim_end_matches('%').replace(',', ".");
    let value: f64 = cleaned.trim().parse().map_err(|_| DataError::Malformed {
        field: "percentage",
        value: text.to_owned(),
    })?;
    Ok(value / 100.0)
}

/// Base construction durations, sparse over (building, stage). The sheet
/// is wide: the first column is the stage, every other column one building.
#[derive(Debug)]
pub struct BuildTimeTable {
    seconds: HashMap<String, HashMap<u32, u32>>,
}

impl BuildTimeTable {
    pub fn load(source: &dyn DataSource) -> Result<Self> {
        let rows = source
            .fetch_rows(download::SHEET_BASE_TIMES, download::TABLE_DOCUMENT)
            .context("Failed to fetch base build times")?;
        let Some((header, data)) = rows.split_first() else {
            return Err(DataError::Malformed {
                field: "base time table",
                value: "empty sheet".to_owned(),
            }
            .into());
        };

        let mut seconds: HashMap<String, HashMap<u32, u32>> = HashMap::new();
        for row in data {
            let stage = number::<u32>(row, 0, "base time stage")?;
            for (building, cell) in header.iter().zip(row).skip(1) {
                if cell.trim().is_empty() {
                    continue;
                }
                let value = time_in_seconds(cell)
                    .with_context(|| format!("Bad base time for {building} stage {stage}"))?;
                seconds
                    .entry(building.trim().to_owned())
                    .or_default()
                    .insert(stage, value);
            }
        }
        Ok(Self { seconds })
    }

    pub fn get(&self, building: &str, stage: u32) -> Result<u32, DataError> {
        self.seconds
            .get(building)
            .and_then(|stages| stages.get(&stage))
            .copied()
            .ok_or_else(|| DataError::MissingReference {
                table: "base times",
                key: format!("{building} stage {stage}"),
            })
    }
}

/// Remaining build time per Senate stage, as a fraction of the base time.
#[derive(Debug)]
pub struct SenateTable {
    fractions: HashMap<u32, f64>,
}

impl SenateTable {
    pub fn load(source: &dyn DataSource) -> Result<Self> {
        let rows = source
            .fetch_rows(download::SHEET_SENATE, download::TABLE_DOCUMENT)
            .context("Failed to fetch senate discounts")?;
        let Some((header, data)) = rows.split_first() else {
            return Err(DataError::Malformed {
                field: "senate discount table",
                value: "empty sheet".to_owned(),
            }
            .into());
        };
        let col_stage = column_index(header, "Stufe")?;
        let col_time = column_index(header, "Bauzeit")?;

        let mut fractions = HashMap::new();
        for row in data {
            let stage = number::<u32>(row, col_stage, "senate stage")?;
            let fraction = parse_percent(field(row, col_time, "senate build time")?)?;
            fractions.insert(stage, fraction);
        }
        Ok(Self { fractions })
    }

    pub fn fraction(&self, senate_stage: u32) -> Result<f64, DataError> {
        self.fractions
            .get(&senate_stage)
            .copied()
            .ok_or_else(|| DataError::MissingReference {
                table: "senate discounts",
                key: format!("stage {senate_stage}"),
            })
    }
}

/// Gold cost per finished-early build, bracketed by build time.
/// Brackets are half-open: `von <= t < bis`.
#[derive(Debug)]
pub struct GoldCostTable {
    brackets: Vec<(u32, u32, u32)>,
}

impl GoldCostTable {
    pub fn load(source: &dyn DataSource) -> Result<Self> {
        let rows = source
            .fetch_rows(download::SHEET_GOLD_COST, download::TABLE_DOCUMENT)
            .context("Failed to fetch gold costs")?;
        let Some((header, data)) = rows.split_first() else {
            return Err(DataError::Malformed {
                field: "gold cost table",
                value: "empty sheet".to_owned(),
            }
            .into());
        };
        let col_from = column_index(header, "von_Zeit_sec")?;
        let col_to = column_index(header, "bis_Zeit_sec")?;
        let col_gold = column_index(header, "Goldkosten")?;

        let mut brackets = Vec::new();
        for row in data {
            brackets.push((
                number::<u32>(row, col_from, "gold bracket start")?,
                number::<u32>(row, col_to, "gold bracket end")?,
                number::<u32>(row, col_gold, "gold cost")?,
            ));
        }
        Ok(Self { brackets })
    }

    pub fn cost(&self, build_time_sec: u32) -> Result<u32, DataError> {
        self.brackets
            .iter()
            .find(|(from, to, _)| build_time_sec >= *from && build_time_sec < *to)
            .map(|(_, _, gold)| *gold)
            .ok_or_else(|| DataError::MissingReference {
                table: "gold costs",
                key: format!("{build_time_sec} s"),
            })
    }
}

/// Construction time of one building stage as a clock string.
/// Rounds to the nearest whole second, halves away from zero.
pub fn calc_buildtime(
    base_times: &BuildTimeTable,
    senate: &SenateTable,
    building: &str,
    stage: u32,
    senate_stage: u32,
    crane: bool,
    world_speed: f64,
) -> Result<String> {
    let crane_factor = if crane { 0.85 } else { 1.0 };
    let senate_factor = senate.fraction(senate_stage)?;
    let base_seconds = base_times.get(building, stage)?;
    let buildtime_sec =
        (f64::from(base_seconds) * senate_factor * crane_factor / world_speed).round() as u32;
    Ok(seconds_in_time(buildtime_sec))
}

#[cfg(test)]
mod tests {
    use super::{
        calc_buildtime, parse_percent, seconds_in_time, time_in_seconds, BuildTimeTable,
        GoldCostTable, SenateTable,
    };
    use crate::error::DataError;
    use crate::model::download::{StaticSource, SHEET_BASE_TIMES, SHEET_GOLD_COST, SHEET_SENATE};

    fn table_source() -> StaticSource {
        let mut source = StaticSource::new();
        source.insert(
            SHEET_BASE_TIMES,
            "Stufe,Warehouse,Senate\n\
             1,0:01:30,0:02:00\n\
             5,2:00:00,3:20:10\n\
             7,,4:00:00\n",
        );
        source.insert(
            SHEET_SENATE,
            "Stufe,Bauzeit\n\
             0,100%\n\
             3,90%\n\
             5,\"87,5%\"\n",
        );
        source.insert(
            SHEET_GOLD_COST,
            "von_Zeit_sec,bis_Zeit_sec,Goldkosten\n\
             0,3600,50\n\
             3600,86400,100\n",
        );
        source
    }

    #[test]
    fn clock_strings_convert_both_ways() {
        assert_eq!(time_in_seconds("2:00:00").unwrap(), 7200);
        assert_eq!(time_in_seconds("0:56:40").unwrap(), 3400);
        assert_eq!(time_in_seconds("1:31:48").unwrap(), 5508);
        assert_eq!(seconds_in_time(5508), "1:31:48");
        assert_eq!(seconds_in_time(0), "0:00:00");
        assert_eq!(seconds_in_time(90000), "25:00:00");
        for n in [0, 59, 60, 3599, 3600, 5508, 123_456] {
            assert_eq!(time_in_seconds(&seconds_in_time(n)).unwrap(), n);
        }
        for s in ["1:31:48", "0:56:40", "25:00:00"] {
            assert_eq!(seconds_in_time(time_in_seconds(s).unwrap()), s);
        }
    }

    #[test]
    fn short_clock_strings_bind_to_the_largest_units() {
        assert_eq!(time_in_seconds("5:30").unwrap(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn bad_clock_strings_are_malformed() {
        assert!(time_in_seconds("xx:00").is_err());
        assert!(time_in_seconds("1:2:3:4").is_err());
        assert!(time_in_seconds("").is_err());
    }

    #[test]
    fn percent_strings_accept_both_decimal_separators() {
        assert!((parse_percent("90%").unwrap() - 0.9).abs() < 1e-12);
        assert!((parse_percent("87,5%").unwrap() - 0.875).abs() < 1e-12);
        assert!((parse_percent("87.5%").unwrap() - 0.875).abs() < 1e-12);
        assert!(parse_percent("abc").is_err());
    }

    #[test]
    fn base_times_are_sparse_and_missing_entries_fail() {
        let table = BuildTimeTable::load(&table_source()).unwrap();
        assert_eq!(table.get("Warehouse", 5).unwrap(), 7200);
        assert_eq!(table.get("Senate", 7).unwrap(), 14400);
        let err = table.get("Warehouse", 7).unwrap_err();
        assert!(matches!(err, DataError::MissingReference { .. }));
        assert!(table.get("Harbor", 1).is_err());
    }

    #[test]
    fn senate_lookup_fails_instead_of_defaulting() {
        let table = SenateTable::load(&table_source()).unwrap();
        assert!((table.fraction(3).unwrap() - 0.9).abs() < 1e-12);
        assert!((table.fraction(5).unwrap() - 0.875).abs() < 1e-12);
        let err = table.fraction(99).unwrap_err();
        assert!(matches!(err, DataError::MissingReference { .. }));
    }

    #[test]
    fn buildtime_combines_senate_crane_and_world_speed() {
        let source = table_source();
        let base_times = BuildTimeTable::load(&source).unwrap();
        let senate = SenateTable::load(&source).unwrap();

        let time = calc_buildtime(&base_times, &senate, "Warehouse", 5, 3, true, 1.0).unwrap();
        assert_eq!(time, "1:31:48");

        let time = calc_buildtime(&base_times, &senate, "Warehouse", 5, 5, false, 1.0).unwrap();
        assert_eq!(time, "1:45:00");

        let time = calc_buildtime(&base_times, &senate, "Warehouse", 1, 0, false, 2.0).unwrap();
        assert_eq!(time, "0:00:45");
    }

    #[test]
    fn gold_brackets_are_half_open() {
        let table = GoldCostTable::load(&table_source()).unwrap();
        assert_eq!(table.cost(0).unwrap(), 50);
        assert_eq!(table.cost(3599).unwrap(), 50);
        assert_eq!(table.cost(3600).unwrap(), 100);
        assert_eq!(table.cost(5508).unwrap(), 100);
        let err = table.cost(999_999).unwrap_err();
        assert!(matches!(err, DataError::MissingReference { .. }));
    }
}
