use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::DataError;
use crate::model::download::{self, column_index, field, number, DataSource};

/// The one unit whose speed reacts to the "Set Sail" spell.
pub const COLONY_SHIP: &str = "Kolonieschiff";
pub const BIREME: &str = "Bireme";
pub const FIRE_SHIP: &str = "Feuerschiff";
pub const TRANSPORT: &str = "Transportboot";

/// Movement category of a unit. The data source transmits the German
/// column values, so "See" parses as `Sea`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum UnitClass {
    Land,
    #[strum(serialize = "See", serialize = "Sea")]
    Sea,
}

#[derive(Debug, Clone, Copy)]
pub struct UnitSpeed {
    pub speed: u32,
    pub class: UnitClass,
}

/// Nominal unit speeds, keyed by unit name.
#[derive(Debug)]
pub struct UnitSpeedTable {
    units: HashMap<String, UnitSpeed>,
}

impl UnitSpeedTable {
    pub fn load(source: &dyn DataSource) -> Result<Self> {
        let rows = source
            .fetch_rows(download::SHEET_UNIT_SPEED, download::TABLE_DOCUMENT)
            .context("Failed to fetch unit speeds")?;
        let Some((header, data)) = rows.split_first() else {
            return Err(DataError::Malformed {
                field: "unit speed table",
                value: "empty sheet".to_owned(),
            }
            .into());
        };
        let col_name = column_index(header, "Einheit")?;
        let col_speed = column_index(header, "Speed")?;
        let col_class = column_index(header, "Typ")?;

        let mut units = HashMap::new();
        for row in data {
            let name = field(row, col_name, "unit name")?;
            let class_text = field(row, col_class, "unit class")?;
            let class: UnitClass =
                class_text
                    .trim()
                    .parse()
                    .map_err(|_| DataError::Malformed {
                        field: "unit class",
                        value: class_text.to_owned(),
                    })?;
            units.insert(
                name.trim().to_owned(),
                UnitSpeed {
                    speed: number::<u32>(row, col_speed, "unit speed")?,
                    class,
                },
            );
        }
        Ok(Self { units })
    }

    pub fn get(&self, unit_name: &str) -> Result<UnitSpeed, DataError> {
        self.units
            .get(unit_name)
            .copied()
            .ok_or_else(|| DataError::MissingReference {
                table: "unit speeds",
                key: unit_name.to_owned(),
            })
    }
}

/// Per-request travel bonuses: the research/spell checkboxes plus the two
/// levelled bonuses. Supplied by the caller, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub meteorology: bool,
    pub cartography: bool,
    pub set_sail: bool,
    pub improved_troop_movement: bool,
    pub lighthouse: bool,
    pub atalanta_stage: u32,
    pub sirens: u32,
}

impl ModifierSet {
    /// Multiplicative speed factor for one unit. Every bonus adds onto a
    /// base of 1.0, so the order of the terms does not matter.
    pub fn speed_factor(&self, unit_name: &str, class: UnitClass) -> f64 {
        let mut factor = 1.0;
        if self.meteorology && class == UnitClass::Land {
            factor += 0.1;
        }
        if self.cartography && class == UnitClass::Sea {
            factor += 0.1;
        }
        if self.set_sail && unit_name == COLONY_SHIP {
            factor += 0.1;
        }
        if self.improved_troop_movement {
            factor += 0.3;
        }
        if self.lighthouse && class == UnitClass::Sea {
            factor += 0.15;
        }
        if self.atalanta_stage > 0 {
            // the hero bonus starts at 11% and grows one point per stage,
            // for land and sea units alike
            factor += f64::from(self.atalanta_stage + 10) / 100.0;
        }
        if self.sirens > 0 {
            factor += 0.02 * f64::from(self.sirens);
        }
        factor
    }
}

/// World-speed-scaled speed of one unit with all modifiers applied.
pub fn effective_speed(
    unit_name: &str,
    unit: UnitSpeed,
    world_speed: f64,
    modifiers: &ModifierSet,
) -> f64 {
    f64::from(unit.speed) * world_speed * modifiers.speed_factor(unit_name, unit.class)
}
