use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::duration::seconds_in_time;
use crate::error::DataError;
use crate::model::TownRegistry;
use crate::speed::{
    effective_speed, ModifierSet, UnitSpeedTable, BIREME, COLONY_SHIP, FIRE_SHIP, TRANSPORT,
};

/// Fixed lead time every movement pays before departure, at world speed 1.
const PREPARATION_SECONDS: f64 = 900.0;
/// Converts map distance units into the time scale of the unit speeds.
const DISTANCE_SCALE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelTime {
    pub seconds: u32,
    pub text: String,
}

/// Travel duration between two towns of the registry for one unit.
/// Truncated to whole seconds, not rounded.
pub fn calculate_traveltime(
    registry: &TownRegistry,
    unit_speeds: &UnitSpeedTable,
    start_town_id: u32,
    end_town_id: u32,
    unit_name: &str,
    world_speed: f64,
    modifiers: &ModifierSet,
) -> Result<TravelTime> {
    let start = registry
        .get(start_town_id)
        .ok_or_else(|| DataError::UnknownEntity {
            entity: "town",
            key: start_town_id.to_string(),
        })?;
    let end = registry
        .get(end_town_id)
        .ok_or_else(|| DataError::UnknownEntity {
            entity: "town",
            key: end_town_id.to_string(),
        })?;

    let dx = f64::from(start.coord_x - end.coord_x);
    let dy = f64::from(start.coord_y - end.coord_y);
    let dist = (dx * dx + dy * dy).sqrt();

    let preparation = PREPARATION_SECONDS / world_speed;
    let unit = unit_speeds.get(unit_name)?;
    let speed = effective_speed(unit_name, unit, world_speed, modifiers);

    let seconds = (preparation + dist * DISTANCE_SCALE / speed).floor() as u32;
    Ok(TravelTime {
        seconds,
        text: seconds_in_time(seconds),
    })
}

/// One source town's travel options against the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRow {
    pub town_name: String,
    pub town_id: u32,
    pub town_info: String,
    pub player_name: String,
    pub colonization: TravelTime,
    pub fast_military: TravelTime,
    pub fire_ship: TravelTime,
    pub slow_transport: TravelTime,
    pub bbcode: String,
}

/// Travel times from every town of the named alliance to the target town,
/// fastest colony ship first. Ties keep registry order (stable sort).
pub fn calc_go_plan(
    registry: &TownRegistry,
    unit_speeds: &UnitSpeedTable,
    alliance_name: &str,
    target_town_id: u32,
    world_speed: f64,
    modifiers: &ModifierSet,
) -> Result<Vec<PlanRow>> {
    if registry.get(target_town_id).is_none() {
        return Err(DataError::UnknownEntity {
            entity: "town",
            key: target_town_id.to_string(),
        }
        .into());
    }

    let mut rows = Vec::new();
    for town in registry.towns_for_alliance(alliance_name) {
        let travel = |unit_name| {
            calculate_traveltime(
                registry,
                unit_speeds,
                town.id,
                target_town_id,
                unit_name,
                world_speed,
                modifiers,
            )
        };
        let colonization = travel(COLONY_SHIP)?;
        let fast_military = travel(BIREME)?;
        let fire_ship = travel(FIRE_SHIP)?;
        let slow_transport = travel(TRANSPORT)?;
        rows.push(PlanRow {
            town_name: town.name.clone(),
            town_id: town.id,
            town_info: town.unit_info.clone(),
            player_name: town.player_name.clone(),
            colonization,
            fast_military,
            fire_ship,
            slow_transport,
            bbcode: format!("[town]{}[/town]", town.id),
        });
    }
    rows.sort_by_key(|row| row.colonization.seconds);
    Ok(rows)
}
