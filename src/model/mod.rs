//! The entry point for the model: load a world's datasets once, keep them
//! as an immutable registry, answer computation requests against it.

use std::collections::HashMap;

use anyhow::Result;

use crate::duration::{self, BuildTimeTable, GoldCostTable, SenateTable};
use crate::plan::{calc_go_plan, PlanRow};
use crate::speed::{ModifierSet, UnitSpeedTable};
use crate::town::Town;

pub mod database;
pub mod download;

use database::Database;
use download::DataSource;

/// The denormalized town rows, materialized once at load time, in town id
/// order, plus an index for lookups by id.
#[derive(Debug)]
pub struct TownRegistry {
    towns: Vec<Town>,
    index: HashMap<u32, usize>,
}

impl TownRegistry {
    fn build(db: &Database) -> Result<Self> {
        let towns = db.get_all_towns()?;
        let index = towns
            .iter()
            .enumerate()
            .map(|(position, town)| (town.id, position))
            .collect();
        Ok(Self { towns, index })
    }

    pub fn get(&self, town_id: u32) -> Option<&Town> {
        self.index.get(&town_id).map(|&position| &self.towns[position])
    }

    /// All registry rows, in registry order.
    pub fn towns(&self) -> &[Town] {
        &self.towns
    }

    /// Towns whose owner belongs to the named alliance, exact match.
    pub fn towns_for_alliance(&self, alliance_name: &str) -> Vec<&Town> {
        self.towns
            .iter()
            .filter(|town| town.alliance_name.as_deref() == Some(alliance_name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.towns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }
}

/// Everything loaded for one game world. Immutable after creation; build a
/// new one to pick up fresh data.
#[derive(Debug)]
pub struct WorldData {
    pub registry: TownRegistry,
    pub unit_speeds: UnitSpeedTable,
    pub build_times: BuildTimeTable,
    pub senate_discounts: SenateTable,
    pub gold_costs: GoldCostTable,
}

impl WorldData {
    pub fn create_for_sheets(source: &dyn DataSource) -> Result<Self> {
        let db = Database::create_for_world(source)?;
        let registry = TownRegistry::build(&db)?;
        log::info!("Loaded {} towns into the registry", registry.len());
        Ok(Self {
            registry,
            unit_speeds: UnitSpeedTable::load(source)?,
            build_times: BuildTimeTable::load(source)?,
            senate_discounts: SenateTable::load(source)?,
            gold_costs: GoldCostTable::load(source)?,
        })
    }

    pub fn calc_buildtime(
        &self,
        building: &str,
        stage: u32,
        senate_stage: u32,
        crane: bool,
        world_speed: f64,
    ) -> Result<String> {
        duration::calc_buildtime(
            &self.build_times,
            &self.senate_discounts,
            building,
            stage,
            senate_stage,
            crane,
            world_speed,
        )
    }

    pub fn gold_cost(&self, build_time_sec: u32) -> Result<u32> {
        Ok(self.gold_costs.cost(build_time_sec)?)
    }

    pub fn calc_go_plan(
        &self,
        alliance_name: &str,
        target_town_id: u32,
        world_speed: f64,
        modifiers: &ModifierSet,
    ) -> Result<Vec<PlanRow>> {
        calc_go_plan(
            &self.registry,
            &self.unit_speeds,
            alliance_name,
            target_town_id,
            world_speed,
            modifiers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::download::{
        StaticSource, SHEET_ALLIANCES, SHEET_BASE_TIMES, SHEET_GOLD_COST, SHEET_ISLANDS,
        SHEET_ISLAND_TYPES, SHEET_PLAYERS, SHEET_SENATE, SHEET_TOWNS, SHEET_TOWN_INFO,
        SHEET_UNIT_SPEED,
    };
    use super::WorldData;
    use crate::error::DataError;
    use crate::speed::ModifierSet;

    /// A small but complete world:
    /// - town 101 "Alpha" (player Defender, alliance Rivals) at (0, 0)
    /// - town 102 "Wolf Far" (Wolf One, Sea Wolves) at (310, 410)
    /// - town 103 "Wolf Near" (Wolf Two, Sea Wolves) at (300, 400)
    /// - town 104 is a ghost town (no player)
    /// - town 105 "Lone Town" (Loner, no alliance) on an odd island column
    /// - town 106 "Stray Town" (Stray, alliance id 99 has no row)
    fn world_source() -> StaticSource {
        let mut source = StaticSource::new();
        source.insert(
            SHEET_ISLANDS,
            "1,0,0,1,20,di,wo\n\
             2,2,3,2,20,wo,st\n\
             3,1,1,1,20,st,di\n",
        );
        source.insert(
            SHEET_ISLAND_TYPES,
            "island,position,offsetx,offsety\n\
             1,0,0,0\n\
             1,1,10,20\n\
             2,0,44,16\n\
             2,1,54,26\n",
        );
        source.insert(
            SHEET_ALLIANCES,
            "10,Sea+Wolves,5000,2,2,1\n\
             20,Rivals,3000,1,1,2\n",
        );
        source.insert(
            SHEET_PLAYERS,
            "1,Defender,20,1000,1,1\n\
             2,Wolf+One,10,2000,2,1\n\
             3,Wolf+Two,10,1500,3,1\n\
             4,Loner,,800,4,1\n\
             5,Stray,99,700,5,1\n",
        );
        source.insert(
            SHEET_TOWNS,
            "101,1,Alpha,0,0,0,500\n\
             102,2,Wolf+Far,2,3,1,300\n\
             103,3,Wolf+Near,2,3,0,400\n\
             104,,Ghost+Town,0,0,1,100\n\
             105,4,Lone+Town,1,1,0,200\n\
             106,5,Stray+Town,0,0,1,150\n",
        );
        source.insert(SHEET_TOWN_INFO, "stad103~full mule~red\n");
        source.insert(
            SHEET_UNIT_SPEED,
            "Einheit,Speed,Typ\n\
             Kolonieschiff,10,See\n\
             Bireme,24,See\n\
             Feuerschiff,16,See\n\
             Transportboot,8,See\n",
        );
        source.insert(
            SHEET_BASE_TIMES,
            "Stufe,Warehouse,Senate\n\
             1,0:01:30,0:02:00\n\
             5,2:00:00,3:20:10\n",
        );
        source.insert(
            SHEET_SENATE,
            "Stufe,Bauzeit\n\
             0,100%\n\
             3,90%\n",
        );
        source.insert(
            SHEET_GOLD_COST,
            "von_Zeit_sec,bis_Zeit_sec,Goldkosten\n\
             0,3600,50\n\
             3600,86400,100\n",
        );
        source
    }

    fn world() -> WorldData {
        WorldData::create_for_sheets(&world_source()).expect("Fixture world must load")
    }

    #[test]
    fn ghost_towns_are_dropped_but_allianceless_towns_stay() {
        let world = world();
        assert_eq!(world.registry.len(), 5);
        assert!(world.registry.get(104).is_none());

        let lone = world.registry.get(105).unwrap();
        assert_eq!(lone.player_name, "Loner");
        assert_eq!(lone.alliance_id, None);
        assert_eq!(lone.alliance_name, None);

        // alliance id present but unresolvable: kept as unaffiliated
        let stray = world.registry.get(106).unwrap();
        assert_eq!(stray.alliance_id, Some(99));
        assert_eq!(stray.alliance_name, None);
    }

    #[test]
    fn names_are_decoded_and_info_defaults_to_empty() {
        let world = world();
        let far = world.registry.get(102).unwrap();
        assert_eq!(far.name, "Wolf Far");
        assert_eq!(far.player_name, "Wolf One");
        assert_eq!(far.alliance_name.as_deref(), Some("Sea Wolves"));
        assert_eq!(far.unit_info, "");
        assert_eq!(far.color, None);

        let near = world.registry.get(103).unwrap();
        assert_eq!(near.unit_info, "full mule");
        assert_eq!(near.color.as_deref(), Some("red"));
    }

    #[test]
    fn coordinates_follow_the_brick_grid() {
        let world = world();
        assert_eq!(world.registry.get(101).unwrap().coord_x, 0);
        assert_eq!(world.registry.get(101).unwrap().coord_y, 0);
        assert_eq!(world.registry.get(103).unwrap().coord_x, 300);
        assert_eq!(world.registry.get(103).unwrap().coord_y, 400);
        // island column 1 is odd, so y gains the half-tile shift
        let lone = world.registry.get(105).unwrap();
        assert_eq!(lone.coord_x, 128);
        assert_eq!(lone.coord_y, 64 + 128);
    }

    #[test]
    fn registry_rows_keep_town_id_order() {
        let world = world();
        let ids: Vec<u32> = world.registry.towns().iter().map(|town| town.id).collect();
        assert_eq!(ids, vec![101, 102, 103, 105, 106]);
    }

    #[test]
    fn go_plan_ranks_by_colony_ship_time() {
        let world = world();
        let rows = world
            .calc_go_plan("Sea Wolves", 101, 1.0, &ModifierSet::default())
            .unwrap();
        assert_eq!(rows.len(), 2);

        // town 103 at distance 500: floor(900 + 500 * 50 / 10) = 3400
        assert_eq!(rows[0].town_id, 103);
        assert_eq!(rows[0].colonization.seconds, 3400);
        assert_eq!(rows[0].colonization.text, "0:56:40");
        assert_eq!(rows[0].fast_military.seconds, 1941);
        assert_eq!(rows[0].fire_ship.seconds, 2462);
        assert_eq!(rows[0].slow_transport.seconds, 4025);
        assert_eq!(rows[0].town_name, "Wolf Near");
        assert_eq!(rows[0].player_name, "Wolf Two");
        assert_eq!(rows[0].town_info, "full mule");
        assert_eq!(rows[0].bbcode, "[town]103[/town]");

        // town 102 is slightly farther and sorts second despite its lower id
        assert_eq!(rows[1].town_id, 102);
        assert_eq!(rows[1].colonization.seconds, 3470);
    }

    #[test]
    fn travel_time_is_monotone_in_distance_and_speed() {
        let world = world();
        let time_to = |start: u32, unit: &str, modifiers: &ModifierSet| {
            crate::plan::calculate_traveltime(
                &world.registry,
                &world.unit_speeds,
                start,
                101,
                unit,
                1.0,
                modifiers,
            )
            .unwrap()
            .seconds
        };

        let none = ModifierSet::default();
        // town 102 is farther from the target than town 103
        assert!(time_to(102, "Kolonieschiff", &none) >= time_to(103, "Kolonieschiff", &none));
        // a faster unit never arrives later
        assert!(time_to(103, "Bireme", &none) <= time_to(103, "Transportboot", &none));
        // a speed bonus never arrives later either
        let set_sail = ModifierSet {
            set_sail: true,
            ..ModifierSet::default()
        };
        assert!(time_to(103, "Kolonieschiff", &set_sail) <= time_to(103, "Kolonieschiff", &none));
        assert_eq!(time_to(103, "Kolonieschiff", &set_sail), 3172);
    }

    #[test]
    fn go_plan_with_unknown_alliance_is_empty() {
        let world = world();
        let rows = world
            .calc_go_plan("Nobody", 101, 1.0, &ModifierSet::default())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn go_plan_with_unknown_target_fails_up_front() {
        let world = world();
        let err = world
            .calc_go_plan("Sea Wolves", 999, 1.0, &ModifierSet::default())
            .unwrap_err();
        let cause = err.downcast_ref::<DataError>().unwrap();
        assert_eq!(
            *cause,
            DataError::UnknownEntity {
                entity: "town",
                key: "999".to_owned(),
            }
        );
    }

    #[test]
    fn world_answers_buildtime_and_gold_requests() {
        let world = world();
        let time = world.calc_buildtime("Warehouse", 5, 3, true, 1.0).unwrap();
        assert_eq!(time, "1:31:48");
        assert_eq!(world.gold_cost(5508).unwrap(), 100);

        let err = world
            .calc_buildtime("Warehouse", 9, 3, true, 1.0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::MissingReference { .. })
        ));
    }

    #[test]
    fn missing_offset_aborts_the_load() {
        let mut source = world_source();
        source.insert(
            SHEET_TOWNS,
            "101,1,Alpha,0,0,0,500\n\
             107,1,Deep+Slot,2,3,7,100\n",
        );
        let err = WorldData::create_for_sheets(&source).unwrap_err();
        let cause = err.root_cause().downcast_ref::<DataError>().unwrap();
        assert_eq!(
            *cause,
            DataError::MissingReference {
                table: "offsets",
                key: "type 2, slot 7".to_owned(),
            }
        );
    }

    #[test]
    fn unknown_island_address_aborts_the_load() {
        let mut source = world_source();
        source.insert(SHEET_TOWNS, "101,1,Alpha,9,9,0,500\n");
        let err = WorldData::create_for_sheets(&source).unwrap_err();
        let cause = err.root_cause().downcast_ref::<DataError>().unwrap();
        assert!(matches!(
            cause,
            DataError::MissingReference {
                table: "islands",
                ..
            }
        ));
    }

    #[test]
    fn malformed_ids_fail_the_whole_load() {
        let mut source = world_source();
        source.insert(SHEET_TOWNS, "abc,1,Alpha,0,0,0,500\n");
        let err = WorldData::create_for_sheets(&source).unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<DataError>(),
            Some(DataError::Malformed { .. })
        ));
    }
}
