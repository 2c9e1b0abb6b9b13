#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

//! Calculation backend for Grepolis go-plans. Loads one world's datasets
//! from a spreadsheet-shaped data source into an immutable registry and
//! computes construction times, travel times and per-alliance travel plans
//! against it. The interactive dashboard on top lives elsewhere.

pub mod duration;
pub mod error;
pub mod model;
pub mod plan;
pub mod speed;
pub mod town;

pub use error::DataError;
pub use model::download::{DataSource, SheetSource, StaticSource};
pub use model::{TownRegistry, WorldData};
pub use plan::{calc_go_plan, calculate_traveltime, PlanRow, TravelTime};
pub use speed::{ModifierSet, UnitClass, UnitSpeedTable};
pub use town::Town;
