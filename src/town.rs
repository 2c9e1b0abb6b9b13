use rusqlite::Row;

use crate::error::DataError;

/// One row of the denormalized town registry. Everything a computation
/// needs about a town is joined in here once at load time.
#[derive(Debug, Clone)]
pub struct Town {
    pub id: u32,
    pub player_id: u32,
    pub player_name: String,
    pub alliance_id: Option<u32>,
    pub alliance_name: Option<String>,
    pub name: String,
    pub island_x: i32,
    pub island_y: i32,
    pub slot_number: u8,
    pub points: u16,
    pub coord_x: i32,
    pub coord_y: i32,
    pub unit_info: String,
    pub color: Option<String>,
}

/// Absolute map position of a town slot. Islands sit on a brick-offset
/// grid, 128 units per tile, with odd columns shifted down half a tile.
pub fn absolute_coords(island_x: i32, island_y: i32, offset_x: i32, offset_y: i32) -> (i32, i32) {
    let coord_x = 128 * island_x + offset_x;
    let coord_y = if island_x % 2 == 0 {
        128 * island_y + offset_y
    } else {
        64 + 128 * island_y + offset_y
    };
    (coord_x, coord_y)
}

impl Town {
    /// Build a registry row from the join query in `model::database`.
    /// Column order must match `TOWN_SELECTION` over there.
    pub(crate) fn from_row(row: &Row) -> anyhow::Result<Self> {
        let island_x: i32 = row.get(2)?;
        let island_y: i32 = row.get(3)?;
        let slot_number: u8 = row.get(4)?;

        let island_type: Option<u32> = row.get(10)?;
        let Some(island_type) = island_type else {
            return Err(DataError::MissingReference {
                table: "islands",
                key: format!("({island_x}, {island_y})"),
            }
            .into());
        };

        let offset_x: Option<i32> = row.get(11)?;
        let offset_y: Option<i32> = row.get(12)?;
        let (Some(offset_x), Some(offset_y)) = (offset_x, offset_y) else {
            return Err(DataError::MissingReference {
                table: "offsets",
                key: format!("type {island_type}, slot {slot_number}"),
            }
            .into());
        };

        let (coord_x, coord_y) = absolute_coords(island_x, island_y, offset_x, offset_y);
        Ok(Self {
            id: row.get(0)?,
            player_id: row.get(6)?,
            player_name: row.get(7)?,
            alliance_id: row.get(8)?,
            alliance_name: row.get(9)?,
            name: row.get(1)?,
            island_x,
            island_y,
            slot_number,
            points: row.get(5)?,
            coord_x,
            coord_y,
            unit_info: row.get::<usize, Option<String>>(13)?.unwrap_or_default(),
            color: row.get(14)?,
        })
    }
}
