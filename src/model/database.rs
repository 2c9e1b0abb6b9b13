use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::error::DataError;
use crate::model::download::{self, column_index, field, number, DataSource};
use crate::town::Town;

/// The relational side of the registry: one in-memory table per raw
/// collection, filled once at load time, then read by a single join query.
pub struct Database {
    pub connection: Connection,
}

static TOWN_SELECTION: &str = "towns.town_id, towns.name, towns.island_x, towns.island_y, \
     towns.slot_number, towns.points, \
     players.player_id, players.name, players.alliance_id, alliances.name, \
     islands.type, offsets.offset_x, offsets.offset_y, \
     town_info.unit_info, town_info.color";

impl Database {
    pub fn create_for_world(source: &dyn DataSource) -> Result<Self> {
        let mut connection =
            Connection::open_in_memory().context("Failed to open in memory database")?;
        // The schema uses DEFERRABLE foreign keys as documentation of the
        // intended links, but the loader deliberately keeps rows with
        // unresolvable references (stray alliances, ghost players) and relies
        // on the join queries to filter them. That requires SQLite's standard
        // default of foreign_keys = OFF; some bundled builds compile SQLite
        // with SQLITE_DEFAULT_FOREIGN_KEYS=1, so pin it off explicitly.
        connection
            .pragma_update(None, "foreign_keys", false)
            .context("Failed to disable foreign key enforcement")?;
        Self::create_table_offsets(&mut connection, source)?;
        Self::create_table_alliances(&mut connection, source)?;
        Self::create_table_players(&mut connection, source)?;
        Self::create_table_towns(&mut connection, source)?;
        Self::create_table_islands(&mut connection, source)?;
        Self::create_table_town_info(&mut connection, source)?;
        Ok(Self { connection })
    }

    /// Materialize the denormalized registry rows, in town id order.
    ///
    /// Towns without a resolvable player are dropped here (inner join);
    /// players without a resolvable alliance keep their towns and get
    /// empty alliance fields (left join). A town whose island or island
    /// type/slot offset cannot be resolved aborts the build.
    pub fn get_all_towns(&self) -> Result<Vec<Town>> {
        let mut statement = self
            .connection
            .prepare(&format!(
                "SELECT {TOWN_SELECTION} from \n\
                 towns \n\
                 JOIN players ON (towns.player_id = players.player_id) \n\
                 LEFT JOIN alliances ON (players.alliance_id = alliances.alliance_id) \n\
                 LEFT JOIN islands ON (towns.island_x = islands.x AND towns.island_y = islands.y) \n\
                 LEFT JOIN offsets ON (islands.type = offsets.type AND towns.slot_number = offsets.slot_number) \n\
                 LEFT JOIN town_info ON (towns.town_id = town_info.town_id) \n\
                 ORDER BY towns.town_id",
            ))
            .context("Failed to get towns from database (build statement)")?;
        let mut rows = statement
            .query([])
            .context("Failed to get towns from the database (perform query)")?;

        let mut towns = Vec::new();
        while let Some(row) = rows.next().context("Failed to read town row")? {
            towns.push(Town::from_row(row).context("Failed to create a town from row")?);
        }
        Ok(towns)
    }

    fn create_table_offsets(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_ISLAND_TYPES, download::WORLD_DOCUMENT)
            .context("Failed to fetch island type offsets")?;
        let Some((header, data)) = rows.split_first() else {
            return Err(DataError::Malformed {
                field: "island type table",
                value: "empty sheet".to_owned(),
            }
            .into());
        };
        let col_type = column_index(header, "island")?;
        let col_slot = column_index(header, "position")?;
        let col_x = column_index(header, "offsetx")?;
        let col_y = column_index(header, "offsety")?;

        connection
            .execute(
                "CREATE TABLE offsets(
                type INTEGER NOT NULL,
                offset_x INTEGER NOT NULL,
                offset_y INTEGER NOT NULL,
                slot_number INTEGER NOT NULL,
                PRIMARY KEY (type, slot_number))",
                (),
            )
            .context("Failed to create table offsets")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table creation offsets")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO offsets VALUES(?1, ?2, ?3, ?4)")
                .context("Failed to prepare statement for offsets")?;
            for row in data {
                statement
                    .execute((
                        number::<u32>(row, col_type, "island type")?,
                        number::<i32>(row, col_x, "offset x")?,
                        number::<i32>(row, col_y, "offset y")?,
                        number::<u8>(row, col_slot, "slot position")?,
                    ))
                    .with_context(|| format!("Failed to insert into offsets from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table offsets")
    }

    fn create_table_alliances(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_ALLIANCES, download::WORLD_DOCUMENT)
            .context("Failed to fetch alliance data")?;
        connection
            .execute(
                "CREATE TABLE alliances(
                alliance_id INTEGER UNIQUE PRIMARY KEY,
                name TEXT UNIQUE,
                points INTEGER,
                towns INTEGER,
                members INTEGER,
                rank INTEGER)",
                (),
            )
            .context("Failed to create table alliances")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table creation alliances")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO alliances VALUES(?1, ?2, ?3, ?4, ?5, ?6)")
                .context("Failed to prepare statement for alliances")?;
            for row in &rows {
                statement
                    .execute((
                        number::<u32>(row, 0, "alliance id")?,
                        decode_name(field(row, 1, "alliance name")?),
                        number::<u32>(row, 2, "alliance points")?,
                        number::<u32>(row, 3, "alliance towns")?,
                        number::<u32>(row, 4, "alliance members")?,
                        number::<u32>(row, 5, "alliance rank")?,
                    ))
                    .with_context(|| format!("Failed to insert into alliances from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table alliances")
    }

    fn create_table_players(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_PLAYERS, download::WORLD_DOCUMENT)
            .context("Failed to fetch player data")?;
        connection
            .execute(
                "CREATE TABLE players(
                player_id INTEGER UNIQUE PRIMARY KEY,
                name TEXT UNIQUE,
                alliance_id INTEGER,
                points INTEGER,
                rank INTEGER,
                towns INTEGER,
                FOREIGN KEY(alliance_id) REFERENCES alliances(alliance_id) DEFERRABLE)",
                (),
            )
            .context("Failed to create players table")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table creation players")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO players VALUES(?1, ?2, ?3, ?4, ?5, ?6)")
                .context("Failed to prepare statement for players")?;
            for row in &rows {
                statement
                    .execute((
                        number::<u32>(row, 0, "player id")?,
                        decode_name(field(row, 1, "player name")?),
                        reference(row, 2),
                        number::<u32>(row, 3, "player points")?,
                        number::<u32>(row, 4, "player rank")?,
                        number::<u32>(row, 5, "player towns")?,
                    ))
                    .with_context(|| format!("Failed to insert into players from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table players")
    }

    fn create_table_towns(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_TOWNS, download::WORLD_DOCUMENT)
            .context("Failed to fetch town data")?;
        connection
            .execute(
                "CREATE TABLE towns(
                town_id INTEGER UNIQUE PRIMARY KEY,
                player_id INTEGER,
                name TEXT,
                island_x INTEGER,
                island_y INTEGER,
                slot_number INTEGER,
                points INTEGER,
                FOREIGN KEY(player_id) REFERENCES players(player_id) DEFERRABLE)",
                (),
            )
            .context("Failed to create table towns")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table towns creation")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO towns VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)")
                .context("Failed to prepare statement for towns")?;
            for row in &rows {
                statement
                    .execute((
                        number::<u32>(row, 0, "town id")?,
                        reference(row, 1),
                        decode_name(field(row, 2, "town name")?),
                        number::<i32>(row, 3, "town island x")?,
                        number::<i32>(row, 4, "town island y")?,
                        number::<u8>(row, 5, "town slot number")?,
                        number::<u16>(row, 6, "town points")?,
                    ))
                    .with_context(|| format!("Failed to insert into towns from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table towns")
    }

    fn create_table_islands(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_ISLANDS, download::WORLD_DOCUMENT)
            .context("Failed to fetch island data")?;
        connection
            .execute(
                "CREATE TABLE islands(
                island_id INTEGER UNIQUE PRIMARY KEY,
                x INTEGER,
                y INTEGER,
                type INTEGER,
                towns INTEGER,
                ressource_plus TEXT,
                ressource_minus TEXT)",
                (),
            )
            .context("Failed to create table islands")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table creation islands")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO islands VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)")
                .context("Failed to prepare statement for islands")?;
            for row in &rows {
                statement
                    .execute((
                        number::<u32>(row, 0, "island id")?,
                        number::<i32>(row, 1, "island x")?,
                        number::<i32>(row, 2, "island y")?,
                        number::<u32>(row, 3, "island type")?,
                        number::<u32>(row, 4, "island towns")?,
                        field(row, 5, "island ressource plus")?,
                        field(row, 6, "island ressource minus")?,
                    ))
                    .with_context(|| format!("Failed to insert into islands from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table islands")
    }

    fn create_table_town_info(connection: &mut Connection, source: &dyn DataSource) -> Result<()> {
        let rows = source
            .fetch_rows(download::SHEET_TOWN_INFO, download::WORLD_DOCUMENT)
            .context("Failed to fetch town info data")?;
        connection
            .execute(
                "CREATE TABLE town_info(
                town_id INTEGER UNIQUE PRIMARY KEY,
                unit_info TEXT,
                color TEXT)",
                (),
            )
            .context("Failed to create table town_info")?;

        let transaction = connection
            .transaction()
            .context("Failed to start transaction for table creation town_info")?;
        {
            let mut statement = transaction
                .prepare("INSERT INTO town_info VALUES(?1, ?2, ?3)")
                .context("Failed to prepare statement for town_info")?;
            for row in &rows {
                // composite field: stad<id>~<unit info>~<color>
                let tag = field(row, 0, "town tag")?;
                let mut parts = tag.split('~');
                let (Some(id_part), Some(unit_info), Some(color)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(DataError::Malformed {
                        field: "town tag",
                        value: tag.to_owned(),
                    }
                    .into());
                };
                let town_id: u32 = id_part
                    .strip_prefix("stad")
                    .and_then(|digits| digits.trim().parse().ok())
                    .ok_or_else(|| DataError::Malformed {
                        field: "town tag id",
                        value: id_part.to_owned(),
                    })?;
                statement
                    .execute((town_id, unit_info, color))
                    .with_context(|| format!("Failed to insert into town_info from row {row:?}"))?;
            }
        }
        transaction
            .commit()
            .context("Failed to commit transaction for table town_info")
    }
}

/// Percent- and plus-decode a transmitted name field, applied exactly once
/// before the value enters a table.
fn decode_name(text: &str) -> String {
    form_urlencoded::parse(text.as_bytes())
        .map(|(key, val)| [key, val].concat())
        .collect::<String>()
}

/// A reference id that is blank or unparseable means "no such link".
fn reference(row: &[String], index: usize) -> Option<u32> {
    row.get(index).and_then(|text| text.trim().parse().ok())
}
