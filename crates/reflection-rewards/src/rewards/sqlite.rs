//! SQLite-backed reward store.
//!
//! Each unit of work runs inside `BEGIN IMMEDIATE`, which takes the database
//! write lock up front and holds it until commit. Reads, the ledger check and
//! both writes therefore see one serializable snapshot, and a second writer
//! either waits or fails with `SQLITE_BUSY` (reported as a conflict).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use super::domain::{
    EntryId, LedgerEntry, LedgerReason, NewLedgerEntry, UserId, UserStreakState,
};
use super::repository::{
    PointsLedgerStore, RewardStore, RewardTransaction, StoreError, UserStreakStore,
};
use super::week::WeekId;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS user_streaks (
    user_id         TEXT PRIMARY KEY,
    current_streak  INTEGER NOT NULL DEFAULT 0,
    longest_streak  INTEGER NOT NULL DEFAULT 0,
    total_points    INTEGER NOT NULL DEFAULT 0,
    last_entry_week TEXT
);

CREATE TABLE IF NOT EXISTS points_ledger (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT NOT NULL,
    points_earned   INTEGER NOT NULL CHECK (points_earned > 0),
    reason          TEXT NOT NULL,
    streak_week     INTEGER NOT NULL,
    week_identifier TEXT NOT NULL,
    source_entry_id TEXT NOT NULL,
    timestamp       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_points_ledger_user_week
    ON points_ledger (user_id, week_identifier);
";

const LEDGER_COLUMNS: &str = "id, user_id, points_earned, reason, streak_week, \
     week_identifier, source_entry_id, timestamp";

pub struct SqliteRewardStore {
    conn: Mutex<Connection>,
}

impl SqliteRewardStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }
}

/// Apply pending schema migrations, tracked through `PRAGMA user_version`.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current >= i64::from(LATEST_SCHEMA_VERSION) {
        return u32::try_from(current).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
        });
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", i64::from(LATEST_SCHEMA_VERSION))?;
    tx.commit()?;
    Ok(LATEST_SCHEMA_VERSION)
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Unavailable(error.to_string()),
        }
    }
}

struct SqliteTransaction<'conn> {
    conn: &'conn Connection,
    user_id: UserId,
}

impl SqliteTransaction<'_> {
    fn ensure_scope(&self, user_id: &UserId) -> Result<(), StoreError> {
        if &self.user_id == user_id {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "transaction for {} cannot touch {}",
                self.user_id, user_id
            )))
        }
    }
}

impl UserStreakStore for SqliteTransaction<'_> {
    fn read_for_update(&mut self, user_id: &UserId) -> Result<UserStreakState, StoreError> {
        self.ensure_scope(user_id)?;
        let state = select_state(self.conn, user_id)?;
        Ok(state.unwrap_or_else(|| UserStreakState::new(user_id.clone())))
    }

    fn write(&mut self, state: &UserStreakState) -> Result<(), StoreError> {
        self.ensure_scope(&state.user_id)?;
        let total_points = i64::try_from(state.total_points)
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        self.conn.execute(
            "INSERT INTO user_streaks (user_id, current_streak, longest_streak, total_points, last_entry_week)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                current_streak = excluded.current_streak,
                longest_streak = excluded.longest_streak,
                total_points = excluded.total_points,
                last_entry_week = excluded.last_entry_week",
            params![
                state.user_id.0,
                i64::from(state.current_streak),
                i64::from(state.longest_streak),
                total_points,
                state.last_entry_week.map(|week| week.to_string()),
            ],
        )?;
        Ok(())
    }
}

impl PointsLedgerStore for SqliteTransaction<'_> {
    fn exists_for_week(&mut self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        self.ensure_scope(user_id)?;
        Ok(select_exists_for_week(self.conn, user_id, week)?)
    }

    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.ensure_scope(&entry.user_id)?;
        self.conn.execute(
            "INSERT INTO points_ledger
                (user_id, points_earned, reason, streak_week, week_identifier, source_entry_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.user_id.0,
                i64::from(entry.points_earned),
                entry.reason.to_string(),
                i64::from(entry.streak_week),
                entry.week.to_string(),
                entry.source_entry_id.0,
                format_timestamp(&entry.timestamp),
            ],
        )?;
        let id = u64::try_from(self.conn.last_insert_rowid())
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(entry.with_id(id))
    }

    fn list_recent(
        &mut self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.ensure_scope(user_id)?;
        Ok(select_recent(self.conn, user_id, limit)?)
    }
}

impl RewardStore for SqliteRewardStore {
    fn with_user_transaction<T, F>(&self, user_id: &UserId, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let output = {
            let mut handle = SqliteTransaction {
                conn: &tx,
                user_id: user_id.clone(),
            };
            work(&mut handle)?
        };
        tx.commit()?;
        Ok(output)
    }

    fn read_state(&self, user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        let conn = self.lock()?;
        Ok(select_state(&conn, user_id)?)
    }

    fn list_recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        Ok(select_recent(&conn, user_id, limit)?)
    }

    fn exists_for_week(&self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(select_exists_for_week(&conn, user_id, week)?)
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT user_id, current_streak, longest_streak, total_points, last_entry_week
             FROM user_streaks ORDER BY user_id",
        )?;
        let states = statement
            .query_map([], state_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }

    fn ledger_for_week(&self, week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM points_ledger WHERE week_identifier = ?1 ORDER BY id"
        ))?;
        let entries = statement
            .query_map([week.to_string()], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn select_state(
    conn: &Connection,
    user_id: &UserId,
) -> rusqlite::Result<Option<UserStreakState>> {
    conn.query_row(
        "SELECT user_id, current_streak, longest_streak, total_points, last_entry_week
         FROM user_streaks WHERE user_id = ?1",
        [&user_id.0],
        state_from_row,
    )
    .optional()
}

fn select_exists_for_week(
    conn: &Connection,
    user_id: &UserId,
    week: WeekId,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM points_ledger WHERE user_id = ?1 AND week_identifier = ?2
        )",
        params![user_id.0, week.to_string()],
        |row| row.get(0),
    )
}

fn select_recent(
    conn: &Connection,
    user_id: &UserId,
    limit: usize,
) -> rusqlite::Result<Vec<LedgerEntry>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut statement = conn.prepare(&format!(
        "SELECT {LEDGER_COLUMNS} FROM points_ledger
         WHERE user_id = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2"
    ))?;
    let entries = statement
        .query_map(params![user_id.0, limit], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<UserStreakState> {
    let last_entry_week: Option<String> = row.get(4)?;
    Ok(UserStreakState {
        user_id: UserId(row.get(0)?),
        current_streak: unsigned(row, 1)?,
        longest_streak: unsigned(row, 2)?,
        total_points: unsigned(row, 3)?,
        last_entry_week: last_entry_week
            .map(|raw| parse_column::<WeekId>(4, &raw))
            .transpose()?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let reason: String = row.get(3)?;
    let week: String = row.get(5)?;
    let timestamp: String = row.get(7)?;
    Ok(LedgerEntry {
        id: unsigned(row, 0)?,
        user_id: UserId(row.get(1)?),
        points_earned: unsigned(row, 2)?,
        reason: parse_column::<LedgerReason>(3, &reason)?,
        streak_week: unsigned(row, 4)?,
        week: parse_column::<WeekId>(5, &week)?,
        source_entry_id: EntryId(row.get(6)?),
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(error))
            })?,
    })
}

fn unsigned<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: TryFrom<i64>,
{
    let value: i64 = row.get(index)?;
    T::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}

fn parse_column<T>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
