// SQLite-backed auto-scalp position store and trade journal
//
// Key columns are stored alongside the full position as JSON so history
// queries stay indexable while the schema tolerates new position fields.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{AutoScalpStore, TradeJournalStore};
use crate::autoscalp::AutoScalpPosition;
use crate::error::StoreError;
use crate::journal::TradeEntry;

pub struct SqliteAutoScalpStore {
    conn: Arc<Mutex<Connection>>,
}

fn timestamp(t: DateTime<Utc>) -> String {
    // fixed width so text comparison matches time order
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// File-backed connection in WAL mode, creating parent directories
fn open_connection(db_path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

fn decode<T: serde::de::DeserializeOwned>(rows: Vec<String>) -> Result<Vec<T>, StoreError> {
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(StoreError::from))
        .collect()
}

impl SqliteAutoScalpStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        let store = Self::with_connection(open_connection(db_path)?)?;
        info!("SQLite auto-scalp store opened at {}", db_path.display());
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auto_scalp_entries (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                data TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_status ON auto_scalp_entries(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_exit_time ON auto_scalp_entries(exit_time)",
            [],
        )?;

        debug!("Auto-scalp schema created/verified");
        Ok(())
    }

    fn write(conn: &Connection, position: &AutoScalpPosition) -> Result<(), StoreError> {
        let data = serde_json::to_string(position)?;
        conn.execute(
            "INSERT OR REPLACE INTO auto_scalp_entries
             (id, symbol, status, entry_time, exit_time, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)",
            params![
                position.id,
                position.symbol.as_str(),
                position.status.as_str(),
                timestamp(position.entry_time),
                position.exit_time.map(timestamp),
                data,
            ],
        )?;
        Ok(())
    }

    fn query(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<AutoScalpPosition>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode(rows)
    }
}

impl AutoScalpStore for SqliteAutoScalpStore {
    fn create_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        if position.is_active() {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM auto_scalp_entries WHERE symbol = ?1 AND status = 'ACTIVE'",
                    params![position.symbol.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::DuplicateActive(position.symbol.to_string()));
            }
        }
        Self::write(&conn, position)?;
        debug!("Auto-scalp entry created: {} [{}]", position.id, position.symbol);
        Ok(())
    }

    fn update_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM auto_scalp_entries WHERE id = ?1",
                params![position.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(position.id.clone()));
        }
        Self::write(&conn, position)
    }

    fn get_active_entries(&self) -> Result<Vec<AutoScalpPosition>, StoreError> {
        let conn = self.conn.lock();
        Self::query(
            &conn,
            "SELECT data FROM auto_scalp_entries WHERE status = 'ACTIVE' ORDER BY entry_time",
            [],
        )
    }

    fn get_entry(&self, id: &str) -> Result<AutoScalpPosition, StoreError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM auto_scalp_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn get_history(&self, since: DateTime<Utc>) -> Result<Vec<AutoScalpPosition>, StoreError> {
        let conn = self.conn.lock();
        Self::query(
            &conn,
            "SELECT data FROM auto_scalp_entries
             WHERE status = 'CLOSED' AND exit_time >= ?1
             ORDER BY exit_time DESC",
            params![timestamp(since)],
        )
    }

    fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM auto_scalp_entries WHERE id = ?1",
            params![id],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Journal table living next to the auto-scalp positions, same layout
pub struct SqliteTradeJournal {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTradeJournal {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        let journal = Self::with_connection(open_connection(db_path)?)?;
        info!("SQLite trade journal opened at {}", db_path.display());
        Ok(journal)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_entries (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                data TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_status ON trade_entries(status)",
            [],
        )?;
        debug!("Trade journal schema created/verified");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn write(conn: &Connection, entry: &TradeEntry) -> Result<(), StoreError> {
        let data = serde_json::to_string(entry)?;
        conn.execute(
            "INSERT OR REPLACE INTO trade_entries
             (id, symbol, status, entry_time, exit_time, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)",
            params![
                entry.id,
                entry.symbol.as_str(),
                entry.status.as_str(),
                timestamp(entry.entry_time),
                entry.exit_time.map(timestamp),
                data,
            ],
        )?;
        Ok(())
    }

    fn exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM trade_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn query(conn: &Connection, sql: &str) -> Result<Vec<TradeEntry>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode(rows)
    }
}

impl TradeJournalStore for SqliteTradeJournal {
    fn create_trade(&self, entry: &TradeEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        if Self::exists(&conn, &entry.id)? {
            return Err(StoreError::AlreadyExists(entry.id.clone()));
        }
        Self::write(&conn, entry)?;
        debug!("Trade journal entry created: {} [{}]", entry.id, entry.symbol);
        Ok(())
    }

    fn get_open_trades(&self) -> Result<Vec<TradeEntry>, StoreError> {
        let conn = self.conn.lock();
        Self::query(
            &conn,
            "SELECT data FROM trade_entries
             WHERE status NOT IN ('stopped', 'closed')
             ORDER BY entry_time",
        )
    }

    fn get_trade(&self, id: &str) -> Result<TradeEntry, StoreError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM trade_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn update_trade(&self, entry: &TradeEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        if !Self::exists(&conn, &entry.id)? {
            return Err(StoreError::NotFound(entry.id.clone()));
        }
        Self::write(&conn, entry)
    }

    fn get_trade_history(&self) -> Result<Vec<TradeEntry>, StoreError> {
        let conn = self.conn.lock();
        Self::query(
            &conn,
            "SELECT data FROM trade_entries
             WHERE status IN ('stopped', 'closed')
             ORDER BY exit_time DESC",
        )
    }

    fn delete_trade(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM trade_entries WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
