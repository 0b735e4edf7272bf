//! SQLite-backed slot store with a trigger-fed change outbox.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use trainbell_core::{
    ChangeFeed, Result, SlotChange, SlotId, SlotQuery, SlotStore, SlotType, SlotUpdate,
    TrainbellError, TrainingSlot,
};

const SLOT_COLUMNS: &str = "id, date, slot_type, slot_key, participant_ids";

/// SQLite persistence for training slots.
pub struct SqliteSlotStore {
    conn: Mutex<Connection>,
}

impl SqliteSlotStore {
    /// Open or create the slot database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| TrainbellError::StoreQuery(format!("DB open {}: {e}", path.display())))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrainbellError::StoreQuery(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // Other processes (the app, the CLI) write the same file.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| TrainbellError::StoreQuery(format!("DB busy timeout: {e}")))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| TrainbellError::StoreQuery(format!("DB journal mode: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied in SQLite itself.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create tables, index, and the outbox trigger.
    fn migrate(&self) -> Result<()> {
        self.lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS training_slots (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,                           -- YYYY-MM-DD
                slot_type TEXT NOT NULL,                      -- 'training' | 'selfTraining'
                slot_key TEXT,
                participant_ids TEXT NOT NULL DEFAULT '[]',   -- JSON array
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_training_slots_date_type
                ON training_slots (date, slot_type);

            -- Outbox of updates, consumed by the recovery watcher
            CREATE TABLE IF NOT EXISTS slot_changes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                slot_id TEXT NOT NULL,
                before_json TEXT NOT NULL,
                after_json TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TRIGGER IF NOT EXISTS training_slots_after_update
            AFTER UPDATE ON training_slots
            BEGIN
                INSERT INTO slot_changes (slot_id, before_json, after_json, created_at)
                VALUES (
                    NEW.id,
                    json_object('id', OLD.id, 'date', OLD.date, 'type', OLD.slot_type,
                                'participantIds', json(OLD.participant_ids), 'slotKey', OLD.slot_key),
                    json_object('id', NEW.id, 'date', NEW.date, 'type', NEW.slot_type,
                                'participantIds', json(NEW.participant_ids), 'slotKey', NEW.slot_key),
                    strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                );
            END;
         ",
            )
            .map_err(|e| TrainbellError::StoreQuery(format!("Migration: {e}")))
    }

    /// Insert a slot, or overwrite the stored one with the same id.
    ///
    /// Overwriting counts as an update and lands in the change outbox.
    pub fn upsert_slot(&self, slot: &TrainingSlot) -> Result<()> {
        let participants = serde_json::to_string(&slot.participant_ids)
            .map_err(|e| TrainbellError::StoreMutate(format!("Serialize participants: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.lock()
            .execute(
                "INSERT INTO training_slots
                 (id, date, slot_type, slot_key, participant_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    date = excluded.date,
                    slot_type = excluded.slot_type,
                    slot_key = excluded.slot_key,
                    participant_ids = excluded.participant_ids,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    slot.id.as_str(),
                    slot.date.format("%Y-%m-%d").to_string(),
                    slot.slot_type.as_str(),
                    slot.slot_key,
                    participants,
                    now,
                ],
            )
            .map_err(|e| TrainbellError::StoreMutate(format!("Upsert slot {}: {e}", slot.id)))?;
        Ok(())
    }

    /// Replace the participant list of an existing slot.
    pub fn set_participants(&self, id: &SlotId, participants: &[String]) -> Result<()> {
        let json = serde_json::to_string(participants)
            .map_err(|e| TrainbellError::StoreMutate(format!("Serialize participants: {e}")))?;
        let changed = self
            .lock()
            .execute(
                "UPDATE training_slots SET participant_ids = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![json, Utc::now().to_rfc3339(), id.as_str()],
            )
            .map_err(|e| TrainbellError::StoreMutate(format!("Set participants {id}: {e}")))?;
        if changed == 0 {
            return Err(TrainbellError::StoreMutate(format!("slot {id} not found")));
        }
        Ok(())
    }

    /// Read one slot by id.
    pub fn get(&self, id: &SlotId) -> Result<Option<TrainingSlot>> {
        let row = self
            .lock()
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM training_slots WHERE id = ?1"),
                [id.as_str()],
                read_slot_row,
            )
            .optional()
            .map_err(|e| TrainbellError::StoreQuery(format!("Get slot {id}: {e}")))?;
        row.map(slot_from_row).transpose()
    }

    /// Number of changes waiting in the outbox.
    pub fn pending_changes(&self) -> Result<usize> {
        self.lock()
            .query_row("SELECT COUNT(*) FROM slot_changes", [], |r| r.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|e| TrainbellError::StoreQuery(format!("Count changes: {e}")))
    }
}

type SlotRow = (String, String, String, Option<String>, String);

fn read_slot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SlotRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn slot_from_row((id, date, slot_type, slot_key, participants): SlotRow) -> Result<TrainingSlot> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| TrainbellError::StoreQuery(format!("slot {id}: bad date '{date}': {e}")))?;
    let slot_type = SlotType::parse(&slot_type)
        .ok_or_else(|| TrainbellError::StoreQuery(format!("slot {id}: unknown type '{slot_type}'")))?;
    let participant_ids: Vec<String> = serde_json::from_str(&participants)
        .map_err(|e| TrainbellError::StoreQuery(format!("slot {id}: bad participant list: {e}")))?;
    Ok(TrainingSlot {
        id: SlotId(id),
        date,
        slot_type,
        participant_ids,
        slot_key,
    })
}

#[async_trait]
impl SlotStore for SqliteSlotStore {
    async fn query(&self, query: &SlotQuery) -> Result<Vec<TrainingSlot>> {
        let limit = query.limit.map(|n| n as i64).unwrap_or(-1);
        let rows: Vec<SlotRow> = {
            let conn = self.lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SLOT_COLUMNS} FROM training_slots
                     WHERE date = ?1 AND slot_type = ?2
                     ORDER BY id LIMIT ?3"
                ))
                .map_err(|e| TrainbellError::StoreQuery(format!("Prepare query: {e}")))?;
            stmt.query_map(
                rusqlite::params![
                    query.date.format("%Y-%m-%d").to_string(),
                    query.slot_type.as_str(),
                    limit
                ],
                read_slot_row,
            )
            .and_then(|rows| rows.collect())
            .map_err(|e| TrainbellError::StoreQuery(format!("Query slots: {e}")))?
        };
        rows.into_iter().map(slot_from_row).collect()
    }

    async fn batch_mutate(&self, updates: &[SlotUpdate]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| TrainbellError::StoreMutate(format!("Begin batch: {e}")))?;
        let now = Utc::now().to_rfc3339();
        for update in updates {
            let changed = tx
                .execute(
                    "UPDATE training_slots SET slot_type = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![update.slot_type.as_str(), now, update.id.as_str()],
                )
                .map_err(|e| TrainbellError::StoreMutate(format!("Batch update {}: {e}", update.id)))?;
            if changed == 0 {
                // Dropping `tx` rolls back everything staged so far.
                return Err(TrainbellError::StoreMutate(format!(
                    "batch aborted: slot {} not found",
                    update.id
                )));
            }
        }
        tx.commit()
            .map_err(|e| TrainbellError::StoreMutate(format!("Commit batch: {e}")))?;
        tracing::debug!("💾 Committed batch of {} slot updates", updates.len());
        Ok(())
    }

    async fn mutate(&self, update: &SlotUpdate) -> Result<()> {
        let changed = self
            .lock()
            .execute(
                "UPDATE training_slots SET slot_type = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![update.slot_type.as_str(), Utc::now().to_rfc3339(), update.id.as_str()],
            )
            .map_err(|e| TrainbellError::StoreMutate(format!("Update {}: {e}", update.id)))?;
        if changed == 0 {
            return Err(TrainbellError::StoreMutate(format!("slot {} not found", update.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for SqliteSlotStore {
    async fn poll(&self, max: usize) -> Result<Vec<SlotChange>> {
        let conn = self.lock();
        let rows: Vec<(i64, String, String, String)> = {
            let mut stmt = conn
                .prepare(
                    "SELECT seq, slot_id, before_json, after_json FROM slot_changes
                     ORDER BY seq LIMIT ?1",
                )
                .map_err(|e| TrainbellError::StoreQuery(format!("Prepare poll: {e}")))?;
            stmt.query_map([max as i64], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
                .and_then(|rows| rows.collect())
                .map_err(|e| TrainbellError::StoreQuery(format!("Poll changes: {e}")))?
        };

        let mut changes = Vec::with_capacity(rows.len());
        for (seq, slot_id, before_json, after_json) in rows {
            let parsed = serde_json::from_str::<TrainingSlot>(&before_json)
                .and_then(|before| Ok((before, serde_json::from_str::<TrainingSlot>(&after_json)?)));
            match parsed {
                Ok((before, after)) => changes.push(SlotChange {
                    seq,
                    slot_id: SlotId(slot_id),
                    before,
                    after,
                }),
                Err(e) => {
                    // Nothing can ever handle it; leaving it would block the feed.
                    tracing::error!("❌ Dropping unreadable change #{seq} for slot {slot_id}: {e}");
                    conn.execute("DELETE FROM slot_changes WHERE seq = ?1", [seq])
                        .map_err(|e| TrainbellError::StoreMutate(format!("Drop change #{seq}: {e}")))?;
                }
            }
        }
        Ok(changes)
    }

    async fn ack(&self, seq: i64) -> Result<()> {
        self.lock()
            .execute("DELETE FROM slot_changes WHERE seq = ?1", [seq])
            .map_err(|e| TrainbellError::StoreMutate(format!("Ack change #{seq}: {e}")))?;
        Ok(())
    }

    async fn fail(&self, seq: i64) -> Result<u32> {
        self.lock()
            .query_row(
                "UPDATE slot_changes SET attempts = attempts + 1 WHERE seq = ?1 RETURNING attempts",
                [seq],
                |r| r.get::<_, u32>(0),
            )
            .map_err(|e| TrainbellError::StoreMutate(format!("Record failure of change #{seq}: {e}")))
    }
}
