// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent per-turtle state, backed by SQLite.
//!
//! One row per turtle in `turtles` (position, heading, fuel, inventory,
//! label, connectivity, first/last seen) plus an append-only `call_audit`
//! table recording every command sent to an agent. Patches are field-wise:
//! absent fields keep their existing value (COALESCE), and coordinates are
//! written as a single unit so a partial position can never be persisted.
//!
//! Every successful mutation pushes the affected id onto a change channel;
//! the owning application drains it and publishes `state_updated` events.
//! The push never blocks the writer.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

pub type TurtleId = i64;

/// World position of a turtle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coords {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Coords {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

/// Connectivity as persisted in the `turtles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "connected" {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

/// Snapshot of one turtle's persisted record.
#[derive(Debug, Clone)]
pub struct TurtleRecord {
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub label: Option<String>,
    pub fuel_level: Option<i64>,
    /// Normalized 16-slot inventory map, keys `"1"..="16"`.
    pub inventory: Option<Value>,
    pub coords: Option<Coords>,
    pub heading: Option<u8>,
    pub connection_status: ConnectionStatus,
}

impl Default for TurtleRecord {
    fn default() -> Self {
        Self {
            first_seen_ms: 0,
            last_seen_ms: 0,
            label: None,
            fuel_level: None,
            inventory: None,
            coords: None,
            heading: None,
            connection_status: ConnectionStatus::Disconnected,
        }
    }
}

/// Field-wise patch. `None` keeps the existing value.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub fuel_level: Option<i64>,
    pub inventory: Option<Value>,
    pub coords: Option<Coords>,
    pub heading: Option<u8>,
    pub connection_status: Option<ConnectionStatus>,
    pub label: Option<String>,
}

/// One row of the command audit trail.
#[derive(Debug, Clone)]
pub struct CallAudit<'a> {
    pub name: &'a str,
    pub args: &'a Value,
    pub ok: Option<bool>,
    pub result: Option<&'a Value>,
    pub error: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub duration_ms: i64,
}

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// SQLite-backed state store. Mutations are serialized by the connection
/// mutex; readers degrade to an empty record instead of failing.
pub struct StateStore {
    conn: Mutex<Connection>,
    change_tx: mpsc::UnboundedSender<TurtleId>,
}

impl StateStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path, change_tx: mpsc::UnboundedSender<TurtleId>) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening state database {}", path.display()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turtles (
                turtle_id INTEGER PRIMARY KEY,
                label TEXT,
                first_seen_ms INTEGER,
                last_seen_ms INTEGER,
                fuel_level INTEGER,
                inventory TEXT,
                x INTEGER,
                y INTEGER,
                z INTEGER,
                heading INTEGER,
                connection_status TEXT DEFAULT 'disconnected'
            );
            CREATE INDEX IF NOT EXISTS idx_turtles_last_seen ON turtles(last_seen_ms);
            CREATE INDEX IF NOT EXISTS idx_turtles_connection ON turtles(connection_status);
            CREATE TABLE IF NOT EXISTS call_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_ms INTEGER,
                turtle_id INTEGER,
                call_name TEXT,
                args_json TEXT,
                ok INTEGER,
                result_json TEXT,
                error_text TEXT,
                request_id TEXT,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_audit_turtle ON call_audit(turtle_id, ts_ms);
            "#,
        )
        .context("applying state schema")?;
        Ok(Self { conn: Mutex::new(conn), change_tx })
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory(change_tx: mpsc::UnboundedSender<TurtleId>) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory state database")?;
        conn.execute_batch(
            "CREATE TABLE turtles (
                turtle_id INTEGER PRIMARY KEY, label TEXT, first_seen_ms INTEGER,
                last_seen_ms INTEGER, fuel_level INTEGER, inventory TEXT,
                x INTEGER, y INTEGER, z INTEGER, heading INTEGER,
                connection_status TEXT DEFAULT 'disconnected');
             CREATE TABLE call_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT, ts_ms INTEGER, turtle_id INTEGER,
                call_name TEXT, args_json TEXT, ok INTEGER, result_json TEXT,
                error_text TEXT, request_id TEXT, duration_ms INTEGER);",
        )
        .context("applying state schema")?;
        Ok(Self { conn: Mutex::new(conn), change_tx })
    }

    fn notify_change(&self, id: TurtleId) {
        // Best-effort; the receiver side publishes `state_updated`.
        let _ = self.change_tx.send(id);
    }

    /// Create the row if absent; refresh `last_seen_ms` either way.
    pub async fn upsert_seen(&self, id: TurtleId) -> anyhow::Result<()> {
        let now = epoch_ms();
        {
            let conn = self.conn.lock().await;
            let exists: Option<i64> = conn
                .query_row("SELECT turtle_id FROM turtles WHERE turtle_id=?1", params![id], |r| {
                    r.get(0)
                })
                .optional()
                .context("querying turtle row")?;
            if exists.is_some() {
                conn.execute(
                    "UPDATE turtles SET last_seen_ms=?1 WHERE turtle_id=?2",
                    params![now, id],
                )
                .context("updating last_seen_ms")?;
            } else {
                conn.execute(
                    "INSERT INTO turtles(turtle_id, first_seen_ms, last_seen_ms) VALUES (?1,?2,?3)",
                    params![id, now, now],
                )
                .context("inserting turtle row")?;
            }
        }
        self.notify_change(id);
        Ok(())
    }

    /// All known turtle ids, ascending.
    pub async fn list_ids(&self) -> Vec<TurtleId> {
        let conn = self.conn.lock().await;
        let result = conn
            .prepare("SELECT turtle_id FROM turtles ORDER BY turtle_id")
            .and_then(|mut stmt| {
                stmt.query_map([], |r| r.get::<_, i64>(0))?.collect::<Result<Vec<_>, _>>()
            });
        match result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("state store: listing ids failed: {e}");
                Vec::new()
            }
        }
    }

    /// Snapshot of one turtle. Unknown ids read as an empty, disconnected
    /// record; read errors degrade the same way.
    pub async fn get(&self, id: TurtleId) -> TurtleRecord {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT first_seen_ms, last_seen_ms, label, fuel_level, inventory,
                        x, y, z, heading, connection_status
                 FROM turtles WHERE turtle_id=?1",
                params![id],
                |r| {
                    let x: Option<i64> = r.get(5)?;
                    let y: Option<i64> = r.get(6)?;
                    let z: Option<i64> = r.get(7)?;
                    let coords = match (x, y, z) {
                        (Some(x), Some(y), Some(z)) => Some(Coords { x, y, z }),
                        _ => None,
                    };
                    Ok(TurtleRecord {
                        first_seen_ms: r.get::<_, Option<i64>>(0)?.unwrap_or(0),
                        last_seen_ms: r.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        label: r.get(2)?,
                        fuel_level: r.get(3)?,
                        inventory: r
                            .get::<_, Option<String>>(4)?
                            .and_then(|text| serde_json::from_str(&text).ok()),
                        coords,
                        heading: r.get::<_, Option<i64>>(8)?.map(|h| (h.rem_euclid(4)) as u8),
                        connection_status: ConnectionStatus::parse(
                            &r.get::<_, Option<String>>(9)?.unwrap_or_default(),
                        ),
                    })
                },
            )
            .optional();
        match row {
            Ok(Some(record)) => record,
            Ok(None) => TurtleRecord::default(),
            Err(e) => {
                tracing::warn!("state store: reading turtle {id} failed: {e}");
                TurtleRecord::default()
            }
        }
    }

    /// Map of id to last-seen millis for all known turtles.
    pub async fn last_seen_map(&self) -> HashMap<TurtleId, i64> {
        let conn = self.conn.lock().await;
        let result = conn.prepare("SELECT turtle_id, last_seen_ms FROM turtles").and_then(
            |mut stmt| {
                stmt.query_map([], |r| {
                    Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?.unwrap_or(0)))
                })?
                .collect::<Result<HashMap<_, _>, _>>()
            },
        );
        result.unwrap_or_default()
    }

    /// Apply a field-wise patch; absent fields keep their current value.
    pub async fn update(&self, id: TurtleId, patch: StatePatch) -> anyhow::Result<()> {
        let inventory_text = match &patch.inventory {
            Some(v) => Some(serde_json::to_string(v).context("encoding inventory")?),
            None => None,
        };
        let (x, y, z) = match patch.coords {
            Some(c) => (Some(c.x), Some(c.y), Some(c.z)),
            None => (None, None, None),
        };
        let heading = patch.heading.map(|h| h as i64);
        let status = patch.connection_status.map(|s| s.as_str());
        {
            let conn = self.conn.lock().await;
            let exists: Option<i64> = conn
                .query_row("SELECT turtle_id FROM turtles WHERE turtle_id=?1", params![id], |r| {
                    r.get(0)
                })
                .optional()
                .context("querying turtle row")?;
            if exists.is_some() {
                conn.execute(
                    "UPDATE turtles
                     SET fuel_level=COALESCE(?1, fuel_level),
                         inventory=COALESCE(?2, inventory),
                         x=COALESCE(?3, x), y=COALESCE(?4, y), z=COALESCE(?5, z),
                         heading=COALESCE(?6, heading),
                         connection_status=COALESCE(?7, connection_status),
                         label=COALESCE(?8, label)
                     WHERE turtle_id=?9",
                    params![
                        patch.fuel_level,
                        inventory_text,
                        x,
                        y,
                        z,
                        heading,
                        status,
                        patch.label,
                        id
                    ],
                )
                .context("patching turtle row")?;
            } else {
                conn.execute(
                    "INSERT INTO turtles(turtle_id, fuel_level, inventory, x, y, z, heading,
                                         connection_status, label)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    params![
                        id,
                        patch.fuel_level,
                        inventory_text,
                        x,
                        y,
                        z,
                        heading,
                        status.unwrap_or("disconnected"),
                        patch.label
                    ],
                )
                .context("inserting turtle row")?;
            }
        }
        self.notify_change(id);
        Ok(())
    }

    pub async fn set_label(&self, id: TurtleId, label: &str) -> anyhow::Result<()> {
        self.update(id, StatePatch { label: Some(label.to_owned()), ..Default::default() }).await
    }

    pub async fn set_connection_status(
        &self,
        id: TurtleId,
        status: ConnectionStatus,
    ) -> anyhow::Result<()> {
        self.update(id, StatePatch { connection_status: Some(status), ..Default::default() }).await
    }

    /// Append one row to the command audit trail. Audit appends do not
    /// trigger change notifications.
    pub async fn log_call(&self, id: TurtleId, audit: CallAudit<'_>) -> anyhow::Result<()> {
        let ts = epoch_ms();
        let args_json = serde_json::to_string(audit.args).context("encoding audit args")?;
        let result_json = match audit.result {
            Some(v) => Some(serde_json::to_string(v).context("encoding audit result")?),
            None => None,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO call_audit(ts_ms, turtle_id, call_name, args_json, ok, result_json,
                                    error_text, request_id, duration_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                ts,
                id,
                audit.name,
                args_json,
                audit.ok.map(|ok| if ok { 1 } else { 0 }),
                result_json,
                audit.error,
                audit.request_id,
                audit.duration_ms
            ],
        )
        .context("appending call audit")?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
