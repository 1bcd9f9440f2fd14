//! SQLite-backed workflow store implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::model::{
    Freeze, FreezeCode, FreezeSource, Heartbeat, HeartbeatSource, MuseumAttachment, MuseumObject,
    MuseumPackage, NewPackage, ObjectSnapshot, PreservationDelays, PreservationStatus,
    SyncStatus,
};

use super::{
    FreezeOutcome, ObjectCounts, ResetPackage, StoreError, UnfreezeFilter, WorkflowStore,
};

const OBJECT_COLUMNS: &str = "o.id, o.title, o.created_date, o.modified_date, o.metadata_hash, \
    o.attachment_metadata_hash, o.preserved, o.freeze_code, o.freeze_reason, o.freeze_source, \
    o.latest_package_id";

const PACKAGE_COLUMNS: &str = "p.id, p.museum_object_id, p.sip_filename, p.sip_id, \
    p.object_modified_date, p.created_date, p.metadata_hash, p.attachment_metadata_hash, \
    p.downloaded, p.packaged, p.uploaded, p.preserved, p.rejected, p.cancelled";

/// SQLite-backed workflow store.
pub struct SqliteWorkflowStore {
    conn: Mutex<Connection>,
}

impl SqliteWorkflowStore {
    /// Create a new SQLite workflow store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite workflow store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS museum_objects (
                id INTEGER PRIMARY KEY,
                title TEXT,
                created_date TEXT,
                modified_date TEXT,
                metadata_hash TEXT,
                attachment_metadata_hash TEXT,
                preserved INTEGER NOT NULL DEFAULT 0,
                freeze_code TEXT,
                freeze_reason TEXT,
                freeze_source TEXT,
                latest_package_id INTEGER REFERENCES museum_packages(id),
                CHECK ((freeze_code IS NULL) = (freeze_reason IS NULL)
                    AND (freeze_reason IS NULL) = (freeze_source IS NULL))
            );

            CREATE TABLE IF NOT EXISTS museum_packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                museum_object_id INTEGER NOT NULL REFERENCES museum_objects(id),
                sip_filename TEXT NOT NULL UNIQUE CHECK (length(sip_filename) <= 255),
                sip_id TEXT NOT NULL,
                object_modified_date TEXT,
                created_date TEXT NOT NULL,
                metadata_hash TEXT,
                attachment_metadata_hash TEXT,
                downloaded INTEGER NOT NULL DEFAULT 0,
                packaged INTEGER NOT NULL DEFAULT 0,
                uploaded INTEGER NOT NULL DEFAULT 0,
                preserved INTEGER NOT NULL DEFAULT 0,
                rejected INTEGER NOT NULL DEFAULT 0,
                cancelled INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_museum_packages_object
                ON museum_packages(museum_object_id);
            CREATE INDEX IF NOT EXISTS idx_museum_packages_created_date
                ON museum_packages(created_date);

            CREATE TABLE IF NOT EXISTS museum_attachments (
                id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS package_attachments (
                package_id INTEGER NOT NULL REFERENCES museum_packages(id),
                attachment_id INTEGER NOT NULL REFERENCES museum_attachments(id),
                PRIMARY KEY (package_id, attachment_id)
            );

            CREATE TABLE IF NOT EXISTS sync_statuses (
                name TEXT PRIMARY KEY,
                start_sync_date TEXT,
                prev_start_sync_date TEXT,
                sync_offset INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS heartbeats (
                source TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Move a package forward one step after re-checking its object and flags.
    fn advance_package(
        &self,
        package_id: i64,
        required: &'static str,
        reached: fn(&MuseumPackage) -> bool,
        assignments: &str,
        preserve_object: bool,
    ) -> Result<MuseumPackage, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let package = query_package(&tx, package_id)?
            .ok_or_else(|| StoreError::PackageNotFound(package_id.to_string()))?;
        let object = query_object(&tx, package.museum_object_id)?
            .ok_or(StoreError::ObjectNotFound(package.museum_object_id))?;

        if object.is_frozen() {
            return Err(StoreError::ObjectFrozen(object.id));
        }
        if package.cancelled {
            return Err(StoreError::PackageCancelled(package.sip_filename));
        }
        if object.latest_package_id != Some(package.id) {
            return Err(StoreError::StalePackage(package.sip_filename));
        }
        if !reached(&package) {
            return Err(StoreError::InvalidPackageState {
                sip_filename: package.sip_filename,
                required,
            });
        }

        tx.execute(
            &format!("UPDATE museum_packages SET {} WHERE id = ?1", assignments),
            params![package_id],
        )?;
        if preserve_object {
            tx.execute(
                "UPDATE museum_objects SET preserved = 1 WHERE id = ?1",
                params![object.id],
            )?;
        }

        let updated = query_package(&tx, package_id)?
            .ok_or_else(|| StoreError::PackageNotFound(package_id.to_string()))?;
        tx.commit()?;

        Ok(updated)
    }
}

impl WorkflowStore for SqliteWorkflowStore {
    fn upsert_object(&self, object: &ObjectSnapshot) -> Result<MuseumObject, StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO museum_objects
                (id, title, created_date, modified_date, metadata_hash, attachment_metadata_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                created_date = excluded.created_date,
                modified_date = excluded.modified_date,
                metadata_hash = excluded.metadata_hash,
                attachment_metadata_hash = excluded.attachment_metadata_hash
            "#,
            params![
                object.id,
                object.title,
                object.created_date.as_ref().map(format_timestamp),
                object.modified_date.as_ref().map(format_timestamp),
                object.metadata_hash,
                object.attachment_metadata_hash,
            ],
        )?;

        query_object(&conn, object.id)?.ok_or(StoreError::ObjectNotFound(object.id))
    }

    fn get_object(&self, id: i64) -> Result<Option<MuseumObject>, StoreError> {
        let conn = self.lock()?;
        query_object(&conn, id)
    }

    fn get_package(
        &self,
        object_id: i64,
        sip_id: &str,
    ) -> Result<Option<MuseumPackage>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM museum_packages p WHERE p.museum_object_id = ?1 AND p.sip_id = ?2",
            PACKAGE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![object_id, sip_id], row_to_package)
            .optional()?)
    }

    fn package_by_filename(&self, sip_filename: &str) -> Result<Option<MuseumPackage>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM museum_packages p WHERE p.sip_filename = ?1",
            PACKAGE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![sip_filename], row_to_package)
            .optional()?)
    }

    fn latest_package(&self, object_id: i64) -> Result<Option<MuseumPackage>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM museum_packages p \
             JOIN museum_objects o ON o.latest_package_id = p.id WHERE o.id = ?1",
            PACKAGE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![object_id], row_to_package)
            .optional()?)
    }

    fn list_packages(&self, object_id: i64) -> Result<Vec<MuseumPackage>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM museum_packages p WHERE p.museum_object_id = ?1 \
             ORDER BY p.created_date ASC, p.id ASC",
            PACKAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let packages = stmt
            .query_map(params![object_id], row_to_package)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    fn package_attachments(&self, package_id: i64) -> Result<Vec<MuseumAttachment>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT attachment_id FROM package_attachments WHERE package_id = ?1 \
             ORDER BY attachment_id",
        )?;
        let attachments = stmt
            .query_map(params![package_id], |row| {
                Ok(MuseumAttachment { id: row.get(0)? })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    fn last_preserved_package(&self, object_id: i64) -> Result<Option<MuseumPackage>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM museum_packages p WHERE p.museum_object_id = ?1 AND p.preserved = 1 \
             ORDER BY p.created_date DESC, p.id DESC LIMIT 1",
            PACKAGE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![object_id], row_to_package)
            .optional()?)
    }

    fn record_download(&self, package: &NewPackage) -> Result<MuseumPackage, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let object = query_object(&tx, package.museum_object_id)?
            .ok_or(StoreError::ObjectNotFound(package.museum_object_id))?;
        if object.is_frozen() {
            return Err(StoreError::ObjectFrozen(object.id));
        }

        // Hashes come from the object row read in this transaction.
        let inserted = tx.execute(
            r#"
            INSERT INTO museum_packages
                (museum_object_id, sip_filename, sip_id, object_modified_date, created_date,
                 metadata_hash, attachment_metadata_hash, downloaded)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
            "#,
            params![
                object.id,
                package.sip_filename,
                package.sip_id,
                package.object_modified_date.as_ref().map(format_timestamp),
                format_timestamp(&package.created_date),
                object.metadata_hash,
                object.attachment_metadata_hash,
            ],
        );
        match inserted {
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::DuplicatePackage {
                    filename: package.sip_filename.clone(),
                });
            }
            other => {
                other?;
            }
        }
        let package_id = tx.last_insert_rowid();

        {
            let mut insert_attachment =
                tx.prepare("INSERT OR IGNORE INTO museum_attachments (id) VALUES (?1)")?;
            let mut link_attachment = tx.prepare(
                "INSERT OR IGNORE INTO package_attachments (package_id, attachment_id) \
                 VALUES (?1, ?2)",
            )?;
            for attachment_id in &package.attachment_ids {
                insert_attachment.execute(params![attachment_id])?;
                link_attachment.execute(params![package_id, attachment_id])?;
            }
        }

        tx.execute(
            "UPDATE museum_objects SET latest_package_id = ?1 WHERE id = ?2",
            params![package_id, object.id],
        )?;

        let created = query_package(&tx, package_id)?
            .ok_or_else(|| StoreError::PackageNotFound(package.sip_filename.clone()))?;
        tx.commit()?;

        Ok(created)
    }

    fn mark_packaged(&self, package_id: i64) -> Result<MuseumPackage, StoreError> {
        self.advance_package(package_id, "downloaded", |p| p.downloaded, "packaged = 1", false)
    }

    fn mark_uploaded(&self, package_id: i64) -> Result<MuseumPackage, StoreError> {
        self.advance_package(package_id, "packaged", |p| p.packaged, "uploaded = 1", false)
    }

    fn mark_confirmed(
        &self,
        package_id: i64,
        status: PreservationStatus,
    ) -> Result<MuseumPackage, StoreError> {
        let (assignments, preserve_object) = match status {
            PreservationStatus::Accepted => ("preserved = 1", true),
            PreservationStatus::Rejected => ("rejected = 1", false),
        };
        self.advance_package(
            package_id,
            "awaiting confirmation",
            |p| p.uploaded && !p.preserved && !p.rejected,
            assignments,
            preserve_object,
        )
    }

    fn freeze_object(&self, object_id: i64, freeze: &Freeze) -> Result<MuseumObject, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE museum_objects SET freeze_code = ?1, freeze_reason = ?2, freeze_source = ?3 \
             WHERE id = ?4",
            params![
                freeze.code.as_str(),
                freeze.reason,
                freeze.source.as_str(),
                object_id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::ObjectNotFound(object_id));
        }

        let object = query_object(&tx, object_id)?.ok_or(StoreError::ObjectNotFound(object_id))?;
        tx.commit()?;

        Ok(object)
    }

    fn freeze_objects(
        &self,
        object_ids: &[i64],
        freeze: &Freeze,
    ) -> Result<FreezeOutcome, StoreError> {
        if object_ids.is_empty() {
            return Ok(FreezeOutcome::default());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut outcome = FreezeOutcome::default();

        {
            let mut freeze_stmt = tx.prepare(
                "UPDATE museum_objects SET freeze_code = ?1, freeze_reason = ?2, \
                 freeze_source = ?3 WHERE id = ?4",
            )?;
            for object_id in object_ids {
                let updated = freeze_stmt.execute(params![
                    freeze.code.as_str(),
                    freeze.reason,
                    freeze.source.as_str(),
                    object_id
                ])?;
                if updated > 0 {
                    outcome.frozen.push(*object_id);
                }
            }
        }

        let placeholders = vec!["?"; object_ids.len()].join(", ");
        let sql = format!(
            "SELECT p.id, p.sip_filename FROM museum_packages p \
             JOIN museum_objects o ON o.latest_package_id = p.id \
             WHERE o.id IN ({}) AND p.preserved = 0 AND p.rejected = 0 AND p.cancelled = 0",
            placeholders
        );
        let to_cancel = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(object_ids.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for (package_id, sip_filename) in to_cancel {
            tx.execute(
                "UPDATE museum_packages SET cancelled = 1 WHERE id = ?1",
                params![package_id],
            )?;
            outcome.cancelled_packages.push(sip_filename);
        }

        tx.commit()?;

        Ok(outcome)
    }

    fn unfreeze_objects(&self, filter: &UnfreezeFilter) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut conditions = vec!["o.freeze_source IS NOT NULL".to_string()];
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref reason) = filter.reason {
            conditions.push("o.freeze_reason = ?".to_string());
            query_params.push(Box::new(reason.clone()));
        }

        if let Some(ref object_ids) = filter.object_ids {
            if object_ids.is_empty() {
                return Ok(Vec::new());
            }
            conditions.push(format!(
                "o.id IN ({})",
                vec!["?"; object_ids.len()].join(", ")
            ));
            for id in object_ids {
                query_params.push(Box::new(*id));
            }
        }

        let sql = format!(
            "SELECT o.id, o.latest_package_id, p.preserved FROM museum_objects o \
             LEFT JOIN museum_packages p ON p.id = o.latest_package_id \
             WHERE {} ORDER BY o.id",
            conditions.join(" AND ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();

        let matched = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<bool>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut released = Vec::with_capacity(matched.len());
        for (object_id, latest_package_id, latest_preserved) in matched {
            // A latest package that never made it into the archive would
            // otherwise keep the object out of the pending set.
            let keep_latest = latest_package_id.filter(|_| latest_preserved.unwrap_or(false));
            tx.execute(
                "UPDATE museum_objects SET freeze_code = NULL, freeze_reason = NULL, \
                 freeze_source = NULL, latest_package_id = ?1 WHERE id = ?2",
                params![keep_latest, object_id],
            )?;
            released.push(object_id);
        }

        tx.commit()?;

        Ok(released)
    }

    fn clear_latest_package(&self, object_id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE museum_objects SET latest_package_id = NULL WHERE id = ?1",
            params![object_id],
        )?;
        if updated == 0 {
            return Err(StoreError::ObjectNotFound(object_id));
        }
        Ok(())
    }

    fn reset_dangling_packages(
        &self,
        skip: &HashSet<i64>,
    ) -> Result<Vec<ResetPackage>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let dangling = {
            let mut stmt = tx.prepare(
                "SELECT o.id, p.id, p.sip_filename FROM museum_objects o \
                 JOIN museum_packages p ON p.id = o.latest_package_id \
                 WHERE p.uploaded = 0 AND (p.downloaded = 1 OR p.packaged = 1) \
                 ORDER BY o.id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut reset = Vec::with_capacity(dangling.len());
        for (object_id, package_id, sip_filename) in dangling {
            if skip.contains(&object_id) {
                continue;
            }
            tx.execute(
                "UPDATE museum_objects SET latest_package_id = NULL WHERE id = ?1",
                params![object_id],
            )?;
            tx.execute(
                "DELETE FROM package_attachments WHERE package_id = ?1",
                params![package_id],
            )?;
            tx.execute(
                "DELETE FROM museum_packages WHERE id = ?1",
                params![package_id],
            )?;
            reset.push(ResetPackage {
                object_id,
                sip_filename,
            });
        }

        tx.commit()?;

        Ok(reset)
    }

    fn pending_object_ids(
        &self,
        now: DateTime<Utc>,
        delays: PreservationDelays,
        random: bool,
    ) -> Result<Vec<i64>, StoreError> {
        let conn = self.lock()?;

        let preservation_boundary = format_timestamp(&(now - delays.preservation));
        let update_boundary = format_timestamp(&(now - delays.update));
        let order = if random { "RANDOM()" } else { "o.id" };

        let sql = format!(
            r#"
            SELECT o.id FROM museum_objects o
            LEFT JOIN museum_packages p ON p.id = o.latest_package_id
            WHERE o.freeze_source IS NULL
              AND o.metadata_hash IS NOT NULL
              AND o.attachment_metadata_hash IS NOT NULL
              AND (
                (o.latest_package_id IS NULL
                    AND (o.created_date IS NULL OR o.created_date < ?1))
                OR (p.id IS NOT NULL
                    AND p.object_modified_date IS NOT o.modified_date
                    AND (p.object_modified_date IS NULL OR p.object_modified_date < ?2)
                    AND (p.metadata_hash IS NOT o.metadata_hash
                        OR p.attachment_metadata_hash IS NOT o.attachment_metadata_hash))
                OR (p.id IS NOT NULL AND p.cancelled = 1)
              )
            ORDER BY {}
            "#,
            order
        );

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![preservation_boundary, update_boundary], |row| {
                row.get::<_, i64>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn confirmed_sip_filenames(&self, since: DateTime<Utc>) -> Result<HashSet<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sip_filename FROM museum_packages \
             WHERE created_date >= ?1 AND (preserved = 1 OR rejected = 1)",
        )?;
        let filenames = stmt
            .query_map(params![format_timestamp(&since)], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(filenames)
    }

    fn object_counts(&self) -> Result<ObjectCounts, StoreError> {
        let conn = self.lock()?;
        let counts = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(freeze_source IS NOT NULL), 0), \
             COALESCE(SUM(preserved), 0) FROM museum_objects",
            [],
            |row| {
                Ok(ObjectCounts {
                    total: row.get(0)?,
                    frozen: row.get(1)?,
                    preserved: row.get(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    fn sync_status(&self, name: &str, now: DateTime<Utc>) -> Result<SyncStatus, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sync_statuses (name, sync_offset) VALUES (?1, 0)",
            params![name],
        )?;
        tx.execute(
            "UPDATE sync_statuses SET start_sync_date = ?2 \
             WHERE name = ?1 AND start_sync_date IS NULL",
            params![name, format_timestamp(&now)],
        )?;
        let status = query_sync_status(&tx, name)?;
        tx.commit()?;

        Ok(status)
    }

    fn update_sync_offset(&self, name: &str, offset: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_statuses (name, sync_offset) VALUES (?1, ?2) \
             ON CONFLICT(name) DO UPDATE SET sync_offset = excluded.sync_offset",
            params![name, offset],
        )?;
        Ok(())
    }

    fn finish_sync(&self, name: &str) -> Result<SyncStatus, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sync_statuses (name, sync_offset) VALUES (?1, 0)",
            params![name],
        )?;
        tx.execute(
            "UPDATE sync_statuses SET sync_offset = 0, \
             prev_start_sync_date = COALESCE(start_sync_date, prev_start_sync_date), \
             start_sync_date = NULL WHERE name = ?1",
            params![name],
        )?;
        let status = query_sync_status(&tx, name)?;
        tx.commit()?;

        Ok(status)
    }

    fn submit_heartbeat(
        &self,
        source: HeartbeatSource,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO heartbeats (source, timestamp) VALUES (?1, ?2) \
             ON CONFLICT(source) DO UPDATE SET timestamp = excluded.timestamp",
            params![source.as_str(), format_timestamp(&at)],
        )?;
        Ok(())
    }

    fn heartbeats(&self) -> Result<Vec<Heartbeat>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT source, timestamp FROM heartbeats ORDER BY source")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, parse_timestamp(row, 1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(source, timestamp)| {
                HeartbeatSource::parse(&source).map(|source| Heartbeat { source, timestamp })
            })
            .collect())
    }
}

/// Timestamps are stored with fixed precision so they compare lexicographically.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

fn unknown_value(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown value: {}", value).into(),
    )
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn row_to_object(row: &Row) -> rusqlite::Result<MuseumObject> {
    let freeze_code: Option<String> = row.get(7)?;
    let freeze_reason: Option<String> = row.get(8)?;
    let freeze_source: Option<String> = row.get(9)?;

    let freeze = match (freeze_code, freeze_reason, freeze_source) {
        (Some(code), Some(reason), Some(source)) => Some(Freeze {
            code: FreezeCode::parse(&code).ok_or_else(|| unknown_value(7, &code))?,
            reason,
            source: FreezeSource::parse(&source).ok_or_else(|| unknown_value(9, &source))?,
        }),
        _ => None,
    };

    Ok(MuseumObject {
        id: row.get(0)?,
        title: row.get(1)?,
        created_date: parse_optional_timestamp(row, 2)?,
        modified_date: parse_optional_timestamp(row, 3)?,
        metadata_hash: row.get(4)?,
        attachment_metadata_hash: row.get(5)?,
        preserved: row.get(6)?,
        freeze,
        latest_package_id: row.get(10)?,
    })
}

fn row_to_package(row: &Row) -> rusqlite::Result<MuseumPackage> {
    Ok(MuseumPackage {
        id: row.get(0)?,
        museum_object_id: row.get(1)?,
        sip_filename: row.get(2)?,
        sip_id: row.get(3)?,
        object_modified_date: parse_optional_timestamp(row, 4)?,
        created_date: parse_timestamp(row, 5)?,
        metadata_hash: row.get(6)?,
        attachment_metadata_hash: row.get(7)?,
        downloaded: row.get(8)?,
        packaged: row.get(9)?,
        uploaded: row.get(10)?,
        preserved: row.get(11)?,
        rejected: row.get(12)?,
        cancelled: row.get(13)?,
    })
}

fn query_object(conn: &Connection, id: i64) -> Result<Option<MuseumObject>, StoreError> {
    let sql = format!(
        "SELECT {} FROM museum_objects o WHERE o.id = ?1",
        OBJECT_COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], row_to_object).optional()?)
}

fn query_package(conn: &Connection, id: i64) -> Result<Option<MuseumPackage>, StoreError> {
    let sql = format!(
        "SELECT {} FROM museum_packages p WHERE p.id = ?1",
        PACKAGE_COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], row_to_package).optional()?)
}

fn query_sync_status(conn: &Connection, name: &str) -> Result<SyncStatus, StoreError> {
    let status = conn.query_row(
        "SELECT name, start_sync_date, prev_start_sync_date, sync_offset \
         FROM sync_statuses WHERE name = ?1",
        params![name],
        |row| {
            Ok(SyncStatus {
                name: row.get(0)?,
                start_sync_date: parse_optional_timestamp(row, 1)?,
                prev_start_sync_date: parse_optional_timestamp(row, 2)?,
                offset: row.get(3)?,
            })
        },
    )?;
    Ok(status)
}
