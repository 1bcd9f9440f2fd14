use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::store::format_timestamp;

use super::{AuditError, AuditFilter, AuditPage, AuditRecord, AuditStore};

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open the audit store in an existing or new database file
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AuditError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| AuditError::Database(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                object_id INTEGER,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_object_id ON audit_events(object_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
            "#,
        )
        .map_err(|e| AuditError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection lock poisoned".to_string()))
    }

    fn select(
        conn: &Connection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AuditError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    crate::store::parse_timestamp(row, 1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| AuditError::Database(e.to_string()))?;

        rows.map(|row| -> Result<AuditRecord, AuditError> {
            let (id, timestamp, event_type, object_id, data) =
                row.map_err(|e| AuditError::Database(e.to_string()))?;
            Ok(AuditRecord {
                id,
                timestamp,
                event_type,
                object_id,
                data: serde_json::from_str(&data)
                    .map_err(|e| AuditError::Serialization(e.to_string()))?,
            })
        })
        .collect()
    }
}

/// `WHERE` fragment and its bound values for a filter.
fn conditions(filter: &AuditFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values = Vec::new();

    if let Some(object_id) = filter.object_id {
        clauses.push("object_id = ?");
        values.push(Value::Integer(object_id));
    }
    if let Some(event_type) = &filter.event_type {
        clauses.push("event_type = ?");
        values.push(Value::Text(event_type.clone()));
    }
    if let Some(from) = &filter.from {
        clauses.push("timestamp >= ?");
        values.push(Value::Text(format_timestamp(from)));
    }
    if let Some(to) = &filter.to {
        clauses.push("timestamp <= ?");
        values.push(Value::Text(format_timestamp(to)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, object_id, data) VALUES (?, ?, ?, ?)",
            params![
                format_timestamp(&record.timestamp),
                record.event_type,
                record.object_id,
                data,
            ],
        )
        .map_err(|e| AuditError::Database(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter, page: AuditPage) -> Result<Vec<AuditRecord>, AuditError> {
        let (where_sql, mut values) = conditions(filter);
        values.push(Value::Integer(page.limit));
        values.push(Value::Integer(page.offset));

        let sql = format!(
            "SELECT id, timestamp, event_type, object_id, data FROM audit_events {} \
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_sql
        );
        Self::select(&*self.lock()?, &sql, values)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let (where_sql, values) = conditions(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_sql);
        self.lock()?
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .map_err(|e| AuditError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use chrono::{Duration, Utc};

    fn create_test_store() -> SqliteAuditStore {
        SqliteAuditStore::in_memory().unwrap()
    }

    fn record(event: AuditEvent) -> AuditRecord {
        AuditRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            object_id: event.object_id(),
            data: event,
        }
    }

    fn service_started() -> AuditRecord {
        record(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        })
    }

    fn frozen(object_id: i64) -> AuditRecord {
        record(AuditEvent::ObjectFrozen {
            object_id,
            reason: "Filename was not supported".to_string(),
            source: "automatic".to_string(),
            sip_id: None,
            cancelled_package: None,
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = create_test_store();

        let id = store.insert(&service_started()).unwrap();
        assert!(id > 0);

        let results = store.query(&AuditFilter::default(), AuditPage::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "service_started");
    }

    #[test]
    fn test_query_by_event_type_and_object() {
        let store = create_test_store();

        store.insert(&service_started()).unwrap();
        store.insert(&frozen(1)).unwrap();
        store.insert(&frozen(2)).unwrap();

        let filter = AuditFilter::of_type("object_frozen");
        assert_eq!(store.query(&filter, AuditPage::default()).unwrap().len(), 2);

        let results = store
            .query(&AuditFilter::for_object(1), AuditPage::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_id, Some(1));
    }

    #[test]
    fn test_query_with_time_range() {
        let store = create_test_store();

        let now = Utc::now();
        let mut old_record = service_started();
        old_record.timestamp = now - Duration::hours(2);
        store.insert(&old_record).unwrap();

        let mut new_record = service_started();
        new_record.timestamp = now;
        store.insert(&new_record).unwrap();

        let filter = AuditFilter::default().between(Some(now - Duration::hours(1)), None);
        let results = store.query(&filter, AuditPage::default()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_pagination_and_count() {
        let store = create_test_store();

        for i in 0..5 {
            store.insert(&frozen(i)).unwrap();
        }

        let page = AuditPage {
            limit: 2,
            offset: 4,
        };
        assert_eq!(store.query(&AuditFilter::default(), page).unwrap().len(), 1);

        assert_eq!(store.count(&AuditFilter::default()).unwrap(), 5);
        assert_eq!(store.count(&AuditFilter::for_object(3)).unwrap(), 1);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("audit.db");

        let store = SqliteAuditStore::new(&db_path).unwrap();
        store.insert(&service_started()).unwrap();

        assert!(db_path.exists());
        assert_eq!(store.query(&AuditFilter::default(), AuditPage::default()).unwrap().len(), 1);
    }
}
