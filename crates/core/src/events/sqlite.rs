use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{EventError, EventFilter, EventRecord, EventStore, ImportEvent};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS import_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        session_id TEXT,
        task_id TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_import_events_timestamp ON import_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_import_events_session_id ON import_events(session_id);
    CREATE INDEX IF NOT EXISTS idx_import_events_event_type ON import_events(event_type);
"#;

/// SQLite-backed event store
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) the event database at `path`.
    pub fn new(path: &Path) -> Result<Self, EventError> {
        let conn = Connection::open(path).map_err(|e| EventError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, EventError> {
        let conn = Connection::open_in_memory().map_err(|e| EventError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, EventError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| EventError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, EventError> {
        self.conn
            .lock()
            .map_err(|_| EventError::Database("event store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &EventFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref session_id) = filter.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session_id.clone()));
        }

        if let Some(ref task_id) = filter.task_id {
            conditions.push("task_id = ?");
            params.push(Box::new(task_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError> {
        let conn = self.lock()?;

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| EventError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO import_events (timestamp, event_type, session_id, task_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.session_id,
                record.task_id,
                data_json,
            ],
        )
        .map_err(|e| EventError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, session_id, task_id, data FROM import_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, session_id, task_id, data_json) =
                row.map_err(|e| EventError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| EventError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let data: ImportEvent = serde_json::from_str(&data_json)
                .map_err(|e| EventError::Serialization(e.to_string()))?;

            records.push(EventRecord {
                id,
                timestamp,
                event_type,
                session_id,
                task_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &EventFilter) -> Result<i64, EventError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM import_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| EventError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: ImportEvent) -> EventRecord {
        EventRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            session_id: event.session_id().map(String::from),
            task_id: event.task_id().map(String::from),
            data: event,
        }
    }

    fn registered(session: &str, task: &str) -> EventRecord {
        record(ImportEvent::TaskRegistered {
            session_id: session.to_string(),
            task_id: task.to_string(),
            kind: "album".to_string(),
            recommendation: "ambiguous".to_string(),
            candidates: 2,
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteEventStore::in_memory().unwrap();
        let id = store
            .insert(&record(ImportEvent::ServiceStarted {
                version: "0.1.0".to_string(),
            }))
            .unwrap();
        assert!(id > 0);

        let results = store.query(&EventFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "service_started");
        assert!(results[0].session_id.is_none());
    }

    #[test]
    fn test_query_by_session_and_task() {
        let store = SqliteEventStore::in_memory().unwrap();
        store.insert(&registered("s1", "1")).unwrap();
        store.insert(&registered("s1", "2")).unwrap();
        store.insert(&registered("s2", "1")).unwrap();

        let results = store
            .query(&EventFilter::new().with_session_id("s1"))
            .unwrap();
        assert_eq!(results.len(), 2);

        let results = store
            .query(&EventFilter::new().with_session_id("s2").with_task_id("1"))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_newest_first() {
        let store = SqliteEventStore::in_memory().unwrap();
        store.insert(&registered("s1", "1")).unwrap();
        store.insert(&registered("s1", "2")).unwrap();

        let results = store.query(&EventFilter::new()).unwrap();
        assert_eq!(results[0].task_id.as_deref(), Some("2"));
        assert_eq!(results[1].task_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_pagination_and_count() {
        let store = SqliteEventStore::in_memory().unwrap();
        for i in 0..5 {
            store.insert(&registered("s1", &i.to_string())).unwrap();
        }
        store
            .insert(&record(ImportEvent::ServiceStopped {
                reason: "shutdown".to_string(),
            }))
            .unwrap();

        let page = store
            .query(&EventFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 2);

        assert_eq!(store.count(&EventFilter::new()).unwrap(), 6);
        let filter = EventFilter::new()
            .with_event_type("task_registered")
            .with_limit(1);
        assert_eq!(store.count(&filter).unwrap(), 5);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("events.db");

        let store = SqliteEventStore::new(&db_path).unwrap();
        store.insert(&registered("s1", "1")).unwrap();
        assert!(db_path.exists());
        drop(store);

        let reopened = SqliteEventStore::new(&db_path).unwrap();
        assert_eq!(reopened.count(&EventFilter::new()).unwrap(), 1);
    }
}
