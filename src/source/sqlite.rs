//! SQLite-backed report store

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::dev_config::DevConfig;
use super::{ReportStore, StoreConnector};
use crate::types::{Result, Row, StatsError};

/// One SQLite connection behind a mutex
pub struct SqliteStore {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteStore {
    /// Open or create a read-write store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite store at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| StatsError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StatsError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            label: "primary".to_string(),
        })
    }

    /// Open an existing store read-only. Fails if the file does not exist.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening read-only SQLite store at {:?}", path);

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StatsError::Database(format!("Failed to open SQLite read-only: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            label: "mirror".to_string(),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite store");

        let conn = Connection::open_in_memory()
            .map_err(|e| StatsError::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            label: "memory".to_string(),
        })
    }

    /// Run a closure against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StatsError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }
}

/// JSON view of one SQLite cell
fn cell_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

impl ReportStore for SqliteStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([])?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (i, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), cell_to_json(row.get_ref(i)?));
                }
                out.push(record);
            }
            Ok(out)
        })
    }

    fn query_scalar(&self, sql: &str) -> Result<Value> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(cell_to_json(row.get_ref(0)?)),
                None => Ok(Value::Null),
            }
        })
    }

    fn query_column(&self, sql: &str) -> Result<Vec<Value>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(cell_to_json(row.get_ref(0)?));
            }
            Ok(out)
        })
    }

    fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| StatsError::Database(format!("Ping failed: {}", e)))?;
            Ok(())
        })
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

/// Opens the mirror store as a read-only SQLite file named by
/// `DevConfig::database`. Host, port and credentials do not apply to SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl StoreConnector for SqliteConnector {
    fn connect(&self, config: &DevConfig) -> Result<Arc<dyn ReportStore>> {
        if config.database.trim().is_empty() {
            return Err(StatsError::Config("dev config has no db_name".to_string()));
        }

        let store = SqliteStore::open_read_only(&config.database)?;
        store.ping()?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE t (id INTEGER, name TEXT, amount REAL, note TEXT);
                     INSERT INTO t VALUES (1, 'a', 1.5, NULL);
                     INSERT INTO t VALUES (2, 'b', 2.25, 'x');",
                )?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_query_rows() {
        let store = seeded();
        let rows = store.query_rows("SELECT * FROM t ORDER BY id").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[0]["amount"], json!(1.5));
        assert_eq!(rows[0]["note"], Value::Null);
    }

    #[test]
    fn test_query_scalar_and_column() {
        let store = seeded();
        assert_eq!(store.query_scalar("SELECT SUM(amount) FROM t").unwrap(), json!(3.75));
        assert_eq!(store.query_scalar("SELECT id FROM t WHERE id > 5").unwrap(), Value::Null);
        assert_eq!(
            store.query_column("SELECT name FROM t ORDER BY id").unwrap(),
            vec![json!("a"), json!("b")]
        );
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let store = seeded();
        let err = store.query_rows("SELECT * FROM missing").unwrap_err();
        assert!(matches!(err, StatsError::Query(_)));
    }

    #[test]
    fn test_table_exists_and_ping() {
        let store = seeded();
        assert!(store.table_exists("t").unwrap());
        assert!(!store.table_exists("nope").unwrap());
        store.ping().unwrap();
    }

    #[test]
    fn test_connector_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DevConfig {
            database: dir.path().join("absent.db").display().to_string(),
            ..DevConfig::default()
        };
        assert!(SqliteConnector.connect(&config).is_err());
        assert!(SqliteConnector.connect(&DevConfig::default()).is_err());
    }

    #[test]
    fn test_connector_opens_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (7);")
                .unwrap();
        }

        let config = DevConfig {
            database: path.display().to_string(),
            ..DevConfig::default()
        };
        let mirror = SqliteConnector.connect(&config).unwrap();
        assert_eq!(mirror.label(), "mirror");
        assert_eq!(mirror.query_scalar("SELECT id FROM t").unwrap(), json!(7));
        assert!(mirror.query_rows("INSERT INTO t VALUES (8) RETURNING id").is_err());
    }
}
