//! SQLite store implementation

use super::InstitutionStore;
use crate::error::ServiceError;
use crate::Result;
use async_trait::async_trait;
use institutions::{Institution, NewInstitution};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const MEMORY_DATABASE: &str = ":memory:";

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub database_url: String,

    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout: Duration,

    /// Enable WAL mode for better concurrency (file databases only)
    pub wal_mode: bool,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    fn is_memory(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "institutions.db".to_string(),
            busy_timeout: Duration::from_secs(5),
            wal_mode: true,
        }
    }
}

/// SQLite-backed institution collection
///
/// SQLite calls are blocking, so each one runs on the blocking thread pool
/// against a shared connection.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open or create the database
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = if config.is_memory() {
            tracing::info!("Opening in-memory institution database");
            Connection::open_in_memory()?
        } else {
            let path = Path::new(&config.database_url);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "Opening institution database");
            Connection::open(path)?
        };

        conn.busy_timeout(config.busy_timeout)?;
        if config.wal_mode && !config.is_memory() {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::new(MEMORY_DATABASE))
    }

    /// The connection string this store was opened with
    pub fn database_url(&self) -> &str {
        &self.config.database_url
    }

    async fn with_conn<T, F>(&self, op: F) -> std::result::Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> std::result::Result<T, ServiceError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| ServiceError::StoreUnavailable(format!("store worker failed: {}", e)))?
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS institutions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            institution_name TEXT,
            campus_name TEXT,
            dane_code TEXT,
            email TEXT,
            city TEXT,
            department TEXT,
            photos TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
}

#[async_trait]
impl InstitutionStore for SqliteStore {
    async fn fetch_all(&self) -> std::result::Result<Vec<Institution>, ServiceError> {
        self.with_conn(|conn| select_all(conn).map_err(classify_read_error)?)
            .await
    }

    async fn persist(
        &self,
        draft: NewInstitution,
    ) -> std::result::Result<Institution, ServiceError> {
        self.with_conn(move |conn| {
            let record = Institution::from_draft(new_object_id(), draft);
            insert(conn, &record).map_err(classify_write_error)?;
            Ok(record)
        })
        .await
    }
}

/// Row as stored, before the photo list is decoded
struct StoredRow {
    id: String,
    institution_name: Option<String>,
    campus_name: Option<String>,
    dane_code: Option<String>,
    email: Option<String>,
    city: Option<String>,
    department: Option<String>,
    photos: String,
}

fn select_all(
    conn: &Connection,
) -> rusqlite::Result<std::result::Result<Vec<Institution>, ServiceError>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, institution_name, campus_name, dane_code, email, city, department, photos
        FROM institutions
        ORDER BY seq
        "#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                institution_name: row.get(1)?,
                campus_name: row.get(2)?,
                dane_code: row.get(3)?,
                email: row.get(4)?,
                city: row.get(5)?,
                department: row.get(6)?,
                photos: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows.into_iter().map(decode_row).collect())
}

fn decode_row(row: StoredRow) -> std::result::Result<Institution, ServiceError> {
    let photos: Vec<String> = serde_json::from_str(&row.photos).map_err(|e| {
        ServiceError::Store(format!("corrupt photo list for record {}: {}", row.id, e))
    })?;

    Ok(Institution {
        id: row.id,
        institution_name: row.institution_name,
        campus_name: row.campus_name,
        dane_code: row.dane_code,
        email: row.email,
        city: row.city,
        department: row.department,
        photos,
    })
}

fn insert(conn: &Connection, record: &Institution) -> rusqlite::Result<()> {
    // Serializing a list of strings cannot fail
    let photos = serde_json::to_string(&record.photos).unwrap_or_else(|_| "[]".to_string());

    conn.execute(
        r#"
        INSERT INTO institutions (
            id, institution_name, campus_name, dane_code, email, city, department, photos
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            &record.id,
            record.institution_name.as_deref(),
            record.campus_name.as_deref(),
            record.dane_code.as_deref(),
            record.email.as_deref(),
            record.city.as_deref(),
            record.department.as_deref(),
            photos,
        ],
    )?;

    Ok(())
}

/// 24 hex characters: seconds since the epoch followed by 64 random bits
fn new_object_id() -> String {
    let seconds = chrono::Utc::now().timestamp() as u32;
    let random = uuid::Uuid::new_v4().as_u128() as u64;
    format!("{:08x}{:016x}", seconds, random)
}

fn is_unavailable(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::OutOfMemory
                | ErrorCode::DiskFull
        )
    )
}

fn classify_read_error(err: rusqlite::Error) -> ServiceError {
    if is_unavailable(&err) {
        ServiceError::StoreUnavailable(err.to_string())
    } else {
        ServiceError::Store(err.to_string())
    }
}

fn classify_write_error(err: rusqlite::Error) -> ServiceError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => ServiceError::Validation(err.to_string()),
        _ => ServiceError::StoreUnavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.fetch_all().await.unwrap().is_empty());
        assert_eq!(store.database_url(), ":memory:");
    }

    #[tokio::test]
    async fn test_persist_assigns_id_and_preserves_order() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = store
            .persist(NewInstitution::new("Colegio A").with_photo("a1.jpg").with_photo("a2.jpg"))
            .await
            .unwrap();
        let second = store
            .persist(NewInstitution::new("Colegio B").with_city("Pasto"))
            .await
            .unwrap();

        assert_eq!(first.id.len(), 24);
        assert!(first.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first.id, second.id);

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all, vec![first, second]);
        assert_eq!(all[0].photos, vec!["a1.jpg", "a2.jpg"]);
    }

    #[tokio::test]
    async fn test_persist_empty_draft() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = store.persist(NewInstitution::default()).await.unwrap();

        assert!(record.institution_name.is_none());
        assert!(record.photos.is_empty());
        assert_eq!(store.fetch_all().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("catalog.db");
        let config = StoreConfig::new(path.to_string_lossy());

        let stored = {
            let store = SqliteStore::open(config.clone()).unwrap();
            store.persist(NewInstitution::new("Persistente")).await.unwrap()
        };

        let reopened = SqliteStore::open(config).unwrap();
        assert_eq!(reopened.fetch_all().await.unwrap(), vec![stored]);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_photo_list_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.db");
        let store = SqliteStore::open(StoreConfig::new(path.to_string_lossy())).unwrap();

        {
            let raw = Connection::open(&path).unwrap();
            raw.execute(
                "INSERT INTO institutions (id, photos) VALUES ('bad', 'not-json')",
                [],
            )
            .unwrap();
        }

        let err = store.fetch_all().await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(ref msg) if msg.contains("bad")));
    }

    #[test]
    fn test_error_classification() {
        // SQLITE_BUSY
        assert!(matches!(
            classify_read_error(sqlite_failure(5)),
            ServiceError::StoreUnavailable(_)
        ));
        // SQLITE_CORRUPT
        assert!(matches!(
            classify_read_error(sqlite_failure(11)),
            ServiceError::Store(_)
        ));
        // SQLITE_CONSTRAINT
        assert!(matches!(
            classify_write_error(sqlite_failure(19)),
            ServiceError::Validation(_)
        ));
        // SQLITE_FULL
        assert!(matches!(
            classify_write_error(sqlite_failure(13)),
            ServiceError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_object_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| new_object_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
