//! First-seen registry: who posted a URL first on a channel, and when.
//!
//! Backed by SQLite. The `(network, channel, url)` primary key is what keeps
//! concurrent first posts from producing two rows; callers check-then-insert
//! without a lock and branch on [`FirstSeenStore::insert_if_absent`]'s answer.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

/// Longest URL the registry accepts, in bytes.
pub const MAX_URL_LEN: usize = 2083;

/// One URL's first sighting on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Lower-cased.
    pub network: String,
    /// Lower-cased.
    pub channel: String,
    pub url: String,
    pub user: String,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("URL is {0} bytes, longer than the {MAX_URL_LEN} byte limit")]
    UrlTooLong(usize),
    #[error("bad timestamp in database: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Append-only store of first sightings.
pub trait FirstSeenStore: Send + Sync {
    /// Look up the record for a key. Network and channel match case-insensitively.
    fn find(&self, network: &str, channel: &str, url: &str) -> Result<Option<UrlRecord>, RegistryError>;

    /// Create the record unless one exists. `Ok(false)` means another
    /// writer got there first; that is not an error.
    fn insert_if_absent(
        &self,
        network: &str,
        channel: &str,
        user: &str,
        url: &str,
        first_seen_at: DateTime<Utc>,
    ) -> Result<bool, RegistryError>;
}

/// SQLite-backed [`FirstSeenStore`].
pub struct SqliteRegistry {
    db: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Open or create the registry database.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, RegistryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RegistryError> {
        // Other processes sharing the file may hold the write lock briefly.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS urlnazi (
                network       TEXT NOT NULL,
                channel       TEXT NOT NULL,
                user          TEXT NOT NULL,
                url           TEXT NOT NULL,
                url_timestamp TEXT NOT NULL,
                PRIMARY KEY (network, channel, url)
            );",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let db = self.db.lock();
        let n: i64 = db.query_row("SELECT COUNT(*) FROM urlnazi", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

impl FirstSeenStore for SqliteRegistry {
    fn find(&self, network: &str, channel: &str, url: &str) -> Result<Option<UrlRecord>, RegistryError> {
        let db = self.db.lock();
        let row = db
            .query_row(
                "SELECT network, channel, url, user, url_timestamp FROM urlnazi
                 WHERE network = ?1 AND channel = ?2 AND url = ?3",
                params![network.to_lowercase(), channel.to_lowercase(), url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((network, channel, url, user, timestamp)) = row else {
            return Ok(None);
        };
        let first_seen_at = DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc);
        Ok(Some(UrlRecord {
            network,
            channel,
            url,
            user,
            first_seen_at,
        }))
    }

    fn insert_if_absent(
        &self,
        network: &str,
        channel: &str,
        user: &str,
        url: &str,
        first_seen_at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        if url.len() > MAX_URL_LEN {
            return Err(RegistryError::UrlTooLong(url.len()));
        }
        let db = self.db.lock();
        let result = db.execute(
            "INSERT INTO urlnazi (network, channel, user, url, url_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                network.to_lowercase(),
                channel.to_lowercase(),
                user,
                url,
                first_seen_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                tracing::debug!(network, channel, url, "URL already recorded by another writer");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
