use chrono::{DateTime, Utc};
use sqlx::{
    Row, Sqlite, SqliteConnection, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StorageError;
use crate::models::{Poll, PollOption, Vote};

/// Repository for polls, options and vote records.
///
/// Whole operations (reads, admin writes) are methods on `Database`; the
/// vote ledger's write primitives are associated functions taking a
/// transaction connection so the check-insert-increment sequence runs
/// inside one atomic unit.
///
/// Reads and writes use separate pools. SQLite allows one writer at a
/// time, and a deferred transaction that starts reading on one connection
/// and then upgrades to the write lock while another connection holds it
/// aborts with SQLITE_BUSY instead of waiting. Funneling every write
/// transaction through a single-connection pool queues writers at the
/// pool instead; WAL mode lets the read pool run concurrently with them.
pub struct Database {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl Database {
    pub async fn new() -> Result<Self, StorageError> {
        // Get database URL from environment or use a default
        let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:live_poll.db".to_string());
        Self::open(&db_url).await
    }

    /// Open (creating if missing) a file-backed database at the given URL.
    pub async fn open(db_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // All write transactions go through this one connection
        let write_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        let read_pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        // Initialize schema
        Self::init_schema(&write_pool).await?;

        Ok(Self {
            read_pool,
            write_pool,
        })
    }

    /// In-memory database on a single connection shared by reads and
    /// writes. An in-memory sqlite store requires this anyway: every
    /// further pooled connection would get its own empty store.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self {
            read_pool: pool.clone(),
            write_pool: pool,
        })
    }

    // Get a reference to the read pool
    pub fn pool(&self) -> &SqlitePool {
        &self.read_pool
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                poll_id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                option_id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                position INTEGER NOT NULL,
                vote_count INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (poll_id) REFERENCES polls(poll_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                vote_id INTEGER PRIMARY KEY AUTOINCREMENT,
                option_id INTEGER NOT NULL,
                client_id TEXT NOT NULL,
                voted_at TEXT NOT NULL,
                FOREIGN KEY (option_id) REFERENCES options(option_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_options_poll ON options (poll_id);")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_client ON votes (client_id);")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Open a transaction for the vote ledger.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, StorageError> {
        Ok(self.write_pool.begin().await?)
    }

    // Create a new poll with its options, all in one transaction
    pub async fn create_poll(&self, title: &str, labels: &[&str]) -> Result<Poll, StorageError> {
        let created_at = Utc::now();
        let mut tx = self.write_pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO polls (title, created_at)
            VALUES (?, ?)
            "#,
        )
        .bind(title)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let poll_id = result.last_insert_rowid();

        // Insert options in display order
        for (i, label) in labels.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO options (poll_id, label, position, vote_count)
                VALUES (?, ?, ?, 0)
                "#,
            )
            .bind(poll_id)
            .bind(label)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        match self.get_poll(poll_id).await? {
            Some(poll) => Ok(poll),
            None => Err(StorageError::NotFound),
        }
    }

    // Get a poll with its options, ordered by position
    pub async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, StorageError> {
        let poll_row = sqlx::query(
            r#"
            SELECT poll_id, title, created_at
            FROM polls
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.read_pool)
        .await?;

        let Some(poll_row) = poll_row else {
            return Ok(None);
        };

        let title = poll_row.get::<String, _>("title");
        let created_at = parse_timestamp(&poll_row.get::<String, _>("created_at"))?;

        let options = sqlx::query(
            r#"
            SELECT option_id, poll_id, label, position, vote_count
            FROM options
            WHERE poll_id = ?
            ORDER BY position
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.read_pool)
        .await?
        .into_iter()
        .map(|row| PollOption {
            option_id: row.get("option_id"),
            poll_id: row.get("poll_id"),
            label: row.get("label"),
            position: row.get("position"),
            vote_count: row.get("vote_count"),
        })
        .collect();

        Ok(Some(Poll {
            poll_id,
            title,
            options,
            created_at,
        }))
    }

    // Get the active poll (single-poll deployment: first by id)
    pub async fn current_poll(&self) -> Result<Option<Poll>, StorageError> {
        let row = sqlx::query("SELECT poll_id FROM polls ORDER BY poll_id LIMIT 1")
            .fetch_optional(&self.read_pool)
            .await?;

        match row {
            Some(row) => self.get_poll(row.get("poll_id")).await,
            None => Ok(None),
        }
    }

    // Look up a single option
    pub async fn find_option(&self, option_id: i64) -> Result<Option<PollOption>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT option_id, poll_id, label, position, vote_count
            FROM options
            WHERE option_id = ?
            "#,
        )
        .bind(option_id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.map(|row| PollOption {
            option_id: row.get("option_id"),
            poll_id: row.get("poll_id"),
            label: row.get("label"),
            position: row.get("position"),
            vote_count: row.get("vote_count"),
        }))
    }

    // Get all vote records for a poll (audit listing)
    pub async fn get_poll_votes(&self, poll_id: i64) -> Result<Vec<Vote>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT v.vote_id, v.option_id, v.client_id, v.voted_at
            FROM votes v
            JOIN options o ON o.option_id = v.option_id
            WHERE o.poll_id = ?
            ORDER BY v.vote_id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.read_pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Vote {
                    vote_id: row.get("vote_id"),
                    option_id: row.get("option_id"),
                    client_id: row.get("client_id"),
                    voted_at: parse_timestamp(&row.get::<String, _>("voted_at"))?,
                })
            })
            .collect()
    }

    /// Delete all of a poll's votes and zero its cached counts, in one
    /// transaction so the count/ledger invariant holds throughout.
    /// Returns the number of vote rows removed.
    pub async fn clear_poll_votes(&self, poll_id: i64) -> Result<u64, StorageError> {
        let mut tx = self.write_pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM votes
            WHERE option_id IN (SELECT option_id FROM options WHERE poll_id = ?)
            "#,
        )
        .bind(poll_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE options SET vote_count = 0 WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(deleted)
    }

    // --- Transaction-scoped ledger primitives ---

    /// Re-fetch an option inside the ledger transaction.
    pub async fn option_in_tx(
        conn: &mut SqliteConnection,
        option_id: i64,
    ) -> Result<Option<PollOption>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT option_id, poll_id, label, position, vote_count
            FROM options
            WHERE option_id = ?
            "#,
        )
        .bind(option_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(|row| PollOption {
            option_id: row.get("option_id"),
            poll_id: row.get("poll_id"),
            label: row.get("label"),
            position: row.get("position"),
            vote_count: row.get("vote_count"),
        }))
    }

    /// Whether this client already has a vote anywhere in the poll.
    pub async fn vote_exists(
        conn: &mut SqliteConnection,
        poll_id: i64,
        client_id: &str,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM votes v
            JOIN options o ON o.option_id = v.option_id
            WHERE o.poll_id = ? AND v.client_id = ?
            LIMIT 1
            "#,
        )
        .bind(poll_id)
        .bind(client_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.is_some())
    }

    /// Insert a vote row; returns the new vote id.
    pub async fn insert_vote(
        conn: &mut SqliteConnection,
        option_id: i64,
        client_id: &str,
        voted_at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO votes (option_id, client_id, voted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(option_id)
        .bind(client_id)
        .bind(voted_at.to_rfc3339())
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Atomic in-store "add 1 to current value" on the cached count.
    /// Returns the new count, or `None` when the option no longer exists.
    pub async fn increment_vote_count(
        conn: &mut SqliteConnection,
        option_id: i64,
    ) -> Result<Option<i64>, StorageError> {
        let row = sqlx::query(
            r#"
            UPDATE options
            SET vote_count = vote_count + 1
            WHERE option_id = ?
            RETURNING vote_count
            "#,
        )
        .bind(option_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(|row| row.get("vote_count")))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Constraint(format!("unparseable timestamp {raw:?}: {e}")))
}
