pub mod keys;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use icalendar::Calendar;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument};

/// The shared key-value store backing both the sync writer and the read API.
///
/// Keys hold either a single string or a set of strings (see [`keys`]); the
/// two shapes live in separate tables. Every component receives the store as
/// an explicit collaborator, so tests can run against [`Storage::in_memory`].
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .journal_mode(SqliteJournalMode::Delete)
                    .create_if_missing(true),
            )
            .await
            .with_context(|| anyhow!("could not open a SQLite database `{}`", db_path.display()))?;
        info!("Using an SQLite database `{}`", db_path.display());

        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    /// An in-memory store with the same schema. Used by the test suites.
    pub async fn in_memory() -> Result<Self> {
        // Each SQLite in-memory connection is its own database; a one-slot
        // pool keeps every transaction on the same one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await
            .context("could not open an in-memory SQLite database")?;

        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!()
            .run(pool)
            .await
            .context("could not prepare a database schema")
    }

    pub async fn begin(&self) -> Result<Tx> {
        self.pool
            .begin()
            .await
            .context("could not begin a new DB transaction")
            .map(Tx)
    }
}

pub struct Tx(Transaction<'static, Sqlite>);

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.0
            .commit()
            .await
            .context("could not commit a DB transaction")
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO kv_strings (key, value)
            VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not write the key `{key}`"))?;

        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT value
            FROM kv_strings
            WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not read the key `{key}`"))
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)
            FROM kv_strings
            WHERE key = ?1",
        )
        .bind(key)
        .fetch_one(self.0.as_mut())
        .await
        .map(|count| count > 0)
        .with_context(|| anyhow!("could not check the key `{key}`"))
    }

    async fn sadd(&mut self, key: &str, member: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE
            INTO kv_set_members (key, member)
            VALUES (?1, ?2)",
        )
        .bind(key)
        .bind(member)
        .execute(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not add a member to the set `{key}`"))?;

        Ok(())
    }

    async fn smembers(&mut self, key: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT member
            FROM kv_set_members
            WHERE key = ?1
            ORDER BY member ASC",
        )
        .bind(key)
        .fetch_all(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not read the set `{key}`"))
    }

    /// Writes one feed's sub-calendars and maintains the course indexes.
    ///
    /// Each `course/` key is fully replaced; keys from an earlier run that
    /// the latest split no longer produces are left as they are. Re-running
    /// with identical input is a no-op for the observable state.
    #[instrument(level = "TRACE", skip(self, groups), fields(group_count = groups.len()))]
    pub async fn persist_feed(
        &mut self,
        feed_name: &str,
        groups: &BTreeMap<String, Calendar>,
    ) -> Result<()> {
        self.sadd(keys::CALENDARS, feed_name).await?;

        for (course_key, sub_calendar) in groups {
            debug!(%course_key, "Storing a sub-calendar");
            self.put(
                &keys::course(feed_name, course_key),
                &sub_calendar.to_string(),
            )
            .await?;

            match keys::split_course_key(course_key) {
                (course, Some(kind)) => {
                    self.sadd(&keys::course_types(feed_name, course), kind)
                        .await?;
                }

                (course, None) => {
                    self.sadd(&keys::courses_list(feed_name), course).await?;
                }
            }
        }

        Ok(())
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn list_feeds(&mut self) -> Result<Vec<String>> {
        self.smembers(keys::CALENDARS).await
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn list_courses(&mut self, feed_name: &str) -> Result<Vec<String>> {
        self.smembers(&keys::courses_list(feed_name)).await
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn list_course_types(
        &mut self,
        feed_name: &str,
        course: &str,
    ) -> Result<Vec<String>> {
        self.smembers(&keys::course_types(feed_name, course)).await
    }

    /// The stored ICS text for a `<feed>/<courseKey>` request item.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn course_calendar(&mut self, request_key: &str) -> Result<Option<String>> {
        self.get(&keys::course_entry(request_key)).await
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn course_exists(&mut self, request_key: &str) -> Result<bool> {
        self.exists(&keys::course_entry(request_key)).await
    }

    pub async fn set_update_start(&mut self, timestamp: &str) -> Result<()> {
        self.put(keys::UPDATE_START, timestamp).await
    }

    pub async fn set_update_end(&mut self, timestamp: &str) -> Result<()> {
        self.put(keys::UPDATE_END, timestamp).await
    }

    /// Last sync start and end timestamps, raw as stored.
    pub async fn update_info(&mut self) -> Result<(Option<String>, Option<String>)> {
        let start = self.get(keys::UPDATE_START).await?;
        let end = self.get(keys::UPDATE_END).await?;

        Ok((start, end))
    }
}
