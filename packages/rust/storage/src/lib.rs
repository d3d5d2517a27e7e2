//! libSQL storage layer for users, enrichment records, and the run ledger.
//!
//! The [`Storage`] struct is the Record Store. It offers two distinct upsert
//! operations:
//! - [`Storage::upsert_user`] coalesces: a provided field is written only when
//!   the stored column is still null, so known values are never overwritten.
//! - [`Storage::upsert_enrichment`] replaces: every column is overwritten.
//!
//! Each upsert is a single statement, so partial writes are never visible.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use lobgraph_shared::{Enrichment, InvitationEdge, LobGraphError, Result, User, UserUpsert};
use uuid::Uuid;

/// Coalesce upsert for a user row. `scraped_at` is the one column that takes
/// the newer value, since it marks the latest successful scrape.
const UPSERT_USER_SQL: &str = "
    INSERT INTO users (username, karma, about, created_at, invited_by_username,
                       github_username, twitter_username, website, scraped_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(username) DO UPDATE SET
        karma = COALESCE(users.karma, excluded.karma),
        about = COALESCE(users.about, excluded.about),
        created_at = COALESCE(users.created_at, excluded.created_at),
        invited_by_username = COALESCE(users.invited_by_username, excluded.invited_by_username),
        github_username = COALESCE(users.github_username, excluded.github_username),
        twitter_username = COALESCE(users.twitter_username, excluded.twitter_username),
        website = COALESCE(users.website, excluded.website),
        scraped_at = COALESCE(excluded.scraped_at, users.scraped_at)";

const USER_COLUMNS: &str = "username, karma, about, created_at, invited_by_username, \
                            github_username, twitter_username, website, scraped_at";

const ENRICHMENT_COLUMNS: &str = "username, full_name, linkedin_url, github_url, twitter_url, \
                                  company, title, location, bio, other_urls, raw_response, \
                                  enriched_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LobGraphError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LobGraphError::storage)?;

        let conn = db.connect().map_err(LobGraphError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode (export).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LobGraphError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LobGraphError::storage)?;

        let conn = db.connect().map_err(LobGraphError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LobGraphError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LobGraphError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User operations
    // -----------------------------------------------------------------------

    /// Create the user if absent, otherwise fill only its null columns.
    pub async fn upsert_user(&self, user: &UserUpsert) -> Result<()> {
        self.check_writable()?;
        execute_user_upsert(&self.conn, user).await
    }

    /// Apply a batch of coalesce upserts inside one transaction.
    pub async fn upsert_users(&self, users: &[UserUpsert]) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(LobGraphError::storage)?;

        for user in users {
            execute_user_upsert(&tx, user).await?;
        }

        tx.commit().await.map_err(LobGraphError::storage)?;
        tracing::debug!(count = users.len(), "committed user batch");
        Ok(())
    }

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![username])
            .await
            .map_err(LobGraphError::storage)?;

        match rows.next().await.map_err(LobGraphError::storage)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// All users, highest karma first.
    pub async fn list_all_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY karma DESC, username");
        self.query_users(&sql).await
    }

    /// Users without an enrichment record that carry at least one usable
    /// signal (non-empty about, GitHub, Twitter, or website), highest karma first.
    pub async fn list_users_eligible_for_enrichment(&self) -> Result<Vec<User>> {
        let sql = "SELECT u.username, u.karma, u.about, u.created_at, u.invited_by_username,
                          u.github_username, u.twitter_username, u.website, u.scraped_at
                   FROM users u
                   LEFT JOIN enrichment e ON u.username = e.username
                   WHERE e.id IS NULL
                     AND ((u.about IS NOT NULL AND u.about != '')
                          OR u.github_username IS NOT NULL
                          OR u.twitter_username IS NOT NULL
                          OR u.website IS NOT NULL)
                   ORDER BY u.karma DESC, u.username";
        self.query_users(sql).await
    }

    /// One `(invitee, inviter)` edge per user with a known inviter.
    pub async fn list_invitation_edges(&self) -> Result<Vec<InvitationEdge>> {
        let mut rows = self
            .conn
            .query(
                "SELECT username, invited_by_username FROM users
                 WHERE invited_by_username IS NOT NULL
                 ORDER BY id",
                params![],
            )
            .await
            .map_err(LobGraphError::storage)?;

        let mut edges = Vec::new();
        while let Some(row) = rows.next().await.map_err(LobGraphError::storage)? {
            edges.push(InvitationEdge {
                invitee: row.get::<String>(0).map_err(LobGraphError::storage)?,
                inviter: row.get::<String>(1).map_err(LobGraphError::storage)?,
            });
        }
        Ok(edges)
    }

    /// Total number of stored users.
    pub async fn count_users(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM users", params![])
            .await
            .map_err(LobGraphError::storage)?;

        match rows.next().await.map_err(LobGraphError::storage)? {
            Some(row) => Ok(row.get::<i64>(0).map(|n| n.max(0) as u64).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn query_users(&self, sql: &str) -> Result<Vec<User>> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(LobGraphError::storage)?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await.map_err(LobGraphError::storage)? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    // -----------------------------------------------------------------------
    // Enrichment operations
    // -----------------------------------------------------------------------

    /// Insert or fully replace the enrichment record for a username.
    pub async fn upsert_enrichment(&self, record: &Enrichment) -> Result<()> {
        self.check_writable()?;
        let other_urls = serde_json::to_string(&record.other_urls)?;
        self.conn
            .execute(
                "INSERT INTO enrichment (username, full_name, linkedin_url, github_url,
                                         twitter_url, company, title, location, bio,
                                         other_urls, raw_response, enriched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(username) DO UPDATE SET
                   full_name = excluded.full_name,
                   linkedin_url = excluded.linkedin_url,
                   github_url = excluded.github_url,
                   twitter_url = excluded.twitter_url,
                   company = excluded.company,
                   title = excluded.title,
                   location = excluded.location,
                   bio = excluded.bio,
                   other_urls = excluded.other_urls,
                   raw_response = excluded.raw_response,
                   enriched_at = excluded.enriched_at",
                params![
                    record.username.as_str(),
                    record.full_name.as_deref(),
                    record.linkedin_url.as_deref(),
                    record.github_url.as_deref(),
                    record.twitter_url.as_deref(),
                    record.company.as_deref(),
                    record.title.as_deref(),
                    record.location.as_deref(),
                    record.bio.as_deref(),
                    other_urls,
                    record.raw_response.as_deref(),
                    record.enriched_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(LobGraphError::storage)?;
        Ok(())
    }

    /// Get the enrichment record for a username.
    pub async fn get_enrichment(&self, username: &str) -> Result<Option<Enrichment>> {
        let sql = format!("SELECT {ENRICHMENT_COLUMNS} FROM enrichment WHERE username = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![username])
            .await
            .map_err(LobGraphError::storage)?;

        match rows.next().await.map_err(LobGraphError::storage)? {
            Some(row) => Ok(Some(row_to_enrichment(&row)?)),
            None => Ok(None),
        }
    }

    /// All enrichment records, ordered by username.
    pub async fn list_enrichments(&self) -> Result<Vec<Enrichment>> {
        let sql = format!("SELECT {ENRICHMENT_COLUMNS} FROM enrichment ORDER BY username");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(LobGraphError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LobGraphError::storage)? {
            results.push(row_to_enrichment(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record the start of a run. Returns the generated run ID.
    pub async fn insert_run(&self, kind: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, kind, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), kind, now.as_str()],
            )
            .await
            .map_err(LobGraphError::storage)?;
        Ok(id)
    }

    /// Mark a run finished with its summary stats.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(LobGraphError::storage)?;
        Ok(())
    }

    /// Stats JSON of the most recently finished run of `kind`.
    pub async fn last_run_stats(&self, kind: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stats_json FROM runs
                 WHERE kind = ?1 AND finished_at IS NOT NULL
                 ORDER BY id DESC LIMIT 1",
                params![kind],
            )
            .await
            .map_err(LobGraphError::storage)?;

        match rows.next().await.map_err(LobGraphError::storage)? {
            Some(row) => Ok(row.get::<String>(0).ok()),
            None => Ok(None),
        }
    }
}

/// Execute one coalesce upsert on `conn` (plain connection or transaction).
async fn execute_user_upsert(conn: &Connection, user: &UserUpsert) -> Result<()> {
    if user.username.is_empty() {
        return Err(LobGraphError::validation("cannot upsert a user without a username"));
    }

    conn.execute(
        UPSERT_USER_SQL,
        params![
            user.username.as_str(),
            user.karma,
            user.about.as_deref(),
            user.created_at.as_deref(),
            user.invited_by_username.as_deref(),
            user.github_username.as_deref(),
            user.twitter_username.as_deref(),
            user.website.as_deref(),
            user.scraped_at.map(|t| t.to_rfc3339()),
        ],
    )
    .await
    .map_err(LobGraphError::storage)?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LobGraphError::Storage(format!("invalid timestamp '{s}': {e}")))
}

/// Convert a database row (in `USER_COLUMNS` order) to a [`User`].
fn row_to_user(row: &libsql::Row) -> Result<User> {
    let scraped_at = match row.get::<String>(8).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(User {
        username: row.get::<String>(0).map_err(LobGraphError::storage)?,
        karma: row.get::<i64>(1).ok(),
        about: row.get::<String>(2).ok(),
        created_at: row.get::<String>(3).ok(),
        invited_by_username: row.get::<String>(4).ok(),
        github_username: row.get::<String>(5).ok(),
        twitter_username: row.get::<String>(6).ok(),
        website: row.get::<String>(7).ok(),
        scraped_at,
    })
}

/// Convert a database row (in `ENRICHMENT_COLUMNS` order) to an [`Enrichment`].
fn row_to_enrichment(row: &libsql::Row) -> Result<Enrichment> {
    let other_urls: Vec<String> = match row.get::<String>(9).ok() {
        Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
        _ => Vec::new(),
    };
    let enriched_at: String = row.get(11).map_err(LobGraphError::storage)?;

    Ok(Enrichment {
        username: row.get::<String>(0).map_err(LobGraphError::storage)?,
        full_name: row.get::<String>(1).ok(),
        linkedin_url: row.get::<String>(2).ok(),
        github_url: row.get::<String>(3).ok(),
        twitter_url: row.get::<String>(4).ok(),
        company: row.get::<String>(5).ok(),
        title: row.get::<String>(6).ok(),
        location: row.get::<String>(7).ok(),
        bio: row.get::<String>(8).ok(),
        other_urls,
        raw_response: row.get::<String>(10).ok(),
        enriched_at: parse_timestamp(&enriched_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lobgraph_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn user(username: &str, karma: Option<i64>, inviter: Option<&str>) -> UserUpsert {
        UserUpsert {
            username: username.into(),
            karma,
            invited_by_username: inviter.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("lobgraph_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn upsert_creates_then_coalesces() {
        let storage = test_storage().await;

        storage
            .upsert_user(&user("alice", Some(10), None))
            .await
            .expect("insert");

        // Null fields leave stored values alone; null columns get filled.
        let second = UserUpsert {
            username: "alice".into(),
            karma: None,
            about: Some("hacker".into()),
            ..Default::default()
        };
        storage.upsert_user(&second).await.expect("coalesce");

        let found = storage.get_user("alice").await.unwrap().unwrap();
        assert_eq!(found.karma, Some(10));
        assert_eq!(found.about.as_deref(), Some("hacker"));

        // A known value is never overwritten by a fresh upsert.
        storage
            .upsert_user(&user("alice", Some(99), Some("bob")))
            .await
            .unwrap();
        let found = storage.get_user("alice").await.unwrap().unwrap();
        assert_eq!(found.karma, Some(10));
        assert_eq!(found.invited_by_username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn scraped_at_tracks_latest_scrape() {
        let storage = test_storage().await;
        let first = Utc::now() - chrono::Duration::days(1);
        let later = Utc::now();

        let mut up = UserUpsert::bare("carol");
        up.scraped_at = Some(first);
        storage.upsert_user(&up).await.unwrap();

        storage.upsert_user(&UserUpsert::bare("carol")).await.unwrap();
        let found = storage.get_user("carol").await.unwrap().unwrap();
        assert_eq!(
            found.scraped_at.map(|t| t.timestamp()),
            Some(first.timestamp())
        );

        up.scraped_at = Some(later);
        storage.upsert_user(&up).await.unwrap();
        let found = storage.get_user("carol").await.unwrap().unwrap();
        assert_eq!(
            found.scraped_at.map(|t| t.timestamp()),
            Some(later.timestamp())
        );
    }

    #[tokio::test]
    async fn batch_upsert_is_idempotent() {
        let storage = test_storage().await;
        let batch = vec![
            user("root", Some(100), None),
            user("child", Some(5), Some("root")),
            user("grandchild", Some(0), Some("child")),
        ];

        storage.upsert_users(&batch).await.expect("first batch");
        let once = storage.list_all_users().await.unwrap();

        storage.upsert_users(&batch).await.expect("second batch");
        let twice = storage.list_all_users().await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(storage.count_users().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_username_rejected() {
        let storage = test_storage().await;
        let result = storage.upsert_user(&UserUpsert::bare("")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_all_orders_by_karma_desc() {
        let storage = test_storage().await;
        storage
            .upsert_users(&[
                user("low", Some(1), None),
                user("high", Some(50), None),
                user("mid", Some(20), None),
            ])
            .await
            .unwrap();

        let names: Vec<String> = storage
            .list_all_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn invitation_edges_include_dangling_inviters() {
        let storage = test_storage().await;
        storage
            .upsert_users(&[
                user("root", Some(1), None),
                user("child", Some(1), Some("root")),
                user("orphan", Some(1), Some("ghost")),
            ])
            .await
            .unwrap();

        let edges = storage.list_invitation_edges().await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&InvitationEdge {
            invitee: "child".into(),
            inviter: "root".into(),
        }));
        assert!(edges.iter().any(|e| e.inviter == "ghost"));
    }

    fn enrichment(username: &str) -> Enrichment {
        Enrichment {
            username: username.into(),
            full_name: Some("Alice Example".into()),
            linkedin_url: Some("https://www.linkedin.com/in/alice".into()),
            github_url: None,
            twitter_url: None,
            company: Some("Acme".into()),
            title: None,
            location: None,
            bio: None,
            other_urls: vec!["https://alice.dev".into()],
            raw_response: Some("[]".into()),
            enriched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn enrichment_upsert_replaces_everything() {
        let storage = test_storage().await;
        storage.upsert_enrichment(&enrichment("alice")).await.unwrap();

        let replacement = Enrichment {
            username: "alice".into(),
            github_url: Some("https://github.com/alice".into()),
            enriched_at: Utc::now(),
            ..Default::default()
        };
        storage.upsert_enrichment(&replacement).await.unwrap();

        let found = storage.get_enrichment("alice").await.unwrap().unwrap();
        assert_eq!(found.full_name, None);
        assert_eq!(found.linkedin_url, None);
        assert_eq!(found.company, None);
        assert_eq!(found.github_url.as_deref(), Some("https://github.com/alice"));
        assert!(found.other_urls.is_empty());

        assert_eq!(storage.list_enrichments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn eligibility_requires_signal_and_no_enrichment() {
        let storage = test_storage().await;
        storage
            .upsert_users(&[
                UserUpsert {
                    username: "bio".into(),
                    karma: Some(3),
                    about: Some("I build databases for fun and profit".into()),
                    ..Default::default()
                },
                UserUpsert {
                    username: "gh".into(),
                    karma: Some(9),
                    github_username: Some("gh".into()),
                    ..Default::default()
                },
                UserUpsert {
                    username: "blank".into(),
                    karma: Some(100),
                    about: Some(String::new()),
                    ..Default::default()
                },
                UserUpsert {
                    username: "done".into(),
                    website: Some("https://done.example".into()),
                    ..Default::default()
                },
            ])
            .await
            .unwrap();
        storage.upsert_enrichment(&enrichment("done")).await.unwrap();

        let names: Vec<String> = storage
            .list_users_eligible_for_enrichment()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["gh", "bio"]);
    }

    #[tokio::test]
    async fn run_ledger_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage.insert_run("import").await.expect("insert run");
        assert!(!run_id.is_empty());
        assert!(storage.last_run_stats("import").await.unwrap().is_none());

        storage
            .finish_run(&run_id, r#"{"users": 3}"#)
            .await
            .expect("finish run");
        let stats = storage.last_run_stats("import").await.unwrap();
        assert_eq!(stats.as_deref(), Some(r#"{"users": 3}"#));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("lobgraph_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_user(&UserUpsert::bare("alice")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.count_users().await.unwrap(), 1);
        let result = ro.upsert_user(&UserUpsert::bare("bob")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("lobgraph_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
