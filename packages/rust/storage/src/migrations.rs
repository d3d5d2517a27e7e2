//! SQL migration definitions for the lobgraph database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: users, enrichment, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Forum users; invited_by_username forms a forest (dangling refs tolerated)
CREATE TABLE IF NOT EXISTS users (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    username            TEXT UNIQUE NOT NULL,
    karma               INTEGER,
    about               TEXT,
    created_at          TEXT,
    invited_by_username TEXT,
    github_username     TEXT,
    twitter_username    TEXT,
    website             TEXT,
    scraped_at          TEXT
);

CREATE INDEX IF NOT EXISTS idx_invited_by ON users(invited_by_username);
CREATE INDEX IF NOT EXISTS idx_karma ON users(karma);
CREATE INDEX IF NOT EXISTS idx_created ON users(created_at);

-- People-search enrichment, at most one row per username
CREATE TABLE IF NOT EXISTS enrichment (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    username     TEXT UNIQUE NOT NULL,
    full_name    TEXT,
    linkedin_url TEXT,
    github_url   TEXT,
    twitter_url  TEXT,
    company      TEXT,
    title        TEXT,
    location     TEXT,
    bio          TEXT,
    other_urls   TEXT NOT NULL DEFAULT '[]',
    raw_response TEXT,
    enriched_at  TEXT NOT NULL
);

-- Run ledger (import / scrape / enrich / export)
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_kind ON runs(kind);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
