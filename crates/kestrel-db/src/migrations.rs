use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS posts (
            post_id     TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            tags        TEXT NOT NULL,
            content     TEXT NOT NULL,
            sig         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profiles (
            owner_id            TEXT PRIMARY KEY,
            event_id            TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            raw                 TEXT NOT NULL,
            name                TEXT,
            display_name        TEXT,
            about               TEXT,
            picture             TEXT,
            banner              TEXT,
            website             TEXT,
            internet_identifier TEXT,
            lightning_address   TEXT
        );

        CREATE TABLE IF NOT EXISTS post_stats (
            post_id     TEXT PRIMARY KEY,
            likes       INTEGER NOT NULL DEFAULT 0,
            replies     INTEGER NOT NULL DEFAULT 0,
            mentions    INTEGER NOT NULL DEFAULT 0,
            reposts     INTEGER NOT NULL DEFAULT 0,
            zaps        INTEGER NOT NULL DEFAULT 0,
            sats_zapped INTEGER NOT NULL DEFAULT 0,
            score       INTEGER NOT NULL DEFAULT 0,
            score24h    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS profile_stats (
            profile_id  TEXT PRIMARY KEY,
            following   INTEGER NOT NULL DEFAULT 0,
            followers   INTEGER NOT NULL DEFAULT 0,
            notes       INTEGER NOT NULL DEFAULT 0,
            replies     INTEGER NOT NULL DEFAULT 0,
            time_joined INTEGER
        );

        CREATE TABLE IF NOT EXISTS follow_lists (
            owner_id    TEXT PRIMARY KEY,
            event_id    TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            following   TEXT NOT NULL,
            interests   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feed_posts (
            directive   TEXT NOT NULL,
            post_id     TEXT NOT NULL REFERENCES posts(post_id),
            created_at  INTEGER NOT NULL,
            PRIMARY KEY (directive, post_id)
        );

        CREATE INDEX IF NOT EXISTS idx_feed_posts_order
            ON feed_posts(directive, created_at DESC, post_id DESC);

        CREATE TABLE IF NOT EXISTS feed_remote_keys (
            directive   TEXT PRIMARY KEY,
            since       INTEGER,
            until       INTEGER
        );

        CREATE TABLE IF NOT EXISTS user_feeds (
            directive   TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            added_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
