use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name            TEXT NOT NULL,
                password        TEXT NOT NULL,
                reset_token     TEXT UNIQUE,
                reset_expires   TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE stores (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                slug        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                description TEXT NOT NULL DEFAULT '',
                lat         REAL NOT NULL,
                lng         REAL NOT NULL,
                address     TEXT NOT NULL,
                photo       TEXT,
                author_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_stores_created ON stores(created_at);

            CREATE TABLE store_tags (
                store_id    TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                tag         TEXT NOT NULL,
                PRIMARY KEY (store_id, position)
            );

            CREATE INDEX idx_store_tags_tag ON store_tags(tag);

            CREATE TABLE reviews (
                id          TEXT PRIMARY KEY,
                store_id    TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL REFERENCES users(id),
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                text        TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_reviews_store ON reviews(store_id, created_at);

            CREATE TABLE hearts (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                store_id    TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, store_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
