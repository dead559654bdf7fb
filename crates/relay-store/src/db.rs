use rusqlite::{Connection, Result};

/// Meta key recorded the first time the pair table is written.
pub(crate) const PAIRS_CONFIGURED_KEY: &str = "pairs_configured";

/// Initialise all relay tables. Idempotent, run on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_channel_pairs_table(conn)?;
    create_filter_words_table(conn)?;
    create_meta_table(conn)?;
    Ok(())
}

fn create_channel_pairs_table(conn: &Connection) -> Result<()> {
    // position keeps table order stable across whole-set rewrites.
    // UNIQUE(source, destination) backs the no-duplicate-pair invariant.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channel_pairs (
            position     INTEGER PRIMARY KEY NOT NULL,
            source       INTEGER NOT NULL,
            destination  INTEGER NOT NULL,
            name         TEXT NOT NULL,
            UNIQUE(source, destination)
        );
        CREATE INDEX IF NOT EXISTS idx_channel_pairs_source
            ON channel_pairs (source);",
    )
}

fn create_filter_words_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS filter_words (
            position  INTEGER PRIMARY KEY NOT NULL,
            phrase    TEXT NOT NULL
        );",
    )
}

fn create_meta_table(conn: &Connection) -> Result<()> {
    // Distinguishes "never configured" from "configured, then emptied" so the
    // legacy pair is only synthesized for fresh installs.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relay_meta (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}
