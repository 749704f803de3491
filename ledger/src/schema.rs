use rusqlite::Connection;

/// Stored in `PRAGMA user_version` once the schema is bootstrapped.
pub const SCHEMA_VERSION: i64 = 1;

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;
         CREATE TABLE IF NOT EXISTS accounts (
             user_id INTEGER PRIMARY KEY,
             mora INTEGER NOT NULL DEFAULT 0 CHECK (mora >= 0),
             dust INTEGER NOT NULL DEFAULT 0 CHECK (dust >= 0),
             fates INTEGER NOT NULL DEFAULT 0 CHECK (fates >= 0)
         );
         CREATE TABLE IF NOT EXISTS inventory (
             user_id INTEGER NOT NULL,
             item TEXT NOT NULL,
             quantity INTEGER NOT NULL CHECK (quantity > 0),
             PRIMARY KEY (user_id, item)
         );
         CREATE TABLE IF NOT EXISTS progression (
             user_id INTEGER PRIMARY KEY,
             level INTEGER NOT NULL DEFAULT 0,
             current_exp INTEGER NOT NULL DEFAULT 0 CHECK (current_exp >= 0)
         );
         CREATE TABLE IF NOT EXISTS level_rewards (
             user_id INTEGER NOT NULL,
             level INTEGER NOT NULL,
             PRIMARY KEY (user_id, level)
         );
         CREATE TABLE IF NOT EXISTS achievements (
             user_id INTEGER NOT NULL,
             key TEXT NOT NULL,
             PRIMARY KEY (user_id, key)
         );
         CREATE TABLE IF NOT EXISTS badges (
             user_id INTEGER NOT NULL,
             badge TEXT NOT NULL,
             PRIMARY KEY (user_id, badge)
         );
         CREATE TABLE IF NOT EXISTS cooldowns (
             user_id INTEGER NOT NULL,
             action TEXT NOT NULL,
             last_action_at INTEGER NOT NULL,
             last_success INTEGER NOT NULL,
             PRIMARY KEY (user_id, action)
         );
         CREATE TABLE IF NOT EXISTS counters (
             user_id INTEGER NOT NULL,
             key TEXT NOT NULL,
             value INTEGER NOT NULL,
             PRIMARY KEY (user_id, key)
         );",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
