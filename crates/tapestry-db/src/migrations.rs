use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Bring the schema up to the latest version. Each step runs once and
/// records itself in `schema_version`.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE families (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                name                TEXT NOT NULL,
                admin_password_hash TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE users (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                family_id         INTEGER REFERENCES families(id) ON DELETE CASCADE,
                name              TEXT NOT NULL,
                email             TEXT UNIQUE,
                password_hash     TEXT,
                role              TEXT NOT NULL CHECK (role IN ('parent', 'child')),
                profile_image_url TEXT,
                icon_emoji        TEXT,
                created_at        TEXT NOT NULL
            );

            CREATE INDEX idx_users_family ON users(family_id);

            CREATE TABLE events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                family_id   INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT,
                emoji       TEXT,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                source      TEXT CHECK (source IN ('ical', 'google', 'alexa', 'manual')),
                source_id   TEXT,
                created_at  TEXT NOT NULL,
                CHECK (end_time > start_time)
            );

            CREATE INDEX idx_events_family_time ON events(family_id, start_time);

            CREATE TABLE event_participants (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, user_id)
            );

            CREATE TABLE chores (
                id                     INTEGER PRIMARY KEY AUTOINCREMENT,
                family_id              INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                title                  TEXT NOT NULL,
                description            TEXT,
                emoji                  TEXT,
                point_value            INTEGER NOT NULL CHECK (point_value BETWEEN 1 AND 10),
                assigned_to            INTEGER REFERENCES users(id) ON DELETE SET NULL,
                is_group_chore         INTEGER NOT NULL DEFAULT 1,
                completed              INTEGER NOT NULL DEFAULT 0,
                week_start             TEXT NOT NULL,
                is_recurring           INTEGER NOT NULL DEFAULT 0,
                recurrence_type        TEXT CHECK (recurrence_type IN ('daily', 'weekly', 'monthly')),
                recurrence_interval    INTEGER,
                recurrence_count       INTEGER,
                recurrence_days        INTEGER NOT NULL DEFAULT 0,
                recurrence_time_of_day TEXT,
                recurrence_end_date    TEXT,
                parent_chore_id        INTEGER REFERENCES chores(id) ON DELETE SET NULL,
                max_completions        INTEGER,
                created_at             TEXT NOT NULL
            );

            CREATE INDEX idx_chores_family ON chores(family_id);

            CREATE TABLE chore_assignees (
                chore_id INTEGER NOT NULL REFERENCES chores(id) ON DELETE CASCADE,
                user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (chore_id, user_id)
            );

            CREATE TABLE chore_completed_by (
                chore_id INTEGER NOT NULL REFERENCES chores(id) ON DELETE CASCADE,
                user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (chore_id, user_id)
            );

            CREATE TABLE points (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                chore_id   INTEGER REFERENCES chores(id) ON DELETE CASCADE,
                points     INTEGER NOT NULL,
                kind       TEXT NOT NULL CHECK (kind IN ('completion', 'manual')),
                awarded_at TEXT NOT NULL
            );

            CREATE INDEX idx_points_user ON points(user_id, awarded_at);
            CREATE INDEX idx_points_chore ON points(chore_id);

            -- At most one completion award per (chore, user) at any time.
            CREATE UNIQUE INDEX idx_points_completion_once
                ON points(chore_id, user_id) WHERE kind = 'completion';

            CREATE TABLE goals (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                family_id         INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                name              TEXT NOT NULL,
                description       TEXT,
                point_requirement INTEGER,
                prize             TEXT,
                created_at        TEXT NOT NULL
            );

            CREATE TABLE password_reset_tokens (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                used       INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE qr_sessions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                session_token TEXT NOT NULL UNIQUE,
                user_id       INTEGER REFERENCES users(id) ON DELETE CASCADE,
                expires_at    TEXT NOT NULL,
                scanned       INTEGER NOT NULL DEFAULT 0,
                scanned_at    TEXT,
                created_at    TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
