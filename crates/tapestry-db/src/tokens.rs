//! Short-lived login credentials: password reset tokens and QR login sessions.

use crate::models::QrSessionRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tapestry_types::UserId;
use tracing::debug;

/// Outcome of a member scanning a QR session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrScan {
    Bound,
    NotFound,
    Expired,
    AlreadyScanned,
}

/// What a polling kiosk sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrPoll {
    Pending,
    /// The session was approved and is now consumed.
    Approved(UserId),
    Expired,
    NotFound,
}

impl Database {
    // -- Password reset --

    /// Stores a reset token digest, invalidating the user's earlier unused
    /// tokens.
    pub fn insert_reset_token(
        &self,
        user: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.transaction(|tx| {
            tx.execute(
                "UPDATE password_reset_tokens SET used = 1 WHERE user_id = ?1 AND used = 0",
                [user.0],
            )?;
            tx.execute(
                "INSERT INTO password_reset_tokens (user_id, token_hash, expires_at, used, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![user.0, token_hash, expires_at, Utc::now()],
            )?;
            Ok(())
        })
    }

    /// Consumes a live reset token and sets the new password hash. Returns the
    /// user whose password changed, or `None` if the token is unknown, used or
    /// expired.
    pub fn reset_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>> {
        self.transaction(|tx| {
            let token: Option<(i64, i64, DateTime<Utc>, bool)> = tx
                .query_row(
                    "SELECT id, user_id, expires_at, used FROM password_reset_tokens WHERE token_hash = ?1",
                    [token_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            let Some((id, user_id, expires_at, used)) = token else {
                return Ok(None);
            };
            if used || expires_at <= now {
                debug!(token = id, used, "Rejected reset token");
                return Ok(None);
            }

            tx.execute("UPDATE password_reset_tokens SET used = 1 WHERE id = ?1", [id])?;
            tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![new_password_hash, user_id],
            )?;
            Ok(Some(UserId(user_id)))
        })
    }

    // -- QR login --

    pub fn create_qr_session(&self, session_token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO qr_sessions (session_token, expires_at, scanned, created_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![session_token, expires_at, Utc::now()],
            )?;
            Ok(())
        })
    }

    /// Binds a pending session to `user`.
    pub fn scan_qr_session(&self, session_token: &str, user: UserId, now: DateTime<Utc>) -> Result<QrScan> {
        self.transaction(|tx| {
            let Some(session) = query_qr_session(tx, session_token)? else {
                return Ok(QrScan::NotFound);
            };
            if session.expires_at <= now {
                return Ok(QrScan::Expired);
            }
            if session.scanned {
                return Ok(QrScan::AlreadyScanned);
            }
            tx.execute(
                "UPDATE qr_sessions SET scanned = 1, scanned_at = ?1, user_id = ?2 WHERE session_token = ?3",
                params![now, user.0, session_token],
            )?;
            Ok(QrScan::Bound)
        })
    }

    /// Reports a session's state; an approved session is deleted so its
    /// token is handed out once.
    pub fn poll_qr_session(&self, session_token: &str, now: DateTime<Utc>) -> Result<QrPoll> {
        self.transaction(|tx| {
            let Some(session) = query_qr_session(tx, session_token)? else {
                return Ok(QrPoll::NotFound);
            };
            if session.expires_at <= now {
                return Ok(QrPoll::Expired);
            }
            match (session.scanned, session.user_id) {
                (true, Some(user)) => {
                    tx.execute("DELETE FROM qr_sessions WHERE session_token = ?1", [session_token])?;
                    Ok(QrPoll::Approved(user))
                }
                _ => Ok(QrPoll::Pending),
            }
        })
    }

    /// Drops expired QR sessions and expired or used reset tokens. Returns the
    /// number of rows removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let sessions = conn.execute("DELETE FROM qr_sessions WHERE expires_at <= ?1", [now])?;
            let tokens = conn.execute(
                "DELETE FROM password_reset_tokens WHERE expires_at <= ?1 OR used = 1",
                [now],
            )?;
            Ok(sessions + tokens)
        })
    }
}

fn query_qr_session(conn: &Connection, session_token: &str) -> Result<Option<QrSessionRow>> {
    conn.query_row(
        "SELECT session_token, user_id, expires_at, scanned FROM qr_sessions WHERE session_token = ?1",
        [session_token],
        |row| {
            Ok(QrSessionRow {
                session_token: row.get(0)?,
                user_id: row.get::<_, Option<i64>>(1)?.map(UserId),
                expires_at: row.get(2)?,
                scanned: row.get(3)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::NewUser;
    use tapestry_types::models::Role;

    fn db_with_user() -> (Database, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                family_id: None,
                name: "Ada",
                email: Some("ada@example.com"),
                password_hash: Some("old"),
                role: Role::Parent,
                profile_image_url: None,
                icon_emoji: None,
            })
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn reset_token_is_single_use() {
        let (db, user) = db_with_user();
        let now = Utc::now();
        db.insert_reset_token(user, "digest", now + Duration::minutes(60)).unwrap();

        assert_eq!(db.reset_password("digest", "new", now).unwrap(), Some(user));
        assert_eq!(db.reset_password("digest", "newer", now).unwrap(), None);

        let stored = db.get_user_by_id(user).unwrap().unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("new"));
    }

    #[test]
    fn expired_and_superseded_reset_tokens_are_rejected() {
        let (db, user) = db_with_user();
        let now = Utc::now();
        db.insert_reset_token(user, "first", now + Duration::minutes(60)).unwrap();
        db.insert_reset_token(user, "second", now + Duration::minutes(60)).unwrap();

        assert_eq!(db.reset_password("first", "x", now).unwrap(), None);
        assert_eq!(
            db.reset_password("second", "x", now + Duration::minutes(61)).unwrap(),
            None
        );
        assert_eq!(db.reset_password("second", "x", now).unwrap(), Some(user));
    }

    #[test]
    fn qr_session_lifecycle() {
        let (db, user) = db_with_user();
        let now = Utc::now();
        db.create_qr_session("abc", now + Duration::seconds(300)).unwrap();

        assert_eq!(db.poll_qr_session("abc", now).unwrap(), QrPoll::Pending);
        assert_eq!(db.scan_qr_session("abc", user, now).unwrap(), QrScan::Bound);
        assert_eq!(db.scan_qr_session("abc", user, now).unwrap(), QrScan::AlreadyScanned);
        assert_eq!(db.poll_qr_session("abc", now).unwrap(), QrPoll::Approved(user));
        // consumed
        assert_eq!(db.poll_qr_session("abc", now).unwrap(), QrPoll::NotFound);
    }

    #[test]
    fn expired_qr_sessions_are_reported_and_pruned() {
        let (db, user) = db_with_user();
        let now = Utc::now();
        db.create_qr_session("old", now - Duration::seconds(1)).unwrap();

        assert_eq!(db.scan_qr_session("old", user, now).unwrap(), QrScan::Expired);
        assert_eq!(db.poll_qr_session("old", now).unwrap(), QrPoll::Expired);
        assert_eq!(db.prune_expired(now).unwrap(), 1);
        assert_eq!(db.poll_qr_session("old", now).unwrap(), QrPoll::NotFound);
    }
}
