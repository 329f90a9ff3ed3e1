use crate::models::{Role, User};
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(2)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        // The CHECK constraint keeps anything else out of the column.
        role: Role::parse(&role).unwrap_or(Role::User),
        is_active: row.get(3)?,
        last_login_time: row.get(4)?,
    })
}

pub fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    role: Role,
) -> Result<(), RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (email, password_hash, role) VALUES (?1, ?2, ?3)",
        params![email.trim().to_lowercase(), hashed_password, role.as_str()],
    )?;
    Ok(())
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT id, email, role, is_active, last_login_time FROM users ORDER BY id",
    )?;
    let user_iter = stmt.query_map([], user_from_row)?;

    let users = user_iter.filter_map(|u| u.ok()).collect();
    Ok(users)
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Option<User> {
    conn.query_row(
        "SELECT id, email, role, is_active, last_login_time FROM users WHERE email = ?1",
        [email.trim().to_lowercase()],
        user_from_row,
    )
    .ok()
}

pub fn is_admin(conn: &Connection, email: &str) -> bool {
    read_user_by_email(conn, email).map_or(false, |u| u.is_active && u.role == Role::Admin)
}

pub fn update_password(conn: &Connection, email: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE email = ?2",
        params![hashed_password, email.trim().to_lowercase()],
    )
}

pub fn set_active(conn: &Connection, email: &str, is_active: bool) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET is_active = ?1 WHERE email = ?2",
        params![is_active, email.trim().to_lowercase()],
    )
}

/// Returns the user's email and role when the password matches an active account.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Option<(String, Role)> {
    let email = email.trim().to_lowercase();
    let res: rusqlite::Result<(String, String, bool)> = conn.query_row(
        "SELECT password_hash, role, is_active FROM users WHERE email = ?1",
        [&email],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    );

    if let Ok((hash, role, is_active)) = res {
        if is_active && verify(password, &hash).unwrap_or(false) {
            return Role::parse(&role).map(|role| (email, role));
        }
    }
    None
}

pub fn update_last_login_time(conn: &Connection, email: &str) -> Result<(), RusqliteError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET last_login_time = ?1 WHERE email = ?2",
        params![now, email],
    )?;
    Ok(())
}

pub fn read_setting(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()
        .unwrap_or(None)
}

pub fn update_setting(conn: &Connection, key: &str, value: &str) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_users_db;

    fn open_conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("in-memory sqlite");
        setup_users_db(&mut conn).expect("setup users db");
        conn
    }

    #[test]
    fn credentials_are_checked_against_hash() {
        let conn = open_conn();
        create_user(&conn, "Admin@Example.com", "hunter22", Role::Admin).unwrap();

        assert_eq!(
            verify_credentials(&conn, "admin@example.com", "hunter22"),
            Some(("admin@example.com".to_string(), Role::Admin))
        );
        assert!(verify_credentials(&conn, "admin@example.com", "wrong").is_none());
        assert!(verify_credentials(&conn, "nobody@example.com", "hunter22").is_none());
    }

    #[test]
    fn inactive_users_cannot_log_in() {
        let conn = open_conn();
        create_user(&conn, "reader@example.com", "pw-123456", Role::User).unwrap();
        set_active(&conn, "reader@example.com", false).unwrap();

        assert!(verify_credentials(&conn, "reader@example.com", "pw-123456").is_none());
        assert!(!is_admin(&conn, "reader@example.com"));
    }

    #[test]
    fn only_admins_are_admins() {
        let conn = open_conn();
        create_user(&conn, "a@example.com", "pw-123456", Role::Admin).unwrap();
        create_user(&conn, "u@example.com", "pw-123456", Role::User).unwrap();

        assert!(is_admin(&conn, "a@example.com"));
        assert!(!is_admin(&conn, "u@example.com"));
        assert_eq!(read_all_users(&conn).unwrap().len(), 2);
    }

    #[test]
    fn password_change_takes_effect() {
        let conn = open_conn();
        create_user(&conn, "a@example.com", "old-password", Role::Admin).unwrap();
        assert_eq!(update_password(&conn, "a@example.com", "new-password").unwrap(), 1);

        assert!(verify_credentials(&conn, "a@example.com", "old-password").is_none());
        assert!(verify_credentials(&conn, "a@example.com", "new-password").is_some());
    }

    #[test]
    fn settings_are_seeded_and_overwritable() {
        let conn = open_conn();
        assert_eq!(read_setting(&conn, "max_file_upload_size_mb").as_deref(), Some("20"));
        update_setting(&conn, "max_file_upload_size_mb", "25").unwrap();
        assert_eq!(read_setting(&conn, "max_file_upload_size_mb").as_deref(), Some("25"));
        assert!(read_setting(&conn, "missing").is_none());
    }
}
