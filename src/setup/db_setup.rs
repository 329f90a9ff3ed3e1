use crate::models::db_operations::comics_db_operations::{
    CHAPTERS, CHAPTER_INDEX, COMICS, COMIC_UPDATED_INDEX, GENRE_INDEX,
};
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

pub const DEFAULT_MAX_UPLOAD_SIZE_MB: &str = "20";
pub const DEFAULT_ALLOWED_IMAGE_TYPES: &str = "image/jpeg,image/png,image/webp,image/gif";

pub fn setup_users_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    log::debug!("Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'user')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_time TEXT
        )",
        [],
    )?;

    log::debug!("Creating 'settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    seed_initial_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_initial_settings(tx: &Transaction) -> RusqliteResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('max_file_upload_size_mb', ?1)",
        [DEFAULT_MAX_UPLOAD_SIZE_MB],
    )?;
    // PDFs are always accepted on chapter uploads; this list covers page images.
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('allowed_image_types', ?1)",
        [DEFAULT_ALLOWED_IMAGE_TYPES],
    )?;
    Ok(())
}

pub fn setup_comics_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        log::debug!("Creating comic tables in Redb...");
        write_txn.open_table(COMICS)?;
        write_txn.open_table(COMIC_UPDATED_INDEX)?;
        write_txn.open_table(GENRE_INDEX)?;

        log::debug!("Creating chapter tables in Redb...");
        write_txn.open_table(CHAPTERS)?;
        write_txn.open_table(CHAPTER_INDEX)?;
    }
    write_txn.commit()?;
    Ok(())
}
