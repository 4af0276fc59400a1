use crate::error::{IndexerError, IndexerResult};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared handle to the SQLite store. Clones share one connection; callers lock it
/// for the duration of a single write unit and never across an `.await`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> IndexerResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn lock(&self) -> IndexerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IndexerError::LockPoisoned(e.to_string()))
    }

    fn create_tables(&self) -> IndexerResult<()> {
        let conn = self.lock()?;

        // One watermark per (chain, sync target)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_cursor (
                chain_id INTEGER NOT NULL,
                target TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (chain_id, target)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS listing (
                token_address TEXT PRIMARY KEY,
                template TEXT NOT NULL,
                owner_address TEXT NOT NULL,
                is_public INTEGER NOT NULL
            )",
            [],
        )?;

        // is_read / is_flagged / is_deleted belong to the API layer
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notification (
                notification_id TEXT PRIMARY KEY,
                notification_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                address TEXT,
                block_timestamp INTEGER NOT NULL,
                args TEXT NOT NULL,
                metainfo TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at INTEGER,
                created INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notification_address
             ON notification(address)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notification_type
             ON notification(notification_type, priority)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS block_data (
                number INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                parent_hash TEXT NOT NULL,
                sha3_uncles TEXT,
                miner TEXT,
                state_root TEXT,
                transactions_root TEXT,
                receipts_root TEXT,
                logs_bloom TEXT,
                difficulty TEXT,
                gas_limit INTEGER NOT NULL,
                gas_used INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                proof_of_authority_data TEXT,
                mix_hash TEXT,
                nonce TEXT,
                size INTEGER,
                transactions TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tx_data (
                hash TEXT PRIMARY KEY,
                block_hash TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                transaction_index INTEGER NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT,
                input TEXT NOT NULL,
                gas INTEGER NOT NULL,
                gas_price TEXT,
                value TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                FOREIGN KEY (block_hash) REFERENCES block_data(hash)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_data_block_number
             ON tx_data(block_number)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_holders_list (
                list_id TEXT PRIMARY KEY,
                token_address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                batch_status TEXT NOT NULL,
                created INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_holder (
                holder_list TEXT NOT NULL,
                account_address TEXT NOT NULL,
                hold_balance TEXT NOT NULL,
                locked_balance TEXT NOT NULL,
                PRIMARY KEY (holder_list, account_address),
                FOREIGN KEY (holder_list) REFERENCES token_holders_list(list_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS node (
                endpoint_uri TEXT PRIMARY KEY,
                priority INTEGER NOT NULL,
                is_synced INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
