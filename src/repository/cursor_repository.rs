use super::database::now_secs;
use super::models::CursorRecord;
use crate::error::{IndexerError, IndexerResult};
use rusqlite::{Connection, OptionalExtension, params};

pub struct CursorRepository<'a> {
    conn: &'a Connection,
    chain_id: u64,
}

impl<'a> CursorRepository<'a> {
    const GET_CURSOR: &'static str =
        "SELECT block_number FROM sync_cursor WHERE chain_id = ?1 AND target = ?2";

    const UPSERT_CURSOR: &'static str =
        "INSERT INTO sync_cursor (chain_id, target, block_number, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chain_id, target) DO UPDATE SET
            block_number = excluded.block_number,
            updated_at = excluded.updated_at";

    const LIST_CURSORS: &'static str =
        "SELECT chain_id, target, block_number, updated_at FROM sync_cursor
         WHERE chain_id = ?1 ORDER BY target";

    pub fn new(conn: &'a Connection, chain_id: u64) -> Self {
        Self { conn, chain_id }
    }

    /// Last fully processed block for `target`, if the target has ever run.
    pub fn get_cursor(&self, target: &str) -> IndexerResult<Option<u64>> {
        let block = self
            .conn
            .query_row(Self::GET_CURSOR, params![self.chain_id, target], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(block)
    }

    /// Moves the cursor forward. Re-advancing to the current value is a no-op;
    /// moving it backwards is refused.
    pub fn advance(&self, target: &str, block_number: u64) -> IndexerResult<()> {
        if let Some(current) = self.get_cursor(target)? {
            if block_number < current {
                return Err(IndexerError::CursorRegression {
                    target: target.to_string(),
                    current,
                    requested: block_number,
                });
            }
            if block_number == current {
                return Ok(());
            }
        }

        self.conn.execute(
            Self::UPSERT_CURSOR,
            params![self.chain_id, target, block_number, now_secs()],
        )?;
        Ok(())
    }

    pub fn list(&self) -> IndexerResult<Vec<CursorRecord>> {
        let mut stmt = self.conn.prepare(Self::LIST_CURSORS)?;
        let cursors = stmt
            .query_map(params![self.chain_id], |row| {
                Ok(CursorRecord {
                    chain_id: row.get(0)?,
                    target: row.get(1)?,
                    block_number: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cursors)
    }
}
