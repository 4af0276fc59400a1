use super::database::now_secs;
use super::models::{
    HolderBalance, SnapshotRun, SnapshotStatus, address_column, conversion_error, pad_amount,
    parse_amount,
};
use crate::error::{IndexerError, IndexerResult};
use alloy_primitives::Address;
use rusqlite::{Connection, OptionalExtension, Row, params};

pub struct SnapshotRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SnapshotRepository<'a> {
    const INSERT_RUN: &'static str = "INSERT INTO token_holders_list (
            list_id, token_address, block_number, batch_status, created
        ) VALUES (?1, ?2, ?3, ?4, ?5)";

    const SELECT_RUN: &'static str =
        "SELECT list_id, token_address, block_number, batch_status, created FROM token_holders_list";

    // Only a PENDING run may change status
    const UPDATE_STATUS: &'static str = "UPDATE token_holders_list SET batch_status = ?1
         WHERE list_id = ?2 AND batch_status = 'PENDING'";

    const DELETE_HOLDERS: &'static str = "DELETE FROM token_holder WHERE holder_list = ?1";

    const INSERT_HOLDER: &'static str = "INSERT INTO token_holder (
            holder_list, account_address, hold_balance, locked_balance
        ) VALUES (?1, ?2, ?3, ?4)";

    const SELECT_HOLDERS: &'static str =
        "SELECT account_address, hold_balance, locked_balance FROM token_holder
         WHERE holder_list = ?1 ORDER BY hold_balance DESC, account_address";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_run(
        &self,
        list_id: &str,
        token_address: &Address,
        block_number: u64,
    ) -> IndexerResult<SnapshotRun> {
        let created = now_secs();
        self.conn.execute(
            Self::INSERT_RUN,
            params![
                list_id,
                format!("{token_address:?}"),
                block_number,
                SnapshotStatus::Pending.as_str(),
                created,
            ],
        )?;

        Ok(SnapshotRun {
            list_id: list_id.to_string(),
            token_address: *token_address,
            block_number,
            status: SnapshotStatus::Pending,
            created,
        })
    }

    pub fn get_run(&self, list_id: &str) -> IndexerResult<Option<SnapshotRun>> {
        let query = format!("{} WHERE list_id = ?1", Self::SELECT_RUN);
        let run = self
            .conn
            .query_row(&query, params![list_id], Self::row_to_run)
            .optional()?;
        Ok(run)
    }

    /// PENDING runs whose target block is at or below `max_block`, oldest first.
    pub fn pending_runs(&self, max_block: u64) -> IndexerResult<Vec<SnapshotRun>> {
        let query = format!(
            "{} WHERE batch_status = 'PENDING' AND block_number <= ?1 ORDER BY created, rowid",
            Self::SELECT_RUN
        );
        let max_block = i64::try_from(max_block).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&query)?;
        let runs = stmt
            .query_map(params![max_block], Self::row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Newest completed run for `token_address` strictly below `block_number`.
    pub fn latest_done_before(
        &self,
        token_address: &Address,
        block_number: u64,
    ) -> IndexerResult<Option<SnapshotRun>> {
        let query = format!(
            "{} WHERE token_address = ?1 AND block_number < ?2 AND batch_status = 'DONE'
             ORDER BY block_number DESC, created DESC LIMIT 1",
            Self::SELECT_RUN
        );
        let run = self
            .conn
            .query_row(
                &query,
                params![format!("{token_address:?}"), block_number],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn set_status(&self, list_id: &str, status: SnapshotStatus) -> IndexerResult<()> {
        let updated = self
            .conn
            .execute(Self::UPDATE_STATUS, params![status.as_str(), list_id])?;
        if updated == 0 {
            return Err(IndexerError::InvalidState(format!(
                "snapshot {list_id} is not PENDING"
            )));
        }
        Ok(())
    }

    /// Replaces every holder row of the run. The caller owns the transaction.
    pub fn replace_holders(&self, list_id: &str, holders: &[HolderBalance]) -> IndexerResult<()> {
        self.conn.execute(Self::DELETE_HOLDERS, params![list_id])?;

        let mut stmt = self.conn.prepare_cached(Self::INSERT_HOLDER)?;
        for holder in holders {
            stmt.execute(params![
                list_id,
                format!("{:?}", holder.account_address),
                pad_amount(&holder.hold_balance),
                pad_amount(&holder.locked_balance),
            ])?;
        }
        Ok(())
    }

    /// Holder rows of a DONE run. `None` while the run is PENDING or FAILED.
    pub fn holders(&self, list_id: &str) -> IndexerResult<Option<Vec<HolderBalance>>> {
        let run = self
            .get_run(list_id)?
            .ok_or_else(|| IndexerError::NotFound(format!("snapshot {list_id}")))?;
        if run.status != SnapshotStatus::Done {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(Self::SELECT_HOLDERS)?;
        let holders = stmt
            .query_map(params![list_id], Self::row_to_holder)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(holders))
    }

    fn row_to_run(row: &Row) -> rusqlite::Result<SnapshotRun> {
        let status = row
            .get::<_, String>(3)?
            .parse::<SnapshotStatus>()
            .map_err(|e| conversion_error(3, IndexerError::Decode(e)))?;

        Ok(SnapshotRun {
            list_id: row.get(0)?,
            token_address: address_column(row, 1)?,
            block_number: row.get(2)?,
            status,
            created: row.get(4)?,
        })
    }

    fn row_to_holder(row: &Row) -> rusqlite::Result<HolderBalance> {
        let hold_balance =
            parse_amount(&row.get::<_, String>(1)?).map_err(|e| conversion_error(1, e))?;
        let locked_balance =
            parse_amount(&row.get::<_, String>(2)?).map_err(|e| conversion_error(2, e))?;

        Ok(HolderBalance {
            account_address: address_column(row, 0)?,
            hold_balance,
            locked_balance,
        })
    }
}
