use super::models::{BlockRecord, TxRecord, conversion_error};
use crate::error::IndexerResult;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Replicated chain data. Rows are immutable: inserts are plain INSERTs, so a
/// duplicate block or transaction is a constraint violation.
pub struct BlockRepository<'a> {
    conn: &'a Connection,
}

impl<'a> BlockRepository<'a> {
    const INSERT_BLOCK: &'static str = "INSERT INTO block_data (
            number, hash, parent_hash, sha3_uncles, miner, state_root,
            transactions_root, receipts_root, logs_bloom, difficulty, gas_limit,
            gas_used, timestamp, proof_of_authority_data, mix_hash, nonce, size,
            transactions
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)";

    const INSERT_TX: &'static str = "INSERT INTO tx_data (
            hash, block_hash, block_number, transaction_index, from_address,
            to_address, input, gas, gas_price, value, nonce
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

    const SELECT_BLOCK: &'static str = "SELECT number, hash, parent_hash, sha3_uncles, miner,
            state_root, transactions_root, receipts_root, logs_bloom, difficulty, gas_limit,
            gas_used, timestamp, proof_of_authority_data, mix_hash, nonce, size, transactions
        FROM block_data";

    const SELECT_TX: &'static str = "SELECT hash, block_hash, block_number, transaction_index,
            from_address, to_address, input, gas, gas_price, value, nonce
        FROM tx_data";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_block(&self, block: &BlockRecord) -> IndexerResult<()> {
        let mut stmt = self.conn.prepare_cached(Self::INSERT_BLOCK)?;
        stmt.execute(params![
            block.number,
            block.hash,
            block.parent_hash,
            block.sha3_uncles,
            block.miner,
            block.state_root,
            block.transactions_root,
            block.receipts_root,
            block.logs_bloom,
            block.difficulty,
            block.gas_limit,
            block.gas_used,
            block.timestamp,
            block.proof_of_authority_data,
            block.mix_hash,
            block.nonce,
            block.size,
            serde_json::to_string(&block.transactions)?,
        ])?;
        Ok(())
    }

    pub fn insert_transactions(&self, transactions: &[TxRecord]) -> IndexerResult<usize> {
        let mut stmt = self.conn.prepare_cached(Self::INSERT_TX)?;
        let mut count = 0;

        for tx in transactions {
            count += stmt.execute(params![
                tx.hash,
                tx.block_hash,
                tx.block_number,
                tx.transaction_index,
                tx.from_address,
                tx.to_address,
                tx.input,
                tx.gas,
                tx.gas_price,
                tx.value,
                tx.nonce,
            ])?;
        }

        Ok(count)
    }

    pub fn get_block(&self, number: u64) -> IndexerResult<Option<BlockRecord>> {
        let query = format!("{} WHERE number = ?1", Self::SELECT_BLOCK);
        let block = self
            .conn
            .query_row(&query, params![number], Self::row_to_block)
            .optional()?;
        Ok(block)
    }

    pub fn get_transaction(&self, hash: &str) -> IndexerResult<Option<TxRecord>> {
        let query = format!("{} WHERE hash = ?1", Self::SELECT_TX);
        let tx = self
            .conn
            .query_row(&query, params![hash.to_lowercase()], Self::row_to_tx)
            .optional()?;
        Ok(tx)
    }

    pub fn transactions_in_block(&self, number: u64) -> IndexerResult<Vec<TxRecord>> {
        let query = format!(
            "{} WHERE block_number = ?1 ORDER BY transaction_index",
            Self::SELECT_TX
        );
        let mut stmt = self.conn.prepare(&query)?;
        let txs = stmt
            .query_map(params![number], Self::row_to_tx)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    pub fn count(&self) -> IndexerResult<(usize, usize)> {
        let blocks = self
            .conn
            .query_row("SELECT COUNT(*) FROM block_data", [], |row| row.get(0))?;
        let txs = self
            .conn
            .query_row("SELECT COUNT(*) FROM tx_data", [], |row| row.get(0))?;
        Ok((blocks, txs))
    }

    fn row_to_block(row: &Row) -> rusqlite::Result<BlockRecord> {
        let transactions = serde_json::from_str(&row.get::<_, String>(17)?)
            .map_err(|e| conversion_error(17, e))?;

        Ok(BlockRecord {
            number: row.get(0)?,
            hash: row.get(1)?,
            parent_hash: row.get(2)?,
            sha3_uncles: row.get(3)?,
            miner: row.get(4)?,
            state_root: row.get(5)?,
            transactions_root: row.get(6)?,
            receipts_root: row.get(7)?,
            logs_bloom: row.get(8)?,
            difficulty: row.get(9)?,
            gas_limit: row.get(10)?,
            gas_used: row.get(11)?,
            timestamp: row.get(12)?,
            proof_of_authority_data: row.get(13)?,
            mix_hash: row.get(14)?,
            nonce: row.get(15)?,
            size: row.get(16)?,
            transactions,
        })
    }

    fn row_to_tx(row: &Row) -> rusqlite::Result<TxRecord> {
        Ok(TxRecord {
            hash: row.get(0)?,
            block_hash: row.get(1)?,
            block_number: row.get(2)?,
            transaction_index: row.get(3)?,
            from_address: row.get(4)?,
            to_address: row.get(5)?,
            input: row.get(6)?,
            gas: row.get(7)?,
            gas_price: row.get(8)?,
            value: row.get(9)?,
            nonce: row.get(10)?,
        })
    }
}
