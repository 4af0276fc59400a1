//! Point-in-time token holder snapshots, rebuilt by replaying balance events.

use crate::chain::{ChainLog, ChainReader};
use crate::cursor::ScanWindow;
use crate::deployment::find_deployment_block;
use crate::error::{IndexerError, IndexerResult};
use crate::events::{self, DecodedLog, EventAbi};
use crate::repository::{
    Database, HolderBalance, ListingRepository, SnapshotRepository, SnapshotRun, SnapshotStatus,
};
use alloy_primitives::{Address, U256, keccak256};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub held: U256,
    pub locked: U256,
}

/// A decoded balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Issue {
        target: Address,
        locked: bool,
        amount: U256,
    },
    Redeem {
        target: Address,
        locked: bool,
        amount: U256,
    },
    /// `Lock` and `ForceLock`.
    Lock { account: Address, value: U256 },
    /// `Unlock` and `ForceUnlock`.
    Unlock {
        account: Address,
        recipient: Address,
        value: U256,
    },
    ChangeLockedAccount {
        before: Address,
        after: Address,
        value: U256,
    },
    Consume { consumer: Address, value: U256 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceEventKind {
    Transfer,
    Issue,
    Redeem,
    Lock,
    ForceLock,
    Unlock,
    ForceUnlock,
    ForceChangeLockedAccount,
    Consume,
    /// Settlement on the token's tradable exchange, emitted by the exchange.
    HolderChanged,
}

impl BalanceEventKind {
    const ALL: [BalanceEventKind; 10] = [
        BalanceEventKind::Transfer,
        BalanceEventKind::Issue,
        BalanceEventKind::Redeem,
        BalanceEventKind::Lock,
        BalanceEventKind::ForceLock,
        BalanceEventKind::Unlock,
        BalanceEventKind::ForceUnlock,
        BalanceEventKind::ForceChangeLockedAccount,
        BalanceEventKind::Consume,
        BalanceEventKind::HolderChanged,
    ];

    fn signature(self) -> &'static str {
        match self {
            BalanceEventKind::Transfer => events::TRANSFER,
            BalanceEventKind::Issue => events::ISSUE,
            BalanceEventKind::Redeem => events::REDEEM,
            BalanceEventKind::Lock => events::LOCK,
            BalanceEventKind::ForceLock => events::FORCE_LOCK,
            BalanceEventKind::Unlock => events::UNLOCK,
            BalanceEventKind::ForceUnlock => events::FORCE_UNLOCK,
            BalanceEventKind::ForceChangeLockedAccount => events::FORCE_CHANGE_LOCKED_ACCOUNT,
            BalanceEventKind::Consume => events::CONSUME,
            BalanceEventKind::HolderChanged => events::HOLDER_CHANGED,
        }
    }

    /// Contract emitting this kind for `token`, if there is one.
    fn emitter(self, token: Address, exchange: Address) -> Option<Address> {
        match self {
            BalanceEventKind::HolderChanged => (!exchange.is_zero()).then_some(exchange),
            _ => Some(token),
        }
    }

    fn to_event(self, log: &DecodedLog) -> IndexerResult<BalanceEvent> {
        let event = match self {
            BalanceEventKind::Transfer | BalanceEventKind::HolderChanged => {
                BalanceEvent::Transfer {
                    from: log.address("from")?,
                    to: log.address("to")?,
                    value: log.uint("value")?,
                }
            }
            BalanceEventKind::Issue => BalanceEvent::Issue {
                target: log.address("targetAddress")?,
                locked: !log.address_or_zero("lockAddress").is_zero(),
                amount: log.uint("amount")?,
            },
            BalanceEventKind::Redeem => BalanceEvent::Redeem {
                target: log.address("targetAddress")?,
                locked: !log.address_or_zero("lockAddress").is_zero(),
                amount: log.uint("amount")?,
            },
            BalanceEventKind::Lock | BalanceEventKind::ForceLock => BalanceEvent::Lock {
                account: log.address("accountAddress")?,
                value: log.uint("value")?,
            },
            BalanceEventKind::Unlock | BalanceEventKind::ForceUnlock => BalanceEvent::Unlock {
                account: log.address("accountAddress")?,
                recipient: log.address("recipientAddress")?,
                value: log.uint("value")?,
            },
            BalanceEventKind::ForceChangeLockedAccount => BalanceEvent::ChangeLockedAccount {
                before: log.address("beforeAccountAddress")?,
                after: log.address("afterAccountAddress")?,
                value: log.uint("value")?,
            },
            BalanceEventKind::Consume => BalanceEvent::Consume {
                consumer: log.address("consumer")?,
                value: log.uint("value")?,
            },
        };
        Ok(event)
    }
}

/// Per-account held and locked balances.
#[derive(Debug, Default, Clone)]
pub struct BalanceBook {
    accounts: BTreeMap<Address, Balance>,
}

impl BalanceBook {
    pub fn from_holders(holders: &[HolderBalance]) -> Self {
        let accounts = holders
            .iter()
            .map(|h| {
                (
                    h.account_address,
                    Balance {
                        held: h.hold_balance,
                        locked: h.locked_balance,
                    },
                )
            })
            .collect();
        Self { accounts }
    }

    pub fn balance(&self, account: &Address) -> Balance {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    /// Sum of held and locked balances over every account.
    pub fn total(&self) -> U256 {
        self.accounts
            .values()
            .fold(U256::ZERO, |sum, b| sum + b.held + b.locked)
    }

    pub fn apply(&mut self, event: &BalanceEvent, block_number: u64) -> IndexerResult<()> {
        match *event {
            BalanceEvent::Transfer { from, to, value } => {
                if from != to {
                    self.debit_held(from, value, block_number)?;
                    self.entry(to).held += value;
                }
            }
            BalanceEvent::Issue {
                target,
                locked,
                amount,
            } => {
                let balance = self.entry(target);
                if locked {
                    balance.locked += amount;
                } else {
                    balance.held += amount;
                }
            }
            BalanceEvent::Redeem {
                target,
                locked,
                amount,
            } => {
                if locked {
                    self.debit_locked(target, amount, block_number)?;
                } else {
                    self.debit_held(target, amount, block_number)?;
                }
            }
            BalanceEvent::Lock { account, value } => {
                self.debit_held(account, value, block_number)?;
                self.entry(account).locked += value;
            }
            BalanceEvent::Unlock {
                account,
                recipient,
                value,
            } => {
                self.debit_locked(account, value, block_number)?;
                self.entry(recipient).held += value;
            }
            BalanceEvent::ChangeLockedAccount {
                before,
                after,
                value,
            } => {
                self.debit_locked(before, value, block_number)?;
                self.entry(after).locked += value;
            }
            BalanceEvent::Consume { consumer, value } => {
                self.debit_held(consumer, value, block_number)?;
            }
        }
        Ok(())
    }

    /// Accounts with a non-zero held or locked balance, in address order.
    pub fn holders(&self) -> Vec<HolderBalance> {
        self.accounts
            .iter()
            .filter(|(_, b)| !b.held.is_zero() || !b.locked.is_zero())
            .map(|(account, b)| HolderBalance {
                account_address: *account,
                hold_balance: b.held,
                locked_balance: b.locked,
            })
            .collect()
    }

    fn entry(&mut self, account: Address) -> &mut Balance {
        self.accounts.entry(account).or_default()
    }

    fn debit_held(&mut self, account: Address, value: U256, block_number: u64) -> IndexerResult<()> {
        let balance = self.entry(account);
        balance.held = balance
            .held
            .checked_sub(value)
            .ok_or(IndexerError::NegativeBalance {
                account,
                block_number,
            })?;
        Ok(())
    }

    fn debit_locked(
        &mut self,
        account: Address,
        value: U256,
        block_number: u64,
    ) -> IndexerResult<()> {
        let balance = self.entry(account);
        balance.locked = balance
            .locked
            .checked_sub(value)
            .ok_or(IndexerError::NegativeBalance {
                account,
                block_number,
            })?;
        Ok(())
    }
}

static LIST_ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Fresh UUID-shaped list id derived from the request and a process-local sequence.
pub fn new_list_id(token: &Address, block_number: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let sequence = LIST_ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut seed = Vec::with_capacity(20 + 8 + 16 + 8);
    seed.extend_from_slice(token.as_slice());
    seed.extend_from_slice(&block_number.to_be_bytes());
    seed.extend_from_slice(&nanos.to_be_bytes());
    seed.extend_from_slice(&sequence.to_be_bytes());

    let hex = alloy_primitives::hex::encode(&keccak256(&seed)[..16]);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Inserts a PENDING run with a fresh list id.
pub fn request_snapshot(
    conn: &Connection,
    token: Address,
    block_number: u64,
) -> IndexerResult<SnapshotRun> {
    let list_id = new_list_id(&token, block_number);
    let run = SnapshotRepository::new(conn).insert_run(&list_id, &token, block_number)?;
    info!(
        "Requested holder snapshot {} for {:?} at block {}",
        list_id, token, block_number
    );
    Ok(run)
}

/// Outcome of one [`HolderSnapshotBuilder::collect_ready`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Runs that reached DONE or FAILED.
    pub finished: Vec<SnapshotRun>,
    /// Runs left PENDING after a transient error.
    pub deferred: usize,
}

pub struct HolderSnapshotBuilder {
    chain: Arc<dyn ChainReader>,
    db: Database,
    max_block_window: u64,
    abis: Vec<(BalanceEventKind, EventAbi)>,
}

impl HolderSnapshotBuilder {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        db: Database,
        max_block_window: u64,
    ) -> IndexerResult<Self> {
        let abis = BalanceEventKind::ALL
            .into_iter()
            .map(|kind| Ok((kind, EventAbi::parse(kind.signature())?)))
            .collect::<IndexerResult<Vec<_>>>()?;
        Ok(Self {
            chain,
            db,
            max_block_window,
            abis,
        })
    }

    /// Registers a PENDING run for `token` at `block_number`.
    pub fn request(&self, token: Address, block_number: u64) -> IndexerResult<SnapshotRun> {
        let conn = self.db.lock()?;
        request_snapshot(&conn, token, block_number)
    }

    /// Collects the oldest PENDING run whose target block is mined and returns
    /// it with its new status.
    ///
    /// Transient chain errors leave the run PENDING and are returned to the
    /// caller. Runs targeting a block above the head are not picked.
    pub async fn collect(&self) -> IndexerResult<Option<SnapshotRun>> {
        let head = self.chain.head_block().await?;
        let run = {
            let conn = self.db.lock()?;
            SnapshotRepository::new(&conn)
                .pending_runs(head)?
                .into_iter()
                .next()
        };
        match run {
            Some(run) => self.collect_run(run).await.map(Some),
            None => Ok(None),
        }
    }

    /// Collects every run whose target block is mined, oldest first.
    ///
    /// A run hitting a transient error stays PENDING and the pass moves on to the
    /// next one. An unavailable chain ends the pass.
    pub async fn collect_ready(&self) -> IndexerResult<CollectReport> {
        let head = self.chain.head_block().await?;
        let runs = {
            let conn = self.db.lock()?;
            SnapshotRepository::new(&conn).pending_runs(head)?
        };

        let mut report = CollectReport::default();
        for run in runs {
            match self.collect_run(run).await {
                Ok(run) => report.finished.push(run),
                Err(e @ IndexerError::ServiceUnavailable(_)) => return Err(e),
                Err(e) if e.is_transient() => report.deferred += 1,
                Err(e) => return Err(e),
            }
        }
        if report.deferred > 0 {
            warn!(
                "{} snapshot runs deferred to the next pass",
                report.deferred
            );
        }
        Ok(report)
    }

    async fn collect_run(&self, run: SnapshotRun) -> IndexerResult<SnapshotRun> {
        let listed = {
            let conn = self.db.lock()?;
            ListingRepository::new(&conn)
                .get(&run.token_address)?
                .is_some()
        };
        if !listed {
            warn!(
                "Snapshot {}: {:?} is not a listed token",
                run.list_id, run.token_address
            );
            return self.finish(run, SnapshotStatus::Failed, &[]);
        }

        let start = Instant::now();
        match self.replay(&run).await {
            Ok(book) => {
                let holders = book.holders();
                info!(
                    "Snapshot {}: {} holders owning {} at block {} in {:?}",
                    run.list_id,
                    holders.len(),
                    book.total(),
                    run.block_number,
                    start.elapsed()
                );
                self.finish(run, SnapshotStatus::Done, &holders)
            }
            Err(e) if e.is_transient() => {
                warn!("Snapshot {} stays pending: {}", run.list_id, e);
                Err(e)
            }
            Err(e) => {
                error!("Snapshot {} failed: {}", run.list_id, e);
                self.finish(run, SnapshotStatus::Failed, &[])
            }
        }
    }

    /// Replays every balance event of the run's token up to its target block.
    ///
    /// Exchange settlements (`HolderChanged`) move balance between the traders;
    /// transfer legs into or out of a contract are deposits and withdrawals and
    /// leave the book untouched.
    async fn replay(&self, run: &SnapshotRun) -> IndexerResult<BalanceBook> {
        let checkpoint = {
            let conn = self.db.lock()?;
            let repo = SnapshotRepository::new(&conn);
            match repo.latest_done_before(&run.token_address, run.block_number)? {
                Some(done) => {
                    let holders = repo.holders(&done.list_id)?.unwrap_or_default();
                    Some((done, holders))
                }
                None => None,
            }
        };

        let (mut book, from_block) = match checkpoint {
            Some((done, holders)) => {
                info!(
                    "Snapshot {} resumes from {} at block {}",
                    run.list_id, done.list_id, done.block_number
                );
                (BalanceBook::from_holders(&holders), done.block_number + 1)
            }
            None => {
                let deployed =
                    find_deployment_block(self.chain.as_ref(), run.token_address, run.block_number)
                        .await?;
                (BalanceBook::default(), deployed)
            }
        };

        if from_block > run.block_number {
            return Ok(book);
        }

        let exchange = self.chain.tradable_exchange(run.token_address).await?;
        let mut contracts: HashMap<Address, bool> = HashMap::new();

        let range = ScanWindow {
            from_block,
            to_block: run.block_number,
        };
        for chunk in range.chunks(self.max_block_window) {
            let mut logs: Vec<(BalanceEventKind, &EventAbi, ChainLog)> = Vec::new();
            for (kind, abi) in &self.abis {
                let Some(emitter) = kind.emitter(run.token_address, exchange) else {
                    continue;
                };
                let found = self
                    .chain
                    .get_logs(emitter, abi.topic0(), chunk.from_block, chunk.to_block)
                    .await?;
                logs.extend(found.into_iter().map(|log| (*kind, abi, log)));
            }
            logs.sort_by_key(|(_, _, log)| log.position());

            for (kind, abi, log) in &logs {
                let decoded = abi.decode(log)?;
                // The exchange reports settlements of every token it trades
                if *kind == BalanceEventKind::HolderChanged
                    && decoded.address("token")? != run.token_address
                {
                    continue;
                }

                let event = kind.to_event(&decoded)?;
                if let BalanceEvent::Transfer { from, to, .. } = event {
                    if self.is_contract(&mut contracts, from, run.block_number).await?
                        || self.is_contract(&mut contracts, to, run.block_number).await?
                    {
                        debug!(
                            "Snapshot {}: skipping exchange leg at block {}",
                            run.list_id, log.block_number
                        );
                        continue;
                    }
                }
                book.apply(&event, log.block_number)?;
            }
        }

        Ok(book)
    }

    async fn is_contract(
        &self,
        cache: &mut HashMap<Address, bool>,
        address: Address,
        block_number: u64,
    ) -> IndexerResult<bool> {
        if address.is_zero() {
            return Ok(false);
        }
        if let Some(known) = cache.get(&address) {
            return Ok(*known);
        }
        let has_code = !self.chain.get_code_at(address, block_number).await?.is_empty();
        cache.insert(address, has_code);
        Ok(has_code)
    }

    fn finish(
        &self,
        mut run: SnapshotRun,
        status: SnapshotStatus,
        holders: &[HolderBalance],
    ) -> IndexerResult<SnapshotRun> {
        let conn = self.db.lock()?;
        let tx = conn.unchecked_transaction()?;
        let repo = SnapshotRepository::new(&tx);
        if status == SnapshotStatus::Done {
            repo.replace_holders(&run.list_id, holders)?;
        }
        repo.set_status(&run.list_id, status)?;
        tx.commit()?;

        run.status = status;
        Ok(run)
    }
}
