//! Generic event watcher: one instance per (notification type, template) pair.

use crate::catalog::{CATALOG, EventDefinition, NotificationType};
use crate::chain::{ChainLog, ChainReader};
use crate::cursor::{ScanWindow, plan_window};
use crate::error::{IndexerError, IndexerResult};
use crate::events::EventAbi;
use crate::identity::notification_id_for_log;
use crate::listing::{CompanyDirectory, TemplateKind, WatchedEntity};
use crate::repository::{
    CursorRepository, Database, NotificationMetadata, NotificationRecord, NotificationRepository,
};
use alloy::dyn_abi::DynSolValue;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every watcher of one process.
#[derive(Clone)]
pub struct WatcherContext {
    pub chain: Arc<dyn ChainReader>,
    pub db: Database,
    pub companies: Arc<dyn CompanyDirectory>,
    pub chain_id: u64,
    pub genesis_block: u64,
    pub max_block_window: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatcherOutcome {
    /// `None` when the cursor was already at the head.
    pub window: Option<ScanWindow>,
    pub records: usize,
    pub failed_entities: usize,
}

pub struct EventWatcher {
    ctx: WatcherContext,
    definition: &'static EventDefinition,
    template: TemplateKind,
    abi: EventAbi,
    target: String,
}

impl EventWatcher {
    pub fn new(
        ctx: WatcherContext,
        definition: &'static EventDefinition,
        template: TemplateKind,
    ) -> IndexerResult<Self> {
        let abi = EventAbi::parse(definition.signature)?;
        let target = format!(
            "notification/{}/{}",
            definition.notification_type,
            template.as_str()
        );
        Ok(Self {
            ctx,
            definition,
            template,
            abi,
            target,
        })
    }

    /// One watcher per catalog entry and template it applies to.
    pub fn all(ctx: &WatcherContext) -> IndexerResult<Vec<Self>> {
        let mut watchers = Vec::new();
        for definition in CATALOG.iter() {
            for template in definition.templates {
                watchers.push(Self::new(ctx.clone(), definition, *template)?);
            }
        }
        Ok(watchers)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn watches(&self, entity: &WatchedEntity) -> bool {
        entity.template == self.template
            && (entity.is_public || self.definition.include_private_listings)
    }

    /// Scans the next window for every watched entity, merges the resulting
    /// notifications and advances the cursor in one transaction.
    ///
    /// A failing entity is logged and skipped; the cursor still advances. An
    /// unavailable chain aborts the tick without touching the cursor.
    pub async fn run_once(&self, entities: &[WatchedEntity]) -> IndexerResult<WatcherOutcome> {
        let started = Instant::now();
        let entities: Vec<&WatchedEntity> = entities.iter().filter(|e| self.watches(e)).collect();

        let head = self.ctx.chain.head_block().await?;
        let cursor = {
            let conn = self.ctx.db.lock()?;
            CursorRepository::new(&conn, self.ctx.chain_id).get_cursor(&self.target)?
        };
        let cursor = match cursor {
            None if self.definition.skip_history_on_first_sync => {
                head.checked_sub(1).filter(|c| *c >= self.ctx.genesis_block)
            }
            other => other,
        };

        let Some(window) =
            plan_window(cursor, self.ctx.genesis_block, head, self.ctx.max_block_window)
        else {
            info!("{}: up to date at block {}", self.target, head);
            return Ok(WatcherOutcome::default());
        };

        let mut records = Vec::new();
        let mut failed_entities = 0;
        let mut timestamps = HashMap::new();
        for entity in entities {
            match self.collect_entity(entity, window, &mut timestamps).await {
                Ok(entity_records) => records.extend(entity_records),
                Err(e @ IndexerError::ServiceUnavailable(_)) => return Err(e),
                Err(e) => {
                    failed_entities += 1;
                    error!(
                        "{}: skipping {:?} for blocks {}: {}",
                        self.target, entity.address, window, e
                    );
                }
            }
        }
        records.sort_by(|a, b| a.notification_id.cmp(&b.notification_id));

        {
            let conn = self.ctx.db.lock()?;
            let tx = conn.unchecked_transaction()?;
            NotificationRepository::new(&tx).upsert_batch(&records)?;
            CursorRepository::new(&tx, self.ctx.chain_id).advance(&self.target, window.to_block)?;
            tx.commit()?;
        }

        info!(
            "{}: blocks {} -> {} notifications in {:?}",
            self.target,
            window,
            records.len(),
            started.elapsed()
        );

        Ok(WatcherOutcome {
            window: Some(window),
            records: records.len(),
            failed_entities,
        })
    }

    async fn collect_entity(
        &self,
        entity: &WatchedEntity,
        window: ScanWindow,
        timestamps: &mut HashMap<u64, u64>,
    ) -> IndexerResult<Vec<NotificationRecord>> {
        let chain = &self.ctx.chain;
        let mut logs = chain
            .get_logs(
                entity.address,
                self.abi.topic0(),
                window.from_block,
                window.to_block,
            )
            .await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }
        logs.sort_by_key(ChainLog::position);

        let exchange = if self.definition.notification_type == NotificationType::Transfer {
            Some(chain.tradable_exchange(entity.address).await?)
        } else {
            None
        };
        let token_name = match chain.token_name(entity.address).await {
            Ok(name) => name,
            Err(e) => {
                warn!("name() failed on {:?}: {}", entity.address, e);
                String::new()
            }
        };
        let metainfo = NotificationMetadata {
            company_name: self.ctx.companies.lookup(&entity.owner_address),
            token_address: entity.address.to_checksum(None),
            token_name,
            exchange_address: exchange
                .filter(|e| !e.is_zero())
                .map(|e| e.to_checksum(None))
                .unwrap_or_default(),
            token_type: entity.template.as_str().to_string(),
        };

        let mut records = Vec::with_capacity(logs.len());
        for log in &logs {
            let decoded = match self.abi.decode(log) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("{}: {}", self.target, e);
                    continue;
                }
            };

            if let Some(filter) = self.definition.filter {
                if decoded.get(filter.name) != Some(&DynSolValue::Bool(filter.value)) {
                    continue;
                }
            }

            if let Some(exchange) = exchange.filter(|e| !e.is_zero()) {
                if decoded.address("from").ok() == Some(exchange) {
                    debug!(
                        "{}: suppressing exchange transfer at block {}",
                        self.target, log.block_number
                    );
                    continue;
                }
            }

            let address: Option<Address> = self
                .definition
                .subject
                .and_then(|name| decoded.address(name).ok());

            let block_timestamp = match timestamps.get(&log.block_number) {
                Some(timestamp) => *timestamp,
                None => {
                    let block = chain.get_block(log.block_number, false).await?;
                    timestamps.insert(log.block_number, block.timestamp);
                    block.timestamp
                }
            };

            records.push(NotificationRecord {
                notification_id: notification_id_for_log(log, 0),
                notification_type: self.definition.notification_type,
                priority: self.definition.priority,
                address,
                block_timestamp,
                args: decoded.to_json(),
                metainfo: metainfo.clone(),
            });
        }

        Ok(records)
    }
}
