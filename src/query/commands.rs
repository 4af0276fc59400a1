use crate::catalog::{NotificationType, Priority};
use crate::listing::{TemplateKind, WatchedEntity};
use crate::query::formatters::{
    OutputFormat, format_block, format_cursors, format_nodes, format_notifications,
    format_snapshot, format_transaction,
};
use crate::repository::{
    BlockRepository, CursorRepository, ListingRepository, NodeRepository, NotificationFilter,
    NotificationRepository, SnapshotRepository, SnapshotStatus,
};
use crate::snapshot::request_snapshot;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::str::FromStr;

fn parse_address(value: &str, what: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| anyhow::anyhow!("Invalid {} address: {}", what, value))
}

#[derive(Default)]
pub struct NotificationQuery {
    pub notification_type: Option<String>,
    pub priority: Option<i64>,
    pub address: Option<String>,
    pub from_timestamp: Option<u64>,
    pub to_timestamp: Option<u64>,
    pub limit: usize,
    pub offset: usize,
}

impl NotificationQuery {
    fn to_filter(&self) -> Result<NotificationFilter> {
        let notification_type = self
            .notification_type
            .as_deref()
            .map(NotificationType::from_str)
            .transpose()?;
        let priority = self
            .priority
            .map(|p| Priority::from_i64(p).ok_or_else(|| anyhow::anyhow!("Invalid priority: {}", p)))
            .transpose()?;
        let address = self
            .address
            .as_deref()
            .map(|a| parse_address(a, "subject"))
            .transpose()?;

        Ok(NotificationFilter {
            notification_type,
            priority,
            address,
            from_timestamp: self.from_timestamp,
            to_timestamp: self.to_timestamp,
        })
    }
}

pub fn cmd_notifications(
    conn: &Connection,
    query: NotificationQuery,
    format: &OutputFormat,
) -> Result<()> {
    let filter = query.to_filter()?;
    let repo = NotificationRepository::new(conn);
    let notifications = repo.query(&filter, query.limit, query.offset)?;
    let total = repo.count(&filter)?;

    println!("{}", format_notifications(&notifications, format));
    if matches!(format, OutputFormat::Table) {
        println!("Showing {} of {} notifications", notifications.len(), total);
    }

    Ok(())
}

pub fn cmd_block(conn: &Connection, number: u64, format: &OutputFormat) -> Result<()> {
    let repo = BlockRepository::new(conn);
    let block = repo
        .get_block(number)?
        .ok_or_else(|| anyhow::anyhow!("Block {} has not been replicated", number))?;
    let transactions = repo.transactions_in_block(number)?;
    println!("{}", format_block(&block, &transactions, format));

    Ok(())
}

pub fn cmd_transaction(conn: &Connection, hash: &str, format: &OutputFormat) -> Result<()> {
    let tx = BlockRepository::new(conn)
        .get_transaction(hash)?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", hash))?;
    println!("{}", format_transaction(&tx, format));

    Ok(())
}

/// Prints the run; holders are included only once it is DONE.
pub fn cmd_snapshot(conn: &Connection, list_id: &str, format: &OutputFormat) -> Result<()> {
    let repo = SnapshotRepository::new(conn);
    let run = repo
        .get_run(list_id)?
        .ok_or_else(|| anyhow::anyhow!("Snapshot {} not found", list_id))?;
    let holders = match run.status {
        SnapshotStatus::Done => repo.holders(list_id)?,
        _ => None,
    };
    println!("{}", format_snapshot(&run, holders.as_deref(), format));

    Ok(())
}

pub fn cmd_snapshot_request(conn: &Connection, token: &str, block_number: u64) -> Result<()> {
    let token = parse_address(token, "token")?;
    let run = request_snapshot(conn, token, block_number)?;
    println!("{}", run.list_id);

    Ok(())
}

pub fn cmd_listing_add(
    conn: &Connection,
    token: &str,
    template: &str,
    owner: &str,
    is_public: bool,
) -> Result<()> {
    let entity = WatchedEntity {
        address: parse_address(token, "token")?,
        template: TemplateKind::from_str(template).context("Unknown template")?,
        owner_address: parse_address(owner, "owner")?,
        is_public,
    };
    ListingRepository::new(conn).upsert(&entity)?;
    println!(
        "Listed {} ({}, public: {})",
        entity.address.to_checksum(None),
        entity.template,
        entity.is_public
    );

    Ok(())
}

pub fn cmd_cursors(conn: &Connection, chain_id: u64, format: &OutputFormat) -> Result<()> {
    let cursors = CursorRepository::new(conn, chain_id).list()?;
    println!("{}", format_cursors(&cursors, format));

    Ok(())
}

pub fn cmd_nodes(conn: &Connection, format: &OutputFormat) -> Result<()> {
    let nodes = NodeRepository::new(conn).list()?;
    println!("{}", format_nodes(&nodes, format));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[test]
    fn test_query_maps_to_filter() {
        let query = NotificationQuery {
            notification_type: Some("Allot".to_string()),
            priority: Some(1),
            address: Some("0x1111111111111111111111111111111111111111".to_string()),
            from_timestamp: Some(10),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.notification_type, Some(NotificationType::Allot));
        assert_eq!(filter.priority, Some(Priority::Medium));
        assert_eq!(filter.address, Some(Address::repeat_byte(0x11)));
        assert_eq!(filter.to_timestamp, None);
    }

    #[test]
    fn test_rejects_unknown_filters() {
        let bad_type = NotificationQuery {
            notification_type: Some("Airdrop".to_string()),
            ..Default::default()
        };
        assert!(bad_type.to_filter().is_err());

        let bad_priority = NotificationQuery {
            priority: Some(7),
            ..Default::default()
        };
        assert!(bad_priority.to_filter().is_err());
    }

    #[test]
    fn test_listing_add_and_snapshot_request() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let token = "0x5000000000000000000000000000000000000005";

        cmd_listing_add(
            &conn,
            token,
            "IbetCoupon",
            "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
            false,
        )
        .unwrap();
        let listed = ListingRepository::new(&conn)
            .get(&Address::from_str(token).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(listed.template, TemplateKind::IbetCoupon);
        assert!(!listed.is_public);

        assert!(cmd_listing_add(&conn, token, "IbetBond", token, true).is_err());

        cmd_snapshot_request(&conn, token, 100).unwrap();
        let pending = SnapshotRepository::new(&conn)
            .pending_runs(u64::MAX)
            .unwrap()
            .remove(0);
        assert_eq!(pending.block_number, 100);
        assert!(cmd_snapshot(&conn, &pending.list_id, &OutputFormat::Json).is_ok());
        assert!(cmd_snapshot(&conn, "missing", &OutputFormat::Json).is_err());
    }
}
