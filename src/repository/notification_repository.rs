use super::database::now_secs;
use super::models::{NotificationMetadata, NotificationRecord, NotificationView, conversion_error};
use crate::catalog::{NotificationType, Priority};
use crate::error::IndexerResult;
use alloy_primitives::Address;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, params_from_iter};
use std::str::FromStr;

/// Read-side filters; unset fields do not constrain the query.
#[derive(Debug, Default, Clone)]
pub struct NotificationFilter {
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    pub address: Option<Address>,
    pub from_timestamp: Option<u64>,
    pub to_timestamp: Option<u64>,
}

pub struct NotificationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> NotificationRepository<'a> {
    // Re-merging an id rewrites the derived columns and keeps the API-owned flags
    const UPSERT_NOTIFICATION: &'static str = "INSERT INTO notification (
            notification_id, notification_type, priority, address,
            block_timestamp, args, metainfo, created
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(notification_id) DO UPDATE SET
            notification_type = excluded.notification_type,
            priority = excluded.priority,
            address = excluded.address,
            block_timestamp = excluded.block_timestamp,
            args = excluded.args,
            metainfo = excluded.metainfo";

    const SELECT_NOTIFICATION: &'static str = "SELECT notification_id, notification_type, priority,
            address, block_timestamp, args, metainfo, is_read, is_flagged, is_deleted, created
        FROM notification";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Merges records into the table. The caller owns the surrounding transaction.
    pub fn upsert_batch(&self, records: &[NotificationRecord]) -> IndexerResult<usize> {
        let mut stmt = self.conn.prepare_cached(Self::UPSERT_NOTIFICATION)?;
        let created = now_secs();
        let mut count = 0;

        for record in records {
            count += stmt.execute(params![
                record.notification_id,
                record.notification_type.as_str(),
                record.priority.as_i64(),
                record.address.map(|a| format!("{a:?}")),
                record.block_timestamp,
                serde_json::to_string(&record.args)?,
                serde_json::to_string(&record.metainfo)?,
                created,
            ])?;
        }

        Ok(count)
    }

    pub fn get(&self, notification_id: &str) -> IndexerResult<Option<NotificationView>> {
        let query = format!("{} WHERE notification_id = ?1", Self::SELECT_NOTIFICATION);
        let notification = self
            .conn
            .query_row(&query, params![notification_id], Self::row_to_view)
            .optional()?;
        Ok(notification)
    }

    /// Newest first (descending id, which is descending chain position).
    pub fn query(
        &self,
        filter: &NotificationFilter,
        limit: usize,
        offset: usize,
    ) -> IndexerResult<Vec<NotificationView>> {
        let (conditions, params) = Self::conditions(filter);

        let mut query = Self::SELECT_NOTIFICATION.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY notification_id DESC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let notifications = stmt
            .query_map(params_from_iter(params), Self::row_to_view)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn count(&self, filter: &NotificationFilter) -> IndexerResult<usize> {
        let (conditions, params) = Self::conditions(filter);

        let mut query = "SELECT COUNT(*) FROM notification".to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        let count = self
            .conn
            .query_row(&query, params_from_iter(params), |row| row.get(0))?;
        Ok(count)
    }

    fn conditions(filter: &NotificationFilter) -> (Vec<&'static str>, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(kind) = filter.notification_type {
            conditions.push("notification_type = ?");
            params.push(Box::new(kind.as_str()));
        }
        if let Some(priority) = filter.priority {
            conditions.push("priority = ?");
            params.push(Box::new(priority.as_i64()));
        }
        if let Some(address) = filter.address {
            conditions.push("address = ?");
            params.push(Box::new(format!("{address:?}")));
        }
        if let Some(from) = filter.from_timestamp {
            conditions.push("block_timestamp >= ?");
            params.push(Box::new(from));
        }
        if let Some(to) = filter.to_timestamp {
            conditions.push("block_timestamp <= ?");
            params.push(Box::new(to));
        }

        (conditions, params)
    }

    fn row_to_view(row: &Row) -> rusqlite::Result<NotificationView> {
        let notification_type = NotificationType::from_str(&row.get::<_, String>(1)?)
            .map_err(|e| conversion_error(1, e))?;
        let priority = Priority::from_i64(row.get(2)?).unwrap_or(Priority::Low);
        let address = row
            .get::<_, Option<String>>(3)?
            .map(|raw| Address::from_str(&raw))
            .transpose()
            .map_err(|e| conversion_error(3, e))?;
        let args = serde_json::from_str(&row.get::<_, String>(5)?)
            .map_err(|e| conversion_error(5, e))?;
        let metainfo: NotificationMetadata = serde_json::from_str(&row.get::<_, String>(6)?)
            .map_err(|e| conversion_error(6, e))?;

        Ok(NotificationView {
            record: NotificationRecord {
                notification_id: row.get(0)?,
                notification_type,
                priority,
                address,
                block_timestamp: row.get(4)?,
                args,
                metainfo,
            },
            is_read: row.get(7)?,
            is_flagged: row.get(8)?,
            is_deleted: row.get(9)?,
            created: row.get(10)?,
        })
    }
}
