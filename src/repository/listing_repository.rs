use super::models::{address_column, conversion_error};
use crate::error::IndexerResult;
use crate::listing::{TemplateKind, WatchedEntity};
use alloy_primitives::Address;
use rusqlite::{Connection, OptionalExtension, Row, params};

pub struct ListingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ListingRepository<'a> {
    const UPSERT_LISTING: &'static str =
        "INSERT INTO listing (token_address, template, owner_address, is_public)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(token_address) DO UPDATE SET
            template = excluded.template,
            owner_address = excluded.owner_address,
            is_public = excluded.is_public";

    const SELECT_LISTING: &'static str =
        "SELECT token_address, template, owner_address, is_public FROM listing";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, entity: &WatchedEntity) -> IndexerResult<()> {
        self.conn.execute(
            Self::UPSERT_LISTING,
            params![
                format!("{:?}", entity.address),
                entity.template.as_str(),
                format!("{:?}", entity.owner_address),
                entity.is_public,
            ],
        )?;
        Ok(())
    }

    pub fn list(&self, public_only: bool) -> IndexerResult<Vec<WatchedEntity>> {
        let query = if public_only {
            format!("{} WHERE is_public = 1 ORDER BY token_address", Self::SELECT_LISTING)
        } else {
            format!("{} ORDER BY token_address", Self::SELECT_LISTING)
        };

        let mut stmt = self.conn.prepare(&query)?;
        let entities = stmt
            .query_map([], Self::row_to_entity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    pub fn get(&self, address: &Address) -> IndexerResult<Option<WatchedEntity>> {
        let query = format!("{} WHERE token_address = ?1", Self::SELECT_LISTING);
        let entity = self
            .conn
            .query_row(&query, params![format!("{address:?}")], Self::row_to_entity)
            .optional()?;
        Ok(entity)
    }

    fn row_to_entity(row: &Row) -> rusqlite::Result<WatchedEntity> {
        let template = row
            .get::<_, String>(1)?
            .parse::<TemplateKind>()
            .map_err(|e| conversion_error(1, e))?;

        Ok(WatchedEntity {
            address: address_column(row, 0)?,
            template,
            owner_address: address_column(row, 2)?,
            is_public: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use alloy_primitives::address;

    #[test]
    fn test_upsert_replaces_listing_attributes() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let repo = ListingRepository::new(&conn);
        let token = address!("1000000000000000000000000000000000000001");

        let mut entity = WatchedEntity {
            address: token,
            template: TemplateKind::IbetStraightBond,
            owner_address: address!("2000000000000000000000000000000000000002"),
            is_public: false,
        };
        repo.upsert(&entity).unwrap();
        entity.is_public = true;
        repo.upsert(&entity).unwrap();

        assert_eq!(repo.list(false).unwrap().len(), 1);
        assert_eq!(repo.get(&token).unwrap(), Some(entity));
        assert_eq!(repo.get(&Address::ZERO).unwrap(), None);
    }
}
