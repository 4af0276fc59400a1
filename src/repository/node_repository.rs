use super::database::now_secs;
use super::models::NodeRecord;
use crate::error::IndexerResult;
use rusqlite::{Connection, params};

pub struct NodeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> NodeRepository<'a> {
    const UPSERT_NODE: &'static str = "INSERT INTO node (endpoint_uri, priority, is_synced, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(endpoint_uri) DO UPDATE SET
            priority = excluded.priority,
            is_synced = excluded.is_synced,
            updated_at = excluded.updated_at";

    const SELECT_NODES: &'static str =
        "SELECT endpoint_uri, priority, is_synced, updated_at FROM node ORDER BY priority, endpoint_uri";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, endpoint_uri: &str, priority: u32, is_synced: bool) -> IndexerResult<()> {
        self.conn.execute(
            Self::UPSERT_NODE,
            params![endpoint_uri, priority, is_synced, now_secs()],
        )?;
        Ok(())
    }

    /// Drops rows for endpoints that are no longer configured.
    pub fn retain(&self, endpoint_uris: &[String]) -> IndexerResult<usize> {
        let mut removed = 0;
        for node in self.list()? {
            if !endpoint_uris.contains(&node.endpoint_uri) {
                removed += self.conn.execute(
                    "DELETE FROM node WHERE endpoint_uri = ?1",
                    params![node.endpoint_uri],
                )?;
            }
        }
        Ok(removed)
    }

    pub fn list(&self) -> IndexerResult<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(Self::SELECT_NODES)?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(NodeRecord {
                    endpoint_uri: row.get(0)?,
                    priority: row.get(1)?,
                    is_synced: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[test]
    fn test_upsert_and_retain() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let repo = NodeRepository::new(&conn);

        repo.upsert("http://old:8545", 1, true).unwrap();
        repo.upsert("http://primary:8545", 0, true).unwrap();
        repo.upsert("http://primary:8545", 0, false).unwrap();

        let removed = repo.retain(&["http://primary:8545".to_string()]).unwrap();
        assert_eq!(removed, 1);

        let nodes = repo.list().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].endpoint_uri, "http://primary:8545");
        assert!(!nodes[0].is_synced);
    }
}
