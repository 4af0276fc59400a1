//! Watch-set and company-directory collaborators.

use crate::error::{IndexerError, IndexerResult};
use crate::repository::{Database, ListingRepository};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Contract templates the network issues tokens from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    IbetStraightBond,
    IbetShare,
    IbetMembership,
    IbetCoupon,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::IbetStraightBond,
        TemplateKind::IbetShare,
        TemplateKind::IbetMembership,
        TemplateKind::IbetCoupon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::IbetStraightBond => "IbetStraightBond",
            TemplateKind::IbetShare => "IbetShare",
            TemplateKind::IbetMembership => "IbetMembership",
            TemplateKind::IbetCoupon => "IbetCoupon",
        }
    }

    /// Bond and share templates carry lock/unlock balances.
    pub fn supports_locking(&self) -> bool {
        matches!(self, TemplateKind::IbetStraightBond | TemplateKind::IbetShare)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| IndexerError::Decode(format!("unknown token template {s}")))
    }
}

/// A listed token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEntity {
    pub address: Address,
    pub template: TemplateKind,
    pub owner_address: Address,
    pub is_public: bool,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn list_entities(&self, public_only: bool) -> IndexerResult<Vec<WatchedEntity>>;
}

/// Listing registry backed by the `listing` table.
#[derive(Clone)]
pub struct ListingStore {
    db: Database,
}

impl ListingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingSource for ListingStore {
    async fn list_entities(&self, public_only: bool) -> IndexerResult<Vec<WatchedEntity>> {
        let conn = self.db.lock()?;
        ListingRepository::new(&conn).list(public_only)
    }
}

pub trait CompanyDirectory: Send + Sync {
    /// Display name of the company owning `owner`; empty when unknown.
    fn lookup(&self, owner: &Address) -> String;
}

#[derive(Debug, Deserialize)]
struct CompanyEntry {
    address: String,
    corporate_name: String,
}

/// Company directory loaded from a JSON list of `{address, corporate_name}` objects.
#[derive(Debug, Default, Clone)]
pub struct FileCompanyDirectory {
    companies: HashMap<Address, String>,
}

impl FileCompanyDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> IndexerResult<Self> {
        let entries: Vec<CompanyEntry> = serde_json::from_str(raw)?;
        let mut companies = HashMap::new();
        for entry in entries {
            match Address::from_str(&entry.address) {
                Ok(address) => {
                    companies.insert(address, entry.corporate_name);
                }
                Err(e) => warn!("Skipping company entry {}: {}", entry.address, e),
            }
        }
        Ok(Self { companies })
    }

    pub fn load(path: &Path) -> IndexerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IndexerError::Config(format!("cannot read company list {}: {e}", path.display()))
        })?;
        let directory = Self::from_json(&raw)?;
        info!(
            "Loaded {} companies from {}",
            directory.companies.len(),
            path.display()
        );
        Ok(directory)
    }
}

impl CompanyDirectory for FileCompanyDirectory {
    fn lookup(&self, owner: &Address) -> String {
        self.companies.get(owner).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_template_round_trips_through_str() {
        for kind in TemplateKind::ALL {
            assert_eq!(kind.as_str().parse::<TemplateKind>().unwrap(), kind);
        }
        assert!("IbetDeposit".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_company_lookup_is_case_insensitive_and_defaults_empty() {
        let directory = FileCompanyDirectory::from_json(
            r#"[
                {"address": "0x865de50bb0f21c3f318b736c04d2b6ff7dea3bfd", "corporate_name": "Acme Securities"},
                {"address": "not-an-address", "corporate_name": "Broken"}
            ]"#,
        )
        .unwrap();

        let owner = address!("865DE50bb0f21c3f318B736c04d2B6fF7dEa3bFD");
        assert_eq!(directory.lookup(&owner), "Acme Securities");
        assert_eq!(directory.lookup(&Address::ZERO), "");
    }

    #[tokio::test]
    async fn test_listing_store_filters_public() {
        let db = Database::in_memory().unwrap();
        {
            let conn = db.lock().unwrap();
            let repo = ListingRepository::new(&conn);
            repo.upsert(&WatchedEntity {
                address: address!("1000000000000000000000000000000000000001"),
                template: TemplateKind::IbetShare,
                owner_address: Address::ZERO,
                is_public: true,
            })
            .unwrap();
            repo.upsert(&WatchedEntity {
                address: address!("1000000000000000000000000000000000000002"),
                template: TemplateKind::IbetCoupon,
                owner_address: Address::ZERO,
                is_public: false,
            })
            .unwrap();
        }

        let store = ListingStore::new(db);
        assert_eq!(store.list_entities(true).await.unwrap().len(), 1);
        assert_eq!(store.list_entities(false).await.unwrap().len(), 2);
    }
}
