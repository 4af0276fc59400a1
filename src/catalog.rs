//! Static table of the notification types the indexer watches.
//!
//! Every watcher is the same generic component parameterised by one
//! [`EventDefinition`]; adding an event type means adding a row here.

use crate::error::IndexerError;
use crate::events;
use crate::listing::TemplateKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    StartInitialOffering,
    StopInitialOffering,
    StartOffering,
    StopOffering,
    Suspend,
    ApplyForOffering,
    Allot,
    Transfer,
    ApplyForTransfer,
    ApproveTransfer,
    CancelTransfer,
    Issue,
    Redeem,
    Lock,
    Unlock,
    ForceLock,
    ForceUnlock,
    ChangeToRedeemed,
    ChangeToCanceled,
}

impl NotificationType {
    pub const ALL: [NotificationType; 19] = [
        NotificationType::StartInitialOffering,
        NotificationType::StopInitialOffering,
        NotificationType::StartOffering,
        NotificationType::StopOffering,
        NotificationType::Suspend,
        NotificationType::ApplyForOffering,
        NotificationType::Allot,
        NotificationType::Transfer,
        NotificationType::ApplyForTransfer,
        NotificationType::ApproveTransfer,
        NotificationType::CancelTransfer,
        NotificationType::Issue,
        NotificationType::Redeem,
        NotificationType::Lock,
        NotificationType::Unlock,
        NotificationType::ForceLock,
        NotificationType::ForceUnlock,
        NotificationType::ChangeToRedeemed,
        NotificationType::ChangeToCanceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::StartInitialOffering => "StartInitialOffering",
            NotificationType::StopInitialOffering => "StopInitialOffering",
            NotificationType::StartOffering => "StartOffering",
            NotificationType::StopOffering => "StopOffering",
            NotificationType::Suspend => "Suspend",
            NotificationType::ApplyForOffering => "ApplyForOffering",
            NotificationType::Allot => "Allot",
            NotificationType::Transfer => "Transfer",
            NotificationType::ApplyForTransfer => "ApplyForTransfer",
            NotificationType::ApproveTransfer => "ApproveTransfer",
            NotificationType::CancelTransfer => "CancelTransfer",
            NotificationType::Issue => "Issue",
            NotificationType::Redeem => "Redeem",
            NotificationType::Lock => "Lock",
            NotificationType::Unlock => "Unlock",
            NotificationType::ForceLock => "ForceLock",
            NotificationType::ForceUnlock => "ForceUnlock",
            NotificationType::ChangeToRedeemed => "ChangeToRedeemed",
            NotificationType::ChangeToCanceled => "ChangeToCanceled",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| IndexerError::Decode(format!("unknown notification type {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Priority::Low),
            1 => Some(Priority::Medium),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

/// Equality filter on a decoded boolean argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgFilter {
    pub name: &'static str,
    pub value: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EventDefinition {
    pub notification_type: NotificationType,
    pub signature: &'static str,
    pub filter: Option<ArgFilter>,
    pub priority: Priority,
    /// Argument holding the address the notification is about.
    pub subject: Option<&'static str>,
    pub templates: &'static [TemplateKind],
    /// Also watch listings that are not public.
    pub include_private_listings: bool,
    /// First sync starts at `head - 1` instead of replaying history.
    pub skip_history_on_first_sync: bool,
}

const ALL_TEMPLATES: &[TemplateKind] = &TemplateKind::ALL;
const BOND_SHARE: &[TemplateKind] = &[TemplateKind::IbetStraightBond, TemplateKind::IbetShare];
const SHARE: &[TemplateKind] = &[TemplateKind::IbetShare];
const BOND: &[TemplateKind] = &[TemplateKind::IbetStraightBond];

const fn definition(
    notification_type: NotificationType,
    signature: &'static str,
    subject: Option<&'static str>,
    templates: &'static [TemplateKind],
) -> EventDefinition {
    EventDefinition {
        notification_type,
        signature,
        filter: None,
        priority: Priority::Low,
        subject,
        templates,
        include_private_listings: false,
        skip_history_on_first_sync: false,
    }
}

const fn status_is(value: bool) -> Option<ArgFilter> {
    Some(ArgFilter {
        name: "status",
        value,
    })
}

pub static CATALOG: [EventDefinition; 19] = [
    EventDefinition {
        filter: status_is(true),
        ..definition(
            NotificationType::StartInitialOffering,
            events::CHANGE_INITIAL_OFFERING_STATUS,
            None,
            ALL_TEMPLATES,
        )
    },
    EventDefinition {
        filter: status_is(false),
        ..definition(
            NotificationType::StopInitialOffering,
            events::CHANGE_INITIAL_OFFERING_STATUS,
            None,
            ALL_TEMPLATES,
        )
    },
    EventDefinition {
        filter: status_is(true),
        ..definition(
            NotificationType::StartOffering,
            events::CHANGE_OFFERING_STATUS,
            None,
            ALL_TEMPLATES,
        )
    },
    EventDefinition {
        filter: status_is(false),
        ..definition(
            NotificationType::StopOffering,
            events::CHANGE_OFFERING_STATUS,
            None,
            ALL_TEMPLATES,
        )
    },
    EventDefinition {
        filter: status_is(false),
        ..definition(
            NotificationType::Suspend,
            events::CHANGE_STATUS,
            None,
            ALL_TEMPLATES,
        )
    },
    definition(
        NotificationType::ApplyForOffering,
        events::APPLY_FOR,
        Some("accountAddress"),
        ALL_TEMPLATES,
    ),
    EventDefinition {
        priority: Priority::Medium,
        ..definition(
            NotificationType::Allot,
            events::ALLOT,
            Some("accountAddress"),
            ALL_TEMPLATES,
        )
    },
    EventDefinition {
        include_private_listings: true,
        ..definition(
            NotificationType::Transfer,
            events::TRANSFER,
            Some("to"),
            ALL_TEMPLATES,
        )
    },
    definition(
        NotificationType::ApplyForTransfer,
        events::APPLY_FOR_TRANSFER,
        Some("to"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::ApproveTransfer,
        events::APPROVE_TRANSFER,
        Some("from"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::CancelTransfer,
        events::CANCEL_TRANSFER,
        Some("from"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::Issue,
        events::ISSUE,
        Some("targetAddress"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::Redeem,
        events::REDEEM,
        Some("targetAddress"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::Lock,
        events::LOCK,
        Some("accountAddress"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::Unlock,
        events::UNLOCK,
        Some("recipientAddress"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::ForceLock,
        events::FORCE_LOCK,
        Some("accountAddress"),
        BOND_SHARE,
    ),
    definition(
        NotificationType::ForceUnlock,
        events::FORCE_UNLOCK,
        Some("accountAddress"),
        BOND_SHARE,
    ),
    EventDefinition {
        skip_history_on_first_sync: true,
        ..definition(
            NotificationType::ChangeToRedeemed,
            events::CHANGE_TO_REDEEMED,
            None,
            BOND,
        )
    },
    EventDefinition {
        skip_history_on_first_sync: true,
        ..definition(
            NotificationType::ChangeToCanceled,
            events::CHANGE_TO_CANCELED,
            None,
            SHARE,
        )
    },
];

pub fn definition_for(notification_type: NotificationType) -> &'static EventDefinition {
    // CATALOG holds one row per variant in declaration order.
    &CATALOG[notification_type as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventAbi;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_covers_every_type_in_order() {
        for (index, kind) in NotificationType::ALL.iter().enumerate() {
            assert_eq!(CATALOG[index].notification_type, *kind);
            assert_eq!(definition_for(*kind).notification_type, *kind);
        }
    }

    #[test]
    fn test_every_signature_parses_and_subject_exists() {
        for definition in &CATALOG {
            let abi = EventAbi::parse(definition.signature).unwrap();
            let source = definition.signature;
            if let Some(subject) = definition.subject {
                assert!(
                    source.contains(&format!(" {subject}")),
                    "{} has no argument {subject}",
                    abi.name()
                );
            }
            if let Some(filter) = definition.filter {
                assert!(source.contains(&format!("bool {}", filter.name)));
            }
        }
    }

    #[test]
    fn test_priorities() {
        for definition in &CATALOG {
            let expected = if definition.notification_type == NotificationType::Allot {
                Priority::Medium
            } else {
                Priority::Low
            };
            assert_eq!(definition.priority, expected);
        }
    }

    #[test]
    fn test_only_transfer_watches_private_listings() {
        let private: Vec<_> = CATALOG
            .iter()
            .filter(|d| d.include_private_listings)
            .map(|d| d.notification_type)
            .collect();
        assert_eq!(private, vec![NotificationType::Transfer]);
    }

    #[test]
    fn test_watcher_targets_are_unique() {
        let mut seen = HashSet::new();
        for definition in &CATALOG {
            for template in definition.templates {
                assert!(seen.insert((definition.notification_type, *template)));
            }
        }
        assert!(seen.len() > CATALOG.len());
    }

    #[test]
    fn test_notification_type_parses() {
        assert_eq!(
            "ForceUnlock".parse::<NotificationType>().unwrap(),
            NotificationType::ForceUnlock
        );
        assert!("Mint".parse::<NotificationType>().is_err());
        assert_eq!(Priority::from_i64(1), Some(Priority::Medium));
        assert_eq!(Priority::from_i64(7), None);
    }
}
