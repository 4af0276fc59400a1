pub mod bootstrap;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod cursor;
pub mod deployment;
pub mod error;
pub mod events;
pub mod identity;
pub mod listing;
pub mod node_health;
pub mod query;
pub mod replicator;
pub mod repository;
pub mod rpc;
pub mod scheduler;
pub mod snapshot;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testutil;
