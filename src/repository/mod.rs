pub mod block_repository;
pub mod cursor_repository;
pub mod database;
pub mod listing_repository;
pub mod models;
pub mod node_repository;
pub mod notification_repository;
pub mod snapshot_repository;

pub use block_repository::BlockRepository;
pub use cursor_repository::CursorRepository;
pub use database::{Database, now_secs};
pub use listing_repository::ListingRepository;
pub use models::{
    BlockRecord, CursorRecord, HolderBalance, NodeRecord, NotificationMetadata,
    NotificationRecord, NotificationView, SnapshotRun, SnapshotStatus, TxRecord,
};
pub use node_repository::NodeRepository;
pub use notification_repository::{NotificationFilter, NotificationRepository};
pub use snapshot_repository::SnapshotRepository;
