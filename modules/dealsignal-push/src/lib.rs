//! The CRM-facing half of the pipeline: the batch pusher that routes
//! pending signals through the gate into Notion, and the suppression sync
//! that mirrors the CRM back into the local cache.

pub mod pusher;
pub mod suppression;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use pusher::{BatchResult, NotionPusher};
pub use suppression::{SuppressionSync, SyncStats};
pub use traits::CrmConnector;
