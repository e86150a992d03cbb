//! ML run lifecycle, status synchronization and catalog import.

pub mod catalog;
pub mod lifecycle;
pub mod sync;

pub use catalog::{sync_catalog, CatalogReport};
pub use lifecycle::RunLifecycle;
pub use sync::{sync_all, SyncReport, TenantSync};
