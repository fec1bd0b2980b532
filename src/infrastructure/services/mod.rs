//! Infrastructure services

mod cache_admin;
mod maintenance;
mod retrieval_service;

pub use cache_admin::{
    AdminResponse, BackupReport, CacheAdmin, CacheExport, EntryDetail, EntryListing, EntrySummary,
    HealthReport, HealthStatus, ImportReport, OptimizeReport, ProbeReport, EXPORT_VERSION,
    QUERY_INDEX_BACKUP_DIR,
};
pub use maintenance::MaintenanceTask;
pub use retrieval_service::{IngestReport, RetrievalOptions, RetrievalOutcome, RetrievalService};
