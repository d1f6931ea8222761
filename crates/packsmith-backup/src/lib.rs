//! Portable backup archives: export, inspect, plan, and selective restore.

mod archive;
mod export;
mod planner;
mod restore;

pub use archive::{
    asset_entry_name, inspect_backup, referenced_file_set, BackupDocument, PackageDto, StickerDto,
    ASSET_PREFIX, METADATA_ENTRY,
};
pub use export::{export_backup, write_archive, ExportSummary};
pub use planner::{RestoreCandidate, RestorePlan, RestoreStatus};
pub use restore::{restore_backup, RestoreSummary};
