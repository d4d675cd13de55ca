//! Archive sink for batch records.
//!
//! Every batch gets one external record, created before its first job is
//! submitted and updated as the batch progresses:
//!
//! - [`ArchiveFields`]: the field set written on create and update.
//! - [`ArchiveSink`]: the create/update seam used by the pipeline.
//! - [`HttpArchive`]: REST implementation with bounded retry on writes.

pub mod record;
pub mod sink;

pub use record::{ArchiveFields, RecordStatus};
pub use sink::{ArchiveConfig, ArchiveError, ArchiveSink, HttpArchive};
