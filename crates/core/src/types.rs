/// Locally generated batch identifier.
pub type BatchId = uuid::Uuid;

/// Opaque job identifier assigned by the generation engine.
pub type JobId = String;

/// Identifier of a record in the archive sink.
pub type ArchiveRecordId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
