//! Field set of an archive record.
//!
//! Id lists are stored as comma-delimited text so the record stays
//! readable in spreadsheet-style archive backends. Unset fields are left
//! out of the payload, which lets incremental updates touch only what
//! changed.

use serde::Serialize;

use batchgen_core::types::Timestamp;

/// Delimiter used when joining id and output lists into one text field.
pub const LIST_DELIMITER: &str = ", ";

/// Batch status as written to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Submitting,
    Processing,
    Completed,
}

/// Fields written to an archive record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    /// Local batch id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_jobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seen_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

/// Join a list into one delimited text field.
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(LIST_DELIMITER)
}
